//! Proactive commands fetched from the card
//!
//! Only SEND SHORT MESSAGE is interpreted: its TPDU carries the proof of
//! receipt. Every command, including that one, is answered with a Terminal
//! Response reporting "command beyond terminal's capabilities".

use iso7816_tlv::ber::{Tag, Tlv, Value};
use tracing::{debug, info};

use crate::constants::{command_type, toolkit};
use crate::util::{ByteReader, hex_upper};
use crate::{Error, Result, tlv};

/// Comprehension-TLV tag for Command Details, without the CR flag
const TAG_COMMAND_DETAILS: u8 = toolkit::COMMAND_DETAILS & !toolkit::COMPREHENSION_REQUIRED;

/// Comprehension-TLV tag for SMS TPDU, without the CR flag
const TAG_SMS_TPDU: u8 = toolkit::SMS_TPDU & !toolkit::COMPREHENSION_REQUIRED;

/// Command Details of a proactive command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandDetails {
    /// Command number
    pub number: u8,
    /// Type of command
    pub type_of_command: u8,
    /// Command qualifier
    pub qualifier: u8,
}

impl CommandDetails {
    /// Encoded value
    pub const fn to_bytes(self) -> [u8; 3] {
        [self.number, self.type_of_command, self.qualifier]
    }
}

/// A decoded proactive command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProactiveCommand {
    /// SEND SHORT MESSAGE with its SMS TPDU
    SendShortMessage {
        /// Command details
        details: CommandDetails,
        /// SMS TPDU (an SMS-SUBMIT)
        tpdu: Vec<u8>,
    },
    /// DISPLAY TEXT
    DisplayText(CommandDetails),
    /// SET UP MENU
    SetUpMenu(CommandDetails),
    /// PROVIDE LOCAL INFORMATION
    ProvideLocalInformation(CommandDetails),
    /// POLL INTERVAL
    PollInterval(CommandDetails),
    /// MORE TIME
    MoreTime(CommandDetails),
    /// LAUNCH BROWSER
    LaunchBrowser(CommandDetails),
    /// SET UP EVENT LIST
    SetUpEventList(CommandDetails),
    /// Any other command type
    Unhandled(CommandDetails),
}

impl ProactiveCommand {
    /// Decode the `D0` proactive command returned by FETCH
    pub fn decode(data: &[u8]) -> Result<Self> {
        let (&tag, rest) = data
            .split_first()
            .ok_or(Error::MalformedResponse("empty proactive command"))?;
        if tag != toolkit::PROACTIVE_COMMAND {
            return Err(Error::MalformedResponse("not a proactive command"));
        }
        let (len, len_len) = tlv::decode_length(rest)
            .ok_or(Error::MalformedResponse("bad proactive command length"))?;
        let body = rest
            .get(len_len..len_len + len)
            .ok_or(Error::MalformedResponse("truncated proactive command"))?;

        let objects = comprehension_tlvs(body)?;
        let details = match find(&objects, TAG_COMMAND_DETAILS) {
            Some(&[number, type_of_command, qualifier]) => CommandDetails {
                number,
                type_of_command,
                qualifier,
            },
            _ => return Err(Error::MalformedResponse("missing command details")),
        };

        let command = match details.type_of_command {
            command_type::SEND_SHORT_MESSAGE => Self::SendShortMessage {
                details,
                tpdu: find(&objects, TAG_SMS_TPDU)
                    .ok_or(Error::MalformedResponse("SEND SHORT MESSAGE without TPDU"))?
                    .to_vec(),
            },
            command_type::DISPLAY_TEXT => Self::DisplayText(details),
            command_type::SET_UP_MENU => Self::SetUpMenu(details),
            command_type::PROVIDE_LOCAL_INFORMATION => Self::ProvideLocalInformation(details),
            command_type::POLL_INTERVAL => Self::PollInterval(details),
            command_type::MORE_TIME => Self::MoreTime(details),
            command_type::LAUNCH_BROWSER => Self::LaunchBrowser(details),
            command_type::SET_UP_EVENT_LIST => Self::SetUpEventList(details),
            _ => Self::Unhandled(details),
        };
        debug!(?command, "Decoded proactive command");
        Ok(command)
    }

    /// Command details
    pub const fn details(&self) -> CommandDetails {
        match self {
            Self::SendShortMessage { details, .. }
            | Self::DisplayText(details)
            | Self::SetUpMenu(details)
            | Self::ProvideLocalInformation(details)
            | Self::PollInterval(details)
            | Self::MoreTime(details)
            | Self::LaunchBrowser(details)
            | Self::SetUpEventList(details)
            | Self::Unhandled(details) => *details,
        }
    }

    /// Terminal Response data for this command
    pub fn terminal_response(&self) -> Result<Vec<u8>> {
        if let Self::Unhandled(details) = self {
            info!(
                type_of_command = details.type_of_command,
                "No handler for proactive command"
            );
        }
        terminal_response(self.details(), toolkit::RESULT_BEYOND_TERMINAL_CAPABILITY)
    }
}

/// Terminal Response data: command details, device identities (terminal to
/// UICC) and a general result
pub fn terminal_response(details: CommandDetails, general_result: u8) -> Result<Vec<u8>> {
    let objects = [
        (toolkit::COMMAND_DETAILS, details.to_bytes().to_vec()),
        (
            toolkit::DEVICE_IDENTITIES,
            vec![toolkit::DEVICE_TERMINAL, toolkit::DEVICE_UICC],
        ),
        (toolkit::RESULT, vec![general_result]),
    ];

    let mut data = Vec::new();
    for (tag, value) in objects {
        data.extend(Tlv::new(Tag::try_from(tag)?, Value::Primitive(value))?.to_vec());
    }
    debug!(data = %hex_upper(&data), "Terminal response");
    Ok(data)
}

/// Split a sequence of COMPREHENSION-TLV objects into (tag, value) pairs
///
/// Tags are returned without the comprehension-required flag. The
/// three-byte tag format is accepted and reported as its first byte.
fn comprehension_tlvs(data: &[u8]) -> Result<Vec<(u8, &[u8])>> {
    const TRUNCATED: Error = Error::MalformedResponse("truncated simple TLV");

    let mut reader = ByteReader::new(data);
    let mut objects = Vec::new();
    while reader.remaining() > 0 {
        let mut tag = reader.read_u8().ok_or(TRUNCATED)?;
        match tag {
            0x00 | 0x80 | 0xFF => return Err(Error::MalformedResponse("invalid simple TLV tag")),
            0x7F => reader.skip(2).ok_or(TRUNCATED)?,
            _ => tag &= !toolkit::COMPREHENSION_REQUIRED,
        }
        let (len, len_len) = tlv::decode_length(&data[reader.position()..]).ok_or(TRUNCATED)?;
        reader.skip(len_len).ok_or(TRUNCATED)?;
        objects.push((tag, reader.take(len).ok_or(TRUNCATED)?));
    }
    Ok(objects)
}

fn find<'a>(objects: &[(u8, &'a [u8])], tag: u8) -> Option<&'a [u8]> {
    objects.iter().find(|(t, _)| *t == tag).map(|(_, v)| *v)
}

#[cfg(test)]
mod tests {
    use super::*;
    use hex_literal::hex;

    #[test]
    fn test_decode_send_short_message() {
        // Alpha identifier, then a TPDU in the non-CR form of the tag
        let data = hex!("D0 12 81030113 00 82028183 0500 0B05 4100048121");
        let command = ProactiveCommand::decode(&data).unwrap();

        assert_eq!(
            command,
            ProactiveCommand::SendShortMessage {
                details: CommandDetails {
                    number: 0x01,
                    type_of_command: 0x13,
                    qualifier: 0x00,
                },
                tpdu: hex!("4100048121").to_vec(),
            }
        );
    }

    #[test]
    fn test_decode_long_tpdu() {
        let mut data = hex!("D0 81 8C 81030113 00 82028183 8B 81 80").to_vec();
        data.extend([0x41; 0x80]);
        match ProactiveCommand::decode(&data).unwrap() {
            ProactiveCommand::SendShortMessage { tpdu, .. } => assert_eq!(tpdu.len(), 0x80),
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_decode_other_commands() {
        let command = ProactiveCommand::decode(&hex!("D0 09 8103012500 82028182")).unwrap();
        assert!(matches!(command, ProactiveCommand::SetUpMenu(_)));

        // Icon identifier list (tag 1F) would trip a BER parser
        let command =
            ProactiveCommand::decode(&hex!("D0 0D 8103024000 82028182 1F020001")).unwrap();
        assert_eq!(
            command,
            ProactiveCommand::Unhandled(CommandDetails {
                number: 0x02,
                type_of_command: 0x40,
                qualifier: 0x00,
            })
        );
    }

    #[test]
    fn test_decode_malformed() {
        assert!(ProactiveCommand::decode(&[]).is_err());
        assert!(ProactiveCommand::decode(&hex!("D1 03 810301")).is_err());
        assert!(ProactiveCommand::decode(&hex!("D0 05 8103011300")).is_err());
        // SEND SHORT MESSAGE must carry a TPDU
        assert!(matches!(
            ProactiveCommand::decode(&hex!("D0 09 8103011300 82028183")),
            Err(Error::MalformedResponse(_))
        ));
        // Missing command details
        assert!(matches!(
            ProactiveCommand::decode(&hex!("D0 04 82028183")),
            Err(Error::MalformedResponse("missing command details"))
        ));
    }

    #[test]
    fn test_terminal_response() {
        let command = ProactiveCommand::DisplayText(CommandDetails {
            number: 0x01,
            type_of_command: 0x21,
            qualifier: 0x80,
        });
        assert_eq!(
            command.terminal_response().unwrap(),
            hex!("810301218082028281830130")
        );
    }
}
