//! Response packet decoding
//!
//! The card answers a command packet with a proof of receipt (PoR) carried
//! in an SMS-SUBMIT, either through a SEND SHORT MESSAGE proactive command
//! or directly as ENVELOPE response data. Long replies are split over
//! concatenated messages; only the first one carries the response packet
//! header.

use std::fmt;

use tracing::{debug, trace, warn};

use crate::constants::{sms, status};
use crate::header::Tar;
use crate::transport::StatusWord;
use crate::util::{ByteReader, hex_upper};
use crate::{Error, Result};

/// Bytes in a response header: TAR, CNTR, PCNTR, status code
const RESPONSE_HEADER_MIN_LEN: u8 = 10;

/// Response status code reported in the response packet header
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatusCode {
    /// PoR OK
    Acknowledged,
    /// RC/CC/DS failed
    IntegrityFailure,
    /// CNTR low
    CounterLow,
    /// CNTR high
    CounterHigh,
    /// CNTR blocked
    CounterBlocked,
    /// Ciphering error
    CipheringError,
    /// Unidentified security error
    UnidentifiedSecurityError,
    /// Insufficient memory to process incoming message
    InsufficientMemory,
    /// More time needed to process the command packet
    MoreTime,
    /// TAR unknown
    TarUnknown,
    /// Insufficient security level
    InsufficientSecurityLevel,
    /// Actual response data sent using SMS-SUBMIT
    ReplyViaSmsSubmit,
    /// Actual response data sent using a SS-Request invoke
    ReplyViaSsRequest,
    /// Reserved value
    Unknown(u8),
}

/// How a [`StatusCode`] affects the current operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusClass {
    /// Processing succeeded
    Ok,
    /// Processing continues elsewhere
    Informational(&'static str),
    /// Processing failed
    Fatal(&'static str),
}

impl StatusCode {
    /// Raw status byte
    pub const fn code(self) -> u8 {
        match self {
            Self::Acknowledged => 0x00,
            Self::IntegrityFailure => 0x01,
            Self::CounterLow => 0x02,
            Self::CounterHigh => 0x03,
            Self::CounterBlocked => 0x04,
            Self::CipheringError => 0x05,
            Self::UnidentifiedSecurityError => 0x06,
            Self::InsufficientMemory => 0x07,
            Self::MoreTime => 0x08,
            Self::TarUnknown => 0x09,
            Self::InsufficientSecurityLevel => 0x0A,
            Self::ReplyViaSmsSubmit => 0x0B,
            Self::ReplyViaSsRequest => 0x0C,
            Self::Unknown(code) => code,
        }
    }

    /// Human readable reason
    pub const fn reason(self) -> &'static str {
        match self {
            Self::Acknowledged => "Acknowledged",
            Self::IntegrityFailure => "Integrity/Cipher/MAC validation failed",
            Self::CounterLow => "Counter below threshold",
            Self::CounterHigh => "Counter exceeded maximum",
            Self::CounterBlocked => "Counter access restricted",
            Self::CipheringError => "Encryption issue detected",
            Self::UnidentifiedSecurityError => "Ambiguous security anomaly",
            Self::InsufficientMemory => "Memory allocation denied",
            Self::MoreTime => "Execution requires delay",
            Self::TarUnknown => "Target Application missing",
            Self::InsufficientSecurityLevel => "Security context insufficient",
            Self::ReplyViaSmsSubmit => "Expecting response via SMS-SUBMIT",
            Self::ReplyViaSsRequest => "Expecting response via SS-Request invoke",
            Self::Unknown(_) => "Unknown response status",
        }
    }

    /// Classify the code
    pub const fn classify(self) -> StatusClass {
        match self {
            Self::Acknowledged => StatusClass::Ok,
            Self::ReplyViaSmsSubmit | Self::ReplyViaSsRequest => {
                StatusClass::Informational(self.reason())
            }
            _ => StatusClass::Fatal(self.reason()),
        }
    }

    /// Fail on fatal codes, log informational ones
    pub fn check(self) -> Result<()> {
        match self.classify() {
            StatusClass::Ok => Ok(()),
            StatusClass::Informational(reason) => {
                warn!(code = self.code(), reason, "Informational response status");
                Ok(())
            }
            StatusClass::Fatal(reason) => Err(Error::ResponseStatus {
                code: self.code(),
                reason,
            }),
        }
    }
}

impl From<u8> for StatusCode {
    fn from(code: u8) -> Self {
        match code {
            0x00 => Self::Acknowledged,
            0x01 => Self::IntegrityFailure,
            0x02 => Self::CounterLow,
            0x03 => Self::CounterHigh,
            0x04 => Self::CounterBlocked,
            0x05 => Self::CipheringError,
            0x06 => Self::UnidentifiedSecurityError,
            0x07 => Self::InsufficientMemory,
            0x08 => Self::MoreTime,
            0x09 => Self::TarUnknown,
            0x0A => Self::InsufficientSecurityLevel,
            0x0B => Self::ReplyViaSmsSubmit,
            0x0C => Self::ReplyViaSsRequest,
            other => Self::Unknown(other),
        }
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:02X} ({})", self.code(), self.reason())
    }
}

/// Response packet header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResponsePacketHeader {
    /// RPL: length of everything after this field
    pub response_packet_length: u16,
    /// RHL: length of the header fields after this field
    pub response_header_length: u8,
    /// TAR of the responding application
    pub tar: Tar,
    /// CNTR
    pub counter: [u8; 5],
    /// PCNTR
    pub padding_count: u8,
    /// Response status code
    pub status: StatusCode,
}

impl ResponsePacketHeader {
    /// Read the header from the start of a response packet
    fn read(reader: &mut ByteReader<'_>) -> Result<Self> {
        const TRUNCATED: Error = Error::MalformedResponse("truncated response packet header");

        let response_packet_length = reader.read_u16().ok_or(TRUNCATED)?;
        let response_header_length = reader.read_u8().ok_or(TRUNCATED)?;
        if response_header_length < RESPONSE_HEADER_MIN_LEN {
            return Err(Error::MalformedResponse("response header too short"));
        }

        let mut fields = ByteReader::new(
            reader
                .take(response_header_length as usize)
                .ok_or(TRUNCATED)?,
        );
        Ok(Self {
            response_packet_length,
            response_header_length,
            tar: Tar::new(fields.read_array::<3>().ok_or(TRUNCATED)?),
            counter: fields.read_array::<5>().ok_or(TRUNCATED)?,
            padding_count: fields.read_u8().ok_or(TRUNCATED)?,
            status: StatusCode::from(fields.read_u8().ok_or(TRUNCATED)?),
        })
    }

    /// Whether a command counter and status word follow the header
    pub const fn has_status_word(&self) -> bool {
        self.response_packet_length > self.response_header_length as u16 + 1
    }
}

/// Decode state for one logical request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssemblyState {
    /// Response data collected so far
    pub accumulated_response: Vec<u8>,
    /// Status word of the last command executed by the card
    pub last_status_word: StatusWord,
    /// More fragments are expected
    pub awaiting_more: bool,
    /// Padding still to be removed once the current message is complete
    pending_padding: usize,
    /// Offset in `accumulated_response` where the current message's data starts
    message_start: usize,
}

impl Default for AssemblyState {
    fn default() -> Self {
        Self {
            accumulated_response: Vec::new(),
            last_status_word: status::SUCCESS,
            awaiting_more: false,
            pending_padding: 0,
            message_start: 0,
        }
    }
}

impl AssemblyState {
    /// Fresh state
    pub fn new() -> Self {
        Self::default()
    }
}

/// Concatenated short message position
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Concatenation {
    total: u8,
    sequence: u8,
}

/// Decode an SMS-SUBMIT TPDU carrying a PoR and fold it into `state`
///
/// A TPDU of another type is logged and ignored.
pub fn parse_response(raw_tpdu: &[u8], state: &mut AssemblyState) -> Result<()> {
    const TRUNCATED: Error = Error::MalformedResponse("truncated SMS-SUBMIT");

    let mut reader = ByteReader::new(raw_tpdu);
    let mti = reader.read_u8().ok_or(TRUNCATED)?;
    if mti != sms::SUBMIT_WITH_UDH {
        warn!(mti, "TPDU is not an SMS-SUBMIT with user data header, ignoring");
        if !state.awaiting_more {
            state.last_status_word = status::SUCCESS;
        }
        return Ok(());
    }

    let validity_period_len = match (mti >> 3) & 0x03 {
        0x00 => 0,
        0x02 => 1,
        _ => 7,
    };

    let _message_reference = reader.read_u8().ok_or(TRUNCATED)?;
    let address_digits = reader.read_u8().ok_or(TRUNCATED)? as usize;
    reader
        .skip(1 + address_digits.div_ceil(2))
        .ok_or(TRUNCATED)?;
    let _protocol_identifier = reader.read_u8().ok_or(TRUNCATED)?;
    let _data_coding_scheme = reader.read_u8().ok_or(TRUNCATED)?;
    reader.skip(validity_period_len).ok_or(TRUNCATED)?;

    let user_data_length = reader.read_u8().ok_or(TRUNCATED)?;
    let user_data = reader
        .take(user_data_length as usize)
        .ok_or(Error::MalformedResponse("truncated SMS-SUBMIT user data"))?;

    parse_user_data(user_data, state)
}

/// Decode PoR user data (UDH and response packet) and fold it into `state`
pub fn parse_user_data(user_data: &[u8], state: &mut AssemblyState) -> Result<()> {
    const TRUNCATED: Error = Error::MalformedResponse("truncated user data header");

    let mut reader = ByteReader::new(user_data);
    let udh_length = reader.read_u8().ok_or(TRUNCATED)?;
    let concatenation = parse_udh(reader.take(udh_length as usize).ok_or(TRUNCATED)?)?;

    let header = if !state.awaiting_more && udh_length != sms::MINIMAL_UDH_LENGTH {
        let header = ResponsePacketHeader::read(&mut reader)?;
        trace!(?header, "Response packet header");
        header.status.check()?;
        Some(header)
    } else {
        None
    };

    if header.is_some() {
        state.message_start = state.accumulated_response.len();
        state.pending_padding = 0;
    }
    match header {
        Some(header) if header.has_status_word() => {
            let _commands_executed = reader
                .read_u8()
                .ok_or(Error::MalformedResponse("missing command counter"))?;
            let sw = reader
                .read_array::<2>()
                .ok_or(Error::MalformedResponse("missing status word"))?;
            state.last_status_word = StatusWord::from(sw);
            state.pending_padding = header.padding_count as usize;
        }
        Some(_) => state.last_status_word = status::SUCCESS,
        None if !state.awaiting_more => state.last_status_word = status::SUCCESS,
        None => {}
    }

    let data = reader.rest();
    debug!(
        data = %hex_upper(data),
        sw = %state.last_status_word,
        ?concatenation,
        "Response fragment"
    );
    state.accumulated_response.extend_from_slice(data);

    let message_complete = concatenation.is_none_or(|c| c.sequence >= c.total);
    if message_complete && state.pending_padding > 0 {
        let message_len = state.accumulated_response.len() - state.message_start;
        if state.pending_padding > message_len {
            return Err(Error::MalformedResponse("padding longer than response data"));
        }
        state
            .accumulated_response
            .truncate(state.accumulated_response.len() - state.pending_padding);
        state.pending_padding = 0;
    }

    state.awaiting_more = !message_complete || state.last_status_word == status::MORE_DATA;
    Ok(())
}

/// Walk the information elements of a user data header
fn parse_udh(udh: &[u8]) -> Result<Option<Concatenation>> {
    const TRUNCATED: Error = Error::MalformedResponse("truncated information element");

    let mut reader = ByteReader::new(udh);
    let mut concatenation = None;
    while reader.remaining() > 0 {
        let iei = reader.read_u8().ok_or(TRUNCATED)?;
        let len = reader.read_u8().ok_or(TRUNCATED)?;
        let value = reader.take(len as usize).ok_or(TRUNCATED)?;
        match (iei, value) {
            (sms::IEI_CONCATENATED_8BIT, [_, total, sequence])
            | (sms::IEI_CONCATENATED_16BIT, [_, _, total, sequence]) => {
                concatenation = Some(Concatenation {
                    total: *total,
                    sequence: *sequence,
                });
            }
            _ => trace!(iei, "Skipping information element"),
        }
    }
    Ok(concatenation)
}

#[cfg(test)]
mod tests {
    use super::*;
    use hex_literal::hex;

    /// SMS-SUBMIT header up to TP-UDL: MTI, MR, DA (4 digits), PID, DCS
    const SUBMIT: [u8; 8] = hex!("41 00 04 81 2143 7F F6");

    fn submit(user_data: &[u8]) -> Vec<u8> {
        let mut tpdu = SUBMIT.to_vec();
        tpdu.push(user_data.len() as u8);
        tpdu.extend_from_slice(user_data);
        tpdu
    }

    #[test]
    fn test_status_code_classification() {
        assert_eq!(StatusCode::from(0x00).classify(), StatusClass::Ok);
        assert_eq!(
            StatusCode::from(0x0B).classify(),
            StatusClass::Informational("Expecting response via SMS-SUBMIT")
        );
        assert!(matches!(
            StatusCode::from(0x09).classify(),
            StatusClass::Fatal("Target Application missing")
        ));
        assert_eq!(StatusCode::from(0x42), StatusCode::Unknown(0x42));
        assert_eq!(StatusCode::from(0x42).reason(), "Unknown response status");
        assert_eq!(StatusCode::from(0x0A).code(), 0x0A);
    }

    #[test]
    fn test_por_with_status_word_and_data() {
        // UDH 71 00; RPL 0x10, RHL 0x0A, TAR, CNTR, PCNTR 0, status 0; 1 command; 9000; data
        let tpdu = submit(&hex!(
            "02 7100 0010 0A 000000 0000000000 00 00 01 9000 AABB"
        ));
        let mut state = AssemblyState::new();
        parse_response(&tpdu, &mut state).unwrap();

        assert_eq!(state.accumulated_response, hex!("AABB"));
        assert_eq!(state.last_status_word, status::SUCCESS);
        assert!(!state.awaiting_more);
    }

    #[test]
    fn test_por_header_without_status_word() {
        let tpdu = submit(&hex!("02 7100 000B 0A B00010 0000000000 00 00"));
        let mut state = AssemblyState::new();
        state.last_status_word = StatusWord::new(0x6A, 0x82);
        parse_response(&tpdu, &mut state).unwrap();

        assert!(state.accumulated_response.is_empty());
        assert_eq!(state.last_status_word, status::SUCCESS);
    }

    #[test]
    fn test_informational_status_is_not_an_error() {
        let tpdu = submit(&hex!("02 7100 000B 0A 000000 0000000000 00 0B"));
        let mut state = AssemblyState::new();
        assert!(parse_response(&tpdu, &mut state).is_ok());
    }

    #[test]
    fn test_fatal_status_carries_reason() {
        let tpdu = submit(&hex!("02 7100 000B 0A 000000 0000000000 00 02"));
        let mut state = AssemblyState::new();
        match parse_response(&tpdu, &mut state) {
            Err(Error::ResponseStatus { code, reason }) => {
                assert_eq!(code, 0x02);
                assert_eq!(reason, "Counter below threshold");
            }
            other => panic!("expected a response status error, got {other:?}"),
        }

        let tpdu = submit(&hex!("02 7100 000B 0A 000000 0000000000 00 3C"));
        assert!(matches!(
            parse_response(&tpdu, &mut AssemblyState::new()),
            Err(Error::ResponseStatus {
                code: 0x3C,
                reason: "Unknown response status"
            })
        ));
    }

    #[test]
    fn test_padding_is_trimmed() {
        let tpdu = submit(&hex!(
            "02 7100 0013 0A 000000 0000000000 03 00 01 9000 AABB 000000"
        ));
        let mut state = AssemblyState::new();
        parse_response(&tpdu, &mut state).unwrap();
        assert_eq!(state.accumulated_response, hex!("AABB"));
    }

    #[test]
    fn test_padding_needs_status_word() {
        // RPL 0x0B: header only, trailing bytes are kept as they are
        let tpdu = submit(&hex!("02 7100 000B 0A 000000 0000000000 03 00 AABBCC"));
        let mut state = AssemblyState::new();
        parse_response(&tpdu, &mut state).unwrap();
        assert_eq!(state.accumulated_response, hex!("AABBCC"));
    }

    #[test]
    fn test_padding_stays_within_message() {
        let mut state = AssemblyState::new();
        parse_response(
            &submit(&hex!("02 7100 0010 0A 000000 0000000000 00 00 01 9000 AABB")),
            &mut state,
        )
        .unwrap();

        // Three padding bytes claimed, one data byte in this message
        let tpdu = submit(&hex!("02 7100 000F 0A 000000 0000000000 03 00 01 9000 01"));
        assert!(matches!(
            parse_response(&tpdu, &mut state),
            Err(Error::MalformedResponse(_))
        ));
        assert_eq!(&state.accumulated_response[..2], hex!("AABB"));
    }

    #[test]
    fn test_more_data_sets_awaiting_more() {
        let tpdu = submit(&hex!(
            "02 7100 0010 0A 000000 0000000000 00 00 01 6310 0102"
        ));
        let mut state = AssemblyState::new();
        parse_response(&tpdu, &mut state).unwrap();
        assert!(state.awaiting_more);
        assert_eq!(state.last_status_word, status::MORE_DATA);
    }

    #[test]
    fn test_concatenated_more_data() {
        let mut state = AssemblyState::new();
        let first = submit(&hex!(
            "07 0003 2A 02 01 7100 0012 0A 000000 0000000000 00 00 01 6310 0102"
        ));
        parse_response(&first, &mut state).unwrap();
        assert!(state.awaiting_more);

        // The continuation carries no header and keeps the status word
        let second = submit(&hex!("05 0003 2A 02 02 0304"));
        parse_response(&second, &mut state).unwrap();
        assert_eq!(state.accumulated_response, hex!("01020304"));
        assert_eq!(state.last_status_word, status::MORE_DATA);
        assert!(state.awaiting_more);
    }

    #[test]
    fn test_odd_address_digits() {
        // Three digits occupy two bytes, the last nibble is filler
        let tpdu = hex!("41 07 03 91 214F 7F F6 0F 02 7100 000B 0A 000000 0000000000 00 00");
        let mut state = AssemblyState::new();
        parse_response(&tpdu, &mut state).unwrap();
        assert_eq!(state.last_status_word, status::SUCCESS);
        assert!(state.accumulated_response.is_empty());
    }

    #[test]
    fn test_unrecognized_tpdu_is_ignored() {
        let mut state = AssemblyState::new();
        state.last_status_word = StatusWord::new(0x6A, 0x88);
        parse_response(&hex!("00 0102"), &mut state).unwrap();
        assert!(state.accumulated_response.is_empty());
        assert_eq!(state.last_status_word, status::SUCCESS);
    }

    #[test]
    fn test_truncated_tpdu() {
        let mut state = AssemblyState::new();
        assert!(matches!(
            parse_response(&hex!("41 00 0A 81"), &mut state),
            Err(Error::MalformedResponse(_))
        ));
        assert!(matches!(
            parse_user_data(&hex!("02 7100 0010 05 0000"), &mut state),
            Err(Error::MalformedResponse("response header too short"))
        ));
    }

    #[test]
    fn test_direct_user_data() {
        let mut state = AssemblyState::new();
        parse_user_data(
            &hex!("02 7100 000F 0A B00011 0000000000 00 00 01 6A82 00"),
            &mut state,
        )
        .unwrap();
        assert_eq!(state.last_status_word, StatusWord::new(0x6A, 0x82));
        assert_eq!(state.accumulated_response, hex!("00"));
    }
}
