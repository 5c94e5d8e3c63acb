//! OTA session over a card transport
//!
//! One call to [`OtaTransport::send_packet`] is one logical request: the
//! command packet goes to the card in an ENVELOPE, and the proof of receipt
//! comes back either as ENVELOPE response data (after GET RESPONSE on
//! `9Exx`/`9Fxx`) or through SEND SHORT MESSAGE proactive commands fetched on
//! `91xx`.

use tracing::{debug, info, warn};

use crate::assembler::ProactiveResponseAssembler;
use crate::commands::{FetchCommand, GetResponseCommand, TerminalProfileCommand, TerminalResponseCommand};
use crate::constants::status;
use crate::envelope::SecureEnvelopeCodec;
use crate::proactive::ProactiveCommand;
use crate::transport::{CardTransport, StatusWord};
use crate::util::hex_upper;
use crate::{Channel, Error, OtaKeys, Result};

/// Upper bound on FETCH rounds for one request
pub const MAX_PROACTIVE_ROUNDS: usize = 16;

/// Outcome of one request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    /// Response data of the executed commands
    pub data: Vec<u8>,
    /// Status word of the last executed command
    pub status: StatusWord,
}

impl Reply {
    /// Empty reply with `9000`
    pub const fn success() -> Self {
        Self {
            data: Vec::new(),
            status: status::SUCCESS,
        }
    }

    /// Fail unless the status word is `expected`
    pub fn expect(self, expected: StatusWord) -> Result<Self> {
        if self.status != expected {
            return Err(Error::UnexpectedStatusWord {
                expected,
                actual: self.status,
            });
        }
        Ok(self)
    }
}

/// Something that delivers plaintext APDU scripts as secured command packets
pub trait OtaTransport {
    /// Secure `payload` for `channel`, deliver it and collect the reply
    fn send_packet(&mut self, channel: Channel, payload: &[u8]) -> Result<Reply>;

    /// Largest plaintext script one packet on `channel` can carry
    fn max_payload(&self, _channel: Channel) -> Result<usize> {
        Ok(usize::MAX)
    }
}

impl<T: OtaTransport + ?Sized> OtaTransport for &mut T {
    fn send_packet(&mut self, channel: Channel, payload: &[u8]) -> Result<Reply> {
        (**self).send_packet(channel, payload)
    }

    fn max_payload(&self, channel: Channel) -> Result<usize> {
        (**self).max_payload(channel)
    }
}

/// OTA session with a card
#[derive(Debug)]
pub struct OtaSession<T: CardTransport> {
    transport: T,
    keys: OtaKeys,
}

impl<T: CardTransport> OtaSession<T> {
    /// Create a session
    pub const fn new(transport: T, keys: OtaKeys) -> Self {
        Self { transport, keys }
    }

    /// Key material in use
    pub const fn keys(&self) -> &OtaKeys {
        &self.keys
    }

    /// Underlying transport
    pub const fn transport(&self) -> &T {
        &self.transport
    }

    /// Underlying transport, mutably
    pub const fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Give back the transport
    pub fn into_inner(self) -> T {
        self.transport
    }

    /// Send the terminal profile, answering any proactive command it triggers
    pub fn send_terminal_profile(&mut self) -> Result<StatusWord> {
        let (_, sw) = self
            .transport
            .exchange(&TerminalProfileCommand::default().to_bytes()?)?;
        let mut assembler = ProactiveResponseAssembler::new();
        let sw = self.drain_proactive(sw, &mut assembler)?;
        debug!(%sw, "Terminal profile sent");
        Ok(sw)
    }

    /// FETCH and answer proactive commands while the card has any pending
    fn drain_proactive(
        &mut self,
        mut sw: StatusWord,
        assembler: &mut ProactiveResponseAssembler,
    ) -> Result<StatusWord> {
        let mut rounds = 0;
        while sw.sw1() == status::PROACTIVE_COMMAND_PENDING {
            if rounds == MAX_PROACTIVE_ROUNDS {
                return Err(Error::TooManyProactiveCommands(MAX_PROACTIVE_ROUNDS));
            }
            rounds += 1;

            let fetched = self
                .transport
                .check(&FetchCommand::with_length(sw.sw2()).to_bytes()?)?;
            let command = ProactiveCommand::decode(&fetched)?;
            if let ProactiveCommand::SendShortMessage { tpdu, .. } = &command {
                assembler.push_tpdu(tpdu)?;
            }

            let response = TerminalResponseCommand::with_data(command.terminal_response()?);
            (_, sw) = self.transport.exchange(&response.to_bytes()?)?;
        }
        Ok(sw)
    }
}

impl<T: CardTransport> OtaTransport for OtaSession<T> {
    fn send_packet(&mut self, channel: Channel, payload: &[u8]) -> Result<Reply> {
        let header = channel.header(&self.keys)?;
        let envelope = SecureEnvelopeCodec::build(&header, payload, &self.keys)?;
        debug!(%channel, payload = %hex_upper(payload), "Sending command packet");

        let (mut data, mut sw) = self.transport.exchange(&envelope.to_apdu()?)?;
        if matches!(
            sw.sw1(),
            status::DOWNLOAD_ERROR | status::RESPONSE_AVAILABLE
        ) {
            // The PoR may come with a proactive command already pending
            (data, sw) = self
                .transport
                .exchange(&GetResponseCommand::sim(sw.sw2()).to_bytes()?)?;
        }

        let mut assembler = ProactiveResponseAssembler::new();
        if !data.is_empty() {
            assembler.push_user_data(&data)?;
        }
        let sw = self.drain_proactive(sw, &mut assembler)?;

        if !assembler.has_fragments() {
            return Ok(Reply {
                data: Vec::new(),
                status: sw,
            });
        }
        if !sw.is_success() {
            warn!(%sw, "Card reported an error after the proof of receipt");
        }
        let (data, status) = assembler.finish();
        Ok(Reply { data, status })
    }

    fn max_payload(&self, channel: Channel) -> Result<usize> {
        let header = channel.header(&self.keys)?;
        Ok(SecureEnvelopeCodec::max_envelope_payload(&header))
    }
}

/// Collects secured user data for submission through an SMSC instead of
/// sending it to a card
///
/// Every request is answered with an empty `9000` reply.
#[derive(Debug, Default)]
pub struct SmppCollector {
    keys: OtaKeys,
    messages: Vec<Vec<u8>>,
}

impl SmppCollector {
    /// Create a collector
    pub const fn new(keys: OtaKeys) -> Self {
        Self {
            keys,
            messages: Vec::new(),
        }
    }

    /// User data of each request, in order
    pub fn messages(&self) -> &[Vec<u8>] {
        &self.messages
    }
}

impl OtaTransport for SmppCollector {
    fn send_packet(&mut self, channel: Channel, payload: &[u8]) -> Result<Reply> {
        let header = channel.header(&self.keys)?;
        let user_data = SecureEnvelopeCodec::secured_user_data(&header, payload, &self.keys)?;
        info!(%channel, user_data = %hex_upper(&user_data), "SMPP");
        self.messages.push(user_data);
        Ok(Reply::success())
    }

    fn max_payload(&self, channel: Channel) -> Result<usize> {
        let header = channel.header(&self.keys)?;
        Ok(SecureEnvelopeCodec::max_user_data_payload(&header))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::TransportError;
    use bytes::Bytes;
    use hex_literal::hex;
    use std::collections::VecDeque;

    /// Replays canned responses and records commands
    #[derive(Debug, Default)]
    struct Script {
        responses: VecDeque<Bytes>,
        sent: Vec<Vec<u8>>,
    }

    impl Script {
        fn new<const N: usize>(responses: [&[u8]; N]) -> Self {
            Self {
                responses: responses.iter().map(|r| Bytes::copy_from_slice(r)).collect(),
                sent: Vec::new(),
            }
        }
    }

    impl CardTransport for Script {
        fn transmit_raw(&mut self, command: &[u8]) -> std::result::Result<Bytes, TransportError> {
            self.sent.push(command.to_vec());
            self.responses.pop_front().ok_or(TransportError::NoCard)
        }
    }

    const POR_USER_DATA: [u8; 21] = hex!("02 7100 0010 0A 000000 0000000000 00 00 01 9000 AABB");

    #[test]
    fn test_bare_success() {
        let mut session = OtaSession::new(Script::new([&hex!("9000")]), OtaKeys::none());
        let reply = session.send_packet(Channel::Ram, &hex!("00C0000000")).unwrap();
        assert_eq!(reply, Reply::success());
        assert_eq!(session.transport().sent.len(), 1);
        assert_eq!(&session.transport().sent[0][..2], &hex!("A0C2"));
    }

    #[test]
    fn test_other_status_is_returned() {
        let mut session = OtaSession::new(Script::new([&hex!("6F00")]), OtaKeys::none());
        let reply = session.send_packet(Channel::Ram, &[]).unwrap();
        assert_eq!(reply.status, StatusWord::new(0x6F, 0x00));
        assert!(reply.expect(status::SUCCESS).is_err());
    }

    #[test]
    fn test_get_response_on_9f() {
        let mut response = POR_USER_DATA.to_vec();
        response.extend(hex!("9000"));
        let mut session = OtaSession::new(
            Script::new([&hex!("9F13"), &response[..]]),
            OtaKeys::none(),
        );

        let reply = session.send_packet(Channel::Ram, &[]).unwrap();
        assert_eq!(reply.data, hex!("AABB"));
        assert_eq!(reply.status, status::SUCCESS);
        assert_eq!(session.transport().sent[1], hex!("A0C0000013"));
    }

    #[test]
    fn test_get_response_with_pending_proactive_command() {
        let mut response = POR_USER_DATA.to_vec();
        response.extend(hex!("910B"));
        let mut session = OtaSession::new(
            Script::new([
                &hex!("9F13"),
                &response[..],
                &hex!("D0 09 8103012100 82028102 9000"),
                &hex!("9000"),
            ]),
            OtaKeys::none(),
        );

        let reply = session.send_packet(Channel::Ram, &[]).unwrap();
        assert_eq!(reply.data, hex!("AABB"));
        assert_eq!(reply.status, status::SUCCESS);

        let sent = &session.transport().sent;
        assert_eq!(sent.len(), 4);
        assert_eq!(sent[2], hex!("A01200000B"));
        assert_eq!(sent[3], hex!("A01400000C 810301210082028281830130"));
    }

    #[test]
    fn test_fetch_send_short_message() {
        // SEND SHORT MESSAGE carrying an SMS-SUBMIT with the PoR
        let mut tpdu = hex!("41 00 04 81 2143 7F F6").to_vec();
        tpdu.push(POR_USER_DATA.len() as u8);
        tpdu.extend(POR_USER_DATA);
        let mut fetched = hex!("D0 00 81030113 00 82028183 8B").to_vec();
        fetched.push(tpdu.len() as u8);
        fetched.extend(&tpdu);
        fetched[1] = (fetched.len() - 2) as u8;
        fetched.extend(hex!("9000"));

        let mut session = OtaSession::new(
            Script::new([&hex!("9127"), &fetched, &hex!("9000")]),
            OtaKeys::none(),
        );
        let reply = session.send_packet(Channel::Ram, &[]).unwrap();
        assert_eq!(reply.data, hex!("AABB"));

        let sent = &session.transport().sent;
        assert_eq!(sent[1], hex!("A012000027"));
        assert_eq!(sent[2], hex!("A01400000C 810301130082028281830130"));
    }

    #[test]
    fn test_too_many_proactive_commands() {
        const PENDING: [u8; 2] = hex!("910B");
        const DISPLAY_TEXT: [u8; 13] = hex!("D0 09 8103012100 82028102 9000");

        let mut responses = VecDeque::from([Bytes::from_static(&PENDING)]);
        for _ in 0..MAX_PROACTIVE_ROUNDS {
            responses.push_back(Bytes::from_static(&DISPLAY_TEXT));
            responses.push_back(Bytes::from_static(&PENDING));
        }
        let script = Script {
            responses,
            sent: Vec::new(),
        };

        let mut session = OtaSession::new(script, OtaKeys::none());
        assert!(matches!(
            session.send_packet(Channel::Ram, &[]),
            Err(Error::TooManyProactiveCommands(MAX_PROACTIVE_ROUNDS))
        ));
        // Envelope, then a FETCH and a TERMINAL RESPONSE per round
        assert_eq!(session.transport().sent.len(), 1 + 2 * MAX_PROACTIVE_ROUNDS);
    }

    #[test]
    fn test_terminal_profile() {
        let mut session = OtaSession::new(
            Script::new([&hex!("910B"), &hex!("D0 09 8103012500 82028182 9000"), &hex!("9000")]),
            OtaKeys::none(),
        );
        assert_eq!(session.send_terminal_profile().unwrap(), status::SUCCESS);

        let sent = &session.transport().sent;
        assert_eq!(sent[0], hex!("A010000011FFFF000000000000000000000000000000"));
        assert_eq!(sent[1], hex!("A01200000B"));
        assert_eq!(sent[2], hex!("A01400000C 810301250082028281830130"));
    }

    #[test]
    fn test_max_payload_follows_channel_security() {
        const KEY: [u8; 16] = hex!("404142434445464748494A4B4C4D4E4F");
        let keys = OtaKeys::new(Some(&KEY), Some(&KEY)).unwrap();

        let plain = OtaSession::new(Script::default(), OtaKeys::none());
        let secured = OtaSession::new(Script::default(), keys.clone());
        assert_eq!(plain.max_payload(Channel::Ram).unwrap(), 209);
        assert_eq!(secured.max_payload(Channel::Ram).unwrap(), 194);

        // No ENVELOPE around SMPP user data
        let smpp = SmppCollector::new(keys);
        assert!(smpp.max_payload(Channel::Ram).unwrap() > 194);
    }

    #[test]
    fn test_smpp_collector() {
        let mut smpp = SmppCollector::new(OtaKeys::none());
        let reply = smpp.send_packet(Channel::Ram, &hex!("80F28000024F00")).unwrap();
        assert_eq!(reply, Reply::success());
        assert_eq!(smpp.messages().len(), 1);
        assert_eq!(&smpp.messages()[0][..3], &hex!("027000"));
    }
}
