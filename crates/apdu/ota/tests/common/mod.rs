//! Simulated SIM card for integration tests

#![allow(dead_code, unreachable_pub)]

use std::collections::VecDeque;

use bytes::Bytes;
use nexum_apdu_ota::transport::TransportError;
use nexum_apdu_ota::{CardTransport, OtaKeys, SecureEnvelopeCodec, Tar, tlv};

/// How the card returns the proof of receipt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PorDelivery {
    /// `9Fxx` after the ENVELOPE, PoR in the GET RESPONSE data
    GetResponse,
    /// `91xx` after the ENVELOPE, PoR in a SEND SHORT MESSAGE
    SendShortMessage,
}

/// What the card answers to one command packet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CardReply {
    /// Response status code of the response packet
    pub status_code: u8,
    /// Status word of the last command in the packet
    pub sw: [u8; 2],
    /// Response data of the last command
    pub data: Vec<u8>,
}

impl CardReply {
    pub fn ok() -> Self {
        Self::with_sw(&[], [0x90, 0x00])
    }

    pub fn with_sw(data: &[u8], sw: [u8; 2]) -> Self {
        Self {
            status_code: 0x00,
            sw,
            data: data.to_vec(),
        }
    }

    pub fn status(status_code: u8) -> Self {
        Self {
            status_code,
            ..Self::ok()
        }
    }
}

/// A card that opens command packets, records their plaintext and answers
/// from a queue of replies (`9000` with no data once the queue is empty)
#[derive(Debug)]
pub struct SimulatedCard {
    keys: OtaKeys,
    delivery: PorDelivery,
    replies: VecDeque<CardReply>,
    pending: Option<Vec<u8>>,
    /// Plaintext APDU script of every command packet received
    pub scripts: Vec<Vec<u8>>,
    /// TAR of every command packet received
    pub tars: Vec<Tar>,
    /// Every raw APDU received
    pub apdus: Vec<Vec<u8>>,
}

impl SimulatedCard {
    pub fn new(keys: OtaKeys, delivery: PorDelivery) -> Self {
        Self {
            keys,
            delivery,
            replies: VecDeque::new(),
            pending: None,
            scripts: Vec::new(),
            tars: Vec::new(),
            apdus: Vec::new(),
        }
    }

    pub fn with_replies(mut self, replies: impl IntoIterator<Item = CardReply>) -> Self {
        self.replies.extend(replies);
        self
    }

    fn envelope(&mut self, download: &[u8]) -> Result<Vec<u8>, TransportError> {
        let user_data = SecureEnvelopeCodec::unwrap_download(download).map_err(device)?;
        let packet = SecureEnvelopeCodec::open(&user_data, &self.keys).map_err(device)?;
        self.scripts.push(packet.plaintext().to_vec());
        self.tars.push(packet.header.tar);

        let reply = self.replies.pop_front().unwrap_or_else(CardReply::ok);
        let por = proof_of_receipt(packet.header.tar, &reply);

        let (pending, sw1) = match self.delivery {
            PorDelivery::GetResponse => (por, 0x9F),
            PorDelivery::SendShortMessage => (send_short_message(&por), 0x91),
        };
        let sw2 = pending.len() as u8;
        self.pending = Some(pending);
        Ok(vec![sw1, sw2])
    }

    fn take_pending(&mut self) -> Vec<u8> {
        let mut response = self.pending.take().unwrap_or_default();
        response.extend_from_slice(&[0x90, 0x00]);
        response
    }
}

impl CardTransport for SimulatedCard {
    fn transmit_raw(&mut self, command: &[u8]) -> Result<Bytes, TransportError> {
        self.apdus.push(command.to_vec());
        let data = command.get(5..).unwrap_or_default();
        let response = match command.get(..2) {
            // ENVELOPE, without the trailing Le
            Some([0xA0, 0xC2]) => self.envelope(&data[..data.len().saturating_sub(1)])?,
            // GET RESPONSE or FETCH
            Some([0xA0, 0xC0]) | Some([0xA0, 0x12]) => self.take_pending(),
            // TERMINAL PROFILE or TERMINAL RESPONSE
            Some([0xA0, 0x10]) | Some([0xA0, 0x14]) => vec![0x90, 0x00],
            _ => vec![0x6D, 0x00],
        };
        Ok(Bytes::from(response))
    }
}

fn device(e: nexum_apdu_ota::Error) -> TransportError {
    TransportError::Device(e.to_string())
}

/// PoR user data: UDH `02 71 00`, response packet with status word and data
pub fn proof_of_receipt(tar: Tar, reply: &CardReply) -> Vec<u8> {
    let rpl = (1 + 10 + 1 + 2 + reply.data.len()) as u16;

    let mut user_data = vec![0x02, 0x71, 0x00];
    user_data.extend_from_slice(&rpl.to_be_bytes());
    user_data.push(0x0A);
    user_data.extend_from_slice(&tar.to_bytes());
    user_data.extend_from_slice(&[0x00; 5]);
    user_data.push(0x00);
    user_data.push(reply.status_code);
    user_data.push(0x01);
    user_data.extend_from_slice(&reply.sw);
    user_data.extend_from_slice(&reply.data);
    user_data
}

/// SEND SHORT MESSAGE proactive command carrying `user_data` in an SMS-SUBMIT
pub fn send_short_message(user_data: &[u8]) -> Vec<u8> {
    let mut tpdu = vec![0x41, 0x00, 0x04, 0x81, 0x21, 0x43, 0x7F, 0xF6];
    tpdu.push(user_data.len() as u8);
    tpdu.extend_from_slice(user_data);

    let mut value = vec![0x81, 0x03, 0x01, 0x13, 0x00, 0x82, 0x02, 0x81, 0x83];
    value.extend(tlv::wrap(&[0x8B], &tpdu));
    tlv::wrap(&[0xD0], &value)
}

/// Header component of a package with AID `A000000003`
pub const HEADER: [u8; 20] = [
    0x01, 0x00, 0x11, 0xDE, 0xCA, 0xFF, 0xED, 0x01, 0x02, 0x04, 0x01, 0x00, 0x05, 0xA0, 0x00,
    0x00, 0x00, 0x03, 0x01, 0x02,
];

/// A load file of `len` bytes starting with [`HEADER`]
pub fn load_file(len: usize) -> Vec<u8> {
    let mut load_file = HEADER.to_vec();
    load_file.resize(len, 0x5A);
    load_file
}
