//! Secured command packets and the SMS-PP download envelope
//!
//! [`SecureEnvelopeCodec::build`] turns a plaintext APDU script into an
//! ETSI TS 102 225 command packet, wraps it as the user data of an
//! SMS-DELIVER and puts that into an SMS-PP download envelope (`D1`).
//! [`SecureEnvelopeCodec::open`] does the reverse, the way the card does it,
//! verifying the signature on the way.

use bytes::{BufMut, BytesMut};
use iso7816_tlv::ber::{Tag, Tlv, Value};
use tracing::debug;

use crate::commands::toolkit::EnvelopeCommand;
use crate::constants::{sms, toolkit};
use crate::crypto;
use crate::header::{CommandHeader, HEADER_LEN, SecurityLevel};
use crate::util::{ByteReader, hex_upper};
use crate::{Error, OtaKeys, Result, tlv};

/// Length of CNTR plus PCNTR
pub const COUNTER_LEN: usize = 6;

/// Secured-packet UDH: UDHL `02`, IEI `70` (command packet), IEDL `00`
const SECURED_PACKET_UDH: [u8; 3] = [0x02, sms::IEI_COMMAND_PACKET, 0x00];

/// Device identities: network to UICC
const DEVICE_IDENTITIES: [u8; 4] = [
    toolkit::DEVICE_IDENTITIES,
    0x02,
    toolkit::DEVICE_NETWORK,
    toolkit::DEVICE_UICC,
];

/// Anti-replay counter and padding count
///
/// The counter is never tracked and is always sent as zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Counter {
    /// CNTR
    pub value: [u8; 5],
    /// PCNTR: number of padding bytes appended to the payload
    pub padding_count: u8,
}

impl Counter {
    /// Zero counter with the given padding count
    pub const fn zero(padding_count: u8) -> Self {
        Self {
            value: [0; 5],
            padding_count,
        }
    }

    /// CNTR followed by PCNTR
    pub const fn to_bytes(self) -> [u8; COUNTER_LEN] {
        let [a, b, c, d, e] = self.value;
        [a, b, c, d, e, self.padding_count]
    }
}

/// A command packet before ciphering
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandPacket {
    /// Unciphered header
    pub header: CommandHeader,
    /// Counter and padding count
    pub counter: Counter,
    /// RC or CC, empty without integrity protection
    pub signature: Vec<u8>,
    /// Payload including cipher padding
    pub payload: Vec<u8>,
}

impl CommandPacket {
    /// Command packet length (CPL): header, counter, signature and payload
    pub fn length(&self) -> usize {
        HEADER_LEN + COUNTER_LEN + self.signature.len() + self.payload.len()
    }

    /// The part of the packet that gets ciphered: counter, signature, payload
    pub fn body(&self) -> Vec<u8> {
        let mut body = Vec::with_capacity(COUNTER_LEN + self.signature.len() + self.payload.len());
        body.extend_from_slice(&self.counter.to_bytes());
        body.extend_from_slice(&self.signature);
        body.extend_from_slice(&self.payload);
        body
    }

    /// Payload with the cipher padding removed
    pub fn plaintext(&self) -> &[u8] {
        let end = self
            .payload
            .len()
            .saturating_sub(self.counter.padding_count as usize);
        &self.payload[..end]
    }
}

/// A fully secured command packet wrapped for SMS-PP download
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OtaEnvelope {
    packet: CommandPacket,
    user_data: Vec<u8>,
    bytes: Vec<u8>,
}

impl OtaEnvelope {
    /// The command packet before ciphering
    pub const fn packet(&self) -> &CommandPacket {
        &self.packet
    }

    /// SMS user data: secured-packet UDH, CPL, header and (ciphered) body
    ///
    /// This is what an SMSC submission carries.
    pub fn secured_user_data(&self) -> &[u8] {
        &self.user_data
    }

    /// The encoded `D1` SMS-PP download TLV
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// The ENVELOPE APDU carrying this download
    pub fn to_apdu(&self) -> Result<Vec<u8>> {
        Ok(EnvelopeCommand::sms_pp_download(self.bytes.clone())
            .to_bytes()?
            .to_vec())
    }
}

/// Encoder and card-side decoder for secured command packets
#[derive(Debug, Clone, Copy, Default)]
pub struct SecureEnvelopeCodec;

impl SecureEnvelopeCodec {
    /// Secure `payload` under `header` and wrap it in an SMS-PP download envelope
    pub fn build(header: &CommandHeader, payload: &[u8], keys: &OtaKeys) -> Result<OtaEnvelope> {
        // Keys are checked up front so nothing is half built
        let kic = if header.cipher_on {
            Some(
                keys.kic()
                    .ok_or_else(|| Error::config("ciphering requested but no KIc configured"))?,
            )
        } else {
            None
        };
        let kid = match header.security_level {
            SecurityLevel::CryptographicChecksum => Some(keys.kid().ok_or_else(|| {
                Error::config("cryptographic checksum requested but no KID configured")
            })?),
            _ => None,
        };

        let signature_len = header.signature_len();
        let mut payload = payload.to_vec();
        let padding = if header.cipher_on {
            crypto::padding_for(COUNTER_LEN + signature_len + payload.len())
        } else {
            0
        };
        payload.resize(payload.len() + padding, 0);

        let mut packet = CommandPacket {
            header: *header,
            counter: Counter::zero(padding as u8),
            signature: Vec::new(),
            payload,
        };

        let cpl_len = packet.length() + signature_len;
        let cpl = u16::try_from(cpl_len).map_err(|_| Error::PayloadTooLarge {
            what: "Command packet",
            len: cpl_len,
            max: u16::MAX as usize,
        })?;

        packet.signature = Self::sign(&packet, cpl, kid)?;
        debug_assert_eq!(packet.length(), cpl as usize);

        let mut secured = packet.header.to_bytes().to_vec();
        let mut body = packet.body();
        if let Some(kic) = kic {
            crypto::encrypt_cbc(kic, &mut body)?;
        }
        secured.extend_from_slice(&body);

        let mut user_data = BytesMut::with_capacity(SECURED_PACKET_UDH.len() + 2 + secured.len());
        user_data.put_slice(&SECURED_PACKET_UDH);
        user_data.put_u16(cpl);
        user_data.put_slice(&secured);
        let user_data = user_data.to_vec();

        let udl = u8::try_from(user_data.len()).map_err(|_| Error::PayloadTooLarge {
            what: "SMS user data",
            len: user_data.len(),
            max: u8::MAX as usize,
        })?;

        let mut tpdu = Vec::with_capacity(sms::DELIVER_HEADER.len() + 1 + user_data.len());
        tpdu.extend_from_slice(&sms::DELIVER_HEADER);
        tpdu.push(udl);
        tpdu.extend_from_slice(&user_data);

        let mut download = DEVICE_IDENTITIES.to_vec();
        download.extend_from_slice(&tlv::wrap(&[toolkit::SMS_TPDU], &tpdu));
        let bytes = tlv::wrap(&[toolkit::SMS_PP_DOWNLOAD], &download);

        debug!(
            tar = %header.tar,
            spi = %hex_upper(&[header.minimum_security_level]),
            cpl,
            padding,
            "Built command packet"
        );

        Ok(OtaEnvelope {
            packet,
            user_data,
            bytes,
        })
    }

    /// Secure `payload` and return only the SMS user data
    pub fn secured_user_data(
        header: &CommandHeader,
        payload: &[u8],
        keys: &OtaKeys,
    ) -> Result<Vec<u8>> {
        Ok(Self::build(header, payload, keys)?.user_data)
    }

    /// Largest plaintext payload whose user data fits one SMS-DELIVER
    pub fn max_user_data_payload(header: &CommandHeader) -> usize {
        Self::max_payload_where(header, |user_data, _| user_data <= u8::MAX as usize)
    }

    /// Largest plaintext payload whose ENVELOPE still has a one-byte Lc
    pub fn max_envelope_payload(header: &CommandHeader) -> usize {
        Self::max_payload_where(header, |user_data, download| {
            user_data <= u8::MAX as usize && download <= u8::MAX as usize
        })
    }

    fn max_payload_where(header: &CommandHeader, fits: impl Fn(usize, usize) -> bool) -> usize {
        (0..=u8::MAX as usize)
            .rev()
            .find(|&len| {
                let (user_data, download) = Self::encoded_lengths(header, len);
                fits(user_data, download)
            })
            .unwrap_or(0)
    }

    /// Lengths of the user data and of the `D1` download for a payload of
    /// `payload_len` bytes, without building either
    fn encoded_lengths(header: &CommandHeader, payload_len: usize) -> (usize, usize) {
        let mut body = COUNTER_LEN + header.signature_len() + payload_len;
        if header.cipher_on {
            body += crypto::padding_for(body);
        }
        let user_data = SECURED_PACKET_UDH.len() + 2 + HEADER_LEN + body;
        let tpdu = sms::DELIVER_HEADER.len() + 1 + user_data;
        let sms_tpdu = 1 + tlv::encode_length(tpdu).len() + tpdu;
        let download = DEVICE_IDENTITIES.len() + sms_tpdu;
        (user_data, 1 + tlv::encode_length(download).len() + download)
    }

    /// Compute the signature of a packet whose signature field is still empty
    ///
    /// The checksum covers CPL, header, counter and payload; the redundancy
    /// check covers the same data without CPL.
    fn sign(packet: &CommandPacket, cpl: u16, kid: Option<&[u8]>) -> Result<Vec<u8>> {
        let header = packet.header.to_bytes();
        let counter = packet.counter.to_bytes();

        let mut input = Vec::with_capacity(2 + HEADER_LEN + COUNTER_LEN + packet.payload.len());
        match packet.header.security_level {
            SecurityLevel::None => return Ok(Vec::new()),
            SecurityLevel::RedundancyCheck => {}
            SecurityLevel::CryptographicChecksum => input.extend_from_slice(&cpl.to_be_bytes()),
        }
        input.extend_from_slice(&header);
        input.extend_from_slice(&counter);
        input.extend_from_slice(&packet.payload);

        match (packet.header.security_level, kid) {
            (SecurityLevel::CryptographicChecksum, Some(kid)) => {
                Ok(crypto::cryptographic_checksum(kid, &input)?.to_vec())
            }
            (SecurityLevel::CryptographicChecksum, None) => Err(Error::config(
                "cryptographic checksum requested but no KID configured",
            )),
            _ => Ok(crypto::redundancy_check(&input).to_vec()),
        }
    }

    /// Open secured user data (`02 70 00` CPL header body) as the card would
    ///
    /// Deciphers the body, checks the signature and returns the packet.
    pub fn open(user_data: &[u8], keys: &OtaKeys) -> Result<CommandPacket> {
        const TRUNCATED: Error = Error::MalformedResponse("truncated command packet");

        let mut reader = ByteReader::new(user_data);
        let udh = reader.read_array::<3>().ok_or(TRUNCATED)?;
        if udh != SECURED_PACKET_UDH {
            return Err(Error::MalformedResponse("not a secured command packet"));
        }
        let cpl = reader.read_u16().ok_or(TRUNCATED)?;
        let secured = reader.take(cpl as usize).ok_or(TRUNCATED)?;

        let (header, header_len) = CommandHeader::parse(secured)?;
        let mut body = secured[header_len..].to_vec();
        if header.cipher_on {
            let kic = keys
                .kic()
                .ok_or_else(|| Error::config("ciphered packet but no KIc configured"))?;
            crypto::decrypt_cbc(kic, &mut body)?;
        }

        let mut reader = ByteReader::new(&body);
        let counter = Counter {
            value: reader.read_array::<5>().ok_or(TRUNCATED)?,
            padding_count: reader.read_u8().ok_or(TRUNCATED)?,
        };
        let signature = reader
            .take(header.signature_len())
            .ok_or(TRUNCATED)?
            .to_vec();

        let mut packet = CommandPacket {
            header,
            counter,
            signature: Vec::new(),
            payload: reader.rest().to_vec(),
        };

        let kid = match header.security_level {
            SecurityLevel::CryptographicChecksum => Some(keys.kid().ok_or_else(|| {
                Error::config("checksummed packet but no KID configured")
            })?),
            _ => None,
        };
        if Self::sign(&packet, cpl, kid)? != signature {
            return Err(Error::IntegrityCheck("command packet signature mismatch"));
        }
        packet.signature = signature;

        debug!(tar = %header.tar, payload = %hex_upper(packet.plaintext()), "Opened command packet");
        Ok(packet)
    }

    /// Extract the secured user data from an SMS-PP download TLV
    pub fn unwrap_download(download: &[u8]) -> Result<Vec<u8>> {
        let download = Tlv::from_bytes(download)?;
        if download.tag() != &Tag::try_from(toolkit::SMS_PP_DOWNLOAD)? {
            return Err(Error::MalformedResponse("not an SMS-PP download"));
        }
        let Value::Constructed(objects) = download.value() else {
            return Err(Error::MalformedResponse("SMS-PP download is not constructed"));
        };

        let identities = Tag::try_from(toolkit::DEVICE_IDENTITIES)?;
        match objects.iter().find(|tlv| tlv.tag() == &identities).map(Tlv::value) {
            Some(Value::Primitive(value)) if value[..] == DEVICE_IDENTITIES[2..] => {}
            _ => return Err(Error::MalformedResponse("unexpected device identities")),
        }

        let tpdu_tag = Tag::try_from(toolkit::SMS_TPDU)?;
        let Some(Value::Primitive(tpdu)) = objects
            .iter()
            .find(|tlv| tlv.tag() == &tpdu_tag)
            .map(Tlv::value)
        else {
            return Err(Error::MalformedResponse("missing SMS TPDU"));
        };

        let mut reader = ByteReader::new(tpdu);
        reader
            .skip(sms::DELIVER_HEADER.len())
            .ok_or(Error::MalformedResponse("truncated SMS-DELIVER"))?;
        let udl = reader
            .read_u8()
            .ok_or(Error::MalformedResponse("truncated SMS-DELIVER"))?;
        Ok(reader
            .take(udl as usize)
            .ok_or(Error::MalformedResponse("truncated SMS user data"))?
            .to_vec())
    }
}
