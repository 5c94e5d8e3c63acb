//! Command packet header (ETSI TS 102 225 §5.1)
//!
//! The header is the unciphered part of a command packet: CHL, the two SPI
//! bytes, the KIc and KID algorithm bytes and the TAR.

use std::fmt;

use derive_more::{AsRef, Deref, From};

use crate::constants::{ALGORITHM_TDES_2KEY, SPI_POR_REQUIRED};
use crate::util::ByteReader;
use crate::{Error, Result};

/// Length of the encoded header: CHL, SPI(2), KIc, KID, TAR(3)
pub const HEADER_LEN: usize = 8;

/// Header length (CHL) without the signature: SPI(2) KIc KID TAR(3) CNTR(5) PCNTR
const CHL_BASE: u8 = 0x0D;

/// Integrity protection applied to a command packet
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SecurityLevel {
    /// No redundancy check, checksum or signature
    #[default]
    None,
    /// CRC-32 redundancy check
    RedundancyCheck,
    /// Triple-DES CBC cryptographic checksum
    CryptographicChecksum,
}

impl SecurityLevel {
    /// Length of the signature field for this level
    pub const fn signature_len(self) -> usize {
        match self {
            Self::None => 0,
            Self::RedundancyCheck => 4,
            Self::CryptographicChecksum => 8,
        }
    }
}

/// First SPI byte
///
/// Bits 0-1 select the [`SecurityLevel`], bit 2 turns ciphering on. The
/// remaining bits are carried through untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Spi(u8);

impl Spi {
    const LEVEL_MASK: u8 = 0b0000_0011;
    const CIPHER_BIT: u8 = 0b0000_0100;

    /// Decode an SPI byte, rejecting the reserved security level `11`
    pub fn new(byte: u8) -> Result<Self> {
        if byte & Self::LEVEL_MASK == Self::LEVEL_MASK {
            return Err(Error::config(format!(
                "reserved security level in SPI byte {byte:02X}"
            )));
        }
        Ok(Self(byte))
    }

    /// Build an SPI from its parts
    pub const fn from_parts(level: SecurityLevel, cipher_on: bool) -> Self {
        let level = match level {
            SecurityLevel::None => 0b00,
            SecurityLevel::RedundancyCheck => 0b01,
            SecurityLevel::CryptographicChecksum => 0b10,
        };
        Self(level | if cipher_on { Self::CIPHER_BIT } else { 0 })
    }

    /// Raw SPI byte
    pub const fn byte(self) -> u8 {
        self.0
    }

    /// Security level selected by bits 0-1
    pub const fn security_level(self) -> SecurityLevel {
        match self.0 & Self::LEVEL_MASK {
            0b01 => SecurityLevel::RedundancyCheck,
            0b10 => SecurityLevel::CryptographicChecksum,
            _ => SecurityLevel::None,
        }
    }

    /// Whether bit 2 requests ciphering
    pub const fn cipher_on(self) -> bool {
        self.0 & Self::CIPHER_BIT != 0
    }

    /// Both SPI bytes as transmitted: this byte followed by "PoR required"
    pub const fn to_bytes(self) -> [u8; 2] {
        [self.0, SPI_POR_REQUIRED]
    }
}

/// On-card keyset index (0-15) used for KIc or KID
///
/// Index 0 means no keyset and encodes as algorithm byte `00`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct KeysetReference(u8);

impl KeysetReference {
    /// No keyset
    pub const NONE: Self = Self(0);

    /// Create a keyset reference, failing for indices above 15
    pub fn new(index: u8) -> Result<Self> {
        if index > 0x0F {
            return Err(Error::config(format!("keyset index {index} out of range 0-15")));
        }
        Ok(Self(index))
    }

    /// Keyset index
    pub const fn index(self) -> u8 {
        self.0
    }

    /// KIc/KID byte announcing two-key triple DES in outer-CBC mode under this keyset
    pub const fn algorithm_byte(self) -> u8 {
        if self.0 == 0 {
            0x00
        } else {
            ALGORITHM_TDES_2KEY | (self.0 << 4)
        }
    }
}

/// Toolkit Application Reference
#[derive(Clone, Copy, PartialEq, Eq, Hash, AsRef, Deref, From)]
pub struct Tar([u8; 3]);

impl Tar {
    /// Wrap a raw TAR
    pub const fn new(tar: [u8; 3]) -> Self {
        Self(tar)
    }

    /// The TAR bytes
    pub const fn to_bytes(self) -> [u8; 3] {
        self.0
    }
}

impl fmt::Display for Tar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode_upper(self.0))
    }
}

impl fmt::Debug for Tar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Tar({self})")
    }
}

/// Unciphered command packet header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandHeader {
    /// Integrity protection, from SPI bits 0-1
    pub security_level: SecurityLevel,
    /// Ciphering, from SPI bit 2
    pub cipher_on: bool,
    /// The first SPI byte as supplied by the channel
    pub minimum_security_level: u8,
    /// Keyset used for ciphering
    pub kic_ref: KeysetReference,
    /// Keyset used for the cryptographic checksum
    pub kid_ref: KeysetReference,
    /// Target application
    pub tar: Tar,
}

impl CommandHeader {
    /// Create a header from a minimum security level byte
    ///
    /// Security level and ciphering are both derived from `msl`.
    pub fn new(
        msl: u8,
        kic_ref: KeysetReference,
        kid_ref: KeysetReference,
        tar: impl Into<Tar>,
    ) -> Result<Self> {
        let spi = Spi::new(msl)?;

        Ok(Self {
            security_level: spi.security_level(),
            cipher_on: spi.cipher_on(),
            minimum_security_level: msl,
            kic_ref,
            kid_ref,
            tar: tar.into(),
        })
    }

    /// First SPI byte
    pub const fn spi(&self) -> Spi {
        Spi(self.minimum_security_level)
    }

    /// Signature length for this header's security level
    pub const fn signature_len(&self) -> usize {
        self.security_level.signature_len()
    }

    /// KIc byte: the algorithm byte when ciphering is on, `00` otherwise
    pub const fn kic_byte(&self) -> u8 {
        if self.cipher_on {
            self.kic_ref.algorithm_byte()
        } else {
            0x00
        }
    }

    /// KID byte: the algorithm byte for a cryptographic checksum, `00` otherwise
    pub const fn kid_byte(&self) -> u8 {
        match self.security_level {
            SecurityLevel::CryptographicChecksum => self.kid_ref.algorithm_byte(),
            _ => 0x00,
        }
    }

    /// Header length (CHL) as transmitted
    pub const fn chl(&self) -> u8 {
        CHL_BASE + self.signature_len() as u8
    }

    /// Encode the header
    pub const fn to_bytes(&self) -> [u8; HEADER_LEN] {
        let [spi1, spi2] = self.spi().to_bytes();
        let [t0, t1, t2] = self.tar.0;
        [
            self.chl(),
            spi1,
            spi2,
            self.kic_byte(),
            self.kid_byte(),
            t0,
            t1,
            t2,
        ]
    }

    /// Decode a header from the start of a command packet
    ///
    /// Returns the header and the number of bytes it occupied.
    pub fn parse(data: &[u8]) -> Result<(Self, usize)> {
        const TRUNCATED: Error = Error::MalformedResponse("truncated command header");

        let mut reader = ByteReader::new(data);
        let chl = reader.read_u8().ok_or(TRUNCATED)?;
        let [spi, _por] = reader.read_array::<2>().ok_or(TRUNCATED)?;
        let kic = reader.read_u8().ok_or(TRUNCATED)?;
        let kid = reader.read_u8().ok_or(TRUNCATED)?;
        let tar = reader.read_array::<3>().ok_or(TRUNCATED)?;

        let header = Self::new(spi, KeysetReference(kic >> 4), KeysetReference(kid >> 4), tar)?;
        if header.chl() != chl {
            return Err(Error::MalformedResponse("header length does not match SPI"));
        }
        Ok((header, reader.position()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::tar;
    use hex_literal::hex;

    #[test]
    fn test_spi_rc_with_ciphering() {
        let spi = Spi::new(0x05).unwrap();
        assert_eq!(spi.security_level(), SecurityLevel::RedundancyCheck);
        assert!(spi.cipher_on());
        assert_eq!(spi.to_bytes(), [0x05, 0x01]);
    }

    #[test]
    fn test_spi_reserved_level() {
        assert!(Spi::new(0x03).is_err());
        assert!(Spi::new(0x07).is_err());
        assert!(CommandHeader::new(0x03, KeysetReference::NONE, KeysetReference::NONE, tar::RAM)
            .is_err());
    }

    #[test]
    fn test_spi_from_parts() {
        assert_eq!(
            Spi::from_parts(SecurityLevel::CryptographicChecksum, true).byte(),
            0x06
        );
        assert_eq!(Spi::from_parts(SecurityLevel::None, false).byte(), 0x00);
    }

    #[test]
    fn test_keyset_reference() {
        assert_eq!(KeysetReference::NONE.algorithm_byte(), 0x00);
        assert_eq!(KeysetReference::new(1).unwrap().algorithm_byte(), 0x15);
        assert_eq!(KeysetReference::new(3).unwrap().algorithm_byte(), 0x35);
        assert!(KeysetReference::new(16).is_err());
    }

    #[test]
    fn test_header_bytes_cc_ciphered() {
        let header = CommandHeader::new(
            0x06,
            KeysetReference::new(2).unwrap(),
            KeysetReference::new(2).unwrap(),
            tar::RFM_SIM,
        )
        .unwrap();

        assert_eq!(header.to_bytes(), hex!("15 0601 25 25 B00010"));
    }

    #[test]
    fn test_header_bytes_rc_sends_no_kid() {
        let header = CommandHeader::new(
            0x01,
            KeysetReference::new(1).unwrap(),
            KeysetReference::new(1).unwrap(),
            tar::RAM,
        )
        .unwrap();

        assert_eq!(header.to_bytes(), hex!("11 0101 00 00 000000"));
    }

    #[test]
    fn test_header_parse() {
        let (header, len) = CommandHeader::parse(&hex!("15 0601 35 35 B00011 FFFF")).unwrap();
        assert_eq!(len, HEADER_LEN);
        assert_eq!(header.security_level, SecurityLevel::CryptographicChecksum);
        assert!(header.cipher_on);
        assert_eq!(header.kic_ref.index(), 3);
        assert_eq!(header.tar, Tar::new(tar::RFM_USIM));

        assert!(CommandHeader::parse(&hex!("15 0601 35")).is_err());
        assert!(CommandHeader::parse(&hex!("0D 0601 35 35 B00011")).is_err());
    }
}
