//! OTA channels and key material
//!
//! Every lifecycle operation is routed through one of three fixed channels.
//! A channel pins the TAR, the minimum security level and the keysets used.

use std::fmt;

use zeroize::Zeroizing;

use crate::constants::{MSL_CC_CIPHERED, MSL_NONE, tar};
use crate::header::{CommandHeader, KeysetReference};
use crate::{Error, Result};

/// Triple-DES key material for the OTA security layer
///
/// Both keys are optional. Channels fall back to no security when neither is
/// configured; the codec fails with a configuration error if a header needs
/// a key that is missing.
#[derive(Clone, Default)]
pub struct OtaKeys {
    kic: Option<Zeroizing<Vec<u8>>>,
    kid: Option<Zeroizing<Vec<u8>>>,
}

impl OtaKeys {
    /// No key material
    pub fn none() -> Self {
        Self::default()
    }

    /// Create key material, validating each key as 16 or 24 bytes
    pub fn new(kic: Option<&[u8]>, kid: Option<&[u8]>) -> Result<Self> {
        Ok(Self {
            kic: kic.map(|key| validate_key("KIc", key)).transpose()?,
            kid: kid.map(|key| validate_key("KID", key)).transpose()?,
        })
    }

    /// Ciphering key
    pub fn kic(&self) -> Option<&[u8]> {
        self.kic.as_deref().map(Vec::as_slice)
    }

    /// Checksum key
    pub fn kid(&self) -> Option<&[u8]> {
        self.kid.as_deref().map(Vec::as_slice)
    }

    /// Whether no key is configured
    pub const fn is_empty(&self) -> bool {
        self.kic.is_none() && self.kid.is_none()
    }
}

impl fmt::Debug for OtaKeys {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OtaKeys")
            .field("kic", &self.kic.as_ref().map(|_| "<redacted>"))
            .field("kid", &self.kid.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

fn validate_key(name: &str, key: &[u8]) -> Result<Zeroizing<Vec<u8>>> {
    match key.len() {
        16 | 24 => Ok(Zeroizing::new(key.to_vec())),
        len => Err(Error::config(format!(
            "{name} must be 16 or 24 bytes, got {len}"
        ))),
    }
}

/// Target of an OTA command packet
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    /// Remote Applet Management
    Ram,
    /// Remote File Management on the SIM file system
    RfmSim,
    /// Remote File Management on the USIM file system
    RfmUsim,
}

impl Channel {
    /// Command header for this channel
    ///
    /// RAM runs without security when no keys are configured, otherwise with
    /// checksum and ciphering on keyset 1. RFM-SIM and RFM-USIM always use
    /// checksum and ciphering, on keysets 2 and 3.
    pub fn header(self, keys: &OtaKeys) -> Result<CommandHeader> {
        let (tar, msl, keyset) = match self {
            Self::Ram if keys.is_empty() => (tar::RAM, MSL_NONE, 0),
            Self::Ram => (tar::RAM, MSL_CC_CIPHERED, 1),
            Self::RfmSim => (tar::RFM_SIM, MSL_CC_CIPHERED, 2),
            Self::RfmUsim => (tar::RFM_USIM, MSL_CC_CIPHERED, 3),
        };

        let keyset = KeysetReference::new(keyset)?;
        CommandHeader::new(msl, keyset, keyset, tar)
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ram => write!(f, "RAM"),
            Self::RfmSim => write!(f, "RFM-SIM"),
            Self::RfmUsim => write!(f, "RFM-USIM"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::header::SecurityLevel;
    use hex_literal::hex;

    const KEY: [u8; 16] = hex!("404142434445464748494a4b4c4d4e4f");

    #[test]
    fn test_keys_validate_length() {
        assert!(OtaKeys::new(Some(&KEY), None).is_ok());
        assert!(OtaKeys::new(None, Some(&[0u8; 24])).is_ok());
        assert!(matches!(
            OtaKeys::new(Some(&KEY[..8]), None),
            Err(Error::Configuration(_))
        ));
    }

    #[test]
    fn test_keys_debug_redacts() {
        let keys = OtaKeys::new(Some(&KEY), Some(&KEY)).unwrap();
        let debug = format!("{keys:?}");
        assert!(!debug.contains("64"));
        assert!(debug.contains("<redacted>"));
    }

    #[test]
    fn test_ram_without_keys_is_unsecured() {
        let header = Channel::Ram.header(&OtaKeys::none()).unwrap();
        assert_eq!(header.security_level, SecurityLevel::None);
        assert!(!header.cipher_on);
        assert_eq!(header.to_bytes(), hex!("0D 0001 00 00 000000"));
    }

    #[test]
    fn test_channel_headers_with_keys() {
        let keys = OtaKeys::new(Some(&KEY), Some(&KEY)).unwrap();

        let ram = Channel::Ram.header(&keys).unwrap();
        assert_eq!(ram.to_bytes(), hex!("15 0601 15 15 000000"));

        let sim = Channel::RfmSim.header(&keys).unwrap();
        assert_eq!(sim.to_bytes(), hex!("15 0601 25 25 B00010"));

        let usim = Channel::RfmUsim.header(&OtaKeys::none()).unwrap();
        assert_eq!(usim.to_bytes(), hex!("15 0601 35 35 B00011"));
    }
}
