//! Load and install parameters, and TOML profiles
//!
//! Fixed-width numeric fields arrive as hex text (from the command line or a
//! profile) and are checked for their exact width before anything is sent.

use std::path::Path;

use figment::Figment;
use figment::providers::{Format, Toml};
use serde::Deserialize;

use crate::constants::tags;
use crate::header::Tar;
use crate::{Error, OtaKeys, Result, tlv};

/// Decode a variable-width hex field
pub fn parse_hex(field: &str, text: &str) -> Result<Vec<u8>> {
    hex::decode(text.trim()).map_err(|e| Error::config(format!("{field}: {e}")))
}

/// Decode a hex field that must be exactly `N` bytes
pub fn parse_fixed_hex<const N: usize>(field: &str, text: &str) -> Result<[u8; N]> {
    let bytes = parse_hex(field, text)?;
    <[u8; N]>::try_from(bytes.as_slice()).map_err(|_| {
        Error::config(format!(
            "{field}: expected {N} bytes ({} hex digits), got {} bytes",
            N * 2,
            bytes.len()
        ))
    })
}

fn size_tlv(tag: u8, size: u16) -> Vec<u8> {
    tlv::wrap(&[tag], &size.to_be_bytes())
}

/// System parameters of INSTALL [for load]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LoadParameters {
    /// Non-volatile code space (`C6`)
    pub code_size: u16,
    /// Volatile data space (`C7`), omitted when zero
    pub volatile_data_size: u16,
    /// Non-volatile data space (`C8`), omitted when zero
    pub non_volatile_data_size: u16,
}

impl LoadParameters {
    /// Parameters for a load file, with its length as the code size
    pub fn for_load_file(load_file: &[u8]) -> Result<Self> {
        let code_size = u16::try_from(load_file.len()).map_err(|_| Error::PayloadTooLarge {
            what: "Load file",
            len: load_file.len(),
            max: u16::MAX as usize,
        })?;
        Ok(Self {
            code_size,
            ..Self::default()
        })
    }

    /// Encode as the `EF` system parameters TLV
    pub fn encode(&self) -> Vec<u8> {
        let mut value = size_tlv(tags::CODE_SIZE, self.code_size);
        if self.volatile_data_size > 0 {
            value.extend(size_tlv(tags::VOLATILE_DATA_SIZE, self.volatile_data_size));
        }
        if self.non_volatile_data_size > 0 {
            value.extend(size_tlv(
                tags::NON_VOLATILE_DATA_SIZE,
                self.non_volatile_data_size,
            ));
        }
        tlv::wrap(&[tags::SYSTEM_PARAMETERS], &value)
    }
}

/// UICC toolkit application specific parameters (`CA`)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolkitParameters {
    /// Access domain
    pub access_domain: Vec<u8>,
    /// Priority level of the toolkit application instance
    pub priority_level: u8,
    /// Maximum number of timers
    pub max_timers: u8,
    /// Maximum text length of a menu entry
    pub max_menu_entry_text: u8,
    /// Maximum number of menu entries
    pub max_menu_entries: u8,
    /// Maximum number of BIP channels, omitted when zero
    pub max_bip_channels: u8,
    /// Minimum security level TARs, omitted when empty
    pub tars: Vec<Tar>,
}

impl Default for ToolkitParameters {
    fn default() -> Self {
        Self {
            access_domain: vec![0xFF],
            priority_level: 0x01,
            max_timers: 0,
            max_menu_entry_text: 16,
            max_menu_entries: 0,
            max_bip_channels: 0,
            tars: Vec::new(),
        }
    }
}

impl ToolkitParameters {
    /// Parse a concatenated TAR list
    pub fn parse_tars(text: &str) -> Result<Vec<Tar>> {
        let bytes = parse_hex("tar", text)?;
        if bytes.len() % 3 != 0 {
            return Err(Error::config(format!(
                "tar: list of 3-byte TARs expected, got {} bytes",
                bytes.len()
            )));
        }
        Ok(bytes
            .chunks_exact(3)
            .map(|c| Tar::new([c[0], c[1], c[2]]))
            .collect())
    }

    /// Encode as the `CA` TLV
    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut value = Vec::new();
        push_lv(&mut value, "Access domain", &self.access_domain)?;
        value.extend([
            self.priority_level,
            self.max_timers,
            self.max_menu_entry_text,
            self.max_menu_entries,
        ]);
        // Position and identifier of each menu entry, allocated by the card
        value.extend(std::iter::repeat_n(0x00, 2 * self.max_menu_entries as usize));
        if self.max_bip_channels > 0 {
            value.push(self.max_bip_channels);
        }
        if !self.tars.is_empty() {
            let tars: Vec<u8> = self.tars.iter().flat_map(|t| t.to_bytes()).collect();
            push_lv(&mut value, "TAR list", &tars)?;
        }
        Ok(tlv::wrap(&[tags::TOOLKIT_PARAMETERS], &value))
    }
}

/// Install parameters of INSTALL [for install and make selectable]
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct InstallParameters {
    /// Volatile memory for the instance (`C7`)
    pub volatile_memory: u16,
    /// Non-volatile memory for the instance (`C8`)
    pub non_volatile_memory: u16,
    /// Toolkit parameters, present when the instance is a toolkit application
    pub toolkit: Option<ToolkitParameters>,
    /// Application specific parameters (`C9`)
    pub application_parameters: Vec<u8>,
}

impl InstallParameters {
    /// Encode as `EF` system parameters followed by `C9`
    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut system = size_tlv(tags::NON_VOLATILE_DATA_SIZE, self.non_volatile_memory);
        system.extend(size_tlv(tags::VOLATILE_DATA_SIZE, self.volatile_memory));
        if let Some(toolkit) = &self.toolkit {
            system.extend(toolkit.encode()?);
        }

        let mut params = tlv::wrap(&[tags::SYSTEM_PARAMETERS], &system);
        params.extend(tlv::wrap(
            &[tags::APPLICATION_PARAMETERS],
            &self.application_parameters,
        ));
        Ok(params)
    }
}

fn push_lv(buf: &mut Vec<u8>, what: &'static str, value: &[u8]) -> Result<()> {
    let len = u8::try_from(value.len()).map_err(|_| Error::PayloadTooLarge {
        what,
        len: value.len(),
        max: u8::MAX as usize,
    })?;
    buf.push(len);
    buf.extend_from_slice(value);
    Ok(())
}

/// Install settings as written in a profile, all hex fields as text
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct InstallProfile {
    /// Non-volatile memory required, 2 bytes
    pub nonvolatile_memory_required: String,
    /// Volatile memory for install, 2 bytes
    pub volatile_memory_for_install: String,
    /// Toolkit access domain
    pub access_domain: String,
    /// Toolkit priority level, 1 byte
    pub priority_level: String,
    /// Maximum number of timers
    pub max_timers: u8,
    /// Maximum number of BIP channels
    pub max_bip_channel: u8,
    /// Maximum menu entry text length
    pub max_menu_entry_text: u8,
    /// Maximum number of menu entries
    pub max_menu_entries: u8,
    /// Application specific parameters
    pub app_parameters: String,
    /// Concatenated TARs
    pub tar: Option<String>,
}

impl Default for InstallProfile {
    fn default() -> Self {
        Self {
            nonvolatile_memory_required: "0000".into(),
            volatile_memory_for_install: "0000".into(),
            access_domain: "FF".into(),
            priority_level: "01".into(),
            max_timers: 0,
            max_bip_channel: 0,
            max_menu_entry_text: 16,
            max_menu_entries: 0,
            app_parameters: String::new(),
            tar: None,
        }
    }
}

impl InstallProfile {
    /// Validate and convert, adding toolkit parameters when requested
    pub fn install_parameters(&self, enable_toolkit: bool) -> Result<InstallParameters> {
        let toolkit = if enable_toolkit {
            Some(ToolkitParameters {
                access_domain: parse_hex("access-domain", &self.access_domain)?,
                priority_level: u8::from_be_bytes(parse_fixed_hex::<1>(
                    "priority-level",
                    &self.priority_level,
                )?),
                max_timers: self.max_timers,
                max_menu_entry_text: self.max_menu_entry_text,
                max_menu_entries: self.max_menu_entries,
                max_bip_channels: self.max_bip_channel,
                tars: match &self.tar {
                    Some(tar) => ToolkitParameters::parse_tars(tar)?,
                    None => Vec::new(),
                },
            })
        } else {
            None
        };

        Ok(InstallParameters {
            volatile_memory: u16::from_be_bytes(parse_fixed_hex::<2>(
                "volatile-memory-for-install",
                &self.volatile_memory_for_install,
            )?),
            non_volatile_memory: u16::from_be_bytes(parse_fixed_hex::<2>(
                "nonvolatile-memory-required",
                &self.nonvolatile_memory_required,
            )?),
            toolkit,
            application_parameters: parse_hex("app-parameters", &self.app_parameters)?,
        })
    }
}

/// Settings loaded from a TOML profile
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct OtaProfile {
    /// Reader name
    pub reader: Option<String>,
    /// KIc, hex
    pub kic: Option<String>,
    /// KID, hex
    pub kid: Option<String>,
    /// Install defaults
    pub install: InstallProfile,
}

impl OtaProfile {
    /// Load a profile from a TOML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        Figment::new()
            .merge(Toml::file(path.as_ref()))
            .extract()
            .map_err(|e| Error::config(format!("{}: {e}", path.as_ref().display())))
    }

    /// Parse a profile from TOML text
    pub fn from_toml(text: &str) -> Result<Self> {
        Figment::new()
            .merge(Toml::string(text))
            .extract()
            .map_err(|e| Error::config(e.to_string()))
    }

    /// Key material; empty or absent keys mean none
    pub fn keys(&self) -> Result<OtaKeys> {
        let decode = |field: &str, key: &Option<String>| -> Result<Option<Vec<u8>>> {
            match key.as_deref().map(str::trim) {
                None | Some("") => Ok(None),
                Some(text) => parse_hex(field, text).map(Some),
            }
        };
        let kic = decode("kic", &self.kic)?;
        let kid = decode("kid", &self.kid)?;
        OtaKeys::new(kic.as_deref(), kid.as_deref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hex_literal::hex;

    #[test]
    fn test_parse_fixed_hex() {
        assert_eq!(parse_fixed_hex::<2>("nvm", "0100").unwrap(), hex!("0100"));
        assert!(matches!(
            parse_fixed_hex::<2>("nvm", "100"),
            Err(Error::Configuration(_))
        ));
        assert!(matches!(
            parse_fixed_hex::<2>("nvm", "010000"),
            Err(Error::Configuration(_))
        ));
        assert!(matches!(
            parse_fixed_hex::<1>("priority", "zz"),
            Err(Error::Configuration(_))
        ));
    }

    #[test]
    fn test_load_parameters() {
        let params = LoadParameters {
            code_size: 0x0123,
            ..Default::default()
        };
        assert_eq!(params.encode(), hex!("EF04 C6020123"));

        let params = LoadParameters {
            code_size: 0x0123,
            volatile_data_size: 0x0010,
            non_volatile_data_size: 0x0020,
        };
        assert_eq!(params.encode(), hex!("EF0C C6020123 C7020010 C8020020"));

        assert_eq!(
            LoadParameters::for_load_file(&[0u8; 300]).unwrap().code_size,
            300
        );
        assert!(LoadParameters::for_load_file(&vec![0u8; 0x10000]).is_err());
    }

    #[test]
    fn test_install_parameters_without_toolkit() {
        let params = InstallParameters {
            volatile_memory: 0x0010,
            non_volatile_memory: 0x0100,
            toolkit: None,
            application_parameters: Vec::new(),
        };
        assert_eq!(
            params.encode().unwrap(),
            hex!("EF08 C8020100 C7020010 C900")
        );
    }

    #[test]
    fn test_install_parameters_with_toolkit() {
        let params = InstallParameters {
            volatile_memory: 0,
            non_volatile_memory: 0,
            toolkit: Some(ToolkitParameters {
                max_menu_entries: 2,
                max_bip_channels: 1,
                tars: ToolkitParameters::parse_tars("B20100B20101").unwrap(),
                ..Default::default()
            }),
            application_parameters: hex!("AABB").to_vec(),
        };
        assert_eq!(
            params.encode().unwrap(),
            hex!(
                "EF1C C8020000 C7020000"
                "CA12 01FF 01 00 10 02 00000000 01 06B20100B20101"
                "C902AABB"
            )
        );
    }

    #[test]
    fn test_tar_list_alignment() {
        assert!(matches!(
            ToolkitParameters::parse_tars("B201"),
            Err(Error::Configuration(_))
        ));
        assert!(ToolkitParameters::parse_tars("").unwrap().is_empty());
    }

    #[test]
    fn test_install_profile() {
        let profile = OtaProfile::from_toml(
            r#"
            reader = "Reader 0"
            kic = "000102030405060708090A0B0C0D0E0F"
            kid = ""

            [install]
            nonvolatile-memory-required = "0100"
            max-menu-entries = 1
            "#,
        )
        .unwrap();

        assert_eq!(profile.reader.as_deref(), Some("Reader 0"));
        let keys = profile.keys().unwrap();
        assert!(keys.kic().is_some());
        assert!(keys.kid().is_none());

        let params = profile.install.install_parameters(true).unwrap();
        assert_eq!(params.non_volatile_memory, 0x0100);
        assert_eq!(params.toolkit.unwrap().max_menu_entries, 1);

        let bad = InstallProfile {
            volatile_memory_for_install: "10".into(),
            ..Default::default()
        };
        assert!(matches!(
            bad.install_parameters(false),
            Err(Error::Configuration(_))
        ));
    }
}
