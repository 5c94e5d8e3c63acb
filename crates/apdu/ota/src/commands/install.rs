//! INSTALL command for GlobalPlatform
//!
//! This command is used to install applications on the card.

use derive_more::{AsRef, Deref};

use super::Command;
use crate::constants::{cla, ins, install_p1};
use crate::{Error, Result};

/// Privileges granted on install: one byte, none set
const DEFAULT_PRIVILEGES: [u8; 1] = [0x00];

/// INSTALL command for GlobalPlatform
#[derive(Debug, Clone, PartialEq, Eq, AsRef, Deref)]
pub struct InstallCommand(Command);

impl InstallCommand {
    /// Create an INSTALL command with parameters
    pub fn with_p1_data(p1: u8, data: impl Into<bytes::Bytes>) -> Self {
        Self(Command::new(cla::GP, ins::INSTALL, p1, 0x00).with_data(data))
    }

    /// Create an INSTALL [for load] command
    ///
    /// No security domain, load file data block hash or load token is sent.
    /// `load_parameters` is the encoded `EF` system parameters TLV.
    pub fn for_load(
        load_file_aid: impl AsRef<[u8]>,
        load_parameters: impl AsRef<[u8]>,
    ) -> Result<Self> {
        let mut data = Vec::new();
        push_lv(&mut data, "Load file AID", load_file_aid.as_ref())?;
        // Security domain AID and load file data block hash, both empty
        data.extend_from_slice(&[0x00, 0x00]);
        push_lv(&mut data, "Load parameters", load_parameters.as_ref())?;
        // Empty load token, then a trailing zero byte counted in Lc
        data.extend_from_slice(&[0x00, 0x00]);

        Ok(Self::with_p1_data(install_p1::FOR_LOAD, data))
    }

    /// Create an INSTALL [for install and make selectable] command
    ///
    /// `install_parameters` is the encoded `EF` system parameters TLV followed
    /// by the `C9` application parameters TLV.
    pub fn for_install_and_make_selectable(
        executable_load_file_aid: impl AsRef<[u8]>,
        executable_module_aid: impl AsRef<[u8]>,
        application_aid: impl AsRef<[u8]>,
        install_parameters: impl AsRef<[u8]>,
    ) -> Result<Self> {
        let mut data = Vec::new();
        push_lv(&mut data, "Executable load file AID", executable_load_file_aid.as_ref())?;
        push_lv(&mut data, "Executable module AID", executable_module_aid.as_ref())?;
        push_lv(&mut data, "Application AID", application_aid.as_ref())?;
        push_lv(&mut data, "Privileges", &DEFAULT_PRIVILEGES)?;
        push_lv(&mut data, "Install parameters", install_parameters.as_ref())?;
        // Empty install token
        data.push(0x00);

        Ok(Self::with_p1_data(
            install_p1::FOR_INSTALL_AND_MAKE_SELECTABLE,
            data,
        ))
    }
}

/// Append a one-byte length followed by `value`
fn push_lv(data: &mut Vec<u8>, what: &'static str, value: &[u8]) -> Result<()> {
    let len = u8::try_from(value.len()).map_err(|_| Error::PayloadTooLarge {
        what,
        len: value.len(),
        max: u8::MAX as usize,
    })?;
    data.push(len);
    data.extend_from_slice(value);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use hex_literal::hex;

    #[test]
    fn test_install_for_load() {
        let package_aid = hex!("D07002CA44");
        let params = hex!("EF04C6020123");
        let cmd = InstallCommand::for_load(package_aid, params).unwrap();

        assert_eq!(cmd.cla, cla::GP);
        assert_eq!(cmd.ins, ins::INSTALL);
        assert_eq!(cmd.p1, install_p1::FOR_LOAD);
        assert_eq!(cmd.p2, 0x00);
        assert_eq!(
            cmd.to_bytes().unwrap().as_ref(),
            hex!("80E6020011 05D07002CA44 0000 06EF04C6020123 0000")
        );
    }

    #[test]
    fn test_install_for_install() {
        let cmd = InstallCommand::for_install_and_make_selectable(
            hex!("D07002CA44"),
            hex!("D07002CA44900101"),
            hex!("D07002CA44900101"),
            hex!("EF08C8020000C7020000C900"),
        )
        .unwrap();

        assert_eq!(cmd.p1, install_p1::FOR_INSTALL_AND_MAKE_SELECTABLE);
        assert_eq!(
            cmd.to_bytes().unwrap().as_ref(),
            hex!(
                "80E60C0028"
                "05D07002CA44"
                "08D07002CA44900101"
                "08D07002CA44900101"
                "0100"
                "0CEF08C8020000C7020000C900"
                "00"
            )
        );
    }

    #[test]
    fn test_install_rejects_long_field() {
        assert!(matches!(
            InstallCommand::for_load(hex!("D07002CA44"), [0u8; 256]),
            Err(Error::PayloadTooLarge {
                what: "Load parameters",
                ..
            })
        ));
    }
}
