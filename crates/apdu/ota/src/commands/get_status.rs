//! GET STATUS command for GlobalPlatform
//!
//! This command is used to retrieve information about applications,
//! security domains, and load files on the card. Replies use the legacy
//! (P2 bit 2 clear) record format, which is what remote applet management
//! returns.

use bytes::Bytes;
use derive_more::{AsRef, Deref};

use super::Command;
use crate::constants::{cla, get_status_p1, get_status_p2, ins, tags};
use crate::util::ByteReader;
use crate::{Error, Result, tlv};

/// Empty AID filter: match everything
const WILDCARD: [u8; 0] = [];

/// GET STATUS command for GlobalPlatform
#[derive(Debug, Clone, PartialEq, Eq, AsRef, Deref)]
pub struct GetStatusCommand(Command);

impl GetStatusCommand {
    /// Create a new GET STATUS command with specific P1, P2 and AID filter
    pub fn with_aid_filter(p1: u8, p2: u8, aid: impl AsRef<[u8]>) -> Self {
        let data = tlv::wrap(&[tags::AID], aid.as_ref());
        Self(Command::new(cla::GP, ins::GET_STATUS, p1, p2).with_data(data))
    }

    /// Get status of the issuer security domain
    pub fn issuer_security_domain() -> Self {
        Self::with_aid_filter(get_status_p1::ISSUER_SECURITY_DOMAIN, get_status_p2::FIRST, WILDCARD)
    }

    /// Get status of executable load files and their modules
    ///
    /// `next` asks for the occurrences following a `6310` reply.
    pub fn executable_load_files_and_modules(next: bool) -> Self {
        let p2 = if next {
            get_status_p2::NEXT
        } else {
            get_status_p2::FIRST
        };
        Self::with_aid_filter(get_status_p1::EXEC_LOAD_FILES_AND_MODULES, p2, WILDCARD)
    }
}

/// One executable load file as reported by GET STATUS
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplicationRecord {
    /// AID of the load file
    pub aid: Bytes,
    /// Lifecycle state
    pub lifecycle: u8,
    /// Privileges
    pub privileges: u8,
    /// Executable modules in the load file
    pub modules: Vec<Bytes>,
}

/// Parse legacy-format load file records
///
/// Each record is: AID length, AID, lifecycle state, privileges, number of
/// modules, then a length-prefixed AID per module.
pub fn parse_application_records(data: &[u8]) -> Result<Vec<ApplicationRecord>> {
    const TRUNCATED: Error = Error::MalformedResponse("truncated GET STATUS record");

    let mut reader = ByteReader::new(data);
    let mut records = Vec::new();

    while reader.remaining() > 0 {
        let aid = read_lv(&mut reader).ok_or(TRUNCATED)?;
        let lifecycle = reader.read_u8().ok_or(TRUNCATED)?;
        let privileges = reader.read_u8().ok_or(TRUNCATED)?;
        let count = reader.read_u8().ok_or(TRUNCATED)?;
        let modules = (0..count)
            .map(|_| read_lv(&mut reader).ok_or(TRUNCATED))
            .collect::<Result<Vec<_>>>()?;

        records.push(ApplicationRecord {
            aid,
            lifecycle,
            privileges,
            modules,
        });
    }

    Ok(records)
}

/// The first length-prefixed AID in a GET STATUS reply
pub fn parse_security_domain_aid(data: &[u8]) -> Result<Bytes> {
    read_lv(&mut ByteReader::new(data))
        .ok_or(Error::MalformedResponse("truncated security domain record"))
}

fn read_lv(reader: &mut ByteReader<'_>) -> Option<Bytes> {
    let len = reader.read_u8()?;
    reader.take(len as usize).map(Bytes::copy_from_slice)
}

#[cfg(test)]
mod tests {
    use super::*;
    use hex_literal::hex;

    #[test]
    fn test_get_status_command() {
        let cmd = GetStatusCommand::executable_load_files_and_modules(false);
        assert_eq!(cmd.cla, cla::GP);
        assert_eq!(cmd.ins, ins::GET_STATUS);
        assert_eq!(cmd.to_bytes().unwrap().as_ref(), hex!("80F21000024F00"));

        let cmd = GetStatusCommand::executable_load_files_and_modules(true);
        assert_eq!(cmd.to_bytes().unwrap().as_ref(), hex!("80F21001024F00"));

        let cmd = GetStatusCommand::issuer_security_domain();
        assert_eq!(cmd.to_bytes().unwrap().as_ref(), hex!("80F28000024F00"));
    }

    #[test]
    fn test_parse_application_records() {
        let data = hex!(
            "07A0000000620001 01 00 00"
            "05D07002CA44 01 00 02 08D07002CA44900101 08D07002CA44900102"
        );
        let records = parse_application_records(&data).unwrap();

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].aid.as_ref(), hex!("A0000000620001"));
        assert!(records[0].modules.is_empty());
        assert_eq!(records[1].lifecycle, 0x01);
        assert_eq!(
            records[1].modules,
            vec![
                Bytes::copy_from_slice(&hex!("D07002CA44900101")),
                Bytes::copy_from_slice(&hex!("D07002CA44900102")),
            ]
        );
    }

    #[test]
    fn test_parse_application_records_truncated() {
        assert!(parse_application_records(&[]).unwrap().is_empty());
        assert!(matches!(
            parse_application_records(&hex!("05D07002CA44 01 00 01 08D070")),
            Err(Error::MalformedResponse(_))
        ));
    }

    #[test]
    fn test_parse_security_domain_aid() {
        let aid = parse_security_domain_aid(&hex!("07A0000000030000 0F 9E")).unwrap();
        assert_eq!(aid.as_ref(), hex!("A0000000030000"));
        assert!(parse_security_domain_aid(&hex!("08A0")).is_err());
    }
}
