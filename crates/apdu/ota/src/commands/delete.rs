//! DELETE command for GlobalPlatform
//!
//! This command is used to delete applications, packages, and other objects.

use derive_more::{AsRef, Deref};

use super::Command;
use crate::constants::{cla, delete_p2, ins, tags};
use crate::tlv;

/// DELETE command for GlobalPlatform
#[derive(Debug, Clone, PartialEq, Eq, AsRef, Deref)]
pub struct DeleteCommand(Command);

impl DeleteCommand {
    /// Create a DELETE command for an object with specified parameters
    pub fn with_aid(aid: impl AsRef<[u8]>, p2: u8) -> Self {
        let data = tlv::wrap(&[tags::AID], aid.as_ref());
        Self(Command::new(cla::GP, ins::DELETE, 0x00, p2).with_data(data))
    }

    /// Create a DELETE command for an object
    pub fn delete_object(aid: impl AsRef<[u8]>) -> Self {
        Self::with_aid(aid, delete_p2::OBJECT)
    }

    /// Create a DELETE command for an object and related objects
    pub fn delete_object_and_related(aid: impl AsRef<[u8]>) -> Self {
        Self::with_aid(aid, delete_p2::OBJECT_AND_RELATED)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hex_literal::hex;

    #[test]
    fn test_delete_command() {
        let aid = hex!("0102030405");
        let cmd = DeleteCommand::delete_object(aid);

        assert_eq!(cmd.cla, cla::GP);
        assert_eq!(cmd.ins, ins::DELETE);
        assert_eq!(cmd.p1, 0x00);
        assert_eq!(cmd.p2, delete_p2::OBJECT);

        // Check data format (tag + length + AID)
        let expected_data = hex!("4F050102030405");
        assert_eq!(cmd.data(), Some(expected_data.as_ref()));

        // No Le: the script appends GET RESPONSE instead
        let raw = cmd.to_bytes().unwrap();
        assert_eq!(raw.as_ref(), hex!("80E40000074F050102030405"));
    }

    #[test]
    fn test_delete_object_and_related() {
        let aid = hex!("A0000000030000");
        let cmd = DeleteCommand::delete_object_and_related(aid);

        assert_eq!(cmd.p2, delete_p2::OBJECT_AND_RELATED);
        assert_eq!(
            cmd.to_bytes().unwrap().as_ref(),
            hex!("80E40080094F07A0000000030000")
        );
    }
}
