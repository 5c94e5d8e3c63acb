//! LOAD command for GlobalPlatform
//!
//! This command is used to load executable code (CAP files) to the card.

use derive_more::{AsRef, Deref};

use super::Command;
use crate::constants::{cla, ins, load_p1};
use crate::load::LoadBlock;

/// LOAD command for GlobalPlatform
#[derive(Debug, Clone, PartialEq, Eq, AsRef, Deref)]
pub struct LoadCommand(Command);

impl LoadCommand {
    /// Create a LOAD command with block data
    pub fn with_block_data(p1: u8, block_number: u8, data: impl Into<bytes::Bytes>) -> Self {
        Self(Command::new(cla::GP, ins::LOAD, p1, block_number).with_data(data))
    }

    /// Create a LOAD command for more blocks
    pub fn more_blocks(block_number: u8, data: impl Into<bytes::Bytes>) -> Self {
        Self::with_block_data(load_p1::MORE_BLOCKS, block_number, data)
    }

    /// Create a LOAD command for the last block
    pub fn last_block(block_number: u8, data: impl Into<bytes::Bytes>) -> Self {
        Self::with_block_data(load_p1::LAST_BLOCK, block_number, data)
    }
}

impl From<&LoadBlock> for LoadCommand {
    fn from(block: &LoadBlock) -> Self {
        if block.last {
            Self::last_block(block.sequence, block.data.clone())
        } else {
            Self::more_blocks(block.sequence, block.data.clone())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use hex_literal::hex;

    #[test]
    fn test_load_command() {
        let data = Bytes::copy_from_slice(&hex!("C4820100"));
        let cmd = LoadCommand::more_blocks(0x00, data.clone());
        assert_eq!(cmd.p1, load_p1::MORE_BLOCKS);
        assert_eq!(cmd.to_bytes().unwrap().as_ref(), hex!("80E8000004C4820100"));

        let cmd = LoadCommand::last_block(0x02, data);
        assert_eq!(cmd.p1, load_p1::LAST_BLOCK);
        assert_eq!(cmd.p2, 0x02);
        assert_eq!(cmd.to_bytes().unwrap().as_ref(), hex!("80E8800204C4820100"));
    }

    #[test]
    fn test_load_command_from_block() {
        let block = LoadBlock {
            sequence: 1,
            last: true,
            data: Bytes::copy_from_slice(&hex!("0102")),
        };
        let cmd = LoadCommand::from(&block);
        assert_eq!(cmd.to_bytes().unwrap().as_ref(), hex!("80E88001020102"));
    }
}
