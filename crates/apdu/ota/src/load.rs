//! Load file block splitting
//!
//! The load file is wrapped in a Load File Data Block TLV (`C4`) and sent in
//! numbered LOAD blocks. Each block must fit, together with its APDU header
//! and the trailing GET RESPONSE, into a single command packet.

use bytes::Bytes;

use crate::{Error, Result, constants::tags, tlv};

/// Maximum block size for LOAD commands
pub const BLOCK_SIZE: usize = 188;

/// One LOAD block
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadBlock {
    /// Block number, starting at 0
    pub sequence: u8,
    /// Whether this is the last block
    pub last: bool,
    /// Block data
    pub data: Bytes,
}

/// Wrap a load file in the Load File Data Block TLV
pub fn load_file_data_block(load_file: &[u8]) -> Vec<u8> {
    tlv::wrap(&[tags::LOAD_FILE_DATA_BLOCK], load_file)
}

/// A stream of LOAD blocks over an image
#[derive(Debug, Clone)]
pub struct LoadCommandStream {
    /// Image being split
    data: Bytes,
    /// Size of every block but the last
    block_size: usize,
    /// Current position in data
    position: usize,
    /// Total blocks count
    blocks_count: usize,
    /// Current block index
    current_block: usize,
}

impl LoadCommandStream {
    /// Split `image` as is into blocks of [`BLOCK_SIZE`]
    ///
    /// Fails if the image needs more blocks than a one-byte block number allows.
    pub fn new(image: impl Into<Bytes>) -> Result<Self> {
        Self::with_block_size(image, BLOCK_SIZE)
    }

    /// Split `image` into blocks of at most `block_size` bytes
    ///
    /// Secured command packets add padding and a checksum, so a ciphered
    /// LOAD needs smaller blocks than [`BLOCK_SIZE`] to fit one ENVELOPE.
    pub fn with_block_size(image: impl Into<Bytes>, block_size: usize) -> Result<Self> {
        if block_size == 0 || block_size > BLOCK_SIZE {
            return Err(Error::config(format!(
                "load block size must be between 1 and {BLOCK_SIZE}, got {block_size}"
            )));
        }

        let data = image.into();
        let blocks_count = data.len().div_ceil(block_size);
        if blocks_count > usize::from(u8::MAX) + 1 {
            return Err(Error::PayloadTooLarge {
                what: "Load file",
                len: data.len(),
                max: (usize::from(u8::MAX) + 1) * block_size,
            });
        }

        Ok(Self {
            data,
            block_size,
            position: 0,
            blocks_count,
            current_block: 0,
        })
    }

    /// Wrap a load file in its `C4` TLV and split the result
    pub fn from_load_file(load_file: &[u8], block_size: usize) -> Result<Self> {
        Self::with_block_size(load_file_data_block(load_file), block_size)
    }

    /// Get the total number of blocks
    pub const fn blocks_count(&self) -> usize {
        self.blocks_count
    }

    /// Get the current block index
    pub const fn current_block(&self) -> usize {
        self.current_block
    }

    /// Check if there are more blocks
    pub fn has_next(&self) -> bool {
        self.position < self.data.len()
    }

    /// Get the next block
    pub fn next_block(&mut self) -> Option<LoadBlock> {
        if !self.has_next() {
            return None;
        }

        let remaining = self.data.len() - self.position;
        let block_size = remaining.min(self.block_size);
        let block = LoadBlock {
            sequence: self.current_block as u8,
            last: remaining <= self.block_size,
            data: self.data.slice(self.position..self.position + block_size),
        };

        self.position += block_size;
        self.current_block += 1;
        Some(block)
    }
}

impl Iterator for LoadCommandStream {
    type Item = LoadBlock;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_block()
    }
}
