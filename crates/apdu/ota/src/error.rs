use iso7816_tlv::TlvError;
use thiserror::Error;

use crate::transport::{StatusWord, TransportError};

/// Result type for OTA operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for OTA operations
#[derive(Debug, Error)]
pub enum Error {
    /// Transport-related errors
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Missing key material or a malformed fixed-width argument
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Cipher block alignment could not be satisfied
    #[error("Padding error: {0}")]
    Padding(&'static str),

    /// The load file has no Header component
    #[error("Load file is missing its Header component")]
    MissingHeader,

    /// The Header component could not be decoded
    #[error("Malformed Header component: {0}")]
    MalformedHeader(&'static str),

    /// The card's reply could not be decoded
    #[error("Malformed response: {0}")]
    MalformedResponse(&'static str),

    /// The response packet carried a fatal status code
    #[error("Response status 0x{code:02X}: {reason}")]
    ResponseStatus {
        /// Raw response status code
        code: u8,
        /// Reason reported for the code
        reason: &'static str,
    },

    /// The status word did not match the expected value
    #[error("Status word mismatch: expected {expected}, got {actual}")]
    UnexpectedStatusWord {
        /// Expected status word
        expected: StatusWord,
        /// Status word reported by the card
        actual: StatusWord,
    },

    /// A signature carried in a command packet did not verify
    #[error("Integrity check failed: {0}")]
    IntegrityCheck(&'static str),

    /// A length does not fit the field that has to carry it
    #[error("{what} too large: {len} bytes (max {max})")]
    PayloadTooLarge {
        /// Field being encoded
        what: &'static str,
        /// Actual length
        len: usize,
        /// Largest encodable length
        max: usize,
    },

    /// The card kept issuing proactive commands
    #[error("Card issued more than {0} proactive commands for one request")]
    TooManyProactiveCommands(usize),

    /// I/O error reading a package container
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The package container is not a valid ZIP archive
    #[error("CAP file error: {0}")]
    Zip(#[from] zip::result::ZipError),

    /// A BER-TLV structure could not be encoded or decoded
    #[error("TLV error: {0}")]
    Tlv(TlvError),

    /// Invalid hexadecimal input
    #[error("Invalid hex: {0}")]
    Hex(#[from] hex::FromHexError),
}

// `TlvError` does not implement `std::error::Error`, so `#[from]` cannot be used
impl From<TlvError> for Error {
    fn from(err: TlvError) -> Self {
        Self::Tlv(err)
    }
}

impl Error {
    /// Shorthand for a [`Error::Configuration`] error
    pub(crate) fn config(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }
}
