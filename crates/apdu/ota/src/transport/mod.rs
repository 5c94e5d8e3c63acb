//! Card transport boundary
//!
//! The OTA core never talks to a reader directly. It hands complete command
//! APDUs to a [`CardTransport`] and gets back the raw response including the
//! trailing status word. Transports never retry; every call is one physical
//! exchange.

use std::fmt;

use bytes::Bytes;
use thiserror::Error;
use tracing::trace;

use crate::constants::status;
use crate::util::hex_upper;
use crate::{Error, Result};

#[cfg(feature = "pcsc")]
pub mod pcsc;

/// ISO 7816 status word (SW1 SW2)
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct StatusWord {
    sw1: u8,
    sw2: u8,
}

impl StatusWord {
    /// Create a status word from its two bytes
    pub const fn new(sw1: u8, sw2: u8) -> Self {
        Self { sw1, sw2 }
    }

    /// First status byte
    pub const fn sw1(&self) -> u8 {
        self.sw1
    }

    /// Second status byte
    pub const fn sw2(&self) -> u8 {
        self.sw2
    }

    /// The status word as two big-endian bytes
    pub const fn to_bytes(self) -> [u8; 2] {
        [self.sw1, self.sw2]
    }

    /// Whether this is `9000`
    pub const fn is_success(&self) -> bool {
        self.sw1 == 0x90 && self.sw2 == 0x00
    }
}

impl Default for StatusWord {
    fn default() -> Self {
        status::SUCCESS
    }
}

impl From<u16> for StatusWord {
    fn from(value: u16) -> Self {
        let [sw1, sw2] = value.to_be_bytes();
        Self::new(sw1, sw2)
    }
}

impl From<[u8; 2]> for StatusWord {
    fn from([sw1, sw2]: [u8; 2]) -> Self {
        Self::new(sw1, sw2)
    }
}

impl fmt::Display for StatusWord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02X}{:02X}", self.sw1, self.sw2)
    }
}

impl fmt::Debug for StatusWord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "StatusWord({self})")
    }
}

/// Errors raised by a transport
#[derive(Debug, Error)]
pub enum TransportError {
    /// The card answered with fewer than the two status bytes
    #[error("Response too short: {0} bytes")]
    ResponseTooShort(usize),

    /// No card is present in the reader
    #[error("No card present")]
    NoCard,

    /// The named reader does not exist
    #[error("Reader not found: {0}")]
    ReaderNotFound(String),

    /// The underlying device reported an error
    #[error("Device error: {0}")]
    Device(String),
}

/// A raw command/response channel to a card or simulator
pub trait CardTransport: fmt::Debug {
    /// Send one command APDU and return the full response, status word included
    fn transmit_raw(&mut self, command: &[u8]) -> std::result::Result<Bytes, TransportError>;

    /// Reset the card
    fn reset(&mut self) -> std::result::Result<(), TransportError> {
        Ok(())
    }

    /// Send one command APDU and split the response into data and status word
    fn exchange(&mut self, apdu: &[u8]) -> std::result::Result<(Bytes, StatusWord), TransportError> {
        trace!(command = %hex_upper(apdu), "transmit");
        let mut response = self.transmit_raw(apdu)?;
        if response.len() < 2 {
            return Err(TransportError::ResponseTooShort(response.len()));
        }

        let sw = response.split_off(response.len() - 2);
        let status = StatusWord::new(sw[0], sw[1]);
        trace!(response = %hex_upper(&response), %status, "receive");
        Ok((response, status))
    }

    /// Like [`CardTransport::exchange`], but fail unless the status word is `9000`
    fn check(&mut self, apdu: &[u8]) -> Result<Bytes> {
        let (data, status) = self.exchange(apdu)?;
        if !status.is_success() {
            return Err(Error::UnexpectedStatusWord {
                expected: status::SUCCESS,
                actual: status,
            });
        }
        Ok(data)
    }
}

impl<T: CardTransport + ?Sized> CardTransport for &mut T {
    fn transmit_raw(&mut self, command: &[u8]) -> std::result::Result<Bytes, TransportError> {
        (**self).transmit_raw(command)
    }

    fn reset(&mut self) -> std::result::Result<(), TransportError> {
        (**self).reset()
    }
}
