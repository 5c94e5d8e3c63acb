//! Plaintext APDU builders
//!
//! GlobalPlatform card management commands travel inside command packets;
//! SIM toolkit commands (ENVELOPE, FETCH, TERMINAL RESPONSE, TERMINAL
//! PROFILE) go straight to the card.

pub mod delete;
pub mod get_response;
pub mod get_status;
pub mod install;
pub mod load;
pub mod toolkit;

use bytes::{BufMut, Bytes, BytesMut};

pub use delete::DeleteCommand;
pub use get_response::GetResponseCommand;
pub use get_status::{
    ApplicationRecord, GetStatusCommand, parse_application_records, parse_security_domain_aid,
};
pub use install::InstallCommand;
pub use load::LoadCommand;
pub use toolkit::{EnvelopeCommand, FetchCommand, TerminalProfileCommand, TerminalResponseCommand};

use crate::{Error, Result};

/// Generic short APDU
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    /// Command class byte
    pub cla: u8,
    /// Instruction byte
    pub ins: u8,
    /// Parameter 1
    pub p1: u8,
    /// Parameter 2
    pub p2: u8,
    /// Command data (optional)
    pub data: Option<Bytes>,
    /// Expected length (optional)
    pub le: Option<u8>,
}

impl Command {
    /// Create a new command with just the header bytes
    pub const fn new(cla: u8, ins: u8, p1: u8, p2: u8) -> Self {
        Self {
            cla,
            ins,
            p1,
            p2,
            data: None,
            le: None,
        }
    }

    /// Set the data field
    pub fn with_data<T: Into<Bytes>>(mut self, data: T) -> Self {
        self.data = Some(data.into());
        self
    }

    /// Set the expected length field
    pub const fn with_le(mut self, le: u8) -> Self {
        self.le = Some(le);
        self
    }

    /// Command payload data
    pub fn data(&self) -> Option<&[u8]> {
        self.data.as_deref()
    }

    /// Calculate length of serialized command
    pub fn command_length(&self) -> usize {
        4 + self.data().map_or(0, |data| 1 + data.len()) + usize::from(self.le.is_some())
    }

    /// Convert to raw APDU bytes
    ///
    /// Fails if the data field does not fit a one-byte Lc.
    pub fn to_bytes(&self) -> Result<Bytes> {
        let mut buffer = BytesMut::with_capacity(self.command_length());

        buffer.put_u8(self.cla);
        buffer.put_u8(self.ins);
        buffer.put_u8(self.p1);
        buffer.put_u8(self.p2);

        if let Some(data) = self.data() {
            let lc = u8::try_from(data.len()).map_err(|_| Error::PayloadTooLarge {
                what: "APDU data",
                len: data.len(),
                max: u8::MAX as usize,
            })?;
            buffer.put_u8(lc);
            buffer.put_slice(data);
        }

        if let Some(le) = self.le {
            buffer.put_u8(le);
        }

        Ok(buffer.freeze())
    }
}

/// Serialize commands into one APDU script, each followed by GET RESPONSE
///
/// This is the plaintext that goes into a command packet.
pub fn script<'a>(commands: impl IntoIterator<Item = &'a Command>) -> Result<Vec<u8>> {
    let get_response = GetResponseCommand::all().to_bytes()?;

    let mut script = Vec::new();
    for command in commands {
        script.extend_from_slice(&command.to_bytes()?);
        script.extend_from_slice(&get_response);
    }
    Ok(script)
}
