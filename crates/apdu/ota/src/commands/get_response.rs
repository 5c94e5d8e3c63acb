//! GET RESPONSE commands
//!
//! The ISO 7816 variant is appended to every GlobalPlatform command in a
//! script; the SIM class variant collects the proof of receipt after an
//! ENVELOPE answered with `9Exx` or `9Fxx`.

use derive_more::{AsRef, Deref};

use super::Command;
use crate::constants::{cla, ins};

/// GET RESPONSE command
#[derive(Debug, Clone, PartialEq, Eq, AsRef, Deref)]
pub struct GetResponseCommand(Command);

impl GetResponseCommand {
    /// Create a GET RESPONSE command with expected length
    pub const fn with_length(length: u8) -> Self {
        Self(Command::new(cla::ISO7816, ins::GET_RESPONSE, 0x00, 0x00).with_le(length))
    }

    /// GET RESPONSE for whatever the card has available (`00 C0 00 00 00`)
    pub const fn all() -> Self {
        Self::with_length(0x00)
    }

    /// SIM class GET RESPONSE (`A0 C0 00 00 xx`)
    pub const fn sim(length: u8) -> Self {
        Self(Command::new(cla::SIM, ins::GET_RESPONSE, 0x00, 0x00).with_le(length))
    }
}
