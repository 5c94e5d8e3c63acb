//! SIM toolkit commands (TS 51.011 / TS 102 221 class A0)

use derive_more::{AsRef, Deref};

use super::Command;
use crate::constants::{TERMINAL_PROFILE, cla, ins};

/// ENVELOPE command
#[derive(Debug, Clone, PartialEq, Eq, AsRef, Deref)]
pub struct EnvelopeCommand(Command);

impl EnvelopeCommand {
    /// ENVELOPE carrying an SMS-PP download (`D1`) TLV
    pub fn sms_pp_download(download: impl Into<bytes::Bytes>) -> Self {
        Self(
            Command::new(cla::SIM, ins::ENVELOPE, 0x00, 0x00)
                .with_data(download)
                .with_le(0x00),
        )
    }
}

/// FETCH command
#[derive(Debug, Clone, PartialEq, Eq, AsRef, Deref)]
pub struct FetchCommand(Command);

impl FetchCommand {
    /// Fetch a pending proactive command of `length` bytes (SW2 of `91xx`)
    pub const fn with_length(length: u8) -> Self {
        Self(Command::new(cla::SIM, ins::FETCH, 0x00, 0x00).with_le(length))
    }
}

/// TERMINAL RESPONSE command
#[derive(Debug, Clone, PartialEq, Eq, AsRef, Deref)]
pub struct TerminalResponseCommand(Command);

impl TerminalResponseCommand {
    /// TERMINAL RESPONSE with the given simple-TLV objects
    pub fn with_data(data: impl Into<bytes::Bytes>) -> Self {
        Self(Command::new(cla::SIM, ins::TERMINAL_RESPONSE, 0x00, 0x00).with_data(data))
    }
}

/// TERMINAL PROFILE command
#[derive(Debug, Clone, PartialEq, Eq, AsRef, Deref)]
pub struct TerminalProfileCommand(Command);

impl TerminalProfileCommand {
    /// TERMINAL PROFILE with an explicit profile
    pub fn with_profile(profile: impl Into<bytes::Bytes>) -> Self {
        Self(Command::new(cla::SIM, ins::TERMINAL_PROFILE, 0x00, 0x00).with_data(profile))
    }
}

impl Default for TerminalProfileCommand {
    fn default() -> Self {
        Self::with_profile(TERMINAL_PROFILE.to_vec())
    }
}
