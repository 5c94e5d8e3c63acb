//! Proof of receipt assembly across continuation fragments

use tracing::{debug, trace};

use crate::Result;
use crate::response::{AssemblyState, parse_response, parse_user_data};
use crate::transport::StatusWord;

/// Assembly phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssemblyPhase {
    /// Waiting for the first fragment, or for continuations
    Collecting,
    /// The last fragment has been received
    Complete,
}

/// Collects the response to one logical request
///
/// Owns no transport: the session feeds it every TPDU or user data block it
/// receives and reads the result once the request is over.
#[derive(Debug, Clone)]
pub struct ProactiveResponseAssembler {
    state: AssemblyState,
    phase: AssemblyPhase,
    fragments: usize,
}

impl Default for ProactiveResponseAssembler {
    fn default() -> Self {
        Self::new()
    }
}

impl ProactiveResponseAssembler {
    /// Start a new request
    pub fn new() -> Self {
        Self {
            state: AssemblyState::new(),
            phase: AssemblyPhase::Collecting,
            fragments: 0,
        }
    }

    /// Feed an SMS-SUBMIT TPDU from a SEND SHORT MESSAGE command
    pub fn push_tpdu(&mut self, tpdu: &[u8]) -> Result<AssemblyPhase> {
        parse_response(tpdu, &mut self.state)?;
        Ok(self.advance())
    }

    /// Feed PoR user data returned directly by the card
    pub fn push_user_data(&mut self, user_data: &[u8]) -> Result<AssemblyPhase> {
        parse_user_data(user_data, &mut self.state)?;
        Ok(self.advance())
    }

    fn advance(&mut self) -> AssemblyPhase {
        self.fragments += 1;
        self.phase = if self.state.awaiting_more {
            AssemblyPhase::Collecting
        } else {
            AssemblyPhase::Complete
        };
        trace!(fragments = self.fragments, phase = ?self.phase, "Fragment assembled");
        self.phase
    }

    /// Current phase
    pub const fn phase(&self) -> AssemblyPhase {
        self.phase
    }

    /// Whether the last fragment has been received
    pub const fn is_complete(&self) -> bool {
        matches!(self.phase, AssemblyPhase::Complete)
    }

    /// Whether anything has been received
    pub const fn has_fragments(&self) -> bool {
        self.fragments > 0
    }

    /// Decode state so far
    pub const fn state(&self) -> &AssemblyState {
        &self.state
    }

    /// Response data and the status word of the last command
    pub fn finish(self) -> (Vec<u8>, StatusWord) {
        debug!(
            fragments = self.fragments,
            complete = self.is_complete(),
            len = self.state.accumulated_response.len(),
            sw = %self.state.last_status_word,
            "Response assembled"
        );
        (self.state.accumulated_response, self.state.last_status_word)
    }
}
