//! Remote application lifecycle management
//!
//! This module provides [`ApplicationLifecycleManager`], which runs the
//! GlobalPlatform card management operations over OTA command packets:
//! delete, load, install and the status queries. Every operation is one or
//! more requests on a fixed channel and fails unless each request ends in
//! `9000`.

use std::fmt;

use bytes::Bytes;
use tracing::{debug, info};

use crate::cap::{Aid, extract_package_aid};
use crate::commands::{
    ApplicationRecord, Command, DeleteCommand, GetStatusCommand, InstallCommand, LoadCommand,
    parse_application_records, parse_security_domain_aid, script,
};
use crate::config::{InstallParameters, LoadParameters};
use crate::constants::status;
use crate::load::{BLOCK_SIZE, LoadCommandStream};
use crate::session::{OtaTransport, Reply};
use crate::{Channel, Error, Result};

/// Upper bound on GET STATUS continuations
const MAX_STATUS_ROUNDS: usize = 64;

/// LOAD header plus the GET RESPONSE that follows it in the same packet
const LOAD_SCRIPT_OVERHEAD: usize = 5 + 5;

/// Progress of a load operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadState {
    /// Sending INSTALL [for load]
    InstallForLoad,
    /// Sending a LOAD block
    Loading {
        /// Block index, starting at 0
        block: usize,
        /// Total number of blocks
        blocks: usize,
    },
    /// All blocks accepted
    Done,
}

impl fmt::Display for LoadState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InstallForLoad => write!(f, "install for load"),
            Self::Loading { block, blocks } => write!(f, "block {} of {blocks}", block + 1),
            Self::Done => write!(f, "done"),
        }
    }
}

/// Remote card manager
#[derive(Debug)]
pub struct ApplicationLifecycleManager<S: OtaTransport> {
    session: S,
    block_size: Option<usize>,
}

impl<S: OtaTransport> ApplicationLifecycleManager<S> {
    /// Create a manager on top of an OTA transport
    pub const fn new(session: S) -> Self {
        Self {
            session,
            block_size: None,
        }
    }

    /// Use LOAD blocks of `block_size` bytes instead of the largest that fits
    pub const fn with_block_size(mut self, block_size: usize) -> Self {
        self.block_size = Some(block_size);
        self
    }

    /// Change the LOAD block size for later loads
    pub const fn set_block_size(&mut self, block_size: usize) {
        self.block_size = Some(block_size);
    }

    /// LOAD block size for the next load
    ///
    /// Unless set explicitly, this is the largest block whose LOAD command
    /// and trailing GET RESPONSE fit one RAM packet, at most [`BLOCK_SIZE`].
    pub fn block_size(&self) -> Result<usize> {
        if let Some(block_size) = self.block_size {
            return Ok(block_size);
        }
        let max_payload = self.session.max_payload(Channel::Ram)?;
        Ok(max_payload.saturating_sub(LOAD_SCRIPT_OVERHEAD).min(BLOCK_SIZE))
    }

    /// Underlying transport
    pub const fn session(&self) -> &S {
        &self.session
    }

    /// Underlying transport, mutably
    pub const fn session_mut(&mut self) -> &mut S {
        &mut self.session
    }

    /// Give back the transport
    pub fn into_inner(self) -> S {
        self.session
    }

    /// Send one command in a command packet and require `9000`
    fn execute(&mut self, channel: Channel, command: &Command) -> Result<Reply> {
        let payload = script([command])?;
        self.session
            .send_packet(channel, &payload)?
            .expect(status::SUCCESS)
    }

    /// Delete a load file or instance
    ///
    /// With `related`, instances of a load file are deleted along with it.
    pub fn delete(&mut self, aid: &Aid, related: bool) -> Result<()> {
        let cmd = if related {
            DeleteCommand::delete_object_and_related(aid)
        } else {
            DeleteCommand::delete_object(aid)
        };
        self.execute(Channel::Ram, &cmd)?;
        info!(%aid, related, "Deleted");
        Ok(())
    }

    /// Announce a load file with INSTALL [for load]
    pub fn install_for_load(&mut self, load_file_aid: &Aid, params: &LoadParameters) -> Result<()> {
        let cmd = InstallCommand::for_load(load_file_aid, params.encode())?;
        self.execute(Channel::Ram, &cmd)?;
        Ok(())
    }

    /// Load a load file: INSTALL [for load] followed by every LOAD block
    ///
    /// The package AID is taken from the Header component at the start of
    /// `load_file`. The callback, if any, is called with the number of
    /// blocks sent and the total after each accepted block. Any status other
    /// than `9000` aborts the load; it has to be restarted from the
    /// beginning.
    pub fn load(
        &mut self,
        load_file: &[u8],
        mut callback: Option<&mut dyn FnMut(usize, usize) -> Result<()>>,
    ) -> Result<Aid> {
        let aid = extract_package_aid(load_file)?;
        let block_size = self.block_size()?;
        let mut stream = LoadCommandStream::from_load_file(load_file, block_size)?;
        let blocks = stream.blocks_count();

        let mut state = LoadState::InstallForLoad;
        debug!(%aid, %state, block_size, "Loading");
        self.install_for_load(&aid, &LoadParameters::for_load_file(load_file)?)?;

        while let Some(block) = stream.next_block() {
            state = LoadState::Loading {
                block: usize::from(block.sequence),
                blocks,
            };
            info!("Loading {state}");

            let cmd = LoadCommand::from(&block);
            self.execute(Channel::Ram, &cmd)?;

            if let Some(cb) = callback.as_mut() {
                cb(stream.current_block(), blocks)?;
            }
        }

        state = LoadState::Done;
        info!(%aid, blocks, %state, "Load file loaded");
        Ok(aid)
    }

    /// Create and make selectable an instance of a module
    pub fn install(
        &mut self,
        package_aid: &Aid,
        module_aid: &Aid,
        instance_aid: &Aid,
        params: &InstallParameters,
    ) -> Result<()> {
        let cmd = InstallCommand::for_install_and_make_selectable(
            package_aid,
            module_aid,
            instance_aid,
            params.encode()?,
        )?;
        self.execute(Channel::Ram, &cmd)?;
        info!(%package_aid, %module_aid, %instance_aid, "Installed");
        Ok(())
    }

    /// Executable load files on the card and their modules
    ///
    /// Follows `6310` replies with GET STATUS [next] until the card has
    /// reported everything.
    pub fn list_applications(&mut self) -> Result<Vec<ApplicationRecord>> {
        let mut data = Vec::new();
        let mut next = false;
        for _ in 0..MAX_STATUS_ROUNDS {
            let cmd = GetStatusCommand::executable_load_files_and_modules(next);
            let payload = script([&*cmd])?;
            let reply = self.session.send_packet(Channel::Ram, &payload)?;
            data.extend_from_slice(&reply.data);

            if reply.status != status::MORE_DATA {
                reply.expect(status::SUCCESS)?;
                let records = parse_application_records(&data)?;
                debug!(count = records.len(), "Listed load files");
                return Ok(records);
            }
            next = true;
        }
        Err(Error::MalformedResponse("GET STATUS did not terminate"))
    }

    /// AID of the issuer security domain
    pub fn security_domain_aid(&mut self) -> Result<Bytes> {
        let cmd = GetStatusCommand::issuer_security_domain();
        let reply = self.execute(Channel::Ram, &cmd)?;
        parse_security_domain_aid(&reply.data)
    }

    /// Run a plaintext APDU script against the SIM or USIM file system
    ///
    /// The reply is returned as is; the caller interprets the status word.
    pub fn remote_file_management(&mut self, usim: bool, apdus: &[u8]) -> Result<Reply> {
        let channel = if usim {
            Channel::RfmUsim
        } else {
            Channel::RfmSim
        };
        self.session.send_packet(channel, apdus)
    }
}
