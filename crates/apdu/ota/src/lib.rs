//! Over-the-air remote application management for SIM cards
//!
//! This crate secures GlobalPlatform card management commands as
//! ETSI TS 102 225 command packets, delivers them to a card inside SMS-PP
//! download envelopes and decodes the proof of receipt the card sends back,
//! either directly or through SEND SHORT MESSAGE proactive commands.
//!
//! # Features
//!
//! - `pcsc`: PC/SC card transport and the `ota-tool` binary
//!
//! # Examples
//!
//! ```no_run
//! # #[cfg(feature = "pcsc")]
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! use nexum_apdu_ota::transport::pcsc::PcscDeviceManager;
//! use nexum_apdu_ota::{ApplicationLifecycleManager, CapContainer, OtaKeys, OtaSession};
//!
//! let manager = PcscDeviceManager::new()?;
//! let transport = manager.open_first_with_card()?;
//!
//! let mut session = OtaSession::new(transport, OtaKeys::none());
//! session.send_terminal_profile()?;
//!
//! let cap = CapContainer::open("applet.cap")?;
//! let mut lifecycle = ApplicationLifecycleManager::new(session);
//! let package = lifecycle.load(&cap.load_file()?, None)?;
//! println!("Loaded {package}");
//! # Ok(())
//! # }
//! # #[cfg(not(feature = "pcsc"))]
//! # fn main() {}
//! ```

pub mod application;
pub mod assembler;
pub mod cap;
pub mod channel;
pub mod commands;
pub mod config;
pub mod constants;
pub mod crypto;
pub mod envelope;
pub mod error;
pub mod header;
pub mod load;
pub mod proactive;
pub mod response;
pub mod session;
pub mod tlv;
pub mod transport;
mod util;

pub use application::{ApplicationLifecycleManager, LoadState};
pub use assembler::{AssemblyPhase, ProactiveResponseAssembler};
pub use cap::{Aid, CapContainer, ComponentKind, LoadFileBuilder, LoadFileComponents};
pub use channel::{Channel, OtaKeys};
pub use config::{InstallParameters, LoadParameters, OtaProfile, ToolkitParameters};
pub use envelope::{CommandPacket, OtaEnvelope, SecureEnvelopeCodec};
pub use error::{Error, Result};
pub use header::{CommandHeader, KeysetReference, SecurityLevel, Spi, Tar};
pub use proactive::ProactiveCommand;
pub use response::{AssemblyState, StatusCode};
pub use session::{OtaSession, OtaTransport, Reply, SmppCollector};
pub use transport::{CardTransport, StatusWord, TransportError};
