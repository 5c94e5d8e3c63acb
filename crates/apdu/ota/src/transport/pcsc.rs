//! PC/SC card transport

use std::ffi::CString;
use std::fmt;

use bytes::Bytes;
use pcsc::{Card, Context, Disposition, Protocols, ReaderState, Scope, ShareMode, State};
use tracing::debug;

use super::{CardTransport, TransportError};

fn device_error(e: pcsc::Error) -> TransportError {
    TransportError::Device(e.to_string())
}

/// A reader known to PC/SC
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PcscReader {
    name: String,
    has_card: bool,
}

impl PcscReader {
    /// Reader name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether a card is present
    pub const fn has_card(&self) -> bool {
        self.has_card
    }
}

/// Transport implementation using PC/SC
pub struct PcscTransport {
    /// PC/SC context
    context: Context,
    /// Card connection, if established
    card: Option<Card>,
    /// Reader name
    reader_name: String,
}

impl fmt::Debug for PcscTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PcscTransport")
            .field("reader_name", &self.reader_name)
            .field("has_card", &self.card.is_some())
            .finish()
    }
}

impl PcscTransport {
    fn new(context: Context, reader_name: &str) -> Result<Self, TransportError> {
        let mut transport = Self {
            context,
            card: None,
            reader_name: reader_name.to_string(),
        };
        transport.connect_card()?;
        Ok(transport)
    }

    fn connect_card(&mut self) -> Result<(), TransportError> {
        if self.card.is_some() {
            return Ok(());
        }

        let reader = CString::new(self.reader_name.clone())
            .map_err(|_| TransportError::ReaderNotFound(self.reader_name.clone()))?;
        match self
            .context
            .connect(&reader, ShareMode::Shared, Protocols::ANY)
        {
            Ok(card) => {
                debug!(reader = %self.reader_name, "Connected to card");
                self.card = Some(card);
                Ok(())
            }
            Err(pcsc::Error::NoSmartcard) => Err(TransportError::NoCard),
            Err(pcsc::Error::UnknownReader) => {
                Err(TransportError::ReaderNotFound(self.reader_name.clone()))
            }
            Err(e) => Err(device_error(e)),
        }
    }

    /// Reader name
    pub fn reader_name(&self) -> &str {
        &self.reader_name
    }

    /// ATR of the current card
    pub fn atr(&self) -> Result<Vec<u8>, TransportError> {
        let card = self.card.as_ref().ok_or(TransportError::NoCard)?;
        card.get_attribute_owned(pcsc::Attribute::AtrString)
            .map_err(device_error)
    }
}

impl CardTransport for PcscTransport {
    fn transmit_raw(&mut self, command: &[u8]) -> Result<Bytes, TransportError> {
        self.connect_card()?;
        let card = self.card.as_mut().ok_or(TransportError::NoCard)?;

        let mut buffer = [0u8; pcsc::MAX_BUFFER_SIZE];
        match card.transmit(command, &mut buffer) {
            Ok(response) => Ok(Bytes::copy_from_slice(response)),
            Err(e) => {
                // Forget the connection so the next call reconnects
                if matches!(e, pcsc::Error::ResetCard | pcsc::Error::RemovedCard) {
                    self.card = None;
                }
                Err(device_error(e))
            }
        }
    }

    fn reset(&mut self) -> Result<(), TransportError> {
        if let Some(card) = self.card.take() {
            let _ = card.disconnect(Disposition::ResetCard);
        }
        self.connect_card()
    }
}

impl Drop for PcscTransport {
    fn drop(&mut self) {
        if let Some(card) = self.card.take() {
            let _ = card.disconnect(Disposition::LeaveCard);
        }
    }
}

/// Manager for PC/SC readers
#[allow(missing_debug_implementations)]
pub struct PcscDeviceManager {
    context: Context,
}

impl PcscDeviceManager {
    /// Establish a PC/SC context
    pub fn new() -> Result<Self, TransportError> {
        let context = Context::establish(Scope::User).map_err(device_error)?;
        Ok(Self { context })
    }

    /// List readers and whether each holds a card
    pub fn list_readers(&self) -> Result<Vec<PcscReader>, TransportError> {
        let names = match self.context.list_readers_owned() {
            Ok(names) => names,
            Err(pcsc::Error::NoReadersAvailable) => return Ok(Vec::new()),
            Err(e) => return Err(device_error(e)),
        };

        let mut states: Vec<ReaderState> = names
            .iter()
            .map(|name| ReaderState::new(name.as_c_str(), State::UNAWARE))
            .collect();
        let known = self.context.get_status_change(None, &mut states).is_ok();

        Ok(states
            .iter()
            .map(|state| PcscReader {
                name: state.name().to_string_lossy().into_owned(),
                has_card: known && state.event_state().contains(State::PRESENT),
            })
            .collect())
    }

    /// Connect to the named reader
    pub fn open_reader(&self, reader_name: &str) -> Result<PcscTransport, TransportError> {
        PcscTransport::new(self.context.clone(), reader_name)
    }

    /// Connect to the first reader holding a card
    pub fn open_first_with_card(&self) -> Result<PcscTransport, TransportError> {
        let reader = self
            .list_readers()?
            .into_iter()
            .find(PcscReader::has_card)
            .ok_or(TransportError::NoCard)?;
        self.open_reader(reader.name())
    }
}
