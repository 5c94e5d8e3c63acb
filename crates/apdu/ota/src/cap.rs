//! CAP packages and load file construction
//!
//! A CAP file is a ZIP archive of named components. The load file sent to
//! the card is the concatenation of the components in a fixed order,
//! starting with the Header component.

use std::collections::BTreeMap;
use std::fmt;
use std::fs::File;
use std::io::{Read, Seek};
use std::path::Path;

use bytes::Bytes;
use derive_more::{AsRef, Deref};
use tracing::{debug, trace};
use zip::ZipArchive;

use crate::util::ByteReader;
use crate::{Error, Result};

/// Offset of the package AID length byte inside the Header component
///
/// tag(1) size(2) magic(4) CAP version(2) flags(1) package version(2)
const PACKAGE_AID_OFFSET: usize = 12;

/// Largest possible component: tag(1) size(2) and at most `u16::MAX` bytes
const MAX_COMPONENT_LEN: usize = 3 + u16::MAX as usize;

/// Application identifier (5 to 16 bytes)
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, AsRef, Deref)]
#[as_ref([u8])]
pub struct Aid(Bytes);

impl Aid {
    /// Smallest valid AID length
    pub const MIN_LEN: usize = 5;
    /// Largest valid AID length
    pub const MAX_LEN: usize = 16;

    /// Create an AID, checking its length
    pub fn new(aid: impl AsRef<[u8]>) -> Result<Self> {
        let aid = aid.as_ref();
        if !(Self::MIN_LEN..=Self::MAX_LEN).contains(&aid.len()) {
            return Err(Error::config(format!(
                "AID must be {}-{} bytes, got {}",
                Self::MIN_LEN,
                Self::MAX_LEN,
                aid.len()
            )));
        }
        Ok(Self(Bytes::copy_from_slice(aid)))
    }

    /// Parse an AID from hex
    pub fn from_hex(hex: &str) -> Result<Self> {
        Self::new(hex::decode(hex.trim())?)
    }

    /// The AID bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for Aid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode_upper(&self.0))
    }
}

impl fmt::Debug for Aid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Aid({self})")
    }
}

/// CAP components that make up a load file, in load order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ComponentKind {
    /// Header component (mandatory)
    Header,
    /// Directory component
    Directory,
    /// Import component
    Import,
    /// Applet component
    Applet,
    /// Class component
    Class,
    /// Method component
    Method,
    /// Static field component
    StaticField,
    /// Export component
    Export,
    /// Constant pool component
    ConstantPool,
    /// Reference location component
    RefLocation,
}

impl ComponentKind {
    /// All kinds in load order
    pub const ALL: [Self; 10] = [
        Self::Header,
        Self::Directory,
        Self::Import,
        Self::Applet,
        Self::Class,
        Self::Method,
        Self::StaticField,
        Self::Export,
        Self::ConstantPool,
        Self::RefLocation,
    ];

    /// Lower-case file name of the component inside a CAP archive
    pub const fn file_name(self) -> &'static str {
        match self {
            Self::Header => "header.cap",
            Self::Directory => "directory.cap",
            Self::Import => "import.cap",
            Self::Applet => "applet.cap",
            Self::Class => "class.cap",
            Self::Method => "method.cap",
            Self::StaticField => "staticfield.cap",
            Self::Export => "export.cap",
            Self::ConstantPool => "constantpool.cap",
            Self::RefLocation => "reflocation.cap",
        }
    }

    /// Component kind for an archive entry name, matched case-insensitively on the suffix
    ///
    /// `Descriptor`, `Debug` and anything else map to `None`.
    pub fn from_entry_name(name: &str) -> Option<Self> {
        let name = name.to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|kind| name.ends_with(kind.file_name()))
    }
}

/// Components of one package, keyed by kind
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadFileComponents {
    components: BTreeMap<ComponentKind, Bytes>,
}

impl LoadFileComponents {
    /// Empty component set
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a component
    pub fn insert(&mut self, kind: ComponentKind, data: impl Into<Bytes>) {
        self.components.insert(kind, data.into());
    }

    /// Get a component
    pub fn get(&self, kind: ComponentKind) -> Option<&[u8]> {
        self.components.get(&kind).map(Bytes::as_ref)
    }

    /// Kinds present
    pub fn kinds(&self) -> impl Iterator<Item = ComponentKind> + '_ {
        self.components.keys().copied()
    }

    /// Collect components from named entries, ignoring names that match no kind
    pub fn from_entries<N, D>(entries: impl IntoIterator<Item = (N, D)>) -> Self
    where
        N: AsRef<str>,
        D: Into<Bytes>,
    {
        let mut components = Self::new();
        for (name, data) in entries {
            match ComponentKind::from_entry_name(name.as_ref()) {
                Some(kind) => components.insert(kind, data),
                None => trace!(name = name.as_ref(), "Skipping CAP entry"),
            }
        }
        components
    }

    /// Applet AIDs from the Applet component
    ///
    /// Layout: tag(1) size(2) count(1), then per applet AID length, AID and
    /// install method offset(2).
    pub fn applet_aids(&self) -> Result<Vec<Aid>> {
        const TRUNCATED: Error = Error::MalformedHeader("truncated Applet component");

        let Some(applet) = self.get(ComponentKind::Applet) else {
            return Ok(Vec::new());
        };

        let mut reader = ByteReader::new(applet);
        reader.skip(3).ok_or(TRUNCATED)?;
        let count = reader.read_u8().ok_or(TRUNCATED)?;
        (0..count)
            .map(|_| {
                let len = reader.read_u8().ok_or(TRUNCATED)?;
                let aid = reader.take(len as usize).ok_or(TRUNCATED)?;
                reader.skip(2).ok_or(TRUNCATED)?;
                Aid::new(aid).map_err(|_| Error::MalformedHeader("invalid applet AID length"))
            })
            .collect()
    }
}

/// Builds the load file from a package's components
#[derive(Debug, Clone, Copy, Default)]
pub struct LoadFileBuilder;

impl LoadFileBuilder {
    /// Concatenate the present components in load order
    pub fn build(components: &LoadFileComponents) -> Result<Vec<u8>> {
        if components.get(ComponentKind::Header).is_none() {
            return Err(Error::MissingHeader);
        }

        let mut load_file = Vec::new();
        for kind in ComponentKind::ALL {
            if let Some(data) = components.get(kind) {
                trace!(?kind, len = data.len(), "Adding component");
                load_file.extend_from_slice(data);
            }
        }
        Ok(load_file)
    }
}

/// Package AID from a load file, which starts with the Header component
pub fn extract_package_aid(load_file: &[u8]) -> Result<Aid> {
    let len = *load_file
        .get(PACKAGE_AID_OFFSET)
        .ok_or(Error::MalformedHeader("too short for package AID"))? as usize;
    let start = PACKAGE_AID_OFFSET + 1;
    let aid = load_file
        .get(start..start + len)
        .ok_or(Error::MalformedHeader("package AID overruns the header"))?;

    Aid::new(aid).map_err(|_| Error::MalformedHeader("package AID length out of range"))
}

/// A CAP archive opened from disk or memory
#[derive(Debug, Clone)]
pub struct CapContainer {
    entries: Vec<String>,
    components: LoadFileComponents,
}

impl CapContainer {
    /// Open a CAP file
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path)?;
        Self::from_reader(file)
    }

    /// Read a CAP archive from any seekable reader
    pub fn from_reader<R: Read + Seek>(reader: R) -> Result<Self> {
        let mut zip = ZipArchive::new(reader)?;

        let mut entries = Vec::with_capacity(zip.len());
        let mut components = LoadFileComponents::new();
        for i in 0..zip.len() {
            let mut file = zip.by_index(i)?;
            let name = file.name().to_string();
            if let Some(kind) = ComponentKind::from_entry_name(&name) {
                // The declared size is only a hint
                let mut data = Vec::with_capacity((file.size() as usize).min(MAX_COMPONENT_LEN));
                (&mut file)
                    .take(MAX_COMPONENT_LEN as u64 + 1)
                    .read_to_end(&mut data)?;
                if data.len() > MAX_COMPONENT_LEN {
                    return Err(Error::PayloadTooLarge {
                        what: "CAP component",
                        len: data.len(),
                        max: MAX_COMPONENT_LEN,
                    });
                }
                components.insert(kind, data);
            }
            entries.push(name);
        }

        debug!(
            entries = entries.len(),
            components = components.components.len(),
            "Opened CAP archive"
        );
        Ok(Self {
            entries,
            components,
        })
    }

    /// All entry names in the archive
    pub fn entries(&self) -> &[String] {
        &self.entries
    }

    /// Components found in the archive
    pub const fn components(&self) -> &LoadFileComponents {
        &self.components
    }

    /// Build the load file
    pub fn load_file(&self) -> Result<Vec<u8>> {
        LoadFileBuilder::build(&self.components)
    }

    /// Package AID from the Header component
    pub fn package_aid(&self) -> Result<Aid> {
        let header = self
            .components
            .get(ComponentKind::Header)
            .ok_or(Error::MissingHeader)?;
        extract_package_aid(header)
    }
}
