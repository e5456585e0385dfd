use std::fs;

use thiserror::Error;

use crate::apply::{file_times, mode_bits};
use crate::time::TimePair;

/// Permission bits retained by the protocol.
const MODE_MASK: u32 = 0o777;

/// Classification of a transfer participant.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum EntryKind {
    /// A regular file with a byte body.
    File,
    /// A directory opening a nesting level.
    Directory,
}

/// Error returned when a name cannot appear in an scp header.
#[derive(Debug, Error)]
#[error("invalid scp entry name {name:?}: {reason}")]
pub struct InvalidEntryName {
    name: String,
    reason: &'static str,
}

impl InvalidEntryName {
    /// Returns the rejected name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}

fn validate_name(name: &str) -> Result<(), InvalidEntryName> {
    let reason = if name.is_empty() {
        Some("name is empty")
    } else if name.contains('/') {
        Some("name contains a path separator")
    } else if name.contains('\n') {
        Some("name contains a newline")
    } else if name == "." || name == ".." {
        Some("name is a relative path component")
    } else {
        None
    };
    match reason {
        Some(reason) => Err(InvalidEntryName {
            name: name.to_string(),
            reason,
        }),
        None => Ok(()),
    }
}

/// Descriptor for one file or directory participating in a transfer.
///
/// Constructed either from a local `stat` result on the sending side or
/// from an incoming header on the receiving side, and immutable thereafter.
#[derive(Clone, Debug)]
pub struct EntryInfo {
    name: String,
    size: u64,
    mode: u32,
    kind: EntryKind,
    times: Option<TimePair>,
}

impl EntryInfo {
    /// Describes a regular file.
    pub fn file(
        name: impl Into<String>,
        size: u64,
        mode: u32,
    ) -> Result<Self, InvalidEntryName> {
        let name = name.into();
        validate_name(&name)?;
        Ok(Self {
            name,
            size,
            mode: mode & MODE_MASK,
            kind: EntryKind::File,
            times: None,
        })
    }

    /// Describes a directory. Directories always report size zero.
    pub fn directory(name: impl Into<String>, mode: u32) -> Result<Self, InvalidEntryName> {
        let name = name.into();
        validate_name(&name)?;
        Ok(Self {
            name,
            size: 0,
            mode: mode & MODE_MASK,
            kind: EntryKind::Directory,
            times: None,
        })
    }

    /// Builds a descriptor from a local `stat` result.
    ///
    /// Timestamps are attached when the filesystem reports both the
    /// modification and the access time; otherwise the descriptor carries
    /// none and no `T` record will be emitted for it.
    pub fn from_fs_metadata(
        name: impl Into<String>,
        metadata: &fs::Metadata,
    ) -> Result<Self, InvalidEntryName> {
        let mut info = if metadata.is_dir() {
            Self::directory(name, mode_bits(metadata))?
        } else {
            Self::file(name, metadata.len(), mode_bits(metadata))?
        };
        info.times = file_times(metadata);
        Ok(info)
    }

    /// Attaches a modification/access time pair.
    #[must_use]
    pub fn with_times(mut self, times: TimePair) -> Self {
        self.times = Some(times);
        self
    }

    /// Returns a copy of the descriptor under a different basename.
    pub fn renamed(&self, name: impl Into<String>) -> Result<Self, InvalidEntryName> {
        let name = name.into();
        validate_name(&name)?;
        let mut renamed = self.clone();
        renamed.name = name;
        Ok(renamed)
    }

    /// Returns the basename transmitted in the header.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the body length in bytes; always zero for directories.
    #[must_use]
    pub const fn size(&self) -> u64 {
        self.size
    }

    /// Returns the nine permission bits.
    #[must_use]
    pub const fn mode(&self) -> u32 {
        self.mode
    }

    /// Returns the entry classification.
    #[must_use]
    pub const fn kind(&self) -> EntryKind {
        self.kind
    }

    /// Reports whether the entry is a directory.
    #[must_use]
    pub fn is_dir(&self) -> bool {
        self.kind == EntryKind::Directory
    }

    /// Returns the timestamp pair, when known.
    #[must_use]
    pub const fn times(&self) -> Option<&TimePair> {
        self.times.as_ref()
    }
}
