//! Stable references from a loaded message back to its physical origin.

use std::fmt;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use serde::{Serialize, Serializer};

use super::{mbox, MailboxError};

/// Where a message lives inside its mailbox.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Location {
    /// One file per message (maildir, MH).
    File(PathBuf),
    /// A byte range of a single-file store, envelope line included (mbox).
    Span {
        /// Offset of the `From ` envelope line.
        offset: u64,
        /// Length of the entry up to the next envelope line.
        len: u64,
    },
}

/// Opaque, totally ordered handle identifying a message's origin.
///
/// The ordering is the deterministic tie-breaker used by every selection
/// strategy, so it must only depend on the mailbox path and the location.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SourceRef {
    mailbox: PathBuf,
    location: Location,
}

impl SourceRef {
    /// Reference a message stored in its own file.
    #[must_use]
    pub fn file(mailbox: impl Into<PathBuf>, path: impl Into<PathBuf>) -> Self {
        Self {
            mailbox: mailbox.into(),
            location: Location::File(path.into()),
        }
    }

    /// Reference a message stored as a span of a single-file mailbox.
    #[must_use]
    pub fn span(mailbox: impl Into<PathBuf>, offset: u64, len: u64) -> Self {
        Self {
            mailbox: mailbox.into(),
            location: Location::Span { offset, len },
        }
    }

    /// Path of the mailbox the message was loaded from.
    #[must_use]
    pub fn mailbox(&self) -> &Path {
        &self.mailbox
    }

    #[must_use]
    pub fn location(&self) -> &Location {
        &self.location
    }

    /// Path matched by the path-based strategies.
    ///
    /// The message file for directory stores, the mailbox file for mbox.
    #[must_use]
    pub fn path(&self) -> &Path {
        match &self.location {
            Location::File(path) => path,
            Location::Span { .. } => &self.mailbox,
        }
    }

    /// Short identifier of the message within its mailbox.
    #[must_use]
    pub fn id(&self) -> String {
        match &self.location {
            Location::File(path) => path
                .strip_prefix(&self.mailbox)
                .unwrap_or(path)
                .display()
                .to_string(),
            Location::Span { offset, .. } => offset.to_string(),
        }
    }

    /// Re-read the message bytes (headers and body) from disk.
    ///
    /// # Errors
    ///
    /// Returns `MailboxError::Io` if the file cannot be opened or is shorter
    /// than the recorded span.
    pub fn load(&self) -> Result<Vec<u8>, MailboxError> {
        let io_err = |source| MailboxError::Io {
            path: self.path().to_path_buf(),
            source,
        };
        match &self.location {
            Location::File(path) => std::fs::read(path).map_err(io_err),
            Location::Span { offset, len } => {
                let mut file = File::open(&self.mailbox).map_err(io_err)?;
                file.seek(SeekFrom::Start(*offset)).map_err(io_err)?;
                let mut entry = vec![0u8; usize::try_from(*len).unwrap_or(usize::MAX)];
                file.read_exact(&mut entry).map_err(io_err)?;
                Ok(mbox::strip_envelope(&entry).to_vec())
            }
        }
    }
}

impl fmt::Display for SourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.location {
            Location::File(path) => write!(f, "{}", path.display()),
            Location::Span { offset, .. } => write!(f, "{}:{}", self.mailbox.display(), offset),
        }
    }
}

impl Serialize for SourceRef {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}
