//! Mailbox I/O.
//!
//! Supported on-disk formats form a closed set behind one loading capability:
//!
//! - [`BoxFormat::Mbox`]: single file, messages separated by `From ` lines
//! - [`BoxFormat::Maildir`]: directory with `cur/`, `new/` and `tmp/`
//! - [`BoxFormat::Mh`]: directory of numbered message files
//!
//! The format is either forced by the caller or detected from the path.
//! Every loaded message carries a [`SourceRef`] that is enough to locate it
//! again for copy, move or delete actions.
//!
//! # Example
//!
//! ```no_run
//! use maildedup::mailbox::open_all;
//! use std::path::PathBuf;
//!
//! let boxes = open_all(&[PathBuf::from("/home/user/Maildir")], None).unwrap();
//! for mailbox in &boxes {
//!     let messages = mailbox.messages().unwrap();
//!     println!("{}: {} messages", mailbox.path().display(), messages.len());
//! }
//! ```

pub mod maildir;
pub mod mbox;
pub mod mh;
pub mod source;

use std::fmt;
use std::fs::Metadata;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use maildir::MaildirStore;
pub use mbox::MboxStore;
pub use mh::MhStore;
pub use source::{Location, SourceRef};

/// Errors raised while opening, reading or writing mailboxes.
#[derive(Debug, Error)]
pub enum MailboxError {
    /// The mailbox path does not exist.
    #[error("mailbox not found: {0}")]
    NotFound(PathBuf),

    /// Autodetection could not recognize the layout.
    #[error("cannot detect mailbox format of {0}")]
    UnknownFormat(PathBuf),

    /// The path does not have the layout of the requested format.
    #[error("{path} is not a valid {format} mailbox")]
    InvalidLayout { path: PathBuf, format: BoxFormat },

    /// Another process holds the mailbox lock.
    #[error("mailbox {0} is locked (use --force-unlock to remove a stale lock)")]
    Locked(PathBuf),

    /// The mailbox changed on disk since it was loaded.
    #[error("mailbox {0} changed since it was loaded")]
    Modified(PathBuf),

    /// General I/O error.
    #[error("I/O error for {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// On-disk mailbox formats.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum, Default,
)]
#[serde(rename_all = "kebab-case")]
pub enum BoxFormat {
    /// Single-file store
    #[default]
    Mbox,
    /// Directory store with cur/new/tmp
    Maildir,
    /// Directory of numbered files
    Mh,
}

impl fmt::Display for BoxFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BoxFormat::Mbox => write!(f, "mbox"),
            BoxFormat::Maildir => write!(f, "maildir"),
            BoxFormat::Mh => write!(f, "mh"),
        }
    }
}

/// One message as handed over by a mailbox, before any parsing.
#[derive(Debug, Clone)]
pub struct RawMessage {
    /// Stable reference to the physical message.
    pub source_ref: SourceRef,
    /// Full message bytes, headers and body.
    pub bytes: Vec<u8>,
    /// Time provided by the store itself (file creation or modification time).
    pub store_timestamp: Option<DateTime<Utc>>,
}

/// An opened mailbox of any supported format.
#[derive(Debug, Clone)]
pub enum Mailbox {
    Mbox(MboxStore),
    Maildir(MaildirStore),
    Mh(MhStore),
}

impl Mailbox {
    /// Open a mailbox, detecting its format unless one is forced.
    ///
    /// # Errors
    ///
    /// Returns `MailboxError` if the path is missing, unrecognized, or does
    /// not match the forced format.
    pub fn open(path: &Path, format: Option<BoxFormat>) -> Result<Self, MailboxError> {
        let format = match format {
            Some(format) => format,
            None => detect_format(path)?,
        };
        log::debug!("Opening {} as {}", path.display(), format);
        Ok(match format {
            BoxFormat::Mbox => Mailbox::Mbox(MboxStore::open(path)?),
            BoxFormat::Maildir => Mailbox::Maildir(MaildirStore::open(path)?),
            BoxFormat::Mh => Mailbox::Mh(MhStore::open(path)?),
        })
    }

    #[must_use]
    pub fn format(&self) -> BoxFormat {
        match self {
            Mailbox::Mbox(_) => BoxFormat::Mbox,
            Mailbox::Maildir(_) => BoxFormat::Maildir,
            Mailbox::Mh(_) => BoxFormat::Mh,
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        match self {
            Mailbox::Mbox(store) => store.path(),
            Mailbox::Maildir(store) => store.path(),
            Mailbox::Mh(store) => store.path(),
        }
    }

    /// Load every message of this mailbox.
    ///
    /// # Errors
    ///
    /// Returns `MailboxError::Io` on read failure.
    pub fn messages(&self) -> Result<Vec<RawMessage>, MailboxError> {
        match self {
            Mailbox::Mbox(store) => store.messages(),
            Mailbox::Maildir(store) => store.messages(),
            Mailbox::Mh(store) => store.messages(),
        }
    }
}

/// Guess the format of a mailbox path.
///
/// A regular file is an mbox; a directory with `cur/new/tmp` is a maildir;
/// a directory with `.mh_sequences` or numbered files is an MH folder.
///
/// # Errors
///
/// Returns `MailboxError::NotFound` or `MailboxError::UnknownFormat`.
pub fn detect_format(path: &Path) -> Result<BoxFormat, MailboxError> {
    if !path.exists() {
        return Err(MailboxError::NotFound(path.to_path_buf()));
    }
    if path.is_file() {
        return Ok(BoxFormat::Mbox);
    }
    if maildir::is_maildir(path) {
        return Ok(BoxFormat::Maildir);
    }
    if mh::is_mh(path) {
        return Ok(BoxFormat::Mh);
    }
    Err(MailboxError::UnknownFormat(path.to_path_buf()))
}

/// Open every source path, expanding maildir sub-folders into their own boxes.
///
/// # Errors
///
/// Fails on the first path that cannot be opened.
pub fn open_all(paths: &[PathBuf], format: Option<BoxFormat>) -> Result<Vec<Mailbox>, MailboxError> {
    let mut boxes = Vec::with_capacity(paths.len());
    for path in paths {
        let mailbox = Mailbox::open(path, format)?;
        if let Mailbox::Maildir(store) = &mailbox {
            for sub in store.subfolders() {
                log::debug!("Found maildir sub-folder {}", sub.display());
                boxes.push(Mailbox::Maildir(MaildirStore::open(sub)?));
            }
        }
        boxes.push(mailbox);
    }
    Ok(boxes)
}

/// Target mailbox receiving copied or moved messages.
#[derive(Debug, Clone)]
pub struct ExportBox {
    path: PathBuf,
    format: BoxFormat,
    force_unlock: bool,
}

impl ExportBox {
    /// Create the export mailbox.
    ///
    /// An existing path is only reused when `append` is set.
    ///
    /// # Errors
    ///
    /// Returns `MailboxError::Io` if the path exists without `append`, or
    /// cannot be created.
    pub fn create(
        path: &Path,
        format: BoxFormat,
        append: bool,
        force_unlock: bool,
    ) -> Result<Self, MailboxError> {
        match format {
            BoxFormat::Mbox => {
                if !(append && path.is_file()) {
                    mbox::create(path)?;
                }
            }
            BoxFormat::Maildir => maildir::create(path, append)?,
            BoxFormat::Mh => mh::create(path, append)?,
        }
        log::info!("Exporting to {} ({})", path.display(), format);
        Ok(Self {
            path: path.to_path_buf(),
            format,
            force_unlock,
        })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Add one message to the export mailbox.
    ///
    /// # Errors
    ///
    /// Returns `MailboxError` on lock or write failure.
    pub fn add(&self, message: &[u8]) -> Result<(), MailboxError> {
        match self.format {
            BoxFormat::Mbox => mbox::append(&self.path, message, self.force_unlock),
            BoxFormat::Maildir => maildir::deliver(&self.path, message).map(|_| ()),
            BoxFormat::Mh => mh::deliver(&self.path, message).map(|_| ()),
        }
    }
}

/// Creation time where the platform reports one, modification time otherwise.
pub(crate) fn store_timestamp(metadata: &Metadata) -> Option<DateTime<Utc>> {
    metadata
        .created()
        .or_else(|_| metadata.modified())
        .ok()
        .map(DateTime::<Utc>::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_detect_format() {
        let dir = tempdir().unwrap();
        let mbox = dir.path().join("archive");
        fs::write(&mbox, b"").unwrap();
        assert_eq!(detect_format(&mbox).unwrap(), BoxFormat::Mbox);

        let md = dir.path().join("md");
        maildir::create(&md, false).unwrap();
        assert_eq!(detect_format(&md).unwrap(), BoxFormat::Maildir);

        let folder = dir.path().join("mh");
        mh::create(&folder, false).unwrap();
        assert_eq!(detect_format(&folder).unwrap(), BoxFormat::Mh);

        let empty = dir.path().join("empty");
        fs::create_dir(&empty).unwrap();
        assert!(matches!(
            detect_format(&empty),
            Err(MailboxError::UnknownFormat(_))
        ));
        assert!(matches!(
            detect_format(&dir.path().join("missing")),
            Err(MailboxError::NotFound(_))
        ));
    }

    #[test]
    fn test_forced_format_mismatch() {
        let dir = tempdir().unwrap();
        let result = Mailbox::open(dir.path(), Some(BoxFormat::Maildir));
        assert!(matches!(result, Err(MailboxError::InvalidLayout { .. })));
    }

    #[test]
    fn test_open_all_expands_subfolders() {
        let dir = tempdir().unwrap();
        maildir::create(dir.path(), true).unwrap();
        maildir::create(&dir.path().join(".Archive"), false).unwrap();

        let boxes = open_all(&[dir.path().to_path_buf()], None).unwrap();
        assert_eq!(boxes.len(), 2);
        assert!(boxes.iter().all(|b| b.format() == BoxFormat::Maildir));
    }

    #[test]
    fn test_export_box_refuses_existing_mbox() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out.mbox");
        fs::write(&path, b"").unwrap();

        assert!(ExportBox::create(&path, BoxFormat::Mbox, false, false).is_err());
        let export = ExportBox::create(&path, BoxFormat::Mbox, true, false).unwrap();
        export.add(b"Subject: a\n\nb\n").unwrap();
        let messages = MboxStore::open(&path).unwrap().messages().unwrap();
        assert_eq!(messages.len(), 1);
    }
}
