//! Directory-per-message `maildir` stores.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

use walkdir::WalkDir;

use super::{store_timestamp, BoxFormat, MailboxError, RawMessage, SourceRef};

const SUBDIRS: [&str; 3] = ["cur", "new", "tmp"];

static DELIVERY_COUNTER: AtomicUsize = AtomicUsize::new(0);

/// A maildir folder opened for reading.
#[derive(Debug, Clone)]
pub struct MaildirStore {
    path: PathBuf,
}

impl MaildirStore {
    /// Open an existing maildir.
    ///
    /// # Errors
    ///
    /// Returns `MailboxError::InvalidLayout` if any of `cur/`, `new/` or
    /// `tmp/` is missing.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, MailboxError> {
        let path = path.into();
        if !path.exists() {
            return Err(MailboxError::NotFound(path));
        }
        if !is_maildir(&path) {
            return Err(MailboxError::InvalidLayout {
                path,
                format: BoxFormat::Maildir,
            });
        }
        Ok(Self { path })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Nested `.Folder` maildirs, as used by Courier and Dovecot.
    #[must_use]
    pub fn subfolders(&self) -> Vec<PathBuf> {
        WalkDir::new(&self.path)
            .min_depth(1)
            .max_depth(1)
            .sort_by_file_name()
            .into_iter()
            .filter_map(Result::ok)
            .filter(|entry| entry.file_type().is_dir())
            .filter(|entry| entry.file_name().to_string_lossy().starts_with('.'))
            .map(walkdir::DirEntry::into_path)
            .filter(|path| is_maildir(path))
            .collect()
    }

    /// Load every message from `new/` and `cur/`.
    ///
    /// # Errors
    ///
    /// Returns `MailboxError::Io` if a message file cannot be read.
    pub fn messages(&self) -> Result<Vec<RawMessage>, MailboxError> {
        let mut messages = Vec::new();
        for sub in ["new", "cur"] {
            for entry in WalkDir::new(self.path.join(sub))
                .min_depth(1)
                .max_depth(1)
                .sort_by_file_name()
            {
                let entry = entry.map_err(|e| MailboxError::Io {
                    path: self.path.join(sub),
                    source: e.into(),
                })?;
                if !entry.file_type().is_file() || entry.file_name().to_string_lossy().starts_with('.') {
                    continue;
                }
                let path = entry.into_path();
                let bytes = fs::read(&path).map_err(|source| MailboxError::Io {
                    path: path.clone(),
                    source,
                })?;
                let timestamp = fs::metadata(&path).ok().and_then(|meta| store_timestamp(&meta));
                messages.push(RawMessage {
                    source_ref: SourceRef::file(&self.path, path),
                    bytes,
                    store_timestamp: timestamp,
                });
            }
        }
        log::debug!("{}: {} maildir messages", self.path.display(), messages.len());
        Ok(messages)
    }
}

/// Whether `path` has the `cur/new/tmp` triplet.
#[must_use]
pub fn is_maildir(path: &Path) -> bool {
    SUBDIRS.iter().all(|sub| path.join(sub).is_dir())
}

/// Create an empty maildir, refusing to reuse an existing path unless `append`.
///
/// # Errors
///
/// Returns `MailboxError::Io` if the directory exists (and `append` is false)
/// or cannot be created.
pub fn create(path: &Path, append: bool) -> Result<(), MailboxError> {
    let io_err = |source| MailboxError::Io {
        path: path.to_path_buf(),
        source,
    };
    if path.exists() && !append {
        return Err(io_err(std::io::Error::new(
            std::io::ErrorKind::AlreadyExists,
            "export maildir already exists",
        )));
    }
    for sub in SUBDIRS {
        fs::create_dir_all(path.join(sub)).map_err(io_err)?;
    }
    Ok(())
}

/// Deliver a message into `new/` through `tmp/`.
///
/// # Errors
///
/// Returns `MailboxError::Io` on write or rename failure.
pub fn deliver(maildir: &Path, message: &[u8]) -> Result<PathBuf, MailboxError> {
    let name = format!(
        "{}.M{}P{}Q{}.maildedup",
        chrono::Utc::now().timestamp(),
        chrono::Utc::now().timestamp_subsec_micros(),
        std::process::id(),
        DELIVERY_COUNTER.fetch_add(1, Ordering::Relaxed)
    );
    let tmp = maildir.join("tmp").join(&name);
    let dest = maildir.join("new").join(&name);
    fs::write(&tmp, message).map_err(|source| MailboxError::Io {
        path: tmp.clone(),
        source,
    })?;
    fs::rename(&tmp, &dest).map_err(|source| MailboxError::Io {
        path: dest.clone(),
        source,
    })?;
    Ok(dest)
}
