//! MH folders: one numbered file per message.

use std::fs;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use super::{store_timestamp, BoxFormat, MailboxError, RawMessage, SourceRef};

/// Marker file written by MH tools.
pub const SEQUENCES_FILE: &str = ".mh_sequences";

/// An MH folder opened for reading.
#[derive(Debug, Clone)]
pub struct MhStore {
    path: PathBuf,
}

impl MhStore {
    /// Open an existing MH folder.
    ///
    /// # Errors
    ///
    /// Returns `MailboxError::InvalidLayout` if the path is not a directory.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, MailboxError> {
        let path = path.into();
        if !path.exists() {
            return Err(MailboxError::NotFound(path));
        }
        if !path.is_dir() {
            return Err(MailboxError::InvalidLayout {
                path,
                format: BoxFormat::Mh,
            });
        }
        Ok(Self { path })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load every numbered message, in numeric order.
    ///
    /// # Errors
    ///
    /// Returns `MailboxError::Io` if a message cannot be read.
    pub fn messages(&self) -> Result<Vec<RawMessage>, MailboxError> {
        let mut messages = Vec::new();
        for (_, path) in numbered_files(&self.path) {
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
        log::debug!("{}: {} MH messages", self.path.display(), messages.len());
        Ok(messages)
    }
}

/// Whether `path` looks like an MH folder.
#[must_use]
pub fn is_mh(path: &Path) -> bool {
    path.is_dir() && (path.join(SEQUENCES_FILE).is_file() || !numbered_files(path).is_empty())
}

fn numbered_files(folder: &Path) -> Vec<(u64, PathBuf)> {
    let mut files: Vec<(u64, PathBuf)> = WalkDir::new(folder)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_file())
        .filter_map(|entry| {
            let number = entry.file_name().to_str()?.parse::<u64>().ok()?;
            Some((number, entry.into_path()))
        })
        .collect();
    files.sort_unstable_by_key(|(number, _)| *number);
    files
}

/// Create an empty MH folder, refusing to reuse an existing path unless `append`.
///
/// # Errors
///
/// Returns `MailboxError::Io` on conflict or creation failure.
pub fn create(path: &Path, append: bool) -> Result<(), MailboxError> {
    let io_err = |source| MailboxError::Io {
        path: path.to_path_buf(),
        source,
    };
    if path.exists() && !append {
        return Err(io_err(std::io::Error::new(
            std::io::ErrorKind::AlreadyExists,
            "export MH folder already exists",
        )));
    }
    fs::create_dir_all(path).map_err(io_err)?;
    let sequences = path.join(SEQUENCES_FILE);
    if !sequences.exists() {
        fs::write(&sequences, b"").map_err(io_err)?;
    }
    Ok(())
}

/// Store a message under the next free number.
///
/// # Errors
///
/// Returns `MailboxError::Io` on write failure.
pub fn deliver(folder: &Path, message: &[u8]) -> Result<PathBuf, MailboxError> {
    let next = numbered_files(folder).last().map_or(1, |(n, _)| n + 1);
    let dest = folder.join(next.to_string());
    fs::write(&dest, message).map_err(|source| MailboxError::Io {
        path: dest.clone(),
        source,
    })?;
    Ok(dest)
}
