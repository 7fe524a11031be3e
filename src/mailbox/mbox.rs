//! Single-file `mbox` stores.
//!
//! Entries are delimited by lines starting with `From `. Every entry is
//! addressed by the byte span running from its envelope line up to the
//! next envelope line, which is enough to re-read or excise it later.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::Utc;

use super::{store_timestamp, MailboxError, RawMessage, SourceRef};
use crate::mailbox::source::Location;

const ENVELOPE: &[u8] = b"From ";

/// An mbox file opened for reading.
#[derive(Debug, Clone)]
pub struct MboxStore {
    path: PathBuf,
}

impl MboxStore {
    /// Open an existing mbox file.
    ///
    /// # Errors
    ///
    /// Returns `MailboxError::NotFound` if the path is missing and
    /// `MailboxError::InvalidLayout` if it is not a regular file.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, MailboxError> {
        let path = path.into();
        if !path.exists() {
            return Err(MailboxError::NotFound(path));
        }
        if !path.is_file() {
            return Err(MailboxError::InvalidLayout {
                path,
                format: super::BoxFormat::Mbox,
            });
        }
        Ok(Self { path })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load every message of the mailbox.
    ///
    /// # Errors
    ///
    /// Returns `MailboxError::Io` if the file cannot be read.
    pub fn messages(&self) -> Result<Vec<RawMessage>, MailboxError> {
        let data = fs::read(&self.path).map_err(|source| MailboxError::Io {
            path: self.path.clone(),
            source,
        })?;
        let timestamp = fs::metadata(&self.path)
            .ok()
            .and_then(|meta| store_timestamp(&meta));

        let entries = split_entries(&data);
        log::debug!("{}: {} mbox entries", self.path.display(), entries.len());

        Ok(entries
            .into_iter()
            .map(|(offset, len)| {
                let entry = &data[offset..offset + len];
                RawMessage {
                    source_ref: SourceRef::span(&self.path, offset as u64, len as u64),
                    bytes: strip_envelope(entry).to_vec(),
                    store_timestamp: timestamp,
                }
            })
            .collect())
    }

    /// Rewrite the mailbox without the given entries.
    ///
    /// Every span is checked to still start with an envelope line before
    /// anything is written. Returns the number of removed entries.
    ///
    /// # Errors
    ///
    /// - `MailboxError::Locked` if another process holds the lock
    /// - `MailboxError::Modified` if a span no longer matches the file
    /// - `MailboxError::Io` on read or write failures
    pub fn remove(&self, refs: &[&SourceRef], force_unlock: bool) -> Result<usize, MailboxError> {
        let _lock = DotLock::acquire(&self.path, force_unlock)?;
        let io_err = |source| MailboxError::Io {
            path: self.path.clone(),
            source,
        };
        let data = fs::read(&self.path).map_err(io_err)?;

        let mut spans: Vec<(usize, usize)> = Vec::with_capacity(refs.len());
        for source in refs {
            match source.location() {
                Location::Span { offset, len } if source.mailbox() == self.path => {
                    let (start, len) = (*offset as usize, *len as usize);
                    if start + len > data.len() || !data[start..].starts_with(ENVELOPE) {
                        return Err(MailboxError::Modified(self.path.clone()));
                    }
                    spans.push((start, start + len));
                }
                _ => return Err(MailboxError::Modified(self.path.clone())),
            }
        }
        spans.sort_unstable();
        spans.dedup();

        let mut kept = Vec::with_capacity(data.len());
        let mut cursor = 0;
        for (start, end) in &spans {
            kept.extend_from_slice(&data[cursor..*start]);
            cursor = *end;
        }
        kept.extend_from_slice(&data[cursor..]);

        let tmp = self.path.with_extension("maildedup-tmp");
        fs::write(&tmp, &kept).map_err(io_err)?;
        fs::rename(&tmp, &self.path).map_err(io_err)?;

        log::info!(
            "Removed {} message(s) from {}",
            spans.len(),
            self.path.display()
        );
        Ok(spans.len())
    }
}

/// Append one message to an mbox file, creating it if needed.
///
/// Body lines starting with `From ` are escaped as `>From `.
///
/// # Errors
///
/// Returns `MailboxError::Locked` or `MailboxError::Io`.
pub fn append(path: &Path, message: &[u8], force_unlock: bool) -> Result<(), MailboxError> {
    let _lock = DotLock::acquire(path, force_unlock)?;
    let io_err = |source| MailboxError::Io {
        path: path.to_path_buf(),
        source,
    };

    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(io_err)?;

    let mut entry = Vec::with_capacity(message.len() + 64);
    let envelope = Utc::now().format("%a %b %e %H:%M:%S %Y");
    entry.extend_from_slice(format!("From MAILER-DAEMON {envelope}\n").as_bytes());
    for line in message.split_inclusive(|&b| b == b'\n') {
        if line.starts_with(ENVELOPE) {
            entry.push(b'>');
        }
        entry.extend_from_slice(line);
    }
    if !entry.ends_with(b"\n") {
        entry.push(b'\n');
    }
    entry.push(b'\n');

    file.write_all(&entry).map_err(io_err)
}

/// Split raw mbox content into `(offset, len)` entry spans.
#[must_use]
pub fn split_entries(data: &[u8]) -> Vec<(usize, usize)> {
    let mut starts = Vec::new();
    let mut line_start = 0;
    while line_start < data.len() {
        if data[line_start..].starts_with(ENVELOPE) {
            starts.push(line_start);
        }
        match data[line_start..].iter().position(|&b| b == b'\n') {
            Some(pos) => line_start += pos + 1,
            None => break,
        }
    }

    if let Some(&first) = starts.first() {
        if first > 0 {
            log::warn!("Ignoring {first} byte(s) before the first mbox envelope line");
        }
    }

    starts
        .iter()
        .enumerate()
        .map(|(i, &start)| {
            let end = starts.get(i + 1).copied().unwrap_or(data.len());
            (start, end - start)
        })
        .collect()
}

/// Drop the envelope line and the separating blank line of an mbox entry.
///
/// The trailing line is only dropped when it is blank, so an entry written
/// without separator, or the last entry of a file, keeps its final newline.
#[must_use]
pub fn strip_envelope(entry: &[u8]) -> &[u8] {
    let mut message = entry;
    if message.starts_with(ENVELOPE) {
        message = match message.iter().position(|&b| b == b'\n') {
            Some(pos) => &message[pos + 1..],
            None => &[],
        };
    }
    if message.ends_with(b"\r\n\r\n") {
        &message[..message.len() - 2]
    } else if message.ends_with(b"\n\n") {
        &message[..message.len() - 1]
    } else {
        message
    }
}

/// Exclusive `<mbox>.lock` file held while a mailbox is written.
#[derive(Debug)]
pub struct DotLock {
    path: PathBuf,
}

impl DotLock {
    /// Create the lock file, optionally removing a stale one first.
    ///
    /// # Errors
    ///
    /// Returns `MailboxError::Locked` if the lock exists and `force_unlock`
    /// is false.
    pub fn acquire(mailbox: &Path, force_unlock: bool) -> Result<Self, MailboxError> {
        let mut name = mailbox.as_os_str().to_owned();
        name.push(".lock");
        let path = PathBuf::from(name);

        if force_unlock && path.exists() {
            log::warn!("Removing existing lock {}", path.display());
            fs::remove_file(&path).map_err(|source| MailboxError::Io {
                path: path.clone(),
                source,
            })?;
        }

        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(mut file) => {
                let _ = writeln!(file, "{}", std::process::id());
                Ok(Self { path })
            }
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                Err(MailboxError::Locked(mailbox.to_path_buf()))
            }
            Err(source) => Err(MailboxError::Io { path, source }),
        }
    }
}

impl Drop for DotLock {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            log::warn!("Failed to release lock {}: {}", self.path.display(), e);
        }
    }
}

/// Create an empty mbox file, refusing to overwrite an existing one.
///
/// # Errors
///
/// Returns `MailboxError::Io` if the file exists or cannot be created.
pub fn create(path: &Path) -> Result<(), MailboxError> {
    File::options()
        .write(true)
        .create_new(true)
        .open(path)
        .map(|_| ())
        .map_err(|source| MailboxError::Io {
            path: path.to_path_buf(),
            source,
        })
}
