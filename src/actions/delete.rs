//! Message removal from source mailboxes.
//!
//! # Overview
//!
//! - Maildir and MH messages are single files: they go to the system trash
//!   by default, or are removed for good with the permanent flag
//! - mbox messages are byte spans of a shared file: the mailbox is rewritten
//!   without them under a dot-lock, once per mailbox
//!
//! # Example
//!
//! ```no_run
//! use maildedup::actions::delete::{delete_messages, DeleteConfig};
//! use maildedup::mailbox::SourceRef;
//!
//! let target = SourceRef::file("/home/user/Maildir", "/home/user/Maildir/cur/1:2,S");
//! let result = delete_messages(&[&target], &DeleteConfig::trash());
//! println!("{}", result.summary());
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::mailbox::{Location, MailboxError, MboxStore, SourceRef};

/// Error type for deletion operations.
#[derive(Debug, Error)]
pub enum DeleteError {
    /// File was not found (may have been deleted or moved).
    #[error("file not found: {0}")]
    NotFound(PathBuf),

    /// Permission denied when attempting to delete.
    #[error("permission denied: {0}")]
    PermissionDenied(PathBuf),

    /// Trash operation failed.
    #[error("trash operation failed for {path}: {message}")]
    TrashFailed { path: PathBuf, message: String },

    /// Permanent delete operation failed.
    #[error("permanent delete failed for {path}: {message}")]
    PermanentDeleteFailed { path: PathBuf, message: String },

    /// The mbox could not be rewritten.
    #[error(transparent)]
    Mailbox(#[from] MailboxError),

    /// General I/O error.
    #[error("I/O error for {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Result of a successful deletion.
#[derive(Debug, Clone)]
pub struct DeleteResult {
    pub source_ref: SourceRef,
    /// Bytes removed from disk.
    pub size: u64,
    /// Whether deletion was permanent (true) or to trash (false).
    pub permanent: bool,
}

/// Results of a batch deletion.
#[derive(Debug, Clone, Default)]
pub struct BatchDeleteResult {
    pub successes: Vec<DeleteResult>,
    pub failures: Vec<(SourceRef, String)>,
    pub bytes_freed: u64,
}

impl BatchDeleteResult {
    #[must_use]
    pub fn success_count(&self) -> usize {
        self.successes.len()
    }

    #[must_use]
    pub fn failure_count(&self) -> usize {
        self.failures.len()
    }

    #[must_use]
    pub fn all_succeeded(&self) -> bool {
        self.failures.is_empty()
    }

    /// Human-readable summary of the operation.
    #[must_use]
    pub fn summary(&self) -> String {
        if self.all_succeeded() {
            format!(
                "Deleted {} mail(s), freed {} bytes",
                self.success_count(),
                self.bytes_freed
            )
        } else {
            format!(
                "Deleted {} mail(s), {} failed, freed {} bytes",
                self.success_count(),
                self.failure_count(),
                self.bytes_freed
            )
        }
    }

    fn record_success(&mut self, result: DeleteResult) {
        self.bytes_freed += result.size;
        self.successes.push(result);
    }
}

/// Configuration for deletion operations.
#[derive(Debug, Clone, Default)]
pub struct DeleteConfig {
    /// Remove files for good instead of moving them to the trash.
    pub permanent: bool,
    /// Break a stale mbox lock.
    pub force_unlock: bool,
}

impl DeleteConfig {
    /// Create config for trash deletion.
    #[must_use]
    pub fn trash() -> Self {
        Self::default()
    }

    /// Create config for permanent deletion.
    #[must_use]
    pub fn permanent() -> Self {
        Self {
            permanent: true,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_force_unlock(mut self, force_unlock: bool) -> Self {
        self.force_unlock = force_unlock;
        self
    }
}

fn file_size(path: &Path) -> Result<u64, DeleteError> {
    fs::metadata(path)
        .map(|m| m.len())
        .map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => DeleteError::NotFound(path.to_path_buf()),
            io::ErrorKind::PermissionDenied => DeleteError::PermissionDenied(path.to_path_buf()),
            _ => DeleteError::Io {
                path: path.to_path_buf(),
                source: e,
            },
        })
}

/// Move a message file to the system trash.
///
/// # Errors
///
/// - `NotFound` if the file doesn't exist
/// - `PermissionDenied` if deletion is not allowed
/// - `TrashFailed` if the trash operation fails
pub fn delete_to_trash(path: &Path) -> Result<u64, DeleteError> {
    let size = file_size(path)?;
    trash::delete(path).map_err(|e| {
        log::error!("Trash operation failed for {}: {}", path.display(), e);
        DeleteError::TrashFailed {
            path: path.to_path_buf(),
            message: e.to_string(),
        }
    })?;
    log::info!("Moved to trash: {} ({} bytes)", path.display(), size);
    Ok(size)
}

/// Permanently delete a message file.
///
/// # Errors
///
/// - `NotFound` if the file doesn't exist
/// - `PermissionDenied` if deletion is not allowed
/// - `PermanentDeleteFailed` if the delete operation fails
pub fn permanent_delete(path: &Path) -> Result<u64, DeleteError> {
    let size = file_size(path)?;
    fs::remove_file(path).map_err(|e| {
        log::error!("Permanent delete failed for {}: {}", path.display(), e);
        DeleteError::PermanentDeleteFailed {
            path: path.to_path_buf(),
            message: e.to_string(),
        }
    })?;
    log::info!("Permanently deleted: {} ({} bytes)", path.display(), size);
    Ok(size)
}

/// Remove messages from their mailboxes, continuing past failures.
///
/// mbox spans are grouped per mailbox so each mbox is rewritten once.
#[must_use]
pub fn delete_messages(targets: &[&SourceRef], config: &DeleteConfig) -> BatchDeleteResult {
    let mut result = BatchDeleteResult::default();
    let mut spans: BTreeMap<&Path, Vec<&SourceRef>> = BTreeMap::new();

    for &target in targets {
        match target.location() {
            Location::File(path) => {
                let outcome = if config.permanent {
                    permanent_delete(path)
                } else {
                    delete_to_trash(path)
                };
                match outcome {
                    Ok(size) => result.record_success(DeleteResult {
                        source_ref: target.clone(),
                        size,
                        permanent: config.permanent,
                    }),
                    Err(e) => result.failures.push((target.clone(), e.to_string())),
                }
            }
            Location::Span { .. } => spans.entry(target.mailbox()).or_default().push(target),
        }
    }

    for (mailbox, refs) in spans {
        match remove_spans(mailbox, &refs, config.force_unlock) {
            Ok(()) => {
                for target in refs {
                    let size = match target.location() {
                        Location::Span { len, .. } => *len,
                        Location::File(_) => 0,
                    };
                    result.record_success(DeleteResult {
                        source_ref: target.clone(),
                        size,
                        permanent: true,
                    });
                }
            }
            Err(e) => {
                log::error!("Cannot rewrite {}: {}", mailbox.display(), e);
                let message = e.to_string();
                result
                    .failures
                    .extend(refs.into_iter().map(|r| (r.clone(), message.clone())));
            }
        }
    }

    result
}

fn remove_spans(mailbox: &Path, refs: &[&SourceRef], force_unlock: bool) -> Result<(), DeleteError> {
    let store = MboxStore::open(mailbox)?;
    let removed = store.remove(refs, force_unlock)?;
    log::debug!("{}: rewritten without {} mail(s)", mailbox.display(), removed);
    Ok(())
}
