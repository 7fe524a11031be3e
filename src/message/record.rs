//! In-memory representation of one loaded message.

use std::borrow::Cow;
use std::fmt;

use chrono::{DateTime, Utc};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::body::{self, BodyError};
use super::canonical::{Canonicalized, Canonicalizer, HeaderDecodeWarning};
use super::fingerprint::{BodyHashing, Fingerprint, FingerprintError, FingerprintHasher};
use super::headers::{parse_date, HeaderParseError, RawHeaders};
use crate::mailbox::{RawMessage, SourceRef};

/// Where a message's timestamp comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum TimeSource {
    /// Parsed `Date` header
    #[default]
    DateHeader,
    /// Time reported by the mailbox store (file creation or modification time)
    Store,
}

impl fmt::Display for TimeSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimeSource::DateHeader => write!(f, "date-header"),
            TimeSource::Store => write!(f, "store"),
        }
    }
}

/// The configured time source gave no usable timestamp.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TimeResolutionError {
    #[error("no Date header")]
    MissingDate,

    #[error("unparsable Date header {0:?}")]
    UnparsableDate(String),

    #[error("mailbox store provides no timestamp")]
    StoreUnavailable,
}

/// Final classification of a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Disposition {
    /// No decision; the message is left untouched.
    #[default]
    Undetermined,
    Kept,
    Discarded,
}

impl fmt::Display for Disposition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Disposition::Undetermined => write!(f, "undetermined"),
            Disposition::Kept => write!(f, "kept"),
            Disposition::Discarded => write!(f, "discarded"),
        }
    }
}

/// A disposition was assigned twice.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{source_ref} already settled as {current}")]
pub struct AlreadySettled {
    pub source_ref: SourceRef,
    pub current: Disposition,
}

/// Metadata view of a record used by selection strategies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub source_ref: SourceRef,
    pub body_size: u64,
    pub timestamp: Result<DateTime<Utc>, TimeResolutionError>,
}

#[derive(Debug, Clone)]
enum Content {
    Loaded(Vec<u8>),
    Deferred,
}

/// One message loaded for deduplication.
///
/// Headers, body size and timestamp are fixed at creation. The fingerprint is
/// computed once during hashing and the disposition is settled at most once.
#[derive(Debug, Clone)]
pub struct MessageRecord {
    source_ref: SourceRef,
    raw_headers: RawHeaders,
    body_offset: usize,
    body_size: u64,
    content: Content,
    timestamp: Result<DateTime<Utc>, TimeResolutionError>,
    fingerprint: Option<Fingerprint>,
    decode_warnings: Vec<HeaderDecodeWarning>,
    disposition: Disposition,
}

impl MessageRecord {
    /// Build a record from a raw message.
    ///
    /// With `keep_body` false only the header block is kept in memory and the
    /// body is re-read through the source reference when needed.
    ///
    /// # Errors
    ///
    /// Returns `HeaderParseError` if the header block cannot be split.
    pub fn from_raw(
        raw: RawMessage,
        time_source: TimeSource,
        keep_body: bool,
    ) -> Result<Self, HeaderParseError> {
        let (raw_headers, body_offset) = RawHeaders::parse(&raw.bytes)?;
        let body_size = (raw.bytes.len() - body_offset) as u64;

        let timestamp = match time_source {
            TimeSource::DateHeader => date_header_timestamp(&raw_headers),
            TimeSource::Store => raw
                .store_timestamp
                .ok_or(TimeResolutionError::StoreUnavailable),
        };
        if let Err(e) = &timestamp {
            log::debug!("{}: {}", raw.source_ref, e);
        }

        let content = if keep_body {
            Content::Loaded(raw.bytes)
        } else {
            Content::Deferred
        };

        Ok(Self {
            source_ref: raw.source_ref,
            raw_headers,
            body_offset,
            body_size,
            content,
            timestamp,
            fingerprint: None,
            decode_warnings: Vec::new(),
            disposition: Disposition::Undetermined,
        })
    }

    #[must_use]
    pub fn source_ref(&self) -> &SourceRef {
        &self.source_ref
    }

    #[must_use]
    pub fn raw_headers(&self) -> &RawHeaders {
        &self.raw_headers
    }

    /// Byte length of the payload, headers excluded.
    #[must_use]
    pub fn body_size(&self) -> u64 {
        self.body_size
    }

    /// Timestamp resolved from the configured time source.
    ///
    /// # Errors
    ///
    /// Returns the `TimeResolutionError` recorded at creation.
    pub fn timestamp(&self) -> Result<DateTime<Utc>, TimeResolutionError> {
        self.timestamp.clone()
    }

    #[must_use]
    pub fn fingerprint(&self) -> Option<Fingerprint> {
        self.fingerprint
    }

    /// Whether a header value had to be hashed through its escaped bytes.
    #[must_use]
    pub fn encoding_suspect(&self) -> bool {
        !self.decode_warnings.is_empty()
    }

    #[must_use]
    pub fn decode_warnings(&self) -> &[HeaderDecodeWarning] {
        &self.decode_warnings
    }

    #[must_use]
    pub fn disposition(&self) -> Disposition {
        self.disposition
    }

    /// Assign the final disposition.
    ///
    /// # Errors
    ///
    /// Returns `AlreadySettled` if a disposition other than `Undetermined`
    /// was already assigned.
    pub fn settle(&mut self, disposition: Disposition) -> Result<(), AlreadySettled> {
        if self.disposition != Disposition::Undetermined {
            return Err(AlreadySettled {
                source_ref: self.source_ref.clone(),
                current: self.disposition,
            });
        }
        self.disposition = disposition;
        Ok(())
    }

    #[must_use]
    pub fn candidate(&self) -> Candidate {
        Candidate {
            source_ref: self.source_ref.clone(),
            body_size: self.body_size,
            timestamp: self.timestamp.clone(),
        }
    }

    /// Full message bytes, re-read from the mailbox if the body was deferred.
    ///
    /// # Errors
    ///
    /// Returns `BodyError::Mailbox` if the message cannot be re-read.
    pub fn raw_bytes(&self) -> Result<Cow<'_, [u8]>, BodyError> {
        match &self.content {
            Content::Loaded(bytes) => Ok(Cow::Borrowed(bytes)),
            Content::Deferred => Ok(Cow::Owned(self.source_ref.load()?)),
        }
    }

    /// Payload bytes after the header block.
    ///
    /// # Errors
    ///
    /// Same as [`MessageRecord::raw_bytes`].
    pub fn body_bytes(&self) -> Result<Vec<u8>, BodyError> {
        let raw = self.raw_bytes()?;
        Ok(raw.get(self.body_offset..).unwrap_or_default().to_vec())
    }

    /// Decoded body lines over all MIME leaf parts.
    ///
    /// # Errors
    ///
    /// See [`body::body_lines`].
    pub fn body_lines(&self) -> Result<Vec<String>, BodyError> {
        body::body_lines(&self.raw_bytes()?)
    }

    /// Canonicalize headers for this record.
    #[must_use]
    pub fn canonicalize(&self, canonicalizer: &Canonicalizer) -> Canonicalized {
        canonicalizer.canonicalize(&self.raw_headers)
    }

    /// Compute the fingerprint, or return the one computed earlier.
    ///
    /// # Errors
    ///
    /// Returns `FingerprintError::TooFewHeaders`; the record then stays
    /// without fingerprint.
    pub fn hash(
        &mut self,
        canonicalizer: &Canonicalizer,
        hasher: &FingerprintHasher,
        body_hashing: BodyHashing,
    ) -> Result<Fingerprint, FingerprintError> {
        if let Some(fingerprint) = self.fingerprint {
            return Ok(fingerprint);
        }

        let canonical = self.canonicalize(canonicalizer);
        let (body, body_warning) = self.canonical_body(body_hashing);
        let fingerprint = hasher.fingerprint(&canonical.headers, body.as_deref())?;

        log::trace!("{} -> {}", self.source_ref, fingerprint.short());
        self.decode_warnings.extend(canonical.warnings);
        self.decode_warnings.extend(body_warning);
        self.fingerprint = Some(fingerprint);
        Ok(fingerprint)
    }

    fn canonical_body(
        &self,
        body_hashing: BodyHashing,
    ) -> (Option<Vec<u8>>, Option<HeaderDecodeWarning>) {
        if body_hashing == BodyHashing::Skip {
            return (None, None);
        }
        match self.body_lines() {
            Ok(lines) => (body_hashing.canonical_body(&lines), None),
            Err(e) => {
                log::warn!("{}: hashing undecoded body ({})", self.source_ref, e);
                let warning = e.is_encoding().then(|| HeaderDecodeWarning {
                    header: "body".to_string(),
                    escaped: e.to_string(),
                });
                (Some(self.body_bytes().unwrap_or_default()), warning)
            }
        }
    }
}

fn date_header_timestamp(headers: &RawHeaders) -> Result<DateTime<Utc>, TimeResolutionError> {
    let raw = headers.first("date").ok_or(TimeResolutionError::MissingDate)?;
    let value = String::from_utf8_lossy(raw);
    parse_date(&value)
        .ok_or_else(|| TimeResolutionError::UnparsableDate(value.trim().to_string()))
}
