//! Message model: header canonicalization, fingerprinting and records.
//!
//! # Overview
//!
//! 1. [`headers::RawHeaders`] splits the header block off a raw message
//! 2. [`canonical::Canonicalizer`] normalizes the configured hash headers
//! 3. [`fingerprint::FingerprintHasher`] digests them into a [`Fingerprint`]
//! 4. [`record::MessageRecord`] ties it together with size, timestamp and
//!    disposition
//!
//! [`hash_message`] runs steps 1-3 on a single message for troubleshooting.

pub mod body;
pub mod canonical;
pub mod fingerprint;
pub mod headers;
pub mod record;

use serde::Serialize;

pub use body::BodyError;
pub use canonical::{
    CanonicalHeader, Canonicalized, Canonicalizer, HeaderDecodeWarning, DEFAULT_HASH_HEADERS,
};
pub use fingerprint::{
    BodyHashing, Fingerprint, FingerprintError, FingerprintHasher, DEFAULT_MINIMAL_HEADERS,
};
pub use headers::{HeaderParseError, RawHeaders};
pub use record::{
    AlreadySettled, Candidate, Disposition, MessageRecord, TimeResolutionError, TimeSource,
};

use crate::config::Config;
use crate::mailbox::{RawMessage, SourceRef};

/// Canonical headers and fingerprint of a single message.
#[derive(Debug, Clone, Serialize)]
pub struct HashReport {
    /// Canonical `(name, value)` pairs in hashing order.
    pub canonical_headers: Vec<CanonicalHeader>,
    /// Digest, absent when the message has too few hash headers.
    pub fingerprint: Option<Fingerprint>,
    /// Why no fingerprint could be computed.
    pub error: Option<String>,
    /// Values that had to be hashed through their escaped bytes.
    pub decode_warnings: Vec<HeaderDecodeWarning>,
}

/// Errors of [`hash_message`].
#[derive(Debug, thiserror::Error)]
pub enum HashMessageError {
    #[error(transparent)]
    Headers(#[from] HeaderParseError),

    #[error(transparent)]
    Config(#[from] crate::config::ConfigError),
}

/// Compute the canonical header list and fingerprint of one raw message.
///
/// Used to find out why two messages do or do not hash alike.
///
/// # Errors
///
/// Returns `HashMessageError` if the header block is malformed or the
/// configured charsets are unknown.
pub fn hash_message(bytes: &[u8], config: &Config) -> Result<HashReport, HashMessageError> {
    let canonicalizer = Canonicalizer::new(&config.hash_headers, &config.fallback_charsets)?;
    let hasher = FingerprintHasher::new(config.minimal_headers);
    let raw = RawMessage {
        source_ref: SourceRef::file("-", "-"),
        bytes: bytes.to_vec(),
        store_timestamp: None,
    };
    let mut record = MessageRecord::from_raw(raw, config.time_source, true)?;
    let canonical = record.canonicalize(&canonicalizer);

    let (fingerprint, error) = match record.hash(&canonicalizer, &hasher, config.hash_body) {
        Ok(fp) => (Some(fp), None),
        Err(e) => (None, Some(e.to_string())),
    };

    Ok(HashReport {
        canonical_headers: canonical.headers,
        fingerprint,
        error,
        decode_warnings: record.decode_warnings().to_vec(),
    })
}
