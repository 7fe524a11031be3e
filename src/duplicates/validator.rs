//! Similarity checks run on every duplicate set before selection.
//!
//! Sharing a fingerprint only means the hashed headers agree. Before any
//! copy is discarded the set must also pass, in order:
//!
//! 1. the encoding check: no member was hashed through escaped bytes
//! 2. the size check: body sizes differ by at most the size threshold
//! 3. the content check: every pairwise unified diff of the bodies is at most
//!    the content threshold long
//!
//! The first failing check rejects the whole set.

use std::fmt;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use similar::TextDiff;

use crate::config::ConfigError;
use crate::message::{BodyError, MessageRecord};

/// Default maximum body size difference, in bytes.
pub const DEFAULT_SIZE_THRESHOLD: i64 = 512;

/// Default maximum unified diff length, in bytes.
pub const DEFAULT_CONTENT_THRESHOLD: i64 = 768;

/// What to do with sets holding a message whose headers did not decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum EncodingPolicy {
    /// Reject the whole set
    #[default]
    RejectSet,
    /// Log a warning and keep validating
    FlagOnly,
}

impl fmt::Display for EncodingPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EncodingPolicy::RejectSet => write!(f, "reject-set"),
            EncodingPolicy::FlagOnly => write!(f, "flag-only"),
        }
    }
}

/// A byte threshold, or no check at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Threshold {
    Disabled,
    Bytes(u64),
}

impl Threshold {
    /// Interpret a configured value, `-1` meaning disabled.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidThreshold` for any other negative value.
    pub fn from_config(name: &'static str, value: i64) -> Result<Self, ConfigError> {
        match value {
            -1 => Ok(Threshold::Disabled),
            v if v >= 0 => Ok(Threshold::Bytes(v.unsigned_abs())),
            v => Err(ConfigError::InvalidThreshold { name, value: v }),
        }
    }

    /// Whether `difference` is over the limit. Equality passes.
    #[must_use]
    pub fn exceeded_by(self, difference: u64) -> bool {
        match self {
            Threshold::Disabled => false,
            Threshold::Bytes(limit) => difference > limit,
        }
    }
}

/// Why a set failed validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    BadEncoding,
    /// A deferred body could not be re-read from its mailbox.
    Unreadable { reason: String },
    Size { difference: u64, threshold: u64 },
    Content { difference: u64, threshold: u64 },
}

/// Runs the similarity checks on a set.
#[derive(Debug, Clone)]
pub struct SimilarityValidator {
    size_threshold: Threshold,
    content_threshold: Threshold,
    encoding_policy: EncodingPolicy,
    show_diff: bool,
}

impl Default for SimilarityValidator {
    fn default() -> Self {
        Self {
            size_threshold: Threshold::Bytes(DEFAULT_SIZE_THRESHOLD.unsigned_abs()),
            content_threshold: Threshold::Bytes(DEFAULT_CONTENT_THRESHOLD.unsigned_abs()),
            encoding_policy: EncodingPolicy::default(),
            show_diff: false,
        }
    }
}

impl SimilarityValidator {
    #[must_use]
    pub fn new(size_threshold: Threshold, content_threshold: Threshold) -> Self {
        Self {
            size_threshold,
            content_threshold,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_encoding_policy(mut self, policy: EncodingPolicy) -> Self {
        self.encoding_policy = policy;
        self
    }

    /// Log the unified diff of every compared pair.
    #[must_use]
    pub fn with_show_diff(mut self, show_diff: bool) -> Self {
        self.show_diff = show_diff;
        self
    }

    /// Check a set of at least two members.
    ///
    /// # Errors
    ///
    /// Returns the first [`Rejection`] met.
    pub fn validate(&self, members: &[MessageRecord]) -> Result<(), Rejection> {
        if members.len() < 2 {
            return Ok(());
        }

        if let Some(suspect) = members.iter().find(|m| m.encoding_suspect()) {
            match self.encoding_policy {
                EncodingPolicy::RejectSet => {
                    log::debug!("{}: undecodable headers, rejecting set", suspect.source_ref());
                    return Err(Rejection::BadEncoding);
                }
                EncodingPolicy::FlagOnly => {
                    log::warn!("{}: undecodable headers", suspect.source_ref());
                }
            }
        }

        let difference = size_difference(members);
        if let Threshold::Bytes(threshold) = self.size_threshold {
            if self.size_threshold.exceeded_by(difference) {
                log::debug!("Size difference {difference} above {threshold}");
                return Err(Rejection::Size {
                    difference,
                    threshold,
                });
            }
        }

        if let Threshold::Bytes(threshold) = self.content_threshold {
            self.check_content(members, threshold)?;
        }
        Ok(())
    }

    fn check_content(&self, members: &[MessageRecord], threshold: u64) -> Result<(), Rejection> {
        let mut bodies = Vec::with_capacity(members.len());
        for member in members {
            match member.body_lines() {
                Ok(lines) => bodies.push(lines.join("\n")),
                Err(BodyError::Mailbox(e)) => {
                    log::warn!("{}: cannot re-read body ({})", member.source_ref(), e);
                    return Err(Rejection::Unreadable {
                        reason: format!("{}: {}", member.source_ref(), e),
                    });
                }
                Err(e) => {
                    log::warn!("{}: cannot compare body ({})", member.source_ref(), e);
                    return Err(Rejection::BadEncoding);
                }
            }
        }

        for (i, a) in bodies.iter().enumerate() {
            for (j, b) in bodies.iter().enumerate().skip(i + 1) {
                let diff = unified_diff(a, b);
                let difference = diff.len() as u64;
                if self.content_threshold.exceeded_by(difference) {
                    log::debug!("Content difference {difference} above {threshold}");
                    if self.show_diff {
                        log::info!(
                            "Diff between {} and {}:\n{}",
                            members[i].source_ref(),
                            members[j].source_ref(),
                            diff
                        );
                    }
                    return Err(Rejection::Content {
                        difference,
                        threshold,
                    });
                }
            }
        }
        Ok(())
    }
}

/// Largest minus smallest body size.
#[must_use]
pub fn size_difference(members: &[MessageRecord]) -> u64 {
    let sizes = members.iter().map(MessageRecord::body_size);
    let max = sizes.clone().max().unwrap_or(0);
    let min = sizes.min().unwrap_or(0);
    max - min
}

/// Unified diff of two bodies without context lines, empty when equal.
#[must_use]
pub fn unified_diff(a: &str, b: &str) -> String {
    TextDiff::from_lines(a, b)
        .unified_diff()
        .context_radius(0)
        .header("a", "b")
        .to_string()
}
