//! Grouping of fingerprinted records into duplicate sets.
//!
//! # Overview
//!
//! Every record that got a fingerprint lands in exactly one
//! [`DuplicateSet`]. A set with a single member is unique and its member is
//! kept. Larger sets go through similarity validation and then through the
//! configured [`Strategy`], which decides which copies are discarded.
//!
//! # Example
//!
//! ```
//! use maildedup::duplicates::group_by_fingerprint;
//! use maildedup::mailbox::{RawMessage, SourceRef};
//! use maildedup::message::{
//!     BodyHashing, Canonicalizer, FingerprintHasher, MessageRecord, TimeSource,
//! };
//!
//! let raw = b"Date: Mon, 1 Jan 2024 10:00:00 +0000\r\nFrom: a@x\r\nTo: b@x\r\n\
//! Subject: hi\r\n\r\nbody\r\n";
//! let records: Vec<MessageRecord> = ["/box/1", "/box/2"]
//!     .iter()
//!     .map(|path| {
//!         let message = RawMessage {
//!             source_ref: SourceRef::file("/box", *path),
//!             bytes: raw.to_vec(),
//!             store_timestamp: None,
//!         };
//!         let mut record = MessageRecord::from_raw(message, TimeSource::DateHeader, true).unwrap();
//!         record
//!             .hash(&Canonicalizer::with_defaults(), &FingerprintHasher::default(), BodyHashing::Skip)
//!             .unwrap();
//!         record
//!     })
//!     .collect();
//!
//! let (sets, stats) = group_by_fingerprint(records);
//! assert_eq!(sets.len(), 1);
//! assert_eq!(sets[0].len(), 2);
//! assert_eq!(stats.duplicate_sets, 1);
//! ```

use std::collections::BTreeMap;

use regex::Regex;
use serde::Serialize;

use super::strategy::{Partition, SelectionError, Strategy};
use super::validator::{Rejection, SimilarityValidator};
use crate::mailbox::SourceRef;
use crate::message::{Candidate, Disposition, Fingerprint, MessageRecord};

/// Final state of a duplicate set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "kebab-case")]
pub enum SetOutcome {
    /// Single member, kept.
    Unique,
    /// No strategy configured; members left undetermined.
    Ignored,
    /// The set could not be decided: the strategy could not partition it
    /// or a body could not be re-read.
    Skipped { reason: String },
    RejectedBadEncoding,
    RejectedSize { difference: u64, threshold: u64 },
    RejectedContent { difference: u64, threshold: u64 },
    Deduplicated { discarded: usize },
}

impl SetOutcome {
    /// Short label for reports.
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            SetOutcome::Unique => "unique",
            SetOutcome::Ignored => "ignored",
            SetOutcome::Skipped { .. } => "skipped",
            SetOutcome::RejectedBadEncoding => "rejected-bad-encoding",
            SetOutcome::RejectedSize { .. } => "rejected-size",
            SetOutcome::RejectedContent { .. } => "rejected-content",
            SetOutcome::Deduplicated { .. } => "deduplicated",
        }
    }
}

impl From<Rejection> for SetOutcome {
    fn from(rejection: Rejection) -> Self {
        match rejection {
            Rejection::BadEncoding => SetOutcome::RejectedBadEncoding,
            Rejection::Unreadable { reason } => SetOutcome::Skipped {
                reason: format!("body unreadable: {reason}"),
            },
            Rejection::Size {
                difference,
                threshold,
            } => SetOutcome::RejectedSize {
                difference,
                threshold,
            },
            Rejection::Content {
                difference,
                threshold,
            } => SetOutcome::RejectedContent {
                difference,
                threshold,
            },
        }
    }
}

/// Records sharing one fingerprint.
#[derive(Debug, Clone)]
pub struct DuplicateSet {
    fingerprint: Fingerprint,
    /// Sorted by source reference
    members: Vec<MessageRecord>,
    validated: bool,
}

impl DuplicateSet {
    /// Create a set. Members are sorted by source reference.
    ///
    /// # Arguments
    ///
    /// * `fingerprint` - Fingerprint shared by all members
    /// * `members` - Records carrying that fingerprint
    #[must_use]
    pub fn new(fingerprint: Fingerprint, mut members: Vec<MessageRecord>) -> Self {
        debug_assert!(members.iter().all(|m| m.fingerprint() == Some(fingerprint)));
        members.sort_by(|a, b| a.source_ref().cmp(b.source_ref()));
        Self {
            fingerprint,
            members,
            validated: false,
        }
    }

    #[must_use]
    pub fn fingerprint(&self) -> Fingerprint {
        self.fingerprint
    }

    #[must_use]
    pub fn members(&self) -> &[MessageRecord] {
        &self.members
    }

    /// Give the members back, e.g. to release memory after reporting.
    #[must_use]
    pub fn into_members(self) -> Vec<MessageRecord> {
        self.members
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.members.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    #[must_use]
    pub fn is_unique(&self) -> bool {
        self.members.len() == 1
    }

    /// Whether the set passed similarity validation.
    #[must_use]
    pub fn is_validated(&self) -> bool {
        self.validated
    }

    #[must_use]
    pub fn candidates(&self) -> Vec<Candidate> {
        self.members.iter().map(MessageRecord::candidate).collect()
    }

    /// `(disposition, body size)` of each member, in member order.
    #[must_use]
    pub fn dispositions(&self) -> Vec<(Disposition, u64)> {
        self.members
            .iter()
            .map(|m| (m.disposition(), m.body_size()))
            .collect()
    }

    /// Run the similarity checks.
    ///
    /// # Errors
    ///
    /// Returns the [`Rejection`] reported by the validator.
    pub fn validate(&mut self, validator: &SimilarityValidator) -> Result<(), Rejection> {
        validator.validate(&self.members)?;
        self.validated = true;
        Ok(())
    }

    /// Apply `strategy` and settle the disposition of every member.
    ///
    /// # Errors
    ///
    /// Returns the [`SelectionError`] of the strategy; no disposition is
    /// changed in that case.
    pub fn select(
        &mut self,
        strategy: Strategy,
        regex: Option<&Regex>,
    ) -> Result<Partition, SelectionError> {
        debug_assert!(self.validated, "selection on unvalidated set");
        let partition = strategy.select(&self.candidates(), regex)?;
        for member in &mut self.members {
            let disposition = if partition.discarded.contains(member.source_ref()) {
                Disposition::Discarded
            } else {
                Disposition::Kept
            };
            if let Err(e) = member.settle(disposition) {
                log::warn!("{e}");
            }
        }
        Ok(partition)
    }

    /// Settle unique sets and run validation on the others.
    ///
    /// Returns the final outcome if the set is unique or rejected, `None`
    /// when it still awaits selection.
    pub fn check(&mut self, validator: &SimilarityValidator) -> Option<SetOutcome> {
        if self.is_unique() {
            for member in &mut self.members {
                if let Err(e) = member.settle(Disposition::Kept) {
                    log::warn!("{e}");
                }
            }
            return Some(SetOutcome::Unique);
        }

        match self.validate(validator) {
            Ok(()) => None,
            Err(rejection) => {
                log::debug!(
                    "Set {} ({} mails) rejected: {:?}",
                    self.fingerprint.short(),
                    self.len(),
                    rejection
                );
                Some(rejection.into())
            }
        }
    }

    /// Apply the strategy to a validated set.
    ///
    /// Without strategy the set is ignored. A strategy failure skips the
    /// set and leaves every member undetermined.
    pub fn decide(&mut self, strategy: Option<Strategy>, regex: Option<&Regex>) -> SetOutcome {
        let Some(strategy) = strategy else {
            return SetOutcome::Ignored;
        };

        match self.select(strategy, regex) {
            Ok(partition) => {
                log::debug!(
                    "Set {}: {} kept, {} discarded by {}",
                    self.fingerprint.short(),
                    partition.kept.len(),
                    partition.discarded.len(),
                    strategy
                );
                SetOutcome::Deduplicated {
                    discarded: partition.discarded.len(),
                }
            }
            Err(e) => {
                log::info!("Set {} skipped: {}", self.fingerprint.short(), e);
                SetOutcome::Skipped {
                    reason: e.to_string(),
                }
            }
        }
    }

    /// [`DuplicateSet::check`] followed by [`DuplicateSet::decide`].
    pub fn process(
        &mut self,
        validator: &SimilarityValidator,
        strategy: Option<Strategy>,
        regex: Option<&Regex>,
    ) -> SetOutcome {
        match self.check(validator) {
            Some(outcome) => outcome,
            None => self.decide(strategy, regex),
        }
    }

    /// `(source_ref, disposition)` of each member.
    #[must_use]
    pub fn member_dispositions(&self) -> Vec<(SourceRef, Disposition)> {
        self.members
            .iter()
            .map(|m| (m.source_ref().clone(), m.disposition()))
            .collect()
    }
}

/// Counters from grouping.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GroupingStats {
    /// Records grouped
    pub total_records: usize,
    /// Records without fingerprint, left out
    pub unhashed_records: usize,
    /// Sets with one member
    pub unique_sets: usize,
    /// Sets with two or more members
    pub duplicate_sets: usize,
}

/// Group records by fingerprint.
///
/// Returns sets ordered by fingerprint. Records without fingerprint are
/// dropped and counted in [`GroupingStats::unhashed_records`].
#[must_use]
pub fn group_by_fingerprint(
    records: Vec<MessageRecord>,
) -> (Vec<DuplicateSet>, GroupingStats) {
    let mut stats = GroupingStats::default();
    let mut by_fingerprint: BTreeMap<Fingerprint, Vec<MessageRecord>> = BTreeMap::new();

    for record in records {
        stats.total_records += 1;
        match record.fingerprint() {
            Some(fp) => by_fingerprint.entry(fp).or_default().push(record),
            None => stats.unhashed_records += 1,
        }
    }

    let sets: Vec<DuplicateSet> = by_fingerprint
        .into_iter()
        .map(|(fp, members)| DuplicateSet::new(fp, members))
        .collect();

    stats.unique_sets = sets.iter().filter(|s| s.is_unique()).count();
    stats.duplicate_sets = sets.len() - stats.unique_sets;

    log::debug!(
        "Grouping: {} records -> {} sets ({} with duplicates)",
        stats.total_records,
        sets.len(),
        stats.duplicate_sets
    );

    (sets, stats)
}
