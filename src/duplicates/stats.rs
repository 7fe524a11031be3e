//! Run statistics and their consistency checks.
//!
//! Counters are plain integers so that partial results computed on worker
//! threads can be summed with `+=` and checked once at the end of a run.

use std::fmt;
use std::ops::{Add, AddAssign};

use serde::Serialize;

use super::groups::SetOutcome;
use crate::message::Disposition;

/// Per-message counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MailStats {
    /// Messages read from all mailboxes
    pub found: usize,
    /// Messages that could not be parsed or fingerprinted
    pub rejected: usize,
    /// Messages that got a fingerprint
    pub kept: usize,
    /// Fingerprinted messages alone in their set
    pub unique: usize,
    /// Fingerprinted messages sharing their set with others
    pub duplicates: usize,
    /// Duplicates left undetermined (set skipped, ignored or rejected)
    pub skipped: usize,
    /// Duplicates settled as kept by a strategy
    pub retained: usize,
    /// Duplicates settled as discarded by a strategy
    pub discarded: usize,
    /// Body bytes of discarded duplicates
    pub discarded_bytes: u64,
    /// Messages whose header or body needed escaped hashing
    pub encoding_suspect: usize,
    /// Messages without usable timestamp
    pub timestamp_errors: usize,
}

/// Per-set counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SetStats {
    /// Distinct fingerprints seen while grouping
    pub hashes: usize,
    pub total: usize,
    pub unique: usize,
    /// No strategy was configured
    pub ignored: usize,
    /// Strategy could not partition the set, or a body was unreadable
    pub skipped: usize,
    pub rejected_bad_encoding: usize,
    pub rejected_size: usize,
    pub rejected_content: usize,
    pub deduplicated: usize,
}

/// Every counter of a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunStats {
    pub mail: MailStats,
    pub sets: SetStats,
}

/// Relations between counters that did not hold.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatsViolations(pub Vec<String>);

impl fmt::Display for StatsViolations {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.join("; "))
    }
}

impl RunStats {
    /// Counters contributed by one processed set.
    ///
    /// # Arguments
    ///
    /// * `outcome` - What happened to the set
    /// * `members` - Disposition and body size of each member
    #[must_use]
    pub fn for_set(outcome: &SetOutcome, members: &[(Disposition, u64)]) -> Self {
        let mut stats = Self::default();
        stats.sets.total = 1;

        match outcome {
            SetOutcome::Unique => {
                stats.sets.unique = 1;
                stats.mail.unique = members.len();
                return stats;
            }
            SetOutcome::Ignored => stats.sets.ignored = 1,
            SetOutcome::Skipped { .. } => stats.sets.skipped = 1,
            SetOutcome::RejectedBadEncoding => stats.sets.rejected_bad_encoding = 1,
            SetOutcome::RejectedSize { .. } => stats.sets.rejected_size = 1,
            SetOutcome::RejectedContent { .. } => stats.sets.rejected_content = 1,
            SetOutcome::Deduplicated { .. } => stats.sets.deduplicated = 1,
        }

        stats.mail.duplicates = members.len();
        for (disposition, size) in members {
            match disposition {
                Disposition::Undetermined => stats.mail.skipped += 1,
                Disposition::Kept => stats.mail.retained += 1,
                Disposition::Discarded => {
                    stats.mail.discarded += 1;
                    stats.mail.discarded_bytes += size;
                }
            }
        }
        stats
    }

    /// Verify the accounting identities of a finished run.
    ///
    /// # Errors
    ///
    /// Returns every relation that does not hold.
    pub fn check(&self) -> Result<(), StatsViolations> {
        let m = &self.mail;
        let s = &self.sets;
        let mut violations = Vec::new();

        let mut expect = |label: &str, left: usize, right: usize| {
            if left != right {
                violations.push(format!("{label}: {left} != {right}"));
            }
        };

        expect("found = rejected + kept", m.found, m.rejected + m.kept);
        expect("kept = unique + duplicates", m.kept, m.unique + m.duplicates);
        expect(
            "duplicates = skipped + retained + discarded",
            m.duplicates,
            m.skipped + m.retained + m.discarded,
        );
        expect("unique mails = unique sets", m.unique, s.unique);
        expect("hashes = total sets", s.hashes, s.total);
        expect(
            "total sets = sum of set outcomes",
            s.total,
            s.unique
                + s.ignored
                + s.skipped
                + s.rejected_bad_encoding
                + s.rejected_size
                + s.rejected_content
                + s.deduplicated,
        );

        if violations.is_empty() {
            Ok(())
        } else {
            Err(StatsViolations(violations))
        }
    }
}

impl AddAssign for MailStats {
    fn add_assign(&mut self, rhs: Self) {
        self.found += rhs.found;
        self.rejected += rhs.rejected;
        self.kept += rhs.kept;
        self.unique += rhs.unique;
        self.duplicates += rhs.duplicates;
        self.skipped += rhs.skipped;
        self.retained += rhs.retained;
        self.discarded += rhs.discarded;
        self.discarded_bytes += rhs.discarded_bytes;
        self.encoding_suspect += rhs.encoding_suspect;
        self.timestamp_errors += rhs.timestamp_errors;
    }
}

impl AddAssign for SetStats {
    fn add_assign(&mut self, rhs: Self) {
        self.hashes += rhs.hashes;
        self.total += rhs.total;
        self.unique += rhs.unique;
        self.ignored += rhs.ignored;
        self.skipped += rhs.skipped;
        self.rejected_bad_encoding += rhs.rejected_bad_encoding;
        self.rejected_size += rhs.rejected_size;
        self.rejected_content += rhs.rejected_content;
        self.deduplicated += rhs.deduplicated;
    }
}

impl AddAssign for RunStats {
    fn add_assign(&mut self, rhs: Self) {
        self.mail += rhs.mail;
        self.sets += rhs.sets;
    }
}

impl Add for RunStats {
    type Output = Self;

    fn add(mut self, rhs: Self) -> Self {
        self += rhs;
        self
    }
}
