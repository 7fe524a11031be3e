//! Selection strategies.
//!
//! A strategy partitions the members of a validated duplicate set into a
//! kept and a discarded subset. It only looks at metadata (timestamp, body
//! size, source path), never at message content.
//!
//! Every time or size strategy singles out exactly one member. Ties on the
//! ordering key resolve to the lowest [`SourceRef`], so the outcome only
//! depends on the set of `(key, source_ref)` pairs and not on input order.
//!
//! | Strategy | Alias | Singles out |
//! |----------|-------|-------------|
//! | `keep-newest` | `discard-older` | newest is kept |
//! | `discard-newest` | `keep-older` | newest is discarded |
//! | `keep-oldest` | `discard-newer` | oldest is kept |
//! | `discard-oldest` | `keep-newer` | oldest is discarded |
//! | `keep-biggest` | `discard-smaller` | biggest is kept |
//! | `discard-biggest` | `keep-smaller` | biggest is discarded |
//! | `keep-smallest` | `discard-bigger` | smallest is kept |
//! | `discard-smallest` | `keep-bigger` | smallest is discarded |
//! | `discard-matching-path` | `keep-non-matching-path` | paths matching the regex are discarded |
//! | `discard-non-matching-path` | `keep-matching-path` | other paths are discarded |
//! | `keep-one` | `discard-all-but-one` | first member is kept |
//! | `discard-one` | `keep-all-but-one` | first member is discarded |

use std::cmp::Reverse;
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::mailbox::SourceRef;
use crate::message::{Candidate, TimeResolutionError};

/// Named selection strategies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Strategy {
    KeepNewest,
    DiscardNewest,
    KeepOldest,
    DiscardOldest,
    KeepBiggest,
    DiscardBiggest,
    KeepSmallest,
    DiscardSmallest,
    DiscardMatchingPath,
    DiscardNonMatchingPath,
    KeepOne,
    DiscardOne,
}

/// `(strategy, name, alias, description)`
const CATALOG: &[(Strategy, &str, &str, &str)] = &[
    (Strategy::KeepNewest, "keep-newest", "discard-older", "Keep the newest copy, discard all others"),
    (Strategy::DiscardNewest, "discard-newest", "keep-older", "Discard the newest copy, keep all others"),
    (Strategy::KeepOldest, "keep-oldest", "discard-newer", "Keep the oldest copy, discard all others"),
    (Strategy::DiscardOldest, "discard-oldest", "keep-newer", "Discard the oldest copy, keep all others"),
    (Strategy::KeepBiggest, "keep-biggest", "discard-smaller", "Keep the biggest copy, discard all others"),
    (Strategy::DiscardBiggest, "discard-biggest", "keep-smaller", "Discard the biggest copy, keep all others"),
    (Strategy::KeepSmallest, "keep-smallest", "discard-bigger", "Keep the smallest copy, discard all others"),
    (Strategy::DiscardSmallest, "discard-smallest", "keep-bigger", "Discard the smallest copy, keep all others"),
    (Strategy::DiscardMatchingPath, "discard-matching-path", "keep-non-matching-path", "Discard copies whose path matches the regexp"),
    (Strategy::DiscardNonMatchingPath, "discard-non-matching-path", "keep-matching-path", "Discard copies whose path does not match the regexp"),
    (Strategy::KeepOne, "keep-one", "discard-all-but-one", "Keep one copy, discard all others"),
    (Strategy::DiscardOne, "discard-one", "keep-all-but-one", "Discard one copy, keep all others"),
];

/// Name given on the command line or in the config file is not a strategy.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown strategy {0:?}")]
pub struct UnknownStrategy(pub String);

impl Strategy {
    /// Every strategy, in catalog order.
    pub fn all() -> impl Iterator<Item = Strategy> {
        CATALOG.iter().map(|(s, ..)| *s)
    }

    fn entry(self) -> &'static (Strategy, &'static str, &'static str, &'static str) {
        CATALOG
            .iter()
            .find(|(s, ..)| *s == self)
            .unwrap_or(&CATALOG[0])
    }

    #[must_use]
    pub fn name(self) -> &'static str {
        self.entry().1
    }

    #[must_use]
    pub fn alias(self) -> &'static str {
        self.entry().2
    }

    #[must_use]
    pub fn description(self) -> &'static str {
        self.entry().3
    }

    /// Parameter that must be configured for this strategy to run.
    #[must_use]
    pub fn required_parameter(self) -> Option<&'static str> {
        match self {
            Strategy::DiscardMatchingPath | Strategy::DiscardNonMatchingPath => Some("regexp"),
            _ => None,
        }
    }

    /// Partition `members` into kept and discarded references.
    ///
    /// # Errors
    ///
    /// - `SelectionError::MissingParameter` if a path strategy gets no regex
    /// - `SelectionError::MissingTimestamp` if a time strategy meets a member
    ///   without timestamp
    /// - `SelectionError::NothingKept` / `NothingDiscarded` if the partition
    ///   would leave one side empty
    pub fn select(
        self,
        members: &[Candidate],
        regex: Option<&Regex>,
    ) -> Result<Partition, SelectionError> {
        let partition = match self {
            Strategy::KeepNewest => single_out(members, true, newest_key(members)?),
            Strategy::DiscardNewest => single_out(members, false, newest_key(members)?),
            Strategy::KeepOldest => single_out(members, true, oldest_key(members)?),
            Strategy::DiscardOldest => single_out(members, false, oldest_key(members)?),
            Strategy::KeepBiggest => single_out(members, true, biggest_key(members)),
            Strategy::DiscardBiggest => single_out(members, false, biggest_key(members)),
            Strategy::KeepSmallest => single_out(members, true, smallest_key(members)),
            Strategy::DiscardSmallest => single_out(members, false, smallest_key(members)),
            Strategy::KeepOne => single_out(members, true, first_key(members)),
            Strategy::DiscardOne => single_out(members, false, first_key(members)),
            Strategy::DiscardMatchingPath | Strategy::DiscardNonMatchingPath => {
                let regex = regex.ok_or(SelectionError::MissingParameter {
                    strategy: self,
                    parameter: "regexp",
                })?;
                let discard_matching = self == Strategy::DiscardMatchingPath;
                let (discarded, kept): (Vec<_>, Vec<_>) = members.iter().partition(|m| {
                    regex.is_match(&m.source_ref.path().to_string_lossy()) == discard_matching
                });
                Partition {
                    kept: kept.into_iter().map(|m| m.source_ref.clone()).collect(),
                    discarded: discarded.into_iter().map(|m| m.source_ref.clone()).collect(),
                }
            }
        };

        if partition.kept.is_empty() {
            return Err(SelectionError::NothingKept);
        }
        if partition.discarded.is_empty() {
            return Err(SelectionError::NothingDiscarded);
        }
        Ok(partition)
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Strategy {
    type Err = UnknownStrategy;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase().replace('_', "-");
        CATALOG
            .iter()
            .find(|(_, name, alias, _)| *name == wanted || *alias == wanted)
            .map(|(strategy, ..)| *strategy)
            .ok_or_else(|| UnknownStrategy(s.to_string()))
    }
}

impl TryFrom<String> for Strategy {
    type Error = UnknownStrategy;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Strategy> for String {
    fn from(strategy: Strategy) -> Self {
        strategy.name().to_string()
    }
}

/// Result of a selection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Partition {
    pub kept: BTreeSet<SourceRef>,
    pub discarded: BTreeSet<SourceRef>,
}

/// A strategy could not partition a set; the set is skipped.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SelectionError {
    #[error("strategy {strategy} requires the {parameter} parameter")]
    MissingParameter {
        strategy: Strategy,
        parameter: &'static str,
    },

    #[error("{source_ref} has no timestamp: {reason}")]
    MissingTimestamp {
        source_ref: SourceRef,
        reason: TimeResolutionError,
    },

    #[error("strategy would discard every copy")]
    NothingKept,

    #[error("strategy selected no copy to discard")]
    NothingDiscarded,
}

/// Put the member identified by `chosen` on one side and everyone else on
/// the other.
fn single_out(members: &[Candidate], keep_chosen: bool, chosen: Option<&SourceRef>) -> Partition {
    let mut partition = Partition::default();
    for member in members {
        let is_chosen = Some(&member.source_ref) == chosen;
        if is_chosen == keep_chosen {
            partition.kept.insert(member.source_ref.clone());
        } else {
            partition.discarded.insert(member.source_ref.clone());
        }
    }
    partition
}

fn timestamps(members: &[Candidate]) -> Result<Vec<(DateTime<Utc>, &SourceRef)>, SelectionError> {
    members
        .iter()
        .map(|m| match &m.timestamp {
            Ok(ts) => Ok((*ts, &m.source_ref)),
            Err(reason) => Err(SelectionError::MissingTimestamp {
                source_ref: m.source_ref.clone(),
                reason: reason.clone(),
            }),
        })
        .collect()
}

fn newest_key(members: &[Candidate]) -> Result<Option<&SourceRef>, SelectionError> {
    Ok(timestamps(members)?
        .into_iter()
        .max_by_key(|(ts, source)| (*ts, Reverse(*source)))
        .map(|(_, source)| source))
}

fn oldest_key(members: &[Candidate]) -> Result<Option<&SourceRef>, SelectionError> {
    Ok(timestamps(members)?
        .into_iter()
        .min_by_key(|(ts, source)| (*ts, *source))
        .map(|(_, source)| source))
}

fn biggest_key(members: &[Candidate]) -> Option<&SourceRef> {
    members
        .iter()
        .max_by_key(|m| (m.body_size, Reverse(&m.source_ref)))
        .map(|m| &m.source_ref)
}

fn smallest_key(members: &[Candidate]) -> Option<&SourceRef> {
    members
        .iter()
        .min_by_key(|m| (m.body_size, &m.source_ref))
        .map(|m| &m.source_ref)
}

fn first_key(members: &[Candidate]) -> Option<&SourceRef> {
    members.iter().map(|m| &m.source_ref).min()
}
