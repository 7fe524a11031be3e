//! Duplicate detection module.
//!
//! This module provides functionality for:
//! - Grouping fingerprinted mails into duplicate sets
//! - Similarity validation of each set (encoding, size, content)
//! - Selection strategies deciding which copies are discarded
//! - Run statistics and the staged pipeline driving it all

pub mod finder;
pub mod groups;
pub mod stats;
pub mod strategy;
pub mod validator;

pub use finder::{
    DedupError, DuplicateFinder, FinderConfig, MemberReport, RejectedMail, RunReport, RunStage,
    SetReport,
};
pub use groups::{group_by_fingerprint, DuplicateSet, GroupingStats, SetOutcome};
pub use stats::{MailStats, RunStats, SetStats, StatsViolations};
pub use strategy::{Partition, SelectionError, Strategy, UnknownStrategy};
pub use validator::{EncodingPolicy, Rejection, SimilarityValidator, Threshold};
