//! Duplicate finder orchestrating one deduplication run.
//!
//! # Overview
//!
//! A run goes through these stages, strictly in order:
//!
//! 1. **Loading** - read every message of every mailbox and split headers
//! 2. **Hashing** - canonicalize headers and compute fingerprints
//! 3. **Grouping** - gather records into [`DuplicateSet`]s
//! 4. **ValidatingSets** - size, content and encoding checks per set
//! 5. **Selecting** - apply the strategy to validated sets
//! 6. **Emitting** - collect the final disposition of every message
//! 7. **Reporting** - sum and check the statistics
//!
//! Hashing and per-set work run on a bounded rayon pool. Partial statistics
//! from workers are merged with `+=`, so the result does not depend on the
//! scheduling.
//!
//! A shutdown request is honored at every stage boundary up to Emitting;
//! nothing outside the process has been touched by then.
//!
//! # Example
//!
//! ```no_run
//! use maildedup::config::Config;
//! use maildedup::duplicates::{DuplicateFinder, FinderConfig, Strategy};
//! use maildedup::mailbox::open_all;
//! use std::path::PathBuf;
//!
//! let config = Config {
//!     strategy: Some(Strategy::KeepNewest),
//!     ..Config::default()
//! };
//! let finder = DuplicateFinder::new(FinderConfig::new(config)).unwrap();
//! let boxes = open_all(&[PathBuf::from("/home/user/Maildir")], None).unwrap();
//! let report = finder.find_duplicates(&boxes).unwrap();
//! println!("{} duplicates discarded", report.stats.mail.discarded);
//! ```

use std::collections::BTreeSet;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use rayon::prelude::*;
use regex::Regex;
use serde::Serialize;

use super::groups::{group_by_fingerprint, DuplicateSet, SetOutcome};
use super::stats::{RunStats, StatsViolations};
use super::validator::SimilarityValidator;
use crate::config::{Config, ConfigError};
use crate::mailbox::{Mailbox, MailboxError, RawMessage, SourceRef};
use crate::message::{Canonicalizer, Disposition, Fingerprint, FingerprintHasher, MessageRecord};
use crate::progress::ProgressCallback;

/// Stages of a run, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum RunStage {
    Loading,
    Hashing,
    Grouping,
    ValidatingSets,
    Selecting,
    Emitting,
    Reporting,
    Done,
}

impl fmt::Display for RunStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RunStage::Loading => "loading",
            RunStage::Hashing => "hashing",
            RunStage::Grouping => "grouping",
            RunStage::ValidatingSets => "validating sets",
            RunStage::Selecting => "selecting",
            RunStage::Emitting => "emitting",
            RunStage::Reporting => "reporting",
            RunStage::Done => "done",
        };
        f.write_str(name)
    }
}

/// Errors that abort a run.
#[derive(thiserror::Error, Debug)]
pub enum DedupError {
    /// The run was interrupted by user (Ctrl+C or shutdown signal).
    #[error("Run interrupted by user")]
    Interrupted,

    /// The final statistics do not add up.
    #[error("Inconsistent run statistics: {0}")]
    InconsistentStats(StatsViolations),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Mailbox(#[from] MailboxError),

    #[error("Failed to build worker pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

/// Configuration of a [`DuplicateFinder`].
#[derive(Clone, Default)]
pub struct FinderConfig {
    /// Deduplication settings.
    pub config: Config,
    /// Optional shutdown flag for graceful termination.
    pub shutdown_flag: Option<Arc<AtomicBool>>,
    /// Optional progress callback.
    pub progress_callback: Option<Arc<dyn ProgressCallback>>,
}

impl fmt::Debug for FinderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FinderConfig")
            .field("config", &self.config)
            .field("shutdown_flag", &self.shutdown_flag)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<callback>"),
            )
            .finish()
    }
}

impl FinderConfig {
    #[must_use]
    pub fn new(config: Config) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    /// Set the shutdown flag for graceful termination.
    #[must_use]
    pub fn with_shutdown_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.shutdown_flag = Some(flag);
        self
    }

    /// Set the progress callback.
    #[must_use]
    pub fn with_progress_callback(mut self, callback: Arc<dyn ProgressCallback>) -> Self {
        self.progress_callback = Some(callback);
        self
    }

    fn is_shutdown_requested(&self) -> bool {
        self.shutdown_flag
            .as_ref()
            .is_some_and(|f| f.load(Ordering::SeqCst))
    }
}

/// A message that never reached a duplicate set.
#[derive(Debug, Clone, Serialize)]
pub struct RejectedMail {
    pub source_ref: SourceRef,
    pub reason: String,
}

/// Final state of one member of a set.
#[derive(Debug, Clone, Serialize)]
pub struct MemberReport {
    pub source_ref: SourceRef,
    pub disposition: Disposition,
    pub body_size: u64,
    pub timestamp: Option<DateTime<Utc>>,
}

/// Final state of one duplicate set.
#[derive(Debug, Clone, Serialize)]
pub struct SetReport {
    pub fingerprint: Fingerprint,
    #[serde(flatten)]
    pub outcome: SetOutcome,
    pub members: Vec<MemberReport>,
}

impl SetReport {
    fn from_set(set: &DuplicateSet, outcome: SetOutcome) -> Self {
        Self {
            fingerprint: set.fingerprint(),
            outcome,
            members: set
                .members()
                .iter()
                .map(|m| MemberReport {
                    source_ref: m.source_ref().clone(),
                    disposition: m.disposition(),
                    body_size: m.body_size(),
                    timestamp: m.timestamp().ok(),
                })
                .collect(),
        }
    }
}

/// Everything a run produced.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunReport {
    /// Sets ordered by fingerprint.
    pub sets: Vec<SetReport>,
    /// Messages without fingerprint.
    pub rejected: Vec<RejectedMail>,
    pub stats: RunStats,
    #[serde(skip)]
    pub duration: Duration,
}

impl RunReport {
    /// `(source_ref, disposition)` of every grouped message, ordered by
    /// source reference.
    #[must_use]
    pub fn dispositions(&self) -> Vec<(SourceRef, Disposition)> {
        let mut all: Vec<(SourceRef, Disposition)> = self
            .sets
            .iter()
            .flat_map(|set| set.members.iter())
            .map(|m| (m.source_ref.clone(), m.disposition))
            .collect();
        all.sort();
        all
    }

    /// Members with the given disposition, ordered by source reference.
    #[must_use]
    pub fn members_with(&self, disposition: Disposition) -> Vec<&MemberReport> {
        let mut members: Vec<&MemberReport> = self
            .sets
            .iter()
            .flat_map(|set| set.members.iter())
            .filter(|m| m.disposition == disposition)
            .collect();
        members.sort_by(|a, b| a.source_ref.cmp(&b.source_ref));
        members
    }
}

/// Duplicate finder running the staged pipeline.
pub struct DuplicateFinder {
    config: FinderConfig,
    canonicalizer: Canonicalizer,
    hasher: FingerprintHasher,
    validator: SimilarityValidator,
    regex: Option<Regex>,
    pool: rayon::ThreadPool,
}

impl fmt::Debug for DuplicateFinder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DuplicateFinder")
            .field("config", &self.config)
            .field("threads", &self.pool.current_num_threads())
            .finish_non_exhaustive()
    }
}

impl DuplicateFinder {
    /// Create a finder. The configuration is validated here, before any
    /// mailbox is touched.
    ///
    /// # Errors
    ///
    /// Returns `DedupError::Config` for invalid settings and
    /// `DedupError::ThreadPool` if the worker pool cannot be built.
    pub fn new(config: FinderConfig) -> Result<Self, DedupError> {
        let settings = &config.config;
        settings.validate()?;
        let canonicalizer = settings.canonicalizer()?;
        let hasher = FingerprintHasher::new(settings.minimal_headers);
        let validator = settings.validator()?;
        let regex = settings.compiled_regexp()?;
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(settings.threads)
            .thread_name(|i| format!("maildedup-worker-{i}"))
            .build()?;

        Ok(Self {
            config,
            canonicalizer,
            hasher,
            validator,
            regex,
            pool,
        })
    }

    /// Create a finder with default settings.
    ///
    /// # Errors
    ///
    /// See [`DuplicateFinder::new`].
    pub fn with_defaults() -> Result<Self, DedupError> {
        Self::new(FinderConfig::default())
    }

    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config.config
    }

    /// Run the whole pipeline over opened mailboxes.
    ///
    /// # Errors
    ///
    /// Returns `DedupError::Mailbox` if a mailbox cannot be read,
    /// `DedupError::Interrupted` on shutdown, and
    /// `DedupError::InconsistentStats` if the final accounting fails.
    pub fn find_duplicates(&self, mailboxes: &[Mailbox]) -> Result<RunReport, DedupError> {
        self.enter(RunStage::Loading)?;
        self.phase_start("loading", mailboxes.len());

        let mut messages = Vec::new();
        for (idx, mailbox) in mailboxes.iter().enumerate() {
            if self.config.is_shutdown_requested() {
                self.phase_end("loading");
                return Err(DedupError::Interrupted);
            }
            let path = mailbox.path().display().to_string();
            if let Some(ref callback) = self.config.progress_callback {
                callback.on_progress(idx + 1, &path);
            }
            let loaded = mailbox.messages()?;
            log::info!("Loaded {} mails from {} ({})", loaded.len(), path, mailbox.format());
            messages.extend(loaded);
        }
        self.phase_end("loading");

        self.run(messages, !self.config.config.lazy_bodies)
    }

    /// Run the pipeline over messages already read into memory.
    ///
    /// A message whose source reference was already seen is dropped, so
    /// overlapping mailbox arguments do not count a message twice. Bodies
    /// stay in memory whatever `lazy_bodies` says, since the source
    /// references need not point at a readable mailbox.
    ///
    /// # Errors
    ///
    /// Same as [`DuplicateFinder::find_duplicates`].
    pub fn find_duplicates_in_messages(
        &self,
        messages: Vec<RawMessage>,
    ) -> Result<RunReport, DedupError> {
        self.run(messages, true)
    }

    fn run(&self, messages: Vec<RawMessage>, keep_body: bool) -> Result<RunReport, DedupError> {
        let start_time = Instant::now();
        let settings = &self.config.config;
        let mut stats = RunStats::default();
        let mut rejected = Vec::new();

        let mut seen = BTreeSet::new();
        let messages: Vec<RawMessage> = messages
            .into_iter()
            .filter(|m| {
                let fresh = seen.insert(m.source_ref.clone());
                if !fresh {
                    log::debug!("Ignoring {} loaded twice", m.source_ref);
                }
                fresh
            })
            .collect();
        stats.mail.found = messages.len();

        let time_source = settings.time_source;
        let parsed: Vec<(SourceRef, Result<MessageRecord, String>)> = self.pool.install(|| {
            messages
                .into_par_iter()
                .map(|raw| {
                    let source_ref = raw.source_ref.clone();
                    let record = MessageRecord::from_raw(raw, time_source, keep_body)
                        .map_err(|e| e.to_string());
                    (source_ref, record)
                })
                .collect()
        });

        let mut records = Vec::with_capacity(parsed.len());
        for (source_ref, result) in parsed {
            match result {
                Ok(record) => records.push(record),
                Err(reason) => {
                    log::warn!("{source_ref}: {reason}");
                    rejected.push(RejectedMail { source_ref, reason });
                }
            }
        }
        stats.mail.timestamp_errors = records.iter().filter(|r| r.timestamp().is_err()).count();

        // Hashing
        self.enter(RunStage::Hashing)?;
        let hashed = self.hash_records(&mut records);
        if self.config.is_shutdown_requested() {
            return Err(DedupError::Interrupted);
        }
        let mut fingerprinted = Vec::with_capacity(records.len());
        for (record, result) in records.into_iter().zip(hashed) {
            match result {
                Ok(()) => fingerprinted.push(record),
                Err(reason) => {
                    log::info!("Rejecting {}: {}", record.source_ref(), reason);
                    rejected.push(RejectedMail {
                        source_ref: record.source_ref().clone(),
                        reason,
                    });
                }
            }
        }
        stats.mail.rejected = rejected.len();
        stats.mail.kept = fingerprinted.len();
        stats.mail.encoding_suspect = fingerprinted.iter().filter(|r| r.encoding_suspect()).count();

        // Grouping
        self.enter(RunStage::Grouping)?;
        let (mut sets, grouping) = group_by_fingerprint(fingerprinted);
        stats.sets.hashes = sets.len();
        log::info!(
            "{} sets, {} with duplicates",
            sets.len(),
            grouping.duplicate_sets
        );

        // Validating sets
        self.enter(RunStage::ValidatingSets)?;
        self.phase_start("validating", grouping.duplicate_sets);
        let validated = AtomicUsize::new(0);
        let checked: Vec<Option<SetOutcome>> = self.pool.install(|| {
            sets.par_iter_mut()
                .map(|set| {
                    let outcome = set.check(&self.validator);
                    if !set.is_unique() {
                        let current = validated.fetch_add(1, Ordering::Relaxed) + 1;
                        if let Some(ref callback) = self.config.progress_callback {
                            callback.on_progress(current, &set.fingerprint().short());
                        }
                    }
                    outcome
                })
                .collect()
        });
        self.phase_end("validating");

        // Selecting
        self.enter(RunStage::Selecting)?;
        let strategy = settings.strategy;
        if strategy.is_none() {
            log::info!("No strategy selected, duplicate sets are only reported");
        }
        let regex = self.regex.as_ref();
        let outcomes: Vec<SetOutcome> = self.pool.install(|| {
            sets.par_iter_mut()
                .zip(checked.into_par_iter())
                .map(|(set, outcome)| outcome.unwrap_or_else(|| set.decide(strategy, regex)))
                .collect()
        });

        // Emitting
        if self.config.is_shutdown_requested() {
            log::info!("Shutdown requested before emitting dispositions");
            return Err(DedupError::Interrupted);
        }
        self.enter(RunStage::Emitting)?;
        let (reports, set_stats) = self.pool.install(|| {
            sets.par_iter()
                .zip(outcomes.into_par_iter())
                .map(|(set, outcome)| {
                    let stats = RunStats::for_set(&outcome, &set.dispositions());
                    (SetReport::from_set(set, outcome), stats)
                })
                .fold(
                    || (Vec::new(), RunStats::default()),
                    |(mut reports, mut acc), (report, stats)| {
                        reports.push(report);
                        acc += stats;
                        (reports, acc)
                    },
                )
                .reduce(
                    || (Vec::new(), RunStats::default()),
                    |(mut left, mut left_stats), (right, right_stats)| {
                        left.extend(right);
                        left_stats += right_stats;
                        (left, left_stats)
                    },
                )
        });
        stats += set_stats;

        // Reporting
        self.enter(RunStage::Reporting)?;
        stats.check().map_err(DedupError::InconsistentStats)?;
        log::info!(
            "{} mails found, {} rejected, {} unique, {} duplicates ({} kept, {} discarded, {} skipped)",
            stats.mail.found,
            stats.mail.rejected,
            stats.mail.unique,
            stats.mail.duplicates,
            stats.mail.retained,
            stats.mail.discarded,
            stats.mail.skipped
        );

        let mut report = RunReport {
            sets: reports,
            rejected,
            stats,
            duration: start_time.elapsed(),
        };
        report.sets.sort_by_key(|set| set.fingerprint);
        report.rejected.sort_by(|a, b| a.source_ref.cmp(&b.source_ref));

        log::info!("Stage: {}", RunStage::Done);
        Ok(report)
    }

    /// Fingerprint every record in parallel, one result per record.
    fn hash_records(&self, records: &mut [MessageRecord]) -> Vec<Result<(), String>> {
        self.phase_start("hashing", records.len());
        let hashed = AtomicUsize::new(0);
        let body_hashing = self.config.config.hash_body;

        let results = self.pool.install(|| {
            records
                .par_iter_mut()
                .map(|record| {
                    if self.config.is_shutdown_requested() {
                        return Err("interrupted".to_string());
                    }
                    let result = record
                        .hash(&self.canonicalizer, &self.hasher, body_hashing)
                        .map(|_| ())
                        .map_err(|e| e.to_string());
                    let current = hashed.fetch_add(1, Ordering::Relaxed) + 1;
                    if let Some(ref callback) = self.config.progress_callback {
                        callback.on_progress(current, &record.source_ref().to_string());
                        callback.on_item_completed(record.body_size());
                    }
                    result
                })
                .collect()
        });
        self.phase_end("hashing");
        results
    }

    fn enter(&self, stage: RunStage) -> Result<(), DedupError> {
        if stage < RunStage::Emitting && self.config.is_shutdown_requested() {
            log::info!("Interrupted before stage {stage}");
            return Err(DedupError::Interrupted);
        }
        log::info!("Stage: {stage}");
        Ok(())
    }

    fn phase_start(&self, phase: &str, total: usize) {
        if let Some(ref callback) = self.config.progress_callback {
            callback.on_phase_start(phase, total);
        }
    }

    fn phase_end(&self, phase: &str) {
        if let Some(ref callback) = self.config.progress_callback {
            callback.on_phase_end(phase);
        }
    }
}
