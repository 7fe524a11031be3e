//! JSON output formatter for deduplication runs.
//!
//! Provides machine-readable JSON output for scripting and automation.
//!
//! # Output Schema
//!
//! ```json
//! {
//!   "sets": [
//!     {
//!       "fingerprint": "3f1c...",
//!       "outcome": "deduplicated",
//!       "discarded": 1,
//!       "members": [
//!         {
//!           "source_ref": "/mail/inbox/cur/1:2,S",
//!           "disposition": "kept",
//!           "body_size": 1024,
//!           "timestamp": "2024-01-01T20:00:00Z"
//!         }
//!       ]
//!     }
//!   ],
//!   "rejected": [{ "source_ref": "/mail/archive:0", "reason": "..." }],
//!   "action": null,
//!   "summary": {
//!     "mail": { "found": 3, "discarded": 1, "...": 0 },
//!     "sets": { "total": 2, "deduplicated": 1, "...": 0 },
//!     "duration_ms": 12,
//!     "exit_code": 0,
//!     "exit_code_name": "MD000"
//!   }
//! }
//! ```
//!
//! # Example
//!
//! ```no_run
//! use maildedup::duplicates::DuplicateFinder;
//! use maildedup::error::ExitCode;
//! use maildedup::mailbox::open_all;
//! use maildedup::output::json::JsonOutput;
//! use std::path::PathBuf;
//!
//! let finder = DuplicateFinder::with_defaults().unwrap();
//! let boxes = open_all(&[PathBuf::from("/home/user/Maildir")], None).unwrap();
//! let report = finder.find_duplicates(&boxes).unwrap();
//!
//! let output = JsonOutput::new(&report, None, ExitCode::Success);
//! println!("{}", output.to_json_pretty().unwrap());
//! ```

use std::io::Write;

use serde::Serialize;

use crate::actions::ActionReport;
use crate::duplicates::{MailStats, RejectedMail, RunReport, SetReport, SetStats};
use crate::error::ExitCode;
use crate::message::HashReport;

/// Summary statistics in JSON format.
#[derive(Debug, Clone, Serialize)]
pub struct JsonSummary {
    /// Per-message counters
    pub mail: MailStats,
    /// Per-set counters
    pub sets: SetStats,
    /// Wall time of the run in milliseconds
    pub duration_ms: u64,
    /// The exit code number
    pub exit_code: i32,
    /// The machine-readable exit code name (e.g., "MD000")
    pub exit_code_name: String,
}

impl JsonSummary {
    #[must_use]
    pub fn from_report(report: &RunReport, exit_code: ExitCode) -> Self {
        Self {
            mail: report.stats.mail,
            sets: report.stats.sets,
            duration_ms: u64::try_from(report.duration.as_millis()).unwrap_or(u64::MAX),
            exit_code: exit_code.as_i32(),
            exit_code_name: exit_code.code_prefix().to_string(),
        }
    }
}

/// Complete JSON output structure.
#[derive(Debug, Clone, Serialize)]
pub struct JsonOutput<'a> {
    /// Every set, ordered by fingerprint
    pub sets: &'a [SetReport],
    /// Messages that never got a fingerprint
    pub rejected: &'a [RejectedMail],
    /// What the post-run action did, if one was requested
    pub action: Option<&'a ActionReport>,
    pub summary: JsonSummary,
}

impl<'a> JsonOutput<'a> {
    /// Create a new JSON output from a run report, the action result and
    /// the exit code.
    ///
    /// # Example
    ///
    /// ```
    /// use maildedup::duplicates::RunReport;
    /// use maildedup::error::ExitCode;
    /// use maildedup::output::json::JsonOutput;
    ///
    /// let report = RunReport::default();
    /// let output = JsonOutput::new(&report, None, ExitCode::Success);
    /// assert!(output.sets.is_empty());
    /// assert_eq!(output.summary.exit_code_name, "MD000");
    /// ```
    #[must_use]
    pub fn new(report: &'a RunReport, action: Option<&'a ActionReport>, exit_code: ExitCode) -> Self {
        Self {
            sets: &report.sets,
            rejected: &report.rejected,
            action,
            summary: JsonSummary::from_report(report, exit_code),
        }
    }

    /// Serialize to compact JSON string.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails (unlikely for valid data).
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Serialize to pretty-printed JSON string.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails (unlikely for valid data).
    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Write JSON to a writer.
    ///
    /// # Errors
    ///
    /// Returns an error if writing fails.
    pub fn write_to<W: Write>(&self, writer: &mut W, pretty: bool) -> Result<(), JsonOutputError> {
        write_json(self, writer, pretty)
    }
}

/// Write the diagnostics of a single message as JSON.
///
/// # Errors
///
/// Returns an error if serialization or writing fails.
pub fn write_hash_report<W: Write>(
    report: &HashReport,
    writer: &mut W,
    pretty: bool,
) -> Result<(), JsonOutputError> {
    write_json(report, writer, pretty)
}

fn write_json<T: Serialize, W: Write>(
    value: &T,
    writer: &mut W,
    pretty: bool,
) -> Result<(), JsonOutputError> {
    let json = if pretty {
        serde_json::to_string_pretty(value)?
    } else {
        serde_json::to_string(value)?
    };
    writer.write_all(json.as_bytes())?;
    writer.write_all(b"\n")?;
    Ok(())
}

/// Errors that can occur during JSON output.
#[derive(thiserror::Error, Debug)]
pub enum JsonOutputError {
    /// JSON serialization error
    #[error("JSON serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O error during writing
    #[error("I/O error during JSON generation: {0}")]
    Io(#[from] std::io::Error),
}
