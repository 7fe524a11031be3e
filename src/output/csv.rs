//! CSV output formatter for deduplication runs.
//!
//! Provides machine-readable CSV output for spreadsheets and data analysis.
//! One row is generated for each message that reached a set.
//!
//! # Columns
//!
//! - `set_id`: Numeric ID of the set, in fingerprint order
//! - `fingerprint`: Hex digest shared by the set
//! - `outcome`: What happened to the set (`deduplicated`, `rejected-size`, ...)
//! - `mailbox`: Mailbox the message was loaded from
//! - `source`: Message file, or `mailbox:offset` for mbox
//! - `disposition`: `kept`, `discarded` or `undetermined`
//! - `body_size`: Body size in bytes
//! - `timestamp`: Resolved timestamp (RFC 3339), empty when unknown
//!
//! # Example
//!
//! ```no_run
//! use maildedup::duplicates::RunReport;
//! use maildedup::output::csv::CsvOutput;
//!
//! let report = RunReport::default();
//! let output = CsvOutput::new(&report.sets);
//! output.write_to(std::io::stdout()).unwrap();
//! ```

use std::io;

use serde::Serialize;
use thiserror::Error;

use crate::duplicates::SetReport;

/// Errors that can occur during CSV output generation.
#[derive(Debug, Error)]
pub enum CsvOutputError {
    /// I/O error during writing.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Error during CSV serialization.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

#[derive(Debug, Serialize)]
struct CsvRow {
    set_id: usize,
    fingerprint: String,
    outcome: &'static str,
    mailbox: String,
    source: String,
    disposition: String,
    body_size: u64,
    timestamp: String,
}

/// CSV output formatter.
pub struct CsvOutput<'a> {
    sets: &'a [SetReport],
}

impl<'a> CsvOutput<'a> {
    /// Create a new CSV output formatter.
    #[must_use]
    pub fn new(sets: &'a [SetReport]) -> Self {
        Self { sets }
    }

    /// Write the CSV output to the given writer.
    ///
    /// # Errors
    ///
    /// Returns `CsvOutputError` if writing or serialization fails.
    pub fn write_to<W: io::Write>(&self, writer: W) -> Result<(), CsvOutputError> {
        let mut csv_writer = csv::Writer::from_writer(writer);

        for (idx, set) in self.sets.iter().enumerate() {
            let fingerprint = set.fingerprint.to_hex();
            for member in &set.members {
                csv_writer.serialize(CsvRow {
                    set_id: idx + 1,
                    fingerprint: fingerprint.clone(),
                    outcome: set.outcome.label(),
                    mailbox: member.source_ref.mailbox().display().to_string(),
                    source: member.source_ref.to_string(),
                    disposition: member.disposition.to_string(),
                    body_size: member.body_size,
                    timestamp: member
                        .timestamp
                        .map(|t| t.to_rfc3339())
                        .unwrap_or_default(),
                })?;
            }
        }

        csv_writer.flush()?;
        Ok(())
    }

    /// Generate CSV output as a string.
    ///
    /// # Errors
    ///
    /// Returns `CsvOutputError` if serialization fails.
    pub fn to_string(&self) -> Result<String, CsvOutputError> {
        let mut buffer = Vec::new();
        self.write_to(&mut buffer)?;
        Ok(String::from_utf8_lossy(&buffer).to_string())
    }
}
