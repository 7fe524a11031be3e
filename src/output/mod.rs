//! Output formatters for deduplication runs.
//!
//! This module provides different output formats for run reports:
//! - Text for people at a terminal
//! - JSON for automation and scripting
//! - CSV for spreadsheet import
//!
//! # Example
//!
//! ```no_run
//! use maildedup::duplicates::DuplicateFinder;
//! use maildedup::mailbox::open_all;
//! use maildedup::output::TextOutput;
//! use std::path::PathBuf;
//!
//! let finder = DuplicateFinder::with_defaults().unwrap();
//! let boxes = open_all(&[PathBuf::from("/home/user/Maildir")], None).unwrap();
//! let report = finder.find_duplicates(&boxes).unwrap();
//!
//! TextOutput::new(&report, None)
//!     .write_to(&mut std::io::stdout())
//!     .unwrap();
//! ```

pub mod csv;
pub mod json;
pub mod text;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

pub use csv::CsvOutput;
pub use json::JsonOutput;
pub use text::TextOutput;

/// Format of the run report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
    Csv,
}
