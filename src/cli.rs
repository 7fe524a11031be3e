//! Command-line interface definitions for maildedup.
//!
//! This module defines all CLI arguments, subcommands, and options using the clap derive API.
//! Global options (verbosity, color, config file) come before the subcommand.
//!
//! # Example
//!
//! ```bash
//! # Report duplicates without touching anything
//! maildedup dedupe ~/Maildir
//!
//! # Keep the newest copy of every duplicate and delete the others
//! maildedup dedupe ~/Maildir --strategy keep-newest --action delete-discarded
//!
//! # Move the discarded copies of two mboxes into a separate mbox, JSON report
//! maildedup dedupe inbox.mbox archive.mbox -s discard-older \
//!     -a move-discarded -E dups.mbox -o json
//!
//! # Show how a single message is fingerprinted
//! maildedup hash message.eml
//! ```

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::actions::Action;
use crate::config::ConfigOverrides;
use crate::duplicates::{EncodingPolicy, Strategy};
use crate::mailbox::BoxFormat;
use crate::message::{BodyHashing, TimeSource};
use crate::output::OutputFormat;

/// Find and remove duplicate mails across mailboxes.
///
/// Mails are grouped by a fingerprint of their canonical headers, checked for
/// size and content similarity, and a selection strategy decides which copies
/// to discard.
#[derive(Debug, Parser)]
#[command(name = "maildedup")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Increase verbosity level (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Disable colored output
    #[arg(long, global = true, env = "NO_COLOR")]
    pub no_color: bool,

    /// Print errors as JSON on stderr
    #[arg(long, global = true)]
    pub json_errors: bool,

    /// Configuration file (defaults to the platform config directory)
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Deduplicate the mails of one or more mailboxes
    Dedupe(DedupeArgs),
    /// Print the canonical headers and fingerprint of a single message
    Hash(HashArgs),
}

/// Arguments for the dedupe subcommand.
#[derive(Debug, Args)]
pub struct DedupeArgs {
    /// Mailboxes to read (mbox files, maildirs or MH folders)
    #[arg(value_name = "MAILBOX", required = true)]
    pub mailboxes: Vec<PathBuf>,

    /// Selection strategy deciding which copies are discarded
    ///
    /// Both spellings are accepted, e.g. keep-newest or discard-older.
    /// Without a strategy, duplicate sets are only reported.
    #[arg(short, long, value_name = "STRATEGY")]
    pub strategy: Option<Strategy>,

    /// Path pattern for the matching-path strategies
    #[arg(short, long, value_name = "REGEXP")]
    pub regexp: Option<String>,

    /// Where message timestamps come from
    #[arg(short, long, value_enum, value_name = "SOURCE")]
    pub time_source: Option<TimeSource>,

    /// Maximum body size difference in bytes within a set (-1 disables)
    #[arg(short = 'S', long, value_name = "BYTES", allow_negative_numbers = true)]
    pub size_threshold: Option<i64>,

    /// Maximum unified diff length in bytes within a set (-1 disables)
    #[arg(short = 'C', long, value_name = "BYTES", allow_negative_numbers = true)]
    pub content_threshold: Option<i64>,

    /// Header to include in the fingerprint (repeatable, replaces the defaults)
    #[arg(short = 'H', long = "hash-header", value_name = "HEADER")]
    pub hash_headers: Vec<String>,

    /// Fingerprint on Message-ID alone
    #[arg(long, conflicts_with_all = ["hash_headers", "minimal_headers"])]
    pub hash_only_message_id: bool,

    /// Minimum number of hash headers a mail must carry
    #[arg(long, value_name = "N")]
    pub minimal_headers: Option<usize>,

    /// Include the body in the fingerprint
    #[arg(short = 'b', long, value_enum, value_name = "MODE")]
    pub hash_body: Option<BodyHashing>,

    /// What to do with sets holding undecodable mails
    #[arg(long, value_enum, value_name = "POLICY")]
    pub encoding_policy: Option<EncodingPolicy>,

    /// Charset tried after UTF-8 for undecodable headers (repeatable)
    #[arg(long = "fallback-charset", value_name = "LABEL")]
    pub fallback_charsets: Vec<String>,

    /// Log the diff of pairs failing the content check
    #[arg(short = 'd', long)]
    pub show_diff: bool,

    /// Mailbox format (autodetected by default)
    #[arg(short, long, value_enum, value_name = "FORMAT")]
    pub input_format: Option<BoxFormat>,

    /// Remove a stale mbox lock
    #[arg(long)]
    pub force_unlock: bool,

    /// Keep message bodies in memory instead of re-reading them
    #[arg(long)]
    pub no_lazy_bodies: bool,

    /// Number of worker threads
    #[arg(long, value_name = "N")]
    pub threads: Option<usize>,

    /// Action applied to the kept or discarded mails after the run
    #[arg(short, long, value_enum, value_name = "ACTION")]
    pub action: Option<Action>,

    /// Target mailbox for copy and move actions
    #[arg(short = 'E', long, value_name = "PATH")]
    pub export: Option<PathBuf>,

    /// Format of the export mailbox
    #[arg(long, value_enum, default_value = "mbox")]
    pub export_format: BoxFormat,

    /// Add to an existing export mailbox
    #[arg(long)]
    pub export_append: bool,

    /// Only log what the action would do
    #[arg(short = 'n', long)]
    pub dry_run: bool,

    /// Use permanent deletion instead of moving to trash
    ///
    /// Warning: Files cannot be recovered after permanent deletion.
    /// mbox entries are always removed for good.
    #[arg(long)]
    pub permanent: bool,

    /// Report format
    #[arg(short, long, value_enum, default_value = "text")]
    pub output: OutputFormat,

    /// Write the report to a file instead of stdout
    #[arg(long, value_name = "PATH")]
    pub output_file: Option<PathBuf>,
}

impl DedupeArgs {
    /// Settings given on the command line, layered over the config file.
    #[must_use]
    pub fn overrides(&self) -> ConfigOverrides {
        let (hash_headers, minimal_headers) = if self.hash_only_message_id {
            (Some(vec!["Message-ID".to_string()]), Some(1))
        } else {
            (
                (!self.hash_headers.is_empty()).then(|| self.hash_headers.clone()),
                self.minimal_headers,
            )
        };

        ConfigOverrides {
            hash_headers,
            minimal_headers,
            hash_body: self.hash_body,
            size_threshold: self.size_threshold,
            content_threshold: self.content_threshold,
            time_source: self.time_source,
            encoding_policy: self.encoding_policy,
            fallback_charsets: (!self.fallback_charsets.is_empty())
                .then(|| self.fallback_charsets.clone()),
            strategy: self.strategy,
            regexp: self.regexp.clone(),
            show_diff: self.show_diff.then_some(true),
            threads: self.threads,
            lazy_bodies: self.no_lazy_bodies.then_some(false),
            input_format: self.input_format,
            force_unlock: self.force_unlock.then_some(true),
        }
    }
}

/// Arguments for the hash subcommand.
#[derive(Debug, Args)]
pub struct HashArgs {
    /// Raw message file (RFC 5322)
    #[arg(value_name = "FILE")]
    pub path: PathBuf,

    /// Header to include in the fingerprint (repeatable, replaces the defaults)
    #[arg(short = 'H', long = "hash-header", value_name = "HEADER")]
    pub hash_headers: Vec<String>,

    /// Minimum number of hash headers the message must carry
    #[arg(long, value_name = "N")]
    pub minimal_headers: Option<usize>,

    /// Include the body in the fingerprint
    #[arg(short = 'b', long, value_enum, value_name = "MODE")]
    pub hash_body: Option<BodyHashing>,

    /// Report format (csv is not available here)
    #[arg(short, long, value_enum, default_value = "text")]
    pub output: OutputFormat,
}

impl HashArgs {
    #[must_use]
    pub fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            hash_headers: (!self.hash_headers.is_empty()).then(|| self.hash_headers.clone()),
            minimal_headers: self.minimal_headers,
            hash_body: self.hash_body,
            ..ConfigOverrides::default()
        }
    }
}
