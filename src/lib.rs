//! maildedup - Duplicate Mail Finder
//!
//! Finds duplicate mails across mbox, maildir and MH mailboxes by
//! fingerprinting canonical headers (BLAKE3), guards against false positives
//! with size and content checks, and lets a selection strategy decide which
//! copies to keep. Kept or discarded mails can then be copied, moved or
//! deleted.

pub mod actions;
pub mod cli;
pub mod config;
pub mod duplicates;
pub mod error;
pub mod logging;
pub mod mailbox;
pub mod message;
pub mod output;
pub mod progress;
pub mod signal;

use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::Path;
use std::sync::Arc;

use anyhow::Context;

use crate::actions::{execute, ActionConfig, ActionError, ActionReport};
use crate::cli::{Cli, Commands, DedupeArgs, HashArgs};
use crate::config::Config;
use crate::duplicates::{DedupError, DuplicateFinder, FinderConfig, RunReport};
use crate::error::ExitCode;
use crate::mailbox::open_all;
use crate::output::{CsvOutput, JsonOutput, OutputFormat, TextOutput};
use crate::progress::Progress;

/// Run the command given on the command line.
///
/// Logging must already be initialized; `main` does it once per process.
///
/// # Errors
///
/// Returns the first fatal error. [`ExitCode::for_error`] maps it to the
/// process exit code.
pub fn run_app(cli: Cli) -> anyhow::Result<ExitCode> {
    if cli.no_color {
        yansi::disable();
    }

    match &cli.command {
        Commands::Dedupe(args) => run_dedupe(cli.config.as_deref(), args, cli.quiet),
        Commands::Hash(args) => run_hash(cli.config.as_deref(), args),
    }
}

fn run_dedupe(config_file: Option<&Path>, args: &DedupeArgs, quiet: bool) -> anyhow::Result<ExitCode> {
    let config = Config::load_with_overrides(config_file, &args.overrides())?;
    config.validate()?;
    log::debug!("Effective configuration: {config:?}");

    if let Some(action) = args.action {
        if action.needs_export() && args.export.is_none() {
            return Err(ActionError::MissingExport(action).into());
        }
    }

    let handler = signal::install_handler()?;
    let progress = Arc::new(Progress::new(quiet));
    let finder = DuplicateFinder::new(
        FinderConfig::new(config.clone())
            .with_shutdown_flag(handler.get_flag())
            .with_progress_callback(progress),
    )?;

    let mailboxes = open_all(&args.mailboxes, config.input_format)?;
    let report = finder.find_duplicates(&mailboxes)?;

    if handler.is_shutdown_requested() {
        return Err(DedupError::Interrupted.into());
    }

    let action_report = match args.action {
        Some(action) => {
            let mut action_config = ActionConfig::new(action)
                .with_dry_run(args.dry_run)
                .with_permanent(args.permanent)
                .with_force_unlock(config.force_unlock);
            if let Some(export) = &args.export {
                action_config =
                    action_config.with_export(export.clone(), args.export_format, args.export_append);
            }
            Some(execute(&report, &action_config)?)
        }
        None => None,
    };

    write_report(&report, action_report.as_ref(), args)?;
    Ok(ExitCode::Success)
}

fn write_report(
    report: &RunReport,
    action: Option<&ActionReport>,
    args: &DedupeArgs,
) -> anyhow::Result<()> {
    let mut writer: Box<dyn Write> = match &args.output_file {
        Some(path) => {
            yansi::disable();
            let file = File::create(path)
                .with_context(|| format!("cannot create report file {}", path.display()))?;
            Box::new(BufWriter::new(file))
        }
        None => Box::new(io::stdout().lock()),
    };

    match args.output {
        OutputFormat::Text => TextOutput::new(report, action).write_to(&mut writer)?,
        OutputFormat::Json => {
            JsonOutput::new(report, action, ExitCode::Success).write_to(&mut writer, true)?;
        }
        OutputFormat::Csv => CsvOutput::new(&report.sets).write_to(&mut writer)?,
    }
    writer.flush()?;
    Ok(())
}

fn run_hash(config_file: Option<&Path>, args: &HashArgs) -> anyhow::Result<ExitCode> {
    let config = Config::load_with_overrides(config_file, &args.overrides())?;
    config.validate()?;

    let bytes = fs::read(&args.path)
        .with_context(|| format!("cannot read message {}", args.path.display()))?;
    let report = message::hash_message(&bytes, &config)?;

    let mut stdout = io::stdout().lock();
    match args.output {
        OutputFormat::Json => output::json::write_hash_report(&report, &mut stdout, true)?,
        OutputFormat::Text => output::text::write_hash_report(&mut stdout, &report)?,
        OutputFormat::Csv => {
            log::warn!("CSV output is not available for a single message, printing text");
            output::text::write_hash_report(&mut stdout, &report)?;
        }
    }
    Ok(ExitCode::Success)
}
