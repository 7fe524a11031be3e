//! Human-readable report printed at the end of a run.
//!
//! Only sets with more than one member are listed; unique mails show up in
//! the summary counters. Colors come from `yansi` and are turned off
//! globally with `--no-color`.

use std::io::{self, Write};

use bytesize::ByteSize;
use yansi::Paint;

use crate::actions::ActionReport;
use crate::duplicates::{MemberReport, RunReport, SetOutcome, SetReport};
use crate::message::{Disposition, HashReport};

/// Text report formatter.
pub struct TextOutput<'a> {
    report: &'a RunReport,
    action: Option<&'a ActionReport>,
}

impl<'a> TextOutput<'a> {
    #[must_use]
    pub fn new(report: &'a RunReport, action: Option<&'a ActionReport>) -> Self {
        Self { report, action }
    }

    /// Write the report.
    ///
    /// # Errors
    ///
    /// Returns an error if writing fails.
    pub fn write_to<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        let duplicate_sets: Vec<&SetReport> = self
            .report
            .sets
            .iter()
            .filter(|set| set.members.len() > 1)
            .collect();

        if !duplicate_sets.is_empty() {
            writeln!(writer, "{}", "Duplicate sets".bold())?;
            for set in duplicate_sets {
                write_set(writer, set)?;
            }
            writeln!(writer)?;
        }

        if !self.report.rejected.is_empty() {
            writeln!(writer, "{}", "Rejected mails".bold())?;
            for mail in &self.report.rejected {
                writeln!(writer, "  {}: {}", mail.source_ref, mail.reason.dim())?;
            }
            writeln!(writer)?;
        }

        self.write_summary(writer)?;

        if let Some(action) = self.action {
            write_action(writer, action)?;
        }
        Ok(())
    }

    /// Render the report into a string.
    ///
    /// # Errors
    ///
    /// Returns an error if formatting fails.
    pub fn to_string(&self) -> io::Result<String> {
        let mut buffer = Vec::new();
        self.write_to(&mut buffer)?;
        Ok(String::from_utf8_lossy(&buffer).into_owned())
    }

    fn write_summary<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        let mail = &self.report.stats.mail;
        let sets = &self.report.stats.sets;

        writeln!(writer, "{}", "Summary".bold())?;
        writeln!(
            writer,
            "  Mails:      {} found, {} rejected, {} unique, {} duplicates",
            mail.found, mail.rejected, mail.unique, mail.duplicates
        )?;
        writeln!(
            writer,
            "  Duplicates: {} kept, {} discarded, {} skipped",
            mail.retained.green(),
            mail.discarded.red(),
            mail.skipped.yellow()
        )?;
        writeln!(
            writer,
            "  Sets:       {} total, {} unique, {} deduplicated, {} ignored, {} skipped",
            sets.total, sets.unique, sets.deduplicated, sets.ignored, sets.skipped
        )?;
        let rejected_sets = sets.rejected_bad_encoding + sets.rejected_size + sets.rejected_content;
        if rejected_sets > 0 {
            writeln!(
                writer,
                "  Rejected:   {} bad encoding, {} size, {} content",
                sets.rejected_bad_encoding, sets.rejected_size, sets.rejected_content
            )?;
        }
        if mail.encoding_suspect > 0 || mail.timestamp_errors > 0 {
            writeln!(
                writer,
                "  Warnings:   {} encoding suspect, {} without timestamp",
                mail.encoding_suspect, mail.timestamp_errors
            )?;
        }
        writeln!(
            writer,
            "  Discarded:  {} of bodies",
            ByteSize::b(mail.discarded_bytes)
        )?;
        writeln!(
            writer,
            "  Duration:   {:.2}s",
            self.report.duration.as_secs_f64()
        )?;
        Ok(())
    }
}

fn write_set<W: Write>(writer: &mut W, set: &SetReport) -> io::Result<()> {
    let outcome = match &set.outcome {
        SetOutcome::Deduplicated { discarded } => format!("deduplicated, {discarded} discarded"),
        SetOutcome::Skipped { reason } => format!("skipped: {reason}"),
        SetOutcome::RejectedSize {
            difference,
            threshold,
        }
        | SetOutcome::RejectedContent {
            difference,
            threshold,
        } => format!(
            "{} ({} bytes apart, threshold {})",
            set.outcome.label(),
            difference,
            threshold
        ),
        other => other.label().to_string(),
    };
    writeln!(
        writer,
        "  {}  {}",
        set.fingerprint.short().cyan(),
        outcome
    )?;
    for member in &set.members {
        write_member(writer, member)?;
    }
    Ok(())
}

fn write_member<W: Write>(writer: &mut W, member: &MemberReport) -> io::Result<()> {
    let label = format!("{:<12}", member.disposition.to_string());
    let label = match member.disposition {
        Disposition::Kept => label.green(),
        Disposition::Discarded => label.red(),
        Disposition::Undetermined => label.dim(),
    };
    let when = member
        .timestamp
        .map_or_else(|| "no timestamp".to_string(), |t| t.format("%Y-%m-%d %H:%M:%S").to_string());
    writeln!(
        writer,
        "    {}{}  ({}, {})",
        label,
        member.source_ref,
        ByteSize::b(member.body_size),
        when
    )
}

fn write_action<W: Write>(writer: &mut W, action: &ActionReport) -> io::Result<()> {
    let mode = if action.dry_run { " (dry run)" } else { "" };
    writeln!(
        writer,
        "{} {}{}: {} of {} mail(s) handled",
        "Action".bold(),
        action.action,
        mode,
        action.acted(),
        action.targeted
    )?;
    for failure in &action.failures {
        writeln!(writer, "  {} {}: {}", "failed".red(), failure.source_ref, failure.error)?;
    }
    Ok(())
}

/// Print the diagnostics of a single message.
///
/// # Errors
///
/// Returns an error if writing fails.
pub fn write_hash_report<W: Write>(writer: &mut W, report: &HashReport) -> io::Result<()> {
    writeln!(writer, "{}", "Canonical headers".bold())?;
    for header in &report.canonical_headers {
        writeln!(writer, "  {}: {}", header.name.cyan(), header.value)?;
    }
    for warning in &report.decode_warnings {
        writeln!(
            writer,
            "  {} {} hashed as {}",
            "warning:".yellow(),
            warning.header,
            warning.escaped
        )?;
    }
    match (&report.fingerprint, &report.error) {
        (Some(fingerprint), _) => writeln!(writer, "{} {}", "Fingerprint".bold(), fingerprint),
        (None, Some(error)) => writeln!(writer, "{} {}", "No fingerprint:".red(), error),
        (None, None) => writeln!(writer, "{}", "No fingerprint".red()),
    }
}
