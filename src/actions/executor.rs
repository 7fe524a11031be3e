//! Applies the chosen action to the kept or discarded bucket of a run.

use std::path::PathBuf;

use serde::Serialize;
use thiserror::Error;

use super::delete::{delete_messages, DeleteConfig};
use super::Action;
use crate::duplicates::RunReport;
use crate::mailbox::{BoxFormat, ExportBox, MailboxError, SourceRef};

/// Errors that stop an action before it starts.
#[derive(Debug, Error)]
pub enum ActionError {
    /// Copy and move need a target mailbox.
    #[error("action {0} requires an export mailbox (--export)")]
    MissingExport(Action),

    #[error(transparent)]
    Mailbox(#[from] MailboxError),
}

/// How to carry out an action.
#[derive(Debug, Clone)]
pub struct ActionConfig {
    pub action: Action,
    /// Target mailbox for copy and move.
    pub export: Option<PathBuf>,
    pub export_format: BoxFormat,
    /// Add to an existing export mailbox instead of refusing it.
    pub export_append: bool,
    /// Only log what would be done.
    pub dry_run: bool,
    /// Remove files for good instead of moving them to the trash.
    pub permanent: bool,
    pub force_unlock: bool,
}

impl ActionConfig {
    #[must_use]
    pub fn new(action: Action) -> Self {
        Self {
            action,
            export: None,
            export_format: BoxFormat::default(),
            export_append: false,
            dry_run: false,
            permanent: false,
            force_unlock: false,
        }
    }

    #[must_use]
    pub fn with_export(mut self, path: PathBuf, format: BoxFormat, append: bool) -> Self {
        self.export = Some(path);
        self.export_format = format;
        self.export_append = append;
        self
    }

    #[must_use]
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    #[must_use]
    pub fn with_permanent(mut self, permanent: bool) -> Self {
        self.permanent = permanent;
        self
    }

    #[must_use]
    pub fn with_force_unlock(mut self, force_unlock: bool) -> Self {
        self.force_unlock = force_unlock;
        self
    }
}

/// What an action did.
#[derive(Debug, Clone, Serialize)]
pub struct ActionReport {
    pub action: Action,
    pub dry_run: bool,
    /// Size of the targeted bucket.
    pub targeted: usize,
    pub copied: usize,
    pub moved: usize,
    pub deleted: usize,
    pub failures: Vec<ActionFailure>,
}

/// One message the action could not handle.
#[derive(Debug, Clone, Serialize)]
pub struct ActionFailure {
    pub source_ref: SourceRef,
    pub error: String,
}

impl ActionReport {
    fn new(action: Action, dry_run: bool, targeted: usize) -> Self {
        Self {
            action,
            dry_run,
            targeted,
            copied: 0,
            moved: 0,
            deleted: 0,
            failures: Vec::new(),
        }
    }

    /// Messages acted on without error.
    #[must_use]
    pub fn acted(&self) -> usize {
        self.copied + self.moved + self.deleted
    }

    fn fail(&mut self, source_ref: &SourceRef, error: impl ToString) {
        let error = error.to_string();
        log::error!("{} failed for {}: {}", self.action, source_ref, error);
        self.failures.push(ActionFailure {
            source_ref: source_ref.clone(),
            error,
        });
    }
}

/// Run `config.action` over the bucket it targets.
///
/// Undetermined messages are never touched. Failures on single messages
/// are collected in the report and do not stop the action.
///
/// # Errors
///
/// Returns `ActionError::MissingExport` when copy or move has no target,
/// and `ActionError::Mailbox` if the export mailbox cannot be created.
pub fn execute(report: &RunReport, config: &ActionConfig) -> Result<ActionReport, ActionError> {
    let action = config.action;
    let targets: Vec<&SourceRef> = report
        .members_with(action.target())
        .into_iter()
        .map(|m| &m.source_ref)
        .collect();
    let mut result = ActionReport::new(action, config.dry_run, targets.len());
    log::info!("{}: {} mail(s) targeted", action, targets.len());

    if config.dry_run {
        for target in &targets {
            log::info!("[dry-run] would {} {}", action.verb(), target);
        }
        match action {
            Action::CopyKept | Action::CopyDiscarded => result.copied = targets.len(),
            Action::MoveKept | Action::MoveDiscarded => result.moved = targets.len(),
            Action::DeleteKept | Action::DeleteDiscarded => result.deleted = targets.len(),
        }
        return Ok(result);
    }

    if targets.is_empty() {
        return Ok(result);
    }

    let mut to_delete: Vec<&SourceRef> = Vec::new();
    if action.needs_export() {
        let path = config
            .export
            .as_deref()
            .ok_or(ActionError::MissingExport(action))?;
        let export = ExportBox::create(
            path,
            config.export_format,
            config.export_append,
            config.force_unlock,
        )?;

        for &target in &targets {
            match target.load().and_then(|bytes| export.add(&bytes)) {
                Ok(()) => {
                    log::debug!("Copied {} to {}", target, export.path().display());
                    if action.removes_source() {
                        to_delete.push(target);
                    } else {
                        result.copied += 1;
                    }
                }
                Err(e) => result.fail(target, e),
            }
        }
    } else {
        to_delete = targets;
    }

    if !to_delete.is_empty() {
        let delete_config = if config.permanent {
            DeleteConfig::permanent()
        } else {
            DeleteConfig::trash()
        }
        .with_force_unlock(config.force_unlock);
        let deleted = delete_messages(&to_delete, &delete_config);
        log::info!("{}", deleted.summary());

        if action.needs_export() {
            result.moved += deleted.success_count();
        } else {
            result.deleted += deleted.success_count();
        }
        for (source_ref, error) in &deleted.failures {
            result.fail(source_ref, error);
        }
    }

    Ok(result)
}
