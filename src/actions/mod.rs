//! Mail actions module.
//!
//! Once a run has settled every disposition, an action is applied to one of
//! two buckets:
//!
//! - **kept**: unique mails and the copies a strategy chose to keep
//! - **discarded**: the copies a strategy chose to discard
//!
//! Undetermined mails (rejected, skipped or ignored sets) are never touched.
//!
//! | Action | Effect |
//! |--------|--------|
//! | `copy-*` | Add the bucket to the export mailbox |
//! | `move-*` | Copy, then remove from the source mailbox |
//! | `delete-*` | Remove from the source mailbox |
//!
//! ```no_run
//! use maildedup::actions::{execute, Action, ActionConfig};
//! use maildedup::duplicates::RunReport;
//!
//! let report = RunReport::default();
//! let config = ActionConfig::new(Action::DeleteDiscarded).with_dry_run(true);
//! let result = execute(&report, &config).unwrap();
//! println!("{} of {} mails deleted", result.deleted, result.targeted);
//! ```

pub mod delete;
pub mod executor;

use std::fmt;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::message::Disposition;

pub use delete::{
    delete_messages, delete_to_trash, permanent_delete, BatchDeleteResult, DeleteConfig,
    DeleteError, DeleteResult,
};
pub use executor::{execute, ActionConfig, ActionError, ActionFailure, ActionReport};

/// What to do with one bucket of a finished run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum Action {
    CopyKept,
    CopyDiscarded,
    MoveKept,
    MoveDiscarded,
    DeleteKept,
    DeleteDiscarded,
}

impl Action {
    /// Disposition of the targeted bucket.
    #[must_use]
    pub fn target(self) -> Disposition {
        match self {
            Action::CopyKept | Action::MoveKept | Action::DeleteKept => Disposition::Kept,
            Action::CopyDiscarded | Action::MoveDiscarded | Action::DeleteDiscarded => {
                Disposition::Discarded
            }
        }
    }

    #[must_use]
    pub fn needs_export(self) -> bool {
        !matches!(self, Action::DeleteKept | Action::DeleteDiscarded)
    }

    #[must_use]
    pub fn removes_source(self) -> bool {
        !matches!(self, Action::CopyKept | Action::CopyDiscarded)
    }

    fn verb(self) -> &'static str {
        match self {
            Action::CopyKept | Action::CopyDiscarded => "copy",
            Action::MoveKept | Action::MoveDiscarded => "move",
            Action::DeleteKept | Action::DeleteDiscarded => "delete",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Action::CopyKept => "copy-kept",
            Action::CopyDiscarded => "copy-discarded",
            Action::MoveKept => "move-kept",
            Action::MoveDiscarded => "move-discarded",
            Action::DeleteKept => "delete-kept",
            Action::DeleteDiscarded => "delete-discarded",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_action_buckets() {
        assert_eq!(Action::CopyKept.target(), Disposition::Kept);
        assert_eq!(Action::DeleteDiscarded.target(), Disposition::Discarded);
        assert!(Action::MoveKept.needs_export());
        assert!(Action::MoveKept.removes_source());
        assert!(!Action::CopyDiscarded.removes_source());
        assert!(!Action::DeleteKept.needs_export());
    }

    #[test]
    fn test_display_matches_cli_names() {
        for action in Action::value_variants() {
            let name = action.to_string();
            assert_eq!(Action::from_str(&name, false).unwrap(), *action);
        }
    }
}
