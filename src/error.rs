//! Structured error handling and exit codes.

use serde::Serialize;

/// Exit codes for the maildedup application.
///
/// - 0: Success (run completed; rejected or skipped sets are still a success)
/// - 1: General error (unexpected failure, unreadable mailbox)
/// - 2: Usage error (invalid configuration, reported before any mailbox is opened)
/// - 3: Internal error (run statistics failed their consistency check)
/// - 130: Interrupted by user (Ctrl+C)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ExitCode {
    /// Success: Run completed.
    Success = 0,
    /// General error: An unexpected error occurred.
    GeneralError = 1,
    /// Usage error: The configuration was rejected at startup.
    UsageError = 2,
    /// Internal error: The engine produced inconsistent statistics.
    InternalError = 3,
    /// Interrupted: Run was interrupted by user (Ctrl+C).
    Interrupted = 130,
}

impl ExitCode {
    /// Get the numeric exit code.
    #[must_use]
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    /// Get the machine-readable code prefix.
    #[must_use]
    pub fn code_prefix(self) -> &'static str {
        match self {
            Self::Success => "MD000",
            Self::GeneralError => "MD001",
            Self::UsageError => "MD002",
            Self::InternalError => "MD003",
            Self::Interrupted => "MD130",
        }
    }

    /// Pick the exit code matching an error bubbled up from `run_app`.
    #[must_use]
    pub fn for_error(err: &anyhow::Error) -> Self {
        use crate::actions::ActionError;
        use crate::config::ConfigError;
        use crate::duplicates::DedupError;

        if err.downcast_ref::<ConfigError>().is_some()
            || matches!(
                err.downcast_ref::<ActionError>(),
                Some(ActionError::MissingExport(_))
            )
        {
            return Self::UsageError;
        }
        match err.downcast_ref::<DedupError>() {
            Some(DedupError::Interrupted) => Self::Interrupted,
            Some(DedupError::InconsistentStats(_)) => Self::InternalError,
            Some(DedupError::Config(_)) => Self::UsageError,
            _ => Self::GeneralError,
        }
    }
}

/// Structured error information for JSON output.
#[derive(Debug, Serialize)]
pub struct StructuredError {
    /// The error code (e.g., "MD001")
    pub code: String,
    /// The exit code number
    pub exit_code: i32,
    /// Human-readable error message
    pub message: String,
    /// Whether the operation was interrupted
    pub interrupted: bool,
}

impl StructuredError {
    /// Create a new structured error from an anyhow error and an exit code.
    #[must_use]
    pub fn new(err: &anyhow::Error, exit_code: ExitCode) -> Self {
        Self {
            code: exit_code.code_prefix().to_string(),
            exit_code: exit_code.as_i32(),
            message: format!("{err:#}"),
            interrupted: exit_code == ExitCode::Interrupted,
        }
    }
}
