//! # bkpaudit-engine
//!
//! Verification engine for bkpaudit.
//!
//! This crate provides:
//! - `VerificationEngine::verify`: one audit run over a tracking workbook
//! - `RunPhase`: the run state machine, logged at every transition
//! - `RunReport`: counters, final phase and notification result of a run
//!
//! A run probes the storage root, loads the workbook, then for every tab
//! resolves the weeks that should already have a backup, scans every
//! candidate directory once, matches files to weeks and colors the result
//! cells. The workbook is saved once at the end; a cancelled or failed run
//! leaves the file on disk untouched.
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::path::Path;
//! use bkpaudit_core::{AuditConfig, CancellationToken, NoProgress};
//! use bkpaudit_engine::{VerificationEngine, VerifyOptions};
//!
//! let engine = VerificationEngine::new(AuditConfig::new("/mnt/bkp"));
//! let report = engine.verify(
//!     Path::new("tracking.xlsx"),
//!     VerifyOptions { send_notification: false },
//!     &CancellationToken::new(),
//!     &NoProgress,
//! );
//! assert!(report.is_success());
//! ```

use std::fmt;
use std::path::PathBuf;

use bkpaudit_notify::NotificationOutcome;
use serde::Serialize;
use thiserror::Error;

mod engine;
mod tab;

pub use engine::{VerificationEngine, VerifyOptions};

// ============================================================================
// Errors
// ============================================================================

/// Fatal error raised before (or while persisting) the workbook.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SetupError {
    #[error("storage root {root} is not reachable: {reason}")]
    StorageUnreachable { root: PathBuf, reason: String },

    #[error("spreadsheet {0} does not exist")]
    SpreadsheetMissing(PathBuf),

    #[error("spreadsheet {path} cannot be loaded: {reason}")]
    SpreadsheetUnreadable { path: PathBuf, reason: String },

    #[error("spreadsheet {path} cannot be saved: {reason}")]
    Save { path: PathBuf, reason: String },
}

// ============================================================================
// State machine
// ============================================================================

/// Where a run is.
///
/// ```text
/// Idle -> Scanning(tab) -> Resolving(tab) -> Matching(tab) -> Annotating(tab)
///      -> [next tab | Saving] -> Notifying -> Done
/// ```
///
/// `Cancelled` and `Failed` are reachable from any non-terminal phase.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "phase", content = "tab", rename_all = "snake_case")]
pub enum RunPhase {
    Idle,
    /// Reading week headers and entity rows
    Scanning(String),
    /// Deriving candidate directories and listing them
    Resolving(String),
    /// Selecting the newest file per entity and week
    Matching(String),
    /// Writing colored results
    Annotating(String),
    Saving,
    Notifying,
    Done,
    Cancelled,
    Failed,
}

impl RunPhase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunPhase::Done | RunPhase::Cancelled | RunPhase::Failed)
    }
}

impl fmt::Display for RunPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunPhase::Idle => write!(f, "idle"),
            RunPhase::Scanning(tab) => write!(f, "scanning({tab})"),
            RunPhase::Resolving(tab) => write!(f, "resolving({tab})"),
            RunPhase::Matching(tab) => write!(f, "matching({tab})"),
            RunPhase::Annotating(tab) => write!(f, "annotating({tab})"),
            RunPhase::Saving => write!(f, "saving"),
            RunPhase::Notifying => write!(f, "notifying"),
            RunPhase::Done => write!(f, "done"),
            RunPhase::Cancelled => write!(f, "cancelled"),
            RunPhase::Failed => write!(f, "failed"),
        }
    }
}

// ============================================================================
// Results
// ============================================================================

/// Overall result of a run.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "reason", rename_all = "snake_case")]
pub enum RunOutcome {
    Completed,
    /// Cancellation was observed; distinct from failure
    Cancelled,
    Failed(String),
}

/// Cell counters for one run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct CellCounts {
    pub found: usize,
    pub not_found: usize,
    pub already_filled: usize,
}

/// Everything a caller needs to know about a run.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct RunReport {
    pub outcome: RunOutcome,
    /// Last phase reached
    pub phase: RunPhase,
    pub tabs_total: usize,
    pub tabs_completed: usize,
    pub cells: CellCounts,
    /// Distinct directories listed across all tabs
    pub directories_scanned: usize,
    /// Whether the workbook was written back
    pub saved: bool,
    pub notification: NotificationOutcome,
}

impl RunReport {
    pub(crate) fn new() -> Self {
        Self {
            outcome: RunOutcome::Completed,
            phase: RunPhase::Idle,
            tabs_total: 0,
            tabs_completed: 0,
            cells: CellCounts::default(),
            directories_scanned: 0,
            saved: false,
            notification: NotificationOutcome::Skipped,
        }
    }

    /// True only for a completed run.
    pub fn is_success(&self) -> bool {
        self.outcome == RunOutcome::Completed
    }

    pub fn is_cancelled(&self) -> bool {
        self.outcome == RunOutcome::Cancelled
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.outcome {
            RunOutcome::Completed => write!(f, "completed")?,
            RunOutcome::Cancelled => write!(f, "cancelled")?,
            RunOutcome::Failed(reason) => write!(f, "failed: {reason}")?,
        }
        write!(
            f,
            " | tabs {}/{} | found {} | not found {} | kept {} | {}",
            self.tabs_completed,
            self.tabs_total,
            self.cells.found,
            self.cells.not_found,
            self.cells.already_filled,
            self.notification
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_phases() {
        assert!(RunPhase::Done.is_terminal());
        assert!(RunPhase::Cancelled.is_terminal());
        assert!(RunPhase::Failed.is_terminal());
        assert!(!RunPhase::Scanning("Servers".into()).is_terminal());
    }

    #[test]
    fn report_summary_line() {
        let mut report = RunReport::new();
        report.tabs_total = 2;
        report.tabs_completed = 2;
        report.cells.found = 3;
        report.notification = NotificationOutcome::Suppressed;
        assert_eq!(
            report.to_string(),
            "completed | tabs 2/2 | found 3 | not found 0 | kept 0 | no missing backups, nothing sent"
        );
    }
}
