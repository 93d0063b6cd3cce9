//! # bkpaudit-core
//!
//! Core domain model for the bkpaudit backup verification engine.
//!
//! This crate provides:
//! - Domain types: `EntityRecord`, `WeekInterval`, `BackupFile`, `CellResult`,
//!   `MissingBackupGroup`
//! - Week-label resolution (`interval`) and storage path conventions (`paths`)
//! - Run plumbing shared by every stage: `AuditConfig`, `CancellationToken`,
//!   `RetryPolicy` and the `ProgressSink` trait
//!
//! ## Example
//!
//! ```rust
//! use std::path::Path;
//! use bkpaudit_core::{interval, paths::{derive_path, MonthYear}, EntityRecord};
//!
//! let (start, end) = interval::resolve_interval("DIA 15 - 21", 2025, 1).unwrap();
//! assert_eq!(start.to_string(), "2025-01-15");
//! assert_eq!(end.to_string(), "2025-01-21");
//!
//! let entity = EntityRecord::from_cells("SRV1", "", "TI").unwrap();
//! let dir = derive_path(Path::new("/bkp"), &entity.sector, &entity.tag, MonthYear::of(start));
//! assert_eq!(dir, Path::new("/bkp/2025/TI/SRV1/01-2025"));
//! ```

use std::path::PathBuf;

use chrono::{Datelike, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

pub mod cancel;
pub mod config;
pub mod interval;
pub mod paths;
pub mod retry;

pub use cancel::CancellationToken;
pub use config::{AuditConfig, ConfigError, MailConfig};
pub use retry::{RetryError, RetryPolicy};

// ============================================================================
// Sheet conventions
// ============================================================================

/// Value written into a week cell when no backup was found for that week.
pub const NOT_FOUND_MARK: &str = "NOT FOUND";

/// Responsible name used when the responsible column is blank.
pub const UNSPECIFIED_RESPONSIBLE: &str = "unspecified";

/// Row holding the week headers (`Semana N`), 1-based.
pub const HEADER_ROW: u32 = 2;

/// Row holding the interval labels (`DIA a - b`), 1-based.
pub const INTERVAL_ROW: u32 = 3;

/// First row holding entity records, 1-based.
pub const FIRST_ENTITY_ROW: u32 = 4;

/// First column that can hold a week result, 1-based.
pub const FIRST_WEEK_COLUMN: u32 = 6;

/// Columns holding the entity identity, 1-based.
pub const TAG_COLUMN: u32 = 1;
pub const RESPONSIBLE_COLUMN: u32 = 2;
pub const SECTOR_COLUMN: u32 = 3;

// ============================================================================
// Entities
// ============================================================================

/// One audited entity, read from a tab row.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntityRecord {
    /// Entity tag (storage folder name)
    pub tag: String,
    /// Person responsible for the backup
    pub responsible: String,
    /// Owning sector (storage folder above the tag)
    pub sector: String,
}

impl EntityRecord {
    /// Build a record from raw cell text.
    ///
    /// Returns `None` unless both tag and sector are non-empty. A blank
    /// responsible becomes [`UNSPECIFIED_RESPONSIBLE`].
    pub fn from_cells(tag: &str, responsible: &str, sector: &str) -> Option<Self> {
        let tag = tag.trim();
        let sector = sector.trim();
        if tag.is_empty() || sector.is_empty() {
            return None;
        }
        let responsible = match responsible.trim() {
            "" => UNSPECIFIED_RESPONSIBLE,
            name => name,
        };
        Some(Self {
            tag: tag.to_string(),
            responsible: responsible.to_string(),
            sector: sector.to_string(),
        })
    }
}

// ============================================================================
// Weeks
// ============================================================================

/// A week column resolved to concrete dates.
///
/// Invariant: `start <= end`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeekInterval {
    /// ISO week number named by the column header
    pub week: u32,
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl WeekInterval {
    /// Create an interval, rejecting reversed ranges.
    pub fn new(week: u32, start: NaiveDate, end: NaiveDate) -> Option<Self> {
        (start <= end).then_some(Self { week, start, end })
    }

    /// Whether `date` falls inside the inclusive range.
    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }

    /// Human-readable range, e.g. `15/01/2025 - 21/01/2025`.
    pub fn describe(&self, date_format: &str) -> String {
        format!(
            "{} - {}",
            self.start.format(date_format),
            self.end.format(date_format)
        )
    }
}

// ============================================================================
// Files and results
// ============================================================================

/// A backup file discovered under a candidate directory.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupFile {
    pub path: PathBuf,
    /// Local modification time
    pub modified: NaiveDateTime,
}

impl BackupFile {
    pub fn modified_date(&self) -> NaiveDate {
        self.modified.date()
    }

    /// File name without its directory, for log output.
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

/// A backup file accepted as evidence for one week.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FileMatch<'a> {
    pub week: u32,
    pub file: &'a BackupFile,
}

/// Pick the evidence for `interval` among `files`.
///
/// Only files modified inside the interval and during `current_year` count;
/// the most recently modified one wins.
pub fn latest_match<'a>(
    files: impl IntoIterator<Item = &'a BackupFile>,
    interval: &WeekInterval,
    current_year: i32,
) -> Option<FileMatch<'a>> {
    files
        .into_iter()
        .filter(|f| f.modified.year() == current_year && interval.contains(f.modified_date()))
        .max_by_key(|f| f.modified)
        .map(|file| FileMatch {
            week: interval.week,
            file,
        })
}

/// Outcome for one (entity row, week column) cell.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum CellResult {
    /// The cell already holds a confirmed value and was left alone
    AlreadyFilled,
    /// A backup was found; `date` is the formatted modification date
    Found { date: String, file: PathBuf },
    /// No backup was found for the week
    NotFound,
}

/// Missing backups of one entity on one tab, for the notification report.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MissingBackupGroup {
    pub tab: String,
    pub entity: EntityRecord,
    pub weeks: Vec<MissingWeek>,
}

/// One week still marked as missing.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MissingWeek {
    pub week: u32,
    /// Interval rendered with the configured date format
    pub interval: String,
}

// ============================================================================
// Traits
// ============================================================================

/// Receives run progress as a fraction in `[0, 1]`.
pub trait ProgressSink: Send + Sync {
    fn report(&self, fraction: f64);
}

impl<F> ProgressSink for F
where
    F: Fn(f64) + Send + Sync,
{
    fn report(&self, fraction: f64) {
        self(fraction.clamp(0.0, 1.0));
    }
}

/// Progress sink that discards updates.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn report(&self, _fraction: f64) {}
}

// ============================================================================
// Tests
// ============================================================================
