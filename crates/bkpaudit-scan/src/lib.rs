//! # bkpaudit-scan
//!
//! Backup-file discovery on a storage share.
//!
//! This crate provides:
//! - `DirectoryScanner::scan`: recursive listing of backup files under one
//!   directory, cached for the scanner's lifetime
//! - `DirectoryScanner::scan_many`: bounded-concurrency fan-out over many
//!   directories with cooperative cancellation
//! - `probe_exists`: an existence check that cannot hang past its timeout
//!
//! Transient failures (missing share, permission denied, timeouts) are
//! retried and then reported as an empty listing. Cancellation is the only
//! condition surfaced as an error.
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::path::PathBuf;
//! use bkpaudit_core::{AuditConfig, CancellationToken};
//! use bkpaudit_scan::DirectoryScanner;
//!
//! let config = AuditConfig::new("/mnt/bkp");
//! let scanner = DirectoryScanner::from_config(&config);
//! let batch = scanner.scan_many(
//!     &[PathBuf::from("/mnt/bkp/2025/TI/SRV1/01-2025")],
//!     &CancellationToken::new(),
//! );
//! for (dir, files) in &batch.listings {
//!     println!("{}: {} backup(s)", dir.display(), files.len());
//! }
//! ```

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use bkpaudit_core::BackupFile;
use thiserror::Error;

mod scanner;
mod walk;

pub use scanner::DirectoryScanner;
pub use walk::{probe_exists, ProbeError};

/// Files found under one directory, shared between cache and callers.
pub type Listing = Arc<Vec<BackupFile>>;

/// Scan error
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum ScanError {
    /// Cancellation was observed; the listing is incomplete and not cached
    #[error("scan interrupted by cancellation")]
    Interrupted,
}

/// Result of a batch scan.
#[derive(Debug, Default)]
pub struct ScanBatch {
    /// Completed listings keyed by requested directory
    pub listings: HashMap<PathBuf, Listing>,
    /// Whether cancellation cut the batch short
    pub interrupted: bool,
}

impl ScanBatch {
    /// Files for `dir`, empty when the directory was not (or not yet) listed.
    pub fn files(&self, dir: &std::path::Path) -> &[BackupFile] {
        self.listings.get(dir).map_or(&[][..], |l| l.as_slice())
    }
}
