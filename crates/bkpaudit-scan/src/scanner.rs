//! Cached directory scanner with a bounded worker pool.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use bkpaudit_core::{AuditConfig, BackupFile, CancellationToken, RetryError, RetryPolicy};
use rayon::ThreadPoolBuilder;
use tracing::{debug, error, info, warn};

use crate::walk::{list_backups, probe_exists, WalkFailure};
use crate::{Listing, ScanBatch, ScanError};

/// How often batch collection re-checks cancellation.
const COLLECT_POLL: Duration = Duration::from_millis(100);

/// Per-directory single-flight slot. Holding its lock means "scanning".
type Slot = Arc<Mutex<Option<Listing>>>;

/// Lists backup files under storage directories.
///
/// Listings are cached for the scanner's lifetime and never invalidated, so
/// build one scanner per run. Concurrent requests for the same uncached
/// directory wait for a single walk instead of racing. Cheap to clone; clones
/// share the cache.
#[derive(Clone)]
pub struct DirectoryScanner {
    inner: Arc<Inner>,
}

struct Inner {
    extensions: Vec<String>,
    retry: RetryPolicy,
    timeout: Duration,
    workers: usize,
    cache: Mutex<HashMap<PathBuf, Slot>>,
}

impl DirectoryScanner {
    /// Create a scanner.
    ///
    /// `extensions` are matched case-insensitively, with or without a
    /// leading dot.
    pub fn new(
        extensions: &[String],
        retry: RetryPolicy,
        timeout: Duration,
        workers: usize,
    ) -> Self {
        let extensions = extensions
            .iter()
            .map(|e| e.trim().trim_start_matches('.').to_lowercase())
            .filter(|e| !e.is_empty())
            .collect();
        Self {
            inner: Arc::new(Inner {
                extensions,
                retry,
                timeout,
                workers: workers.max(1),
                cache: Mutex::new(HashMap::new()),
            }),
        }
    }

    pub fn from_config(config: &AuditConfig) -> Self {
        Self::new(
            &config.extensions,
            config.retry_policy(),
            config.network_timeout(),
            config.workers,
        )
    }

    /// Backup files under `dir`, recursively.
    ///
    /// A directory that does not exist or cannot be read after the bounded
    /// retry yields an empty listing (logged, not cached). Cancellation
    /// yields [`ScanError::Interrupted`].
    pub fn scan(&self, dir: &Path, cancel: &CancellationToken) -> Result<Listing, ScanError> {
        self.inner.scan(dir, cancel)
    }

    /// Scan many directories with at most `workers` walks in flight.
    ///
    /// Duplicate requests are scanned once. Cancellation stops dispatch and
    /// collection; the batch then holds only the listings completed so far
    /// and is flagged `interrupted`. In-flight walks are abandoned and stop
    /// at their next checkpoint.
    pub fn scan_many(&self, dirs: &[PathBuf], cancel: &CancellationToken) -> ScanBatch {
        let mut seen = HashSet::new();
        let unique: Vec<PathBuf> = dirs.iter().filter(|d| seen.insert(*d)).cloned().collect();

        let mut batch = ScanBatch::default();
        if unique.is_empty() {
            return batch;
        }
        if cancel.is_cancelled() {
            info!("batch scan cancelled before dispatch");
            batch.interrupted = true;
            return batch;
        }

        let pool = match ThreadPoolBuilder::new()
            .num_threads(self.inner.workers)
            .thread_name(|i| format!("bkpaudit-scan-{i}"))
            .build()
        {
            Ok(pool) => pool,
            Err(err) => {
                error!(error = %err, "cannot start scan workers, scanning sequentially");
                return self.scan_sequential(&unique, cancel);
            }
        };

        let (tx, rx) = mpsc::channel();
        let mut dispatched = 0usize;
        for dir in &unique {
            if cancel.is_cancelled() {
                info!(dispatched, total = unique.len(), "batch scan cancelled during dispatch");
                batch.interrupted = true;
                break;
            }
            let tx = tx.clone();
            let inner = Arc::clone(&self.inner);
            let cancel = cancel.clone();
            let dir = dir.clone();
            pool.spawn(move || {
                let outcome = inner.scan(&dir, &cancel);
                let _ = tx.send((dir, outcome));
            });
            dispatched += 1;
        }
        drop(tx);

        let stall_limit = self.inner.item_budget();
        let mut last_progress = Instant::now();
        let mut received = 0usize;
        while received < dispatched {
            if cancel.is_cancelled() {
                info!(received, dispatched, "batch scan cancelled during collection");
                batch.interrupted = true;
                break;
            }
            match rx.recv_timeout(COLLECT_POLL) {
                Ok((dir, Ok(listing))) => {
                    received += 1;
                    last_progress = Instant::now();
                    batch.listings.insert(dir, listing);
                }
                Ok((dir, Err(ScanError::Interrupted))) => {
                    received += 1;
                    debug!(path = %dir.display(), "scan interrupted");
                    batch.interrupted = true;
                }
                Err(RecvTimeoutError::Timeout) => {
                    if last_progress.elapsed() > stall_limit {
                        error!(
                            pending = dispatched - received,
                            limit_secs = stall_limit.as_secs(),
                            "scan workers stalled, abandoning remaining directories"
                        );
                        break;
                    }
                }
                Err(RecvTimeoutError::Disconnected) => {
                    warn!(pending = dispatched - received, "scan workers exited early");
                    break;
                }
            }
        }

        if !batch.interrupted {
            for dir in unique {
                batch.listings.entry(dir).or_default();
            }
        }
        batch
    }

    /// Whether a listing for `dir` is cached.
    pub fn is_cached(&self, dir: &Path) -> bool {
        let slot = self
            .inner
            .cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(dir)
            .cloned();
        slot.is_some_and(|slot| slot.lock().unwrap_or_else(PoisonError::into_inner).is_some())
    }

    fn scan_sequential(&self, dirs: &[PathBuf], cancel: &CancellationToken) -> ScanBatch {
        let mut batch = ScanBatch::default();
        for dir in dirs {
            match self.inner.scan(dir, cancel) {
                Ok(listing) => {
                    batch.listings.insert(dir.clone(), listing);
                }
                Err(ScanError::Interrupted) => {
                    batch.interrupted = true;
                    break;
                }
            }
        }
        batch
    }
}

impl Inner {
    fn slot(&self, dir: &Path) -> Slot {
        let mut cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(cache.entry(dir.to_path_buf()).or_default())
    }

    fn scan(&self, dir: &Path, cancel: &CancellationToken) -> Result<Listing, ScanError> {
        if cancel.is_cancelled() {
            return Err(ScanError::Interrupted);
        }

        let slot = self.slot(dir);
        let mut cached = slot.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(listing) = cached.as_ref() {
            debug!(path = %dir.display(), files = listing.len(), "listing served from cache");
            return Ok(Arc::clone(listing));
        }

        match self.scan_uncached(dir, cancel)? {
            Some(files) => {
                debug!(path = %dir.display(), files = files.len(), "directory listed");
                let listing: Listing = Arc::new(files);
                *cached = Some(Arc::clone(&listing));
                Ok(listing)
            }
            None => Ok(Listing::default()),
        }
    }

    /// `Ok(None)` means missing or unreadable after retries.
    fn scan_uncached(
        &self,
        dir: &Path,
        cancel: &CancellationToken,
    ) -> Result<Option<Vec<BackupFile>>, ScanError> {
        match self.retry.run("probe directory", cancel, || probe_exists(dir, self.timeout)) {
            Ok(true) => {}
            Ok(false) => {
                warn!(path = %dir.display(), "directory not found");
                return Ok(None);
            }
            Err(RetryError::Interrupted) => return Err(ScanError::Interrupted),
            Err(RetryError::Exhausted { attempts, last }) => {
                error!(path = %dir.display(), attempts, error = %last, "directory unreachable");
                return Ok(None);
            }
        }

        match self.retry.run("list directory", cancel, || {
            list_backups(dir, &self.extensions, self.timeout, cancel)
        }) {
            Ok(files) => Ok(Some(files)),
            Err(
                RetryError::Interrupted
                | RetryError::Exhausted {
                    last: WalkFailure::Interrupted,
                    ..
                },
            ) => {
                info!(path = %dir.display(), "listing interrupted");
                Err(ScanError::Interrupted)
            }
            Err(RetryError::Exhausted { attempts, last }) => {
                error!(path = %dir.display(), attempts, error = %last, "cannot list directory");
                Ok(None)
            }
        }
    }

    /// Longest a batch waits without any directory completing.
    fn item_budget(&self) -> Duration {
        let attempts = self.retry.attempts.max(1);
        // probe + listing may each use the full timeout per attempt
        (self.timeout * 2 + self.retry.delay) * attempts + Duration::from_secs(1)
    }
}
