//! Integration tests for the cached directory scanner

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

use bkpaudit_core::{CancellationToken, RetryPolicy};
use bkpaudit_scan::{DirectoryScanner, ScanError};
use pretty_assertions::assert_eq;
use tempfile::tempdir;

fn scanner(workers: usize) -> DirectoryScanner {
    DirectoryScanner::new(
        &[".zip".to_string(), "RAR".to_string(), ".lscx".to_string()],
        RetryPolicy::new(2, Duration::from_millis(1)),
        Duration::from_secs(10),
        workers,
    )
}

fn touch(path: &Path) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, b"backup").unwrap();
}

fn names(files: &[bkpaudit_core::BackupFile]) -> Vec<String> {
    let mut names: Vec<String> = files.iter().map(|f| f.file_name()).collect();
    names.sort();
    names
}

#[test]
fn scan_lists_allowed_extensions_recursively() {
    let dir = tempdir().unwrap();
    touch(&dir.path().join("a.zip"));
    touch(&dir.path().join("sub/b.rar"));
    touch(&dir.path().join("sub/deep/c.LSCX"));
    touch(&dir.path().join("sub/d.log"));

    let listing = scanner(2).scan(dir.path(), &CancellationToken::new()).unwrap();
    assert_eq!(names(&listing), vec!["a.zip", "b.rar", "c.LSCX"]);
}

#[test]
fn missing_directory_yields_empty_listing() {
    let dir = tempdir().unwrap();
    let scanner = scanner(2);
    let missing = dir.path().join("2025/TI/SRV9/01-2025");

    let listing = scanner.scan(&missing, &CancellationToken::new()).unwrap();
    assert!(listing.is_empty());
    assert!(!scanner.is_cached(&missing), "failures are not cached");
}

#[test]
fn cached_listing_matches_fresh_scan() {
    let dir = tempdir().unwrap();
    touch(&dir.path().join("one.zip"));
    let scanner = scanner(2);
    let cancel = CancellationToken::new();

    let first = scanner.scan(dir.path(), &cancel).unwrap();
    assert!(scanner.is_cached(dir.path()));

    let fresh = self::scanner(2).scan(dir.path(), &cancel).unwrap();
    let cached = scanner.scan(dir.path(), &cancel).unwrap();
    assert_eq!(*cached, *fresh);
    assert_eq!(*cached, *first);
}

#[test]
fn cache_is_not_invalidated_within_a_run() {
    let dir = tempdir().unwrap();
    touch(&dir.path().join("one.zip"));
    let scanner = scanner(2);
    let cancel = CancellationToken::new();

    scanner.scan(dir.path(), &cancel).unwrap();
    touch(&dir.path().join("two.zip"));

    assert_eq!(names(&scanner.scan(dir.path(), &cancel).unwrap()), vec!["one.zip"]);
    assert_eq!(
        names(&self::scanner(2).scan(dir.path(), &cancel).unwrap()),
        vec!["one.zip", "two.zip"]
    );
}

#[test]
fn concurrent_scans_of_one_directory_share_a_single_walk() {
    let dir = tempdir().unwrap();
    for i in 0..400 {
        touch(&dir.path().join(format!("set-{}/{i}.zip", i % 20)));
    }
    let scanner = scanner(4);
    let start = Barrier::new(8);

    let listings: Vec<_> = thread::scope(|s| {
        let handles: Vec<_> = (0..8)
            .map(|_| {
                s.spawn(|| {
                    start.wait();
                    scanner.scan(dir.path(), &CancellationToken::new()).unwrap()
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    // every caller got the one listing that was cached
    assert_eq!(listings[0].len(), 400);
    assert!(listings.iter().all(|l| Arc::ptr_eq(l, &listings[0])));
    assert!(scanner.is_cached(dir.path()));
}

#[test]
fn cancelled_scan_is_interrupted_not_empty() {
    let dir = tempdir().unwrap();
    touch(&dir.path().join("one.zip"));
    let cancel = CancellationToken::new();
    cancel.cancel();

    let scanner = scanner(2);
    assert_eq!(scanner.scan(dir.path(), &cancel).unwrap_err(), ScanError::Interrupted);
    assert!(!scanner.is_cached(dir.path()));
}

#[test]
fn scan_many_covers_every_requested_directory() {
    let root = tempdir().unwrap();
    let dirs: Vec<PathBuf> = (1..=7)
        .map(|i| root.path().join(format!("2025/TI/SRV{i}/01-2025")))
        .collect();
    for (i, dir) in dirs.iter().enumerate() {
        for n in 0..=i {
            touch(&dir.join(format!("bkp-{n}.zip")));
        }
    }
    let absent = root.path().join("2025/TI/GONE/01-2025");

    let mut requested = dirs.clone();
    requested.push(absent.clone());
    requested.push(dirs[0].clone());

    let batch = scanner(3).scan_many(&requested, &CancellationToken::new());
    assert!(!batch.interrupted);
    assert_eq!(batch.listings.len(), 8);
    for (i, dir) in dirs.iter().enumerate() {
        assert_eq!(batch.files(dir).len(), i + 1, "{}", dir.display());
    }
    assert!(batch.files(&absent).is_empty());
}

#[test]
fn scan_many_with_cancelled_token_returns_nothing() {
    let root = tempdir().unwrap();
    touch(&root.path().join("a/x.zip"));
    let cancel = CancellationToken::new();
    cancel.cancel();

    let batch = scanner(2).scan_many(&[root.path().join("a")], &cancel);
    assert!(batch.interrupted);
    assert!(batch.listings.is_empty());
}

#[test]
fn scan_many_of_nothing_is_empty() {
    let batch = scanner(1).scan_many(&[], &CancellationToken::new());
    assert!(!batch.interrupted);
    assert!(batch.listings.is_empty());
}
