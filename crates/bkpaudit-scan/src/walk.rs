//! Single-directory walking and bounded existence checks.

use std::ffi::OsStr;
use std::path::Path;
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};

use bkpaudit_core::{BackupFile, CancellationToken};
use chrono::{DateTime, Local};
use thiserror::Error;
use tracing::warn;
use walkdir::WalkDir;

/// Failure of a bounded existence check.
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("no answer from storage within {0:?}")]
    TimedOut(Duration),

    #[error("{0}")]
    Io(#[from] std::io::Error),
}

/// Check whether `path` exists, giving up after `timeout`.
///
/// The check runs on a helper thread; a share that never answers leaves that
/// thread behind instead of blocking the caller.
pub fn probe_exists(path: &Path, timeout: Duration) -> Result<bool, ProbeError> {
    let (tx, rx) = mpsc::channel();
    let owned = path.to_path_buf();
    thread::Builder::new()
        .name("bkpaudit-probe".into())
        .spawn(move || {
            let _ = tx.send(owned.try_exists());
        })?;
    match rx.recv_timeout(timeout) {
        Ok(result) => Ok(result?),
        Err(_) => Err(ProbeError::TimedOut(timeout)),
    }
}

/// Why one listing attempt did not complete.
#[derive(Debug, Error)]
pub(crate) enum WalkFailure {
    #[error("cancelled mid-walk")]
    Interrupted,

    #[error("listing exceeded {0:?}")]
    TimedOut(Duration),

    #[error("{0}")]
    Walk(#[from] walkdir::Error),
}

/// List backup files under `root`, recursively.
///
/// `extensions` must already be lower-case and dot-free. Unreadable
/// subfolders and files without a readable modification time are skipped
/// with a warning; failure to read `root` itself fails the attempt.
pub(crate) fn list_backups(
    root: &Path,
    extensions: &[String],
    timeout: Duration,
    cancel: &CancellationToken,
) -> Result<Vec<BackupFile>, WalkFailure> {
    let deadline = Instant::now() + timeout;
    let mut files = Vec::new();

    for entry in WalkDir::new(root).follow_links(false) {
        if cancel.is_cancelled() {
            return Err(WalkFailure::Interrupted);
        }
        if Instant::now() > deadline {
            return Err(WalkFailure::TimedOut(timeout));
        }

        let entry = match entry {
            Ok(entry) => entry,
            Err(err) if err.depth() == 0 => return Err(err.into()),
            Err(err) => {
                warn!(error = %err, "skipping unreadable entry");
                continue;
            }
        };
        if !entry.file_type().is_file() || !has_backup_extension(entry.path(), extensions) {
            continue;
        }

        let modified = entry
            .metadata()
            .map_err(std::io::Error::from)
            .and_then(|m| m.modified());
        let modified = match modified {
            Ok(time) => DateTime::<Local>::from(time).naive_local(),
            Err(err) => {
                warn!(
                    path = %entry.path().display(),
                    error = %err,
                    "cannot read modification time"
                );
                continue;
            }
        };
        files.push(BackupFile {
            path: entry.into_path(),
            modified,
        });
    }

    Ok(files)
}

pub(crate) fn has_backup_extension(path: &Path, extensions: &[String]) -> bool {
    path.extension()
        .and_then(OsStr::to_str)
        .map(str::to_lowercase)
        .is_some_and(|ext| extensions.iter().any(|allowed| *allowed == ext))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn exts() -> Vec<String> {
        vec!["zip".into(), "rar".into()]
    }

    #[test]
    fn extension_match_ignores_case() {
        assert!(has_backup_extension(Path::new("a/b/dump.ZIP"), &exts()));
        assert!(has_backup_extension(Path::new("dump.rar"), &exts()));
        assert!(!has_backup_extension(Path::new("dump.zip.tmp"), &exts()));
        assert!(!has_backup_extension(Path::new("README"), &exts()));
    }

    #[test]
    fn lists_nested_backups_only() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("nested/deeper")).unwrap();
        fs::write(dir.path().join("top.zip"), b"x").unwrap();
        fs::write(dir.path().join("nested/deeper/inner.RAR"), b"x").unwrap();
        fs::write(dir.path().join("nested/notes.txt"), b"x").unwrap();

        let cancel = CancellationToken::new();
        let files = list_backups(dir.path(), &exts(), Duration::from_secs(5), &cancel).unwrap();
        let mut names: Vec<String> = files.iter().map(BackupFile::file_name).collect();
        names.sort();
        assert_eq!(names, vec!["inner.RAR", "top.zip"]);
    }

    #[test]
    fn missing_root_fails_the_attempt() {
        let dir = tempfile::tempdir().unwrap();
        let absent = dir.path().join("absent");
        let cancel = CancellationToken::new();
        let result = list_backups(&absent, &exts(), Duration::from_secs(5), &cancel);
        assert!(matches!(result, Err(WalkFailure::Walk(_))));
    }

    #[test]
    fn cancelled_walk_is_interrupted() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.zip"), b"x").unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = list_backups(dir.path(), &exts(), Duration::from_secs(5), &cancel);
        assert!(matches!(result, Err(WalkFailure::Interrupted)));
    }

    #[test]
    fn probe_reports_existence() {
        let dir = tempfile::tempdir().unwrap();
        assert!(probe_exists(dir.path(), Duration::from_secs(5)).unwrap());
        assert!(!probe_exists(&dir.path().join("nope"), Duration::from_secs(5)).unwrap());
    }
}
