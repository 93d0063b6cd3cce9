//! Tests for the `bkpaudit` binary
//!
//! ## Exit Code Contract
//!
//! | Exit Code | Meaning |
//! |-----------|---------|
//! | 0   | Run completed |
//! | 1   | Run failed (setup error, bad configuration) |
//! | 130 | Run cancelled |

use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use tempfile::{tempdir, TempDir};

fn bkpaudit() -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_bkpaudit"));
    for var in [
        "BKPAUDIT_STORAGE_ROOT",
        "SMTP_SERVER",
        "SMTP_PORT",
        "SMTP_USER",
        "SMTP_PASS",
        "FROM_EMAIL",
        "TO_EMAIL",
    ] {
        cmd.env_remove(var);
    }
    cmd
}

fn run(cmd: &mut Command) -> Output {
    cmd.output().expect("failed to execute bkpaudit")
}

struct Site {
    _dir: TempDir,
    storage: PathBuf,
    sheet: PathBuf,
}

/// Storage root plus a workbook with `Semana 3` / `DIA 15 - 21` and SRV1/TI.
fn site() -> Site {
    let dir = tempdir().unwrap();
    let storage = dir.path().join("storage");
    fs::create_dir_all(&storage).unwrap();
    let sheet = dir.path().join("tracking.xlsx");

    let mut book = umya_spreadsheet::new_file();
    let ws = book.get_sheet_mut(&0).unwrap();
    ws.get_cell_mut((6, 2)).set_value_string("Semana 3");
    ws.get_cell_mut((6, 3)).set_value_string("DIA 15 - 21");
    ws.get_cell_mut((1, 4)).set_value_string("SRV1");
    ws.get_cell_mut((3, 4)).set_value_string("TI");
    umya_spreadsheet::writer::xlsx::write(&book, &sheet).unwrap();

    Site { _dir: dir, storage, sheet }
}

fn verify(site: &Site, storage: &Path, extra: &[&str]) -> Output {
    run(bkpaudit()
        .arg("verify")
        .arg(&site.sheet)
        .arg("--storage-root")
        .arg(storage)
        .args(["--no-email", "--as-of", "2025-01-22"])
        .args(extra))
}

#[test]
fn weeks_prints_iso_weeks_of_month() {
    let output = run(bkpaudit().args(["weeks", "--year", "2021", "--month", "1"]));
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert_eq!(stdout.trim(), "01/2021: 1, 2, 3, 4, 53");
}

#[test]
fn weeks_rejects_month_thirteen() {
    let output = run(bkpaudit().args(["weeks", "--month", "13"]));
    assert!(!output.status.success());
}

#[test]
fn verify_completes_with_exit_zero() {
    let site = site();
    let output = verify(&site, &site.storage, &[]);

    assert_eq!(output.status.code(), Some(0), "{}", String::from_utf8_lossy(&output.stderr));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.starts_with("completed"), "{stdout}");
    assert!(stdout.contains("not found 1"), "{stdout}");
}

#[test]
fn verify_json_report() {
    let site = site();
    let output = verify(&site, &site.storage, &["--json"]);

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("\"status\": \"completed\""), "{stdout}");
    assert!(stdout.contains("\"saved\": true"), "{stdout}");
}

#[test]
fn verify_unreachable_storage_exits_one() {
    let site = site();
    let before = fs::read(&site.sheet).unwrap();
    let output = verify(&site, &site.storage.join("offline"), &[]);

    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stdout).starts_with("failed"));
    assert_eq!(fs::read(&site.sheet).unwrap(), before);
}

#[test]
fn verify_cancelled_exits_130() {
    let site = site();
    let before = fs::read(&site.sheet).unwrap();
    let output = verify(&site, &site.storage, &["--max-runtime", "0"]);

    assert_eq!(output.status.code(), Some(130));
    assert_eq!(fs::read(&site.sheet).unwrap(), before);
}

#[test]
fn verify_rejects_invalid_configuration() {
    let site = site();
    let output = verify(&site, &site.storage, &["--workers", "0"]);

    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("workers"));
}

#[test]
fn verify_reads_storage_root_from_environment() {
    let site = site();
    let output = run(bkpaudit()
        .arg("verify")
        .arg(&site.sheet)
        .args(["--no-email", "--as-of", "2025-01-22"])
        .env("BKPAUDIT_STORAGE_ROOT", &site.storage));

    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
}

#[test]
fn scan_lists_backups() {
    let dir = tempdir().unwrap();
    let nested = dir.path().join("2025/TI/SRV1/01-2025/full");
    fs::create_dir_all(&nested).unwrap();
    fs::write(nested.join("srv1.zip"), b"x").unwrap();
    fs::write(nested.join("notes.txt"), b"x").unwrap();

    let output = run(bkpaudit().arg("scan").arg(dir.path()));

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("srv1.zip"));
    assert!(!stdout.contains("notes.txt"));
    assert!(stdout.contains("1 backup file(s)"));
}

#[test]
fn template_creates_workbook_and_refuses_overwrite() {
    let dir = tempdir().unwrap();
    let out = dir.path().join("tracking.xlsx");

    let output = run(bkpaudit()
        .args(["template", "--year", "2025", "--month", "1", "--tab", "Servers"])
        .args(["--entity", "SRV1:TI:Ana", "-o"])
        .arg(&out));
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    assert!(String::from_utf8_lossy(&output.stdout).contains("5 week columns"));
    assert!(out.exists());

    let again = run(bkpaudit().args(["template", "-o"]).arg(&out));
    assert_eq!(again.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&again.stderr).contains("already exists"));
}
