//! bkpaudit CLI - Scheduled Backup Audit
//!
//! Command-line interface for verifying backups against a tracking workbook.

use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Mutex;
use std::thread;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use bkpaudit_core::{interval::weeks_of_month, CancellationToken, EntityRecord};
use bkpaudit_engine::{RunOutcome, VerificationEngine, VerifyOptions};
use bkpaudit_notify::SmtpMailer;
use bkpaudit_scan::DirectoryScanner;
use bkpaudit_sheet::TrackingTemplate;
use chrono::{Datelike, Local, NaiveDate};
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod settings;

use settings::ConfigArgs;

/// Exit code of a cancelled run.
const EXIT_CANCELLED: u8 = 130;

#[derive(Parser)]
#[command(name = "bkpaudit")]
#[command(author, version, about = "Scheduled backup audit", long_about = None)]
struct Cli {
    /// Verbose output (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Also append logs to this file
    #[arg(long, value_name = "FILE", global = true)]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Verify a tracking workbook against the storage share
    Verify {
        /// Tracking workbook (.xlsx)
        #[arg(value_name = "SPREADSHEET")]
        spreadsheet: PathBuf,

        #[command(flatten)]
        settings: ConfigArgs,

        /// Do not send the missing-backup report
        #[arg(long)]
        no_email: bool,

        /// Print the run report as JSON
        #[arg(long)]
        json: bool,

        /// Verify as if today were DATE (YYYY-MM-DD)
        #[arg(long, value_name = "DATE")]
        as_of: Option<NaiveDate>,

        /// Cancel the run after this many seconds
        #[arg(long, value_name = "SECS")]
        max_runtime: Option<u64>,
    },

    /// List backup files under a directory
    Scan {
        /// Directory to list
        #[arg(value_name = "DIR")]
        dir: PathBuf,

        #[command(flatten)]
        settings: ConfigArgs,
    },

    /// Write an empty tracking workbook for one month
    Template {
        /// Output file
        #[arg(short, long)]
        output: PathBuf,

        /// Year of the tracked month (default: current year)
        #[arg(long)]
        year: Option<i32>,

        /// Tracked month, 1-12 (default: current month)
        #[arg(long, value_parser = clap::value_parser!(u32).range(1..=12))]
        month: Option<u32>,

        /// Tab name (repeatable)
        #[arg(long = "tab", value_name = "NAME")]
        tabs: Vec<String>,

        /// Entity row as TAG:SECTOR[:RESPONSIBLE] (repeatable)
        #[arg(long = "entity", value_name = "SPEC")]
        entities: Vec<String>,

        /// Replace an existing file
        #[arg(long)]
        force: bool,
    },

    /// Print the ISO week numbers of a month
    Weeks {
        #[arg(long)]
        year: Option<i32>,

        #[arg(long, value_parser = clap::value_parser!(u32).range(1..=12))]
        month: Option<u32>,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(err) = init_logging(cli.verbose, cli.log_file.as_deref()) {
        eprintln!("error: {err:#}");
        return ExitCode::FAILURE;
    }

    match run(cli.command) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

fn init_logging(verbose: u8, log_file: Option<&Path>) -> Result<()> {
    let filter = match verbose {
        0 => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        1 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    };

    let file_layer = match log_file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("opening log file {}", path.display()))?;
            Some(fmt::layer().with_ansi(false).with_writer(Mutex::new(file)))
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(file_layer)
        .init();
    Ok(())
}

fn run(command: Commands) -> Result<ExitCode> {
    match command {
        Commands::Verify {
            spreadsheet,
            settings,
            no_email,
            json,
            as_of,
            max_runtime,
        } => cmd_verify(&spreadsheet, &settings, !no_email, json, as_of, max_runtime),
        Commands::Scan { dir, settings } => cmd_scan(&dir, &settings),
        Commands::Template {
            output,
            year,
            month,
            tabs,
            entities,
            force,
        } => cmd_template(&output, year, month, tabs, &entities, force),
        Commands::Weeks { year, month } => {
            cmd_weeks(year, month);
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn cmd_verify(
    spreadsheet: &Path,
    args: &ConfigArgs,
    send_notification: bool,
    json: bool,
    as_of: Option<NaiveDate>,
    max_runtime: Option<u64>,
) -> Result<ExitCode> {
    let config = args.load()?;
    config.validate().context("invalid configuration")?;

    let mailer = match (&config.mail, send_notification) {
        (Some(mail), true) => match SmtpMailer::from_config(mail) {
            Ok(mailer) => Some(mailer),
            Err(err) => {
                warn!(error = %err, "mail transport unavailable, report will not be sent");
                None
            }
        },
        _ => None,
    };

    let mut engine = VerificationEngine::new(config);
    if let Some(date) = as_of {
        engine = engine.with_reference_date(date);
    }
    if let Some(mailer) = mailer {
        engine = engine.with_mailer(Box::new(mailer));
    }

    let cancel = CancellationToken::new();
    if let Some(secs) = max_runtime {
        arm_deadline(&cancel, Duration::from_secs(secs));
    }

    let progress = |fraction: f64| info!(percent = (fraction * 100.0).round() as u32, "progress");
    let options = VerifyOptions { send_notification };
    let report = engine.verify(spreadsheet, options, &cancel, &progress);

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("{report}");
    }

    Ok(match report.outcome {
        RunOutcome::Completed => ExitCode::SUCCESS,
        RunOutcome::Cancelled => ExitCode::from(EXIT_CANCELLED),
        RunOutcome::Failed(_) => ExitCode::FAILURE,
    })
}

/// Cancel `cancel` once `limit` has passed.
fn arm_deadline(cancel: &CancellationToken, limit: Duration) {
    if limit.is_zero() {
        cancel.cancel();
        return;
    }
    let cancel = cancel.clone();
    let spawned = thread::Builder::new()
        .name("bkpaudit-deadline".into())
        .spawn(move || {
            thread::sleep(limit);
            warn!(limit_secs = limit.as_secs(), "maximum runtime reached, cancelling");
            cancel.cancel();
        });
    if let Err(err) = spawned {
        warn!(error = %err, "cannot arm runtime limit");
    }
}

fn cmd_scan(dir: &Path, args: &ConfigArgs) -> Result<ExitCode> {
    let mut config = args.load()?;
    if config.storage_root.as_os_str().is_empty() {
        config.storage_root = dir.to_path_buf();
    }
    config.validate().context("invalid configuration")?;

    let scanner = DirectoryScanner::from_config(&config);
    let listing = scanner
        .scan(dir, &CancellationToken::new())
        .context("scan interrupted")?;

    let mut files: Vec<_> = listing.iter().collect();
    files.sort_by(|a, b| a.path.cmp(&b.path));
    for file in &files {
        println!("{}  {}", file.modified.format("%Y-%m-%d %H:%M"), file.path.display());
    }
    println!("{} backup file(s) under {}", files.len(), dir.display());
    Ok(ExitCode::SUCCESS)
}

fn cmd_template(
    output: &Path,
    year: Option<i32>,
    month: Option<u32>,
    tabs: Vec<String>,
    entities: &[String],
    force: bool,
) -> Result<ExitCode> {
    if output.exists() && !force {
        bail!("{} already exists (use --force to replace it)", output.display());
    }

    let today = Local::now().date_naive();
    let mut template = TrackingTemplate::new(
        year.unwrap_or_else(|| today.year()),
        month.unwrap_or_else(|| today.month()),
    );
    template.tabs = tabs;
    for spec in entities {
        template = template.entity(parse_entity(spec)?);
    }
    template
        .write(output)
        .with_context(|| format!("writing {}", output.display()))?;

    println!(
        "Created: {} ({} week columns)",
        output.display(),
        template.week_layout().len()
    );
    Ok(ExitCode::SUCCESS)
}

/// `TAG:SECTOR[:RESPONSIBLE]`
fn parse_entity(spec: &str) -> Result<EntityRecord> {
    let mut parts = spec.splitn(3, ':');
    let tag = parts.next().unwrap_or_default();
    let sector = parts.next().unwrap_or_default();
    let responsible = parts.next().unwrap_or_default();
    EntityRecord::from_cells(tag, responsible, sector).with_context(|| {
        format!("entity {spec:?} needs both a tag and a sector (TAG:SECTOR[:RESPONSIBLE])")
    })
}

fn cmd_weeks(year: Option<i32>, month: Option<u32>) {
    let today = Local::now().date_naive();
    let year = year.unwrap_or_else(|| today.year());
    let month = month.unwrap_or_else(|| today.month());
    let weeks: Vec<String> = weeks_of_month(year, month).iter().map(u32::to_string).collect();
    println!("{month:02}/{year}: {}", weeks.join(", "));
}
