//! The verification run.

use std::path::Path;

use bkpaudit_core::interval::weeks_in_scope;
use bkpaudit_core::paths::PathPlan;
use bkpaudit_core::{AuditConfig, CancellationToken, CellResult, ProgressSink, RetryError};
use bkpaudit_notify::{MailTransport, NotificationComposer, NotificationOutcome};
use bkpaudit_scan::{probe_exists, DirectoryScanner};
use bkpaudit_sheet::{annotate, Workbook};
use chrono::{Datelike, Local, NaiveDate};
use tracing::{debug, error, info, warn};

use crate::tab::{self, Interrupted};
use crate::{RunOutcome, RunPhase, RunReport, SetupError};

/// Per-run switches.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct VerifyOptions {
    /// Send the missing-backup report after a successful save
    pub send_notification: bool,
}

impl Default for VerifyOptions {
    fn default() -> Self {
        Self {
            send_notification: true,
        }
    }
}

/// Audits a tracking workbook against the storage share.
///
/// The engine owns its directory scanner, so listings are cached for the
/// engine's lifetime. Build one engine per run to see fresh storage.
pub struct VerificationEngine {
    config: AuditConfig,
    scanner: DirectoryScanner,
    mailer: Option<Box<dyn MailTransport>>,
    reference_date: Option<NaiveDate>,
}

impl VerificationEngine {
    pub fn new(config: AuditConfig) -> Self {
        let scanner = DirectoryScanner::from_config(&config);
        Self {
            config,
            scanner,
            mailer: None,
            reference_date: None,
        }
    }

    /// Treat `date` as today: it decides the current month, the current
    /// ISO week and the year backup files must be from.
    pub fn with_reference_date(mut self, date: NaiveDate) -> Self {
        self.reference_date = Some(date);
        self
    }

    /// Deliver missing-backup reports through `mailer`.
    pub fn with_mailer(mut self, mailer: Box<dyn MailTransport>) -> Self {
        self.mailer = Some(mailer);
        self
    }

    pub fn config(&self) -> &AuditConfig {
        &self.config
    }

    pub fn scanner(&self) -> &DirectoryScanner {
        &self.scanner
    }

    fn today(&self) -> NaiveDate {
        self.reference_date.unwrap_or_else(|| Local::now().date_naive())
    }

    /// Run one verification of `spreadsheet`.
    ///
    /// `progress` receives completed-tabs / total-tabs after each tab and
    /// 1.0 after the save. `cancel` is polled at every loop boundary and
    /// around every storage call.
    pub fn verify(
        &self,
        spreadsheet: &Path,
        options: VerifyOptions,
        cancel: &CancellationToken,
        progress: &dyn ProgressSink,
    ) -> RunReport {
        let mut run = Run {
            engine: self,
            today: self.today(),
            cancel,
            progress,
            report: RunReport::new(),
        };
        run.execute(spreadsheet, options);
        run.report
    }
}

struct Run<'a> {
    engine: &'a VerificationEngine,
    today: NaiveDate,
    cancel: &'a CancellationToken,
    progress: &'a dyn ProgressSink,
    report: RunReport,
}

/// Why a run stopped early.
enum Stop {
    Cancelled,
    Failed(SetupError),
}

impl From<Interrupted> for Stop {
    fn from(_: Interrupted) -> Self {
        Stop::Cancelled
    }
}

impl Run<'_> {
    fn enter(&mut self, next: RunPhase) {
        debug!(from = %self.report.phase, to = %next, "phase");
        self.report.phase = next;
    }

    fn checkpoint(&self) -> Result<(), Interrupted> {
        if self.cancel.is_cancelled() {
            Err(Interrupted)
        } else {
            Ok(())
        }
    }

    fn execute(&mut self, spreadsheet: &Path, options: VerifyOptions) {
        match self.steps(spreadsheet, options) {
            Ok(()) => {
                self.enter(RunPhase::Done);
                info!(report = %self.report, "verification finished");
            }
            Err(Stop::Cancelled) => {
                info!(phase = %self.report.phase, "verification cancelled");
                self.enter(RunPhase::Cancelled);
                self.report.outcome = RunOutcome::Cancelled;
            }
            Err(Stop::Failed(err)) => {
                error!(phase = %self.report.phase, error = %err, "verification failed");
                self.enter(RunPhase::Failed);
                self.report.outcome = RunOutcome::Failed(err.to_string());
            }
        }
    }

    fn steps(&mut self, spreadsheet: &Path, options: VerifyOptions) -> Result<(), Stop> {
        self.checkpoint()?;
        self.probe_storage()?;
        let mut book = self.load(spreadsheet)?;

        let in_scope = self.weeks_in_scope();
        self.report.tabs_total = book.tab_count();
        for index in 0..book.tab_count() {
            self.checkpoint()?;
            self.verify_tab(&mut book, index, &in_scope)?;
            self.report.tabs_completed += 1;
            self.progress
                .report(self.report.tabs_completed as f64 / self.report.tabs_total as f64);
        }

        self.save(&book)?;
        self.progress.report(1.0);

        self.enter(RunPhase::Notifying);
        self.report.notification = self.notify(&book, options);
        if self.report.notification == NotificationOutcome::Cancelled {
            return Err(Stop::Cancelled);
        }
        Ok(())
    }

    /// Weeks of the current month up to the current ISO week.
    fn weeks_in_scope(&self) -> Vec<u32> {
        let scope = weeks_in_scope(self.today);
        info!(
            today = %self.today,
            current_week = self.today.iso_week().week(),
            in_scope = ?scope,
            "weeks to verify"
        );
        scope
    }

    fn probe_storage(&self) -> Result<(), Stop> {
        let config = &self.engine.config;
        let root = &config.storage_root;
        let timeout = config.network_timeout();
        info!(root = %root.display(), "checking storage root");

        let probed = config.retry_policy().run("probe storage root", self.cancel, || {
            match probe_exists(root, timeout) {
                Ok(true) => Ok(()),
                Ok(false) => Err("does not exist".to_string()),
                Err(err) => Err(err.to_string()),
            }
        });
        match probed {
            Ok(()) => Ok(()),
            Err(RetryError::Interrupted) => Err(Stop::Cancelled),
            Err(RetryError::Exhausted { last, .. }) => {
                match root.parent().filter(|p| !p.as_os_str().is_empty()) {
                    Some(parent) => match probe_exists(parent, timeout) {
                        Ok(true) => info!(
                            parent = %parent.display(),
                            "parent of storage root is reachable"
                        ),
                        _ => error!(
                            parent = %parent.display(),
                            "parent of storage root is not reachable either"
                        ),
                    },
                    None => debug!("storage root has no parent to probe"),
                }
                Err(Stop::Failed(SetupError::StorageUnreachable {
                    root: root.clone(),
                    reason: last,
                }))
            }
        }
    }

    fn load(&self, spreadsheet: &Path) -> Result<Workbook, Stop> {
        if !spreadsheet.is_file() {
            return Err(Stop::Failed(SetupError::SpreadsheetMissing(
                spreadsheet.to_path_buf(),
            )));
        }
        let retry = self.engine.config.retry_policy();
        match retry.run("load spreadsheet", self.cancel, || Workbook::open(spreadsheet)) {
            Ok(book) => {
                info!(
                    path = %spreadsheet.display(),
                    tabs = ?book.tab_names(),
                    "spreadsheet loaded"
                );
                Ok(book)
            }
            Err(RetryError::Interrupted) => Err(Stop::Cancelled),
            Err(RetryError::Exhausted { last, .. }) => {
                Err(Stop::Failed(SetupError::SpreadsheetUnreadable {
                    path: spreadsheet.to_path_buf(),
                    reason: last.to_string(),
                }))
            }
        }
    }

    fn verify_tab(
        &mut self,
        book: &mut Workbook,
        index: usize,
        in_scope: &[u32],
    ) -> Result<(), Stop> {
        let engine = self.engine;
        let config = &engine.config;
        let Some(ws) = book.tab(index) else {
            return Ok(());
        };
        let name = ws.get_name().to_string();

        self.enter(RunPhase::Scanning(name.clone()));
        let active = tab::active_weeks(ws, self.today, in_scope, self.cancel)?;
        if active.is_empty() {
            info!(tab = %name, "no week in scope on this tab");
            return Ok(());
        }
        let rows = annotate::entity_rows(ws);
        self.checkpoint()?;

        self.enter(RunPhase::Resolving(name.clone()));
        let periods = tab::periods(&active);
        let mut plan = PathPlan::new();
        let row_dirs = tab::candidate_dirs(&config.storage_root, &rows, &periods, &mut plan);
        if plan.is_empty() {
            info!(tab = %name, "no entity rows on this tab");
            return Ok(());
        }
        for candidate in plan.candidates() {
            debug!(
                tab = %name,
                path = %candidate.directory.display(),
                period = %candidate.period,
                "candidate directory"
            );
        }
        info!(
            tab = %name,
            weeks = active.len(),
            rows = rows.len(),
            directories = plan.len(),
            "scanning candidate directories"
        );
        let batch = engine.scanner.scan_many(&plan.directories(), self.cancel);
        if batch.interrupted {
            return Err(Stop::Cancelled);
        }
        self.report.directories_scanned += plan.len();

        self.enter(RunPhase::Matching(name.clone()));
        let mut results = Vec::with_capacity(rows.len());
        for ((row, entity), dirs) in rows.iter().zip(&row_dirs) {
            self.checkpoint()?;
            let cells = tab::match_row(
                &batch,
                dirs,
                &active,
                self.today.year(),
                &config.date_format,
                self.cancel,
            )?;
            debug!(tab = %name, row, tag = %entity.tag, "row matched");
            results.push((*row, cells));
        }

        self.enter(RunPhase::Annotating(name.clone()));
        let Some(ws) = book.tab_mut(index) else {
            return Ok(());
        };
        for (row, cells) in results {
            self.checkpoint()?;
            for (col, result) in cells {
                self.checkpoint()?;
                match annotate::apply(ws, col, row, &result) {
                    CellResult::AlreadyFilled => self.report.cells.already_filled += 1,
                    CellResult::Found { .. } => self.report.cells.found += 1,
                    CellResult::NotFound => self.report.cells.not_found += 1,
                }
            }
        }
        info!(tab = %name, "tab verified");
        Ok(())
    }

    fn save(&mut self, book: &Workbook) -> Result<(), Stop> {
        self.enter(RunPhase::Saving);
        let retry = self.engine.config.retry_policy();
        match retry.run("save spreadsheet", self.cancel, || book.save()) {
            Ok(()) => {
                self.report.saved = true;
                info!(path = %book.path().display(), "spreadsheet saved");
                Ok(())
            }
            Err(RetryError::Interrupted) => Err(Stop::Cancelled),
            Err(RetryError::Exhausted { last, .. }) => Err(Stop::Failed(SetupError::Save {
                path: book.path().to_path_buf(),
                reason: last.to_string(),
            })),
        }
    }

    fn notify(&self, book: &Workbook, options: VerifyOptions) -> NotificationOutcome {
        if !options.send_notification {
            info!("notification disabled for this run");
            return NotificationOutcome::Skipped;
        }
        let config = &self.engine.config;
        let (Some(mail), Some(mailer)) = (&config.mail, &self.engine.mailer) else {
            warn!("notification requested but mail is not configured");
            return NotificationOutcome::DeliveryFailed("mail is not configured".into());
        };
        NotificationComposer::from_config(mail, &config.date_format).notify(
            book,
            self.today,
            &**mailer,
            self.cancel,
        )
    }
}
