//! Missing-backup report composition.

use std::collections::HashMap;
use std::fmt::Write as _;

use bkpaudit_core::interval::{week_interval, weeks_in_scope};
use bkpaudit_core::{
    CancellationToken, EntityRecord, MailConfig, MissingBackupGroup, MissingWeek, FIRST_ENTITY_ROW,
};
use bkpaudit_sheet::{annotate, Workbook, Worksheet};
use chrono::NaiveDate;
use tracing::{debug, error, info};

use crate::{MailTransport, NotificationOutcome, OutgoingMessage};

/// Builds the missing-backup report from an annotated workbook.
#[derive(Clone, Debug)]
pub struct NotificationComposer {
    subject: String,
    recipients: Vec<String>,
    date_format: String,
}

impl NotificationComposer {
    pub fn new(
        subject: impl Into<String>,
        recipients: Vec<String>,
        date_format: impl Into<String>,
    ) -> Self {
        Self {
            subject: subject.into(),
            recipients,
            date_format: date_format.into(),
        }
    }

    pub fn from_config(mail: &MailConfig, date_format: &str) -> Self {
        Self::new(mail.subject.clone(), mail.to.clone(), date_format)
    }

    /// Every entity with at least one week still marked `NOT FOUND`.
    ///
    /// Only the weeks a run on `today` verifies are reported: weeks of
    /// `today`'s month up to the current ISO week, whose label resolves
    /// inside that week. Older marks cannot be dated against this month and
    /// are left out. Groups come out in first-seen order (tab, then column,
    /// then row); weeks inside a group are sorted. Returns `None` when
    /// cancellation is observed.
    pub fn collect(
        &self,
        book: &Workbook,
        today: NaiveDate,
        cancel: &CancellationToken,
    ) -> Option<Vec<MissingBackupGroup>> {
        let mut groups: Vec<MissingBackupGroup> = Vec::new();
        let mut index: HashMap<(String, EntityRecord), usize> = HashMap::new();

        for ws in (0..book.tab_count()).filter_map(|i| book.tab(i)) {
            if cancel.is_cancelled() {
                info!(tab = ws.get_name(), "report collection cancelled");
                return None;
            }
            let tab = ws.get_name().to_string();
            let intervals = self.tab_intervals(ws, today);
            let last_row = ws.get_highest_row();

            for (col, week) in annotate::week_columns(ws) {
                if cancel.is_cancelled() {
                    info!(tab = %tab, col, "report collection cancelled");
                    return None;
                }
                let Some(interval) = intervals.get(&week) else {
                    continue;
                };
                for row in FIRST_ENTITY_ROW..=last_row {
                    if cancel.is_cancelled() {
                        info!(tab = %tab, col, row, "report collection cancelled");
                        return None;
                    }
                    if !annotate::is_not_found(ws, col, row) {
                        continue;
                    }
                    let Some(entity) = annotate::entity_at(ws, row) else {
                        debug!(tab = %tab, row, "missing mark on a row without tag or sector");
                        continue;
                    };
                    let slot = *index.entry((tab.clone(), entity.clone())).or_insert_with(|| {
                        groups.push(MissingBackupGroup {
                            tab: tab.clone(),
                            entity,
                            weeks: Vec::new(),
                        });
                        groups.len() - 1
                    });
                    groups[slot].weeks.push(MissingWeek {
                        week,
                        interval: interval.clone(),
                    });
                }
            }
        }

        for group in &mut groups {
            group.weeks.sort_by_key(|w| w.week);
            group.weeks.dedup_by_key(|w| w.week);
        }
        Some(groups)
    }

    /// Rendered interval of every reportable week on one tab. The first
    /// column of a repeated week wins.
    fn tab_intervals(&self, ws: &Worksheet, today: NaiveDate) -> HashMap<u32, String> {
        let in_scope = weeks_in_scope(today);
        let mut intervals = HashMap::new();
        for (col, week) in annotate::week_columns(ws) {
            if !in_scope.contains(&week) || intervals.contains_key(&week) {
                continue;
            }
            let label = annotate::interval_label(ws, col);
            if let Ok(interval) = week_interval(&label, week, today) {
                intervals.insert(week, interval.describe(&self.date_format));
            }
        }
        intervals
    }

    /// Build the message for `groups`, or `None` when there is nothing to
    /// report.
    pub fn message(&self, groups: &[MissingBackupGroup]) -> Option<OutgoingMessage> {
        if groups.is_empty() {
            return None;
        }
        Some(OutgoingMessage {
            subject: self.subject.clone(),
            html_body: render_html(groups),
            recipients: self.recipients.clone(),
        })
    }

    /// Collect, compose and deliver the report.
    ///
    /// Cancellation is checked before composing and again before hand-off.
    pub fn notify(
        &self,
        book: &Workbook,
        today: NaiveDate,
        transport: &dyn MailTransport,
        cancel: &CancellationToken,
    ) -> NotificationOutcome {
        let Some(groups) = self.collect(book, today, cancel) else {
            return NotificationOutcome::Cancelled;
        };
        if cancel.is_cancelled() {
            info!("notification cancelled before composing");
            return NotificationOutcome::Cancelled;
        }
        let Some(message) = self.message(&groups) else {
            info!("no missing backups, no notification sent");
            return NotificationOutcome::Suppressed;
        };
        if cancel.is_cancelled() {
            info!("notification cancelled before hand-off");
            return NotificationOutcome::Cancelled;
        }

        let missing: usize = groups.iter().map(|g| g.weeks.len()).sum();
        match transport.send(&message) {
            Ok(()) => {
                info!(
                    groups = groups.len(),
                    missing,
                    recipients = message.recipients.len(),
                    "missing-backup report sent"
                );
                NotificationOutcome::Sent { groups: groups.len() }
            }
            Err(err) => {
                error!(error = %err, "missing-backup report not delivered");
                NotificationOutcome::DeliveryFailed(err.to_string())
            }
        }
    }
}

/// HTML body listing each group with its weeks, count and intervals.
pub fn render_html(groups: &[MissingBackupGroup]) -> String {
    let mut html = String::from(
        "<html>\n  <body>\n    <h2 style=\"color: red;\">Missing Backups Detected</h2>\n",
    );
    for group in groups.iter().filter(|g| !g.weeks.is_empty()) {
        let weeks = group
            .weeks
            .iter()
            .map(|w| w.week.to_string())
            .collect::<Vec<_>>()
            .join(", ");
        let intervals = group
            .weeks
            .iter()
            .map(|w| escape(&w.interval))
            .collect::<Vec<_>>()
            .join(", ");

        let _ = write!(
            html,
            concat!(
                "    <div style=\"margin-bottom: 15px; padding: 10px; ",
                "border: 1px solid #ccc; border-radius: 5px;\">\n",
                "      <h3>{}</h3>\n",
                "      <p>TAG: <strong>{}</strong></p>\n",
                "      <p>Responsible: ",
                "<strong><span style=\"color: red;\">{}</span></strong></p>\n",
                "      <p>Sector: <strong>{}</strong></p>\n",
                "      <p>Weeks: {}</p>\n",
                "      <p>Missing backups: ",
                "<strong><span style=\"color: red;\">{}</span></strong></p>\n",
                "      <p>Intervals: {}</p>\n",
                "    </div>\n",
            ),
            escape(&group.tab),
            escape(&group.entity.tag),
            escape(&group.entity.responsible),
            escape(&group.entity.sector),
            weeks,
            group.weeks.len(),
            intervals,
        );
    }
    html.push_str("  </body>\n</html>\n");
    html
}

fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}
