//! Per-tab steps: active weeks, candidate directories, file matching.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use bkpaudit_core::interval::week_interval;
use bkpaudit_core::paths::{MonthYear, PathPlan};
use bkpaudit_core::{
    latest_match, BackupFile, CancellationToken, CellResult, EntityRecord, WeekInterval,
};
use bkpaudit_scan::ScanBatch;
use bkpaudit_sheet::{annotate, Worksheet};
use chrono::NaiveDate;
use tracing::{debug, warn};

/// Cancellation observed at a checkpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Interrupted;

/// A week column that should already hold a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ActiveWeek {
    pub col: u32,
    pub interval: WeekInterval,
}

/// Week columns in scope for `today`.
///
/// A week is in scope when it belongs to the current month and is not in
/// the future. Duplicate headers resolve to their first column; columns
/// whose label cannot be resolved, or resolves outside its week, are
/// skipped.
pub(crate) fn active_weeks(
    ws: &Worksheet,
    today: NaiveDate,
    in_scope: &[u32],
    cancel: &CancellationToken,
) -> Result<Vec<ActiveWeek>, Interrupted> {
    let tab = ws.get_name();
    let mut active: Vec<ActiveWeek> = Vec::new();
    for (col, week) in annotate::week_columns(ws) {
        if cancel.is_cancelled() {
            return Err(Interrupted);
        }
        if !in_scope.contains(&week) || active.iter().any(|a| a.interval.week == week) {
            continue;
        }
        let label = annotate::interval_label(ws, col);
        let interval = match week_interval(&label, week, today) {
            Ok(interval) => interval,
            Err(reason) => {
                warn!(tab, col, week, label = %label, %reason, "week column skipped");
                continue;
            }
        };
        debug!(tab, col, week, start = %interval.start, end = %interval.end, "week in scope");
        active.push(ActiveWeek { col, interval });
    }
    Ok(active)
}

/// Months touched by the active intervals, in order.
pub(crate) fn periods(active: &[ActiveWeek]) -> Vec<MonthYear> {
    active
        .iter()
        .flat_map(|a| [MonthYear::of(a.interval.start), MonthYear::of(a.interval.end)])
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Candidate directories per entity row, registered in `plan`.
pub(crate) fn candidate_dirs(
    root: &Path,
    rows: &[(u32, EntityRecord)],
    periods: &[MonthYear],
    plan: &mut PathPlan,
) -> Vec<Vec<PathBuf>> {
    rows.iter()
        .map(|(_, entity)| {
            periods
                .iter()
                .map(|period| plan.add(root, &entity.sector, &entity.tag, *period))
                .collect()
        })
        .collect()
}

/// Result for every active week of one entity.
pub(crate) fn match_row(
    batch: &ScanBatch,
    dirs: &[PathBuf],
    active: &[ActiveWeek],
    current_year: i32,
    date_format: &str,
    cancel: &CancellationToken,
) -> Result<Vec<(u32, CellResult)>, Interrupted> {
    let files: Vec<&BackupFile> = dirs.iter().flat_map(|d| batch.files(d)).collect();
    let mut results = Vec::with_capacity(active.len());
    for week in active {
        if cancel.is_cancelled() {
            return Err(Interrupted);
        }
        let result = match latest_match(files.iter().copied(), &week.interval, current_year) {
            Some(found) => CellResult::Found {
                date: found.file.modified.format(date_format).to_string(),
                file: found.file.path.clone(),
            },
            None => CellResult::NotFound,
        };
        results.push((week.col, result));
    }
    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn tab() -> umya_spreadsheet::Spreadsheet {
        let mut book = umya_spreadsheet::new_file();
        let ws = book.get_sheet_mut(&0).unwrap();
        for (col, header, label) in [
            (6, "Semana 1", "DIA 30 - 05"),
            (7, "Semana 2", "DIA 06 - 12"),
            (8, "Semana 3", "garbage"),
            (9, "Semana 2", "DIA 01 - 02"),
            (10, "Semana 4", "DIA 20 - 26"),
            (11, "Semana 5", "DIA 27 - 02"),
        ] {
            ws.get_cell_mut((col, 2)).set_value_string(header);
            ws.get_cell_mut((col, 3)).set_value_string(label);
        }
        book
    }

    #[test]
    fn active_weeks_respect_scope_and_first_column() {
        let book = tab();
        let ws = book.get_sheet(&0).unwrap();
        let today = date(2025, 1, 22);

        let active = active_weeks(ws, today, &[1, 2, 3, 4], &CancellationToken::new()).unwrap();
        let cols: Vec<(u32, u32)> = active.iter().map(|a| (a.col, a.interval.week)).collect();
        assert_eq!(cols, vec![(6, 1), (7, 2), (10, 4)]);
        assert_eq!(active[0].interval.start, date(2024, 12, 30));
        assert_eq!(active[0].interval.end, date(2025, 1, 5));
    }

    #[test]
    fn periods_cover_month_wrap() {
        let book = tab();
        let ws = book.get_sheet(&0).unwrap();
        let cancel = CancellationToken::new();
        let active = active_weeks(ws, date(2025, 1, 22), &[1, 2], &cancel).unwrap();
        assert_eq!(
            periods(&active),
            vec![MonthYear::new(2024, 12), MonthYear::new(2025, 1)]
        );
    }

    #[test]
    fn label_written_for_next_month_is_skipped() {
        let book = tab();
        let ws = book.get_sheet(&0).unwrap();
        // on 29 January `DIA 27 - 02` would read as 27 Dec - 2 Jan
        let cancel = CancellationToken::new();
        let active = active_weeks(ws, date(2025, 1, 29), &[1, 2, 3, 4, 5], &cancel).unwrap();
        let weeks: Vec<u32> = active.iter().map(|a| a.interval.week).collect();
        assert_eq!(weeks, vec![1, 2, 4]);
    }

    #[test]
    fn cancelled_column_walk_is_interrupted() {
        let book = tab();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let ws = book.get_sheet(&0).unwrap();
        assert_eq!(active_weeks(ws, date(2025, 1, 22), &[1], &cancel), Err(Interrupted));
    }

    #[test]
    fn shared_sector_and_tag_share_directories() {
        let rows = vec![
            (4, EntityRecord::from_cells("SRV1", "Ana", "TI").unwrap()),
            (5, EntityRecord::from_cells("SRV1", "Bruno", "TI").unwrap()),
        ];
        let periods = [MonthYear::new(2024, 12), MonthYear::new(2025, 1)];
        let mut plan = PathPlan::new();
        let dirs = candidate_dirs(Path::new("/bkp"), &rows, &periods, &mut plan);

        assert_eq!(plan.len(), 2);
        assert_eq!(dirs[0], dirs[1]);
        assert_eq!(dirs[0][1], Path::new("/bkp/2025/TI/SRV1/01-2025"));
    }

    #[test]
    fn newest_file_in_week_wins() {
        let dir = PathBuf::from("/bkp/2025/TI/SRV1/01-2025");
        let file = |name: &str, d: NaiveDate| BackupFile {
            path: dir.join(name),
            modified: d.and_hms_opt(10, 0, 0).unwrap(),
        };
        let mut batch = ScanBatch::default();
        batch.listings.insert(
            dir.clone(),
            std::sync::Arc::new(vec![
                file("a.zip", date(2025, 1, 7)),
                file("b.zip", date(2025, 1, 10)),
                file("c.zip", date(2025, 1, 14)),
            ]),
        );
        let active = vec![
            ActiveWeek {
                col: 7,
                interval: WeekInterval::new(2, date(2025, 1, 6), date(2025, 1, 12)).unwrap(),
            },
            ActiveWeek {
                col: 10,
                interval: WeekInterval::new(4, date(2025, 1, 20), date(2025, 1, 26)).unwrap(),
            },
        ];

        let cancel = CancellationToken::new();
        let results =
            match_row(&batch, &[dir.clone()], &active, 2025, "%d/%m/%Y", &cancel).unwrap();
        assert_eq!(
            results,
            vec![
                (
                    7,
                    CellResult::Found {
                        date: "10/01/2025".into(),
                        file: dir.join("b.zip"),
                    }
                ),
                (10, CellResult::NotFound),
            ]
        );
    }

    #[test]
    fn files_from_another_year_do_not_count() {
        let dir = PathBuf::from("/bkp/2024/TI/SRV1/12-2024");
        let mut batch = ScanBatch::default();
        batch.listings.insert(
            dir.clone(),
            std::sync::Arc::new(vec![BackupFile {
                path: dir.join("old.zip"),
                modified: date(2024, 12, 31).and_hms_opt(9, 0, 0).unwrap(),
            }]),
        );
        let active = vec![ActiveWeek {
            col: 6,
            interval: WeekInterval::new(1, date(2024, 12, 30), date(2025, 1, 5)).unwrap(),
        }];

        let cancel = CancellationToken::new();
        let results = match_row(&batch, &[dir], &active, 2025, "%d/%m/%Y", &cancel).unwrap();
        assert_eq!(results, vec![(6, CellResult::NotFound)]);
    }
}
