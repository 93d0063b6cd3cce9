//! Fresh tracking workbook generation.
//!
//! A workbook covers one month. Starting at column F it holds one column
//! per ISO week touching that month, with the `Semana N` header on row 2
//! and the `DIA dd - dd` range on row 3. A week that began in the previous
//! month keeps its wrapped label (`DIA 27 - 02` in February); the week
//! running into the next month is cut at the month's last day
//! (`DIA 27 - 31` in January). Read against the month it was generated
//! for, every label resolves to the days of its own week.

use std::iter;
use std::path::Path;

use bkpaudit_core::{
    EntityRecord, FIRST_ENTITY_ROW, FIRST_WEEK_COLUMN, HEADER_ROW, INTERVAL_ROW,
    RESPONSIBLE_COLUMN, SECTOR_COLUMN, TAG_COLUMN,
};
use chrono::{Datelike, Duration, NaiveDate};
use rust_xlsxwriter::{Color, Format, FormatAlign, FormatBorder, Workbook};

use crate::SheetError;

/// Builder for an empty tracking workbook.
#[derive(Clone, Debug)]
pub struct TrackingTemplate {
    pub year: i32,
    /// Month whose weeks become columns, 1-12
    pub month: u32,
    /// Tab names, in order
    pub tabs: Vec<String>,
    /// Entities pre-filled on every tab
    pub entities: Vec<EntityRecord>,
}

impl TrackingTemplate {
    pub fn new(year: i32, month: u32) -> Self {
        Self {
            year,
            month,
            tabs: Vec::new(),
            entities: Vec::new(),
        }
    }

    /// Add a tab
    pub fn tab(mut self, name: impl Into<String>) -> Self {
        self.tabs.push(name.into());
        self
    }

    /// Pre-fill an entity row on every tab
    pub fn entity(mut self, entity: EntityRecord) -> Self {
        self.entities.push(entity);
        self
    }

    /// `(week, header, label)` for every ISO week of the month, in
    /// calendar order. Empty for an invalid month.
    pub fn week_layout(&self) -> Vec<(u32, String, String)> {
        let Some(first) = NaiveDate::from_ymd_opt(self.year, self.month, 1) else {
            return Vec::new();
        };
        let last = first
            .iter_days()
            .take_while(|d| d.month() == self.month)
            .last()
            .unwrap_or(first);
        let first_monday =
            first - Duration::days(i64::from(first.weekday().num_days_from_monday()));

        iter::successors(Some(first_monday), |monday| Some(*monday + Duration::days(7)))
            .take_while(|monday| *monday <= last)
            .map(|monday| {
                let week = monday.iso_week().week();
                let end = (monday + Duration::days(6)).min(last);
                (
                    week,
                    format!("Semana {week}"),
                    format!("DIA {:02} - {:02}", monday.day(), end.day()),
                )
            })
            .collect()
    }

    /// Write the workbook to `path`.
    pub fn write(&self, path: &Path) -> Result<(), SheetError> {
        let mut workbook = Workbook::new();

        let title = Format::new().set_bold().set_font_size(14);
        let header = Format::new()
            .set_bold()
            .set_align(FormatAlign::Center)
            .set_background_color(Color::RGB(0x00D9_E1F2))
            .set_border(FormatBorder::Thin);
        let label = Format::new()
            .set_align(FormatAlign::Center)
            .set_border(FormatBorder::Thin);

        let weeks = self.week_layout();
        let default_tab = ["Backups".to_string()];
        let tabs: &[String] = if self.tabs.is_empty() {
            &default_tab
        } else {
            &self.tabs
        };

        for name in tabs {
            let sheet = workbook.add_worksheet();
            sheet.set_name(name)?;
            let heading = format!("Backup tracking {:02}/{} - {name}", self.month, self.year);
            sheet.write_string_with_format(0, 0, heading, &title)?;

            let label_row = INTERVAL_ROW - 1;
            for (col, text) in [
                (TAG_COLUMN, "TAG"),
                (RESPONSIBLE_COLUMN, "RESPONSIBLE"),
                (SECTOR_COLUMN, "SECTOR"),
            ] {
                sheet.write_string_with_format(label_row, (col - 1) as u16, text, &header)?;
                sheet.set_column_width((col - 1) as u16, 18)?;
            }

            for (offset, (_, week_header, week_label)) in weeks.iter().enumerate() {
                let col = (FIRST_WEEK_COLUMN - 1) as u16 + offset as u16;
                sheet.write_string_with_format(HEADER_ROW - 1, col, week_header, &header)?;
                sheet.write_string_with_format(label_row, col, week_label, &label)?;
                sheet.set_column_width(col, 13)?;
            }

            for (offset, entity) in self.entities.iter().enumerate() {
                let row = FIRST_ENTITY_ROW - 1 + offset as u32;
                sheet.write_string(row, (TAG_COLUMN - 1) as u16, &entity.tag)?;
                sheet.write_string(row, (RESPONSIBLE_COLUMN - 1) as u16, &entity.responsible)?;
                sheet.write_string(row, (SECTOR_COLUMN - 1) as u16, &entity.sector)?;
            }

            sheet.set_freeze_panes(FIRST_ENTITY_ROW - 1, (FIRST_WEEK_COLUMN - 1) as u16)?;
        }

        workbook.save(path)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bkpaudit_core::interval::{week_interval, weeks_of_month};
    use pretty_assertions::assert_eq;

    fn labels(year: i32, month: u32) -> Vec<(u32, String)> {
        TrackingTemplate::new(year, month)
            .week_layout()
            .into_iter()
            .map(|(week, _, label)| (week, label))
            .collect()
    }

    #[test]
    fn january_cuts_the_trailing_week() {
        assert_eq!(
            labels(2025, 1),
            vec![
                (1, "DIA 30 - 05".to_string()),
                (2, "DIA 06 - 12".to_string()),
                (3, "DIA 13 - 19".to_string()),
                (4, "DIA 20 - 26".to_string()),
                (5, "DIA 27 - 31".to_string()),
            ]
        );
    }

    #[test]
    fn february_keeps_the_leading_wrap() {
        let feb = labels(2025, 2);
        assert_eq!(feb[0], (5, "DIA 27 - 02".to_string()));
        assert_eq!(feb[4], (9, "DIA 24 - 28".to_string()));
    }

    #[test]
    fn december_ends_on_the_31st() {
        let dec = labels(2025, 12);
        assert_eq!(dec.last(), Some(&(1, "DIA 29 - 31".to_string())));
    }

    #[test]
    fn headers_name_their_week() {
        let layout = TrackingTemplate::new(2025, 3).week_layout();
        assert!(layout.iter().all(|(week, header, _)| *header == format!("Semana {week}")));
    }

    #[test]
    fn every_label_resolves_inside_its_week() {
        for year in [2020, 2021, 2025, 2026] {
            for month in 1..=12 {
                let layout = labels(year, month);
                let mut weeks: Vec<u32> = layout.iter().map(|(w, _)| *w).collect();
                weeks.sort_unstable();
                assert_eq!(weeks, weeks_of_month(year, month), "{year}-{month}");

                let first = NaiveDate::from_ymd_opt(year, month, 1).unwrap();
                let month_days: Vec<NaiveDate> =
                    first.iter_days().take_while(|d| d.month() == month).collect();
                for (week, label) in layout {
                    let today = month_days
                        .iter()
                        .copied()
                        .find(|d| d.iso_week().week() == week)
                        .unwrap();
                    assert!(
                        week_interval(&label, week, today).is_ok(),
                        "{year}-{month} week {week} label {label}"
                    );
                }
            }
        }
    }

    #[test]
    fn invalid_month_has_no_weeks() {
        assert!(TrackingTemplate::new(2025, 13).week_layout().is_empty());
    }
}
