//! Reading tab layout and writing colored week results.
//!
//! Coordinates are 1-based `(column, row)`, as in the workbook itself.

use std::path::Path;
use std::sync::OnceLock;

use bkpaudit_core::{
    CellResult, EntityRecord, FIRST_ENTITY_ROW, FIRST_WEEK_COLUMN, HEADER_ROW, INTERVAL_ROW,
    NOT_FOUND_MARK, RESPONSIBLE_COLUMN, SECTOR_COLUMN, TAG_COLUMN,
};
use regex::Regex;
use tracing::debug;
use umya_spreadsheet::{HorizontalAlignmentValues, VerticalAlignmentValues, Worksheet};

pub const FOUND_FILL: &str = "FF00FF00";
pub const NOT_FOUND_FILL: &str = "FFFF0000";
const FOUND_FONT: &str = "FF000000";
const NOT_FOUND_FONT: &str = "FFFFFFFF";

fn week_header() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)(?:semana\s*)?(\d+)\s*(?:ª)?").expect("static regex"))
}

/// Week number named by a header such as `Semana 12`, `12ª` or `12`.
pub fn parse_week_header(text: &str) -> Option<u32> {
    week_header()
        .captures(text)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

/// Trimmed text of a cell; empty when the cell does not exist.
pub fn cell_text(ws: &Worksheet, col: u32, row: u32) -> String {
    ws.get_cell((col, row))
        .map(|c| c.get_value().trim().to_string())
        .unwrap_or_default()
}

/// Every week column of the tab as `(column, week)`, left to right.
pub fn week_columns(ws: &Worksheet) -> Vec<(u32, u32)> {
    (FIRST_WEEK_COLUMN..=ws.get_highest_column())
        .filter_map(|col| {
            let header = cell_text(ws, col, HEADER_ROW);
            if header.is_empty() {
                return None;
            }
            parse_week_header(&header).map(|week| (col, week))
        })
        .collect()
}

/// First column whose header names `week`.
pub fn find_week_column(ws: &Worksheet, week: u32) -> Option<u32> {
    week_columns(ws)
        .into_iter()
        .find_map(|(col, w)| (w == week).then_some(col))
}

/// Raw interval label under a week header.
pub fn interval_label(ws: &Worksheet, col: u32) -> String {
    cell_text(ws, col, INTERVAL_ROW)
}

/// Entity on `row`, if it has both tag and sector.
pub fn entity_at(ws: &Worksheet, row: u32) -> Option<EntityRecord> {
    EntityRecord::from_cells(
        &cell_text(ws, TAG_COLUMN, row),
        &cell_text(ws, RESPONSIBLE_COLUMN, row),
        &cell_text(ws, SECTOR_COLUMN, row),
    )
}

/// Rows holding a usable entity, top to bottom.
pub fn entity_rows(ws: &Worksheet) -> Vec<(u32, EntityRecord)> {
    let last = ws.get_highest_row();
    let mut rows = Vec::new();
    for row in FIRST_ENTITY_ROW..=last {
        match entity_at(ws, row) {
            Some(entity) => rows.push((row, entity)),
            None => debug!(tab = ws.get_name(), row, "row skipped: missing tag or sector"),
        }
    }
    rows
}

/// Whether a result may be written over `current`.
///
/// Only blank cells and previous not-found marks are rewritten; anything
/// else was confirmed earlier (possibly by hand) and is kept.
pub fn is_writable(current: &str) -> bool {
    let current = current.trim();
    current.is_empty() || current == NOT_FOUND_MARK
}

/// Whether the cell currently holds the not-found mark.
pub fn is_not_found(ws: &Worksheet, col: u32, row: u32) -> bool {
    cell_text(ws, col, row) == NOT_FOUND_MARK
}

/// Green cell with the backup date, black regular text, centered.
pub fn mark_found(ws: &mut Worksheet, col: u32, row: u32, date: &str, file: &Path) {
    debug!(
        tab = ws.get_name(),
        col,
        row,
        date,
        file = %file.display(),
        "backup found"
    );
    let cell = ws.get_cell_mut((col, row));
    cell.set_value_string(date);
    let style = cell.get_style_mut();
    style.set_background_color(FOUND_FILL);
    style.get_font_mut().set_bold(false).get_color_mut().set_argb(FOUND_FONT);
    center(style);
}

/// Red cell with `NOT FOUND`, white bold text, centered.
pub fn mark_not_found(ws: &mut Worksheet, col: u32, row: u32) {
    let cell = ws.get_cell_mut((col, row));
    cell.set_value_string(NOT_FOUND_MARK);
    let style = cell.get_style_mut();
    style.set_background_color(NOT_FOUND_FILL);
    style.get_font_mut().set_bold(true).get_color_mut().set_argb(NOT_FOUND_FONT);
    center(style);
}

fn center(style: &mut umya_spreadsheet::Style) {
    let alignment = style.get_alignment_mut();
    alignment.set_horizontal(HorizontalAlignmentValues::Center);
    alignment.set_vertical(VerticalAlignmentValues::Center);
}

/// Write `result` into the cell, honoring the skip rule.
///
/// Returns what was actually done: a cell holding a confirmed value reports
/// [`CellResult::AlreadyFilled`] whatever `result` was.
pub fn apply(ws: &mut Worksheet, col: u32, row: u32, result: &CellResult) -> CellResult {
    if !is_writable(&cell_text(ws, col, row)) {
        return CellResult::AlreadyFilled;
    }
    match result {
        CellResult::AlreadyFilled => {}
        CellResult::Found { date, file } => mark_found(ws, col, row, date, file),
        CellResult::NotFound => mark_not_found(ws, col, row),
    }
    result.clone()
}

/// Fill color of a cell as ARGB, if any.
pub fn fill_color(ws: &Worksheet, col: u32, row: u32) -> Option<String> {
    ws.get_cell((col, row))
        .and_then(|c| c.get_style().get_background_color())
        .map(|color| color.get_argb().to_string())
}
