//! # bkpaudit-sheet
//!
//! Access to the backup tracking workbook.
//!
//! A tracking workbook covers one month and holds one tab per group of
//! audited entities:
//!
//! ```text
//! row 2 |     |     |     |   |   | Semana 1    | Semana 2    | ...
//! row 3 | TAG | RESP| SECT|   |   | DIA 30 - 05 | DIA 06 - 12 | ...
//! row 4 | SRV1| Ana | TI  |   |   | 03/01/2025  | NOT FOUND   | ...
//! ```
//!
//! This crate provides:
//! - `Workbook`: load/save of an existing `.xlsx` file, preserving everything
//!   it does not touch
//! - `annotate`: week-column discovery, entity rows and the colored
//!   found/not-found cell states
//! - `TrackingTemplate`: generation of a fresh, empty tracking workbook

use std::path::{Path, PathBuf};

use thiserror::Error;
use umya_spreadsheet::Spreadsheet;

pub mod annotate;
mod template;

pub use template::TrackingTemplate;
pub use umya_spreadsheet::Worksheet;

/// Workbook error
#[derive(Debug, Error)]
pub enum SheetError {
    #[error("cannot open workbook {path}: {message}")]
    Open { path: PathBuf, message: String },

    #[error("cannot save workbook {path}: {message}")]
    Save { path: PathBuf, message: String },

    #[error("template error: {0}")]
    Template(#[from] rust_xlsxwriter::XlsxError),
}

/// A tracking workbook loaded in memory.
///
/// Mutations stay in memory until [`Workbook::save`].
pub struct Workbook {
    book: Spreadsheet,
    path: PathBuf,
}

impl Workbook {
    /// Load an `.xlsx` file.
    pub fn open(path: &Path) -> Result<Self, SheetError> {
        let book = umya_spreadsheet::reader::xlsx::read(path).map_err(|e| SheetError::Open {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        Ok(Self {
            book,
            path: path.to_path_buf(),
        })
    }

    /// Wrap an in-memory spreadsheet that will be saved to `path`.
    pub fn from_spreadsheet(book: Spreadsheet, path: impl Into<PathBuf>) -> Self {
        Self {
            book,
            path: path.into(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn tab_count(&self) -> usize {
        self.book.get_sheet_count()
    }

    pub fn tab_names(&self) -> Vec<String> {
        (0..self.tab_count())
            .filter_map(|i| self.tab(i))
            .map(|ws| ws.get_name().to_string())
            .collect()
    }

    pub fn tab(&self, index: usize) -> Option<&Worksheet> {
        self.book.get_sheet(&index)
    }

    pub fn tab_mut(&mut self, index: usize) -> Option<&mut Worksheet> {
        self.book.get_sheet_mut(&index)
    }

    /// Write the workbook back to the file it was opened from.
    pub fn save(&self) -> Result<(), SheetError> {
        self.save_as(&self.path)
    }

    pub fn save_as(&self, path: &Path) -> Result<(), SheetError> {
        umya_spreadsheet::writer::xlsx::write(&self.book, path).map_err(|e| SheetError::Save {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }
}
