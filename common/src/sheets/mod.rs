//! Access to the spreadsheet that holds attendee data.
//!
//! Everything above this module speaks in A1 ranges and rows of strings; the
//! backends translate that to the Sheets REST API or to an in-memory table.

mod google;
mod memory;

pub use google::{GoogleSheets, ServiceAccount};
pub use memory::MemorySheets;

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// A row as returned by the spreadsheet: formatted cell values, trailing blanks trimmed.
pub type Row = Vec<String>;

/// A block of values to write at a range, as used by batch updates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValueRange {
    pub range: String,
    pub values: Vec<Row>,
}

impl ValueRange {
    pub fn new(range: impl Into<String>, values: Vec<Row>) -> Self {
        Self {
            range: range.into(),
            values,
        }
    }
}

#[async_trait]
pub trait SheetStore: Send + Sync {
    /// Titles of every tab in the spreadsheet.
    async fn sheet_titles(&self, spreadsheet_id: &str) -> Result<Vec<String>>;

    /// Read the values inside a range. Missing trailing rows and cells are omitted.
    async fn get_values(&self, spreadsheet_id: &str, range: &str) -> Result<Vec<Row>>;

    /// Append a row after the last row of data in the range's sheet.
    async fn append_row(&self, spreadsheet_id: &str, range: &str, row: Row) -> Result<()>;

    /// Write several ranges in one request. Values are interpreted as if typed by a user.
    async fn batch_update(&self, spreadsheet_id: &str, data: Vec<ValueRange>) -> Result<()>;

    async fn update_values(&self, spreadsheet_id: &str, range: &str, values: Vec<Row>) -> Result<()> {
        self.batch_update(spreadsheet_id, vec![ValueRange::new(range, values)])
            .await
    }
}

/// Get a cell from a fetched row, treating missing cells as empty.
pub fn cell_at(row: &[String], index: usize) -> &str {
    row.get(index).map(String::as_str).unwrap_or("")
}

/// Get a cell from a fetched row, `None` if missing or empty.
pub fn non_empty_cell(row: &[String], index: usize) -> Option<String> {
    row.get(index).filter(|v| !v.is_empty()).cloned()
}

/// Find the first row whose cell at `index` equals `key` once both are trimmed.
pub fn find_row_index(rows: &[Row], index: usize, key: &str) -> Option<usize> {
    let key = key.trim();
    rows.iter().position(|row| cell_at(row, index).trim() == key)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(cells: &[&str]) -> Row {
        cells.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_find_row_index_trims_both_sides() {
        let rows = vec![row(&["", "x"]), row(&["a", " 9123 "]), row(&["b"])];
        assert_eq!(find_row_index(&rows, 1, "9123"), Some(1));
        assert_eq!(find_row_index(&rows, 1, " x"), Some(0));
        assert_eq!(find_row_index(&rows, 1, "nope"), None);
    }

    #[test]
    fn test_cell_helpers_on_short_rows() {
        let r = row(&["a", ""]);
        assert_eq!(cell_at(&r, 5), "");
        assert_eq!(non_empty_cell(&r, 0), Some("a".to_string()));
        assert_eq!(non_empty_cell(&r, 1), None);
        assert_eq!(non_empty_cell(&r, 9), None);
    }
}
