//! A spreadsheet held in process memory.
//!
//! Used when `SHEETS_BACKEND=memory` for local runs without Google credentials,
//! and as the fake behind the library and API tests.

use super::{Row, SheetStore, ValueRange};
use crate::a1::SheetRange;
use crate::error::{CheckinError, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

#[derive(Debug, Clone)]
struct Tab {
    title: String,
    rows: Vec<Row>,
}

#[derive(Debug, Default)]
pub struct MemorySheets {
    books: Mutex<HashMap<String, Vec<Tab>>>,
}

impl MemorySheets {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create (or replace) a tab with the given contents.
    pub fn add_sheet(&self, spreadsheet_id: &str, title: &str, rows: Vec<Row>) {
        let mut books = self.lock();
        let tabs = books.entry(spreadsheet_id.to_string()).or_default();
        tabs.retain(|t| t.title != title);
        tabs.push(Tab {
            title: title.to_string(),
            rows,
        });
    }

    /// Convenience for seeding from string literals.
    pub fn with_sheet(self, spreadsheet_id: &str, title: &str, rows: &[&[&str]]) -> Self {
        let rows = rows
            .iter()
            .map(|r| r.iter().map(|c| c.to_string()).collect())
            .collect();
        self.add_sheet(spreadsheet_id, title, rows);
        self
    }

    /// Snapshot of a tab's raw rows, empty if it does not exist.
    pub fn rows(&self, spreadsheet_id: &str, title: &str) -> Vec<Row> {
        self.lock()
            .get(spreadsheet_id)
            .and_then(|tabs| tabs.iter().find(|t| t.title == title))
            .map(|t| t.rows.clone())
            .unwrap_or_default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Vec<Tab>>> {
        self.books.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn find_tab<'a>(tabs: &'a mut [Tab], range: &SheetRange, raw: &str) -> Result<&'a mut Tab> {
    tabs.iter_mut()
        .find(|t| t.title == range.sheet)
        .ok_or_else(|| CheckinError::upstream(format!("Unable to parse range: {raw}")))
}

fn book<'a>(
    books: &'a mut HashMap<String, Vec<Tab>>,
    spreadsheet_id: &str,
) -> Result<&'a mut Vec<Tab>> {
    books
        .get_mut(spreadsheet_id)
        .ok_or_else(|| CheckinError::upstream(format!("Requested entity was not found: {spreadsheet_id}")))
}

fn trim_trailing_empty(mut row: Row) -> Row {
    while row.last().is_some_and(String::is_empty) {
        row.pop();
    }
    row
}

fn write_cell(rows: &mut Vec<Row>, row: usize, col: usize, value: String) {
    if rows.len() <= row {
        rows.resize_with(row + 1, Vec::new);
    }
    let target = &mut rows[row];
    if target.len() <= col {
        target.resize(col + 1, String::new());
    }
    target[col] = value;
}

#[async_trait]
impl SheetStore for MemorySheets {
    async fn sheet_titles(&self, spreadsheet_id: &str) -> Result<Vec<String>> {
        let mut books = self.lock();
        let tabs = book(&mut books, spreadsheet_id)?;
        Ok(tabs.iter().map(|t| t.title.clone()).collect())
    }

    async fn get_values(&self, spreadsheet_id: &str, range: &str) -> Result<Vec<Row>> {
        let parsed = SheetRange::parse(range)?;
        let mut books = self.lock();
        let tab = find_tab(book(&mut books, spreadsheet_id)?, &parsed, range)?;

        let first_row = parsed.first_row() - 1;
        let first_col = parsed.first_col() - 1;
        let last_row = parsed
            .last_row()
            .unwrap_or(tab.rows.len())
            .min(tab.rows.len());

        let mut values: Vec<Row> = tab
            .rows
            .iter()
            .take(last_row)
            .skip(first_row)
            .map(|row| {
                let end = parsed.last_col().unwrap_or(row.len()).min(row.len());
                let cells = if first_col < end {
                    row[first_col..end].to_vec()
                } else {
                    Vec::new()
                };
                trim_trailing_empty(cells)
            })
            .collect();

        while values.last().is_some_and(Vec::is_empty) {
            values.pop();
        }
        Ok(values)
    }

    async fn append_row(&self, spreadsheet_id: &str, range: &str, row: Row) -> Result<()> {
        let parsed = SheetRange::parse(range)?;
        let mut books = self.lock();
        let tab = find_tab(book(&mut books, spreadsheet_id)?, &parsed, range)?;

        let next_row = tab
            .rows
            .iter()
            .rposition(|r| r.iter().any(|c| !c.is_empty()))
            .map_or(0, |i| i + 1);
        let first_col = parsed.first_col() - 1;
        if row.is_empty() {
            write_cell(&mut tab.rows, next_row, first_col, String::new());
        }
        for (offset, value) in row.into_iter().enumerate() {
            write_cell(&mut tab.rows, next_row, first_col + offset, value);
        }
        Ok(())
    }

    async fn batch_update(&self, spreadsheet_id: &str, data: Vec<ValueRange>) -> Result<()> {
        let parsed = data
            .iter()
            .map(|vr| SheetRange::parse(&vr.range))
            .collect::<Result<Vec<_>>>()?;

        let mut books = self.lock();
        let tabs = book(&mut books, spreadsheet_id)?;
        // check every target before touching anything
        for (range, vr) in parsed.iter().zip(&data) {
            find_tab(tabs, range, &vr.range)?;
        }

        for (range, vr) in parsed.iter().zip(data) {
            let tab = find_tab(tabs, range, &vr.range)?;
            let first_row = range.first_row() - 1;
            let first_col = range.first_col() - 1;
            for (i, values) in vr.values.into_iter().enumerate() {
                for (j, value) in values.into_iter().enumerate() {
                    write_cell(&mut tab.rows, first_row + i, first_col + j, value);
                }
            }
        }
        Ok(())
    }
}
