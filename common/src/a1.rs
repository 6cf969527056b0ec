//! A1 notation helpers for addressing spreadsheet cells and ranges.
//!
//! Columns and rows are 1-based throughout, matching the notation itself
//! (`A` is column 1, the header row is row 1).

use crate::error::{CheckinError, Result};
use std::fmt;

/// Convert a 1-based column number into its letters (1 = `A`, 27 = `AA`).
pub fn column_letters(col: usize) -> String {
    let mut letters = Vec::new();
    let mut n = col;
    while n > 0 {
        let rem = (n - 1) % 26;
        letters.push(b'A' + rem as u8);
        n = (n - 1) / 26;
    }
    letters.reverse();
    String::from_utf8(letters).unwrap_or_default()
}

/// Convert column letters into a 1-based column number. Case-insensitive.
pub fn column_index(letters: &str) -> Option<usize> {
    if letters.is_empty() {
        return None;
    }
    letters.chars().try_fold(0usize, |acc, c| {
        if c.is_ascii_alphabetic() {
            let digit = (c.to_ascii_uppercase() as u8 - b'A') as usize + 1;
            acc.checked_mul(26)?.checked_add(digit)
        } else {
            None
        }
    })
}

/// A single cell address such as `H12`.
pub fn cell(col: usize, row: usize) -> String {
    format!("{}{row}", column_letters(col))
}

/// Quote a sheet title for use in a range, doubling embedded quotes.
pub fn quote_sheet_name(name: &str) -> String {
    format!("'{}'", name.replace('\'', "''"))
}

/// Pull the spreadsheet id out of a share link like
/// `https://docs.google.com/spreadsheets/d/<id>/edit#gid=0`.
pub fn extract_sheet_id(url: &str) -> Option<String> {
    let (_, rest) = url.split_once("/d/")?;
    let id: String = rest
        .chars()
        .take_while(|c| c.is_ascii_alphanumeric() || *c == '-' || *c == '_')
        .collect();
    if id.is_empty() { None } else { Some(id) }
}

/// One end of a range. Either part may be open (`B` is a whole column, `5` a whole row).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CellRef {
    pub col: Option<usize>,
    pub row: Option<usize>,
}

impl CellRef {
    fn parse(s: &str) -> Option<Self> {
        let split = s.find(|c: char| c.is_ascii_digit()).unwrap_or(s.len());
        let (letters, digits) = s.split_at(split);
        let col = if letters.is_empty() {
            None
        } else {
            Some(column_index(letters)?)
        };
        let row = if digits.is_empty() {
            None
        } else {
            match digits.parse::<usize>() {
                Ok(0) | Err(_) => return None,
                Ok(n) => Some(n),
            }
        };
        if col.is_none() && row.is_none() {
            return None;
        }
        Some(Self { col, row })
    }
}

impl fmt::Display for CellRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(col) = self.col {
            write!(f, "{}", column_letters(col))?;
        }
        if let Some(row) = self.row {
            write!(f, "{row}")?;
        }
        Ok(())
    }
}

/// A parsed range such as `'Attendance'!B:B` or `RSVP!C2:D`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SheetRange {
    pub sheet: String,
    /// `None` addresses the whole sheet.
    pub start: Option<CellRef>,
    pub end: Option<CellRef>,
}

impl SheetRange {
    pub fn whole_sheet(sheet: impl Into<String>) -> Self {
        Self {
            sheet: sheet.into(),
            start: None,
            end: None,
        }
    }

    pub fn new(sheet: impl Into<String>, start: CellRef, end: Option<CellRef>) -> Self {
        Self {
            sheet: sheet.into(),
            start: Some(start),
            end,
        }
    }

    pub fn parse(input: &str) -> Result<Self> {
        let invalid = || CheckinError::Invalid(format!("Unable to parse range: {input}"));

        let (sheet, cells) = split_sheet(input).ok_or_else(invalid)?;
        if sheet.is_empty() {
            return Err(invalid());
        }
        let Some(cells) = cells else {
            return Ok(Self::whole_sheet(sheet));
        };

        let (start, end) = match cells.split_once(':') {
            Some((a, b)) => (
                CellRef::parse(a).ok_or_else(invalid)?,
                Some(CellRef::parse(b).ok_or_else(invalid)?),
            ),
            None => (CellRef::parse(cells).ok_or_else(invalid)?, None),
        };
        Ok(Self::new(sheet, start, end))
    }

    pub fn first_col(&self) -> usize {
        self.start.and_then(|c| c.col).unwrap_or(1)
    }

    pub fn first_row(&self) -> usize {
        self.start.and_then(|c| c.row).unwrap_or(1)
    }

    /// Last column included, or `None` when unbounded.
    pub fn last_col(&self) -> Option<usize> {
        match (self.start, self.end) {
            (_, Some(end)) => end.col,
            (Some(start), None) => start.col,
            (None, None) => None,
        }
    }

    /// Last row included, or `None` when unbounded.
    pub fn last_row(&self) -> Option<usize> {
        match (self.start, self.end) {
            (_, Some(end)) => end.row,
            (Some(start), None) => start.row,
            (None, None) => None,
        }
    }
}

impl fmt::Display for SheetRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", quote_sheet_name(&self.sheet))?;
        if let Some(start) = self.start {
            write!(f, "!{start}")?;
            if let Some(end) = self.end {
                write!(f, ":{end}")?;
            }
        }
        Ok(())
    }
}

/// Split `Sheet!A1:B2` into the unquoted sheet title and the cell part.
fn split_sheet(input: &str) -> Option<(String, Option<&str>)> {
    let input = input.trim();
    if let Some(rest) = input.strip_prefix('\'') {
        // quoted title, '' is an escaped quote
        let mut title = String::new();
        let mut chars = rest.char_indices().peekable();
        while let Some((i, c)) = chars.next() {
            if c == '\'' {
                if matches!(chars.peek(), Some((_, '\''))) {
                    title.push('\'');
                    chars.next();
                    continue;
                }
                let after = &rest[i + 1..];
                return match after.strip_prefix('!') {
                    Some(cells) => Some((title, Some(cells))),
                    None if after.is_empty() => Some((title, None)),
                    None => None,
                };
            }
            title.push(c);
        }
        None
    } else {
        match input.rsplit_once('!') {
            Some((sheet, cells)) => Some((sheet.to_string(), Some(cells))),
            None => Some((input.to_string(), None)),
        }
    }
}
