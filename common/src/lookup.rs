//! Attendee lookups: by header-mapped code column, or by phone in the fixed directory layout.

use crate::a1::quote_sheet_name;
use crate::error::{CheckinError, Result, require};
use crate::sheets::{Row, SheetStore, cell_at, find_row_index, non_empty_cell};
use itertools::Itertools;
use log::debug;
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::HashMap;

/// Header of the code column when the event does not name one.
pub const DEFAULT_CODE_COLUMN: &str = "Code";
/// Widest window read for header-mapped lookups.
pub const DIRECTORY_RANGE: &str = "A1:ZZ";
/// Window of the fixed-layout phone directory (data rows only).
pub const PHONE_DIRECTORY_RANGE: &str = "A2:I";

/// Split a comma-separated column list. Blank entries are kept so that
/// `Name,,Table` is reported as naming a column that does not exist.
pub fn parse_column_list(list: &str) -> Vec<String> {
    list.split(',').map(|c| c.trim().to_string()).collect()
}

/// Header names mapped to their column positions.
#[derive(Debug, Clone)]
pub struct HeaderIndex {
    headers: Vec<String>,
    positions: HashMap<String, usize>,
}

impl HeaderIndex {
    pub fn new(headers: &[String]) -> Self {
        let mut positions = HashMap::new();
        for (i, header) in headers.iter().enumerate() {
            // later duplicates win, as a plain object assignment would
            positions.insert(header.trim().to_string(), i);
        }
        Self {
            headers: headers.to_vec(),
            positions,
        }
    }

    /// Exact (trimmed) header match.
    pub fn position(&self, name: &str) -> Option<usize> {
        self.positions.get(name.trim()).copied()
    }

    /// First header equal to `name` ignoring case and surrounding whitespace.
    pub fn position_ignore_case(&self, name: &str) -> Option<usize> {
        let wanted = name.trim().to_lowercase();
        self.headers
            .iter()
            .position(|h| h.trim().to_lowercase() == wanted)
    }
}

/// One matched row as `{column: value-or-null, "code": code}`.
pub type Projection = Map<String, Value>;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum LookupResult {
    Single(Projection),
    Many(Vec<Projection>),
}

/// A header-mapped lookup request.
#[derive(Debug, Clone)]
pub struct LookupRequest {
    pub code: String,
    pub columns: Vec<String>,
    pub code_column: String,
}

/// Filter `rows` by the code column and project the requested columns.
pub fn project_rows(headers: &[String], rows: &[Row], request: &LookupRequest) -> Result<LookupResult> {
    let index = HeaderIndex::new(headers);
    let code_idx = index.position_ignore_case(&request.code_column).ok_or_else(|| {
        CheckinError::Invalid(format!(
            "Column \"{}\" not found in sheet",
            request.code_column
        ))
    })?;

    let missing: Vec<&String> = request
        .columns
        .iter()
        .filter(|c| index.position(c).is_none())
        .collect();
    if !missing.is_empty() {
        return Err(CheckinError::Invalid(format!(
            "Columns not found: {}",
            missing.iter().join(", ")
        )));
    }

    let code = request.code.trim();
    let mut results: Vec<Projection> = rows
        .iter()
        .filter(|row| cell_at(row, code_idx).trim() == code)
        .map(|row| {
            let mut data = Map::new();
            for column in &request.columns {
                let value = index
                    .position(column)
                    .and_then(|i| non_empty_cell(row, i))
                    .map_or(Value::Null, Value::String);
                data.insert(column.clone(), value);
            }
            data.insert("code".to_string(), Value::String(request.code.clone()));
            data
        })
        .collect();

    match results.len() {
        0 => Err(CheckinError::NotFound("User not found".to_string())),
        1 => Ok(LookupResult::Single(results.remove(0))),
        _ => Ok(LookupResult::Many(results)),
    }
}

/// Look up a code in a directory sheet whose first row holds the headers.
pub async fn lookup_by_code(
    store: &dyn SheetStore,
    spreadsheet_id: &str,
    sheet_name: &str,
    request: &LookupRequest,
) -> Result<LookupResult> {
    require(Some(request.code.as_str()), "code")?;
    let values = store
        .get_values(spreadsheet_id, &format!("{}!{DIRECTORY_RANGE}", quote_sheet_name(sheet_name)))
        .await?;
    let (headers, rows) = match values.split_first() {
        Some((headers, rows)) => (headers.as_slice(), rows),
        None => (&[][..], &[][..]),
    };
    debug!("Directory {sheet_name} has {} data rows", rows.len());
    project_rows(headers, rows, request)
}

/// An attendee from the fixed-layout phone directory.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendeeRecord {
    pub ref_no: Option<String>,
    pub name: String,
    pub phone: Option<String>,
    pub venue: Option<String>,
    pub zone: Option<String>,
    pub color: Option<String>,
}

// positions within A2:I
const REF_NO_IDX: usize = 0;
const NAME_IDX: usize = 1;
const PHONE_IDX: usize = 4;
const VENUE_IDX: usize = 6;
const ZONE_IDX: usize = 7;
const COLOR_IDX: usize = 8;

/// Find an attendee by phone number (column E). Rows without a name do not count.
pub async fn lookup_attendee_by_phone(
    store: &dyn SheetStore,
    spreadsheet_id: &str,
    sheet_name: &str,
    phone: &str,
) -> Result<AttendeeRecord> {
    let phone = require(Some(phone), "phone number")?;
    let rows = store
        .get_values(spreadsheet_id, &format!("{}!{PHONE_DIRECTORY_RANGE}", quote_sheet_name(sheet_name)))
        .await?;

    let not_found = || CheckinError::NotFound("User not found".to_string());
    let row = find_row_index(&rows, PHONE_IDX, phone)
        .map(|i| &rows[i])
        .ok_or_else(not_found)?;
    let name = non_empty_cell(row, NAME_IDX).ok_or_else(not_found)?;

    Ok(AttendeeRecord {
        ref_no: row.get(REF_NO_IDX).cloned(),
        name,
        phone: row.get(PHONE_IDX).cloned(),
        venue: row.get(VENUE_IDX).cloned(),
        zone: row.get(ZONE_IDX).cloned(),
        color: row.get(COLOR_IDX).cloned(),
    })
}
