//! Recording scans against an attendance sheet.
//!
//! The duplicate check is a read of the whole code column followed by an
//! append. Nothing makes that pair atomic, so two stations scanning the same
//! code at the same moment can both see it as new.

use crate::a1::quote_sheet_name;
use crate::error::{CheckinError, Result, require};
use crate::format_sheet_timestamp;
use crate::sheets::SheetStore;
use chrono::{DateTime, FixedOffset};
use clap::ValueEnum;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Column of the attendance sheet holding scanned codes.
pub const CODE_COLUMN: &str = "B";
/// Columns written for each scan: timestamp, code, status.
pub const RECORD_COLUMNS: (&str, &str) = ("A", "C");

/// What to do with a scan whose code is already in the sheet.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default, ValueEnum)]
pub enum DuplicatePolicy {
    /// Append every scan, marking repeats as `ALREADY SCANNED`.
    #[default]
    RecordAll,
    /// Only append first-time scans.
    SkipDuplicates,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ScanStatus {
    Scanned,
    AlreadyScanned,
}

impl ScanStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScanStatus::Scanned => "SCANNED",
            ScanStatus::AlreadyScanned => "ALREADY SCANNED",
        }
    }
}

/// Outcome of a scan as reported back to the station.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanRecord {
    pub success: bool,
    pub duplicate: bool,
    pub message: String,
    pub timestamp: String,
    /// Whether a row was written for this scan.
    #[serde(default)]
    pub recorded: bool,
}

/// Find the actual title of a sheet, ignoring case.
pub async fn resolve_sheet_title(
    store: &dyn SheetStore,
    spreadsheet_id: &str,
    sheet_name: &str,
) -> Result<String> {
    let wanted = sheet_name.trim().to_lowercase();
    store
        .sheet_titles(spreadsheet_id)
        .await?
        .into_iter()
        .find(|title| title.to_lowercase() == wanted)
        .ok_or_else(|| CheckinError::NotFound(format!("Sheet \"{sheet_name}\" not found")))
}

/// Trimmed, non-empty codes from a fetched column.
pub fn collect_codes(rows: &[Vec<String>]) -> HashSet<String> {
    rows.iter()
        .filter_map(|row| row.first())
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty())
        .collect()
}

/// Check a code against the attendance sheet and record the scan.
pub async fn record_scan(
    store: &dyn SheetStore,
    spreadsheet_id: &str,
    sheet_name: &str,
    code: &str,
    now: DateTime<FixedOffset>,
    policy: DuplicatePolicy,
) -> Result<ScanRecord> {
    let code = require(Some(code), "code")?;
    let title = resolve_sheet_title(store, spreadsheet_id, sheet_name).await?;
    let sheet = quote_sheet_name(&title);

    let column = store
        .get_values(spreadsheet_id, &format!("{sheet}!{CODE_COLUMN}:{CODE_COLUMN}"))
        .await?;
    let duplicate = collect_codes(&column).contains(code);
    let status = if duplicate {
        ScanStatus::AlreadyScanned
    } else {
        ScanStatus::Scanned
    };
    debug!(
        "Checked {} existing codes in {title}, duplicate: {duplicate}",
        column.len()
    );

    let timestamp = format_sheet_timestamp(now);
    let recorded = !duplicate || policy == DuplicatePolicy::RecordAll;
    if recorded {
        let (first, last) = RECORD_COLUMNS;
        store
            .append_row(
                spreadsheet_id,
                &format!("{sheet}!{first}:{last}"),
                vec![timestamp.clone(), code.to_string(), status.as_str().to_string()],
            )
            .await?;
    }
    info!("Scan of {code} in {title}: {}", status.as_str());

    let message = if duplicate {
        format!("Code {code} has already been scanned")
    } else {
        format!("Successfully recorded scan for code: {code}")
    };

    Ok(ScanRecord {
        success: !duplicate,
        duplicate,
        message,
        timestamp,
        recorded,
    })
}
