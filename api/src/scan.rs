//! Scan recording for the check-in stations.

use crate::helpers::{ApiResult, bad_request_error, checkin_error, first_non_blank};
use crate::state::AppState;
use checkin_common::attendance::{ScanRecord, record_scan};
use checkin_common::error::require;
use checkin_common::{ScanBody, local_now};
use rocket::State;
use rocket::serde::json::Json;

const FAILURE: &str = "Failed to write to Google Sheet";

/// Check a scanned code for duplicates and log it to the attendance sheet.
/// The sheet falls back to the configured one when the body does not name it.
#[post("/newScan", data = "<body>")]
pub async fn new_scan(body: Json<ScanBody>, state: &State<AppState>) -> ApiResult<ScanRecord> {
    let config = &state.config;
    let code = require(body.code.as_deref(), "code").map_err(|e| checkin_error(e, FAILURE))?;

    let sheet_id = first_non_blank([body.sheet_id.as_deref(), config.sheet_id.as_deref()]);
    let sheet_name = first_non_blank([
        body.sheet_name.as_deref(),
        config.attendance_sheet_name.as_deref(),
    ]);
    let (Some(sheet_id), Some(sheet_name)) = (sheet_id, sheet_name) else {
        return Err(bad_request_error("Missing SHEET_ID or SHEET_NAME"));
    };

    let record = record_scan(
        state.sheets.as_ref(),
        sheet_id,
        sheet_name,
        code,
        local_now(config.utc_offset()),
        config.duplicate_policy,
    )
    .await
    .map_err(|e| checkin_error(e, FAILURE))?;

    Ok(Json(record))
}
