//! Attendee lookups.

use crate::helpers::{ApiResult, bad_request_error, checkin_error, first_non_blank};
use crate::state::AppState;
use checkin_common::UserLookupBody;
use checkin_common::error::require;
use checkin_common::lookup::{
    AttendeeRecord, DEFAULT_CODE_COLUMN, LookupRequest, LookupResult, lookup_attendee_by_phone,
    lookup_by_code, parse_column_list,
};
use rocket::State;
use rocket::serde::json::Json;

/// Find the rows matching a scanned code and return the requested columns.
#[post("/newUser", data = "<body>")]
pub async fn new_user(body: Json<UserLookupBody>, state: &State<AppState>) -> ApiResult<LookupResult> {
    const FAILURE: &str = "Failed to fetch user data";

    let code = require(body.code.as_deref(), "code").map_err(|e| checkin_error(e, FAILURE))?;
    let sheet_id = first_non_blank([body.sheet_id.as_deref()]);
    let sheet_name = first_non_blank([body.sheet_name.as_deref()]);
    let scanned_info = first_non_blank([body.scanned_info.as_deref()]);
    let (Some(sheet_id), Some(sheet_name), Some(scanned_info)) = (sheet_id, sheet_name, scanned_info)
    else {
        return Err(bad_request_error(
            "Missing SHEET_ID, SHEET_NAME, or scanned_info",
        ));
    };

    let request = LookupRequest {
        code: code.to_string(),
        columns: parse_column_list(scanned_info),
        code_column: first_non_blank([body.code_column.as_deref()])
            .unwrap_or(DEFAULT_CODE_COLUMN)
            .to_string(),
    };

    let result = lookup_by_code(state.sheets.as_ref(), sheet_id, sheet_name, &request)
        .await
        .map_err(|e| checkin_error(e, FAILURE))?;
    Ok(Json(result))
}

/// Find an attendee in the directory by phone number.
#[get("/user?<phone>")]
pub async fn user(phone: Option<&str>, state: &State<AppState>) -> ApiResult<AttendeeRecord> {
    const FAILURE: &str = "Failed to fetch user";

    let phone = require(phone, "phone number").map_err(|e| checkin_error(e, FAILURE))?;
    let sheet_id = state.sheet_id().map_err(|e| checkin_error(e, FAILURE))?;
    let record = lookup_attendee_by_phone(
        state.sheets.as_ref(),
        sheet_id,
        &state.config.database_sheet_name,
        phone,
    )
    .await
    .map_err(|e| checkin_error(e, FAILURE))?;
    Ok(Json(record))
}
