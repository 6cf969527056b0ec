//! RSVP reads and writes.

use crate::helpers::{ApiResult, bad_request_error, checkin_error, first_non_blank};
use crate::state::AppState;
use checkin_common::error::require;
use checkin_common::local_now;
use checkin_common::rsvp::{get_rsvp, save_rsvp};
use rocket::State;
use rocket::serde::json::{Json, Value, json};
use rocket::serde::Deserialize;

#[derive(Debug, Deserialize)]
#[serde(crate = "rocket::serde")]
pub struct RsvpBody {
    phone: Option<String>,
    rsvp: Option<String>,
}

#[get("/RSVP?<phone>")]
pub async fn rsvp_get(phone: Option<&str>, state: &State<AppState>) -> ApiResult<Value> {
    const FAILURE: &str = "Failed to fetch RSVP";

    let phone = require(phone, "phone number").map_err(|e| checkin_error(e, FAILURE))?;
    let sheet_id = state.sheet_id().map_err(|e| checkin_error(e, FAILURE))?;
    let rsvp = get_rsvp(
        state.sheets.as_ref(),
        sheet_id,
        &state.config.rsvp_sheet_name,
        phone,
    )
    .await
    .map_err(|e| checkin_error(e, FAILURE))?;
    Ok(Json(json!({ "rsvp": rsvp })))
}

#[post("/RSVP", data = "<body>")]
pub async fn rsvp_post(body: Json<RsvpBody>, state: &State<AppState>) -> ApiResult<Value> {
    const FAILURE: &str = "Failed to save RSVP";

    let phone = first_non_blank([body.phone.as_deref()]);
    let rsvp = first_non_blank([body.rsvp.as_deref()]);
    let (Some(phone), Some(rsvp)) = (phone, rsvp) else {
        return Err(bad_request_error("Missing phone or RSVP value"));
    };

    let sheet_id = state.sheet_id().map_err(|e| checkin_error(e, FAILURE))?;
    let write = save_rsvp(
        state.sheets.as_ref(),
        sheet_id,
        &state.config.rsvp_sheet_name,
        phone,
        rsvp,
        local_now(state.config.utc_offset()),
    )
    .await
    .map_err(|e| checkin_error(e, FAILURE))?;
    tracing::debug!(?write, "Saved RSVP");

    Ok(Json(json!({ "success": true })))
}
