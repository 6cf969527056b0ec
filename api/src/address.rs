//! Mailing address confirmation links.

use crate::helpers::{ApiResult, bad_request_error, checkin_error, first_non_blank};
use crate::state::AppState;
use checkin_common::address::{
    Address, AddressDecision, AddressSaved, AddressView, confirm_address, get_address,
};
use checkin_common::error::require;
use rocket::State;
use rocket::serde::Deserialize;
use rocket::serde::json::Json;

#[derive(Debug, Deserialize)]
#[serde(crate = "rocket::serde")]
pub struct ConfirmBody {
    token: Option<String>,
    /// `correct` or `changed`.
    decision: Option<String>,
    #[serde(rename = "newAddress")]
    new_address: Option<Address>,
}

#[get("/address-confirm?<token>")]
pub async fn address_get(token: Option<&str>, state: &State<AppState>) -> ApiResult<AddressView> {
    const FAILURE: &str = "Failed to fetch";

    let token = require(token, "token").map_err(|e| checkin_error(e, FAILURE))?;
    let sheet_id = state.address_sheet_id().map_err(|e| checkin_error(e, FAILURE))?;
    let view = get_address(
        state.sheets.as_ref(),
        sheet_id,
        &state.config.donor_sheet_name,
        token,
    )
    .await
    .map_err(|e| checkin_error(e, FAILURE))?;
    Ok(Json(view))
}

#[post("/address-confirm", data = "<body>")]
pub async fn address_post(body: Json<ConfirmBody>, state: &State<AppState>) -> ApiResult<AddressSaved> {
    const FAILURE: &str = "Failed to save";

    let body = body.into_inner();
    let token = first_non_blank([body.token.as_deref()]);
    let decision = first_non_blank([body.decision.as_deref()]);
    let (Some(token), Some(decision)) = (token, decision) else {
        return Err(bad_request_error("Missing token/decision"));
    };
    let decision =
        AddressDecision::parse(decision, body.new_address).map_err(|e| checkin_error(e, FAILURE))?;

    let sheet_id = state.address_sheet_id().map_err(|e| checkin_error(e, FAILURE))?;
    let saved = confirm_address(
        state.sheets.as_ref(),
        sheet_id,
        &state.config.donor_sheet_name,
        token,
        decision,
    )
    .await
    .map_err(|e| checkin_error(e, FAILURE))?;
    Ok(Json(saved))
}
