//! Event definitions used by the scanner pages.

use crate::auth::AdminSession;
use crate::helpers::{ApiResult, checkin_error, not_found_error};
use crate::state::AppState;
use checkin_common::events::{EventRecord, NewEvent};
use rocket::State;
use rocket::serde::json::Json;

#[get("/events/<id>")]
pub async fn get_event(id: &str, state: &State<AppState>) -> ApiResult<EventRecord> {
    match state.events.get_event(id).await {
        Ok(Some(event)) => Ok(Json(event)),
        Ok(None) => Err(not_found_error("Event not found")),
        Err(e) => Err(checkin_error(e, "Failed to fetch event")),
    }
}

#[post("/admin/events", data = "<body>")]
pub async fn create_event(
    _admin: AdminSession,
    body: Json<NewEvent>,
    state: &State<AppState>,
) -> ApiResult<EventRecord> {
    let event = state
        .events
        .create_event(body.into_inner())
        .await
        .map_err(|e| checkin_error(e, "Failed to create event"))?;
    tracing::info!(id = %event.id, name = %event.event_name, "Created event");
    Ok(Json(event))
}
