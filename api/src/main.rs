//! An api for recording event attendance against a spreadsheet.

#[macro_use]
extern crate rocket;

mod address;
mod auth;
mod events;
mod helpers;
mod lookup;
mod qrcode;
mod rsvp;
mod scan;
mod state;

use checkin_common::config::AppConfig;
use helpers::{ApiErrorBody, ApiErrorKind, CorsFairing, RequestTimingFairing};
use rocket::serde::json::Json;
use rocket::{Build, Request, Rocket};
use rocket_prometheus::PrometheusMetrics;
use state::AppState;
use tracing_subscriber::EnvFilter;

#[catch(400)]
fn bad_request(_req: &Request) -> Json<ApiErrorBody> {
    Json(ApiErrorBody::new(ApiErrorKind::BadRequest, "Malformed request."))
}

#[catch(401)]
fn unauthorized(_req: &Request) -> Json<ApiErrorBody> {
    Json(ApiErrorBody::new(ApiErrorKind::Unauthorized, "Login required."))
}

#[catch(404)]
fn not_found(_req: &Request) -> Json<ApiErrorBody> {
    Json(ApiErrorBody::new(
        ApiErrorKind::NotFound,
        "The requested resource could not be found.",
    ))
}

#[catch(415)]
fn unsupported_media_type(_req: &Request) -> Json<ApiErrorBody> {
    Json(ApiErrorBody::new(
        ApiErrorKind::UnsupportedMediaType,
        "Unsupported Content-Type.",
    ))
}

#[catch(422)]
fn unprocessable_entity(_req: &Request) -> Json<ApiErrorBody> {
    Json(ApiErrorBody::new(
        ApiErrorKind::UnprocessableEntity,
        "Request body has fields of the wrong type.",
    ))
}

#[catch(500)]
fn internal(_req: &Request) -> Json<ApiErrorBody> {
    Json(ApiErrorBody::new(ApiErrorKind::Internal, "Unexpected error."))
}

/// Assemble the server around a prepared state.
fn build_rocket(state: AppState) -> Rocket<Build> {
    let prometheus = PrometheusMetrics::new();

    rocket::build()
        .manage(state)
        .attach(prometheus.clone())
        .attach(RequestTimingFairing)
        .attach(CorsFairing)
        .mount(
            "/api",
            routes![
                scan::new_scan,
                lookup::new_user,
                lookup::user,
                rsvp::rsvp_get,
                rsvp::rsvp_post,
                address::address_get,
                address::address_post,
                qrcode::qrcode_get,
                qrcode::qrcode_post_json,
                qrcode::qrcode_post_form,
                qrcode::qrcode_post_multipart,
                qrcode::qrcode_post_unsupported,
                auth::login,
                auth::logout,
                events::get_event,
                events::create_event,
            ],
        )
        .mount("/metrics", prometheus)
        .register(
            "/",
            catchers![
                bad_request,
                unauthorized,
                not_found,
                unsupported_media_type,
                unprocessable_entity,
                internal
            ],
        )
}

#[rocket::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    tracing::info!("Loading configuration...");
    let state = match AppConfig::from_env().and_then(AppState::from_config) {
        Ok(state) => state,
        Err(e) => {
            tracing::error!(error = %e, "Could not start");
            std::process::exit(1);
        }
    };
    tracing::debug!(config = ?state.config, "Configuration loaded");

    tracing::info!("Starting server...");
    if let Err(e) = build_rocket(state).launch().await {
        tracing::error!(error = %e, "Server stopped with an error");
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use checkin_common::events::{EventRecord, MemoryEvents};
    use checkin_common::sheets::MemorySheets;
    use rocket::http::{ContentType, Status};
    use rocket::local::blocking::Client;
    use rocket::serde::json::{Value, json};
    use std::sync::Arc;

    fn sheets() -> Arc<MemorySheets> {
        Arc::new(
            MemorySheets::new()
                .with_sheet(
                    "event",
                    "Attendance",
                    &[&["Timestamp", "Code", "Status"], &["", "A-1", "SCANNED"]],
                )
                .with_sheet(
                    "event",
                    "RSVP",
                    &[
                        &["Ref", "Name", "Contact Number", "RSVP", "Phone", "", "Venue", "Zone", "Colour"],
                        &["R-1", "Ada", "81110000", "Yes", "91234567", "", "Hall A", "North", "Red"],
                    ],
                )
                .with_sheet(
                    "event",
                    "Directory",
                    &[&["Name", "Code", "Table"], &["Ada", "A-1", "3"]],
                )
                .with_sheet(
                    "donors",
                    "SEND",
                    &[
                        &["#", "Name", "Token", "Blk", "Street", "Unit", "Postal"],
                        &["1", "Ada", "tok-a", "10", "Main St", "#01-01", "100010"],
                    ],
                ),
        )
    }

    fn config() -> AppConfig {
        AppConfig {
            sheet_id: Some("event".into()),
            attendance_sheet_name: Some("attendance".into()),
            address_sheet_id: Some("donors".into()),
            access_password: Some("letmein".into()),
            ..AppConfig::default()
        }
    }

    fn client_with(sheets: Arc<MemorySheets>) -> Client {
        let events = MemoryEvents::new();
        events.insert(EventRecord {
            id: "gala".into(),
            event_name: "Gala".into(),
            sheet_link: Some("https://docs.google.com/spreadsheets/d/event/edit".into()),
            rsvp: false,
            scanned_info: None,
            db_name: Some("Directory".into()),
            rsvp_name: None,
            attendance_name: Some("Attendance".into()),
            code_column: None,
            created_at: None,
        });
        let state = AppState::with_stores(config(), sheets, Arc::new(events)).unwrap();
        Client::tracked(build_rocket(state)).unwrap()
    }

    fn client() -> Client {
        client_with(sheets())
    }

    fn post_json(client: &Client, uri: &str, body: Value) -> (Status, Value) {
        let response = client.post(uri).header(ContentType::JSON).body(body.to_string()).dispatch();
        let status = response.status();
        (status, response.into_json().unwrap_or(Value::Null))
    }

    fn get_json(client: &Client, uri: &str) -> (Status, Value) {
        let response = client.get(uri).dispatch();
        let status = response.status();
        (status, response.into_json().unwrap_or(Value::Null))
    }

    #[test_log::test]
    fn test_new_scan_records_and_flags_duplicates() {
        let sheets = sheets();
        let client = client_with(sheets.clone());

        let (status, body) = post_json(&client, "/api/newScan", json!({"code": " B-2 "}));
        assert_eq!(status, Status::Ok);
        assert_eq!(body["success"], json!(true));
        assert_eq!(body["message"], json!("Successfully recorded scan for code: B-2"));

        let (status, body) = post_json(
            &client,
            "/api/newScan",
            json!({"code": "A-1", "SHEET_ID": "event", "SHEET_NAME": "ATTENDANCE"}),
        );
        assert_eq!(status, Status::Ok);
        assert_eq!(body["duplicate"], json!(true));
        assert_eq!(body["success"], json!(false));

        let rows = sheets.rows("event", "Attendance");
        assert_eq!(rows.len(), 4);
        assert_eq!(rows[3][1..], ["A-1", "ALREADY SCANNED"]);
    }

    #[test_log::test]
    fn test_new_scan_errors() {
        let client = client();
        let (status, body) = post_json(&client, "/api/newScan", json!({"code": ""}));
        assert_eq!(status, Status::BadRequest);
        assert_eq!(body["message"], json!("Missing code"));

        let (status, _) = post_json(
            &client,
            "/api/newScan",
            json!({"code": "A-1", "SHEET_NAME": "Day 2"}),
        );
        assert_eq!(status, Status::NotFound);

        let (status, body) = post_json(
            &client,
            "/api/newScan",
            json!({"code": "A-1", "SHEET_ID": "missing-book"}),
        );
        assert_eq!(status, Status::InternalServerError);
        assert_eq!(body["message"], json!("Failed to write to Google Sheet"));
    }

    #[test_log::test]
    fn test_new_user_lookup() {
        let client = client();
        let request = |code: &str, columns: &str| {
            json!({
                "code": code,
                "SHEET_ID": "event",
                "SHEET_NAME": "Directory",
                "scanned_info": columns,
            })
        };

        let (status, body) = post_json(&client, "/api/newUser", request("A-1", "Name,Table"));
        assert_eq!(status, Status::Ok);
        assert_eq!(body, json!({"Name": "Ada", "Table": "3", "code": "A-1"}));

        let (status, _) = post_json(&client, "/api/newUser", request("Z-9", "Name"));
        assert_eq!(status, Status::NotFound);

        let (status, body) = post_json(&client, "/api/newUser", request("A-1", "Email"));
        assert_eq!(status, Status::BadRequest);
        assert_eq!(body["message"], json!("Columns not found: Email"));

        let (status, body) = post_json(&client, "/api/newUser", json!({"code": "A-1"}));
        assert_eq!(status, Status::BadRequest);
        assert_eq!(body["message"], json!("Missing SHEET_ID, SHEET_NAME, or scanned_info"));
    }

    #[test_log::test]
    fn test_user_by_phone() {
        let client = client();
        let (status, body) = get_json(&client, "/api/user?phone=91234567");
        assert_eq!(status, Status::Ok);
        assert_eq!(body["refNo"], json!("R-1"));
        assert_eq!(body["venue"], json!("Hall A"));

        let (status, _) = get_json(&client, "/api/user?phone=90000000");
        assert_eq!(status, Status::NotFound);

        let (status, body) = get_json(&client, "/api/user");
        assert_eq!(status, Status::BadRequest);
        assert_eq!(body["message"], json!("Missing phone number"));
    }

    #[test_log::test]
    fn test_missing_query_is_reported_before_sheet_config() {
        let unconfigured = AppConfig {
            sheet_id: None,
            address_sheet_id: None,
            ..config()
        };
        let state =
            AppState::with_stores(unconfigured, sheets(), Arc::new(MemoryEvents::new())).unwrap();
        let client = Client::tracked(build_rocket(state)).unwrap();

        for (uri, message) in [
            ("/api/user", "Missing phone number"),
            ("/api/RSVP", "Missing phone number"),
            ("/api/address-confirm", "Missing token"),
        ] {
            let (status, body) = get_json(&client, uri);
            assert_eq!(status, Status::BadRequest, "{uri}");
            assert_eq!(body["message"], json!(message), "{uri}");
        }

        let (status, body) = get_json(&client, "/api/user?phone=91234567");
        assert_eq!(status, Status::InternalServerError);
        assert_eq!(body["message"], json!("Failed to fetch user"));
    }

    #[test_log::test]
    fn test_rsvp_round_trip() {
        let sheets = sheets();
        let client = client_with(sheets.clone());

        let (status, body) = get_json(&client, "/api/RSVP?phone=81110000");
        assert_eq!(status, Status::Ok);
        assert_eq!(body, json!({"rsvp": "Yes"}));

        let (status, body) = get_json(&client, "/api/RSVP?phone=82220000");
        assert_eq!(status, Status::Ok);
        assert_eq!(body, json!({"rsvp": null}));

        let (status, _) = post_json(&client, "/api/RSVP", json!({"phone": "81110000", "rsvp": "No"}));
        assert_eq!(status, Status::Ok);
        assert_eq!(sheets.rows("event", "RSVP")[1][3], "No");

        let (status, body) = post_json(&client, "/api/RSVP", json!({"phone": "81110000"}));
        assert_eq!(status, Status::BadRequest);
        assert_eq!(body["message"], json!("Missing phone or RSVP value"));
    }

    #[test_log::test]
    fn test_address_confirmation() {
        let sheets = sheets();
        let client = client_with(sheets.clone());

        let (status, body) = get_json(&client, "/api/address-confirm?token=tok-a");
        assert_eq!(status, Status::Ok);
        assert_eq!(body["old"]["street"], json!("Main St"));

        let (status, _) = get_json(&client, "/api/address-confirm?token=nope");
        assert_eq!(status, Status::NotFound);

        let (status, body) = post_json(
            &client,
            "/api/address-confirm",
            json!({"token": "tok-a", "decision": "changed", "newAddress": {"blk": "1"}}),
        );
        assert_eq!(status, Status::BadRequest);
        assert_eq!(body["message"], json!("Missing new address fields"));

        let (status, body) = post_json(
            &client,
            "/api/address-confirm",
            json!({"token": "tok-a", "decision": "correct"}),
        );
        assert_eq!(status, Status::Ok);
        assert_eq!(body, json!({"success": true, "h": "1", "newAddr": null}));
        assert_eq!(sheets.rows("donors", "SEND")[1][7], "1");

        let (status, _) = post_json(&client, "/api/address-confirm", json!({"token": "tok-a"}));
        assert_eq!(status, Status::BadRequest);
    }

    #[test_log::test]
    fn test_login_guards_event_creation() {
        let client = client();
        let new_event = json!({
            "event_name": "Dinner",
            "sheet_link": "https://docs.google.com/spreadsheets/d/dinner123/edit",
        });

        let (status, _) = post_json(&client, "/api/admin/events", new_event.clone());
        assert_eq!(status, Status::Unauthorized);

        let (status, body) = post_json(&client, "/api/login", json!({"password": "nope"}));
        assert_eq!(status, Status::Unauthorized);
        assert_eq!(body, json!({"success": false}));

        let (status, _) = post_json(&client, "/api/login", json!({"password": "letmein"}));
        assert_eq!(status, Status::Ok);

        let (status, body) = post_json(&client, "/api/admin/events", new_event);
        assert_eq!(status, Status::Ok);
        let id = body["id"].as_str().unwrap().to_string();

        let (status, body) = get_json(&client, &format!("/api/events/{id}"));
        assert_eq!(status, Status::Ok);
        assert_eq!(body["event_name"], json!("Dinner"));

        let (status, _) = post_json(
            &client,
            "/api/admin/events",
            json!({"event_name": "Broken", "sheet_link": "https://example.com"}),
        );
        assert_eq!(status, Status::BadRequest);

        let (status, _) = post_json(&client, "/api/logout", json!({}));
        assert_eq!(status, Status::Ok);
        let (status, _) = post_json(
            &client,
            "/api/admin/events",
            json!({"event_name": "Late", "sheet_link": "https://docs.google.com/spreadsheets/d/x/edit"}),
        );
        assert_eq!(status, Status::Unauthorized);
    }

    #[test_log::test]
    fn test_get_event() {
        let client = client();
        let (status, body) = get_json(&client, "/api/events/gala");
        assert_eq!(status, Status::Ok);
        assert_eq!(body["attendance_name"], json!("Attendance"));

        let (status, body) = get_json(&client, "/api/events/unknown");
        assert_eq!(status, Status::NotFound);
        assert_eq!(body["error"], json!("not_found"));
    }

    #[test_log::test]
    fn test_qrcode_rejects_bad_requests_before_fetching() {
        let client = client();
        let (status, body) = get_json(&client, "/api/qrcode?size=300");
        assert_eq!(status, Status::BadRequest);
        assert_eq!(body["message"], json!("Missing `data` query param"));

        let (status, _) = get_json(&client, "/api/qrcode?data=x&size=300x200");
        assert_eq!(status, Status::BadRequest);

        let (status, _) = post_json(&client, "/api/qrcode", json!({"size": "300"}));
        assert_eq!(status, Status::BadRequest);

        let response = client
            .post("/api/qrcode")
            .header(ContentType::Plain)
            .body("data=x")
            .dispatch();
        assert_eq!(response.status(), Status::UnsupportedMediaType);
    }

    #[test_log::test]
    fn test_metrics_and_catchers() {
        let client = client();
        let response = client.get("/metrics").dispatch();
        assert_eq!(response.status(), Status::Ok);

        let (status, body) = get_json(&client, "/api/nowhere");
        assert_eq!(status, Status::NotFound);
        assert_eq!(body["error"], json!("not_found"));
    }
}
