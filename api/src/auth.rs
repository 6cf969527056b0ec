//! Organizer login backed by a shared password and an encrypted cookie.

use crate::state::AppState;
use rocket::State;
use rocket::http::{Cookie, CookieJar, SameSite, Status};
use rocket::request::{FromRequest, Outcome, Request};
use rocket::response::status;
use rocket::serde::Deserialize;
use rocket::serde::json::{Json, Value, json};
use rocket::time::Duration;

pub const AUTH_COOKIE: &str = "auth";
const AUTH_VALUE: &str = "1";

#[derive(Debug, Deserialize)]
#[serde(crate = "rocket::serde")]
pub struct LoginBody {
    password: Option<String>,
}

/// Compare without exiting early on the first differing byte.
/// The length of the configured password is not hidden.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// Request guard for organizer-only routes.
pub struct AdminSession;

#[rocket::async_trait]
impl<'r> FromRequest<'r> for AdminSession {
    type Error = ();

    async fn from_request(request: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        match request.cookies().get_private(AUTH_COOKIE) {
            Some(cookie) if cookie.value() == AUTH_VALUE => Outcome::Success(AdminSession),
            _ => Outcome::Error((Status::Unauthorized, ())),
        }
    }
}

#[post("/login", data = "<body>")]
pub fn login(
    body: Json<LoginBody>,
    cookies: &CookieJar<'_>,
    state: &State<AppState>,
) -> Result<Json<Value>, status::Custom<Json<Value>>> {
    let accepted = match (&state.config.access_password, &body.password) {
        (Some(expected), Some(given)) => constant_time_eq(expected.as_bytes(), given.as_bytes()),
        _ => false,
    };
    if !accepted {
        tracing::warn!("Rejected organizer login");
        return Err(status::Custom(
            Status::Unauthorized,
            Json(json!({ "success": false })),
        ));
    }

    let cookie = Cookie::build((AUTH_COOKIE, AUTH_VALUE))
        .http_only(true)
        .secure(state.config.cookie_secure)
        .same_site(SameSite::Strict)
        .path("/")
        .max_age(Duration::days(1));
    cookies.add_private(cookie);
    tracing::info!("Organizer logged in");

    Ok(Json(json!({ "success": true })))
}

#[post("/logout")]
pub fn logout(cookies: &CookieJar<'_>) -> Json<Value> {
    cookies.remove_private(Cookie::build(AUTH_COOKIE).path("/"));
    Json(json!({ "success": true }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constant_time_eq() {
        assert!(constant_time_eq(b"letmein", b"letmein"));
        assert!(!constant_time_eq(b"letmein", b"letmeiN"));
        assert!(!constant_time_eq(b"letmein", b"letme"));
        assert!(constant_time_eq(b"", b""));
    }
}
