//! Blocking calls from a scanning station to the check-in server.

use crate::attendance::ScanRecord;
use crate::events::EventRecord;
use crate::{CLIENT_REQUEST_TIMEOUT_SECS, ScanBody, UserLookupBody};
use anyhow::{Context, Result, anyhow};
use log::warn;
use reqwest::StatusCode;
use reqwest::blocking::{Client, Response};
use serde_json::Value;
use std::{thread, time::Duration};

/// How a request may be repeated after a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Delivery {
    /// Reads: repeat on network errors and 5xx responses.
    Repeatable,
    /// Writes: repeat only when no connection was made, so the server never saw the request.
    AtMostOnce,
}

impl Delivery {
    fn retries_error(self, e: &reqwest::Error) -> bool {
        match self {
            Delivery::Repeatable => e.is_timeout() || e.is_connect() || e.is_request(),
            Delivery::AtMostOnce => e.is_connect(),
        }
    }

    fn retries_status(self, status: StatusCode) -> bool {
        self == Delivery::Repeatable && status.is_server_error()
    }
}

fn error_kind(e: &reqwest::Error) -> &'static str {
    if e.is_connect() {
        "connection"
    } else if e.is_timeout() {
        "timeout"
    } else if e.is_request() {
        "request/DNS"
    } else if e.is_body() {
        "body"
    } else if e.is_decode() {
        "decode"
    } else {
        "unknown"
    }
}

/// Seconds to wait before the next attempt.
fn backoff_secs(attempts: u32) -> u64 {
    2_u64.pow(attempts.saturating_sub(1))
}

/// Send a request up to `max_attempts` times as `delivery` allows, then hand the
/// response to `handle`. Responses that are not retried go to `handle` as they are.
fn send_with_retries<F, H, T>(delivery: Delivery, max_attempts: u32, send: F, handle: H) -> Result<T>
where
    F: Fn() -> Result<Response, reqwest::Error>,
    H: FnOnce(Response) -> Result<T>,
{
    let mut attempts = 0;

    loop {
        attempts += 1;

        let failure = match send() {
            Ok(response) if delivery.retries_status(response.status()) => {
                let status = response.status();
                format!("Server error ({status} {})", response.text().unwrap_or_default())
            }
            Ok(response) => return handle(response),
            Err(e) if delivery.retries_error(&e) => format!("Network error ({}): {e}", error_kind(&e)),
            Err(e) => return Err(anyhow!("Network error ({}): {e}", error_kind(&e))),
        };

        if attempts >= max_attempts {
            return Err(anyhow!("{failure}, giving up after {attempts} attempts"));
        }
        let sleep_secs = backoff_secs(attempts);
        warn!("{failure}, retrying in {sleep_secs} seconds... (attempt {attempts}/{max_attempts})");
        thread::sleep(Duration::from_secs(sleep_secs));
    }
}

fn http_client() -> Result<Client> {
    Client::builder()
        .timeout(Duration::from_secs(CLIENT_REQUEST_TIMEOUT_SECS))
        .build()
        .context("Failed to build HTTP client")
}

/// Turn a 4xx response into an error carrying the server's message.
fn client_error(response: Response) -> anyhow::Error {
    let status = response.status();
    let body = response.text().unwrap_or_default();
    let message = serde_json::from_str::<Value>(&body)
        .ok()
        .and_then(|v| v.get("message").and_then(Value::as_str).map(str::to_string))
        .unwrap_or(body);
    anyhow!("Server returned an error ({status}): {message}")
}

/// Fetch an event definition.
///
/// # Errors
///
/// Returns an error if the event does not exist, the server keeps failing,
/// or the response cannot be deserialized.
pub fn get_event_from_server(api_base: &str, event_id: &str, max_retries: u32) -> Result<EventRecord> {
    let client = http_client()?;
    let url = format!("{api_base}/api/events/{event_id}");

    send_with_retries(
        Delivery::Repeatable,
        max_retries,
        || client.get(&url).send(),
        |response| {
            if !response.status().is_success() {
                return Err(client_error(response));
            }
            response
                .json::<EventRecord>()
                .context("Failed to deserialize event")
        },
    )
}

/// Look up the attendee rows for a code. Returns `None` when no row matches.
///
/// # Errors
///
/// Returns an error for any failure other than "not found".
pub fn lookup_user_on_server(
    api_base: &str,
    body: &UserLookupBody,
    max_retries: u32,
) -> Result<Option<Value>> {
    let client = http_client()?;
    let url = format!("{api_base}/api/newUser");

    // a lookup only reads the sheet, so it is safe to repeat
    send_with_retries(
        Delivery::Repeatable,
        max_retries,
        || client.post(&url).json(body).send(),
        |response| match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            s if s.is_success() => response
                .json::<Value>()
                .map(Some)
                .context("Failed to deserialize lookup response"),
            _ => Err(client_error(response)),
        },
    )
}

/// Record a scan and return the server's verdict.
///
/// Every scan appends a row, so the request is only repeated when the server
/// could not be reached at all. A 5xx or a timeout is reported, not retried:
/// the row may already be written and a second attempt would come back as a
/// duplicate.
///
/// # Errors
///
/// Returns an error if the server rejects the scan, fails, or cannot be reached.
pub fn submit_scan_to_server(api_base: &str, body: &ScanBody, max_retries: u32) -> Result<ScanRecord> {
    let client = http_client()?;
    let url = format!("{api_base}/api/newScan");

    send_with_retries(
        Delivery::AtMostOnce,
        max_retries,
        || client.post(&url).json(body).send(),
        |response| {
            if !response.status().is_success() {
                return Err(client_error(response));
            }
            response
                .json::<ScanRecord>()
                .context("Failed to deserialize scan result")
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{BufRead, BufReader, Read, Write};
    use std::net::{TcpListener, TcpStream};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn read_request(stream: &mut TcpStream) {
        let mut reader = BufReader::new(stream);
        let mut content_length = 0;
        loop {
            let mut line = String::new();
            reader.read_line(&mut line).unwrap();
            if line.is_empty() || line == "\r\n" {
                break;
            }
            if let Some((name, value)) = line.split_once(':') {
                if name.eq_ignore_ascii_case("content-length") {
                    content_length = value.trim().parse().unwrap();
                }
            }
        }
        let mut body = vec![0; content_length];
        reader.read_exact(&mut body).unwrap();
    }

    /// Answer one connection per scripted response, in order, counting the requests served.
    fn scripted_server(responses: Vec<(u16, &'static str)>) -> (String, Arc<AtomicUsize>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        let served = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&served);

        thread::spawn(move || {
            for (stream, (status, body)) in listener.incoming().zip(responses) {
                let mut stream = stream.unwrap();
                read_request(&mut stream);
                counter.fetch_add(1, Ordering::SeqCst);
                let reason = if status == 200 { "OK" } else { "Bad Gateway" };
                let response = format!(
                    "HTTP/1.1 {status} {reason}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                    body.len()
                );
                stream.write_all(response.as_bytes()).unwrap();
            }
        });
        (base, served)
    }

    fn scan(code: &str) -> ScanBody {
        ScanBody {
            code: Some(code.to_string()),
            ..ScanBody::default()
        }
    }

    #[test]
    fn test_backoff_doubles() {
        assert_eq!(backoff_secs(1), 1);
        assert_eq!(backoff_secs(2), 2);
        assert_eq!(backoff_secs(4), 8);
    }

    #[test]
    fn test_writes_never_repeat_on_server_errors() {
        assert!(Delivery::Repeatable.retries_status(StatusCode::BAD_GATEWAY));
        assert!(!Delivery::AtMostOnce.retries_status(StatusCode::BAD_GATEWAY));
        assert!(!Delivery::Repeatable.retries_status(StatusCode::NOT_FOUND));
    }

    #[test_log::test]
    fn test_unreachable_server_gives_up() {
        // nothing listens on port 9 of the loopback interface
        let err = get_event_from_server("http://127.0.0.1:9", "e1", 1).unwrap_err();
        assert!(err.to_string().starts_with("Network error"));
    }

    #[test_log::test]
    fn test_scan_is_retried_when_never_delivered() {
        let err = submit_scan_to_server("http://127.0.0.1:9", &scan("A-1|gala"), 2).unwrap_err();
        assert!(err.to_string().contains("giving up after 2 attempts"), "{err}");
    }

    #[test_log::test]
    fn test_scan_is_sent_once_after_server_error() {
        let (base, served) = scripted_server(vec![
            (502, r#"{"error":"BadGateway","message":"proxy hiccup"}"#),
            (
                200,
                r#"{"success":true,"duplicate":true,"message":"Already scanned","timestamp":"10/18/2026, 9:00:00 AM"}"#,
            ),
        ]);

        let err = submit_scan_to_server(&base, &scan("A-1|gala"), 3).unwrap_err();
        assert!(err.to_string().contains("502"), "{err}");
        assert!(err.to_string().contains("proxy hiccup"), "{err}");
        assert_eq!(served.load(Ordering::SeqCst), 1);
    }

    #[test_log::test]
    fn test_lookup_is_repeated_after_server_error() {
        let (base, served) = scripted_server(vec![
            (502, ""),
            (200, r#"{"Name":"Ada","code":"A-1|gala"}"#),
        ]);
        let body = UserLookupBody {
            code: Some("A-1|gala".to_string()),
            ..UserLookupBody::default()
        };

        let found = lookup_user_on_server(&base, &body, 3).unwrap().unwrap();
        assert_eq!(found["Name"], "Ada");
        assert_eq!(served.load(Ordering::SeqCst), 2);
    }
}
