//! A library with common utilities for spreadsheet-backed event check-in.

pub mod a1;
pub mod address;
pub mod attendance;
pub mod client_api;
pub mod config;
pub mod error;
pub mod events;
pub mod lookup;
pub mod qr;
pub mod rsvp;
pub mod sheets;

use chrono::{DateTime, FixedOffset, Utc};
use serde::{Deserialize, Serialize};

pub const CLIENT_VERSION: &str = env!("CARGO_PKG_VERSION");
pub const CLIENT_REQUEST_TIMEOUT_SECS: u64 = 15;

/// Offset used for sheet timestamps when none is configured (Singapore, UTC+8).
pub const DEFAULT_UTC_OFFSET_HOURS: i32 = 8;

/// Format a timestamp the way the sheets store it: US locale wall-clock time,
/// e.g. `10/18/2026, 3:04:05 PM`.
pub fn format_sheet_timestamp(time: DateTime<FixedOffset>) -> String {
    time.format("%-m/%-d/%Y, %-I:%M:%S %p").to_string()
}

/// The current time at the given offset.
pub fn local_now(offset: FixedOffset) -> DateTime<FixedOffset> {
    Utc::now().with_timezone(&offset)
}

/// Body of a scan submission. Field names match what the scanner pages send.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ScanBody {
    pub code: Option<String>,
    #[serde(rename = "SHEET_ID", skip_serializing_if = "Option::is_none")]
    pub sheet_id: Option<String>,
    #[serde(rename = "SHEET_NAME", skip_serializing_if = "Option::is_none")]
    pub sheet_name: Option<String>,
}

/// Body of a header-mapped attendee lookup.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct UserLookupBody {
    pub code: Option<String>,
    #[serde(rename = "SHEET_ID")]
    pub sheet_id: Option<String>,
    #[serde(rename = "SHEET_NAME")]
    pub sheet_name: Option<String>,
    /// Comma-separated header names to return.
    pub scanned_info: Option<String>,
    pub code_column: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_format_sheet_timestamp() {
        let offset = FixedOffset::east_opt(8 * 3600).unwrap();
        let time = offset.with_ymd_and_hms(2026, 10, 18, 15, 4, 5).unwrap();
        assert_eq!(format_sheet_timestamp(time), "10/18/2026, 3:04:05 PM");

        let morning = offset.with_ymd_and_hms(2026, 1, 2, 0, 30, 0).unwrap();
        assert_eq!(format_sheet_timestamp(morning), "1/2/2026, 12:30:00 AM");
    }

    #[test]
    fn test_scan_body_uses_page_field_names() {
        let body: ScanBody =
            serde_json::from_str(r#"{"code":"X1","SHEET_ID":"abc","SHEET_NAME":"ATTENDANCE"}"#)
                .unwrap();
        assert_eq!(body.sheet_id.as_deref(), Some("abc"));
        assert_eq!(body.sheet_name.as_deref(), Some("ATTENDANCE"));

        let minimal = serde_json::to_string(&ScanBody {
            code: Some("X1".into()),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(minimal, r#"{"code":"X1"}"#);
    }
}
