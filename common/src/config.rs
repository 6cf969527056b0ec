//! Server configuration read from the environment (and `.env`, if present).

use crate::attendance::DuplicatePolicy;
use crate::error::{CheckinError, Result};
use crate::qr::DEFAULT_UPSTREAM_URL;
use crate::sheets::ServiceAccount;
use crate::DEFAULT_UTC_OFFSET_HOURS;
use chrono::{FixedOffset, Offset, Utc};
use clap::ValueEnum;
use log::{debug, warn};
use std::path::PathBuf;

pub const DEFAULT_RSVP_SHEET: &str = "RSVP";
pub const DEFAULT_DATABASE_SHEET: &str = "RSVP";
pub const DEFAULT_DONOR_SHEET: &str = "SEND";

/// Where spreadsheet reads and writes go.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default, ValueEnum)]
pub enum SheetsBackend {
    #[default]
    Google,
    Memory,
}

/// Where event definitions are stored.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default, ValueEnum)]
pub enum EventsBackend {
    #[default]
    Supabase,
    Memory,
}

#[derive(Clone)]
pub struct AppConfig {
    pub sheets_backend: SheetsBackend,
    pub service_account: Option<ServiceAccount>,
    /// Default spreadsheet for scans, RSVPs and phone lookups.
    pub sheet_id: Option<String>,
    pub attendance_sheet_name: Option<String>,
    pub rsvp_sheet_name: String,
    pub database_sheet_name: String,
    pub address_sheet_id: Option<String>,
    pub donor_sheet_name: String,
    pub access_password: Option<String>,
    pub events_backend: EventsBackend,
    pub supabase_url: Option<String>,
    pub supabase_key: Option<String>,
    pub qr_upstream_url: String,
    pub qr_watermark_font: Option<PathBuf>,
    pub utc_offset_hours: i32,
    pub duplicate_policy: DuplicatePolicy,
    pub cookie_secure: bool,
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let redact = |v: &Option<String>| v.as_ref().map(|_| "<redacted>");
        f.debug_struct("AppConfig")
            .field("sheets_backend", &self.sheets_backend)
            .field("service_account", &self.service_account)
            .field("sheet_id", &self.sheet_id)
            .field("attendance_sheet_name", &self.attendance_sheet_name)
            .field("rsvp_sheet_name", &self.rsvp_sheet_name)
            .field("database_sheet_name", &self.database_sheet_name)
            .field("address_sheet_id", &self.address_sheet_id)
            .field("donor_sheet_name", &self.donor_sheet_name)
            .field("access_password", &redact(&self.access_password))
            .field("events_backend", &self.events_backend)
            .field("supabase_url", &self.supabase_url)
            .field("supabase_key", &redact(&self.supabase_key))
            .field("qr_upstream_url", &self.qr_upstream_url)
            .field("qr_watermark_font", &self.qr_watermark_font)
            .field("utc_offset_hours", &self.utc_offset_hours)
            .field("duplicate_policy", &self.duplicate_policy)
            .field("cookie_secure", &self.cookie_secure)
            .finish()
    }
}

impl Default for AppConfig {
    /// In-memory backends and every other setting at its default.
    fn default() -> Self {
        Self {
            sheets_backend: SheetsBackend::Memory,
            service_account: None,
            sheet_id: None,
            attendance_sheet_name: None,
            rsvp_sheet_name: DEFAULT_RSVP_SHEET.to_string(),
            database_sheet_name: DEFAULT_DATABASE_SHEET.to_string(),
            address_sheet_id: None,
            donor_sheet_name: DEFAULT_DONOR_SHEET.to_string(),
            access_password: None,
            events_backend: EventsBackend::Memory,
            supabase_url: None,
            supabase_key: None,
            qr_upstream_url: DEFAULT_UPSTREAM_URL.to_string(),
            qr_watermark_font: None,
            utc_offset_hours: DEFAULT_UTC_OFFSET_HOURS,
            duplicate_policy: DuplicatePolicy::default(),
            cookie_secure: false,
        }
    }
}

fn parse_enum<T: ValueEnum>(name: &str, value: Option<String>) -> Result<Option<T>> {
    value
        .map(|v| {
            T::from_str(&v, true)
                .map_err(|_| CheckinError::Config(format!("{name} has unsupported value \"{v}\"")))
        })
        .transpose()
}

fn parse_bool(name: &str, value: Option<String>) -> Result<bool> {
    match value.as_deref().map(str::to_lowercase).as_deref() {
        None | Some("0" | "false" | "no") => Ok(false),
        Some("1" | "true" | "yes") => Ok(true),
        Some(other) => Err(CheckinError::Config(format!(
            "{name} must be true or false, got \"{other}\""
        ))),
    }
}

impl AppConfig {
    /// Load `.env` if there is one, then read the process environment.
    pub fn from_env() -> Result<Self> {
        match dotenvy::dotenv() {
            Ok(path) => debug!("Loaded environment from {}", path.display()),
            Err(e) if e.not_found() => {}
            Err(e) => warn!("Ignoring unreadable .env file: {e}"),
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from an arbitrary variable source. Blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let defaults = Self::default();

        let sheets_backend =
            parse_enum("SHEETS_BACKEND", var("SHEETS_BACKEND"))?.unwrap_or(SheetsBackend::Google);
        let service_account = match (var("GOOGLE_SERVICE_EMAIL"), var("GOOGLE_PRIVATE_KEY")) {
            (Some(client_email), Some(key)) => Some(ServiceAccount {
                client_email,
                // keys pasted into a single-line variable carry literal \n
                private_key: key.replace("\\n", "\n"),
            }),
            _ => None,
        };
        if sheets_backend == SheetsBackend::Google && service_account.is_none() {
            return Err(CheckinError::Config(
                "GOOGLE_SERVICE_EMAIL and GOOGLE_PRIVATE_KEY are required for the google sheets backend"
                    .to_string(),
            ));
        }

        let events_backend =
            parse_enum("EVENTS_BACKEND", var("EVENTS_BACKEND"))?.unwrap_or(EventsBackend::Supabase);
        let supabase_url = var("SUPABASE_URL");
        let supabase_key = var("SUPABASE_KEY");
        if events_backend == EventsBackend::Supabase
            && (supabase_url.is_none() || supabase_key.is_none())
        {
            return Err(CheckinError::Config(
                "SUPABASE_URL and SUPABASE_KEY are required for the supabase events backend"
                    .to_string(),
            ));
        }

        let utc_offset_hours = match var("LOCAL_UTC_OFFSET_HOURS") {
            None => defaults.utc_offset_hours,
            Some(v) => v
                .parse::<i32>()
                .ok()
                .filter(|h| (-12..=14).contains(h))
                .ok_or_else(|| {
                    CheckinError::Config(format!(
                        "LOCAL_UTC_OFFSET_HOURS must be a whole number of hours between -12 and 14, got \"{v}\""
                    ))
                })?,
        };

        let access_password = var("ACCESS_PASSWORD");
        if access_password.is_none() {
            warn!("ACCESS_PASSWORD is not set, organizer login is disabled");
        }

        Ok(Self {
            sheets_backend,
            service_account,
            sheet_id: var("SHEET_ID"),
            attendance_sheet_name: var("ATTENDANCE_SHEET_NAME"),
            rsvp_sheet_name: var("RSVP_SHEET_NAME").unwrap_or(defaults.rsvp_sheet_name),
            database_sheet_name: var("DATABASE_SHEET_NAME").unwrap_or(defaults.database_sheet_name),
            address_sheet_id: var("ADDRESS_SHEET_ID"),
            donor_sheet_name: var("DONOR_SHEET_NAME").unwrap_or(defaults.donor_sheet_name),
            access_password,
            events_backend,
            supabase_url,
            supabase_key,
            qr_upstream_url: var("QR_UPSTREAM_URL").unwrap_or(defaults.qr_upstream_url),
            qr_watermark_font: var("QR_WATERMARK_FONT").map(PathBuf::from),
            utc_offset_hours,
            duplicate_policy: parse_enum("DUPLICATE_POLICY", var("DUPLICATE_POLICY"))?
                .unwrap_or(defaults.duplicate_policy),
            cookie_secure: parse_bool("COOKIE_SECURE", var("COOKIE_SECURE"))?,
        })
    }

    /// Offset sheet timestamps are written in.
    pub fn utc_offset(&self) -> FixedOffset {
        // from_lookup keeps the hours in range; hand-built configs fall back to UTC
        FixedOffset::east_opt(self.utc_offset_hours * 3600).unwrap_or_else(|| Utc.fix())
    }
}
