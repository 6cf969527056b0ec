//! Event definitions: which spreadsheet and tabs a scanner page works against.
//!
//! Events live in an `attendance_events` table behind a PostgREST endpoint.

use crate::a1::extract_sheet_id;
use crate::error::{CheckinError, Result, require};
use crate::lookup::DEFAULT_CODE_COLUMN;
use async_trait::async_trait;
use chrono::Utc;
use log::{debug, info};
use reqwest::{Client, Response};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

pub const EVENTS_TABLE: &str = "attendance_events";
pub const DEFAULT_DIRECTORY_SHEET: &str = "RSVP";
pub const DEFAULT_ATTENDANCE_SHEET: &str = "ATTENDANCE";
pub const DEFAULT_SCANNED_INFO: &str = "Name,Mobile Number";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    pub id: String,
    pub event_name: String,
    #[serde(default)]
    pub sheet_link: Option<String>,
    #[serde(rename = "RSVP", default)]
    pub rsvp: bool,
    #[serde(default)]
    pub scanned_info: Option<String>,
    #[serde(default)]
    pub db_name: Option<String>,
    #[serde(default)]
    pub rsvp_name: Option<String>,
    #[serde(default)]
    pub attendance_name: Option<String>,
    #[serde(default)]
    pub code_column: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
}

fn or_default(value: &Option<String>, default: &'static str) -> String {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .unwrap_or(default)
        .to_string()
}

impl EventRecord {
    /// Spreadsheet id pulled from the share link; empty when the link has none.
    pub fn spreadsheet_id(&self) -> String {
        self.sheet_link
            .as_deref()
            .and_then(extract_sheet_id)
            .unwrap_or_default()
    }

    /// Tab holding attendee details.
    pub fn directory_sheet(&self) -> String {
        or_default(&self.db_name, DEFAULT_DIRECTORY_SHEET)
    }

    /// Tab scans are recorded in.
    pub fn attendance_sheet(&self) -> String {
        or_default(&self.attendance_name, DEFAULT_ATTENDANCE_SHEET)
    }

    /// Comma-separated columns shown after a scan.
    pub fn scanned_info(&self) -> String {
        or_default(&self.scanned_info, DEFAULT_SCANNED_INFO)
    }

    pub fn code_column(&self) -> String {
        or_default(&self.code_column, DEFAULT_CODE_COLUMN)
    }
}

/// Tickets end in `|<event id>`; a code for another event is rejected at the station.
pub fn code_belongs_to_event(code: &str, event_id: &str) -> bool {
    code.rsplit('|').next() == Some(event_id)
}

/// Fields an organizer supplies when creating an event.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NewEvent {
    pub event_name: Option<String>,
    pub sheet_link: Option<String>,
    #[serde(rename = "RSVP", default)]
    pub rsvp: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scanned_info: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub db_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rsvp_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attendance_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code_column: Option<String>,
}

impl NewEvent {
    /// Require a name and a sheet link that contains a spreadsheet id.
    pub fn validate(&self) -> Result<()> {
        require(self.event_name.as_deref(), "event_name")?;
        let link = require(self.sheet_link.as_deref(), "sheet_link")?;
        if extract_sheet_id(link).is_none() {
            return Err(CheckinError::Invalid(
                "sheet_link does not contain a spreadsheet id".to_string(),
            ));
        }
        Ok(())
    }
}

#[async_trait]
pub trait EventStore: Send + Sync {
    async fn get_event(&self, id: &str) -> Result<Option<EventRecord>>;

    async fn create_event(&self, event: NewEvent) -> Result<EventRecord>;
}

/// Events table reached through a Supabase-style PostgREST endpoint.
pub struct SupabaseEvents {
    http: Client,
    base_url: String,
    api_key: String,
}

impl SupabaseEvents {
    pub fn new(base_url: &str, api_key: &str) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(crate::CLIENT_REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|e| CheckinError::Config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        })
    }

    fn table_url(&self) -> String {
        format!("{}/rest/v1/{EVENTS_TABLE}", self.base_url)
    }

    async fn rows(response: Response) -> Result<Vec<EventRecord>> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CheckinError::upstream(format!(
                "events table returned {status}: {body}"
            )));
        }
        Ok(response.json().await?)
    }
}

#[async_trait]
impl EventStore for SupabaseEvents {
    async fn get_event(&self, id: &str) -> Result<Option<EventRecord>> {
        let response = self
            .http
            .get(self.table_url())
            .query(&[("id", format!("eq.{id}")), ("select", "*".to_string())])
            .header("apikey", &self.api_key)
            .bearer_auth(&self.api_key)
            .send()
            .await?;
        let rows = Self::rows(response).await?;
        debug!("Event lookup for {id} returned {} rows", rows.len());
        Ok(rows.into_iter().next())
    }

    async fn create_event(&self, event: NewEvent) -> Result<EventRecord> {
        event.validate()?;
        let response = self
            .http
            .post(self.table_url())
            .header("apikey", &self.api_key)
            .header("Prefer", "return=representation")
            .bearer_auth(&self.api_key)
            .json(&event)
            .send()
            .await?;
        let created = Self::rows(response)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| CheckinError::upstream("insert returned no rows"))?;
        info!("Created event {} ({})", created.id, created.event_name);
        Ok(created)
    }
}

/// Events kept in process memory.
#[derive(Debug, Default)]
pub struct MemoryEvents {
    events: Mutex<HashMap<String, EventRecord>>,
}

impl MemoryEvents {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, event: EventRecord) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(event.id.clone(), event);
    }
}

#[async_trait]
impl EventStore for MemoryEvents {
    async fn get_event(&self, id: &str) -> Result<Option<EventRecord>> {
        Ok(self
            .events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned())
    }

    async fn create_event(&self, event: NewEvent) -> Result<EventRecord> {
        event.validate()?;
        let record = EventRecord {
            id: uuid::Uuid::new_v4().to_string(),
            event_name: event.event_name.unwrap_or_default().trim().to_string(),
            sheet_link: event.sheet_link,
            rsvp: event.rsvp,
            scanned_info: event.scanned_info,
            db_name: event.db_name,
            rsvp_name: event.rsvp_name,
            attendance_name: event.attendance_name,
            code_column: event.code_column,
            created_at: Some(Utc::now().to_rfc3339()),
        };
        self.insert(record.clone());
        Ok(record)
    }
}
