//! Shared state handed to every route.

use ab_glyph::FontArc;
use checkin_common::config::{AppConfig, EventsBackend, SheetsBackend};
use checkin_common::error::{CheckinError, Result};
use checkin_common::events::{EventStore, MemoryEvents, SupabaseEvents};
use checkin_common::sheets::{GoogleSheets, MemorySheets, SheetStore};
use std::sync::Arc;
use std::time::Duration;

const QR_REQUEST_TIMEOUT_SECS: u64 = 15;

pub struct AppState {
    pub config: AppConfig,
    pub sheets: Arc<dyn SheetStore>,
    pub events: Arc<dyn EventStore>,
    /// Client for the QR rendering service.
    pub http: reqwest::Client,
    pub watermark_font: Option<FontArc>,
}

impl AppState {
    /// Connect the configured backends.
    pub fn from_config(config: AppConfig) -> Result<Self> {
        let sheets: Arc<dyn SheetStore> = match config.sheets_backend {
            SheetsBackend::Google => {
                let account = config.service_account.clone().ok_or_else(|| {
                    CheckinError::Config("missing Google service account".to_string())
                })?;
                Arc::new(GoogleSheets::new(account)?)
            }
            SheetsBackend::Memory => {
                tracing::warn!("Using in-memory sheets, nothing will be persisted");
                Arc::new(MemorySheets::new())
            }
        };

        let events: Arc<dyn EventStore> = match config.events_backend {
            EventsBackend::Supabase => {
                let (Some(url), Some(key)) = (&config.supabase_url, &config.supabase_key) else {
                    return Err(CheckinError::Config(
                        "missing Supabase URL or key".to_string(),
                    ));
                };
                Arc::new(SupabaseEvents::new(url, key)?)
            }
            EventsBackend::Memory => Arc::new(MemoryEvents::new()),
        };

        Self::with_stores(config, sheets, events)
    }

    /// Build state around existing stores.
    pub fn with_stores(
        config: AppConfig,
        sheets: Arc<dyn SheetStore>,
        events: Arc<dyn EventStore>,
    ) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(QR_REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|e| CheckinError::Config(format!("failed to build HTTP client: {e}")))?;
        let watermark_font = load_font(&config);

        Ok(Self {
            config,
            sheets,
            events,
            http,
            watermark_font,
        })
    }

    /// Spreadsheet for RSVPs and phone lookups.
    pub fn sheet_id(&self) -> Result<&str> {
        self.config
            .sheet_id
            .as_deref()
            .ok_or_else(|| CheckinError::Config("SHEET_ID is not set".to_string()))
    }

    /// Spreadsheet holding the donor addresses.
    pub fn address_sheet_id(&self) -> Result<&str> {
        self.config
            .address_sheet_id
            .as_deref()
            .ok_or_else(|| CheckinError::Config("ADDRESS_SHEET_ID is not set".to_string()))
    }
}

/// Read the watermark font. A missing or unreadable font disables watermarks
/// rather than stopping the server.
fn load_font(config: &AppConfig) -> Option<FontArc> {
    let Some(path) = &config.qr_watermark_font else {
        tracing::warn!("QR_WATERMARK_FONT is not set, QR watermarks are disabled");
        return None;
    };
    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "Could not read watermark font");
            return None;
        }
    };
    match FontArc::try_from_vec(bytes) {
        Ok(font) => Some(font),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "Watermark font is not a valid font");
            None
        }
    }
}
