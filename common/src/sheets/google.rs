//! Google Sheets v4 backend authenticated as a service account.

use super::{Row, SheetStore, ValueRange};
use crate::error::{CheckinError, Result};
use async_trait::async_trait;
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use log::{debug, warn};
use reqwest::{Client, Response, Url};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use tokio::sync::Mutex;

const SHEETS_API_BASE: &str = "https://sheets.googleapis.com/v4/spreadsheets";
const TOKEN_URI: &str = "https://oauth2.googleapis.com/token";
const SCOPE: &str = "https://www.googleapis.com/auth/spreadsheets";
const TOKEN_LIFETIME_SECS: u64 = 3600;
/// Refresh the access token when it has less than this long left.
const TOKEN_REFRESH_MARGIN: Duration = Duration::from_secs(60);
const REQUEST_TIMEOUT_SECS: u64 = 15;

/// Credentials of the service account the spreadsheet is shared with.
#[derive(Clone)]
pub struct ServiceAccount {
    pub client_email: String,
    /// PEM-encoded RSA private key.
    pub private_key: String,
}

impl std::fmt::Debug for ServiceAccount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceAccount")
            .field("client_email", &self.client_email)
            .field("private_key", &"<redacted>")
            .finish()
    }
}

#[derive(Serialize)]
struct Claims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: u64,
    exp: u64,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: Option<u64>,
}

struct CachedToken {
    token: String,
    expires_at: Instant,
}

#[derive(Deserialize)]
struct SpreadsheetMeta {
    #[serde(default)]
    sheets: Vec<SheetMeta>,
}

#[derive(Deserialize)]
struct SheetMeta {
    properties: SheetProperties,
}

#[derive(Deserialize)]
struct SheetProperties {
    title: String,
}

#[derive(Deserialize)]
struct ValuesResponse {
    #[serde(default)]
    values: Vec<Vec<Value>>,
}

pub struct GoogleSheets {
    http: Client,
    account: ServiceAccount,
    encoding_key: EncodingKey,
    token: Mutex<Option<CachedToken>>,
}

impl GoogleSheets {
    pub fn new(account: ServiceAccount) -> Result<Self> {
        let encoding_key = EncodingKey::from_rsa_pem(account.private_key.as_bytes())
            .map_err(|e| CheckinError::Config(format!("invalid service account key: {e}")))?;
        let http = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|e| CheckinError::Config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            http,
            account,
            encoding_key,
            token: Mutex::new(None),
        })
    }

    /// Return a cached access token, exchanging a fresh signed assertion when needed.
    async fn access_token(&self) -> Result<String> {
        let mut cached = self.token.lock().await;
        if let Some(token) = cached.as_ref() {
            if token.expires_at > Instant::now() + TOKEN_REFRESH_MARGIN {
                return Ok(token.token.clone());
            }
        }

        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|e| CheckinError::upstream(e.to_string()))?
            .as_secs();
        let claims = Claims {
            iss: &self.account.client_email,
            scope: SCOPE,
            aud: TOKEN_URI,
            iat: now,
            exp: now + TOKEN_LIFETIME_SECS,
        };
        let assertion =
            jsonwebtoken::encode(&Header::new(Algorithm::RS256), &claims, &self.encoding_key)
                .map_err(|e| CheckinError::Config(format!("failed to sign token request: {e}")))?;

        let response = self
            .http
            .post(TOKEN_URI)
            .form(&[
                ("grant_type", "urn:ietf:params:oauth:grant-type:jwt-bearer"),
                ("assertion", assertion.as_str()),
            ])
            .send()
            .await?;
        let token: TokenResponse = check_status(response, "token exchange").await?.json().await?;

        let lifetime = token.expires_in.unwrap_or(TOKEN_LIFETIME_SECS);
        debug!("Obtained spreadsheet access token valid for {lifetime}s");
        let value = token.access_token.clone();
        *cached = Some(CachedToken {
            token: token.access_token,
            expires_at: Instant::now() + Duration::from_secs(lifetime),
        });
        Ok(value)
    }

    fn spreadsheet_url(&self, spreadsheet_id: &str, segments: &[&str]) -> Result<Url> {
        let mut url = Url::parse(SHEETS_API_BASE)
            .map_err(|e| CheckinError::Config(format!("bad API base: {e}")))?;
        url.path_segments_mut()
            .map_err(|()| CheckinError::Config("API base cannot hold a path".to_string()))?
            .push(spreadsheet_id)
            .extend(segments);
        Ok(url)
    }
}

/// Pass successful responses through; turn anything else into an upstream error with the body.
async fn check_status(response: Response, what: &str) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    warn!("Spreadsheet {what} failed with {status}");
    Err(CheckinError::upstream(format!("{what} failed ({status}): {body}")))
}

/// Render a JSON cell the way the sheet would display it.
fn cell_to_string(value: Value) -> String {
    match value {
        Value::String(s) => s,
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

#[async_trait]
impl SheetStore for GoogleSheets {
    async fn sheet_titles(&self, spreadsheet_id: &str) -> Result<Vec<String>> {
        let token = self.access_token().await?;
        let mut url = self.spreadsheet_url(spreadsheet_id, &[])?;
        url.query_pairs_mut()
            .append_pair("fields", "sheets.properties.title");

        let response = self.http.get(url).bearer_auth(token).send().await?;
        let meta: SpreadsheetMeta = check_status(response, "metadata read")
            .await?
            .json()
            .await?;
        Ok(meta.sheets.into_iter().map(|s| s.properties.title).collect())
    }

    async fn get_values(&self, spreadsheet_id: &str, range: &str) -> Result<Vec<Row>> {
        let token = self.access_token().await?;
        let url = self.spreadsheet_url(spreadsheet_id, &["values", range])?;

        let response = self.http.get(url).bearer_auth(token).send().await?;
        let values: ValuesResponse = check_status(response, "values read").await?.json().await?;
        Ok(values
            .values
            .into_iter()
            .map(|row| row.into_iter().map(cell_to_string).collect())
            .collect())
    }

    async fn append_row(&self, spreadsheet_id: &str, range: &str, row: Row) -> Result<()> {
        let token = self.access_token().await?;
        let append = format!("{range}:append");
        let mut url = self.spreadsheet_url(spreadsheet_id, &["values", &append])?;
        url.query_pairs_mut()
            .append_pair("valueInputOption", "USER_ENTERED")
            .append_pair("insertDataOption", "INSERT_ROWS");

        let response = self
            .http
            .post(url)
            .bearer_auth(token)
            .json(&json!({ "values": [row] }))
            .send()
            .await?;
        check_status(response, "append").await?;
        Ok(())
    }

    async fn batch_update(&self, spreadsheet_id: &str, data: Vec<ValueRange>) -> Result<()> {
        let token = self.access_token().await?;
        let url = self.spreadsheet_url(spreadsheet_id, &["values:batchUpdate"])?;

        let response = self
            .http
            .post(url)
            .bearer_auth(token)
            .json(&json!({ "valueInputOption": "USER_ENTERED", "data": data }))
            .send()
            .await?;
        check_status(response, "batch update").await?;
        Ok(())
    }
}
