//! Error classification shared by the library, the server and the client.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, CheckinError>;

#[derive(Debug, Error)]
pub enum CheckinError {
    /// A required request field was absent or blank.
    #[error("Missing {0}")]
    MissingField(String),

    /// The request was well-formed but its contents were rejected.
    #[error("{0}")]
    Invalid(String),

    #[error("{0}")]
    NotFound(String),

    /// The spreadsheet or database service failed or returned something unexpected.
    #[error("Upstream error: {0}")]
    Upstream(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl CheckinError {
    pub fn upstream(message: impl Into<String>) -> Self {
        CheckinError::Upstream(message.into())
    }
}

impl From<reqwest::Error> for CheckinError {
    fn from(e: reqwest::Error) -> Self {
        CheckinError::Upstream(e.to_string())
    }
}

impl From<serde_json::Error> for CheckinError {
    fn from(e: serde_json::Error) -> Self {
        CheckinError::Upstream(format!("malformed response: {e}"))
    }
}

/// Return the trimmed value, or a `MissingField` error if it is absent or blank.
pub fn require<'a>(value: Option<&'a str>, name: &str) -> Result<&'a str> {
    match value.map(str::trim) {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(CheckinError::MissingField(name.to_string())),
    }
}
