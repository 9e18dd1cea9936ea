//! MTD Error Types
//!
//! Error hierarchy for the HMRC connection flows.

use std::time::Duration;
use thiserror::Error;

use crate::types::{ApiId, CloseReason, TrackerId};

/// Root error type for the MTD integration.
#[derive(Error, Debug)]
pub enum MtdError {
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    #[error("Authorization error: {0}")]
    Authorization(#[from] AuthorizationError),

    #[error("Request tracker error: {0}")]
    Tracker(#[from] TrackerError),

    #[error("Network error: {0}")]
    Network(#[from] NetworkError),

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

impl MtdError {
    /// Get error code for telemetry.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Configuration(_) => "MTD_CONFIG",
            Self::Authorization(_) => "MTD_AUTH",
            Self::Tracker(_) => "MTD_TRACKER",
            Self::Network(_) => "MTD_NETWORK",
            Self::Protocol(_) => "MTD_PROTOCOL",
            Self::Storage(_) => "MTD_STORAGE",
        }
    }
}

/// Configuration error.
#[derive(Error, Debug)]
pub enum ConfigurationError {
    #[error("No HMRC configuration selected")]
    MissingConfiguration,

    #[error("Missing required field: {field}")]
    MissingRequired { field: String },

    #[error("Invalid URL for {field}: {url}")]
    InvalidUrl { field: String, url: String },

    #[error("Environment variable {name} is not set")]
    Environment { name: String },

    #[error("Unknown HMRC endpoint: {name}")]
    UnknownEndpoint { name: String },

    #[error("HTTP client could not be built: {message}")]
    HttpClient { message: String },
}

/// Authorization flow error.
#[derive(Error, Debug)]
pub enum AuthorizationError {
    #[error("An authorisation request for api {api_id} is already in process (opened {age:?} ago)")]
    AuthorizationInProgress { api_id: ApiId, age: Duration },

    #[error("Refresh token was rejected by HMRC")]
    InvalidRefreshToken,

    #[error("No authorisation request is pending for api {api_id}")]
    NoPendingAuthorization { api_id: ApiId },

    #[error("Authorisation was refused: {error}")]
    CallbackDenied {
        error: String,
        error_description: Option<String>,
    },

    #[error("State parameter mismatch on authorisation redirect")]
    StateMismatch,

    #[error("Authorisation redirect did not carry a code")]
    MissingCode,
}

/// Request tracker error.
///
/// `ApiMismatch` signals a caller bug: a tracker was addressed on behalf of
/// an API it does not belong to.
#[derive(Error, Debug)]
pub enum TrackerError {
    #[error("Request tracker {tracker_id} is already open for api {api_id}")]
    AlreadyOpen {
        api_id: ApiId,
        tracker_id: TrackerId,
        age: Duration,
    },

    #[error("Request tracker {tracker_id} not found")]
    NotFound { tracker_id: TrackerId },

    #[error("Request tracker {tracker_id} belongs to api {actual}, not {expected}")]
    ApiMismatch {
        tracker_id: TrackerId,
        expected: ApiId,
        actual: ApiId,
    },

    #[error("Request tracker {tracker_id} was already closed ({reason})")]
    AlreadyClosed {
        tracker_id: TrackerId,
        reason: CloseReason,
    },
}

/// Network/transport error.
#[derive(Error, Debug)]
pub enum NetworkError {
    #[error("Connection failed: {message}")]
    ConnectionFailed { message: String },

    #[error("Request timeout after {timeout:?}")]
    Timeout { timeout: Duration },

    #[error("Response body could not be read: {message}")]
    BodyRead { message: String },

    #[error("Response too large: {size} bytes")]
    ResponseTooLarge { size: usize },
}

/// Protocol/response parsing error.
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("HTTP {status}: {message}")]
    UnexpectedStatus {
        status: u16,
        message: String,
        code: Option<String>,
    },

    #[error("Invalid JSON: {message}")]
    InvalidJson { message: String },
}

/// Storage error.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Read failed: {message}")]
    ReadFailed { message: String },

    #[error("Write failed: {message}")]
    WriteFailed { message: String },

    #[error("Corrupted data: {message}")]
    CorruptedData { message: String },
}

/// Result type for MTD operations.
pub type MtdResult<T> = Result<T, MtdError>;

/// Message and error fields of an HMRC response body.
///
/// The OAuth endpoints answer with `error`/`error_description`, the API
/// endpoints with `code`/`message`.
#[derive(Debug, Clone, Default, serde::Deserialize)]
pub struct HmrcErrorBody {
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub error_description: Option<String>,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

/// Message returned by HMRC when a bearer token is not accepted.
pub const INVALID_CREDENTIALS_MESSAGE: &str = "Invalid Authentication information provided";

/// Message returned by HMRC when a refresh token is not accepted.
pub const BAD_REQUEST_MESSAGE: &str = "Bad Request";

impl HmrcErrorBody {
    /// Human readable message, falling back to `fallback` (the raw body).
    pub fn server_message(&self, fallback: &str) -> String {
        self.error_description
            .clone()
            .or_else(|| self.message.clone())
            .unwrap_or_else(|| fallback.trim().to_string())
    }

    /// Machine readable error code, if any.
    pub fn server_code(&self) -> Option<&str> {
        self.error.as_deref().or(self.code.as_deref())
    }

    /// Whether this body reports a rejected bearer token.
    pub fn is_invalid_credentials(&self) -> bool {
        self.message.as_deref() == Some(INVALID_CREDENTIALS_MESSAGE)
            || self.code.as_deref() == Some("INVALID_CREDENTIALS")
    }

    /// Whether this body reports a rejected refresh grant.
    pub fn is_bad_request(&self) -> bool {
        self.message.as_deref() == Some(BAD_REQUEST_MESSAGE)
            || self.error.as_deref() == Some("invalid_grant")
    }
}

/// Parse message fields from an HTTP body. Unparseable bodies yield an empty set.
pub fn parse_error_body(body: &str) -> HmrcErrorBody {
    serde_json::from_str(body).unwrap_or_default()
}

/// Get user-friendly error message.
pub fn get_user_message(error: &MtdError) -> String {
    match error {
        MtdError::Configuration(ConfigurationError::MissingConfiguration) => {
            "Please select HMRC configuration before continuing!".to_string()
        }
        MtdError::Configuration(ConfigurationError::UnknownEndpoint { .. }) => {
            "Could not connect to HMRC! \nThis is not a valid HMRC service connection".to_string()
        }
        MtdError::Authorization(AuthorizationError::AuthorizationInProgress { .. })
        | MtdError::Tracker(TrackerError::AlreadyOpen { .. }) => {
            "An authorisation request is already in process!!!\nPlease try again later".to_string()
        }
        MtdError::Authorization(AuthorizationError::NoPendingAuthorization { .. })
        | MtdError::Tracker(TrackerError::AlreadyClosed { .. }) => {
            "This authorisation request is no longer pending. Please connect again.".to_string()
        }
        MtdError::Authorization(AuthorizationError::StateMismatch) => {
            "Security validation failed. Please restart the connection.".to_string()
        }
        MtdError::Network(NetworkError::Timeout { .. }) => {
            "The request to HMRC timed out. Please check your connection and try again."
                .to_string()
        }
        _ => "The connection to HMRC failed. Please try again.".to_string(),
    }
}
