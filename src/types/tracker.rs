//! Request Tracker Types
//!
//! A tracker marks one authorization request in flight for an API.

use base64::Engine;
use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use crate::types::{ApiId, EndpointTarget};

/// Age after which an open tracker no longer blocks a new authorization.
pub const TRACKER_TIMEOUT: Duration = Duration::from_secs(10 * 60);

/// Tracker identifier.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TrackerId(String);

impl TrackerId {
    /// Generate a random identifier.
    pub fn generate() -> Self {
        let bytes: [u8; 16] = rand::thread_rng().gen();
        Self(base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for TrackerId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl fmt::Display for TrackerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Why a tracker was closed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CloseReason {
    /// Superseded after [`TRACKER_TIMEOUT`].
    TimedOut,
    /// The redirect or code exchange completed.
    Response,
}

impl CloseReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TimedOut => "timed_out",
            Self::Response => "response",
        }
    }
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tracker lifecycle status.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackerStatus {
    Open,
    Closed(CloseReason),
}

/// Where the host should send the user when the flow ends.
///
/// Opaque to the flows.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReturnContext {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub record_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub menu_id: Option<String>,
}

/// An authorization request in flight.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestTracker {
    pub id: TrackerId,
    pub api_id: ApiId,
    /// Endpoint whose call started the authorization.
    pub endpoint: EndpointTarget,
    pub created_at: DateTime<Utc>,
    pub status: TrackerStatus,
    #[serde(default)]
    pub return_to: ReturnContext,
}

impl RequestTracker {
    /// New open tracker.
    pub fn open(
        api_id: ApiId,
        endpoint: EndpointTarget,
        return_to: ReturnContext,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: TrackerId::generate(),
            api_id,
            endpoint,
            created_at,
            status: TrackerStatus::Open,
            return_to,
        }
    }

    pub fn is_open(&self) -> bool {
        self.status == TrackerStatus::Open
    }

    /// Time since the tracker was opened; zero if `now` is earlier.
    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        now.signed_duration_since(self.created_at)
            .to_std()
            .unwrap_or_default()
    }

    /// Open and at least `timeout` old.
    pub fn is_stale(&self, now: DateTime<Utc>, timeout: Duration) -> bool {
        self.is_open() && self.age(now) >= timeout
    }

    /// Close the tracker. Returns `false` if it was already closed, keeping
    /// the original reason.
    pub fn close(&mut self, reason: CloseReason) -> bool {
        if !self.is_open() {
            return false;
        }
        self.status = TrackerStatus::Closed(reason);
        true
    }

    pub fn close_reason(&self) -> Option<CloseReason> {
        match self.status {
            TrackerStatus::Open => None,
            TrackerStatus::Closed(reason) => Some(reason),
        }
    }
}
