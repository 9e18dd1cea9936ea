//! Token Types
//!
//! Per-API OAuth credentials and the token endpoint response.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identity of the protected API a token record belongs to.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ApiId(String);

impl ApiId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ApiId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for ApiId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl fmt::Display for ApiId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Token response from the HMRC token endpoint.
#[derive(Clone, Deserialize)]
pub struct TokenResponse {
    /// Access token.
    pub access_token: String,
    /// Refresh token. HMRC always issues one with an access token.
    pub refresh_token: String,
    /// Expires in seconds.
    #[serde(default)]
    pub expires_in: Option<u64>,
    /// Granted scopes.
    #[serde(default)]
    pub scope: Option<String>,
    /// Token type (usually "bearer").
    #[serde(default)]
    pub token_type: Option<String>,
}

impl fmt::Debug for TokenResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenResponse")
            .field("access_token", &"[REDACTED]")
            .field("refresh_token", &"[REDACTED]")
            .field("expires_in", &self.expires_in)
            .field("scope", &self.scope)
            .field("token_type", &self.token_type)
            .finish()
    }
}

/// Stored OAuth credentials for one API.
///
/// `access_token` and `refresh_token` are written together; a record holding
/// only an authorization code is pending exchange.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenRecord {
    pub api_id: ApiId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authorization_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    /// Access token lifetime in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_in: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token_received_at: Option<DateTime<Utc>>,
}

impl TokenRecord {
    /// Empty record for an API.
    pub fn new(api_id: ApiId) -> Self {
        Self {
            api_id,
            authorization_code: None,
            access_token: None,
            refresh_token: None,
            expires_in: None,
            access_token_received_at: None,
        }
    }

    /// Both access and refresh tokens are present and non-empty.
    pub fn has_usable_tokens(&self) -> bool {
        let present = |token: &Option<String>| token.as_deref().is_some_and(|t| !t.is_empty());
        present(&self.access_token) && present(&self.refresh_token)
    }

    /// Holds an authorization code but no tokens yet.
    pub fn is_pending_exchange(&self) -> bool {
        self.authorization_code.is_some() && !self.has_usable_tokens()
    }

    /// When the access token expires, if known.
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        let received = self.access_token_received_at?;
        let lifetime = i64::try_from(self.expires_in?).ok()?;
        Some(received + Duration::seconds(lifetime))
    }

    /// Whether the access token is past its advertised lifetime.
    ///
    /// Informational only; refresh is driven by HMRC rejecting the token.
    pub fn is_access_token_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at().map(|exp| exp <= now).unwrap_or(false)
    }

    /// Apply a patch in place; unset patch fields leave the record untouched.
    pub fn apply(&mut self, patch: TokenPatch) {
        if let Some(code) = patch.authorization_code {
            self.authorization_code = Some(code);
        }
        if let Some(access_token) = patch.access_token {
            self.access_token = Some(access_token);
        }
        if let Some(refresh_token) = patch.refresh_token {
            self.refresh_token = Some(refresh_token);
        }
        if let Some(expires_in) = patch.expires_in {
            self.expires_in = Some(expires_in);
        }
        if let Some(received_at) = patch.access_token_received_at {
            self.access_token_received_at = Some(received_at);
        }
    }
}

impl fmt::Debug for TokenRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let redact = |value: &Option<String>| value.as_ref().map(|_| "[REDACTED]");
        f.debug_struct("TokenRecord")
            .field("api_id", &self.api_id)
            .field("authorization_code", &redact(&self.authorization_code))
            .field("access_token", &redact(&self.access_token))
            .field("refresh_token", &redact(&self.refresh_token))
            .field("expires_in", &self.expires_in)
            .field("access_token_received_at", &self.access_token_received_at)
            .finish()
    }
}

/// Partial update of a [`TokenRecord`].
#[derive(Clone, Default, PartialEq, Eq)]
pub struct TokenPatch {
    pub authorization_code: Option<String>,
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub expires_in: Option<u64>,
    pub access_token_received_at: Option<DateTime<Utc>>,
}

impl TokenPatch {
    /// Record a freshly received authorization code.
    pub fn authorization_code(code: impl Into<String>) -> Self {
        Self {
            authorization_code: Some(code.into()),
            ..Default::default()
        }
    }

    /// Tokens issued by a code exchange or refresh.
    pub fn from_token_response(response: &TokenResponse, received_at: DateTime<Utc>) -> Self {
        Self {
            authorization_code: None,
            access_token: Some(response.access_token.clone()),
            refresh_token: Some(response.refresh_token.clone()),
            expires_in: response.expires_in,
            access_token_received_at: Some(received_at),
        }
    }
}

impl fmt::Debug for TokenPatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenPatch")
            .field("authorization_code", &self.authorization_code.is_some())
            .field("access_token", &self.access_token.is_some())
            .field("refresh_token", &self.refresh_token.is_some())
            .field("expires_in", &self.expires_in)
            .field("access_token_received_at", &self.access_token_received_at)
            .finish()
    }
}
