//! Configuration Builder
//!
//! Fluent builder for HMRC connection configuration.

use std::time::Duration;

use crate::error::{ConfigurationError, MtdError};
use crate::types::{ConnectionConfig, DEFAULT_TIMEOUT, SANDBOX_BASE_URL};
use secrecy::SecretString;
use url::Url;

/// HMRC connection configuration builder.
#[derive(Default)]
pub struct ConnectionConfigBuilder {
    client_id: Option<String>,
    client_secret: Option<SecretString>,
    server_token: Option<SecretString>,
    redirect_url: Option<String>,
    hmrc_base_url: Option<String>,
    authorization_endpoint: Option<String>,
    token_endpoint: Option<String>,
    state: Option<String>,
    scope: Option<String>,
    timeout: Option<Duration>,
}

impl ConnectionConfigBuilder {
    /// Create new configuration builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set client ID.
    pub fn client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = Some(client_id.into());
        self
    }

    /// Set client secret.
    pub fn client_secret(mut self, client_secret: impl Into<String>) -> Self {
        self.client_secret = Some(SecretString::new(client_secret.into()));
        self
    }

    /// Set server token for application-restricted endpoints.
    pub fn server_token(mut self, server_token: impl Into<String>) -> Self {
        self.server_token = Some(SecretString::new(server_token.into()));
        self
    }

    /// Set host redirect URL (without `/auth-redirect`).
    pub fn redirect_url(mut self, redirect_url: impl Into<String>) -> Self {
        self.redirect_url = Some(redirect_url.into());
        self
    }

    /// Set HMRC base URL. Defaults to the sandbox.
    pub fn hmrc_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.hmrc_base_url = Some(base_url.into());
        self
    }

    /// Override the authorization endpoint.
    pub fn authorization_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.authorization_endpoint = Some(endpoint.into());
        self
    }

    /// Override the token endpoint.
    pub fn token_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.token_endpoint = Some(endpoint.into());
        self
    }

    /// Set the `state` value sent with authorization requests.
    pub fn state(mut self, state: impl Into<String>) -> Self {
        self.state = Some(state.into());
        self
    }

    /// Set requested scopes (space-delimited).
    pub fn scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = Some(scope.into());
        self
    }

    /// Set request timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Populate the builder from environment variables.
    ///
    /// Reads `HMRC_CLIENT_ID`, `HMRC_CLIENT_SECRET`, `HMRC_SERVER_TOKEN`,
    /// `HMRC_REDIRECT_URL` and `HMRC_SCOPE`, plus the optional
    /// `HMRC_BASE_URL` and `HMRC_STATE`.
    pub fn from_env() -> Result<Self, MtdError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Populate the builder from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, MtdError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |name: &str| {
            lookup(name)
                .filter(|value| !value.is_empty())
                .ok_or_else(|| ConfigurationError::Environment {
                    name: name.to_string(),
                })
        };

        let mut builder = Self::new()
            .client_id(required("HMRC_CLIENT_ID")?)
            .client_secret(required("HMRC_CLIENT_SECRET")?)
            .server_token(required("HMRC_SERVER_TOKEN")?)
            .redirect_url(required("HMRC_REDIRECT_URL")?)
            .scope(required("HMRC_SCOPE")?);

        if let Some(base_url) = lookup("HMRC_BASE_URL").filter(|v| !v.is_empty()) {
            builder = builder.hmrc_base_url(base_url);
        }
        if let Some(state) = lookup("HMRC_STATE").filter(|v| !v.is_empty()) {
            builder = builder.state(state);
        }

        Ok(builder)
    }

    /// Build the connection configuration.
    pub fn build(self) -> Result<ConnectionConfig, MtdError> {
        let client_id = required("client_id", self.client_id)?;
        let client_secret = self.client_secret.ok_or_else(|| missing("client_secret"))?;
        let server_token = self.server_token.ok_or_else(|| missing("server_token"))?;
        let redirect_url = required("redirect_url", self.redirect_url)?;
        let scope = required("scope", self.scope)?;

        let hmrc_base_url = self
            .hmrc_base_url
            .unwrap_or_else(|| SANDBOX_BASE_URL.to_string());
        let base = hmrc_base_url.trim_end_matches('/');

        let authorization_endpoint = self
            .authorization_endpoint
            .unwrap_or_else(|| format!("{}/oauth/authorize", base));
        let token_endpoint = self
            .token_endpoint
            .unwrap_or_else(|| format!("{}/oauth/token", base));

        validate_url("redirect_url", &redirect_url)?;
        validate_url("hmrc_base_url", &hmrc_base_url)?;
        validate_url("authorization_endpoint", &authorization_endpoint)?;
        validate_url("token_endpoint", &token_endpoint)?;

        Ok(ConnectionConfig {
            client_id,
            client_secret,
            server_token,
            redirect_url,
            hmrc_base_url,
            authorization_endpoint,
            token_endpoint,
            state: self.state.filter(|s| !s.is_empty()),
            scope,
            timeout: self.timeout.unwrap_or(DEFAULT_TIMEOUT),
        })
    }
}

fn missing(field: &str) -> MtdError {
    ConfigurationError::MissingRequired {
        field: field.to_string(),
    }
    .into()
}

fn required(field: &str, value: Option<String>) -> Result<String, MtdError> {
    value
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| missing(field))
}

fn validate_url(field: &str, value: &str) -> Result<(), MtdError> {
    Url::parse(value).map(|_| ()).map_err(|_| {
        ConfigurationError::InvalidUrl {
            field: field.to_string(),
            url: value.to_string(),
        }
        .into()
    })
}

impl ConnectionConfig {
    /// Start a new builder.
    pub fn builder() -> ConnectionConfigBuilder {
        ConnectionConfigBuilder::new()
    }

    /// Build a configuration from `HMRC_*` environment variables.
    pub fn from_env() -> Result<Self, MtdError> {
        ConnectionConfigBuilder::from_env()?.build()
    }
}

/// Create a new HMRC connection configuration builder.
pub fn connection_config() -> ConnectionConfigBuilder {
    ConnectionConfigBuilder::new()
}
