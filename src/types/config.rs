//! Configuration Types
//!
//! HMRC connection configuration. Owned by the host; the flows only read it.

use secrecy::SecretString;
use std::time::Duration;

use crate::types::EndpointTarget;

/// HMRC sandbox base URL.
pub const SANDBOX_BASE_URL: &str = "https://test-api.service.hmrc.gov.uk";

/// HMRC production base URL.
pub const PRODUCTION_BASE_URL: &str = "https://api.service.hmrc.gov.uk";

/// Path appended to the host redirect URL to receive the authorization code.
pub const AUTH_REDIRECT_PATH: &str = "/auth-redirect";

/// `Accept` header required by the HMRC APIs.
pub const HMRC_ACCEPT_HEADER: &str = "application/vnd.hmrc.1.0+json";

/// Timeout for every call made to HMRC.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(3);

/// Connection settings for one HMRC application.
#[derive(Clone)]
pub struct ConnectionConfig {
    /// Application client identifier.
    pub client_id: String,
    /// Application client secret.
    pub client_secret: SecretString,
    /// Server token for application-restricted endpoints.
    pub server_token: SecretString,
    /// Host URL the user is sent back to; `/auth-redirect` is appended.
    pub redirect_url: String,
    /// Base URL of the HMRC API.
    pub hmrc_base_url: String,
    /// Authorization prompt URL.
    pub authorization_endpoint: String,
    /// Token endpoint for code exchange and refresh.
    pub token_endpoint: String,
    /// Optional opaque `state` echoed back on the redirect.
    pub state: Option<String>,
    /// Space-delimited scopes to request.
    pub scope: String,
    /// HTTP timeout.
    pub timeout: Duration,
}

impl ConnectionConfig {
    /// Redirect URI registered with HMRC.
    pub fn redirect_uri(&self) -> String {
        format!(
            "{}{}",
            self.redirect_url.trim_end_matches('/'),
            AUTH_REDIRECT_PATH
        )
    }

    /// Full URL of a protected endpoint.
    pub fn endpoint_url(&self, endpoint: EndpointTarget) -> String {
        format!(
            "{}{}",
            self.hmrc_base_url.trim_end_matches('/'),
            endpoint.path()
        )
    }
}

impl std::fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionConfig")
            .field("client_id", &self.client_id)
            .field("client_secret", &"[REDACTED]")
            .field("server_token", &"[REDACTED]")
            .field("redirect_url", &self.redirect_url)
            .field("hmrc_base_url", &self.hmrc_base_url)
            .field("authorization_endpoint", &self.authorization_endpoint)
            .field("token_endpoint", &self.token_endpoint)
            .field("state", &self.state)
            .field("scope", &self.scope)
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// OAuth grant type used against the token endpoint.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GrantType {
    AuthorizationCode,
    RefreshToken,
}

impl GrantType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AuthorizationCode => "authorization_code",
            Self::RefreshToken => "refresh_token",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builders::connection_config;

    #[test]
    fn test_grant_type_as_str() {
        assert_eq!(GrantType::AuthorizationCode.as_str(), "authorization_code");
        assert_eq!(GrantType::RefreshToken.as_str(), "refresh_token");
    }

    #[test]
    fn test_redirect_and_endpoint_urls() {
        let config = connection_config()
            .client_id("client")
            .client_secret("secret")
            .server_token("server")
            .redirect_url("https://erp.example.com/")
            .hmrc_base_url("https://test-api.service.hmrc.gov.uk/")
            .scope("hello")
            .build()
            .unwrap();

        assert_eq!(config.redirect_uri(), "https://erp.example.com/auth-redirect");
        assert_eq!(
            config.endpoint_url(EndpointTarget::User),
            "https://test-api.service.hmrc.gov.uk/hello/user"
        );
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let config = connection_config()
            .client_id("client")
            .client_secret("very-secret")
            .server_token("server-secret")
            .redirect_url("https://erp.example.com")
            .scope("hello")
            .build()
            .unwrap();

        let rendered = format!("{:?}", config);
        assert!(!rendered.contains("very-secret"));
        assert!(!rendered.contains("server-secret"));
        assert!(rendered.contains("[REDACTED]"));
    }
}
