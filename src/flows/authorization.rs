//! Authorization Requests
//!
//! Construction of the HMRC authorization URL, token requests and
//! protected endpoint calls.

use secrecy::ExposeSecret;
use serde_json::json;

use crate::core::HttpRequest;
use crate::error::ProtocolError;
use crate::types::{
    AuthMode, ConnectionConfig, EndpointTarget, GrantType, TokenResponse, HMRC_ACCEPT_HEADER,
};

/// Form-encode a query value (space becomes `+`).
fn form_encode(value: &str) -> String {
    url::form_urlencoded::byte_serialize(value.as_bytes()).collect()
}

/// Authorization prompt URL the user's browser is sent to.
///
/// `redirect_uri` is appended verbatim, matching the URI registered with
/// HMRC for the application.
pub fn build_authorization_url(config: &ConnectionConfig) -> String {
    let mut url = format!(
        "{}?response_type=code&client_id={}&scope={}",
        config.authorization_endpoint,
        form_encode(&config.client_id),
        form_encode(&config.scope)
    );

    if let Some(state) = &config.state {
        url.push_str("&state=");
        url.push_str(&form_encode(state));
    }

    url.push_str("&redirect_uri=");
    url.push_str(&config.redirect_uri());
    url
}

/// Unauthenticated GET used to check the authorization URL is reachable.
pub fn authorization_probe(config: &ConnectionConfig, authorization_url: &str) -> HttpRequest {
    HttpRequest::get(authorization_url).timeout(config.timeout)
}

/// Token request exchanging an authorization code.
pub fn code_exchange_request(config: &ConnectionConfig, code: &str) -> HttpRequest {
    let body = json!({
        "grant_type": GrantType::AuthorizationCode.as_str(),
        "client_id": config.client_id,
        "client_secret": config.client_secret.expose_secret(),
        "redirect_uri": config.redirect_uri(),
        "code": code,
    });

    HttpRequest::post_json(&config.token_endpoint, &body).timeout(config.timeout)
}

/// Token request trading a refresh token for a new access token.
pub fn refresh_request(config: &ConnectionConfig, refresh_token: &str) -> HttpRequest {
    let body = json!({
        "client_id": config.client_id,
        "client_secret": config.client_secret.expose_secret(),
        "grant_type": GrantType::RefreshToken.as_str(),
        "refresh_token": refresh_token,
    });

    HttpRequest::post_json(&config.token_endpoint, &body).timeout(config.timeout)
}

/// GET against a protected endpoint.
///
/// `access_token` is only consulted for user-restricted endpoints.
pub fn endpoint_request(
    config: &ConnectionConfig,
    endpoint: EndpointTarget,
    access_token: Option<&str>,
) -> HttpRequest {
    let request = HttpRequest::get(config.endpoint_url(endpoint))
        .header("Accept", HMRC_ACCEPT_HEADER)
        .timeout(config.timeout);

    let bearer = match endpoint.auth_mode() {
        AuthMode::None => None,
        AuthMode::ServerToken => Some(config.server_token.expose_secret().as_str()),
        AuthMode::UserAccessToken => access_token,
    };

    match bearer {
        Some(token) => request.header("Authorization", format!("Bearer {}", token)),
        None => request,
    }
}

/// Parse a token endpoint response body.
pub fn parse_token_response(body: &str) -> Result<TokenResponse, ProtocolError> {
    serde_json::from_str(body).map_err(|e| ProtocolError::InvalidJson {
        message: format!("token response: {}", e),
    })
}

/// Message shown for a successful endpoint call: the `message` field when
/// present, otherwise the raw body.
pub fn success_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|value| value.get("message")?.as_str().map(str::to_string))
        .unwrap_or_else(|| body.trim().to_string())
}
