//! Callback Types
//!
//! Parameters HMRC appends to the `/auth-redirect` URL.

use url::Url;

/// Callback parameters from the authorization redirect.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct CallbackParams {
    /// Authorization code (if success).
    pub code: Option<String>,
    /// State parameter.
    pub state: Option<String>,
    /// Error code (if authorization failed).
    pub error: Option<String>,
    /// Error description.
    pub error_description: Option<String>,
}

impl CallbackParams {
    /// Parse callback parameters from a raw query string (without `?`).
    pub fn from_query(query: &str) -> Self {
        let mut params = Self::default();

        for (key, value) in url::form_urlencoded::parse(query.trim_start_matches('?').as_bytes()) {
            match key.as_ref() {
                "code" => params.code = Some(value.into_owned()),
                "state" => params.state = Some(value.into_owned()),
                "error" => params.error = Some(value.into_owned()),
                "error_description" => params.error_description = Some(value.into_owned()),
                _ => {}
            }
        }

        params
    }

    /// Parse callback parameters from a full redirect URL.
    pub fn from_url(url: &Url) -> Self {
        Self::from_query(url.query().unwrap_or_default())
    }

    /// Check if callback contains an error.
    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

impl std::fmt::Debug for CallbackParams {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallbackParams")
            .field("code", &self.code.as_ref().map(|_| "[REDACTED]"))
            .field("state", &self.state)
            .field("error", &self.error)
            .field("error_description", &self.error_description)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_success_callback() {
        let url = Url::parse("https://erp.example.com/auth-redirect?code=AUTHCODE123&state=xyz").unwrap();
        let params = CallbackParams::from_url(&url);
        assert_eq!(params.code.as_deref(), Some("AUTHCODE123"));
        assert_eq!(params.state.as_deref(), Some("xyz"));
        assert!(!params.is_error());
    }

    #[test]
    fn test_parse_error_callback() {
        let params =
            CallbackParams::from_query("?error=access_denied&error_description=user+cancelled");
        assert!(params.is_error());
        assert_eq!(params.error_description.as_deref(), Some("user cancelled"));
        assert_eq!(params.code, None);
    }

    #[test]
    fn test_debug_hides_code() {
        let params = CallbackParams::from_query("code=SECRETCODE");
        assert!(!format!("{:?}", params).contains("SECRETCODE"));
    }
}
