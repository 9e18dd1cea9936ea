//! Endpoint Types
//!
//! The HMRC "hello" test endpoints and how each one authenticates.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::ConfigurationError;

/// How a protected endpoint expects to be authenticated.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AuthMode {
    /// Open endpoint, no `Authorization` header.
    None,
    /// Application-restricted, bearer server token.
    ServerToken,
    /// User-restricted, bearer access token from the OAuth flow.
    UserAccessToken,
}

/// A protected HMRC resource the host can probe.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EndpointTarget {
    HelloWorld,
    Application,
    User,
}

/// Static description of an endpoint.
#[derive(Debug)]
pub struct EndpointEntry {
    /// Symbolic name.
    pub name: &'static str,
    /// Name of the host record that triggers the call.
    pub record_name: &'static str,
    /// Path below the HMRC base URL.
    pub path: &'static str,
    /// Authentication mode.
    pub auth_mode: AuthMode,
}

const HELLO_WORLD: EndpointEntry = EndpointEntry {
    name: "helloworld",
    record_name: "mtd_hello_world_endpoint",
    path: "/hello/world",
    auth_mode: AuthMode::None,
};

const HELLO_APPLICATION: EndpointEntry = EndpointEntry {
    name: "application",
    record_name: "mtd_hello_application_endpoint",
    path: "/hello/application",
    auth_mode: AuthMode::ServerToken,
};

const HELLO_USER: EndpointEntry = EndpointEntry {
    name: "user",
    record_name: "mtd_hello_user_endpoint",
    path: "/hello/user",
    auth_mode: AuthMode::UserAccessToken,
};

impl EndpointTarget {
    /// All known endpoints.
    pub const ALL: [EndpointTarget; 3] = [Self::HelloWorld, Self::Application, Self::User];

    /// Static description of this endpoint.
    pub fn entry(self) -> &'static EndpointEntry {
        match self {
            Self::HelloWorld => &HELLO_WORLD,
            Self::Application => &HELLO_APPLICATION,
            Self::User => &HELLO_USER,
        }
    }

    pub fn name(self) -> &'static str {
        self.entry().name
    }

    pub fn path(self) -> &'static str {
        self.entry().path
    }

    pub fn auth_mode(self) -> AuthMode {
        self.entry().auth_mode
    }

    /// Resolve a host record name such as `mtd_hello_user_endpoint`.
    pub fn from_record_name(record_name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|target| target.entry().record_name == record_name)
    }
}

impl FromStr for EndpointTarget {
    type Err = ConfigurationError;

    /// Accepts either the symbolic name or the host record name.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|target| target.name() == s)
            .or_else(|| Self::from_record_name(s))
            .ok_or_else(|| ConfigurationError::UnknownEndpoint {
                name: s.to_string(),
            })
    }
}

impl fmt::Display for EndpointTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
