//! Outcome Types
//!
//! Terminal result of every top-level operation, handed to the host.

use serde::{Deserialize, Serialize};

use crate::types::ReturnContext;

/// What the host should do next.
///
/// The engine does not persist report text. A host that keeps the last
/// HMRC response on its endpoint record stores `message` itself.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FlowOutcome {
    /// Show the report to the user.
    Success { message: String },
    /// Navigate the browser to the authorization URL.
    Redirect { url: String },
    /// Show the report and return the user to `return_to` when known.
    Error {
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        return_to: Option<ReturnContext>,
    },
}

impl FlowOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    pub fn is_redirect(&self) -> bool {
        matches!(self, Self::Redirect { .. })
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error { .. })
    }

    /// Report text for success and error outcomes.
    pub fn message(&self) -> Option<&str> {
        match self {
            Self::Success { message } | Self::Error { message, .. } => Some(message),
            Self::Redirect { .. } => None,
        }
    }
}
