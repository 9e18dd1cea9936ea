//! HMRC Making Tax Digital Integration Module
//!
//! OAuth2 authorization-code client for the HMRC MTD API.
//!
//! # Features
//!
//! - Calls to the HMRC "hello" test endpoints (open, application and user restricted)
//! - Authorization requests guarded by a per-API request tracker
//! - Authorization code exchange and retry of the original call
//! - Token refresh on rejected access tokens, with re-authorization when the
//!   refresh token is no longer accepted
//! - Uniform connection reports for every outcome
//!
//! # Example
//!
//! ```rust,ignore
//! use integrations_hmrc_mtd::{connection_config, ApiId, MtdClient};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = connection_config()
//!         .client_id("my-client-id")
//!         .client_secret("my-client-secret")
//!         .server_token("my-server-token")
//!         .redirect_url("https://erp.example.com")
//!         .scope("hello")
//!         .build()?;
//!
//!     let client = MtdClient::new()?;
//!     let outcome = client
//!         .action_connect("user", &ApiId::from("hello"), Some(&config), None)
//!         .await;
//!
//!     // Redirect { url } sends the user to HMRC; the host later passes the
//!     // `/auth-redirect` query to `client.auth_redirect(..)`.
//!     println!("{:?}", outcome);
//!     Ok(())
//! }
//! ```
//!
//! # Architecture
//!
//! - `types`: data model (configuration, endpoints, tokens, trackers, outcomes)
//! - `error`: error hierarchy and HMRC error body parsing
//! - `core`: HTTP transport and clock
//! - `token`: token record storage
//! - `tracker`: single-flight authorization request tracker
//! - `flows`: the flow engine and request construction
//! - `report`: connection report formatting
//! - `builders`: fluent configuration builder
//! - `telemetry`: flow metrics
//! - `client`: host-facing entry points

pub mod builders;
pub mod client;
pub mod core;
pub mod error;
pub mod flows;
pub mod report;
pub mod telemetry;
pub mod token;
pub mod tracker;
pub mod types;

// Re-export main client
pub use client::{mtd_client, MtdClient};

// Re-export builders
pub use builders::{connection_config, ConnectionConfigBuilder};

// Re-export core
pub use core::{
    Clock, HttpMethod, HttpRequest, HttpResponse, HttpTransport, MockClock, MockHttpTransport,
    ReqwestHttpTransport, SystemClock,
};

// Re-export errors
pub use error::{
    get_user_message, AuthorizationError, ConfigurationError, MtdError, MtdResult, NetworkError,
    ProtocolError, StorageError, TrackerError,
};

// Re-export flows
pub use flows::{FlowRun, FlowState, MtdFlowEngine};

// Re-export report
pub use report::{format_error, format_success, ConnectionReport};

// Re-export storage
pub use token::{InMemoryTokenStore, JsonFileTokenStore, TokenStore};
pub use tracker::{InMemoryRequestTrackerStore, RequestTrackerStore, TrackerClosed, TrackerOpened};

// Re-export telemetry
pub use telemetry::{InMemoryMetrics, MtdMetrics, NoOpMetrics};

// Re-export types
pub use types::{
    ApiId, AuthMode, CallbackParams, CloseReason, ConnectionConfig, EndpointTarget, FlowOutcome,
    RequestTracker, ReturnContext, TokenPatch, TokenRecord, TokenResponse, TrackerId,
    TrackerStatus,
};
