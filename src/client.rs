//! MTD Client
//!
//! Host-facing entry points. Every action returns a [`FlowOutcome`]; errors
//! that abort a flow are turned into a short user message here so the host
//! never sees an `Err`. Persisting the report carried by the outcome is up
//! to the host.

use std::sync::Arc;
use tracing::warn;

use crate::core::{HttpTransport, ReqwestHttpTransport};
use crate::error::{get_user_message, ConfigurationError, MtdError, MtdResult};
use crate::flows::{FlowRun, MtdFlowEngine};
use crate::token::{InMemoryTokenStore, TokenStore};
use crate::tracker::{InMemoryRequestTrackerStore, RequestTrackerStore};
use crate::types::{
    ApiId, CallbackParams, ConnectionConfig, EndpointTarget, FlowOutcome, ReturnContext, TrackerId,
};

/// Client wrapping the flow engine for a host application.
pub struct MtdClient<
    T: HttpTransport = ReqwestHttpTransport,
    TS: TokenStore = InMemoryTokenStore,
    RS: RequestTrackerStore = InMemoryRequestTrackerStore,
> {
    engine: MtdFlowEngine<T, TS, RS>,
}

impl MtdClient<ReqwestHttpTransport, InMemoryTokenStore, InMemoryRequestTrackerStore> {
    /// Create a client with the reqwest transport and in-memory stores.
    pub fn new() -> MtdResult<Self> {
        Ok(Self::with_components(
            ReqwestHttpTransport::new()?,
            InMemoryTokenStore::new(),
            InMemoryRequestTrackerStore::new(),
        ))
    }
}

impl<T: HttpTransport, TS: TokenStore, RS: RequestTrackerStore> MtdClient<T, TS, RS> {
    /// Create a client with custom implementations.
    pub fn with_components(transport: T, tokens: TS, trackers: RS) -> Self {
        Self::with_engine(MtdFlowEngine::new(
            Arc::new(transport),
            Arc::new(tokens),
            Arc::new(trackers),
        ))
    }

    /// Create a client around a configured engine.
    pub fn with_engine(engine: MtdFlowEngine<T, TS, RS>) -> Self {
        Self { engine }
    }

    pub fn engine(&self) -> &MtdFlowEngine<T, TS, RS> {
        &self.engine
    }

    /// "Connect" action of an endpoint record.
    ///
    /// `endpoint_name` is either the symbolic name (`user`) or the record
    /// name (`mtd_hello_user_endpoint`).
    pub async fn action_connect(
        &self,
        endpoint_name: &str,
        api_id: &ApiId,
        config: Option<&ConnectionConfig>,
        return_to: Option<ReturnContext>,
    ) -> FlowOutcome {
        let endpoint = match endpoint_name.parse::<EndpointTarget>() {
            Ok(endpoint) => endpoint,
            Err(e) => return settle(Err(e.into())),
        };
        self.call_endpoint(endpoint, api_id, config, return_to).await
    }

    /// Call a protected endpoint.
    pub async fn call_endpoint(
        &self,
        endpoint: EndpointTarget,
        api_id: &ApiId,
        config: Option<&ConnectionConfig>,
        return_to: Option<ReturnContext>,
    ) -> FlowOutcome {
        let config = match require_config(config) {
            Ok(config) => config,
            Err(e) => return settle(Err(e)),
        };
        settle(
            self.engine
                .call_endpoint(api_id, endpoint, config, return_to)
                .await,
        )
    }

    /// Exchange a code for a known tracker.
    pub async fn exchange_code(
        &self,
        auth_code: &str,
        api_id: &ApiId,
        tracker_id: &TrackerId,
        config: Option<&ConnectionConfig>,
    ) -> FlowOutcome {
        let config = match require_config(config) {
            Ok(config) => config,
            Err(e) => return settle(Err(e)),
        };
        settle(
            self.engine
                .exchange_code(auth_code, api_id, tracker_id, config)
                .await,
        )
    }

    /// Handle the `/auth-redirect` request. `query` is the raw query string.
    pub async fn auth_redirect(
        &self,
        api_id: &ApiId,
        query: &str,
        config: Option<&ConnectionConfig>,
    ) -> FlowOutcome {
        let config = match require_config(config) {
            Ok(config) => config,
            Err(e) => return settle(Err(e)),
        };
        let params = CallbackParams::from_query(query);
        settle(self.engine.handle_callback(api_id, params, config).await)
    }
}

fn require_config(config: Option<&ConnectionConfig>) -> MtdResult<&ConnectionConfig> {
    config.ok_or_else(|| ConfigurationError::MissingConfiguration.into())
}

fn settle(result: Result<FlowRun, MtdError>) -> FlowOutcome {
    match result {
        Ok(run) => run.into_outcome(),
        Err(e) => {
            warn!(error = %e, code = e.error_code(), "Connection action failed");
            FlowOutcome::Error {
                message: get_user_message(&e),
                return_to: None,
            }
        }
    }
}

/// Create a client with default components.
pub fn mtd_client() -> MtdResult<MtdClient> {
    MtdClient::new()
}
