//! MTD Flow Engine
//!
//! State machine coordinating endpoint calls, authorization, code exchange
//! and token refresh for one API.
//!
//! ```text
//! Idle -> CallingEndpoint -> DoneSuccess
//!                         -> DoneError
//!                         -> AwaitingAuthorization (no usable tokens)
//!                         -> RefreshingToken (401, once) -> CallingEndpoint
//!                                                        -> AwaitingAuthorization (refresh rejected)
//! ExchangingCode -> CallingEndpoint | DoneError
//! ```
//!
//! Every server-facing failure ends in [`FlowOutcome::Error`] carrying a
//! formatted report. `Err` is returned for tracker conflicts, storage
//! failures and calls that address the wrong tracker.

use chrono::{DateTime, Utc};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::core::{default_clock, Clock, HttpResponse, HttpTransport};
use crate::error::{
    parse_error_body, AuthorizationError, MtdError, MtdResult, ProtocolError, TrackerError,
};
use crate::flows::authorization;
use crate::report::{format_error, format_success};
use crate::telemetry::{MtdMetrics, NoOpMetrics};
use crate::token::TokenStore;
use crate::tracker::RequestTrackerStore;
use crate::types::{
    ApiId, AuthMode, CallbackParams, CloseReason, ConnectionConfig, EndpointTarget, FlowOutcome,
    ReturnContext, TokenPatch, TokenRecord, TrackerId, TRACKER_TIMEOUT,
};

/// Flow engine states.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FlowState {
    Idle,
    CallingEndpoint,
    /// Tracker open, waiting for the user to come back with a code.
    AwaitingAuthorization,
    ExchangingCode,
    RefreshingToken,
    DoneSuccess,
    DoneError,
}

impl FlowState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::CallingEndpoint => "calling_endpoint",
            Self::AwaitingAuthorization => "awaiting_authorization",
            Self::ExchangingCode => "exchanging_code",
            Self::RefreshingToken => "refreshing_token",
            Self::DoneSuccess => "done_success",
            Self::DoneError => "done_error",
        }
    }
}

impl fmt::Display for FlowState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of one engine invocation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FlowRun {
    pub outcome: FlowOutcome,
    /// States visited, in order.
    pub states: Vec<FlowState>,
    /// Why the flow gave up on the stored tokens and started a new
    /// authorization, if it did.
    pub fallback: Option<String>,
}

impl FlowRun {
    pub fn into_outcome(self) -> FlowOutcome {
        self.outcome
    }

    /// Last state reached.
    pub fn final_state(&self) -> Option<FlowState> {
        self.states.last().copied()
    }
}

/// Per-invocation state.
struct FlowContext<'a> {
    api_id: &'a ApiId,
    endpoint: EndpointTarget,
    config: &'a ConnectionConfig,
    return_to: Option<ReturnContext>,
    states: Vec<FlowState>,
    refresh_attempted: bool,
    fallback: Option<String>,
}

impl<'a> FlowContext<'a> {
    fn new(
        api_id: &'a ApiId,
        endpoint: EndpointTarget,
        config: &'a ConnectionConfig,
        return_to: Option<ReturnContext>,
    ) -> Self {
        Self {
            api_id,
            endpoint,
            config,
            return_to,
            states: vec![FlowState::Idle],
            refresh_attempted: false,
            fallback: None,
        }
    }

    fn transition(&mut self, state: FlowState) {
        debug!(
            api_id = %self.api_id,
            endpoint = %self.endpoint,
            from = ?self.states.last(),
            to = %state,
            "Flow transition"
        );
        self.states.push(state);
    }
}

/// Next step of a flow.
enum Step {
    Call,
    Authorize,
    Refresh(TokenRecord),
    Done(FlowOutcome),
}

/// HMRC MTD flow engine.
pub struct MtdFlowEngine<T, TS, RS>
where
    T: HttpTransport,
    TS: TokenStore,
    RS: RequestTrackerStore,
{
    transport: Arc<T>,
    tokens: Arc<TS>,
    trackers: Arc<RS>,
    clock: Arc<dyn Clock>,
    metrics: Arc<dyn MtdMetrics>,
    tracker_timeout: Duration,
}

impl<T, TS, RS> MtdFlowEngine<T, TS, RS>
where
    T: HttpTransport,
    TS: TokenStore,
    RS: RequestTrackerStore,
{
    /// Create new engine using the system clock and no-op metrics.
    pub fn new(transport: Arc<T>, tokens: Arc<TS>, trackers: Arc<RS>) -> Self {
        Self {
            transport,
            tokens,
            trackers,
            clock: default_clock(),
            metrics: Arc::new(NoOpMetrics),
            tracker_timeout: TRACKER_TIMEOUT,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<dyn MtdMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Age after which an open tracker is superseded.
    pub fn with_tracker_timeout(mut self, timeout: Duration) -> Self {
        self.tracker_timeout = timeout;
        self
    }

    pub fn transport(&self) -> &Arc<T> {
        &self.transport
    }

    pub fn tokens(&self) -> &Arc<TS> {
        &self.tokens
    }

    pub fn trackers(&self) -> &Arc<RS> {
        &self.trackers
    }

    /// Call a protected endpoint on behalf of `api_id`.
    ///
    /// User-restricted endpoints without stored tokens start an
    /// authorization instead of calling HMRC. `return_to` is kept on the
    /// tracker so a later error can send the user back.
    pub async fn call_endpoint(
        &self,
        api_id: &ApiId,
        endpoint: EndpointTarget,
        config: &ConnectionConfig,
        return_to: Option<ReturnContext>,
    ) -> MtdResult<FlowRun> {
        info!(api_id = %api_id, endpoint = %endpoint, "Calling HMRC endpoint");
        let ctx = FlowContext::new(api_id, endpoint, config, return_to);
        let result = self.drive(ctx, Step::Call).await;
        self.observe(api_id, result)
    }

    /// Exchange an authorization code and retry the call that started the
    /// authorization.
    ///
    /// The tracker must be open and belong to `api_id`.
    pub async fn exchange_code(
        &self,
        auth_code: &str,
        api_id: &ApiId,
        tracker_id: &TrackerId,
        config: &ConnectionConfig,
    ) -> MtdResult<FlowRun> {
        let result = self
            .exchange_code_inner(auth_code, api_id, tracker_id, config)
            .await;
        self.observe(api_id, result)
    }

    /// Refresh the tokens in `record` and retry `endpoint` once.
    ///
    /// A rejected refresh token falls back to a new authorization.
    pub async fn refresh_token(
        &self,
        record: TokenRecord,
        endpoint: EndpointTarget,
        config: &ConnectionConfig,
        return_to: Option<ReturnContext>,
    ) -> MtdResult<FlowRun> {
        let api_id = record.api_id.clone();
        let ctx = FlowContext::new(&api_id, endpoint, config, return_to);
        let result = self.drive(ctx, Step::Refresh(record)).await;
        self.observe(&api_id, result)
    }

    /// Handle the `/auth-redirect` callback for `api_id`.
    pub async fn handle_callback(
        &self,
        api_id: &ApiId,
        params: CallbackParams,
        config: &ConnectionConfig,
    ) -> MtdResult<FlowRun> {
        let result = self.handle_callback_inner(api_id, params, config).await;
        self.observe(api_id, result)
    }

    async fn exchange_code_inner(
        &self,
        auth_code: &str,
        api_id: &ApiId,
        tracker_id: &TrackerId,
        config: &ConnectionConfig,
    ) -> MtdResult<FlowRun> {
        // Closing claims the tracker; only the caller that closed it may
        // spend the code.
        let closed = self
            .trackers
            .close(tracker_id, api_id, CloseReason::Response)
            .await?;
        let tracker = closed.tracker;

        if !closed.closed_now {
            let reason = tracker.close_reason().unwrap_or(CloseReason::Response);
            warn!(tracker_id = %tracker_id, reason = %reason, "Tracker already closed");
            return Err(TrackerError::AlreadyClosed {
                tracker_id: tracker_id.clone(),
                reason,
            }
            .into());
        }

        let mut ctx = FlowContext::new(api_id, tracker.endpoint, config, Some(tracker.return_to));
        ctx.transition(FlowState::ExchangingCode);

        self.tokens
            .upsert(api_id, TokenPatch::authorization_code(auth_code))
            .await?;

        let step = self.exchange_step(&mut ctx, auth_code).await?;
        self.drive(ctx, step).await
    }

    async fn handle_callback_inner(
        &self,
        api_id: &ApiId,
        params: CallbackParams,
        config: &ConnectionConfig,
    ) -> MtdResult<FlowRun> {
        let tracker = self
            .trackers
            .find_open(api_id)
            .await?
            .ok_or_else(|| AuthorizationError::NoPendingAuthorization {
                api_id: api_id.clone(),
            })?;

        if let Some(expected) = &config.state {
            if params.state.as_deref() != Some(expected.as_str()) {
                warn!(api_id = %api_id, "State mismatch on authorisation redirect");
                return Err(AuthorizationError::StateMismatch.into());
            }
        }

        if let Some(error) = params.error {
            self.trackers
                .close(&tracker.id, api_id, CloseReason::Response)
                .await?;

            let ctx = FlowContext::new(api_id, tracker.endpoint, config, Some(tracker.return_to));
            let denied = AuthorizationError::CallbackDenied {
                error,
                error_description: params.error_description,
            };
            let step = self.fail(&ctx, &config.redirect_uri(), None, denied.into());
            return self.drive(ctx, step).await;
        }

        let code = params
            .code
            .filter(|code| !code.is_empty())
            .ok_or(AuthorizationError::MissingCode)?;

        self.exchange_code_inner(&code, api_id, &tracker.id, config)
            .await
    }

    async fn drive(&self, mut ctx: FlowContext<'_>, mut step: Step) -> MtdResult<FlowRun> {
        loop {
            step = match step {
                Step::Call => self.call_step(&mut ctx).await?,
                Step::Authorize => self.authorize_step(&mut ctx).await?,
                Step::Refresh(record) => self.refresh_step(&mut ctx, record).await?,
                Step::Done(outcome) => {
                    match &outcome {
                        FlowOutcome::Success { .. } => ctx.transition(FlowState::DoneSuccess),
                        FlowOutcome::Error { .. } => ctx.transition(FlowState::DoneError),
                        FlowOutcome::Redirect { .. } => {}
                    }
                    return Ok(FlowRun {
                        outcome,
                        states: ctx.states,
                        fallback: ctx.fallback,
                    });
                }
            };
        }
    }

    async fn call_step(&self, ctx: &mut FlowContext<'_>) -> MtdResult<Step> {
        ctx.transition(FlowState::CallingEndpoint);

        let record = if ctx.endpoint.auth_mode() == AuthMode::UserAccessToken {
            match self.tokens.get(ctx.api_id).await? {
                Some(record) if record.has_usable_tokens() => Some(record),
                _ => {
                    info!(api_id = %ctx.api_id, "No usable tokens, starting authorisation");
                    return Ok(Step::Authorize);
                }
            }
        } else {
            None
        };

        let access_token = record.as_ref().and_then(|r| r.access_token.as_deref());
        let request = authorization::endpoint_request(ctx.config, ctx.endpoint, access_token);
        let url = request.url.clone();

        let response = match self.transport.send(request).await {
            Ok(response) => response,
            Err(e) => {
                self.metrics.record_endpoint_call(ctx.endpoint.name(), None);
                return Ok(self.fail(ctx, &url, None, e.into()));
            }
        };
        self.metrics
            .record_endpoint_call(ctx.endpoint.name(), Some(response.status));

        if response.is_success() {
            let message = authorization::success_message(&response.body);
            info!(api_id = %ctx.api_id, endpoint = %ctx.endpoint, "HMRC endpoint call succeeded");
            return Ok(Step::Done(FlowOutcome::Success {
                message: format_success(&url, &message, self.now()),
            }));
        }

        if response.status == 401 && parse_error_body(&response.body).is_invalid_credentials() {
            if let Some(record) = record {
                if !ctx.refresh_attempted {
                    info!(api_id = %ctx.api_id, "Access token rejected, refreshing");
                    return Ok(Step::Refresh(record));
                }
            }
        }

        Ok(self.fail(ctx, &url, Some(response.status), unexpected_status(&response)))
    }

    async fn authorize_step(&self, ctx: &mut FlowContext<'_>) -> MtdResult<Step> {
        let opened = match self
            .trackers
            .open(
                ctx.api_id,
                ctx.endpoint,
                ctx.return_to.clone().unwrap_or_default(),
                self.now(),
                self.tracker_timeout,
            )
            .await
        {
            Ok(opened) => opened,
            Err(MtdError::Tracker(TrackerError::AlreadyOpen { api_id, age, tracker_id })) => {
                warn!(
                    api_id = %api_id,
                    tracker_id = %tracker_id,
                    age_secs = age.as_secs(),
                    "Authorisation request already in process"
                );
                return Err(AuthorizationError::AuthorizationInProgress { api_id, age }.into());
            }
            Err(e) => return Err(e),
        };

        if let Some(stale) = &opened.superseded {
            info!(api_id = %ctx.api_id, tracker_id = %stale.id, "Superseded stale tracker");
        }

        let tracker = opened.tracker;
        ctx.transition(FlowState::AwaitingAuthorization);
        self.metrics.record_authorization_request(ctx.api_id.as_str());

        let url = authorization::build_authorization_url(ctx.config);
        let probe = authorization::authorization_probe(ctx.config, &url);

        let failure = match self.transport.send(probe).await {
            Ok(response) if response.is_success() => {
                info!(
                    api_id = %ctx.api_id,
                    tracker_id = %tracker.id,
                    "Redirecting user to HMRC authorisation"
                );
                return Ok(Step::Done(FlowOutcome::Redirect { url }));
            }
            Ok(response) => (Some(response.status), unexpected_status(&response)),
            Err(e) => (None, e.into()),
        };

        self.trackers
            .close(&tracker.id, ctx.api_id, CloseReason::Response)
            .await?;
        let (status, error) = failure;
        Ok(self.fail(ctx, &url, status, error))
    }

    async fn exchange_step(&self, ctx: &mut FlowContext<'_>, code: &str) -> MtdResult<Step> {
        let request = authorization::code_exchange_request(ctx.config, code);
        let url = request.url.clone();

        let response = match self.transport.send(request).await {
            Ok(response) => response,
            Err(e) => {
                self.metrics.record_token_exchange(ctx.api_id.as_str(), false);
                return Ok(self.fail(ctx, &url, None, e.into()));
            }
        };

        if !response.is_success() {
            self.metrics.record_token_exchange(ctx.api_id.as_str(), false);
            return Ok(self.fail(ctx, &url, Some(response.status), unexpected_status(&response)));
        }

        match authorization::parse_token_response(&response.body) {
            Ok(tokens) => {
                self.tokens
                    .upsert(ctx.api_id, TokenPatch::from_token_response(&tokens, self.now()))
                    .await?;
                self.metrics.record_token_exchange(ctx.api_id.as_str(), true);
                info!(api_id = %ctx.api_id, expires_in = ?tokens.expires_in, "Authorisation code exchanged");
                Ok(Step::Call)
            }
            Err(e) => {
                self.metrics.record_token_exchange(ctx.api_id.as_str(), false);
                Ok(self.fail(ctx, &url, Some(response.status), e.into()))
            }
        }
    }

    async fn refresh_step(&self, ctx: &mut FlowContext<'_>, record: TokenRecord) -> MtdResult<Step> {
        ctx.refresh_attempted = true;
        ctx.transition(FlowState::RefreshingToken);

        let Some(refresh_token) = record.refresh_token.as_deref().filter(|t| !t.is_empty()) else {
            return Ok(Step::Authorize);
        };

        let request = authorization::refresh_request(ctx.config, refresh_token);
        let url = request.url.clone();

        let response = match self.transport.send(request).await {
            Ok(response) => response,
            Err(e) => {
                self.metrics.record_token_refresh(ctx.api_id.as_str(), false);
                return Ok(self.fail(ctx, &url, None, e.into()));
            }
        };

        if response.is_success() {
            return match authorization::parse_token_response(&response.body) {
                Ok(tokens) => {
                    self.tokens
                        .upsert(ctx.api_id, TokenPatch::from_token_response(&tokens, self.now()))
                        .await?;
                    self.metrics.record_token_refresh(ctx.api_id.as_str(), true);
                    info!(api_id = %ctx.api_id, "Access token refreshed");
                    Ok(Step::Call)
                }
                Err(e) => {
                    self.metrics.record_token_refresh(ctx.api_id.as_str(), false);
                    Ok(self.fail(ctx, &url, Some(response.status), e.into()))
                }
            };
        }

        self.metrics.record_token_refresh(ctx.api_id.as_str(), false);

        if response.status == 400 && parse_error_body(&response.body).is_bad_request() {
            let rejected = MtdError::from(AuthorizationError::InvalidRefreshToken);
            warn!(api_id = %ctx.api_id, error = %rejected, "Starting a new authorisation");
            self.metrics
                .record_error(rejected.error_code(), ctx.api_id.as_str());
            ctx.fallback = Some(rejected.to_string());
            return Ok(Step::Authorize);
        }

        Ok(self.fail(ctx, &url, Some(response.status), unexpected_status(&response)))
    }

    /// Terminal error step carrying the formatted report.
    fn fail(
        &self,
        ctx: &FlowContext<'_>,
        url: &str,
        status: Option<u16>,
        error: MtdError,
    ) -> Step {
        warn!(
            api_id = %ctx.api_id,
            endpoint = %ctx.endpoint,
            status = ?status,
            error = %error,
            "HMRC request failed"
        );
        self.metrics
            .record_error(error.error_code(), ctx.api_id.as_str());

        let (message, code) = match error {
            MtdError::Protocol(ProtocolError::UnexpectedStatus { message, code, .. }) => {
                (message, code)
            }
            MtdError::Authorization(AuthorizationError::CallbackDenied {
                error,
                error_description,
            }) => (error_description.unwrap_or_else(|| error.clone()), Some(error)),
            other => (other.to_string(), None),
        };

        Step::Done(FlowOutcome::Error {
            message: format_error(url, status, &message, code.as_deref(), self.now()),
            return_to: ctx.return_to.clone(),
        })
    }

    fn observe(&self, api_id: &ApiId, result: MtdResult<FlowRun>) -> MtdResult<FlowRun> {
        match &result {
            Ok(run) => debug!(api_id = %api_id, states = ?run.states, "Flow finished"),
            Err(e) => {
                self.metrics.record_error(e.error_code(), api_id.as_str());
                warn!(api_id = %api_id, error = %e, "Flow aborted");
            }
        }
        result
    }

    fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }
}

fn unexpected_status(response: &HttpResponse) -> MtdError {
    let body = parse_error_body(&response.body);
    ProtocolError::UnexpectedStatus {
        status: response.status,
        message: body.server_message(&response.body),
        code: body.server_code().map(str::to_string),
    }
    .into()
}
