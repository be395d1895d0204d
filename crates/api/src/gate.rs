//! Request-boundary authentication, authorization and audit.
//!
//! Every request that is not on the excluded allow-list moves through the
//! stages of [`Stage`]:
//!
//! ```text
//! Start -> CredentialExtracted -> Validated | Rejected
//!       -> PolicyChecked -> Admitted | Denied -> Completed
//! ```
//!
//! `Completed` is a drop guard: it runs on normal return, on rejection, on a
//! handler panic or timeout, and when the whole request future is dropped.
//! It classifies the outcome through the audit pipeline and releases the
//! request's correlation context.

use std::net::{IpAddr, SocketAddr};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use axum::{
    Router,
    extract::{ConnectInfo, Request, State},
    http::{HeaderMap, HeaderValue, StatusCode, header},
    middleware::Next,
    response::Response,
};
use chrono::Utc;
use futures::FutureExt;
use thiserror::Error;
use tokio::time::Instant;
use tracing::Instrument;

use trustgate_auth::{AccessPolicyEngine, Decision, Identity, TokenValidator};
use trustgate_core::GateConfig;
use trustgate_observability::{AuditPipeline, CorrelationContext, RequestOutcome};

use crate::app::errors::json_error;

/// Header carrying the caller's session id, if any.
pub const SESSION_HEADER: &str = "x-session-id";

/// Response header echoing the request id.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Status recorded for requests whose future was dropped before a response
/// was produced.
pub const CLIENT_CLOSED_REQUEST: u16 = 499;

/// Checked in order; the first valid address wins.
const FORWARDING_HEADERS: [&str; 10] = [
    "x-forwarded-for",
    "x-real-ip",
    "x-client-ip",
    "x-cluster-client-ip",
    "http_x_forwarded_for",
    "http_x_forwarded",
    "http_x_cluster_client_ip",
    "http_client_ip",
    "http_forwarded_for",
    "http_forwarded",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Start,
    CredentialExtracted,
    Validated,
    Rejected,
    PolicyChecked,
    Admitted,
    Denied,
    Completed,
}

/// Failure of the downstream handler itself.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum HandlerFailure {
    #[error("request handler failed")]
    Panicked,

    #[error("request handler timed out")]
    TimedOut,
}

impl HandlerFailure {
    pub fn status(&self) -> StatusCode {
        match self {
            HandlerFailure::Panicked => StatusCode::INTERNAL_SERVER_ERROR,
            HandlerFailure::TimedOut => StatusCode::GATEWAY_TIMEOUT,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            HandlerFailure::Panicked => "handler_failure",
            HandlerFailure::TimedOut => "handler_timeout",
        }
    }

    fn operation(&self) -> &'static str {
        match self {
            HandlerFailure::Panicked => "HANDLER_PANIC",
            HandlerFailure::TimedOut => "HANDLER_TIMEOUT",
        }
    }
}

struct GateInner {
    config: Arc<GateConfig>,
    tokens: Arc<dyn TokenValidator>,
    policy: Arc<AccessPolicyEngine>,
    audit: Arc<AuditPipeline>,
    in_flight: AtomicUsize,
}

/// Shared state of the gate middleware. Cheap to clone.
#[derive(Clone)]
pub struct AuthenticationGate {
    inner: Arc<GateInner>,
}

impl AuthenticationGate {
    pub fn new(
        config: Arc<GateConfig>,
        tokens: Arc<dyn TokenValidator>,
        policy: Arc<AccessPolicyEngine>,
        audit: Arc<AuditPipeline>,
    ) -> Self {
        Self {
            inner: Arc::new(GateInner {
                config,
                tokens,
                policy,
                audit,
                in_flight: AtomicUsize::new(0),
            }),
        }
    }

    /// Number of requests currently holding a correlation context.
    pub fn in_flight(&self) -> usize {
        self.inner.in_flight.load(Ordering::SeqCst)
    }

    /// Put `router` behind the gate.
    pub fn wrap<S>(&self, router: Router<S>) -> Router<S>
    where
        S: Clone + Send + Sync + 'static,
    {
        router.layer(axum::middleware::from_fn_with_state(self.clone(), authenticate))
    }

    fn handler_timeout(&self) -> Option<Duration> {
        self.inner.config.handler_timeout_ms.map(Duration::from_millis)
    }

    async fn run_handler(&self, next: Next, req: Request) -> Result<Response, HandlerFailure> {
        let handler = AssertUnwindSafe(next.run(req)).catch_unwind();
        let result = match self.handler_timeout() {
            Some(limit) => tokio::time::timeout(limit, handler)
                .await
                .map_err(|_| HandlerFailure::TimedOut)?,
            None => handler.await,
        };
        result.map_err(|_| HandlerFailure::Panicked)
    }
}

impl core::fmt::Debug for AuthenticationGate {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("AuthenticationGate")
            .field("in_flight", &self.in_flight())
            .finish_non_exhaustive()
    }
}

/// Request attributes captured at `Start`.
struct RequestMeta {
    method: String,
    route: String,
    client_ip: String,
    user_agent: Option<String>,
    referer: Option<String>,
}

/// The `Completed` stage. Dropping it records the outcome and releases the
/// context, whatever path the request took.
struct Completion {
    gate: AuthenticationGate,
    ctx: CorrelationContext,
    meta: RequestMeta,
    identity: Option<Identity>,
    started: Instant,
    stage: Stage,
    status: Option<u16>,
}

impl Completion {
    fn begin(
        gate: AuthenticationGate,
        ctx: CorrelationContext,
        meta: RequestMeta,
        identity: Option<Identity>,
        started: Instant,
    ) -> Self {
        gate.inner.in_flight.fetch_add(1, Ordering::SeqCst);
        Self {
            gate,
            ctx,
            meta,
            identity,
            started,
            stage: Stage::Start,
            status: None,
        }
    }

    fn advance(&mut self, stage: Stage) {
        tracing::trace!(from = ?self.stage, to = ?stage, "gate stage");
        self.stage = stage;
    }

    fn finish(&mut self, mut response: Response) -> Response {
        self.status = Some(response.status().as_u16());
        if let Ok(value) = HeaderValue::from_str(self.ctx.request_id().as_str()) {
            response.headers_mut().insert(REQUEST_ID_HEADER, value);
        }
        response
    }
}

impl Drop for Completion {
    fn drop(&mut self) {
        let last_stage = self.stage;
        self.stage = Stage::Completed;

        let status = self.status.unwrap_or(CLIENT_CLOSED_REQUEST);
        let duration = self.started.elapsed();
        let outcome = RequestOutcome {
            method: &self.meta.method,
            route: &self.meta.route,
            status,
            identity: self.identity.as_ref(),
            client_ip: &self.meta.client_ip,
            duration,
            user_agent: self.meta.user_agent.as_deref(),
            referer: self.meta.referer.as_deref(),
        };
        self.gate.inner.audit.observe(&outcome, &self.ctx);
        self.gate.inner.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.status.is_none() {
            tracing::info!(
                request_id = %self.ctx.request_id(),
                stage = ?last_stage,
                "request dropped before completion"
            );
        } else {
            tracing::debug!(
                request_id = %self.ctx.request_id(),
                stage = ?last_stage,
                status,
                elapsed_ms = duration.as_millis() as u64,
                "request completed"
            );
        }
    }
}

/// Gate middleware. Install with [`AuthenticationGate::wrap`].
pub async fn authenticate(
    State(gate): State<AuthenticationGate>,
    mut req: Request,
    next: Next,
) -> Response {
    let route = req.uri().path().to_string();
    if gate.inner.config.is_excluded(&route) {
        return next.run(req).await;
    }

    let started = Instant::now();
    let headers = req.headers();
    let meta = RequestMeta {
        method: req.method().to_string(),
        client_ip: client_ip(&req),
        user_agent: header_str(headers, header::USER_AGENT.as_str()).map(str::to_string),
        referer: header_str(headers, header::REFERER.as_str()).map(str::to_string),
        route,
    };
    let session_id = header_str(headers, SESSION_HEADER).map(str::to_string);

    // Public routes never look at the credential.
    let credential = if gate.inner.policy.is_public(&meta.route) {
        None
    } else {
        bearer_token(headers).map(str::to_string)
    };

    let (identity, rejection) = match credential {
        None => (None, None),
        Some(token) => match gate.inner.tokens.validate(&token, Utc::now()) {
            Ok(identity) => (Some(identity), None),
            Err(e) => (None, Some(e)),
        },
    };

    let ctx = CorrelationContext::start(
        identity.as_ref().map(Identity::username),
        &meta.client_ip,
        session_id.as_deref(),
    );
    let span = ctx.span();
    let mut completion = Completion::begin(gate.clone(), ctx.clone(), meta, identity.clone(), started);
    completion.advance(Stage::CredentialExtracted);

    let scoped_ctx = ctx.clone();
    let flow = async move {
        if let Some(err) = rejection {
            completion.advance(Stage::Rejected);
            tracing::debug!(error = %err, code = err.code(), "bearer token rejected");
            return completion.finish(json_error(
                StatusCode::UNAUTHORIZED,
                "invalid_token",
                err.to_string(),
            ));
        }
        if identity.is_some() {
            completion.advance(Stage::Validated);
        }

        let decision = gate
            .inner
            .policy
            .authorize(&completion.meta.route, identity.as_ref());
        completion.advance(Stage::PolicyChecked);

        if let Decision::Deny(reason) = decision {
            completion.advance(Stage::Denied);
            let (status, code) = if reason.is_unauthenticated() {
                (StatusCode::UNAUTHORIZED, "unauthorized")
            } else {
                (StatusCode::FORBIDDEN, "forbidden")
            };
            tracing::debug!(reason = %reason, "request denied");
            return completion.finish(json_error(status, code, reason.to_string()));
        }

        completion.advance(Stage::Admitted);
        req.extensions_mut().insert(ctx.clone());
        if let Some(identity) = identity {
            req.extensions_mut().insert(identity);
        }

        let response = match gate.run_handler(next, req).await {
            Ok(response) => response,
            Err(failure) => {
                tracing::error!(error = %failure, "request handler failed");
                gate.inner
                    .audit
                    .error(&ctx, failure.operation(), ctx.actor(), &failure.to_string());
                json_error(failure.status(), failure.code(), failure.to_string())
            }
        };
        completion.finish(response)
    };

    scoped_ctx.scope(flow).instrument(span).await
}

/// `Authorization: Bearer <token>`; anything else counts as no credential.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let token = value.strip_prefix("Bearer ")?.trim();
    if token.is_empty() {
        return None;
    }
    Some(token)
}

/// Best-effort client address: forwarding headers first, then the socket.
pub fn client_ip(req: &Request) -> String {
    let headers = req.headers();
    for name in FORWARDING_HEADERS {
        let Some(value) = header_str(headers, name) else {
            continue;
        };
        let first = value.split(',').next().unwrap_or_default().trim();
        if first.is_empty() || first.eq_ignore_ascii_case("unknown") {
            continue;
        }
        if first.parse::<IpAddr>().is_ok() {
            return first.to_string();
        }
    }

    req.extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}
