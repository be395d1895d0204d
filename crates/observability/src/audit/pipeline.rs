use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::time::Duration;

use trustgate_auth::Identity;
use trustgate_core::{GateConfig, RoutePattern};

use super::{AuditEvent, AuditKind, AuditSink, Channel, Level, RiskLevel, Slowness, TracingSink};
use crate::context::{ANONYMOUS, CorrelationContext};

const USER_AGENT_MAX: usize = 100;

/// Slow-request thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuditThresholds {
    pub slow: Duration,
    pub very_slow: Duration,
}

impl Default for AuditThresholds {
    fn default() -> Self {
        Self {
            slow: Duration::from_millis(2_000),
            very_slow: Duration::from_millis(5_000),
        }
    }
}

impl AuditThresholds {
    pub fn from_config(config: &GateConfig) -> Self {
        Self {
            slow: Duration::from_millis(config.slow_request_ms),
            very_slow: Duration::from_millis(config.very_slow_request_ms),
        }
    }

    pub fn slowness(&self, duration: Duration) -> Option<Slowness> {
        if duration >= self.very_slow {
            Some(Slowness::VerySlow)
        } else if duration >= self.slow {
            Some(Slowness::Slow)
        } else {
            None
        }
    }
}

/// Everything the classifier needs to know about a finished request.
#[derive(Debug, Clone)]
pub struct RequestOutcome<'a> {
    pub method: &'a str,
    pub route: &'a str,
    pub status: u16,
    /// Identity resolved from the token, if any.
    pub identity: Option<&'a Identity>,
    pub client_ip: &'a str,
    pub duration: Duration,
    pub user_agent: Option<&'a str>,
    pub referer: Option<&'a str>,
}

impl RequestOutcome<'_> {
    fn actor(&self) -> &str {
        self.identity.map(Identity::username).unwrap_or(ANONYMOUS)
    }

    fn operation(&self) -> String {
        format!("{} {}", self.method, self.route)
    }
}

/// Classifies finished requests into audit events and emits them.
///
/// Rules are evaluated independently, so one request can produce several
/// events. Events of one request are emitted in a fixed order.
#[derive(Clone)]
pub struct AuditPipeline {
    sinks: Vec<Arc<dyn AuditSink>>,
    thresholds: AuditThresholds,
    auth_routes: Vec<RoutePattern>,
    admin_prefix: String,
}

impl core::fmt::Debug for AuditPipeline {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("AuditPipeline")
            .field("sinks", &self.sinks.len())
            .field("thresholds", &self.thresholds)
            .field("auth_routes", &self.auth_routes)
            .field("admin_prefix", &self.admin_prefix)
            .finish()
    }
}

impl AuditPipeline {
    /// Pipeline with no sinks; add them with [`AuditPipeline::with_sink`].
    pub fn new(config: &GateConfig) -> Self {
        Self {
            sinks: Vec::new(),
            thresholds: AuditThresholds::from_config(config),
            auth_routes: config.auth_routes.clone(),
            admin_prefix: config.admin_prefix.clone(),
        }
    }

    /// Pipeline writing to the tracing audit targets.
    pub fn tracing(config: &GateConfig) -> Self {
        Self::new(config).with_sink(Arc::new(TracingSink))
    }

    pub fn with_sink(mut self, sink: Arc<dyn AuditSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn thresholds(&self) -> AuditThresholds {
        self.thresholds
    }

    fn is_auth_route(&self, route: &str) -> bool {
        self.auth_routes.iter().any(|p| p.matches(route))
    }

    /// Derive the events for a finished request. Pure; emits nothing.
    pub fn classify(&self, outcome: &RequestOutcome<'_>, ctx: &CorrelationContext) -> Vec<AuditEvent> {
        let actor = outcome.actor();
        let op = outcome.operation();
        let status = outcome.status;
        let millis = outcome.duration.as_millis();
        let request_id = Some(ctx.request_id().clone());
        let mut events = Vec::new();

        let user_agent = outcome
            .user_agent
            .map(|ua| ua.chars().take(USER_AGENT_MAX).collect::<String>())
            .unwrap_or_else(|| "unknown".to_string());
        events.push(
            AuditEvent::new(Channel::Api, Level::Info, AuditKind::ApiCall, actor)
                .detail(outcome.method)
                .detail(outcome.route)
                .detail(outcome.client_ip)
                .detail(format!("Response: {status}, Duration: {millis}ms"))
                .detail(format!("UA: {user_agent}"))
                .detail(format!("Ref: {}", outcome.referer.unwrap_or("direct"))),
        );

        events.push(
            AuditEvent::new(Channel::Performance, Level::Info, AuditKind::Performance, actor)
                .detail(op.clone())
                .detail(format!("{millis}ms"))
                .detail(format!("Status: {status}")),
        );

        if let Some(slowness) = self.thresholds.slowness(outcome.duration) {
            let label = match slowness {
                Slowness::VerySlow => "Very slow request",
                Slowness::Slow => "Slow request",
            };
            events.push(
                AuditEvent::new(
                    Channel::Performance,
                    Level::Warn,
                    AuditKind::SlowOperation(slowness),
                    actor,
                )
                .detail(op.clone())
                .detail(format!("{millis}ms"))
                .detail(format!("{label} - Status: {status}, User: {actor}")),
            );
        }

        if self.is_auth_route(outcome.route) {
            if (200..300).contains(&status) {
                events.push(
                    AuditEvent::new(Channel::Security, Level::Info, AuditKind::AuthSuccess, actor)
                        .detail(format!("{op} completed successfully")),
                );
            } else if status == 401 || status == 403 {
                events.push(
                    AuditEvent::new(Channel::Security, Level::Warn, AuditKind::AuthFailure, actor)
                        .detail(format!("{op} failed with status {status}"))
                        .risk(RiskLevel::Medium),
                );
            }
        }

        // Only requests that got past authentication count as admin operations.
        if outcome.route.starts_with(&self.admin_prefix) && outcome.identity.is_some() {
            events.push(
                AuditEvent::new(Channel::Security, Level::Info, AuditKind::AdminOperation, actor)
                    .detail(format!("Admin operation: {op} - Status: {status}")),
            );
        }

        if status == 403 {
            events.push(
                AuditEvent::new(Channel::Security, Level::Warn, AuditKind::AccessDenied, actor)
                    .detail(format!("Access denied for {op}"))
                    .risk(RiskLevel::High),
            );
        } else if status >= 500 {
            events.push(
                AuditEvent::new(Channel::Security, Level::Warn, AuditKind::ServerError, actor)
                    .detail(format!("Server error for {op} - Status: {status}")),
            );
        }

        events
            .into_iter()
            .map(|e| e.request_id(request_id.clone()))
            .collect()
    }

    /// Classify and emit. Never fails.
    pub fn observe(&self, outcome: &RequestOutcome<'_>, ctx: &CorrelationContext) {
        let events = self.classify(outcome, ctx);
        self.emit_all(&events);
    }

    /// Record a login attempt for `username`.
    pub fn login_attempt(&self, ctx: &CorrelationContext, username: &str, success: bool) {
        let (level, status) = if success {
            (Level::Info, "SUCCESS")
        } else {
            (Level::Warn, "FAILED")
        };
        self.emit(
            AuditEvent::new(Channel::Security, level, AuditKind::LoginAttempt, username)
                .detail(status)
                .detail(ctx.client_ip())
                .request_id(Some(ctx.request_id().clone())),
        );
    }

    pub fn security_event(&self, ctx: &CorrelationContext, kind: AuditKind, actor: &str, detail: &str) {
        self.emit(
            AuditEvent::new(Channel::Security, Level::Info, kind, actor)
                .detail(detail)
                .request_id(Some(ctx.request_id().clone())),
        );
    }

    pub fn security_event_with_risk(
        &self,
        ctx: &CorrelationContext,
        kind: AuditKind,
        actor: &str,
        detail: &str,
        risk: RiskLevel,
    ) {
        self.emit(
            AuditEvent::new(Channel::Security, Level::Warn, kind, actor)
                .detail(detail)
                .risk(risk)
                .request_id(Some(ctx.request_id().clone())),
        );
    }

    /// Record an operational error (ERROR level on the API channel).
    pub fn error(&self, ctx: &CorrelationContext, operation: &str, actor: &str, message: &str) {
        self.emit(
            AuditEvent::new(
                Channel::Api,
                Level::Error,
                AuditKind::Error(operation.to_string()),
                actor,
            )
            .detail(message)
            .request_id(Some(ctx.request_id().clone())),
        );
    }

    pub fn emit_all(&self, events: &[AuditEvent]) {
        for event in events {
            self.emit_ref(event);
        }
    }

    pub fn emit(&self, event: AuditEvent) {
        self.emit_ref(&event);
    }

    fn emit_ref(&self, event: &AuditEvent) {
        for sink in &self.sinks {
            let result = catch_unwind(AssertUnwindSafe(|| sink.append(event)));
            match result {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    tracing::warn!(target: "audit::fallback", error = %e, "{}", event.line());
                }
                Err(_) => {
                    tracing::warn!(target: "audit::fallback", error = "sink panicked", "{}", event.line());
                }
            }
        }
    }
}
