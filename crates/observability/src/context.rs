//! Request correlation context.
//!
//! One [`CorrelationContext`] exists per in-flight request. It is passed
//! explicitly (the gate stores it in the request extensions) and is also
//! reachable through a task-local scope for code that only has the task.
//! The scope ends when the request future completes or is dropped, so no
//! context outlives its request.

use std::future::Future;

use trustgate_core::RequestId;

pub const ANONYMOUS: &str = "anonymous";
pub const NO_SESSION: &str = "no-session";

tokio::task_local! {
    static CURRENT: CorrelationContext;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorrelationContext {
    request_id: RequestId,
    actor: String,
    client_ip: String,
    session_id: String,
}

impl CorrelationContext {
    /// Start a context for a new request with a freshly generated id.
    pub fn start(actor: Option<&str>, client_ip: &str, session_id: Option<&str>) -> Self {
        Self::with_request_id(RequestId::generate(), actor, client_ip, session_id)
    }

    pub fn with_request_id(
        request_id: RequestId,
        actor: Option<&str>,
        client_ip: &str,
        session_id: Option<&str>,
    ) -> Self {
        Self {
            request_id,
            actor: actor.filter(|a| !a.is_empty()).unwrap_or(ANONYMOUS).to_string(),
            client_ip: client_ip.to_string(),
            session_id: session_id
                .filter(|s| !s.is_empty())
                .unwrap_or(NO_SESSION)
                .to_string(),
        }
    }

    pub fn request_id(&self) -> &RequestId {
        &self.request_id
    }

    pub fn actor(&self) -> &str {
        &self.actor
    }

    pub fn client_ip(&self) -> &str {
        &self.client_ip
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn is_anonymous(&self) -> bool {
        self.actor == ANONYMOUS
    }

    /// Tracing span carrying the correlation fields.
    pub fn span(&self) -> tracing::Span {
        tracing::info_span!(
            "request",
            request_id = %self.request_id,
            user = %self.actor,
            client_ip = %self.client_ip,
            session_id = %self.session_id,
        )
    }

    /// Run `fut` with this context installed as the task's current context.
    pub async fn scope<F: Future>(self, fut: F) -> F::Output {
        CURRENT.scope(self, fut).await
    }

    /// The context of the request running on this task, if any.
    pub fn current() -> Option<CorrelationContext> {
        CURRENT.try_with(|ctx| ctx.clone()).ok()
    }
}
