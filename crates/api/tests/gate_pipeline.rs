//! In-process gate tests driven through `tower::ServiceExt::oneshot`.
//!
//! Time is paused so slow and stuck handlers complete instantly while the
//! gate still measures their virtual duration.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    Router,
    body::Body,
    extract::Path,
    http::{Request, StatusCode},
    response::Response,
    routing::get,
};
use chrono::Utc;
use tower::ServiceExt;

use trustgate_api::AuthenticationGate;
use trustgate_auth::{AccessPolicyEngine, Identity, Role, TokenService};
use trustgate_core::GateConfig;
use trustgate_observability::{AuditKind, AuditPipeline, CorrelationContext, MemorySink, Slowness};

struct Harness {
    router: Router,
    gate: AuthenticationGate,
    audit: Arc<MemorySink>,
    token: String,
}

impl Harness {
    fn new(config: GateConfig) -> Self {
        let config = Arc::new(config);
        let tokens = Arc::new(TokenService::from_config(&config).unwrap());
        let policy = Arc::new(AccessPolicyEngine::standard(&config).unwrap());
        let audit = Arc::new(MemorySink::new());
        let pipeline = Arc::new(AuditPipeline::new(&config).with_sink(audit.clone()));

        let token = tokens
            .issue_default(&Identity::new("alice", [Role::USER]), Utc::now())
            .unwrap()
            .into_string();
        let gate = AuthenticationGate::new(config, tokens, policy, pipeline);

        let routes = Router::new()
            .route("/health", get(|| async { StatusCode::OK }))
            .route("/api/slow/:ms", get(slow))
            .route("/api/explode", get(explode))
            .route("/api/stuck", get(stuck))
            .route("/api/context", get(current_actor));

        Self {
            router: gate.wrap(routes),
            gate,
            audit,
            token,
        }
    }

    async fn get(&self, path: &str) -> Response {
        let request = Request::builder()
            .uri(path)
            .header("authorization", format!("Bearer {}", self.token))
            .body(Body::empty())
            .unwrap();
        self.router.clone().oneshot(request).await.unwrap()
    }

    fn slowness(&self) -> Vec<Slowness> {
        self.audit
            .events()
            .into_iter()
            .filter_map(|e| match e.kind {
                AuditKind::SlowOperation(s) => Some(s),
                _ => None,
            })
            .collect()
    }
}

async fn slow(Path(ms): Path<u64>) -> StatusCode {
    tokio::time::sleep(Duration::from_millis(ms)).await;
    StatusCode::OK
}

async fn explode() -> StatusCode {
    panic!("handler exploded");
}

async fn stuck() -> StatusCode {
    std::future::pending::<()>().await;
    StatusCode::OK
}

async fn current_actor() -> String {
    CorrelationContext::current()
        .map(|ctx| ctx.actor().to_string())
        .unwrap_or_default()
}

async fn body_json(response: Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test(start_paused = true)]
async fn slow_requests_are_classified_by_duration() {
    let cases = [
        (0, vec![]),
        (1_500, vec![]),
        (2_000, vec![Slowness::Slow]),
        (4_000, vec![Slowness::Slow]),
        (5_000, vec![Slowness::VerySlow]),
        (7_000, vec![Slowness::VerySlow]),
    ];

    for (ms, expected) in cases {
        let harness = Harness::new(GateConfig::with_secret("s"));
        let response = harness.get(&format!("/api/slow/{ms}")).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(harness.slowness(), expected, "handler took {ms}ms");
    }
}

#[tokio::test(start_paused = true)]
async fn handler_panic_becomes_500_and_releases_context() {
    let harness = Harness::new(GateConfig::with_secret("s"));

    let response = harness.get("/api/explode").await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert!(response.headers().contains_key("x-request-id"));
    let body = body_json(response).await;
    assert_eq!(body["error"], "handler_failure");
    assert!(!body.to_string().contains("exploded"));

    assert_eq!(harness.gate.in_flight(), 0);
    assert!(CorrelationContext::current().is_none());
    assert_eq!(harness.audit.of_kind("SERVER_ERROR").len(), 1);
    assert_eq!(harness.audit.of_kind("HANDLER_PANIC").len(), 1);
}

#[tokio::test(start_paused = true)]
async fn handler_timeout_becomes_504() {
    let harness = Harness::new(GateConfig {
        handler_timeout_ms: Some(1_000),
        ..GateConfig::with_secret("s")
    });

    let response = harness.get("/api/slow/60000").await;
    assert_eq!(response.status(), StatusCode::GATEWAY_TIMEOUT);
    assert_eq!(body_json(response).await["error"], "handler_timeout");

    assert_eq!(harness.gate.in_flight(), 0);
    assert_eq!(harness.audit.of_kind("SERVER_ERROR").len(), 1);
    assert!(harness.slowness().is_empty());
}

#[tokio::test(start_paused = true)]
async fn cancelled_request_still_completes() {
    let harness = Harness::new(GateConfig::with_secret("s"));

    let pending = harness.get("/api/stuck");
    let result = tokio::time::timeout(Duration::from_millis(50), pending).await;
    assert!(result.is_err());

    assert_eq!(harness.gate.in_flight(), 0);
    let calls = harness.audit.of_kind("API_CALL");
    assert_eq!(calls.len(), 1);
    assert!(calls[0].details.iter().any(|d| d.starts_with("Response: 499")));
}

#[tokio::test]
async fn context_is_visible_to_the_handler_only() {
    let harness = Harness::new(GateConfig::with_secret("s"));

    let response = harness.get("/api/context").await;
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    assert_eq!(&bytes[..], b"alice");

    assert!(CorrelationContext::current().is_none());
    assert_eq!(harness.gate.in_flight(), 0);
}

#[tokio::test]
async fn excluded_routes_bypass_the_gate() {
    let harness = Harness::new(GateConfig::with_secret("s"));

    let request = Request::builder().uri("/health").body(Body::empty()).unwrap();
    let response = harness.router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(!response.headers().contains_key("x-request-id"));
    assert!(harness.audit.is_empty());
}

#[tokio::test]
async fn missing_token_is_anonymous_and_unauthorized() {
    let harness = Harness::new(GateConfig::with_secret("s"));

    let request = Request::builder()
        .uri("/api/context")
        .body(Body::empty())
        .unwrap();
    let response = harness.router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let calls = harness.audit.of_kind("API_CALL");
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].actor, "anonymous");
    assert_eq!(harness.gate.in_flight(), 0);
}
