use axum::{Json, extract::Extension, http::StatusCode, response::IntoResponse};

use trustgate_auth::Identity;
use trustgate_observability::CorrelationContext;

pub async fn health() -> StatusCode {
    StatusCode::OK
}

/// GET /api/me - the caller as the gate resolved it
pub async fn me(
    Extension(identity): Extension<Identity>,
    Extension(ctx): Extension<CorrelationContext>,
) -> impl IntoResponse {
    Json(serde_json::json!({
        "username": identity.username(),
        "roles": identity.role_names(),
        "request_id": ctx.request_id().as_str(),
        "session_id": ctx.session_id(),
        "client_ip": ctx.client_ip(),
    }))
}
