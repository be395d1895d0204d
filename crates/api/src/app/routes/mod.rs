use axum::{Router, routing::get};

pub mod admin;
pub mod auth;
pub mod system;

/// Every route the service exposes. Access control is applied by the gate,
/// not here.
pub fn router() -> Router {
    Router::new()
        .route("/health", get(system::health))
        .route("/api/me", get(system::me))
        .nest("/api/auth", auth::router())
        .nest("/api/admin", admin::router())
}
