//! HTTP API application wiring (Axum router + service wiring).
//!
//! - `routes/`: HTTP routes + handlers (one file per area)
//! - `errors.rs`: consistent error responses
//!
//! The authentication gate in `crate::gate` wraps the whole router.

use std::sync::Arc;

use axum::{Extension, Router};

use trustgate_auth::{
    AccessPolicyEngine, Authenticator, Sha256Verifier, TokenService, UserDirectory,
};
use trustgate_core::{ConfigError, GateConfig};
use trustgate_observability::AuditPipeline;

use crate::gate::AuthenticationGate;

pub mod errors;
pub mod routes;

/// Shared, read-only services available to every handler.
pub struct AppServices {
    pub config: Arc<GateConfig>,
    pub tokens: Arc<TokenService>,
    pub policy: Arc<AccessPolicyEngine>,
    pub audit: Arc<AuditPipeline>,
    pub authenticator: Authenticator,
}

/// A built application: the router plus handles tests and the binary need.
pub struct App {
    pub router: Router,
    pub gate: AuthenticationGate,
    pub services: Arc<AppServices>,
}

/// Build the full HTTP router (public entrypoint used by `main.rs`).
pub fn build_app(
    config: GateConfig,
    directory: Arc<dyn UserDirectory>,
    audit: AuditPipeline,
) -> Result<App, ConfigError> {
    config.validate()?;
    let config = Arc::new(config);

    let tokens = Arc::new(TokenService::from_config(&config)?);
    let policy = Arc::new(AccessPolicyEngine::standard(&config)?);
    let audit = Arc::new(audit);
    let authenticator = Authenticator::new(directory, Arc::new(Sha256Verifier));

    let services = Arc::new(AppServices {
        config: config.clone(),
        tokens: tokens.clone(),
        policy: policy.clone(),
        audit: audit.clone(),
        authenticator,
    });

    let gate = AuthenticationGate::new(config, tokens, policy, audit);
    let router = gate.wrap(routes::router().layer(Extension(services.clone())));

    Ok(App {
        router,
        gate,
        services,
    })
}
