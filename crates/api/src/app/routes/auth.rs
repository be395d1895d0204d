//! Login and token refresh.
//!
//! Both routes are public: the gate does not validate a credential for them,
//! so each handler does its own checking and records the outcome.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, rejection::JsonRejection},
    http::HeaderMap,
    routing::post,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};

use trustgate_auth::{LoginError, TokenError};
use trustgate_observability::{AuditKind, CorrelationContext, RiskLevel};

use crate::app::{AppServices, errors::ApiError};
use crate::gate::bearer_token;

const TOKEN_TYPE: &str = "Bearer";

#[derive(Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub token: String,
    pub username: String,
    #[serde(rename = "type")]
    pub token_type: &'static str,
    pub email: String,
    pub roles: Vec<String>,
}

pub fn router() -> Router {
    Router::new()
        .route("/login", post(login))
        .route("/refresh", post(refresh))
}

/// POST /api/auth/login
pub async fn login(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<CorrelationContext>,
    body: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<Json<AuthResponse>, ApiError> {
    let Json(request) = body.map_err(|e| ApiError::Validation(e.body_text()))?;
    let username = request.username.trim();
    if username.is_empty() || request.password.is_empty() {
        return Err(ApiError::Validation(
            "username and password are required".to_string(),
        ));
    }

    tracing::info!(username, client_ip = ctx.client_ip(), "login attempt");
    let audit = &services.audit;

    match services.authenticator.authenticate(username, &request.password) {
        Ok(user) => {
            audit.login_attempt(&ctx, username, true);
            audit.security_event(&ctx, AuditKind::LoginSuccess, username, "User logged in via API");

            let token = services
                .tokens
                .issue_default(&user.identity, Utc::now())
                .map_err(|e| {
                    audit.error(&ctx, "API_TOKEN_ISSUE_ERROR", username, &e.to_string());
                    ApiError::TokenIssue
                })?;
            Ok(Json(AuthResponse {
                token: token.into_string(),
                username: user.identity.username().to_string(),
                token_type: TOKEN_TYPE,
                email: user.email,
                roles: user.identity.role_names(),
            }))
        }
        Err(LoginError::InvalidCredentials) => {
            audit.login_attempt(&ctx, username, false);
            audit.security_event_with_risk(
                &ctx,
                AuditKind::LoginFailed,
                username,
                "Failed API login attempt",
                RiskLevel::Medium,
            );
            Err(ApiError::AuthenticationFailed)
        }
        Err(LoginError::Directory(e)) => {
            tracing::error!(error = %e, "credential lookup failed");
            audit.login_attempt(&ctx, username, false);
            audit.error(&ctx, "API_AUTHENTICATION_ERROR", username, &e.to_string());
            Err(ApiError::AuthenticationFailed)
        }
    }
}

/// POST /api/auth/refresh
///
/// Responds with the new token as a plain-text body.
pub async fn refresh(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<CorrelationContext>,
    headers: HeaderMap,
) -> Result<String, ApiError> {
    let audit = &services.audit;
    let Some(token) = bearer_token(&headers) else {
        audit.security_event_with_risk(
            &ctx,
            AuditKind::TokenRefreshFailed,
            ctx.actor(),
            "Refresh requested without a bearer token",
            RiskLevel::Low,
        );
        return Err(ApiError::InvalidToken);
    };

    let now = Utc::now();
    let refreshed = services
        .tokens
        .validate(token, now)
        .and_then(|identity| Ok((services.tokens.refresh(token, now)?, identity)));

    match refreshed {
        Ok((token, identity)) => {
            audit.security_event(
                &ctx,
                AuditKind::TokenRefreshSuccess,
                identity.username(),
                "Token refreshed",
            );
            Ok(token.into_string())
        }
        Err(e) => {
            audit.security_event_with_risk(
                &ctx,
                AuditKind::TokenRefreshFailed,
                ctx.actor(),
                &format!("Token refresh failed: {}", e.code()),
                RiskLevel::Low,
            );
            match e {
                TokenError::Encoding => Err(ApiError::TokenIssue),
                _ => Err(ApiError::InvalidToken),
            }
        }
    }
}
