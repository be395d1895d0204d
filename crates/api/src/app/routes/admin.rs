//! Administrative endpoints.
//!
//! The gate only admits callers holding the `ADMIN` role here, so handlers
//! do not re-check it.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Query, rejection::QueryRejection},
    routing::get,
};
use serde::{Deserialize, Serialize};

use trustgate_auth::{AccessExplanation, Identity, RoleRecord, UserRecord};
use trustgate_observability::CorrelationContext;

use crate::app::{AppServices, errors::ApiError};

#[derive(Debug, Deserialize)]
pub struct ExplainQuery {
    pub route: String,
}

#[derive(Debug, Serialize)]
pub struct UserSummary {
    pub username: String,
    pub email: String,
    pub roles: Vec<String>,
    pub active: bool,
}

impl From<UserRecord> for UserSummary {
    fn from(record: UserRecord) -> Self {
        Self {
            roles: record.roles.iter().map(ToString::to_string).collect(),
            username: record.username,
            email: record.email,
            active: record.active,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct UsersResponse {
    pub users: Vec<UserSummary>,
}

#[derive(Debug, Serialize)]
pub struct RolesResponse {
    pub roles: Vec<RoleRecord>,
}

#[derive(Debug, Serialize)]
pub struct ExplainResponse {
    pub explanation: AccessExplanation,
}

pub fn router() -> Router {
    Router::new()
        .route("/users", get(list_users))
        .route("/roles", get(list_roles))
        .route("/access/explain", get(explain_access))
}

/// GET /api/admin/users
pub async fn list_users(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<CorrelationContext>,
    Extension(identity): Extension<Identity>,
) -> Result<Json<UsersResponse>, ApiError> {
    let users = services
        .authenticator
        .directory()
        .list_users()
        .map_err(|e| {
            services
                .audit
                .error(&ctx, "ADMIN_LIST_USERS", identity.username(), &e.to_string());
            ApiError::DirectoryUnavailable
        })?;

    Ok(Json(UsersResponse {
        users: users.into_iter().map(UserSummary::from).collect(),
    }))
}

/// GET /api/admin/roles
pub async fn list_roles(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<CorrelationContext>,
    Extension(identity): Extension<Identity>,
) -> Result<Json<RolesResponse>, ApiError> {
    let roles = services
        .authenticator
        .directory()
        .list_roles()
        .map_err(|e| {
            services
                .audit
                .error(&ctx, "ADMIN_LIST_ROLES", identity.username(), &e.to_string());
            ApiError::DirectoryUnavailable
        })?;

    Ok(Json(RolesResponse { roles }))
}

/// GET /api/admin/access/explain?route=X - why the caller can or cannot reach X
pub async fn explain_access(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(identity): Extension<Identity>,
    query: Result<Query<ExplainQuery>, QueryRejection>,
) -> Result<Json<ExplainResponse>, ApiError> {
    let Query(query) = query.map_err(|e| ApiError::Validation(e.body_text()))?;
    if !query.route.starts_with('/') {
        return Err(ApiError::Validation("route must start with '/'".to_string()));
    }

    let explanation = services.policy.explain(&query.route, Some(&identity));
    Ok(Json(ExplainResponse { explanation }))
}
