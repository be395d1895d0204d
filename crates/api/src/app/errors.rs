use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;
use thiserror::Error;

/// Handler-level failures with a stable JSON shape.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ApiError {
    /// Wrong username, wrong password, disabled account or directory
    /// failure. The caller is never told which.
    #[error("Invalid username or password")]
    AuthenticationFailed,

    #[error("Invalid or expired token")]
    InvalidToken,

    #[error("{0}")]
    Validation(String),

    #[error("user directory unavailable")]
    DirectoryUnavailable,

    #[error("Token could not be issued")]
    TokenIssue,
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::AuthenticationFailed => StatusCode::UNAUTHORIZED,
            ApiError::InvalidToken | ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::DirectoryUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::TokenIssue => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            ApiError::AuthenticationFailed => "authentication_failed",
            ApiError::InvalidToken => "invalid_token",
            ApiError::Validation(_) => "validation_error",
            ApiError::DirectoryUnavailable => "directory_unavailable",
            ApiError::TokenIssue => "token_issue_failed",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        json_error(self.status(), self.code(), self.to_string())
    }
}

pub fn json_error(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}
