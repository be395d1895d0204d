use chrono::{DateTime, Utc};
use serde::Serialize;

use trustgate_core::RequestId;

/// Audit channel. Each channel has its own tag and tracing target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Channel {
    Api,
    Security,
    Performance,
}

impl Channel {
    /// Leading tag of the line format.
    pub fn tag(&self) -> &'static str {
        match self {
            Channel::Api => "API",
            Channel::Security => "SECURITY_EVENT",
            Channel::Performance => "PERFORMANCE",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Level {
    Info,
    Warn,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl RiskLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Low => "LOW",
            RiskLevel::Medium => "MEDIUM",
            RiskLevel::High => "HIGH",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Slowness {
    Slow,
    VerySlow,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(into = "String")]
pub enum AuditKind {
    AuthSuccess,
    AuthFailure,
    AdminOperation,
    AccessDenied,
    ServerError,
    SlowOperation(Slowness),
    ApiCall,
    Performance,
    LoginAttempt,
    LoginSuccess,
    LoginFailed,
    TokenRefreshSuccess,
    TokenRefreshFailed,
    Error(String),
}

impl AuditKind {
    pub fn as_str(&self) -> &str {
        match self {
            AuditKind::AuthSuccess => "AUTH_SUCCESS",
            AuditKind::AuthFailure => "AUTH_FAILURE",
            AuditKind::AdminOperation => "ADMIN_OPERATION",
            AuditKind::AccessDenied => "ACCESS_DENIED",
            AuditKind::ServerError => "SERVER_ERROR",
            AuditKind::SlowOperation(_) => "SLOW_OPERATION",
            AuditKind::ApiCall => "API_CALL",
            AuditKind::Performance => "PERFORMANCE",
            AuditKind::LoginAttempt => "LOGIN_ATTEMPT",
            AuditKind::LoginSuccess => "API_LOGIN_SUCCESS",
            AuditKind::LoginFailed => "API_LOGIN_FAILED",
            AuditKind::TokenRefreshSuccess => "TOKEN_REFRESH_SUCCESS",
            AuditKind::TokenRefreshFailed => "TOKEN_REFRESH_FAILED",
            AuditKind::Error(operation) => operation,
        }
    }
}

impl From<AuditKind> for String {
    fn from(value: AuditKind) -> Self {
        value.as_str().to_string()
    }
}

impl core::fmt::Display for AuditKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single audit record. Created, emitted, never modified.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuditEvent {
    pub channel: Channel,
    pub level: Level,
    pub kind: AuditKind,
    pub actor: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub risk: Option<RiskLevel>,
    pub details: Vec<String>,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<RequestId>,
}

impl AuditEvent {
    pub fn new(channel: Channel, level: Level, kind: AuditKind, actor: impl Into<String>) -> Self {
        Self {
            channel,
            level,
            kind,
            actor: actor.into(),
            risk: None,
            details: Vec::new(),
            timestamp: Utc::now(),
            request_id: None,
        }
    }

    pub fn detail(mut self, detail: impl Into<String>) -> Self {
        self.details.push(detail.into());
        self
    }

    pub fn risk(mut self, risk: RiskLevel) -> Self {
        self.risk = Some(risk);
        self
    }

    pub fn request_id(mut self, request_id: Option<RequestId>) -> Self {
        self.request_id = request_id;
        self
    }

    /// `CHANNEL_TAG | kind | actor | detail...[| Risk: LEVEL]`
    pub fn line(&self) -> String {
        let mut parts: Vec<&str> = Vec::with_capacity(self.details.len() + 4);
        parts.push(self.channel.tag());
        parts.push(self.kind.as_str());
        parts.push(&self.actor);
        parts.extend(self.details.iter().map(String::as_str));

        let mut line = parts.join(" | ");
        if let Some(risk) = self.risk {
            line.push_str(" | Risk: ");
            line.push_str(risk.as_str());
        }
        line
    }
}
