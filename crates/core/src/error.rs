//! Configuration error model.

use thiserror::Error;

/// Result type used when loading configuration.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Startup configuration error.
///
/// These are raised once, at process start. Nothing in the request path
/// produces them.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// The signing secret is missing or empty.
    #[error("signing secret must not be empty")]
    EmptySecret,

    /// A numeric setting is out of its allowed range.
    #[error("invalid value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },

    /// A route pattern could not be parsed.
    #[error("invalid route pattern '{0}'")]
    InvalidPattern(String),
}

impl ConfigError {
    pub fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            field,
            reason: reason.into(),
        }
    }
}
