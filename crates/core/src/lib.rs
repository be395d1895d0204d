//! `trustgate-core`: shared building blocks for the trust pipeline.
//!
//! This crate holds configuration, route patterns and identifiers. It has no
//! HTTP or runtime dependencies.

pub mod config;
pub mod error;
pub mod id;
pub mod route;

pub use config::{DEV_SECRET, GateConfig};
pub use error::{ConfigError, ConfigResult};
pub use id::RequestId;
pub use route::RoutePattern;
