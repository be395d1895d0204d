//! HTTP API: the authentication gate, routing, and request/response mapping.

pub mod app;
pub mod gate;

pub use app::{App, AppServices, build_app};
pub use gate::{AuthenticationGate, HandlerFailure, Stage};
