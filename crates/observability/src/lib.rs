//! Tracing setup, request correlation and the audit pipeline.

/// Initialize process-wide tracing/logging with JSON output.
///
/// This is safe to call multiple times; subsequent calls become no-ops.
pub fn init() {
    tracing::init(LogFormat::default());
}

/// Like [`init`], with an explicit output format.
pub fn init_with(format: LogFormat) {
    tracing::init(format);
}

/// Tracing configuration (filters, layers).
pub mod tracing;

/// Per-request correlation state.
pub mod context;

/// Audit/security event classification and sinks.
pub mod audit;

pub use audit::{
    AuditEvent, AuditKind, AuditPipeline, AuditSink, AuditSinkError, AuditThresholds, BufferedSink,
    Channel, Level, MemorySink, RequestOutcome, RiskLevel, Slowness, TracingSink,
};
pub use context::CorrelationContext;
pub use crate::tracing::LogFormat;
