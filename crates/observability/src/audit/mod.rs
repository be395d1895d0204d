//! Audit trail for the request pipeline.
//!
//! This module provides:
//! - `AuditEvent`: write-once record on one of three channels
//! - `AuditPipeline`: classifies completed requests into events and fans
//!   them out to sinks
//! - `AuditSink` implementations: tracing targets, in-memory recorder, and a
//!   buffered decoupling wrapper
//!
//! Emission never fails the request: sink errors are reduced to a local
//! fallback log entry.

mod event;
mod pipeline;
mod sink;

pub use event::{AuditEvent, AuditKind, Channel, Level, RiskLevel, Slowness};
pub use pipeline::{AuditPipeline, AuditThresholds, RequestOutcome};
pub use sink::{AuditSink, AuditSinkError, BufferedSink, MemorySink, TracingSink};
