use std::sync::{Arc, Mutex};

use thiserror::Error;
use tokio::sync::mpsc;

use super::{AuditEvent, AuditKind, Channel, Level};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuditSinkError {
    #[error("audit queue is full")]
    QueueFull,

    #[error("audit sink is closed")]
    Closed,

    #[error("audit sink write failed: {0}")]
    Write(String),
}

/// Destination for audit events.
///
/// Implementations must tolerate concurrent appends and must not block on
/// slow I/O; wrap such sinks in [`BufferedSink`].
pub trait AuditSink: Send + Sync {
    fn append(&self, event: &AuditEvent) -> Result<(), AuditSinkError>;
}

impl<S: AuditSink + ?Sized> AuditSink for Arc<S> {
    fn append(&self, event: &AuditEvent) -> Result<(), AuditSinkError> {
        (**self).append(event)
    }
}

/// Writes each event as one log line on its channel's tracing target.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

macro_rules! emit_on {
    ($target:literal, $level:expr, $event:expr, $line:expr) => {{
        let event = $event;
        let request_id = event.request_id.as_ref().map(|id| id.as_str()).unwrap_or("");
        let risk = event.risk.map(|r| r.as_str()).unwrap_or("");
        match $level {
            Level::Info => tracing::info!(
                target: $target,
                kind = event.kind.as_str(),
                actor = %event.actor,
                request_id,
                risk,
                "{}",
                $line
            ),
            Level::Warn => tracing::warn!(
                target: $target,
                kind = event.kind.as_str(),
                actor = %event.actor,
                request_id,
                risk,
                "{}",
                $line
            ),
            Level::Error => tracing::error!(
                target: $target,
                kind = event.kind.as_str(),
                actor = %event.actor,
                request_id,
                risk,
                "{}",
                $line
            ),
        }
    }};
}

impl AuditSink for TracingSink {
    fn append(&self, event: &AuditEvent) -> Result<(), AuditSinkError> {
        let line = event.line();
        match event.channel {
            Channel::Api => emit_on!("audit::api", event.level, event, line),
            Channel::Security => emit_on!("audit::security", event.level, event, line),
            Channel::Performance => emit_on!("audit::performance", event.level, event, line),
        }
        Ok(())
    }
}

/// In-process recorder, mainly for tests and diagnostics endpoints.
#[derive(Debug, Default)]
pub struct MemorySink {
    events: Mutex<Vec<AuditEvent>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<AuditEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }

    pub fn on_channel(&self, channel: Channel) -> Vec<AuditEvent> {
        self.events()
            .into_iter()
            .filter(|e| e.channel == channel)
            .collect()
    }

    /// Events whose tag equals `kind` (e.g. `"ACCESS_DENIED"`).
    pub fn of_kind(&self, kind: &str) -> Vec<AuditEvent> {
        self.events()
            .into_iter()
            .filter(|e| e.kind.as_str() == kind)
            .collect()
    }

    pub fn count(&self, kind: &AuditKind) -> usize {
        self.events().iter().filter(|e| &e.kind == kind).count()
    }

    pub fn len(&self) -> usize {
        self.events.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        if let Ok(mut events) = self.events.lock() {
            events.clear();
        }
    }
}

impl AuditSink for MemorySink {
    fn append(&self, event: &AuditEvent) -> Result<(), AuditSinkError> {
        let mut events = self
            .events
            .lock()
            .map_err(|_| AuditSinkError::Write("memory sink lock poisoned".to_string()))?;
        events.push(event.clone());
        Ok(())
    }
}

/// Decouples a slow sink from the request path.
///
/// Events go into a bounded queue drained by a blocking worker. A full queue
/// drops the event (reported as [`AuditSinkError::QueueFull`]) instead of
/// applying backpressure to requests.
#[derive(Debug, Clone)]
pub struct BufferedSink {
    tx: mpsc::Sender<AuditEvent>,
}

impl BufferedSink {
    /// Spawn the drain worker on the current tokio runtime.
    ///
    /// The worker exits once every `BufferedSink` clone has been dropped and
    /// the queue is empty.
    pub fn spawn<S>(inner: S, capacity: usize) -> (Self, tokio::task::JoinHandle<()>)
    where
        S: AuditSink + 'static,
    {
        let (tx, mut rx) = mpsc::channel::<AuditEvent>(capacity.max(1));
        let handle = tokio::task::spawn_blocking(move || {
            while let Some(event) = rx.blocking_recv() {
                if let Err(e) = inner.append(&event) {
                    tracing::warn!(
                        target: "audit::fallback",
                        error = %e,
                        "dropped audit event: {}",
                        event.line()
                    );
                }
            }
        });
        (Self { tx }, handle)
    }
}

impl AuditSink for BufferedSink {
    fn append(&self, event: &AuditEvent) -> Result<(), AuditSinkError> {
        self.tx.try_send(event.clone()).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => AuditSinkError::QueueFull,
            mpsc::error::TrySendError::Closed(_) => AuditSinkError::Closed,
        })
    }
}
