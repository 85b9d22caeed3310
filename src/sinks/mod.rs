//! C8 — Audit/Metrics sinks (boundary only, spec §4.8). The core emits
//! structured [`Event`]s; sinks are assumed non-blocking/best-effort, so the
//! trait methods never block the caller for long and never panic on a full
//! channel.
//!
//! Grounded on the non-blocking-send discipline of `src/command/stream.rs`'s
//! `Event` channel and the teacher's habit of swallowing sink send errors
//! with a logged warning (`health_checker.rs`'s `publish_health_event`).

use std::collections::HashMap;
use std::time::SystemTime;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventKind {
    ProcessStart,
    ProcessStop,
    ProcessCrash,
    ProcessRestart,
    ProcessScale,
    HealthPass,
    HealthFail,
    ScheduleFire,
    ScheduleSkip,
    ScheduleComplete,
    SystemStart,
    SystemShutdown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventStatus {
    Success,
    Failure,
    Error,
}

#[derive(Debug, Clone)]
pub struct ResourceIdentity {
    pub process: String,
    pub instance_ordinal: Option<u32>,
}

#[derive(Debug, Clone)]
pub struct Event {
    pub timestamp: SystemTime,
    pub kind: EventKind,
    pub resource: ResourceIdentity,
    pub status: EventStatus,
    pub context: HashMap<String, String>,
}

impl Event {
    pub fn new(kind: EventKind, process: impl Into<String>, status: EventStatus) -> Self {
        Event {
            timestamp: SystemTime::now(),
            kind,
            resource: ResourceIdentity {
                process: process.into(),
                instance_ordinal: None,
            },
            status,
            context: HashMap::new(),
        }
    }

    pub fn with_ordinal(mut self, ordinal: u32) -> Self {
        self.resource.instance_ordinal = Some(ordinal);
        self
    }

    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("sink channel is full, event dropped")]
    Full,
    #[error("sink is disconnected")]
    Disconnected,
}

/// Receives audit-trail-shaped events.
pub trait AuditSink: Send + Sync {
    fn emit(&self, event: &Event) -> Result<(), SinkError>;
}

/// Receives the same events for metrics aggregation. Split from
/// [`AuditSink`] only so an implementor can cheaply be "no-op for one, real
/// for the other" without conditionals, matching spec §4.8's two named
/// sinks.
pub trait MetricsSink: Send + Sync {
    fn emit(&self, event: &Event) -> Result<(), SinkError>;
}

/// Discards everything; used when no external sink is wired (tests, or a
/// deployment that doesn't care about audit/metrics).
pub struct NullSink;

impl AuditSink for NullSink {
    fn emit(&self, _event: &Event) -> Result<(), SinkError> {
        Ok(())
    }
}

impl MetricsSink for NullSink {
    fn emit(&self, _event: &Event) -> Result<(), SinkError> {
        Ok(())
    }
}

/// Bounded, non-blocking sink backed by a `crossbeam_channel`. `emit` never
/// blocks: a full channel drops the event and reports [`SinkError::Full`]
/// rather than stall the core (spec §4.8, §5 "Sink sends may suspend; they
/// MUST be cancellable or bounded").
pub struct ChannelSink {
    tx: crossbeam_channel::Sender<Event>,
}

impl ChannelSink {
    pub fn new(capacity: usize) -> (Self, crossbeam_channel::Receiver<Event>) {
        let (tx, rx) = crossbeam_channel::bounded(capacity);
        (ChannelSink { tx }, rx)
    }
}

impl AuditSink for ChannelSink {
    fn emit(&self, event: &Event) -> Result<(), SinkError> {
        self.tx.try_send(event.clone()).map_err(|e| match e {
            crossbeam_channel::TrySendError::Full(_) => SinkError::Full,
            crossbeam_channel::TrySendError::Disconnected(_) => SinkError::Disconnected,
        })
    }
}

impl MetricsSink for ChannelSink {
    fn emit(&self, event: &Event) -> Result<(), SinkError> {
        AuditSink::emit(self, event)
    }
}

/// A pair of sinks the rest of the crate emits into. Both best-effort.
#[derive(Clone)]
pub struct Sinks {
    pub audit: std::sync::Arc<dyn AuditSink>,
    pub metrics: std::sync::Arc<dyn MetricsSink>,
}

impl Sinks {
    pub fn null() -> Self {
        Sinks {
            audit: std::sync::Arc::new(NullSink),
            metrics: std::sync::Arc::new(NullSink),
        }
    }

    pub fn emit(&self, event: Event) {
        let _ = self.audit.emit(&event);
        let _ = self.metrics.emit(&event);
    }
}
