//! EventEmitter - where executor, storage and scheduler send their records
//!
//! `EventLog` keeps them, `NoopEmitter` drops them, `TracingEmitter` mirrors
//! them to `tracing` before forwarding.

use std::sync::Arc;

use tracing::debug;

use super::log::{EventKind, EventLog};

pub trait EventEmitter: Send + Sync {
    /// Emit an event and return its ID
    fn emit(&self, kind: EventKind) -> u64;
}

impl EventEmitter for EventLog {
    fn emit(&self, kind: EventKind) -> u64 {
        EventLog::emit(self, kind)
    }
}

/// Drops every record; ids are always 0
#[derive(Debug, Clone, Default)]
pub struct NoopEmitter;

impl NoopEmitter {
    pub fn new() -> Self {
        Self
    }
}

impl EventEmitter for NoopEmitter {
    fn emit(&self, _kind: EventKind) -> u64 {
        0
    }
}

/// Logs each record at debug level under its run id, then forwards
pub struct TracingEmitter {
    inner: Arc<dyn EventEmitter>,
}

impl TracingEmitter {
    pub fn new(inner: Arc<dyn EventEmitter>) -> Self {
        Self { inner }
    }
}

impl EventEmitter for TracingEmitter {
    fn emit(&self, kind: EventKind) -> u64 {
        debug!(run_id = kind.run_id(), event = ?kind, "event");
        self.inner.emit(kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn initialized(run_id: &str) -> EventKind {
        EventKind::ResourceInitialized {
            run_id: run_id.into(),
            resource: "paths".into(),
        }
    }

    #[test]
    fn eventlog_through_arc_dyn() {
        let log = EventLog::new();
        let emitter: Arc<dyn EventEmitter> = Arc::new(log.clone());
        assert_eq!(emitter.emit(initialized("r1")), 0);
        assert_eq!(emitter.emit(initialized("r1")), 1);
        assert_eq!(log.len(), 2);
    }

    #[test]
    fn noop_emitter_records_nothing() {
        let noop = NoopEmitter::new();
        for _ in 0..3 {
            assert_eq!(noop.emit(initialized("r1")), 0);
        }
    }

    #[test]
    fn tracing_emitter_forwards_ids() {
        let log = EventLog::new();
        let emitter = TracingEmitter::new(Arc::new(log.clone()));

        emitter.emit(initialized("r1"));
        let id = emitter.emit(initialized("r2"));

        assert_eq!(id, 1);
        assert_eq!(log.filter_run("r2").len(), 1);
    }
}
