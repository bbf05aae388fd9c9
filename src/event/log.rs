//! EventLog - append-only record of run execution
//!
//! - Event: envelope with id + timestamp + kind
//! - EventKind: run / step / artifact / resource / schedule levels
//! - EventLog: thread-safe, append-only log shared by concurrent runs

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::RwLock; // 2-3x faster than std::sync::RwLock

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Single event in the execution log
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// Monotonic sequence ID (for ordering)
    pub id: u64,
    /// Time since log creation (ms)
    pub timestamp_ms: u64,
    /// Event type and data
    pub kind: EventKind,
}

/// All possible event types
///
/// Uses Arc<str> for run/operator ids to enable zero-cost cloning.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventKind {
    // ═══════════════════════════════════════════
    // RUN LEVEL
    // ═══════════════════════════════════════════
    RunStarted {
        run_id: Arc<str>,
        job: String,
        operator_count: usize,
        tags: BTreeMap<String, String>,
    },
    RunSucceeded {
        run_id: Arc<str>,
        artifact_count: usize,
        total_duration_ms: u64,
    },
    RunFailed {
        run_id: Arc<str>,
        failed_operator: Option<Arc<str>>,
        error: String,
    },
    ResourceInitialized {
        run_id: Arc<str>,
        resource: String,
    },

    // ═══════════════════════════════════════════
    // STEP LEVEL
    // ═══════════════════════════════════════════
    StepStarted {
        run_id: Arc<str>,
        operator: Arc<str>,
        /// Resolved inputs (what the operator receives)
        inputs: Value,
    },
    StepSucceeded {
        run_id: Arc<str>,
        operator: Arc<str>,
        outputs: Vec<String>,
        duration_ms: u64,
    },
    StepFailed {
        run_id: Arc<str>,
        operator: Arc<str>,
        error: String,
        duration_ms: u64,
    },

    // ═══════════════════════════════════════════
    // STORAGE
    // ═══════════════════════════════════════════
    /// An artifact was persisted
    ArtifactMaterialized {
        run_id: Arc<str>,
        operator: Arc<str>,
        output: String,
        location: String,
        /// Character length of string payloads, serialized length otherwise
        len: usize,
    },
    ArtifactLoaded {
        run_id: Arc<str>,
        operator: Arc<str>,
        output: String,
        location: String,
    },

    // ═══════════════════════════════════════════
    // SCHEDULE
    // ═══════════════════════════════════════════
    ScheduleTicked {
        schedule: String,
        run_id: Arc<str>,
        scheduled_at: String,
    },
}

impl EventKind {
    /// Run id every event is scoped to
    pub fn run_id(&self) -> &str {
        match self {
            Self::RunStarted { run_id, .. }
            | Self::RunSucceeded { run_id, .. }
            | Self::RunFailed { run_id, .. }
            | Self::ResourceInitialized { run_id, .. }
            | Self::StepStarted { run_id, .. }
            | Self::StepSucceeded { run_id, .. }
            | Self::StepFailed { run_id, .. }
            | Self::ArtifactMaterialized { run_id, .. }
            | Self::ArtifactLoaded { run_id, .. }
            | Self::ScheduleTicked { run_id, .. } => run_id,
        }
    }

    /// Extract operator name if event is step- or artifact-related
    pub fn operator(&self) -> Option<&str> {
        match self {
            Self::StepStarted { operator, .. }
            | Self::StepSucceeded { operator, .. }
            | Self::StepFailed { operator, .. }
            | Self::ArtifactMaterialized { operator, .. }
            | Self::ArtifactLoaded { operator, .. } => Some(operator),
            Self::RunFailed {
                failed_operator, ..
            } => failed_operator.as_deref(),
            Self::RunStarted { .. }
            | Self::RunSucceeded { .. }
            | Self::ResourceInitialized { .. }
            | Self::ScheduleTicked { .. } => None,
        }
    }

    pub fn is_run_event(&self) -> bool {
        matches!(
            self,
            Self::RunStarted { .. } | Self::RunSucceeded { .. } | Self::RunFailed { .. }
        )
    }
}

/// Thread-safe, append-only event log
#[derive(Clone)]
pub struct EventLog {
    events: Arc<RwLock<Vec<Event>>>,
    start_time: Instant,
    next_id: Arc<AtomicU64>,
}

impl EventLog {
    pub fn new() -> Self {
        Self {
            events: Arc::new(RwLock::new(Vec::new())),
            start_time: Instant::now(),
            next_id: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Emit an event (thread-safe, returns event ID)
    pub fn emit(&self, kind: EventKind) -> u64 {
        // Id allocation and push happen under one write lock so the
        // stored order matches id order.
        let mut events = self.events.write();
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        events.push(Event {
            id,
            timestamp_ms: self.start_time.elapsed().as_millis() as u64,
            kind,
        });
        id
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.read().clone()
    }

    /// Events belonging to one run
    pub fn filter_run(&self, run_id: &str) -> Vec<Event> {
        self.events
            .read()
            .iter()
            .filter(|e| e.kind.run_id() == run_id)
            .cloned()
            .collect()
    }

    /// Events of one operator within one run
    pub fn filter_operator(&self, run_id: &str, operator: &str) -> Vec<Event> {
        self.filter_run(run_id)
            .into_iter()
            .filter(|e| e.kind.operator() == Some(operator))
            .collect()
    }

    /// Materializations recorded for a run, in emission order
    pub fn materializations(&self, run_id: &str) -> Vec<Event> {
        self.filter_run(run_id)
            .into_iter()
            .filter(|e| matches!(e.kind, EventKind::ArtifactMaterialized { .. }))
            .collect()
    }

    pub fn to_json(&self) -> Value {
        serde_json::to_value(self.events()).unwrap_or(Value::Null)
    }

    pub fn len(&self) -> usize {
        self.events.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for EventLog {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for EventLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventLog").field("len", &self.len()).finish()
    }
}
