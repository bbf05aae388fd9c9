//! Opgraph - typed operator graph runner
//!
//! Operators with typed ports are wired into a DAG, validated and bound
//! to config at build time, then executed under a run id whose artifacts
//! live in isolated storage. A cron scheduler turns ticks into new runs.
//!
//! ## Module Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                        DOMAIN MODEL                          │
//! │  operator/  OperatorSpec, typed ports, Operator trait        │
//! │  resource/  ResourceKey, per-run Resources, ResourceView     │
//! │  config/    RunConfig, ConfigSchema, EngineConfig            │
//! └──────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌──────────────────────────────────────────────────────────────┐
//! │                      APPLICATION LAYER                       │
//! │  job/       OperatorGraph, JobBuilder → Job                  │
//! │  runtime/   Executor, RunContext, RunOutcome                 │
//! │  schedule/  CronSchedule, Scheduler                          │
//! └──────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌──────────────────────────────────────────────────────────────┐
//! │                    INFRASTRUCTURE LAYER                      │
//! │  storage/   IoManager (filesystem, memory), RunStorage       │
//! │  event/     EventLog, EventEmitter, NDJSON traces            │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Responsibilities
//!
//! | Module | Responsibility |
//! |--------|----------------|
//! | [`operator`] | Operator declarations, invocation, built-in string operators |
//! | [`resource`] | Closed resource set, validation, per-run instantiation |
//! | [`config`] | Run config sections, schemas, engine settings |
//! | [`job`] | Port matching, cycle detection, topological order |
//! | [`runtime`] | Run state machine with admission control |
//! | [`schedule`] | Cron cadence, tick → run request, shutdown |
//! | [`storage`] | Run-scoped artifact persistence |
//! | [`event`] | Observability records of runs |
//! | [`catalog`] | The built-in `clean_string` job |
//! | [`error`] | Error types with fix suggestions |

// ═══════════════════════════════════════════════════════════════
// DOMAIN MODEL
// ═══════════════════════════════════════════════════════════════
pub mod operator;
pub mod resource;

// ═══════════════════════════════════════════════════════════════
// APPLICATION LAYER
// ═══════════════════════════════════════════════════════════════
pub mod catalog;
pub mod job;
pub mod runtime;
pub mod schedule;

// ═══════════════════════════════════════════════════════════════
// INFRASTRUCTURE LAYER
// ═══════════════════════════════════════════════════════════════
pub mod event;
pub mod storage;

// ═══════════════════════════════════════════════════════════════
// CROSS-CUTTING
// ═══════════════════════════════════════════════════════════════
pub mod config;
pub mod error;

// ═══════════════════════════════════════════════════════════════
// PUBLIC API RE-EXPORTS
// ═══════════════════════════════════════════════════════════════

pub use error::{FixSuggestion, OpgraphError, Result};

pub use config::{ConfigSchema, ConfigType, EngineConfig, RunConfig};

pub use operator::{
    CleanString, FetchString, FnOperator, Inputs, NormalizeString, OpContext, Operator,
    OperatorError, OperatorSpec, Outputs, PortType,
};
pub use resource::{ResourceKey, Resources};

pub use job::{Job, JobBuilder};
pub use runtime::{Executor, RunOutcome, RunRequest, RunStatus};
pub use schedule::{CronSchedule, ScheduleDef, Scheduler};

pub use event::{Event, EventEmitter, EventKind, EventLog, NoopEmitter, TracingEmitter};
pub use storage::{
    ArtifactKey, ArtifactLocation, FsIoManager, IoManager, MemoryIoManager, StorageBackend,
};
