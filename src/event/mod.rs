//! Event Module - observability records of run execution
//!
//! Key types:
//! - `Event`: Envelope with id + timestamp + kind
//! - `EventKind`: run / step / artifact / resource / schedule events
//! - `EventLog`: Thread-safe, append-only log
//! - `EventEmitter`: Trait for dependency injection
//! - `NoopEmitter`: Zero-cost no-op for testing
//! - `TracingEmitter`: debug-logs each record, then forwards
//! - `TraceWriter`: NDJSON file writer for post-mortem inspection

mod emitter;
mod log;
mod trace;

pub use emitter::{EventEmitter, NoopEmitter, TracingEmitter};
pub use log::{Event, EventKind, EventLog};
pub use trace::{read_trace, TraceWriter, TRACE_DIR};
