//! Runtime Module - run execution
//!
//! - `context`: `RunRequest`, `RunContext`, `RunStatus`, `RunOutcome`
//! - `executor`: topological execution with storage as the transport
//!
//! For static structure, see the `job` module.

mod context;
mod executor;

pub use context::{ArtifactRecord, RunContext, RunOutcome, RunRequest, RunStatus};
pub use executor::Executor;
