//! Job Module - operator graph resolution and build-time validation
//!
//! - `graph`: edges from typed port matching, cycle detection, ordering
//! - `builder`: `JobBuilder::build` binds config and produces a `Job`

mod builder;
mod graph;

pub use builder::{Job, JobBuilder, Step};
pub use graph::{DepVec, InputBinding, InputSource, OperatorGraph};
