//! Resource Module - shared, configurable dependencies of a run
//!
//! Resources are identified by the closed `ResourceKey` enum, validated at
//! build time, constructed once per run and injected into the operators
//! that declare them.

mod definition;
mod registry;

pub use definition::{
    mask_token, ConnectionHandle, MetricsSink, PathContext, ResourceInstance, ResourceKey,
};
pub use registry::{ResourceRegistry, ResourceView, Resources};
