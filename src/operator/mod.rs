//! Operator Module - typed units of computation
//!
//! - `spec`: static declaration (name, typed ports, resources, config schema)
//! - `invoke`: the `Operator` trait, invocation context and `OperatorError`
//! - `builtin`: string operators of the `clean_string` pipeline

mod builtin;
mod invoke;
mod spec;

pub use builtin::{CleanString, FetchString, NormalizeString};
pub use invoke::{FnOperator, Inputs, OpContext, Operator, OperatorError, Outputs};
pub use spec::{validate_name, OperatorSpec, Port, PortType};
