// The #[error] attribute from thiserror uses struct fields via string interpolation,
// but Rust's unused_assignments lint doesn't recognize this.
#![allow(unused_assignments)]

//! Opgraph Error Types with Error Codes
//!
//! Error code ranges:
//! - OPG-000-009: Configuration errors (build time)
//! - OPG-010-019: Wiring errors (build time)
//! - OPG-020-029: Graph errors (build time)
//! - OPG-030-039: Storage errors (run time)
//! - OPG-040-049: Run errors (run time)
//! - OPG-050-059: Schedule errors
//! - OPG-090-099: IO / serialization errors
//!
//! Build-time errors block run creation entirely. Run-time errors abort
//! only the current run.

use miette::Diagnostic;
use thiserror::Error;

use crate::operator::OperatorError;

pub type Result<T> = std::result::Result<T, OpgraphError>;

/// Trait for errors that provide fix suggestions
pub trait FixSuggestion {
    fn fix_suggestion(&self) -> Option<&str>;
}

/// All error variants are part of the public API.
///
/// Implements both `thiserror::Error` for std error compatibility
/// and `miette::Diagnostic` for fancy terminal error display.
#[derive(Error, Debug, Diagnostic)]
pub enum OpgraphError {
    // ═══════════════════════════════════════════
    // CONFIGURATION ERRORS (000-009)
    // ═══════════════════════════════════════════
    #[error("[OPG-001] Missing config field '{field}' for {owner}")]
    #[diagnostic(
        code(opgraph::missing_config_field),
        help("Bind the field under ops.<op>.config or resources.<res>.config")
    )]
    MissingConfigField { owner: String, field: String },

    #[error("[OPG-002] Config field '{field}' for {owner}: expected {expected}, got {actual}")]
    #[diagnostic(code(opgraph::config_type_mismatch))]
    ConfigTypeMismatch {
        owner: String,
        field: String,
        expected: String,
        actual: String,
    },

    #[error("[OPG-003] Config given for resource '{resource}' which the job does not declare")]
    UnknownConfigSection { resource: String },

    #[error("[OPG-004] Config given for operator '{operator}' which is not in the job")]
    UnknownOperatorConfig { operator: String },

    #[error("[OPG-005] Invalid engine configuration: {reason}")]
    #[diagnostic(code(opgraph::engine_config))]
    InvalidEngineConfig { reason: String },

    #[error("[OPG-006] Config field '{field}' is not declared by {owner}")]
    UnknownConfigField { owner: String, field: String },

    #[error("[OPG-007] Config for {owner} sets both '{field}' and its alias '{alias}'")]
    ConflictingConfigAlias {
        owner: String,
        field: String,
        alias: String,
    },

    // ═══════════════════════════════════════════
    // WIRING ERRORS (010-019)
    // ═══════════════════════════════════════════
    #[error("[OPG-010] Input '{input}' of operator '{operator}' has no producer")]
    #[diagnostic(
        code(opgraph::unbound_input),
        help("Add an operator producing this output or declare a job input")
    )]
    UnboundInput { operator: String, input: String },

    #[error("[OPG-011] Input '{input}' of operator '{operator}' matches several producers: {candidates}")]
    AmbiguousInput {
        operator: String,
        input: String,
        candidates: String,
    },

    #[error(
        "[OPG-012] Port type mismatch on '{port}': '{producer}' emits {produced}, '{consumer}' expects {expected}"
    )]
    PortTypeMismatch {
        port: String,
        producer: String,
        consumer: String,
        produced: String,
        expected: String,
    },

    #[error("[OPG-013] Duplicate operator name '{operator}'")]
    DuplicateOperator { operator: String },

    #[error("[OPG-014] Output '{output}' is produced by both '{first}' and '{second}'")]
    DuplicateOutput {
        output: String,
        first: String,
        second: String,
    },

    #[error("[OPG-015] Operator '{operator}' requires resource '{resource}' which is not declared")]
    #[diagnostic(
        code(opgraph::undeclared_resource),
        help("Declare the resource on the job builder and on the operator spec")
    )]
    UndeclaredResource { operator: String, resource: String },

    #[error("[OPG-016] Invalid name '{name}': {reason}")]
    InvalidName { name: String, reason: String },

    // ═══════════════════════════════════════════
    // GRAPH ERRORS (020-029)
    // ═══════════════════════════════════════════
    #[error("[OPG-020] Cycle detected in operator graph: {cycle}")]
    #[diagnostic(code(opgraph::cycle))]
    CycleDetected { cycle: String },

    #[error("[OPG-021] Job '{job}' has no operators")]
    EmptyJob { job: String },

    // ═══════════════════════════════════════════
    // STORAGE ERRORS (030-039)
    // ═══════════════════════════════════════════
    #[error("[OPG-030] Artifact '{operator}.{output}' not found for run '{run_id}'")]
    #[diagnostic(
        code(opgraph::artifact_not_found),
        help("The upstream operator has not materialized this output in this run")
    )]
    ArtifactNotFound {
        run_id: String,
        operator: String,
        output: String,
    },

    #[error("[OPG-031] Storage scoped to run '{scope}' cannot write artifacts of run '{run_id}'")]
    StorageScopeViolation { scope: String, run_id: String },

    #[error("[OPG-032] Invalid run id '{run_id}': {reason}")]
    InvalidRunId { run_id: String, reason: String },

    #[error("[OPG-033] Artifact at '{location}' could not be decoded: {reason}")]
    ArtifactDecode { location: String, reason: String },

    #[error("[OPG-034] No stored run '{run_id}'")]
    RunNotFound { run_id: String },

    // ═══════════════════════════════════════════
    // RUN ERRORS (040-049)
    // ═══════════════════════════════════════════
    #[error("[OPG-040] {0}")]
    Operator(#[from] OperatorError),

    #[error("[OPG-041] Run '{run_id}' is already running")]
    RunAlreadyActive { run_id: String },

    #[error("[OPG-042] Resource '{resource}' failed to initialize: {reason}")]
    ResourceInit { resource: String, reason: String },

    // ═══════════════════════════════════════════
    // SCHEDULE ERRORS (050-059)
    // ═══════════════════════════════════════════
    #[error("[OPG-050] Invalid cron expression '{expr}': {reason}")]
    #[diagnostic(
        code(opgraph::invalid_cron),
        help("Use 5 fields (min hour dom month dow) or 6/7 with seconds first")
    )]
    InvalidCron { expr: String, reason: String },

    #[error("[OPG-051] Unknown timezone '{timezone}'")]
    InvalidTimezone { timezone: String },

    #[error("[OPG-052] Schedule '{name}' has no upcoming fire time")]
    ScheduleExhausted { name: String },

    #[error("[OPG-053] Scheduled run worker failed: {reason}")]
    SchedulerWorker { reason: String },

    // ═══════════════════════════════════════════
    // IO / SERDE ERRORS (090-099)
    // ═══════════════════════════════════════════
    #[error("[OPG-093] IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("[OPG-094] JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("[OPG-095] YAML parse error: {0}")]
    #[diagnostic(
        code(opgraph::yaml_parse),
        help("Check YAML syntax: indentation must be consistent")
    )]
    YamlParse(#[from] serde_yaml::Error),
}

impl OpgraphError {
    /// Build-time errors are never retried and block run creation.
    pub fn is_build_error(&self) -> bool {
        matches!(
            self,
            Self::MissingConfigField { .. }
                | Self::ConfigTypeMismatch { .. }
                | Self::UnknownConfigSection { .. }
                | Self::UnknownOperatorConfig { .. }
                | Self::UnknownConfigField { .. }
                | Self::ConflictingConfigAlias { .. }
                | Self::UnboundInput { .. }
                | Self::AmbiguousInput { .. }
                | Self::PortTypeMismatch { .. }
                | Self::DuplicateOperator { .. }
                | Self::DuplicateOutput { .. }
                | Self::UndeclaredResource { .. }
                | Self::InvalidName { .. }
                | Self::CycleDetected { .. }
                | Self::EmptyJob { .. }
        )
    }

    /// Stable error code, e.g. `OPG-020`
    pub fn code(&self) -> &'static str {
        match self {
            Self::MissingConfigField { .. } => "OPG-001",
            Self::ConfigTypeMismatch { .. } => "OPG-002",
            Self::UnknownConfigSection { .. } => "OPG-003",
            Self::UnknownOperatorConfig { .. } => "OPG-004",
            Self::InvalidEngineConfig { .. } => "OPG-005",
            Self::UnknownConfigField { .. } => "OPG-006",
            Self::ConflictingConfigAlias { .. } => "OPG-007",
            Self::UnboundInput { .. } => "OPG-010",
            Self::AmbiguousInput { .. } => "OPG-011",
            Self::PortTypeMismatch { .. } => "OPG-012",
            Self::DuplicateOperator { .. } => "OPG-013",
            Self::DuplicateOutput { .. } => "OPG-014",
            Self::UndeclaredResource { .. } => "OPG-015",
            Self::InvalidName { .. } => "OPG-016",
            Self::CycleDetected { .. } => "OPG-020",
            Self::EmptyJob { .. } => "OPG-021",
            Self::ArtifactNotFound { .. } => "OPG-030",
            Self::StorageScopeViolation { .. } => "OPG-031",
            Self::InvalidRunId { .. } => "OPG-032",
            Self::ArtifactDecode { .. } => "OPG-033",
            Self::RunNotFound { .. } => "OPG-034",
            Self::Operator(_) => "OPG-040",
            Self::RunAlreadyActive { .. } => "OPG-041",
            Self::ResourceInit { .. } => "OPG-042",
            Self::InvalidCron { .. } => "OPG-050",
            Self::InvalidTimezone { .. } => "OPG-051",
            Self::ScheduleExhausted { .. } => "OPG-052",
            Self::SchedulerWorker { .. } => "OPG-053",
            Self::IoError(_) => "OPG-093",
            Self::JsonError(_) => "OPG-094",
            Self::YamlParse(_) => "OPG-095",
        }
    }
}

impl FixSuggestion for OpgraphError {
    fn fix_suggestion(&self) -> Option<&str> {
        match self {
            Self::MissingConfigField { .. } => Some("Add the missing field to the run config"),
            Self::ConfigTypeMismatch { .. } => Some("Change the value to the declared type"),
            Self::UnknownConfigSection { .. } => {
                Some("Remove the resource section or declare the resource on the job")
            }
            Self::UnknownOperatorConfig { .. } => Some("Check the operator name under ops:"),
            Self::UnknownConfigField { .. } => Some("Remove the field or fix its spelling"),
            Self::ConflictingConfigAlias { .. } => Some("Keep only one of the two names"),
            Self::InvalidEngineConfig { .. } => {
                Some("Check ~/.config/opgraph/config.toml syntax")
            }
            Self::UnboundInput { .. } => {
                Some("Wire an operator output with the same name, or declare a job input")
            }
            Self::AmbiguousInput { .. } => Some("Rename outputs so each input has one producer"),
            Self::PortTypeMismatch { .. } => Some("Align producer and consumer port types"),
            Self::DuplicateOperator { .. } => Some("Use unique operator names within a job"),
            Self::DuplicateOutput { .. } => Some("Use unique output names within a job"),
            Self::UndeclaredResource { .. } => Some("Declare the resource on the job builder"),
            Self::InvalidName { .. } => Some("Use letters, digits, '-' and '_' only (no '.')"),
            Self::CycleDetected { .. } => Some("Remove the circular dependency between operators"),
            Self::EmptyJob { .. } => Some("Add at least one operator to the job"),
            Self::ArtifactNotFound { .. } => {
                Some("Verify the upstream operator ran successfully in this run")
            }
            Self::StorageScopeViolation { .. } => Some("Open a storage handle for the target run"),
            Self::InvalidRunId { .. } => Some("Use letters, digits, '-' and '_' only"),
            Self::ArtifactDecode { .. } => Some("Delete the corrupt artifact and re-run"),
            Self::RunNotFound { .. } => Some("Check the run id against the storage root"),
            Self::Operator(_) => Some("Inspect the operator config and upstream artifacts"),
            Self::RunAlreadyActive { .. } => Some("Wait for the active run or use a new run id"),
            Self::ResourceInit { .. } => Some("Check the resource config and filesystem permissions"),
            Self::InvalidCron { .. } => Some("Example: '0/1 * * * *' fires every minute"),
            Self::InvalidTimezone { .. } => Some("Use an IANA name such as 'US/Pacific' or 'UTC'"),
            Self::ScheduleExhausted { .. } => Some("Check the cron expression's year field"),
            Self::SchedulerWorker { .. } => None,
            Self::IoError(_) => Some("Check file path and permissions"),
            Self::JsonError(_) => Some("Check the artifact contents are valid JSON"),
            Self::YamlParse(_) => Some("Check YAML syntax: indentation and quoting"),
        }
    }
}
