//! Run state: request, context, status machine and outcome

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::resource::Resources;
use crate::storage::{ArtifactLocation, RunStorage};

/// `PENDING → RUNNING → {SUCCEEDED, FAILED}`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
}

impl RunStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }

    /// Legal transitions of the run state machine.
    ///
    /// `Pending → Failed` covers cancellation before the first step.
    pub fn can_transition_to(self, next: RunStatus) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Running)
                | (Self::Pending, Self::Failed)
                | (Self::Running, Self::Succeeded)
                | (Self::Running, Self::Failed)
        )
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Pending => "PENDING",
            Self::Running => "RUNNING",
            Self::Succeeded => "SUCCEEDED",
            Self::Failed => "FAILED",
        })
    }
}

/// A request to run a job once.
///
/// Created by the scheduler or an external trigger and consumed by
/// exactly one `Executor::execute` call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunRequest {
    /// Generated (UUID v4) when absent
    pub run_id: Option<String>,
    pub tags: BTreeMap<String, String>,
}

impl RunRequest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_run_id(mut self, run_id: impl Into<String>) -> Self {
        self.run_id = Some(run_id.into());
        self
    }

    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }
}

/// Per-run state.
///
/// Built once per execution; resources are released when it drops.
pub struct RunContext {
    run_id: Arc<str>,
    base_directory: Option<PathBuf>,
    resources: Resources,
    storage: RunStorage,
    tags: BTreeMap<String, String>,
    status: RunStatus,
}

impl RunContext {
    pub(crate) fn new(
        run_id: Arc<str>,
        base_directory: Option<PathBuf>,
        resources: Resources,
        storage: RunStorage,
        tags: BTreeMap<String, String>,
    ) -> Self {
        Self {
            run_id,
            base_directory,
            resources,
            storage,
            tags,
            status: RunStatus::Pending,
        }
    }

    pub fn run_id(&self) -> &Arc<str> {
        &self.run_id
    }

    /// Storage root of the run, for filesystem backends
    pub fn base_directory(&self) -> Option<&Path> {
        self.base_directory.as_deref()
    }

    pub fn resources(&self) -> &Resources {
        &self.resources
    }

    pub fn storage(&self) -> &RunStorage {
        &self.storage
    }

    pub fn tags(&self) -> &BTreeMap<String, String> {
        &self.tags
    }

    pub fn status(&self) -> RunStatus {
        self.status
    }

    pub(crate) fn transition(&mut self, next: RunStatus) {
        debug_assert!(
            self.status.can_transition_to(next),
            "illegal run transition {} → {}",
            self.status,
            next
        );
        debug!(run_id = %self.run_id, from = %self.status, to = %next, "Run transition");
        self.status = next;
    }
}

/// One materialized artifact of a run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactRecord {
    pub operator: Arc<str>,
    pub output: String,
    pub location: ArtifactLocation,
}

/// What the run trigger returns
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub run_id: Arc<str>,
    pub job: Arc<str>,
    pub status: RunStatus,
    pub failed_operator: Option<Arc<str>>,
    pub error: Option<String>,
    pub artifacts: Vec<ArtifactRecord>,
    pub tags: BTreeMap<String, String>,
    /// Counters recorded in the metrics resource
    pub metrics: BTreeMap<String, u64>,
    pub duration: Duration,
}

impl RunOutcome {
    pub fn is_success(&self) -> bool {
        self.status == RunStatus::Succeeded
    }

    pub fn artifact(&self, operator: &str, output: &str) -> Option<&ArtifactRecord> {
        self.artifacts
            .iter()
            .find(|a| a.operator.as_ref() == operator && a.output == output)
    }
}
