//! Executor - runs a built job under an isolated run id
//!
//! Operators run strictly in the job's topological order on the calling
//! thread. Every input is loaded through storage, so an operator never
//! starts before each upstream `put` it depends on has completed.

use std::sync::Arc;
use std::time::Instant;

use dashmap::DashMap;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, info_span, instrument, warn};
use uuid::Uuid;

use crate::error::{OpgraphError, Result};
use crate::event::{EventEmitter, EventKind};
use crate::job::{InputSource, Job, Step};
use crate::operator::{Inputs, OpContext, OperatorError};
use crate::resource::Resources;
use crate::storage::{validate_run_id, RunStorage, StorageBackend};

use super::context::{ArtifactRecord, RunContext, RunOutcome, RunRequest, RunStatus};

/// Why a step stopped the run
struct StepFailure {
    operator: Option<Arc<str>>,
    error: String,
}

impl StepFailure {
    fn at(operator: &Arc<str>, error: impl ToString) -> Self {
        Self {
            operator: Some(Arc::clone(operator)),
            error: error.to_string(),
        }
    }
}

/// Removes the run id from the active table when the run ends
struct ActiveRun {
    active: Arc<DashMap<Arc<str>, Instant>>,
    run_id: Arc<str>,
}

impl Drop for ActiveRun {
    fn drop(&mut self) {
        self.active.remove(&self.run_id);
    }
}

/// Run trigger surface
#[derive(Clone)]
pub struct Executor {
    backend: StorageBackend,
    emitter: Arc<dyn EventEmitter>,
    active: Arc<DashMap<Arc<str>, Instant>>,
}

impl Executor {
    pub fn new(backend: StorageBackend, emitter: Arc<dyn EventEmitter>) -> Self {
        Self {
            backend,
            emitter,
            active: Arc::new(DashMap::new()),
        }
    }

    pub fn backend(&self) -> &StorageBackend {
        &self.backend
    }

    /// Run ids currently RUNNING in this executor, sorted
    pub fn active_runs(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.active.iter().map(|e| e.key().to_string()).collect();
        ids.sort();
        ids
    }

    /// Execute `job` once.
    ///
    /// `Err` is reserved for admission failures (invalid or already active
    /// run id, storage or resource construction). Operator and artifact
    /// failures produce a `FAILED` outcome.
    pub fn execute(&self, job: &Job, request: RunRequest) -> Result<RunOutcome> {
        self.execute_cancellable(job, request, &CancellationToken::new())
    }

    /// Like [`Executor::execute`], checking `cancel` before each step.
    ///
    /// A cancelled run ends `FAILED`; artifacts already written stay.
    #[instrument(name = "run", skip_all, fields(job = %job.name(), run_id))]
    pub fn execute_cancellable(
        &self,
        job: &Job,
        request: RunRequest,
        cancel: &CancellationToken,
    ) -> Result<RunOutcome> {
        let start = Instant::now();
        let run_id: Arc<str> = match request.run_id {
            Some(id) => Arc::from(id),
            None => Arc::from(Uuid::new_v4().to_string()),
        };
        tracing::Span::current().record("run_id", &*run_id);
        validate_run_id(&run_id)?;

        let _guard = self.admit(&run_id)?;

        let mut ctx = match self.prepare(job, &run_id, request.tags) {
            Ok(ctx) => ctx,
            Err(e) => {
                self.emitter.emit(EventKind::RunFailed {
                    run_id: Arc::clone(&run_id),
                    failed_operator: None,
                    error: e.to_string(),
                });
                return Err(e);
            }
        };

        let mut artifacts = Vec::new();
        let result = if cancel.is_cancelled() {
            Err(StepFailure {
                operator: None,
                error: "run cancelled".to_string(),
            })
        } else {
            ctx.transition(RunStatus::Running);
            self.emitter.emit(EventKind::RunStarted {
                run_id: Arc::clone(&run_id),
                job: job.name().to_string(),
                operator_count: job.steps().len(),
                tags: ctx.tags().clone(),
            });
            info!(operators = job.steps().len(), "Run started");
            self.run_steps(job, &ctx, cancel, &mut artifacts)
        };

        let duration = start.elapsed();
        let (status, failed_operator, error) = match result {
            Ok(()) => {
                ctx.transition(RunStatus::Succeeded);
                self.emitter.emit(EventKind::RunSucceeded {
                    run_id: Arc::clone(&run_id),
                    artifact_count: artifacts.len(),
                    total_duration_ms: duration.as_millis() as u64,
                });
                info!(artifacts = artifacts.len(), "Run succeeded");
                (RunStatus::Succeeded, None, None)
            }
            Err(failure) => {
                ctx.transition(RunStatus::Failed);
                self.emitter.emit(EventKind::RunFailed {
                    run_id: Arc::clone(&run_id),
                    failed_operator: failure.operator.clone(),
                    error: failure.error.clone(),
                });
                error!(
                    operator = failure.operator.as_deref().unwrap_or("-"),
                    error = %failure.error,
                    "Run failed"
                );
                (RunStatus::Failed, failure.operator, Some(failure.error))
            }
        };

        Ok(RunOutcome {
            run_id,
            job: Arc::clone(job.name()),
            status,
            failed_operator,
            error,
            artifacts,
            tags: ctx.tags().clone(),
            metrics: ctx.resources().metrics_snapshot(),
            duration,
        })
    }

    fn admit(&self, run_id: &Arc<str>) -> Result<ActiveRun> {
        use dashmap::mapref::entry::Entry;

        match self.active.entry(Arc::clone(run_id)) {
            Entry::Occupied(_) => {
                warn!("Run id already active, rejecting");
                Err(OpgraphError::RunAlreadyActive {
                    run_id: run_id.to_string(),
                })
            }
            Entry::Vacant(slot) => {
                slot.insert(Instant::now());
                Ok(ActiveRun {
                    active: Arc::clone(&self.active),
                    run_id: Arc::clone(run_id),
                })
            }
        }
    }

    /// PENDING: open storage and instantiate every declared resource
    fn prepare(
        &self,
        job: &Job,
        run_id: &Arc<str>,
        tags: std::collections::BTreeMap<String, String>,
    ) -> Result<RunContext> {
        let manager = self.backend.open(run_id)?;
        let cleared = manager.clear()?;
        if cleared > 0 {
            info!(run_id = %run_id, cleared, "Cleared artifacts left by an earlier run with this id");
        }
        let storage = RunStorage::new(manager, Arc::clone(&self.emitter));
        let resources = Resources::instantiate(run_id, job.resources(), self.emitter.as_ref())?;
        let base = self.backend.root().map(|root| root.join(&**run_id));

        Ok(RunContext::new(
            Arc::clone(run_id),
            base,
            resources,
            storage,
            tags,
        ))
    }

    fn run_steps(
        &self,
        job: &Job,
        ctx: &RunContext,
        cancel: &CancellationToken,
        artifacts: &mut Vec<ArtifactRecord>,
    ) -> std::result::Result<(), StepFailure> {
        for step in job.steps() {
            if cancel.is_cancelled() {
                warn!(next = %step.name(), "Run cancelled");
                return Err(StepFailure {
                    operator: None,
                    error: "run cancelled".to_string(),
                });
            }
            self.run_step(job, step, ctx, artifacts)?;
        }
        Ok(())
    }

    fn run_step(
        &self,
        job: &Job,
        step: &Step,
        ctx: &RunContext,
        artifacts: &mut Vec<ArtifactRecord>,
    ) -> std::result::Result<(), StepFailure> {
        let name = step.name();
        let run_id = ctx.run_id();
        let span = info_span!("step", operator = %name);
        let _enter = span.enter();
        let start = Instant::now();

        let fail = |error: String| {
            self.emitter.emit(EventKind::StepFailed {
                run_id: Arc::clone(run_id),
                operator: Arc::clone(name),
                error: error.clone(),
                duration_ms: start.elapsed().as_millis() as u64,
            });
            StepFailure::at(name, error)
        };

        let inputs = self
            .load_inputs(job, step, ctx.storage())
            .map_err(|e| fail(e.to_string()))?;

        self.emitter.emit(EventKind::StepStarted {
            run_id: Arc::clone(run_id),
            operator: Arc::clone(name),
            inputs: inputs.to_value(),
        });

        let spec = step.spec();
        let op_ctx = OpContext::new(
            run_id,
            name,
            step.config(),
            ctx.resources().view(name, spec.resources()),
        );
        let outputs = step
            .operator()
            .invoke(&op_ctx, &inputs)
            .map_err(|e| fail(e.to_string()))?;

        if let Some(extra) = outputs.names().find(|n| spec.output_port(n).is_none()) {
            return Err(fail(
                OperatorError::new(&**name, format!("returned undeclared output '{}'", extra))
                    .to_string(),
            ));
        }

        // Check every output before writing any, so a type error leaves
        // no partial step output behind.
        let mut produced: Vec<(&str, &Value)> = Vec::with_capacity(spec.outputs().len());
        for port in spec.outputs() {
            let value = outputs.get(&port.name).ok_or_else(|| {
                fail(OperatorError::new(&**name, format!("output '{}' missing", port.name)).to_string())
            })?;
            if !port.ty.matches(value) {
                return Err(fail(
                    OperatorError::new(
                        &**name,
                        format!(
                            "output '{}' is not of type {} (got {})",
                            port.name,
                            port.ty,
                            crate::config::value_type_name(value)
                        ),
                    )
                    .to_string(),
                ));
            }
            produced.push((port.name.as_ref(), value));
        }

        for (output, value) in produced {
            let location = ctx
                .storage()
                .put(name, output, value)
                .map_err(|e| fail(e.to_string()))?;
            artifacts.push(ArtifactRecord {
                operator: Arc::clone(name),
                output: output.to_string(),
                location,
            });
        }

        let duration_ms = start.elapsed().as_millis() as u64;
        self.emitter.emit(EventKind::StepSucceeded {
            run_id: Arc::clone(run_id),
            operator: Arc::clone(name),
            outputs: spec.outputs().iter().map(|p| p.name.to_string()).collect(),
            duration_ms,
        });
        info!(duration_ms, "Step succeeded");
        Ok(())
    }

    fn load_inputs(&self, job: &Job, step: &Step, storage: &RunStorage) -> Result<Inputs> {
        let mut inputs = Inputs::new(step.name());
        for binding in job.bindings(step.name()) {
            let value = match &binding.source {
                InputSource::Upstream(producer) => storage.get(producer, &binding.port.name)?,
                InputSource::JobInput => job.input(&binding.port.name).cloned().ok_or_else(|| {
                    OpgraphError::MissingConfigField {
                        owner: "job inputs".to_string(),
                        field: binding.port.name.to_string(),
                    }
                })?,
            };
            inputs.insert(Arc::clone(&binding.port.name), value);
        }
        Ok(inputs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{EventLog, NoopEmitter};
    use crate::job::JobBuilder;
    use crate::operator::{FnOperator, OperatorSpec, Outputs, PortType};
    use serde_json::json;

    fn two_step_job(second: FnOperator) -> Arc<Job> {
        JobBuilder::new("pair")
            .operator(FnOperator::new(
                OperatorSpec::new("first").output("x", PortType::Str),
                |_, _| Ok(Outputs::single("x", "hello")),
            ))
            .operator(second)
            .build()
            .unwrap()
    }

    fn echo() -> FnOperator {
        FnOperator::new(
            OperatorSpec::new("second")
                .input("x", PortType::Str)
                .output("y", PortType::Str),
            |_, inputs| Ok(Outputs::single("y", inputs.str("x")?.to_uppercase())),
        )
    }

    #[test]
    fn successful_run_records_artifacts_in_order() {
        let executor = Executor::new(StorageBackend::memory(), Arc::new(NoopEmitter));
        let job = two_step_job(echo());

        let outcome = executor
            .execute(&job, RunRequest::new().with_run_id("r1"))
            .unwrap();

        assert!(outcome.is_success());
        let produced: Vec<(&str, &str)> = outcome
            .artifacts
            .iter()
            .map(|a| (a.operator.as_ref(), a.output.as_str()))
            .collect();
        assert_eq!(produced, vec![("first", "x"), ("second", "y")]);
        assert!(executor.active_runs().is_empty());
    }

    #[test]
    fn wrong_output_type_fails_the_step() {
        let executor = Executor::new(StorageBackend::memory(), Arc::new(NoopEmitter));
        let job = two_step_job(FnOperator::new(
            OperatorSpec::new("second")
                .input("x", PortType::Str)
                .output("y", PortType::Str),
            |_, _| Ok(Outputs::single("y", 3)),
        ));

        let outcome = executor.execute(&job, RunRequest::new()).unwrap();
        assert_eq!(outcome.status, RunStatus::Failed);
        assert_eq!(outcome.failed_operator.as_deref(), Some("second"));
        assert!(outcome.error.as_deref().unwrap().contains("not of type str"));
        assert!(outcome.artifact("second", "y").is_none());
    }

    #[test]
    fn undeclared_output_fails_the_step() {
        let executor = Executor::new(StorageBackend::memory(), Arc::new(NoopEmitter));
        let job = two_step_job(FnOperator::new(
            OperatorSpec::new("second").input("x", PortType::Str),
            |_, _| Ok(Outputs::single("surprise", 1)),
        ));

        let outcome = executor.execute(&job, RunRequest::new()).unwrap();
        assert!(outcome.error.as_deref().unwrap().contains("surprise"));
    }

    #[test]
    fn generated_run_ids_are_unique() {
        let executor = Executor::new(StorageBackend::memory(), Arc::new(NoopEmitter));
        let job = two_step_job(echo());
        let a = executor.execute(&job, RunRequest::new()).unwrap();
        let b = executor.execute(&job, RunRequest::new()).unwrap();
        assert_ne!(a.run_id, b.run_id);
        assert!(Uuid::parse_str(&a.run_id).is_ok());
    }

    #[test]
    fn invalid_run_id_is_rejected_before_running() {
        let log = EventLog::new();
        let executor = Executor::new(StorageBackend::memory(), Arc::new(log.clone()));
        let job = two_step_job(echo());

        let err = executor
            .execute(&job, RunRequest::new().with_run_id("../etc"))
            .unwrap_err();
        assert!(matches!(err, OpgraphError::InvalidRunId { .. }));
        assert!(log.is_empty());
    }

    #[test]
    fn active_run_id_is_not_admitted_twice() {
        let executor = Executor::new(StorageBackend::memory(), Arc::new(NoopEmitter));
        let _held = executor.admit(&Arc::from("busy")).unwrap();

        let err = executor
            .execute(&two_step_job(echo()), RunRequest::new().with_run_id("busy"))
            .unwrap_err();
        assert!(matches!(err, OpgraphError::RunAlreadyActive { .. }));
        assert_eq!(executor.active_runs(), vec!["busy".to_string()]);
    }

    #[test]
    fn cancelled_run_fails_without_invoking() {
        let log = EventLog::new();
        let executor = Executor::new(StorageBackend::memory(), Arc::new(log.clone()));
        let token = CancellationToken::new();
        token.cancel();

        let outcome = executor
            .execute_cancellable(&two_step_job(echo()), RunRequest::new().with_run_id("c1"), &token)
            .unwrap();

        assert_eq!(outcome.status, RunStatus::Failed);
        assert!(outcome.failed_operator.is_none());
        assert!(outcome.artifacts.is_empty());
        assert!(log.filter_run("c1").iter().all(|e| !matches!(
            e.kind,
            EventKind::StepStarted { .. }
        )));
    }

    #[test]
    fn step_events_carry_resolved_inputs() {
        let log = EventLog::new();
        let executor = Executor::new(StorageBackend::memory(), Arc::new(log.clone()));
        executor
            .execute(&two_step_job(echo()), RunRequest::new().with_run_id("ev"))
            .unwrap();

        let started: Vec<Value> = log
            .filter_operator("ev", "second")
            .into_iter()
            .filter_map(|e| match e.kind {
                EventKind::StepStarted { inputs, .. } => Some(inputs),
                _ => None,
            })
            .collect();
        assert_eq!(started, vec![json!({"x": "hello"})]);
    }
}
