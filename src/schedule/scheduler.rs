//! Scheduler - cron ticks to run requests
//!
//! Schedules are registered explicitly during process initialisation and
//! live until `shutdown()`. Each tick builds a fresh `RunRequest` and
//! hands it to the executor on a blocking worker; ticks of one schedule
//! never overlap, different schedules run side by side.

use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use parking_lot::{Mutex, RwLock};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::error::{OpgraphError, Result};
use crate::event::{EventEmitter, EventKind};
use crate::job::Job;
use crate::runtime::{Executor, RunOutcome, RunRequest};

use super::cadence::CronSchedule;

/// Tag keys set on scheduled runs
pub const DATE_TAG: &str = "date";
pub const SCHEDULE_TAG: &str = "schedule";

/// Called once per completed scheduled run, from the schedule's tick loop
pub type OutcomeSink = Arc<dyn Fn(&RunOutcome) + Send + Sync>;

/// Counts of completed scheduled runs
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunTally {
    pub succeeded: usize,
    pub failed: usize,
}

impl RunTally {
    pub fn total(&self) -> usize {
        self.succeeded + self.failed
    }

    fn record(&mut self, outcome: &RunOutcome) {
        if outcome.is_success() {
            self.succeeded += 1;
        } else {
            self.failed += 1;
        }
    }

    fn merge(&mut self, other: RunTally) {
        self.succeeded += other.succeeded;
        self.failed += other.failed;
    }
}

/// Cadence + timezone + target job
#[derive(Clone)]
pub struct ScheduleDef {
    name: String,
    cadence: CronSchedule,
    job: Arc<Job>,
}

impl ScheduleDef {
    pub fn new(name: impl Into<String>, cron: &str, timezone: &str, job: Arc<Job>) -> Result<Self> {
        Ok(Self {
            name: name.into(),
            cadence: CronSchedule::parse(cron, timezone)?,
            job,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn cadence(&self) -> &CronSchedule {
        &self.cadence
    }

    pub fn job(&self) -> &Arc<Job> {
        &self.job
    }

    /// Run request for a fire time: fresh UUID v4 run id plus `date`
    /// and `schedule` tags
    pub fn tick<Z: TimeZone>(&self, scheduled_at: &DateTime<Z>) -> RunRequest {
        RunRequest::new()
            .with_run_id(Uuid::new_v4().to_string())
            .with_tag(
                DATE_TAG,
                self.cadence.format_tag(scheduled_at.with_timezone(&Utc)),
            )
            .with_tag(SCHEDULE_TAG, &self.name)
    }
}

impl std::fmt::Debug for ScheduleDef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScheduleDef")
            .field("name", &self.name)
            .field("cadence", &self.cadence)
            .field("job", self.job.name())
            .finish()
    }
}

pub struct Scheduler {
    schedules: RwLock<Vec<ScheduleDef>>,
    emitter: Arc<dyn EventEmitter>,
    shutdown: CancellationToken,
}

impl Scheduler {
    pub fn new(emitter: Arc<dyn EventEmitter>) -> Self {
        Self {
            schedules: RwLock::new(Vec::new()),
            emitter,
            shutdown: CancellationToken::new(),
        }
    }

    /// Register a schedule; names are unique
    pub fn register(&self, def: ScheduleDef) -> Result<()> {
        let mut schedules = self.schedules.write();
        if schedules.iter().any(|s| s.name == def.name) {
            return Err(OpgraphError::InvalidName {
                name: def.name,
                reason: "a schedule with this name is already registered".to_string(),
            });
        }
        info!(schedule = %def.name, cron = def.cadence.expr(), "Schedule registered");
        schedules.push(def);
        Ok(())
    }

    pub fn schedules(&self) -> Vec<ScheduleDef> {
        self.schedules.read().clone()
    }

    /// Run request for schedule `name` at `scheduled_at`
    pub fn tick<Z: TimeZone>(&self, name: &str, scheduled_at: &DateTime<Z>) -> Option<RunRequest> {
        self.schedules
            .read()
            .iter()
            .find(|s| s.name == name)
            .map(|s| s.tick(scheduled_at))
    }

    /// Stop the loop; in-flight runs see the cancellation between steps
    pub fn shutdown(&self) {
        info!("Scheduler shutting down");
        self.shutdown.cancel();
    }

    pub fn is_shut_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Fire every registered schedule until shutdown, or until each has
    /// fired `max_ticks` times. Outcomes go to `on_outcome` as runs finish
    /// and are not retained.
    pub async fn run_with(
        &self,
        executor: Executor,
        max_ticks: Option<usize>,
        on_outcome: OutcomeSink,
    ) -> Result<RunTally> {
        let mut workers = JoinSet::new();
        for def in self.schedules() {
            let executor = executor.clone();
            let emitter = Arc::clone(&self.emitter);
            let shutdown = self.shutdown.clone();
            let sink = Arc::clone(&on_outcome);
            workers.spawn(drive(def, executor, emitter, shutdown, max_ticks, sink));
        }

        let mut tally = RunTally::default();
        while let Some(joined) = workers.join_next().await {
            let produced = joined.map_err(|e| OpgraphError::SchedulerWorker {
                reason: e.to_string(),
            })??;
            tally.merge(produced);
        }
        Ok(tally)
    }

    /// Bounded run that collects every outcome; each schedule fires at
    /// most `max_ticks` times
    pub async fn run(&self, executor: Executor, max_ticks: usize) -> Result<Vec<RunOutcome>> {
        let collected = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&collected);
        self.run_with(
            executor,
            Some(max_ticks),
            Arc::new(move |outcome: &RunOutcome| sink.lock().push(outcome.clone())),
        )
        .await?;
        let outcomes = std::mem::take(&mut *collected.lock());
        Ok(outcomes)
    }
}

/// Tick loop of one schedule
#[instrument(name = "schedule", skip_all, fields(schedule = %def.name))]
async fn drive(
    def: ScheduleDef,
    executor: Executor,
    emitter: Arc<dyn EventEmitter>,
    shutdown: CancellationToken,
    max_ticks: Option<usize>,
    on_outcome: OutcomeSink,
) -> Result<RunTally> {
    let mut tally = RunTally::default();
    let mut last = Utc::now();
    let mut ticks = 0usize;

    while max_ticks.map_or(true, |max| ticks < max) {
        let next = def
            .cadence
            .next_after(last)
            .ok_or_else(|| OpgraphError::ScheduleExhausted {
                name: def.name.clone(),
            })?;
        let fire_at = next.with_timezone(&Utc);
        let wait = (fire_at - Utc::now()).to_std().unwrap_or_default();

        tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            _ = tokio::time::sleep(wait) => {}
        }

        last = fire_at;
        ticks += 1;

        let request = def.tick(&fire_at);
        let run_id = request.run_id.clone().unwrap_or_default();
        emitter.emit(EventKind::ScheduleTicked {
            schedule: def.name.clone(),
            run_id: Arc::from(run_id.as_str()),
            scheduled_at: def.cadence.format_tag(fire_at),
        });
        info!(%run_id, scheduled_at = %fire_at, "Schedule tick");

        let job = Arc::clone(&def.job);
        let worker = executor.clone();
        let cancel = shutdown.child_token();
        let result = tokio::task::spawn_blocking(move || {
            worker.execute_cancellable(&job, request, &cancel)
        })
        .await
        .map_err(|e| OpgraphError::SchedulerWorker {
            reason: e.to_string(),
        })?;

        match result {
            Ok(outcome) => {
                tally.record(&outcome);
                on_outcome(&outcome);
            }
            // The next tick is a new, independent attempt
            Err(e) => warn!(%run_id, error = %e, "Scheduled run was not admitted"),
        }
    }

    Ok(tally)
}
