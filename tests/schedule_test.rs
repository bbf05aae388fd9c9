//! # Schedule Tests
//!
//! The built-in `clean_string` job end to end, driven by ticks rather
//! than wall-clock time where possible.

use std::sync::Arc;

use chrono::{TimeZone, Utc};
use opgraph::catalog::{self, CLEAN_STRING_CRON, CLEAN_STRING_SCHEDULE, CLEAN_STRING_TIMEZONE};
use opgraph::event::{EventKind, EventLog};
use opgraph::runtime::{Executor, RunStatus};
use opgraph::schedule::{CronSchedule, Scheduler, DATE_TAG, SCHEDULE_TAG};
use opgraph::storage::{ArtifactKey, StorageBackend};
use opgraph::OpgraphError;
use serde_json::json;
use tempfile::TempDir;

#[test]
fn test_clean_string_cadence_is_every_minute_in_pacific_time() {
    let cadence = CronSchedule::parse(CLEAN_STRING_CRON, CLEAN_STRING_TIMEZONE).unwrap();
    let start = Utc.with_ymd_and_hms(2024, 7, 4, 18, 0, 30).unwrap();

    let fires = cadence.upcoming(start, 3);
    let gaps: Vec<i64> = fires
        .windows(2)
        .map(|w| (w[1].clone() - w[0].clone()).num_seconds())
        .collect();
    assert_eq!(gaps, vec![60, 60]);

    // 18:01 UTC is 11:01 PDT
    assert_eq!(
        cadence.format_tag(fires[0].with_timezone(&Utc)),
        "2024-07-04 11:01:00"
    );
}

#[test]
fn test_tick_then_execute_produces_tagged_run() {
    let dir = TempDir::new().unwrap();
    let log = EventLog::new();

    let job = catalog::clean_string_job(catalog::default_run_config(dir.path())).unwrap();
    let scheduler = Scheduler::new(Arc::new(log.clone()));
    scheduler
        .register(
            catalog::clean_string_schedule(job.clone(), CLEAN_STRING_CRON, CLEAN_STRING_TIMEZONE)
                .unwrap(),
        )
        .unwrap();

    let at = Utc.with_ymd_and_hms(2024, 1, 15, 20, 0, 0).unwrap();
    let request = scheduler.tick(CLEAN_STRING_SCHEDULE, &at).unwrap();
    let run_id = request.run_id.clone().unwrap();
    assert_eq!(request.tags[DATE_TAG], "2024-01-15 12:00:00");

    let executor = Executor::new(StorageBackend::filesystem(dir.path()), Arc::new(log.clone()));
    let outcome = executor.execute(&job, request).unwrap();

    assert_eq!(outcome.status, RunStatus::Succeeded);
    assert_eq!(&*outcome.run_id, run_id.as_str());
    assert_eq!(outcome.tags[SCHEDULE_TAG], CLEAN_STRING_SCHEDULE);

    let stored = StorageBackend::filesystem(dir.path())
        .open(&run_id)
        .unwrap()
        .get(&ArtifactKey::new(&run_id, "clean_string", "sent_clean"))
        .unwrap();
    assert_eq!(stored, json!("A   OR      ALPHA"));
}

#[test]
fn test_two_ticks_never_share_storage() {
    let dir = TempDir::new().unwrap();
    let job = catalog::clean_string_job(catalog::default_run_config(dir.path())).unwrap();
    let def =
        catalog::clean_string_schedule(job.clone(), CLEAN_STRING_CRON, CLEAN_STRING_TIMEZONE)
            .unwrap();

    let at = Utc.with_ymd_and_hms(2024, 1, 15, 20, 0, 0).unwrap();
    let executor = Executor::new(
        StorageBackend::filesystem(dir.path()),
        Arc::new(EventLog::new()),
    );
    let first = executor.execute(&job, def.tick(&at)).unwrap();
    let second = executor.execute(&job, def.tick(&at)).unwrap();

    assert_ne!(first.run_id, second.run_id);
    assert!(dir.path().join(&*first.run_id).is_dir());
    assert!(dir.path().join(&*second.run_id).is_dir());
}

#[test]
fn test_invalid_schedule_definitions() {
    let dir = TempDir::new().unwrap();
    let job = catalog::clean_string_job(catalog::default_run_config(dir.path())).unwrap();

    assert!(matches!(
        catalog::clean_string_schedule(job.clone(), "every minute", "UTC"),
        Err(OpgraphError::InvalidCron { .. })
    ));
    assert!(matches!(
        catalog::clean_string_schedule(job, CLEAN_STRING_CRON, "Pacific/Nowhere"),
        Err(OpgraphError::InvalidTimezone { .. })
    ));
}

#[tokio::test]
async fn test_scheduler_loop_runs_job_until_max_ticks() {
    let dir = TempDir::new().unwrap();
    let log = EventLog::new();
    let job = catalog::clean_string_job(catalog::default_run_config(dir.path())).unwrap();

    let scheduler = Scheduler::new(Arc::new(log.clone()));
    scheduler
        .register(catalog::clean_string_schedule(job, "* * * * * *", "UTC").unwrap())
        .unwrap();

    let executor = Executor::new(StorageBackend::filesystem(dir.path()), Arc::new(log.clone()));
    let outcomes = scheduler.run(executor, 1).await.unwrap();

    assert_eq!(outcomes.len(), 1);
    assert!(outcomes[0].is_success());
    assert_eq!(outcomes[0].metrics["chars_replaced"], 9);

    let ticked = log
        .events()
        .iter()
        .any(|e| matches!(&e.kind, EventKind::ScheduleTicked { schedule, .. } if schedule == CLEAN_STRING_SCHEDULE));
    assert!(ticked);
}
