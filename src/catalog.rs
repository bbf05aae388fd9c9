//! Built-in `clean_string` job
//!
//! `get_string` → `normalize_string` → `clean_string`, wired through the
//! `sent` / `sent_norm` / `sent_clean` ports, plus its every-minute
//! schedule.

use std::path::Path;
use std::sync::Arc;

use serde_json::json;

use crate::config::RunConfig;
use crate::error::Result;
use crate::job::{Job, JobBuilder};
use crate::operator::{CleanString, FetchString, NormalizeString};
use crate::resource::ResourceKey;
use crate::schedule::ScheduleDef;

pub const CLEAN_STRING_JOB: &str = "clean_string";
pub const CLEAN_STRING_SCHEDULE: &str = "every_minute_string_job_schedule";
pub const CLEAN_STRING_CRON: &str = "0/1 * * * *";
pub const CLEAN_STRING_TIMEZONE: &str = "US/Pacific";

/// Default bindings; `basedir` is where the `paths` resource creates run
/// directories
pub fn default_run_config(basedir: &Path) -> RunConfig {
    RunConfig::new()
        .with_op("get_string", json!({"data_key": "1"}))
        .with_op(
            "normalize_string",
            json!({"norm": "upper", "force_error": false}),
        )
        .with_op(
            "clean_string",
            json!({"hyperparams": {"dim": 10, "reg": 0.01}}),
        )
        .with_resource(
            ResourceKey::Connection,
            json!({"credentials": "HORRIBLE_PASSWORD"}),
        )
        .with_resource(
            ResourceKey::Paths,
            json!({"basedir": basedir.to_string_lossy()}),
        )
}

pub fn clean_string_job(config: RunConfig) -> Result<Arc<Job>> {
    JobBuilder::new(CLEAN_STRING_JOB)
        .operator(FetchString::new("get_string", "sent"))
        .operator(NormalizeString::new("normalize_string", "sent", "sent_norm"))
        .operator(CleanString::new("clean_string", "sent_norm", "sent_clean").with_metrics())
        .resource(ResourceKey::Connection)
        .resource(ResourceKey::Paths)
        .resource(ResourceKey::Metrics)
        .config(config)
        .build()
}

pub fn clean_string_schedule(job: Arc<Job>, cron: &str, timezone: &str) -> Result<ScheduleDef> {
    ScheduleDef::new(CLEAN_STRING_SCHEDULE, cron, timezone, job)
}
