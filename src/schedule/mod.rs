//! Schedule Module - cron cadence and run dispatch
//!
//! - `cadence`: `CronSchedule` (expression + IANA timezone)
//! - `scheduler`: explicit registration, tick → `RunRequest`, tokio loop
//!   with `shutdown()` as the teardown path

mod cadence;
mod scheduler;

pub use cadence::{CronSchedule, SCHEDULED_DATE_FORMAT};
pub use scheduler::{OutcomeSink, RunTally, ScheduleDef, Scheduler, DATE_TAG, SCHEDULE_TAG};
