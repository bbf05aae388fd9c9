//! CronSchedule - cron cadence bound to an IANA timezone

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use cron::Schedule;

use crate::error::{OpgraphError, Result};

/// Format of the `date` tag on scheduled runs
pub const SCHEDULED_DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Clone)]
pub struct CronSchedule {
    expr: String,
    schedule: Schedule,
    timezone: Tz,
}

impl CronSchedule {
    /// Parse a cron expression evaluated in `timezone`.
    ///
    /// Five fields (`min hour dom month dow`) fire at second 0; six or
    /// seven fields take seconds first and an optional year last.
    pub fn parse(expr: &str, timezone: &str) -> Result<Self> {
        let timezone = Tz::from_str(timezone).map_err(|_| OpgraphError::InvalidTimezone {
            timezone: timezone.to_string(),
        })?;

        let fields = expr.split_whitespace().count();
        let normalized = match fields {
            5 => format!("0 {}", expr.trim()),
            6 | 7 => expr.trim().to_string(),
            n => {
                return Err(OpgraphError::InvalidCron {
                    expr: expr.to_string(),
                    reason: format!("expected 5, 6 or 7 fields, found {}", n),
                })
            }
        };

        let schedule = Schedule::from_str(&normalized).map_err(|e| OpgraphError::InvalidCron {
            expr: expr.to_string(),
            reason: e.to_string(),
        })?;

        Ok(Self {
            expr: expr.trim().to_string(),
            schedule,
            timezone,
        })
    }

    pub fn expr(&self) -> &str {
        &self.expr
    }

    pub fn timezone(&self) -> Tz {
        self.timezone
    }

    /// First fire time strictly after `after`
    pub fn next_after(&self, after: DateTime<Utc>) -> Option<DateTime<Tz>> {
        self.schedule
            .after(&after.with_timezone(&self.timezone))
            .next()
    }

    /// Next `count` fire times strictly after `after`
    pub fn upcoming(&self, after: DateTime<Utc>, count: usize) -> Vec<DateTime<Tz>> {
        self.schedule
            .after(&after.with_timezone(&self.timezone))
            .take(count)
            .collect()
    }

    /// `date` tag value for a fire time, rendered in the schedule's timezone
    pub fn format_tag(&self, at: DateTime<Utc>) -> String {
        at.with_timezone(&self.timezone)
            .format(SCHEDULED_DATE_FORMAT)
            .to_string()
    }
}

impl fmt::Debug for CronSchedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CronSchedule")
            .field("expr", &self.expr)
            .field("timezone", &self.timezone.name())
            .finish()
    }
}
