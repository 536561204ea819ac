//! # Sweep Trigger
//!
//! Cron cadence for the in-process trigger of `serve`. External triggers
//! call the HTTP endpoint instead; both end in the same idempotent cycle.

use std::fmt;

use chrono::{DateTime, Utc};
use croner::Cron;

use super::errors::{ScheduleError, ScheduleResult};

/// Parsed cron expression.
pub struct SweepSchedule {
    expression: String,
    cron: Cron,
}

impl SweepSchedule {
    /// Parse a five-field cron expression.
    pub fn parse(expression: &str) -> ScheduleResult<Self> {
        let cron = Cron::new(expression)
            .parse()
            .map_err(|e| ScheduleError::InvalidCron {
                expression: expression.to_string(),
                reason: e.to_string(),
            })?;
        Ok(Self {
            expression: expression.to_string(),
            cron,
        })
    }

    pub fn expression(&self) -> &str {
        &self.expression
    }

    /// First occurrence strictly after `after`.
    pub fn next_after(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.cron.find_next_occurrence(&after, false).ok()
    }
}

impl fmt::Debug for SweepSchedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("SweepSchedule").field(&self.expression).finish()
    }
}
