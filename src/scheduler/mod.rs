//! # Scheduler
//!
//! Periodic, idempotent sweep over all switches. Safe to invoke more than
//! once per period and concurrently with owner and verifier actions.

mod errors;
mod report;
mod sweep;
mod trigger;

pub use errors::{ScheduleError, ScheduleResult};
pub use report::{CycleReport, SweepError, SweepPass};
pub use sweep::{Scheduler, SchedulerPolicy};
pub use trigger::SweepSchedule;
