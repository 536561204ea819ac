//! # Cycle Report

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::delivery::DeliveryReport;

/// Sweep pass identifier, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SweepPass {
    Overdue,
    Grace,
    GraceExpiry,
    VerificationExpiry,
    Execution,
    Reminders,
    DeliveryRetry,
}

impl SweepPass {
    pub fn as_str(&self) -> &'static str {
        match self {
            SweepPass::Overdue => "overdue",
            SweepPass::Grace => "grace",
            SweepPass::GraceExpiry => "grace_expiry",
            SweepPass::VerificationExpiry => "verification_expiry",
            SweepPass::Execution => "execution",
            SweepPass::Reminders => "reminders",
            SweepPass::DeliveryRetry => "delivery_retry",
        }
    }
}

impl std::fmt::Display for SweepPass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A per-switch failure captured during a sweep.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SweepError {
    pub pass: SweepPass,
    /// `None` when the pass failed before reaching a switch.
    pub switch_id: Option<Uuid>,
    pub message: String,
}

/// Outcome of one scheduler cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CycleReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,

    pub marked_overdue: u32,
    pub entered_grace: u32,
    pub verification_started: u32,
    pub verified_directly: u32,
    pub verification_expired: u32,
    pub executed: u32,
    pub reminders_sent: u32,
    pub notifications_failed: u32,

    pub messages_sent: u32,
    pub messages_skipped: u32,
    pub messages_failed: u32,
    pub retries_sent: u32,

    pub errors: Vec<SweepError>,
}

impl CycleReport {
    pub fn new(started_at: DateTime<Utc>) -> Self {
        Self {
            started_at,
            finished_at: started_at,
            marked_overdue: 0,
            entered_grace: 0,
            verification_started: 0,
            verified_directly: 0,
            verification_expired: 0,
            executed: 0,
            reminders_sent: 0,
            notifications_failed: 0,
            messages_sent: 0,
            messages_skipped: 0,
            messages_failed: 0,
            retries_sent: 0,
            errors: Vec::new(),
        }
    }

    pub(crate) fn error(&mut self, pass: SweepPass, switch_id: Option<Uuid>, message: impl Into<String>) {
        let message = message.into();
        tracing::warn!(pass = pass.as_str(), switch_id = ?switch_id, error = %message, "sweep error");
        self.errors.push(SweepError {
            pass,
            switch_id,
            message,
        });
    }

    pub(crate) fn add_deliveries(&mut self, report: &DeliveryReport) {
        self.messages_sent += report.sent;
        self.messages_skipped += report.already_sent + report.in_flight + report.not_executable;
        self.messages_failed += report.failed;
    }

    /// Number of status transitions applied in the cycle.
    pub fn transitions(&self) -> u32 {
        self.marked_overdue
            + self.entered_grace
            + self.verification_started
            + self.verified_directly
            + self.verification_expired
            + self.executed
    }

    /// Whether the cycle did anything at all.
    pub fn is_idle(&self) -> bool {
        self.transitions() == 0
            && self.reminders_sent == 0
            && self.messages_sent == 0
            && self.retries_sent == 0
            && self.errors.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_report_is_idle() {
        let report = CycleReport::new(Utc::now());
        assert!(report.is_idle());
        assert_eq!(report.transitions(), 0);
    }

    #[test]
    fn test_errors_make_report_non_idle() {
        let mut report = CycleReport::new(Utc::now());
        report.error(SweepPass::Execution, Some(Uuid::nil()), "boom");
        assert!(!report.is_idle());

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["errors"][0]["pass"], "execution");
        assert_eq!(json["errors"][0]["message"], "boom");
    }

    #[test]
    fn test_add_deliveries() {
        let mut report = CycleReport::new(Utc::now());
        report.add_deliveries(&DeliveryReport {
            sent: 2,
            already_sent: 1,
            in_flight: 1,
            not_executable: 1,
            failed: 1,
            failures: vec![(Uuid::nil(), "x".into())],
        });
        assert_eq!(report.messages_sent, 2);
        assert_eq!(report.messages_skipped, 3);
        assert_eq!(report.messages_failed, 1);
    }
}
