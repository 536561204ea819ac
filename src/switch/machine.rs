//! Switch State Machine
//!
//! Validates and applies status transitions and owns the timer-field side
//! effects of entering each status:
//!
//! | entering | effect |
//! |---|---|
//! | ACTIVE | `last_check_in_at = now`, `next_check_in_due_at = now + interval`, other timers cleared |
//! | OVERDUE | missed `next_check_in_due_at` kept |
//! | GRACE_PERIOD | `grace_period_ends_at = now + grace` |
//! | PENDING_VERIFICATION | grace timer cleared |
//! | VERIFIED | `scheduled_execution_at = now + final delay` |
//! | EXECUTED, CANCELED, PAUSED | all timers cleared |
//!
//! Every transition is one read-modify-write unit that also stages the
//! audit record. Expected rejections are values, not errors.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use serde_json::json;
use uuid::Uuid;

use super::errors::{SwitchError, SwitchResult};
use super::state::SwitchStatus;
use crate::audit::{AuditAction, AuditEvent, EntityRef};
use crate::clock::Clock;
use crate::store::{RecordStore, StoreResult, Switch, Tx, VerificationResult};

/// Who and what caused a transition.
#[derive(Debug, Clone, Copy)]
pub struct TransitionContext {
    pub now: DateTime<Utc>,
    /// `None` for the scheduler and anonymous verifiers.
    pub actor_id: Option<Uuid>,
    /// Shared by every audit event of one composite operation.
    pub correlation_id: Uuid,
    pub reason: &'static str,
}

impl TransitionContext {
    /// A transition driven by the scheduler or a verifier vote.
    pub fn system(now: DateTime<Utc>, reason: &'static str) -> Self {
        Self {
            now,
            actor_id: None,
            correlation_id: Uuid::new_v4(),
            reason,
        }
    }

    /// A transition requested by an authenticated user.
    pub fn by(actor_id: Uuid, now: DateTime<Utc>, reason: &'static str) -> Self {
        Self {
            actor_id: Some(actor_id),
            ..Self::system(now, reason)
        }
    }

    /// Same cause, linked to an existing operation.
    pub fn correlated(mut self, correlation_id: Uuid) -> Self {
        self.correlation_id = correlation_id;
        self
    }

    fn event(&self, entity: EntityRef, action: AuditAction) -> AuditEvent {
        AuditEvent::new(entity, action, self.now)
            .with_actor(self.actor_id)
            .with_correlation(self.correlation_id)
    }
}

/// Why a transition was not applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum TransitionRejection {
    NotFound,
    InvalidTransition { from: SwitchStatus, to: SwitchStatus },
}

impl From<TransitionRejection> for SwitchError {
    fn from(rejection: TransitionRejection) -> Self {
        match rejection {
            TransitionRejection::NotFound => SwitchError::NotFound("switch"),
            TransitionRejection::InvalidTransition { from, to } => {
                SwitchError::InvalidTransition { from, to }
            }
        }
    }
}

/// Result of [`StateMachine::transition`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum TransitionOutcome {
    Applied {
        from: SwitchStatus,
        to: SwitchStatus,
    },
    Rejected { reason: TransitionRejection },
}

impl TransitionOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, Self::Applied { .. })
    }

    /// Turn a rejection into an error for callers that treat it as one.
    pub fn into_result(self) -> SwitchResult<(SwitchStatus, SwitchStatus)> {
        match self {
            Self::Applied { from, to } => Ok((from, to)),
            Self::Rejected { reason } => Err(reason.into()),
        }
    }
}

/// Result of an owner check-in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CheckInOutcome {
    pub previous: SwitchStatus,
    pub next_check_in_due_at: DateTime<Utc>,
    /// Open verification request force-completed as denied, if any.
    pub denied_request_id: Option<Uuid>,
}

/// Switch status state machine over a record store.
pub struct StateMachine<S: RecordStore> {
    store: Arc<S>,
    clock: Arc<dyn Clock>,
}

impl<S: RecordStore> Clone for StateMachine<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            clock: self.clock.clone(),
        }
    }
}

impl<S: RecordStore> StateMachine<S> {
    pub fn new(store: Arc<S>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Move a switch to `target` in its own unit of work.
    ///
    /// `Err` only for infrastructure failures.
    pub fn transition(
        &self,
        switch_id: Uuid,
        target: SwitchStatus,
        actor_id: Option<Uuid>,
        reason: &'static str,
    ) -> StoreResult<TransitionOutcome> {
        let ctx = TransitionContext {
            actor_id,
            ..TransitionContext::system(self.clock.now(), reason)
        };
        self.store
            .transaction(|tx| Self::apply(tx, switch_id, target, &ctx))
    }

    /// Owner check-in in its own unit of work. Ownership is the caller's
    /// concern.
    pub fn check_in(&self, switch_id: Uuid, actor_id: Uuid) -> SwitchResult<CheckInOutcome> {
        let ctx = TransitionContext::by(actor_id, self.clock.now(), "owner_check_in");
        self.store
            .transaction(|tx| Self::apply_check_in(tx, switch_id, &ctx))
    }

    /// Apply a transition inside an open unit of work.
    pub fn apply(
        tx: &mut Tx<'_>,
        switch_id: Uuid,
        target: SwitchStatus,
        ctx: &TransitionContext,
    ) -> StoreResult<TransitionOutcome> {
        let from = match tx.switches.get(&switch_id) {
            Some(switch) => switch.status,
            None => {
                return Ok(TransitionOutcome::Rejected {
                    reason: TransitionRejection::NotFound,
                })
            }
        };

        if !from.can_transition_to(target) {
            return Ok(TransitionOutcome::Rejected {
                reason: TransitionRejection::InvalidTransition { from, to: target },
            });
        }

        // Leaving verification for anything but VERIFIED closes the vote.
        if from == SwitchStatus::PendingVerification && target != SwitchStatus::Verified {
            Self::complete_open_request(tx, switch_id, VerificationResult::Denied, ctx);
        }

        Self::write_status(tx, switch_id, from, target, ctx);
        Ok(TransitionOutcome::Applied { from, to: target })
    }

    /// Composite check-in inside an open unit of work: force ACTIVE with
    /// fresh timers and deny any open verification request.
    pub fn apply_check_in(
        tx: &mut Tx<'_>,
        switch_id: Uuid,
        ctx: &TransitionContext,
    ) -> SwitchResult<CheckInOutcome> {
        let previous = tx
            .switches
            .get(&switch_id)
            .map(|s| s.status)
            .ok_or(SwitchError::NotFound("switch"))?;

        if !previous.accepts_check_in() {
            return Err(SwitchError::InvalidCheckIn(previous));
        }

        let denied_request_id =
            Self::complete_open_request(tx, switch_id, VerificationResult::Denied, ctx);

        Self::write_status(tx, switch_id, previous, SwitchStatus::Active, ctx);

        let next_check_in_due_at = tx
            .switches
            .get(&switch_id)
            .and_then(|s| s.next_check_in_due_at)
            .unwrap_or(ctx.now);

        tx.audit(
            ctx.event(EntityRef::Switch(switch_id), AuditAction::CheckIn)
                .with_metadata(json!({
                    "previous_status": previous,
                    "next_check_in_due_at": next_check_in_due_at,
                    "denied_request_id": denied_request_id,
                })),
        );

        tracing::info!(%switch_id, %previous, "owner checked in");

        Ok(CheckInOutcome {
            previous,
            next_check_in_due_at,
            denied_request_id,
        })
    }

    /// Close the switch's open verification request, if any.
    pub(crate) fn complete_open_request(
        tx: &mut Tx<'_>,
        switch_id: Uuid,
        result: VerificationResult,
        ctx: &TransitionContext,
    ) -> Option<Uuid> {
        let request_id = tx.open_request_id_for(switch_id)?;
        if let Some(request) = tx.requests.get_mut(&request_id) {
            request.complete(result, ctx.now);
        }

        tx.audit(
            ctx.event(
                EntityRef::VerificationRequest(request_id),
                AuditAction::VerificationCompleted,
            )
            .with_metadata(json!({
                "switch_id": switch_id,
                "result": result,
                "reason": ctx.reason,
            })),
        );
        Some(request_id)
    }

    fn write_status(
        tx: &mut Tx<'_>,
        switch_id: Uuid,
        from: SwitchStatus,
        to: SwitchStatus,
        ctx: &TransitionContext,
    ) {
        if let Some(switch) = tx.switches.get_mut(&switch_id) {
            apply_timer_effects(switch, to, ctx.now);
            switch.status = to;
            switch.updated_at = ctx.now;
        }

        if from != to {
            tx.audit(
                ctx.event(EntityRef::Switch(switch_id), AuditAction::StatusChanged)
                    .with_metadata(json!({
                        "from": from,
                        "to": to,
                        "reason": ctx.reason,
                    })),
            );
            tracing::info!(%switch_id, %from, %to, reason = ctx.reason, "switch status changed");
        }
    }
}

/// Timer side effects of entering `target`.
pub fn apply_timer_effects(switch: &mut Switch, target: SwitchStatus, now: DateTime<Utc>) {
    match target {
        SwitchStatus::Active => {
            switch.last_check_in_at = Some(now);
            switch.next_check_in_due_at =
                Some(now + Duration::days(i64::from(switch.check_in_interval_days)));
            switch.grace_period_ends_at = None;
            switch.scheduled_execution_at = None;
            switch.reminder_sent_for = None;
        }
        SwitchStatus::Overdue => {}
        SwitchStatus::GracePeriod => {
            switch.grace_period_ends_at =
                Some(now + Duration::days(i64::from(switch.grace_period_days)));
        }
        SwitchStatus::PendingVerification => {
            switch.grace_period_ends_at = None;
            switch.scheduled_execution_at = None;
        }
        SwitchStatus::Verified => {
            switch.grace_period_ends_at = None;
            switch.scheduled_execution_at =
                Some(now + Duration::hours(i64::from(switch.final_delay_hours)));
        }
        SwitchStatus::Executed | SwitchStatus::Canceled | SwitchStatus::Paused => {
            switch.next_check_in_due_at = None;
            switch.grace_period_ends_at = None;
            switch.scheduled_execution_at = None;
        }
    }
}
