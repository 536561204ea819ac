//! # Scheduler Sweep
//!
//! One cycle runs seven passes in order, each over the switches that match
//! its precondition at that moment:
//!
//! 1. overdue detection: ACTIVE past `next_check_in_due_at` → OVERDUE
//! 2. grace: OVERDUE → GRACE_PERIOD
//! 3. grace expiry: GRACE_PERIOD past `grace_period_ends_at` → verification
//!    request, or VERIFIED when verifiers are not in use
//! 4. verification expiry: open requests past `expires_at` → PAUSED
//! 5. execution: VERIFIED past `scheduled_execution_at` → deliver, EXECUTED
//! 6. reminders for ACTIVE switches due within the lookahead window
//! 7. delivery retry for EXECUTED switches
//!
//! Preconditions are re-checked inside each unit of work, so a pass can be
//! re-run or overlap another invocation without double effects. A failure
//! on one switch is recorded in the report and the sweep moves on.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde_json::json;
use uuid::Uuid;

use super::report::{CycleReport, SweepPass};
use crate::audit::{AuditAction, AuditEvent, EntityRef};
use crate::clock::Clock;
use crate::delivery::MessageDelivery;
use crate::notify::{Notification, Notifier};
use crate::store::{RecordStore, StoreResult, Switch};
use crate::switch::{StateMachine, SwitchError, SwitchStatus, TransitionContext};
use crate::verification::{VerificationError, VerificationQuorumEngine};

/// Sweep tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerPolicy {
    pub reminder_lookahead: Duration,
    pub max_delivery_attempts: u32,
}

impl Default for SchedulerPolicy {
    fn default() -> Self {
        Self {
            reminder_lookahead: Duration::hours(24),
            max_delivery_attempts: 3,
        }
    }
}

/// Owner address and names for a switch.
struct Contact {
    email: String,
    owner_name: String,
    switch_name: String,
}

/// Periodic driver of time-based transitions and final delivery.
pub struct Scheduler<S: RecordStore> {
    store: Arc<S>,
    clock: Arc<dyn Clock>,
    notifier: Arc<dyn Notifier>,
    engine: VerificationQuorumEngine<S>,
    delivery: MessageDelivery<S>,
    policy: SchedulerPolicy,
}

impl<S: RecordStore> Clone for Scheduler<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            clock: self.clock.clone(),
            notifier: self.notifier.clone(),
            engine: self.engine.clone(),
            delivery: self.delivery.clone(),
            policy: self.policy,
        }
    }
}

impl<S: RecordStore> Scheduler<S> {
    pub fn new(
        store: Arc<S>,
        clock: Arc<dyn Clock>,
        notifier: Arc<dyn Notifier>,
        engine: VerificationQuorumEngine<S>,
        delivery: MessageDelivery<S>,
        policy: SchedulerPolicy,
    ) -> Self {
        Self {
            store,
            clock,
            notifier,
            engine,
            delivery,
            policy,
        }
    }

    /// Run every pass once.
    pub fn run_cycle(&self) -> CycleReport {
        let mut report = CycleReport::new(self.clock.now());

        self.pass_overdue(&mut report);
        self.pass_grace(&mut report);
        self.pass_grace_expiry(&mut report);
        self.pass_verification_expiry(&mut report);
        self.pass_execution(&mut report);
        self.pass_reminders(&mut report);
        self.pass_delivery_retry(&mut report);

        report.finished_at = self.clock.now();
        tracing::info!(
            transitions = report.transitions(),
            executed = report.executed,
            messages_sent = report.messages_sent,
            reminders = report.reminders_sent,
            errors = report.errors.len(),
            "scheduler cycle finished"
        );
        report
    }

    // ==================
    // Passes
    // ==================

    fn pass_overdue(&self, report: &mut CycleReport) {
        let pass = SweepPass::Overdue;
        let now = self.clock.now();
        let Some(ids) = self.select(pass, report, |s| {
            s.status == SwitchStatus::Active && is_past(s.next_check_in_due_at, now)
        }) else {
            return;
        };

        for switch_id in ids {
            let advanced = self.advance(
                switch_id,
                SwitchStatus::Active,
                SwitchStatus::Overdue,
                "check_in_missed",
                |s, now| is_past(s.next_check_in_due_at, now),
            );
            match advanced {
                Ok(Some(switch)) => {
                    report.marked_overdue += 1;
                    let missed_at = switch.next_check_in_due_at.unwrap_or(now);
                    self.notify_owner(report, &switch, |c| Notification::OverdueNotice {
                        owner_name: c.owner_name.clone(),
                        switch_name: c.switch_name.clone(),
                        missed_at,
                    });
                }
                Ok(None) => tracing::debug!(%switch_id, pass = pass.as_str(), "precondition no longer holds"),
                Err(e) => report.error(pass, Some(switch_id), e.to_string()),
            }
        }
    }

    fn pass_grace(&self, report: &mut CycleReport) {
        let pass = SweepPass::Grace;
        let Some(ids) = self.select(pass, report, |s| s.status == SwitchStatus::Overdue) else {
            return;
        };

        for switch_id in ids {
            let advanced = self.advance(
                switch_id,
                SwitchStatus::Overdue,
                SwitchStatus::GracePeriod,
                "grace_started",
                |_, _| true,
            );
            match advanced {
                Ok(Some(switch)) => {
                    report.entered_grace += 1;
                    let grace_ends_at = switch.grace_period_ends_at.unwrap_or(switch.updated_at);
                    self.notify_owner(report, &switch, |c| Notification::GraceWarning {
                        owner_name: c.owner_name.clone(),
                        switch_name: c.switch_name.clone(),
                        grace_ends_at,
                    });
                }
                Ok(None) => tracing::debug!(%switch_id, pass = pass.as_str(), "precondition no longer holds"),
                Err(e) => report.error(pass, Some(switch_id), e.to_string()),
            }
        }
    }

    fn pass_grace_expiry(&self, report: &mut CycleReport) {
        let pass = SweepPass::GraceExpiry;
        let now = self.clock.now();
        let Some(ids) = self.select(pass, report, |s| {
            s.status == SwitchStatus::GracePeriod && is_past(s.grace_period_ends_at, now)
        }) else {
            return;
        };

        for switch_id in ids {
            let uses_verifiers = self
                .store
                .read(|t| t.switches.get(&switch_id).map_or(false, |s| s.use_verifiers));
            let uses_verifiers = match uses_verifiers {
                Ok(v) => v,
                Err(e) => {
                    report.error(pass, Some(switch_id), e.to_string());
                    continue;
                }
            };

            if uses_verifiers {
                match self.engine.create_request(switch_id) {
                    Ok(issued) => {
                        report.verification_started += 1;
                        self.notify_verifiers(report, switch_id, &issued);
                        continue;
                    }
                    Err(VerificationError::InsufficientVerifiers(reason)) => {
                        tracing::warn!(%switch_id, %reason, "not enough verifiers; verifying directly");
                    }
                    Err(VerificationError::Switch(
                        SwitchError::InvalidTransition { .. } | SwitchError::NotFound(_),
                    )) => {
                        tracing::debug!(%switch_id, pass = pass.as_str(), "precondition no longer holds");
                        continue;
                    }
                    Err(e) => {
                        report.error(pass, Some(switch_id), e.to_string());
                        continue;
                    }
                }
            }

            let advanced = self.advance(
                switch_id,
                SwitchStatus::GracePeriod,
                SwitchStatus::Verified,
                "grace_expired",
                |s, now| is_past(s.grace_period_ends_at, now),
            );
            match advanced {
                Ok(Some(_)) => report.verified_directly += 1,
                Ok(None) => tracing::debug!(%switch_id, pass = pass.as_str(), "precondition no longer holds"),
                Err(e) => report.error(pass, Some(switch_id), e.to_string()),
            }
        }
    }

    fn pass_verification_expiry(&self, report: &mut CycleReport) {
        let pass = SweepPass::VerificationExpiry;
        let request_ids = match self.engine.expired_request_ids() {
            Ok(ids) => ids,
            Err(e) => {
                report.error(pass, None, e.to_string());
                return;
            }
        };

        for request_id in request_ids {
            match self.engine.expire_request(request_id) {
                Ok(Some(_)) => report.verification_expired += 1,
                Ok(None) => {}
                Err(e) => report.error(pass, None, format!("request {}: {}", request_id, e)),
            }
        }
    }

    fn pass_execution(&self, report: &mut CycleReport) {
        let pass = SweepPass::Execution;
        let now = self.clock.now();
        let Some(ids) = self.select(pass, report, |s| {
            s.status == SwitchStatus::Verified && is_past(s.scheduled_execution_at, now)
        }) else {
            return;
        };

        for switch_id in ids {
            let deliveries = match self.delivery.deliver_switch(switch_id) {
                Ok(d) => d,
                Err(e) => {
                    report.error(pass, Some(switch_id), e.to_string());
                    continue;
                }
            };
            report.add_deliveries(&deliveries);
            for (message_id, error) in &deliveries.failures {
                tracing::warn!(%switch_id, %message_id, %error, "message not delivered; executing anyway");
            }
            if deliveries.not_executable > 0 {
                tracing::info!(%switch_id, "switch left VERIFIED during delivery; not executing");
                continue;
            }

            // Advance regardless of per-message outcome; the ledger keeps the
            // failures and pass 7 retries them.
            let advanced = self.advance(
                switch_id,
                SwitchStatus::Verified,
                SwitchStatus::Executed,
                "execution",
                |s, now| is_past(s.scheduled_execution_at, now),
            );
            match advanced {
                Ok(Some(_)) => report.executed += 1,
                Ok(None) => tracing::debug!(%switch_id, pass = pass.as_str(), "precondition no longer holds"),
                Err(e) => report.error(pass, Some(switch_id), e.to_string()),
            }
        }
    }

    fn pass_reminders(&self, report: &mut CycleReport) {
        let pass = SweepPass::Reminders;
        let now = self.clock.now();
        let horizon = now + self.policy.reminder_lookahead;
        let Some(ids) = self.select(pass, report, |s| reminder_due(s, now, horizon)) else {
            return;
        };

        for switch_id in ids {
            let marked = self.store.transaction(|tx| {
                let due_at = match tx.switches.get_mut(&switch_id) {
                    Some(s) if reminder_due(s, now, horizon) => {
                        s.reminder_sent_for = s.next_check_in_due_at;
                        s.next_check_in_due_at
                    }
                    _ => return Ok::<_, crate::store::StoreError>(None),
                };
                tx.audit(
                    AuditEvent::new(EntityRef::Switch(switch_id), AuditAction::ReminderSent, now)
                        .with_metadata(json!({ "due_at": due_at })),
                );
                Ok(tx.switches.get(&switch_id).cloned())
            });

            match marked {
                Ok(Some(switch)) => {
                    let due_at = switch.next_check_in_due_at.unwrap_or(now);
                    let sent = self.notify_owner(report, &switch, |c| Notification::CheckInReminder {
                        owner_name: c.owner_name.clone(),
                        switch_name: c.switch_name.clone(),
                        due_at,
                    });
                    if sent {
                        report.reminders_sent += 1;
                    }
                }
                Ok(None) => {}
                Err(e) => report.error(pass, Some(switch_id), e.to_string()),
            }
        }
    }

    fn pass_delivery_retry(&self, report: &mut CycleReport) {
        let pass = SweepPass::DeliveryRetry;
        // Switches executed in this cycle already had their first attempt.
        let started_at = report.started_at;
        let Some(ids) = self.select(pass, report, |s| {
            s.status == SwitchStatus::Executed && s.updated_at < started_at
        }) else {
            return;
        };

        for switch_id in ids {
            match self
                .delivery
                .retry_failed(switch_id, self.policy.max_delivery_attempts)
            {
                Ok(retried) => {
                    report.retries_sent += retried.sent;
                    report.messages_failed += retried.failed;
                }
                Err(e) => report.error(pass, Some(switch_id), e.to_string()),
            }
        }
    }

    // ==================
    // Helpers
    // ==================

    /// Ids of switches matching `predicate`, or `None` after recording the
    /// read failure.
    fn select<P>(&self, pass: SweepPass, report: &mut CycleReport, predicate: P) -> Option<Vec<Uuid>>
    where
        P: Fn(&Switch) -> bool,
    {
        let ids = self.store.read(|tables| {
            tables
                .switches
                .values()
                .filter(|s| predicate(s))
                .map(|s| s.id)
                .collect::<Vec<_>>()
        });
        match ids {
            Ok(ids) => Some(ids),
            Err(e) => {
                report.error(pass, None, e.to_string());
                None
            }
        }
    }

    /// Apply `from → target` if the switch is still in `from` and
    /// `precondition` holds. Returns the updated switch when applied.
    fn advance<P>(
        &self,
        switch_id: Uuid,
        from: SwitchStatus,
        target: SwitchStatus,
        reason: &'static str,
        precondition: P,
    ) -> StoreResult<Option<Switch>>
    where
        P: FnOnce(&Switch, DateTime<Utc>) -> bool,
    {
        let ctx = TransitionContext::system(self.clock.now(), reason);
        self.store.transaction(|tx| {
            let ready = tx
                .switches
                .get(&switch_id)
                .map_or(false, |s| s.status == from && precondition(s, ctx.now));
            if !ready {
                return Ok(None);
            }
            if !StateMachine::<S>::apply(tx, switch_id, target, &ctx)?.is_applied() {
                return Ok(None);
            }
            Ok(tx.switches.get(&switch_id).cloned())
        })
    }

    fn contact(&self, switch: &Switch) -> Option<Contact> {
        self.store
            .read(|tables| {
                tables.users.get(&switch.owner_id).map(|owner| Contact {
                    email: owner.email.clone(),
                    owner_name: owner.display_name.clone(),
                    switch_name: switch.name.clone(),
                })
            })
            .ok()
            .flatten()
    }

    /// Best-effort owner notification. Returns whether it was sent.
    fn notify_owner<F>(&self, report: &mut CycleReport, switch: &Switch, build: F) -> bool
    where
        F: FnOnce(&Contact) -> Notification,
    {
        let Some(contact) = self.contact(switch) else {
            tracing::warn!(switch_id = %switch.id, "owner record missing; notification skipped");
            return false;
        };
        let notification = build(&contact);
        match self.notifier.send(&contact.email, &notification) {
            Ok(_) => true,
            Err(e) => {
                report.notifications_failed += 1;
                tracing::warn!(
                    switch_id = %switch.id,
                    kind = notification.kind(),
                    error = %e,
                    "owner notification failed"
                );
                false
            }
        }
    }

    fn notify_verifiers(
        &self,
        report: &mut CycleReport,
        switch_id: Uuid,
        issued: &crate::verification::IssuedRequest,
    ) {
        let switch = match self.store.read(|t| t.switches.get(&switch_id).cloned()) {
            Ok(Some(s)) => s,
            _ => return,
        };
        let Some(contact) = self.contact(&switch) else {
            return;
        };

        for credential in &issued.credentials {
            let notification = Notification::VerificationRequest {
                owner_name: contact.owner_name.clone(),
                switch_name: contact.switch_name.clone(),
                token: credential.token.clone(),
                otp: credential.otp.clone(),
                expires_at: issued.request.expires_at,
            };
            if let Err(e) = self.notifier.send(&credential.email, &notification) {
                report.notifications_failed += 1;
                tracing::warn!(
                    %switch_id,
                    verifier_id = %credential.verifier_id,
                    error = %e,
                    "verifier notification failed"
                );
            }
        }
    }
}

fn is_past(deadline: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
    deadline.map_or(false, |d| d < now)
}

fn reminder_due(switch: &Switch, now: DateTime<Utc>, horizon: DateTime<Utc>) -> bool {
    switch.status == SwitchStatus::Active
        && switch.next_check_in_due_at.map_or(false, |due| due > now && due <= horizon)
        && switch.reminder_sent_for != switch.next_check_in_due_at
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    use crate::audit::{AuditEvent, AuditSink, MemoryAuditSink};
    use crate::clock::ManualClock;
    use crate::crypto::EncryptionService;
    use crate::notify::MemoryNotifier;
    use crate::store::{Actor, MemoryStore, Role};
    use crate::switch::{SwitchLifecycleManager, SwitchSettings};
    use crate::verification::{VerificationPolicy, VerifierRegistry};

    /// Audit sink that refuses events about one switch.
    struct RefusingSink {
        inner: MemoryAuditSink,
        refused: std::sync::Mutex<Option<Uuid>>,
    }

    impl AuditSink for RefusingSink {
        fn append(&self, event: &AuditEvent) -> io::Result<()> {
            let refused = *self.refused.lock().unwrap();
            if refused == Some(event.entity.id()) {
                return Err(io::Error::new(io::ErrorKind::Other, "disk full"));
            }
            self.inner.append(event)
        }
    }

    struct Fixture {
        scheduler: Scheduler<MemoryStore>,
        manager: SwitchLifecycleManager<MemoryStore>,
        registry: VerifierRegistry<MemoryStore>,
        store: Arc<MemoryStore>,
        sink: Arc<RefusingSink>,
        clock: Arc<ManualClock>,
        notifier: Arc<MemoryNotifier>,
        owner: Actor,
    }

    fn fixture() -> Fixture {
        let sink = Arc::new(RefusingSink {
            inner: MemoryAuditSink::new(),
            refused: std::sync::Mutex::new(None),
        });
        let store = Arc::new(MemoryStore::new(sink.clone()));
        let clock = Arc::new(ManualClock::default());
        let notifier = Arc::new(MemoryNotifier::new());
        let cipher = Arc::new(EncryptionService::new("0123456789abcdef0123456789abcdef").unwrap());
        let policy = VerificationPolicy::default();

        let manager = SwitchLifecycleManager::new(store.clone(), clock.clone(), cipher.clone());
        let registry = VerifierRegistry::new(store.clone(), clock.clone(), notifier.clone(), policy);
        let engine = VerificationQuorumEngine::new(store.clone(), clock.clone(), notifier.clone(), policy);
        let delivery = MessageDelivery::new(
            store.clone(),
            clock.clone(),
            cipher,
            notifier.clone(),
            Duration::minutes(15),
        );
        let scheduler = Scheduler::new(
            store.clone(),
            clock.clone(),
            notifier.clone(),
            engine,
            delivery,
            SchedulerPolicy::default(),
        );

        let user = manager
            .register_user("owner@example.com", "Owner", Role::Owner)
            .unwrap();
        Fixture {
            scheduler,
            manager,
            registry,
            store,
            sink,
            clock,
            notifier,
            owner: Actor::owner(user.id),
        }
    }

    fn settings(use_verifiers: bool, required: u32) -> SwitchSettings {
        SwitchSettings {
            name: "vault".into(),
            check_in_interval_days: 7,
            grace_period_days: 3,
            verification_window_days: 5,
            final_delay_hours: 24,
            use_verifiers,
            required_confirmations: required,
        }
    }

    fn status(f: &Fixture, id: Uuid) -> SwitchStatus {
        f.store.read(|t| t.switches[&id].status).unwrap()
    }

    fn accept_verifier(f: &Fixture, switch_id: Uuid, email: &str) {
        f.registry.add_verifier(&f.owner, switch_id, email, None).unwrap();
        let token = match &f.notifier.sent_to(email)[0].notification {
            Notification::VerifierInvitation { invite_token, .. } => invite_token.clone(),
            other => panic!("unexpected notification {:?}", other),
        };
        f.registry.accept_invitation(&token).unwrap();
    }

    #[test]
    fn test_idle_cycle() {
        let f = fixture();
        f.manager.create(&f.owner, settings(false, 1)).unwrap();
        assert!(f.scheduler.run_cycle().is_idle());
    }

    #[test]
    fn test_overdue_and_grace_in_one_cycle() {
        let f = fixture();
        let switch = f.manager.create(&f.owner, settings(false, 1)).unwrap();

        f.clock.advance(Duration::days(7) + Duration::minutes(1));
        let report = f.scheduler.run_cycle();
        assert_eq!(report.marked_overdue, 1);
        assert_eq!(report.entered_grace, 1);
        assert_eq!(status(&f, switch.id), SwitchStatus::GracePeriod);
        assert_eq!(f.notifier.count_kind("overdue_notice"), 1);
        assert_eq!(f.notifier.count_kind("grace_warning"), 1);

        // Re-running is a no-op.
        assert!(f.scheduler.run_cycle().is_idle());
        assert_eq!(f.notifier.count_kind("grace_warning"), 1);
    }

    #[test]
    fn test_grace_expiry_opens_verification() {
        let f = fixture();
        let switch = f.manager.create(&f.owner, settings(true, 2)).unwrap();
        accept_verifier(&f, switch.id, "a@example.com");
        accept_verifier(&f, switch.id, "b@example.com");

        f.clock.advance(Duration::days(7) + Duration::minutes(1));
        f.scheduler.run_cycle();
        f.clock.advance(Duration::days(3) + Duration::minutes(1));
        let report = f.scheduler.run_cycle();

        assert_eq!(report.verification_started, 1);
        assert_eq!(status(&f, switch.id), SwitchStatus::PendingVerification);
        assert_eq!(f.notifier.count_kind("verification_request"), 2);
    }

    #[test]
    fn test_insufficient_verifiers_verifies_directly() {
        let f = fixture();
        let switch = f.manager.create(&f.owner, settings(true, 2)).unwrap();
        accept_verifier(&f, switch.id, "a@example.com");

        f.clock.advance(Duration::days(7) + Duration::minutes(1));
        f.scheduler.run_cycle();
        f.clock.advance(Duration::days(3) + Duration::minutes(1));
        let report = f.scheduler.run_cycle();

        assert_eq!(report.verified_directly, 1);
        assert_eq!(status(&f, switch.id), SwitchStatus::Verified);
    }

    #[test]
    fn test_verification_expiry_pauses() {
        let f = fixture();
        let switch = f.manager.create(&f.owner, settings(true, 1)).unwrap();
        accept_verifier(&f, switch.id, "a@example.com");

        f.clock.advance(Duration::days(7) + Duration::minutes(1));
        f.scheduler.run_cycle();
        f.clock.advance(Duration::days(3) + Duration::minutes(1));
        f.scheduler.run_cycle();
        f.clock.advance(Duration::days(5) + Duration::minutes(1));
        let report = f.scheduler.run_cycle();

        assert_eq!(report.verification_expired, 1);
        assert_eq!(status(&f, switch.id), SwitchStatus::Paused);
        assert_eq!(f.notifier.count_kind("switch_paused"), 1);
    }

    #[test]
    fn test_execution_tolerates_failed_delivery() {
        let f = fixture();
        let switch = f.manager.create(&f.owner, settings(false, 1)).unwrap();
        let ok = f
            .manager
            .add_recipient(&f.owner, switch.id, "ok@example.com", "Ok")
            .unwrap();
        let down = f
            .manager
            .add_recipient(&f.owner, switch.id, "down@example.com", "Down")
            .unwrap();
        f.manager.create_message(&f.owner, ok.id, "s", "b").unwrap();
        f.manager.create_message(&f.owner, down.id, "s", "b").unwrap();
        f.notifier.fail_for("down@example.com");

        f.clock.advance(Duration::days(7) + Duration::minutes(1));
        f.scheduler.run_cycle();
        f.clock.advance(Duration::days(3) + Duration::minutes(1));
        f.scheduler.run_cycle();
        f.clock.advance(Duration::hours(24) + Duration::minutes(1));
        let report = f.scheduler.run_cycle();

        assert_eq!(report.executed, 1);
        assert_eq!(report.messages_sent, 1);
        assert_eq!(report.messages_failed, 1);
        assert_eq!(status(&f, switch.id), SwitchStatus::Executed);

        // Next cycle retries the failed message once the mailbox recovers.
        f.notifier.recover("down@example.com");
        f.clock.advance(Duration::minutes(1));
        let report = f.scheduler.run_cycle();
        assert_eq!(report.retries_sent, 1);
        assert_eq!(f.notifier.count_kind("final_message"), 2);

        let report = f.scheduler.run_cycle();
        assert_eq!(report.retries_sent, 0);
    }

    #[test]
    fn test_reminder_sent_once_per_due_date() {
        let f = fixture();
        let switch = f.manager.create(&f.owner, settings(false, 1)).unwrap();

        f.clock.advance(Duration::days(6) + Duration::hours(1));
        assert_eq!(f.scheduler.run_cycle().reminders_sent, 1);
        assert_eq!(f.scheduler.run_cycle().reminders_sent, 0);

        // A check-in moves the deadline; the next window gets a new reminder.
        f.manager.check_in(&f.owner, switch.id).unwrap();
        f.clock.advance(Duration::days(6) + Duration::hours(1));
        assert_eq!(f.scheduler.run_cycle().reminders_sent, 1);
        assert_eq!(f.notifier.count_kind("check_in_reminder"), 2);
    }

    #[test]
    fn test_one_failing_switch_does_not_block_others() {
        let f = fixture();
        let broken = f.manager.create(&f.owner, settings(false, 1)).unwrap();
        let healthy = f.manager.create(&f.owner, settings(false, 1)).unwrap();
        *f.sink.refused.lock().unwrap() = Some(broken.id);

        f.clock.advance(Duration::days(7) + Duration::minutes(1));
        let report = f.scheduler.run_cycle();

        assert_eq!(status(&f, healthy.id), SwitchStatus::GracePeriod);
        assert_eq!(status(&f, broken.id), SwitchStatus::Active);
        assert!(!report.errors.is_empty());
        assert!(report
            .errors
            .iter()
            .all(|e| e.switch_id == Some(broken.id)));
        assert_eq!(report.errors[0].pass, SweepPass::Overdue);
    }
}
