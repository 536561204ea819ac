//! Execution Idempotency Tests
//!
//! Final delivery is at-most-once per message:
//! - repeated and overlapping sweeps send each message once
//! - a failing mailbox does not block execution and is retried a bounded
//!   number of times
//! - direct re-delivery of a sent message is a no-op
//! - an owner check-in that lands mid-delivery stops the remaining sends

mod harness;

use std::sync::{Arc, Mutex};
use std::thread;

use chrono::{Duration, TimeZone, Utc};
use uuid::Uuid;

use deadswitch::audit::MemoryAuditSink;
use deadswitch::clock::ManualClock;
use deadswitch::config::PolicyConfig;
use deadswitch::crypto::EncryptionService;
use deadswitch::delivery::DeliveryOutcome;
use deadswitch::notify::{MemoryNotifier, Notification, Notifier, NotifyResult};
use deadswitch::store::{Actor, DeliveryStatus, EmailDelivery, MemoryStore, RecordStore, Role};
use deadswitch::switch::{SwitchLifecycleManager, SwitchStatus};
use deadswitch::DeadSwitch;
use harness::{past, settings, World, MASTER_KEY};

/// Switch with three recipient messages, one step short of execution.
fn ready_to_execute(world: &World) -> (Uuid, Vec<Uuid>) {
    let switch = world.create_switch(settings(1, 0, 2, false, 1));
    let mut messages = Vec::new();
    for (email, name) in [
        ("a@example.com", "A"),
        ("b@example.com", "B"),
        ("c@example.com", "C"),
    ] {
        let recipient = world
            .app
            .switches
            .add_recipient(&world.owner, switch.id, email, name)
            .unwrap();
        let message = world
            .app
            .switches
            .create_message(&world.owner, recipient.id, "Goodbye", "Thanks for everything.")
            .unwrap();
        messages.push(message.id);
    }

    world.advance(past(Duration::days(1)));
    world.sweep();
    world.advance(Duration::minutes(1));
    world.sweep();
    assert_eq!(world.status(switch.id), SwitchStatus::Verified);

    world.advance(past(Duration::hours(2)));
    (switch.id, messages)
}

fn delivery(world: &World, message_id: Uuid) -> EmailDelivery {
    world
        .store
        .read(|t| t.delivery_for_message(message_id).cloned())
        .unwrap()
        .unwrap()
}

#[test]
fn test_overlapping_sweeps_deliver_once() {
    let world = World::new();
    let (switch_id, messages) = ready_to_execute(&world);

    let reports: Vec<_> = thread::scope(|scope| {
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let scheduler = world.app.scheduler.clone();
                scope.spawn(move || scheduler.run_cycle())
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    assert_eq!(reports.iter().map(|r| r.executed).sum::<u32>(), 1);
    assert_eq!(reports.iter().map(|r| r.messages_sent).sum::<u32>(), 3);
    assert!(reports.iter().all(|r| r.errors.is_empty()));
    assert_eq!(world.status(switch_id), SwitchStatus::Executed);
    assert_eq!(world.notifier.count_kind("final_message"), 3);

    for message_id in messages {
        let row = delivery(&world, message_id);
        assert_eq!(row.status, DeliveryStatus::Sent);
        assert!(row.provider_message_id.is_some());
    }
}

#[test]
fn test_redelivery_is_noop() {
    let world = World::new();
    let (switch_id, messages) = ready_to_execute(&world);
    world.sweep();

    assert_eq!(
        world.app.delivery.deliver(messages[0]).unwrap(),
        DeliveryOutcome::AlreadySent
    );
    let report = world.app.delivery.deliver_switch(switch_id).unwrap();
    assert_eq!(report.already_sent, 3);
    assert_eq!(report.sent, 0);
    assert_eq!(world.notifier.count_kind("final_message"), 3);
}

#[test]
fn test_failed_mailbox_retried_up_to_cap() {
    let world = World::new();
    let (switch_id, messages) = ready_to_execute(&world);
    world.notifier.fail_for("b@example.com");

    let report = world.sweep();
    assert_eq!(report.executed, 1);
    assert_eq!(report.messages_sent, 2);
    assert_eq!(report.messages_failed, 1);
    assert_eq!(world.status(switch_id), SwitchStatus::Executed);

    let failed = delivery(&world, messages[1]);
    assert_eq!(failed.status, DeliveryStatus::Failed);
    assert_eq!(failed.retry_count, 1);
    assert!(failed.last_error.is_some());

    // Attempts 2 and 3 on the following cycles, then nothing more.
    for attempt in 2..=3 {
        world.advance(Duration::minutes(15));
        let report = world.sweep();
        assert_eq!(report.messages_failed, 1);
        assert_eq!(delivery(&world, messages[1]).retry_count, attempt);
    }
    world.advance(Duration::minutes(15));
    let report = world.sweep();
    assert_eq!(report.messages_failed, 0);
    assert_eq!(delivery(&world, messages[1]).retry_count, 3);

    // Past the cap even a recovered mailbox is left alone.
    world.notifier.recover("b@example.com");
    world.advance(Duration::minutes(15));
    assert!(world.sweep().is_idle());
    assert!(world.notifier.sent_to("b@example.com").is_empty());
    assert_eq!(world.notifier.count_kind("final_message"), 2);
}

#[test]
fn test_recovered_mailbox_delivered_on_retry() {
    let world = World::new();
    let (_, messages) = ready_to_execute(&world);
    world.notifier.fail_for("c@example.com");
    world.sweep();

    world.notifier.recover("c@example.com");
    world.advance(Duration::minutes(15));
    let report = world.sweep();
    assert_eq!(report.retries_sent, 1);

    let row = delivery(&world, messages[2]);
    assert_eq!(row.status, DeliveryStatus::Sent);
    assert_eq!(row.retry_count, 2);
    assert_eq!(world.notifier.sent_to("c@example.com").len(), 1);

    world.advance(Duration::minutes(15));
    assert!(world.sweep().is_idle());
}

/// Records sends; the first final message triggers an owner check-in.
struct CheckInOnFirstFinal {
    inner: MemoryNotifier,
    owner: Mutex<Option<(SwitchLifecycleManager<MemoryStore>, Actor, Uuid)>>,
}

impl Notifier for CheckInOnFirstFinal {
    fn send(&self, to: &str, notification: &Notification) -> NotifyResult<String> {
        let sent = self.inner.send(to, notification);
        if matches!(notification, Notification::FinalMessage { .. }) {
            let armed = self.owner.lock().unwrap().take();
            if let Some((switches, actor, switch_id)) = armed {
                switches.check_in(&actor, switch_id).unwrap();
            }
        }
        sent
    }
}

#[test]
fn test_check_in_during_delivery_stops_release() {
    let audit = Arc::new(MemoryAuditSink::new());
    let store = Arc::new(MemoryStore::new(audit));
    let clock = Arc::new(ManualClock::new(
        Utc.with_ymd_and_hms(2025, 1, 1, 9, 0, 0).unwrap(),
    ));
    let notifier = Arc::new(CheckInOnFirstFinal {
        inner: MemoryNotifier::new(),
        owner: Mutex::new(None),
    });
    let cipher = Arc::new(EncryptionService::new(MASTER_KEY).unwrap());
    let app = DeadSwitch::new(
        store.clone(),
        clock.clone(),
        notifier.clone(),
        cipher,
        &PolicyConfig::default(),
    );

    let user = app
        .switches
        .register_user("owner@example.com", "Olive Owner", Role::Owner)
        .unwrap();
    let owner = Actor::owner(user.id);
    let switch = app.switches.create(&owner, settings(1, 0, 2, false, 1)).unwrap();
    let mut messages = Vec::new();
    for (email, name) in [("a@example.com", "A"), ("b@example.com", "B")] {
        let recipient = app
            .switches
            .add_recipient(&owner, switch.id, email, name)
            .unwrap();
        let message = app
            .switches
            .create_message(&owner, recipient.id, "Goodbye", "Thanks for everything.")
            .unwrap();
        messages.push(message.id);
    }

    clock.advance(past(Duration::days(1)));
    app.scheduler.run_cycle();
    clock.advance(Duration::minutes(1));
    app.scheduler.run_cycle();
    clock.advance(past(Duration::hours(2)));
    assert_eq!(
        store.read(|t| t.switches[&switch.id].status).unwrap(),
        SwitchStatus::Verified
    );

    *notifier.owner.lock().unwrap() = Some((app.switches.clone(), owner, switch.id));
    let report = app.scheduler.run_cycle();

    assert_eq!(report.executed, 0);
    assert_eq!(report.messages_sent, 1);
    assert!(report.errors.is_empty());
    assert_eq!(
        store.read(|t| t.switches[&switch.id].status).unwrap(),
        SwitchStatus::Active
    );
    assert_eq!(notifier.inner.count_kind("final_message"), 1);

    // The message not yet claimed when the owner checked in stays unsent.
    let unsent = store
        .read(|t| {
            messages
                .iter()
                .filter(|id| t.delivery_for_message(**id).is_none())
                .count()
        })
        .unwrap();
    assert_eq!(unsent, 1);

    // Later sweeps release nothing while the switch is live.
    app.scheduler.run_cycle();
    assert_eq!(notifier.inner.count_kind("final_message"), 1);
}
