//! State Machine Transition Tests
//!
//! The transition graph is explicit and closed:
//! - every listed edge applies with its timer effects
//! - every other pair is rejected as a value, without writes
//! - EXECUTED is terminal

mod harness;

use chrono::Duration;
use uuid::Uuid;

use deadswitch::audit::{AuditAction, EntityRef};
use deadswitch::store::{RecordStore, StoreError};
use deadswitch::switch::{SwitchStatus, TransitionOutcome, TransitionRejection};
use harness::{settings, World};

use SwitchStatus::*;

fn expected_targets(from: SwitchStatus) -> Vec<SwitchStatus> {
    match from {
        Active => vec![Overdue, Canceled, Paused],
        Overdue => vec![GracePeriod, Active, Canceled, Paused],
        GracePeriod => vec![PendingVerification, Verified, Active, Canceled, Paused],
        PendingVerification => vec![Verified, Active, Canceled, Paused],
        Verified => vec![Executed, Active, Canceled, Paused],
        Executed => vec![],
        Canceled => vec![Active],
        Paused => vec![Active, Canceled],
    }
}

/// Put a switch straight into `status` through the store.
fn force_status(world: &World, switch_id: Uuid, status: SwitchStatus) {
    world
        .store
        .transaction(|tx| {
            if let Some(switch) = tx.switches.get_mut(&switch_id) {
                switch.status = status;
            }
            Ok::<_, StoreError>(())
        })
        .unwrap();
}

#[test]
fn test_graph_is_exactly_the_listed_edges() {
    let world = World::new();

    for from in SwitchStatus::ALL {
        for to in SwitchStatus::ALL {
            let switch = world.create_switch(settings(7, 3, 24, false, 1));
            force_status(&world, switch.id, from);

            let outcome = world
                .app
                .machine
                .transition(switch.id, to, None, "graph_test")
                .unwrap();

            if expected_targets(from).contains(&to) {
                assert_eq!(outcome, TransitionOutcome::Applied { from, to }, "{} -> {}", from, to);
                assert_eq!(world.status(switch.id), to);
            } else {
                assert_eq!(
                    outcome,
                    TransitionOutcome::Rejected {
                        reason: TransitionRejection::InvalidTransition { from, to }
                    },
                    "{} -> {}",
                    from,
                    to
                );
                assert_eq!(world.status(switch.id), from);
            }
        }
    }
}

#[test]
fn test_rejection_writes_nothing() {
    let world = World::new();
    let switch = world.create_switch(settings(7, 3, 24, false, 1));
    let before = world.switch(switch.id);
    let events = world.audit.len();

    let outcome = world
        .app
        .machine
        .transition(switch.id, Executed, None, "skip_ahead")
        .unwrap();
    assert!(!outcome.is_applied());
    assert_eq!(world.switch(switch.id), before);
    assert_eq!(world.audit.len(), events);
}

#[test]
fn test_missing_switch_is_rejected() {
    let world = World::new();
    let outcome = world
        .app
        .machine
        .transition(Uuid::new_v4(), Overdue, None, "ghost")
        .unwrap();
    assert_eq!(
        outcome,
        TransitionOutcome::Rejected {
            reason: TransitionRejection::NotFound
        }
    );
}

#[test]
fn test_timer_fields_follow_status() {
    let world = World::new();
    let switch = world.create_switch(settings(7, 3, 24, false, 1));
    let machine = &world.app.machine;

    machine.transition(switch.id, Overdue, None, "t").unwrap();
    let overdue = world.switch(switch.id);
    assert_eq!(overdue.next_check_in_due_at, switch.next_check_in_due_at);

    world.advance(Duration::hours(2));
    machine.transition(switch.id, GracePeriod, None, "t").unwrap();
    let grace = world.switch(switch.id);
    assert_eq!(
        grace.grace_period_ends_at,
        Some(world.clock_now() + Duration::days(3))
    );

    machine.transition(switch.id, Verified, None, "t").unwrap();
    let verified = world.switch(switch.id);
    assert_eq!(verified.grace_period_ends_at, None);
    assert_eq!(
        verified.scheduled_execution_at,
        Some(world.clock_now() + Duration::hours(24))
    );

    machine.transition(switch.id, Executed, None, "t").unwrap();
    let executed = world.switch(switch.id);
    assert_eq!(executed.next_check_in_due_at, None);
    assert_eq!(executed.grace_period_ends_at, None);
    assert_eq!(executed.scheduled_execution_at, None);
    // History survives.
    assert_eq!(executed.last_check_in_at, switch.last_check_in_at);
}

#[test]
fn test_every_applied_transition_is_audited() {
    let world = World::new();
    let switch = world.create_switch(settings(7, 3, 24, false, 1));
    let actor = world.owner.user_id;

    world
        .app
        .machine
        .transition(switch.id, Paused, Some(actor), "owner_pause")
        .unwrap();

    let events: Vec<_> = world
        .audit
        .for_entity(EntityRef::Switch(switch.id))
        .into_iter()
        .filter(|e| e.action == AuditAction::StatusChanged)
        .collect();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].actor_id, Some(actor));
    assert_eq!(events[0].metadata["from"], "ACTIVE");
    assert_eq!(events[0].metadata["to"], "PAUSED");
    assert_eq!(events[0].metadata["reason"], "owner_pause");
}

#[test]
fn test_check_in_only_from_live_states() {
    let world = World::new();

    for from in SwitchStatus::ALL {
        let switch = world.create_switch(settings(7, 3, 24, false, 1));
        force_status(&world, switch.id, from);
        let result = world.app.machine.check_in(switch.id, world.owner.user_id);

        if SwitchStatus::CHECK_IN_STATES.contains(&from) {
            let outcome = result.unwrap();
            assert_eq!(outcome.previous, from);
            assert_eq!(world.status(switch.id), Active);
        } else {
            assert!(result.is_err(), "check-in accepted from {}", from);
            assert_eq!(world.status(switch.id), from);
        }
    }
}
