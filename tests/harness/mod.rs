//! Shared fixture for the integration suites.
//!
//! Everything runs in memory against a manually advanced clock.

#![allow(dead_code)]

use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};
use uuid::Uuid;

use deadswitch::audit::MemoryAuditSink;
use deadswitch::clock::{Clock, ManualClock};
use deadswitch::config::PolicyConfig;
use deadswitch::crypto::EncryptionService;
use deadswitch::notify::{MemoryNotifier, Notification};
use deadswitch::scheduler::CycleReport;
use deadswitch::store::{Actor, MemoryStore, RecordStore, Role, Switch, VerificationRequest, Verifier};
use deadswitch::switch::{SwitchSettings, SwitchStatus};
use deadswitch::DeadSwitch;

pub const MASTER_KEY: &str = "integration-master-key-0123456789abcdef";

pub struct World {
    pub app: DeadSwitch<MemoryStore>,
    pub store: Arc<MemoryStore>,
    pub audit: Arc<MemoryAuditSink>,
    pub clock: Arc<ManualClock>,
    pub notifier: Arc<MemoryNotifier>,
    pub owner: Actor,
}

impl World {
    pub fn new() -> Self {
        Self::with_policy(PolicyConfig::default())
    }

    pub fn with_policy(policy: PolicyConfig) -> Self {
        let audit = Arc::new(MemoryAuditSink::new());
        let store = Arc::new(MemoryStore::new(audit.clone()));
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2025, 1, 1, 9, 0, 0).unwrap(),
        ));
        let notifier = Arc::new(MemoryNotifier::new());
        let cipher = Arc::new(EncryptionService::new(MASTER_KEY).unwrap());
        let app = DeadSwitch::new(store.clone(), clock.clone(), notifier.clone(), cipher, &policy);

        let user = app
            .switches
            .register_user("owner@example.com", "Olive Owner", Role::Owner)
            .unwrap();
        Self {
            app,
            store,
            audit,
            clock,
            notifier,
            owner: Actor::owner(user.id),
        }
    }

    pub fn create_switch(&self, settings: SwitchSettings) -> Switch {
        self.app.switches.create(&self.owner, settings).unwrap()
    }

    pub fn switch(&self, id: Uuid) -> Switch {
        self.store.read(|t| t.switches[&id].clone()).unwrap()
    }

    pub fn status(&self, id: Uuid) -> SwitchStatus {
        self.switch(id).status
    }

    pub fn clock_now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub fn advance(&self, by: Duration) {
        self.clock.advance(by);
    }

    pub fn sweep(&self) -> CycleReport {
        self.app.scheduler.run_cycle()
    }

    pub fn requests_for(&self, switch_id: Uuid) -> Vec<VerificationRequest> {
        self.store
            .read(|t| {
                t.requests
                    .values()
                    .filter(|r| r.switch_id == switch_id)
                    .cloned()
                    .collect()
            })
            .unwrap()
    }

    pub fn open_request(&self, switch_id: Uuid) -> Option<VerificationRequest> {
        self.store
            .read(|t| t.open_request_for(switch_id).cloned())
            .unwrap()
    }

    /// Invite and accept a verifier through the public operations.
    pub fn accepted_verifier(&self, switch_id: Uuid, email: &str) -> Verifier {
        self.app
            .verifiers
            .add_verifier(&self.owner, switch_id, email, None)
            .unwrap();
        let token = self
            .notifier
            .sent_to(email)
            .iter()
            .rev()
            .find_map(|s| match &s.notification {
                Notification::VerifierInvitation { invite_token, .. } => Some(invite_token.clone()),
                _ => None,
            })
            .unwrap();
        self.app.verifiers.accept_invitation(&token).unwrap()
    }

    /// Latest `(token, otp)` mailed to a verifier.
    pub fn credentials(&self, email: &str) -> (String, String) {
        self.notifier
            .sent_to(email)
            .iter()
            .rev()
            .find_map(|s| match &s.notification {
                Notification::VerificationRequest { token, otp, .. } => {
                    Some((token.clone(), otp.clone()))
                }
                _ => None,
            })
            .unwrap()
    }
}

pub fn settings(
    interval_days: u32,
    grace_days: u32,
    delay_hours: u32,
    use_verifiers: bool,
    required: u32,
) -> SwitchSettings {
    SwitchSettings {
        name: "Family vault".to_string(),
        check_in_interval_days: interval_days,
        grace_period_days: grace_days,
        verification_window_days: 5,
        final_delay_hours: delay_hours,
        use_verifiers,
        required_confirmations: required,
    }
}

/// Just past a boundary.
pub fn past(d: Duration) -> Duration {
    d + Duration::minutes(1)
}
