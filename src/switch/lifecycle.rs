//! # Switch Lifecycle Manager
//!
//! Owner-facing operations. Every call checks ownership against the
//! caller's [`Actor`] inside the same unit of work that performs the write,
//! then delegates status changes to the [`StateMachine`].

use std::sync::Arc;

use chrono::Duration;
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

use super::errors::{SwitchError, SwitchResult};
use super::machine::{CheckInOutcome, StateMachine, TransitionContext};
use super::state::SwitchStatus;
use crate::audit::{AuditAction, AuditEvent, EntityRef};
use crate::clock::Clock;
use crate::crypto::EncryptionService;
use crate::store::{Actor, Message, Recipient, RecordStore, Role, Switch, Tables, Tx, User};

// ==================
// Settings
// ==================

/// Switch configuration supplied at creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SwitchSettings {
    pub name: String,
    pub check_in_interval_days: u32,
    pub grace_period_days: u32,
    pub verification_window_days: u32,
    pub final_delay_hours: u32,
    pub use_verifiers: bool,
    pub required_confirmations: u32,
}

impl Default for SwitchSettings {
    fn default() -> Self {
        Self {
            name: "My switch".to_string(),
            check_in_interval_days: 30,
            grace_period_days: 7,
            verification_window_days: 7,
            final_delay_hours: 24,
            use_verifiers: false,
            required_confirmations: 1,
        }
    }
}

impl SwitchSettings {
    /// Check every field against its allowed range.
    pub fn validate(&self) -> SwitchResult<()> {
        if self.name.trim().is_empty() || self.name.len() > 200 {
            return Err(SwitchError::Validation(
                "name must be 1-200 characters".to_string(),
            ));
        }
        check_range("check_in_interval_days", self.check_in_interval_days, 1, 365)?;
        check_range("grace_period_days", self.grace_period_days, 0, 90)?;
        check_range("verification_window_days", self.verification_window_days, 1, 30)?;
        check_range("final_delay_hours", self.final_delay_hours, 0, 720)?;
        check_range("required_confirmations", self.required_confirmations, 1, 10)?;
        Ok(())
    }
}

fn check_range(field: &str, value: u32, min: u32, max: u32) -> SwitchResult<()> {
    if value < min || value > max {
        return Err(SwitchError::Validation(format!(
            "{} must be between {} and {}",
            field, min, max
        )));
    }
    Ok(())
}

/// Partial configuration edit. `None` leaves a field unchanged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SwitchUpdate {
    pub name: Option<String>,
    pub check_in_interval_days: Option<u32>,
    pub grace_period_days: Option<u32>,
    pub verification_window_days: Option<u32>,
    pub final_delay_hours: Option<u32>,
    pub use_verifiers: Option<bool>,
    pub required_confirmations: Option<u32>,
}

impl SwitchUpdate {
    fn apply_to(&self, settings: &mut SwitchSettings) {
        if let Some(name) = &self.name {
            settings.name = name.clone();
        }
        if let Some(v) = self.check_in_interval_days {
            settings.check_in_interval_days = v;
        }
        if let Some(v) = self.grace_period_days {
            settings.grace_period_days = v;
        }
        if let Some(v) = self.verification_window_days {
            settings.verification_window_days = v;
        }
        if let Some(v) = self.final_delay_hours {
            settings.final_delay_hours = v;
        }
        if let Some(v) = self.use_verifiers {
            settings.use_verifiers = v;
        }
        if let Some(v) = self.required_confirmations {
            settings.required_confirmations = v;
        }
    }
}

fn settings_of(switch: &Switch) -> SwitchSettings {
    SwitchSettings {
        name: switch.name.clone(),
        check_in_interval_days: switch.check_in_interval_days,
        grace_period_days: switch.grace_period_days,
        verification_window_days: switch.verification_window_days,
        final_delay_hours: switch.final_delay_hours,
        use_verifiers: switch.use_verifiers,
        required_confirmations: switch.required_confirmations,
    }
}

/// Minimal syntactic address check.
pub fn validate_email(email: &str) -> SwitchResult<()> {
    let valid = match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
                && !domain.contains('@')
                && !email.chars().any(char::is_whitespace)
        }
        None => false,
    };
    if valid && email.len() <= 254 {
        Ok(())
    } else {
        Err(SwitchError::Validation(format!("invalid email address: {}", email)))
    }
}

/// Decrypted message content, returned only to its owner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlainMessage {
    pub id: Uuid,
    pub recipient_id: Uuid,
    pub subject: String,
    pub body: String,
}

// ==================
// Ownership helpers
// ==================

/// Switch owned by `actor`, or the matching error.
pub fn owned_switch<'t>(tables: &'t Tables, actor: &Actor, switch_id: Uuid) -> SwitchResult<&'t Switch> {
    let switch = tables
        .switches
        .get(&switch_id)
        .ok_or(SwitchError::NotFound("switch"))?;
    if switch.owner_id != actor.user_id {
        return Err(SwitchError::Unauthorized);
    }
    Ok(switch)
}

/// Switch owned by `actor` that has not executed yet.
fn owned_live_switch<'t>(tables: &'t Tables, actor: &Actor, switch_id: Uuid) -> SwitchResult<&'t Switch> {
    let switch = owned_switch(tables, actor, switch_id)?;
    if switch.status == SwitchStatus::Executed {
        return Err(SwitchError::NotEditable(SwitchStatus::Executed));
    }
    Ok(switch)
}

fn require_admin(actor: &Actor) -> SwitchResult<()> {
    if actor.is_admin() {
        Ok(())
    } else {
        Err(SwitchError::Unauthorized)
    }
}

// ==================
// Manager
// ==================

/// Owner-facing switch operations.
pub struct SwitchLifecycleManager<S: RecordStore> {
    store: Arc<S>,
    clock: Arc<dyn Clock>,
    cipher: Arc<EncryptionService>,
}

impl<S: RecordStore> Clone for SwitchLifecycleManager<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            clock: self.clock.clone(),
            cipher: self.cipher.clone(),
        }
    }
}

impl<S: RecordStore> SwitchLifecycleManager<S> {
    pub fn new(store: Arc<S>, clock: Arc<dyn Clock>, cipher: Arc<EncryptionService>) -> Self {
        Self {
            store,
            clock,
            cipher,
        }
    }

    fn event(&self, actor: &Actor, entity: EntityRef, action: AuditAction) -> AuditEvent {
        AuditEvent::new(entity, action, self.clock.now()).with_actor(Some(actor.user_id))
    }

    /// Store a user record. Sessions and credentials live elsewhere.
    pub fn register_user(&self, email: &str, display_name: &str, role: Role) -> SwitchResult<User> {
        validate_email(email)?;
        let user = User {
            id: Uuid::new_v4(),
            email: email.to_string(),
            display_name: display_name.to_string(),
            role,
            created_at: self.clock.now(),
        };
        self.store.transaction(|tx| {
            tx.insert_user(user.clone())?;
            Ok::<_, SwitchError>(())
        })?;
        Ok(user)
    }

    // ==================
    // Switch CRUD
    // ==================

    /// Create an ACTIVE switch with its first deadline `interval` from now.
    pub fn create(&self, actor: &Actor, settings: SwitchSettings) -> SwitchResult<Switch> {
        settings.validate()?;
        let now = self.clock.now();
        let switch = Switch {
            id: Uuid::new_v4(),
            owner_id: actor.user_id,
            name: settings.name.trim().to_string(),
            status: SwitchStatus::Active,
            check_in_interval_days: settings.check_in_interval_days,
            grace_period_days: settings.grace_period_days,
            verification_window_days: settings.verification_window_days,
            final_delay_hours: settings.final_delay_hours,
            use_verifiers: settings.use_verifiers,
            required_confirmations: settings.required_confirmations,
            last_check_in_at: Some(now),
            next_check_in_due_at: Some(now + Duration::days(i64::from(settings.check_in_interval_days))),
            grace_period_ends_at: None,
            scheduled_execution_at: None,
            reminder_sent_for: None,
            created_at: now,
            updated_at: now,
        };

        self.store.transaction(|tx| {
            if !tx.users.contains_key(&actor.user_id) {
                return Err(SwitchError::NotFound("user"));
            }
            tx.insert_switch(switch.clone())?;
            let event = self
                .event(actor, EntityRef::Switch(switch.id), AuditAction::SwitchCreated)
                .with_metadata(json!({ "settings": settings }));
            tx.audit(event);
            Ok(())
        })?;

        tracing::info!(switch_id = %switch.id, owner_id = %actor.user_id, "switch created");
        Ok(switch)
    }

    /// Edit configuration while ACTIVE, OVERDUE, PAUSED or CANCELED.
    ///
    /// Changing the interval of an ACTIVE switch moves its deadline to
    /// `last_check_in_at + interval`.
    pub fn update(&self, actor: &Actor, switch_id: Uuid, update: SwitchUpdate) -> SwitchResult<Switch> {
        let now = self.clock.now();
        self.store.transaction(|tx| {
            let current = owned_switch(tx, actor, switch_id)?;
            if !current.status.is_editable() {
                return Err(SwitchError::NotEditable(current.status));
            }

            let mut settings = settings_of(current);
            update.apply_to(&mut settings);
            settings.validate()?;

            let switch = tx
                .switches
                .get_mut(&switch_id)
                .ok_or(SwitchError::NotFound("switch"))?;
            let interval_changed = switch.check_in_interval_days != settings.check_in_interval_days;

            switch.name = settings.name.trim().to_string();
            switch.check_in_interval_days = settings.check_in_interval_days;
            switch.grace_period_days = settings.grace_period_days;
            switch.verification_window_days = settings.verification_window_days;
            switch.final_delay_hours = settings.final_delay_hours;
            switch.use_verifiers = settings.use_verifiers;
            switch.required_confirmations = settings.required_confirmations;
            switch.updated_at = now;

            if interval_changed && switch.status == SwitchStatus::Active {
                let anchor = switch.last_check_in_at.unwrap_or(now);
                switch.next_check_in_due_at =
                    Some(anchor + Duration::days(i64::from(settings.check_in_interval_days)));
                switch.reminder_sent_for = None;
            }
            let updated = switch.clone();

            let event = self
                .event(actor, EntityRef::Switch(switch_id), AuditAction::SwitchUpdated)
                .with_metadata(json!({ "changes": update }));
            tx.audit(event);
            Ok(updated)
        })
    }

    /// Delete a switch and everything hanging off it. Refused once EXECUTED.
    pub fn delete(&self, actor: &Actor, switch_id: Uuid) -> SwitchResult<()> {
        self.store.transaction(|tx| {
            let status = owned_switch(tx, actor, switch_id)?.status;
            if status == SwitchStatus::Executed {
                return Err(SwitchError::NotEditable(status));
            }
            tx.remove_switch_cascade(switch_id);
            let event = self
                .event(actor, EntityRef::Switch(switch_id), AuditAction::SwitchDeleted)
                .with_metadata(json!({ "status": status }));
            tx.audit(event);
            Ok(())
        })?;
        tracing::info!(%switch_id, "switch deleted");
        Ok(())
    }

    /// Switch visible to the caller. Administrators see every switch.
    pub fn get(&self, actor: &Actor, switch_id: Uuid) -> SwitchResult<Switch> {
        self.store.read(|tables| {
            let switch = tables
                .switches
                .get(&switch_id)
                .ok_or(SwitchError::NotFound("switch"))?;
            if switch.owner_id != actor.user_id && !actor.is_admin() {
                return Err(SwitchError::Unauthorized);
            }
            Ok::<_, SwitchError>(switch.clone())
        })?
    }

    /// Switches owned by the caller, or all switches for administrators.
    pub fn list(&self, actor: &Actor) -> SwitchResult<Vec<Switch>> {
        Ok(self.store.read(|tables| {
            tables
                .switches
                .values()
                .filter(|s| actor.is_admin() || s.owner_id == actor.user_id)
                .cloned()
                .collect()
        })?)
    }

    // ==================
    // Status operations
    // ==================

    /// Owner proof of life.
    pub fn check_in(&self, actor: &Actor, switch_id: Uuid) -> SwitchResult<CheckInOutcome> {
        let ctx = TransitionContext::by(actor.user_id, self.clock.now(), "owner_check_in");
        self.store.transaction(|tx| {
            owned_switch(tx, actor, switch_id)?;
            StateMachine::<S>::apply_check_in(tx, switch_id, &ctx)
        })
    }

    /// Owner stops the switch.
    pub fn cancel(&self, actor: &Actor, switch_id: Uuid) -> SwitchResult<Switch> {
        self.owner_transition(actor, switch_id, SwitchStatus::Canceled, "owner_cancel")
    }

    /// Owner restarts a PAUSED or CANCELED switch with fresh timers.
    pub fn reactivate(&self, actor: &Actor, switch_id: Uuid) -> SwitchResult<Switch> {
        self.owner_transition(actor, switch_id, SwitchStatus::Active, "owner_reactivate")
    }

    /// Administrator pause.
    pub fn pause(&self, actor: &Actor, switch_id: Uuid) -> SwitchResult<Switch> {
        require_admin(actor)?;
        self.transition_in_tx(actor, switch_id, SwitchStatus::Paused, "admin_pause", |_| Ok(()))
    }

    /// Administrator resume. Only from PAUSED.
    pub fn resume(&self, actor: &Actor, switch_id: Uuid) -> SwitchResult<Switch> {
        require_admin(actor)?;
        self.transition_in_tx(actor, switch_id, SwitchStatus::Active, "admin_resume", |switch| {
            if switch.status == SwitchStatus::Paused {
                Ok(())
            } else {
                Err(SwitchError::InvalidTransition {
                    from: switch.status,
                    to: SwitchStatus::Active,
                })
            }
        })
    }

    fn owner_transition(
        &self,
        actor: &Actor,
        switch_id: Uuid,
        target: SwitchStatus,
        reason: &'static str,
    ) -> SwitchResult<Switch> {
        self.transition_in_tx(actor, switch_id, target, reason, |switch| {
            if switch.owner_id != actor.user_id {
                return Err(SwitchError::Unauthorized);
            }
            // Live states return to ACTIVE through check-in only.
            if target == SwitchStatus::Active
                && !matches!(switch.status, SwitchStatus::Paused | SwitchStatus::Canceled)
            {
                return Err(SwitchError::InvalidTransition {
                    from: switch.status,
                    to: target,
                });
            }
            Ok(())
        })
    }

    fn transition_in_tx<G>(
        &self,
        actor: &Actor,
        switch_id: Uuid,
        target: SwitchStatus,
        reason: &'static str,
        guard: G,
    ) -> SwitchResult<Switch>
    where
        G: FnOnce(&Switch) -> SwitchResult<()>,
    {
        let ctx = TransitionContext::by(actor.user_id, self.clock.now(), reason);
        self.store.transaction(|tx: &mut Tx<'_>| {
            let switch = tx
                .switches
                .get(&switch_id)
                .ok_or(SwitchError::NotFound("switch"))?;
            guard(switch)?;
            StateMachine::<S>::apply(tx, switch_id, target, &ctx)?.into_result()?;
            tx.switches
                .get(&switch_id)
                .cloned()
                .ok_or(SwitchError::NotFound("switch"))
        })
    }

    // ==================
    // Recipients
    // ==================

    pub fn add_recipient(
        &self,
        actor: &Actor,
        switch_id: Uuid,
        email: &str,
        name: &str,
    ) -> SwitchResult<Recipient> {
        validate_email(email)?;
        if name.trim().is_empty() {
            return Err(SwitchError::Validation("recipient name is required".to_string()));
        }
        let recipient = Recipient {
            id: Uuid::new_v4(),
            switch_id,
            email: email.trim().to_string(),
            name: name.trim().to_string(),
            created_at: self.clock.now(),
        };

        self.store.transaction(|tx| {
            owned_live_switch(tx, actor, switch_id)?;
            tx.insert_recipient(recipient.clone())?;
            let event = self
                .event(actor, EntityRef::Recipient(recipient.id), AuditAction::RecipientAdded)
                .with_metadata(json!({ "switch_id": switch_id }));
            tx.audit(event);
            Ok::<_, SwitchError>(())
        })?;
        Ok(recipient)
    }

    /// Remove a recipient with its message and delivery rows.
    pub fn remove_recipient(&self, actor: &Actor, recipient_id: Uuid) -> SwitchResult<()> {
        self.store.transaction(|tx| {
            let switch_id = tx
                .recipients
                .get(&recipient_id)
                .map(|r| r.switch_id)
                .ok_or(SwitchError::NotFound("recipient"))?;
            owned_live_switch(tx, actor, switch_id)?;
            tx.remove_recipient_cascade(recipient_id);
            let event = self
                .event(actor, EntityRef::Recipient(recipient_id), AuditAction::RecipientRemoved)
                .with_metadata(json!({ "switch_id": switch_id }));
            tx.audit(event);
            Ok(())
        })
    }

    pub fn list_recipients(&self, actor: &Actor, switch_id: Uuid) -> SwitchResult<Vec<Recipient>> {
        self.store.read(|tables| {
            owned_switch(tables, actor, switch_id)?;
            Ok::<_, SwitchError>(tables.recipients_for(switch_id).into_iter().cloned().collect())
        })?
    }

    // ==================
    // Messages
    // ==================

    /// Encrypt and store the message for a recipient. One per recipient.
    pub fn create_message(
        &self,
        actor: &Actor,
        recipient_id: Uuid,
        subject: &str,
        body: &str,
    ) -> SwitchResult<Message> {
        let subject_ciphertext = self.cipher.encrypt(subject)?;
        let body_ciphertext = self.cipher.encrypt(body)?;
        let now = self.clock.now();

        self.store.transaction(|tx| {
            let switch_id = tx
                .recipients
                .get(&recipient_id)
                .map(|r| r.switch_id)
                .ok_or(SwitchError::NotFound("recipient"))?;
            owned_live_switch(tx, actor, switch_id)?;
            if tx.message_for_recipient(recipient_id).is_some() {
                return Err(SwitchError::MessageExists);
            }

            let message = Message {
                id: Uuid::new_v4(),
                switch_id,
                recipient_id,
                subject_ciphertext,
                body_ciphertext,
                created_at: now,
                updated_at: now,
            };
            tx.insert_message(message.clone())?;
            let event = self
                .event(actor, EntityRef::Message(message.id), AuditAction::MessageCreated)
                .with_metadata(json!({ "recipient_id": recipient_id }));
            tx.audit(event);
            Ok(message)
        })
    }

    /// Replace a message's content with fresh ciphertext.
    pub fn update_message(
        &self,
        actor: &Actor,
        message_id: Uuid,
        subject: &str,
        body: &str,
    ) -> SwitchResult<Message> {
        let subject_ciphertext = self.cipher.encrypt(subject)?;
        let body_ciphertext = self.cipher.encrypt(body)?;
        let now = self.clock.now();

        self.store.transaction(|tx| {
            let switch_id = tx
                .messages
                .get(&message_id)
                .map(|m| m.switch_id)
                .ok_or(SwitchError::NotFound("message"))?;
            owned_live_switch(tx, actor, switch_id)?;

            let message = tx
                .messages
                .get_mut(&message_id)
                .ok_or(SwitchError::NotFound("message"))?;
            message.subject_ciphertext = subject_ciphertext;
            message.body_ciphertext = body_ciphertext;
            message.updated_at = now;
            let updated = message.clone();

            tx.audit(self.event(actor, EntityRef::Message(message_id), AuditAction::MessageUpdated));
            Ok(updated)
        })
    }

    pub fn delete_message(&self, actor: &Actor, message_id: Uuid) -> SwitchResult<()> {
        self.store.transaction(|tx| {
            let switch_id = tx
                .messages
                .get(&message_id)
                .map(|m| m.switch_id)
                .ok_or(SwitchError::NotFound("message"))?;
            owned_live_switch(tx, actor, switch_id)?;
            tx.remove_message_cascade(message_id);
            tx.audit(self.event(actor, EntityRef::Message(message_id), AuditAction::MessageDeleted));
            Ok(())
        })
    }

    /// Decrypt a message for its owner.
    pub fn read_message(&self, actor: &Actor, message_id: Uuid) -> SwitchResult<PlainMessage> {
        let message = self.store.read(|tables| {
            let message = tables
                .messages
                .get(&message_id)
                .ok_or(SwitchError::NotFound("message"))?;
            owned_switch(tables, actor, message.switch_id)?;
            Ok::<_, SwitchError>(message.clone())
        })??;

        Ok(PlainMessage {
            id: message.id,
            recipient_id: message.recipient_id,
            subject: self.cipher.decrypt(&message.subject_ciphertext)?,
            body: self.cipher.decrypt(&message.body_ciphertext)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::MemoryAuditSink;
    use crate::clock::ManualClock;
    use crate::store::MemoryStore;

    const KEY: &str = "0123456789abcdef0123456789abcdef";

    struct Fixture {
        manager: SwitchLifecycleManager<MemoryStore>,
        store: Arc<MemoryStore>,
        audit: Arc<MemoryAuditSink>,
        clock: Arc<ManualClock>,
        owner: Actor,
        admin: Actor,
    }

    fn fixture() -> Fixture {
        let audit = Arc::new(MemoryAuditSink::new());
        let store = Arc::new(MemoryStore::new(audit.clone()));
        let clock = Arc::new(ManualClock::default());
        let cipher = Arc::new(EncryptionService::new(KEY).unwrap());
        let manager = SwitchLifecycleManager::new(store.clone(), clock.clone(), cipher);

        let owner = manager
            .register_user("owner@example.com", "Owner", Role::Owner)
            .unwrap();
        let admin = manager
            .register_user("admin@example.com", "Admin", Role::Admin)
            .unwrap();

        Fixture {
            manager,
            store,
            audit,
            clock,
            owner: Actor::owner(owner.id),
            admin: Actor::admin(admin.id),
        }
    }

    fn weekly() -> SwitchSettings {
        SwitchSettings {
            name: "weekly".into(),
            check_in_interval_days: 7,
            grace_period_days: 3,
            ..SwitchSettings::default()
        }
    }

    #[test]
    fn test_create_sets_first_deadline() {
        let f = fixture();
        let switch = f.manager.create(&f.owner, weekly()).unwrap();

        assert_eq!(switch.status, SwitchStatus::Active);
        assert_eq!(switch.next_check_in_due_at, Some(f.clock.now() + Duration::days(7)));
        assert_eq!(f.audit.with_action(AuditAction::SwitchCreated).len(), 1);
    }

    #[test]
    fn test_create_validates_settings() {
        let f = fixture();
        let bad = SwitchSettings {
            check_in_interval_days: 0,
            ..weekly()
        };
        assert!(matches!(f.manager.create(&f.owner, bad), Err(SwitchError::Validation(_))));

        let bad = SwitchSettings {
            required_confirmations: 11,
            ..weekly()
        };
        assert!(matches!(f.manager.create(&f.owner, bad), Err(SwitchError::Validation(_))));
    }

    #[test]
    fn test_create_requires_known_user() {
        let f = fixture();
        let stranger = Actor::owner(Uuid::new_v4());
        assert_eq!(f.manager.create(&stranger, weekly()), Err(SwitchError::NotFound("user")));
    }

    #[test]
    fn test_other_owner_is_unauthorized() {
        let f = fixture();
        let switch = f.manager.create(&f.owner, weekly()).unwrap();
        let other = f
            .manager
            .register_user("other@example.com", "Other", Role::Owner)
            .unwrap();
        let other = Actor::owner(other.id);

        assert_eq!(f.manager.check_in(&other, switch.id), Err(SwitchError::Unauthorized));
        assert_eq!(f.manager.cancel(&other, switch.id), Err(SwitchError::Unauthorized));
        assert_eq!(f.manager.get(&other, switch.id), Err(SwitchError::Unauthorized));
        assert!(f.manager.get(&f.admin, switch.id).is_ok());
        assert!(f.manager.list(&other).unwrap().is_empty());
        assert_eq!(f.manager.list(&f.admin).unwrap().len(), 1);
    }

    #[test]
    fn test_update_recomputes_deadline_while_active() {
        let f = fixture();
        let switch = f.manager.create(&f.owner, weekly()).unwrap();
        let update = SwitchUpdate {
            check_in_interval_days: Some(14),
            ..SwitchUpdate::default()
        };
        let updated = f.manager.update(&f.owner, switch.id, update).unwrap();
        assert_eq!(
            updated.next_check_in_due_at,
            Some(switch.created_at + Duration::days(14))
        );
    }

    #[test]
    fn test_update_refused_outside_editable_states() {
        let f = fixture();
        let switch = f.manager.create(&f.owner, weekly()).unwrap();
        f.store
            .transaction(|tx| -> SwitchResult<()> {
                tx.switches.get_mut(&switch.id).unwrap().status = SwitchStatus::GracePeriod;
                Ok(())
            })
            .unwrap();

        assert_eq!(
            f.manager.update(&f.owner, switch.id, SwitchUpdate::default()),
            Err(SwitchError::NotEditable(SwitchStatus::GracePeriod))
        );
    }

    #[test]
    fn test_cancel_then_reactivate() {
        let f = fixture();
        let switch = f.manager.create(&f.owner, weekly()).unwrap();

        let canceled = f.manager.cancel(&f.owner, switch.id).unwrap();
        assert_eq!(canceled.status, SwitchStatus::Canceled);
        assert_eq!(canceled.next_check_in_due_at, None);

        assert_eq!(
            f.manager.check_in(&f.owner, switch.id),
            Err(SwitchError::InvalidCheckIn(SwitchStatus::Canceled))
        );

        f.clock.advance(Duration::days(2));
        let active = f.manager.reactivate(&f.owner, switch.id).unwrap();
        assert_eq!(active.status, SwitchStatus::Active);
        assert_eq!(active.next_check_in_due_at, Some(f.clock.now() + Duration::days(7)));
    }

    #[test]
    fn test_reactivate_refused_from_live_state() {
        let f = fixture();
        let switch = f.manager.create(&f.owner, weekly()).unwrap();
        assert_eq!(
            f.manager.reactivate(&f.owner, switch.id),
            Err(SwitchError::InvalidTransition {
                from: SwitchStatus::Active,
                to: SwitchStatus::Active
            })
        );
    }

    #[test]
    fn test_pause_and_resume_are_admin_only() {
        let f = fixture();
        let switch = f.manager.create(&f.owner, weekly()).unwrap();

        assert_eq!(f.manager.pause(&f.owner, switch.id), Err(SwitchError::Unauthorized));
        let paused = f.manager.pause(&f.admin, switch.id).unwrap();
        assert_eq!(paused.status, SwitchStatus::Paused);

        assert_eq!(f.manager.resume(&f.owner, switch.id), Err(SwitchError::Unauthorized));
        let resumed = f.manager.resume(&f.admin, switch.id).unwrap();
        assert_eq!(resumed.status, SwitchStatus::Active);

        assert!(matches!(
            f.manager.resume(&f.admin, switch.id),
            Err(SwitchError::InvalidTransition { .. })
        ));
    }

    #[test]
    fn test_delete_refused_once_executed() {
        let f = fixture();
        let switch = f.manager.create(&f.owner, weekly()).unwrap();
        f.store
            .transaction(|tx| -> SwitchResult<()> {
                tx.switches.get_mut(&switch.id).unwrap().status = SwitchStatus::Executed;
                Ok(())
            })
            .unwrap();

        assert_eq!(
            f.manager.delete(&f.owner, switch.id),
            Err(SwitchError::NotEditable(SwitchStatus::Executed))
        );
    }

    #[test]
    fn test_delete_cascades() {
        let f = fixture();
        let switch = f.manager.create(&f.owner, weekly()).unwrap();
        let recipient = f
            .manager
            .add_recipient(&f.owner, switch.id, "kin@example.com", "Kin")
            .unwrap();
        f.manager
            .create_message(&f.owner, recipient.id, "hello", "goodbye")
            .unwrap();

        f.manager.delete(&f.owner, switch.id).unwrap();
        let (switches, messages) = f
            .store
            .read(|t| (t.switches.len(), t.messages.len()))
            .unwrap();
        assert_eq!((switches, messages), (0, 0));
    }

    #[test]
    fn test_messages_are_stored_encrypted() {
        let f = fixture();
        let switch = f.manager.create(&f.owner, weekly()).unwrap();
        let recipient = f
            .manager
            .add_recipient(&f.owner, switch.id, "kin@example.com", "Kin")
            .unwrap();
        let message = f
            .manager
            .create_message(&f.owner, recipient.id, "Passwords", "The vault code is 1234")
            .unwrap();

        assert!(!message.body_ciphertext.contains("1234"));
        let plain = f.manager.read_message(&f.owner, message.id).unwrap();
        assert_eq!(plain.subject, "Passwords");
        assert_eq!(plain.body, "The vault code is 1234");

        assert_eq!(
            f.manager.create_message(&f.owner, recipient.id, "again", "again"),
            Err(SwitchError::MessageExists)
        );

        f.manager
            .update_message(&f.owner, message.id, "Passwords", "Changed")
            .unwrap();
        assert_eq!(f.manager.read_message(&f.owner, message.id).unwrap().body, "Changed");

        f.manager.delete_message(&f.owner, message.id).unwrap();
        assert_eq!(
            f.manager.read_message(&f.owner, message.id),
            Err(SwitchError::NotFound("message"))
        );
    }

    #[test]
    fn test_recipient_validation() {
        let f = fixture();
        let switch = f.manager.create(&f.owner, weekly()).unwrap();
        assert!(matches!(
            f.manager.add_recipient(&f.owner, switch.id, "not-an-email", "X"),
            Err(SwitchError::Validation(_))
        ));
        assert!(matches!(
            f.manager.add_recipient(&f.owner, switch.id, "x@example.com", "  "),
            Err(SwitchError::Validation(_))
        ));
    }

    #[test]
    fn test_validate_email() {
        assert!(validate_email("a@b.co").is_ok());
        assert!(validate_email("a@b").is_err());
        assert!(validate_email("@b.co").is_err());
        assert!(validate_email("a b@c.co").is_err());
        assert!(validate_email("a@b@c.co").is_err());
    }
}
