//! Audit events
//!
//! Each record carries: timestamp, entity reference, action, actor and
//! free-form metadata. Entity references are polymorphic and never
//! constrain deletion of what they point at.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Polymorphic reference to an audited entity.
///
/// Lookups are by kind and id; nothing here is enforced by the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "entity_type", content = "entity_id", rename_all = "snake_case")]
pub enum EntityRef {
    User(Uuid),
    Switch(Uuid),
    Verifier(Uuid),
    VerificationRequest(Uuid),
    VerificationToken(Uuid),
    Vote(Uuid),
    Recipient(Uuid),
    Message(Uuid),
    EmailDelivery(Uuid),
}

impl EntityRef {
    /// Entity kind name.
    pub fn entity_type(&self) -> &'static str {
        match self {
            EntityRef::User(_) => "user",
            EntityRef::Switch(_) => "switch",
            EntityRef::Verifier(_) => "verifier",
            EntityRef::VerificationRequest(_) => "verification_request",
            EntityRef::VerificationToken(_) => "verification_token",
            EntityRef::Vote(_) => "vote",
            EntityRef::Recipient(_) => "recipient",
            EntityRef::Message(_) => "message",
            EntityRef::EmailDelivery(_) => "email_delivery",
        }
    }

    /// Referenced id.
    pub fn id(&self) -> Uuid {
        match *self {
            EntityRef::User(id)
            | EntityRef::Switch(id)
            | EntityRef::Verifier(id)
            | EntityRef::VerificationRequest(id)
            | EntityRef::VerificationToken(id)
            | EntityRef::Vote(id)
            | EntityRef::Recipient(id)
            | EntityRef::Message(id)
            | EntityRef::EmailDelivery(id) => id,
        }
    }
}

impl fmt::Display for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.entity_type(), self.id())
    }
}

/// Audit action type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditAction {
    SwitchCreated,
    SwitchUpdated,
    SwitchDeleted,
    /// Status moved along the transition graph.
    StatusChanged,
    CheckIn,
    VerificationStarted,
    VerificationCompleted,
    VerificationExpired,
    VoteCast,
    VerifierInvited,
    VerifierAccepted,
    VerifierRevoked,
    RecipientAdded,
    RecipientRemoved,
    MessageCreated,
    MessageUpdated,
    MessageDeleted,
    MessageDelivered,
    DeliveryFailed,
    ReminderSent,
}

impl AuditAction {
    /// Returns the action name string.
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::SwitchCreated => "SWITCH_CREATED",
            AuditAction::SwitchUpdated => "SWITCH_UPDATED",
            AuditAction::SwitchDeleted => "SWITCH_DELETED",
            AuditAction::StatusChanged => "STATUS_CHANGED",
            AuditAction::CheckIn => "CHECK_IN",
            AuditAction::VerificationStarted => "VERIFICATION_STARTED",
            AuditAction::VerificationCompleted => "VERIFICATION_COMPLETED",
            AuditAction::VerificationExpired => "VERIFICATION_EXPIRED",
            AuditAction::VoteCast => "VOTE_CAST",
            AuditAction::VerifierInvited => "VERIFIER_INVITED",
            AuditAction::VerifierAccepted => "VERIFIER_ACCEPTED",
            AuditAction::VerifierRevoked => "VERIFIER_REVOKED",
            AuditAction::RecipientAdded => "RECIPIENT_ADDED",
            AuditAction::RecipientRemoved => "RECIPIENT_REMOVED",
            AuditAction::MessageCreated => "MESSAGE_CREATED",
            AuditAction::MessageUpdated => "MESSAGE_UPDATED",
            AuditAction::MessageDeleted => "MESSAGE_DELETED",
            AuditAction::MessageDelivered => "MESSAGE_DELIVERED",
            AuditAction::DeliveryFailed => "DELIVERY_FAILED",
            AuditAction::ReminderSent => "REMINDER_SENT",
        }
    }
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A single audit record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    /// Unique record ID.
    pub id: Uuid,

    /// When the action occurred.
    pub timestamp: DateTime<Utc>,

    /// What the action touched.
    pub entity: EntityRef,

    /// The action that occurred.
    pub action: AuditAction,

    /// Acting user, `None` for the scheduler and anonymous verifiers.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actor_id: Option<Uuid>,

    /// Groups events emitted by one composite operation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<Uuid>,

    /// Action-specific detail.
    #[serde(default)]
    pub metadata: serde_json::Value,
}

impl AuditEvent {
    /// Create a new audit event.
    pub fn new(entity: EntityRef, action: AuditAction, timestamp: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp,
            entity,
            action,
            actor_id: None,
            correlation_id: None,
            metadata: serde_json::Value::Null,
        }
    }

    /// Set the acting user.
    pub fn with_actor(mut self, actor_id: Option<Uuid>) -> Self {
        self.actor_id = actor_id;
        self
    }

    /// Link this event to others of the same operation.
    pub fn with_correlation(mut self, correlation_id: Uuid) -> Self {
        self.correlation_id = Some(correlation_id);
        self
    }

    /// Attach metadata.
    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }

    /// Serialize to a single JSON line.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}
