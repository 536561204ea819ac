//! # Records
//!
//! Persisted entities. Relationships are plain ids; uniqueness rules live
//! in [`super::Tables`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::switch::SwitchStatus;

/// Role of an authenticated caller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Owner,
    Admin,
}

/// Owner contact record. Credentials are handled outside this crate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub display_name: String,
    pub role: Role,
    pub created_at: DateTime<Utc>,
}

/// Authenticated caller identity, produced by the external session layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Actor {
    pub user_id: Uuid,
    pub role: Role,
}

impl Actor {
    /// An owner-level caller.
    pub fn owner(user_id: Uuid) -> Self {
        Self {
            user_id,
            role: Role::Owner,
        }
    }

    /// An administrator.
    pub fn admin(user_id: Uuid) -> Self {
        Self {
            user_id,
            role: Role::Admin,
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

/// A configured check-in obligation and its lifecycle state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Switch {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub name: String,
    pub status: SwitchStatus,

    pub check_in_interval_days: u32,
    pub grace_period_days: u32,
    pub verification_window_days: u32,
    pub final_delay_hours: u32,
    pub use_verifiers: bool,
    pub required_confirmations: u32,

    /// History, not a timer: survives every transition.
    pub last_check_in_at: Option<DateTime<Utc>>,
    pub next_check_in_due_at: Option<DateTime<Utc>>,
    pub grace_period_ends_at: Option<DateTime<Utc>>,
    pub scheduled_execution_at: Option<DateTime<Utc>>,

    /// Due date the last reminder was sent for.
    #[serde(default)]
    pub reminder_sent_for: Option<DateTime<Utc>>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Verifier lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerifierStatus {
    Invited,
    Accepted,
    Revoked,
}

/// A trusted third party who may vote on a switch's verification request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Verifier {
    pub id: Uuid,
    pub switch_id: Uuid,
    pub email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub status: VerifierStatus,

    /// SHA-256 of the invite token; cleared once consumed or revoked.
    pub invite_token_hash: Option<String>,
    pub invite_expires_at: Option<DateTime<Utc>>,

    pub invited_at: DateTime<Utc>,
    pub accepted_at: Option<DateTime<Utc>>,
    pub revoked_at: Option<DateTime<Utc>>,
}

/// Outcome of a verification request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationResult {
    Confirmed,
    Denied,
    Expired,
}

/// One round of verifier voting for a switch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationRequest {
    pub id: Uuid,
    pub switch_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    /// Snapshot of the switch setting at creation time.
    pub required_confirmations: u32,
    pub completed_at: Option<DateTime<Utc>>,
    pub result: Option<VerificationResult>,
}

impl VerificationRequest {
    pub fn is_open(&self) -> bool {
        self.completed_at.is_none()
    }

    /// Close the request with `result`.
    pub fn complete(&mut self, result: VerificationResult, at: DateTime<Utc>) {
        self.completed_at = Some(at);
        self.result = Some(result);
    }
}

/// Per-verifier voting credential for one request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationToken {
    pub id: Uuid,
    pub request_id: Uuid,
    pub verifier_id: Uuid,
    /// SHA-256 of the single-use link token.
    pub token_hash: String,
    /// Argon2id hash of the OTP.
    pub otp_hash: String,
    pub otp_expires_at: DateTime<Utc>,
    pub link_expires_at: DateTime<Utc>,
    pub used_at: Option<DateTime<Utc>>,
}

/// A verifier's decision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Vote {
    Confirm,
    Deny,
}

impl Vote {
    pub fn as_str(&self) -> &'static str {
        match self {
            Vote::Confirm => "CONFIRM",
            Vote::Deny => "DENY",
        }
    }
}

/// Request metadata captured with a vote
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RequestMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ip_address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
}

/// A cast vote. Unique per (request, verifier).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoteRecord {
    pub id: Uuid,
    pub request_id: Uuid,
    pub verifier_id: Uuid,
    pub vote: Vote,
    pub voted_at: DateTime<Utc>,
    #[serde(default)]
    pub metadata: RequestMetadata,
}

/// Someone who receives a message when the switch executes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recipient {
    pub id: Uuid,
    pub switch_id: Uuid,
    pub email: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

/// Encrypted message for exactly one recipient. Never holds plaintext.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub switch_id: Uuid,
    pub recipient_id: Uuid,
    pub subject_ciphertext: String,
    pub body_ciphertext: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Delivery ledger status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    Pending,
    Sent,
    Failed,
}

/// Idempotency ledger row for a final message. One per message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmailDelivery {
    pub id: Uuid,
    pub message_id: Uuid,
    pub status: DeliveryStatus,
    pub provider_message_id: Option<String>,
    pub retry_count: u32,
    pub claimed_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
