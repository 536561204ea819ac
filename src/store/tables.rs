//! # Tables
//!
//! The full record set, with the uniqueness rules every writer must go
//! through:
//!
//! - verifier: unique per (switch, email), case-insensitive
//! - verification request: at most one open per switch
//! - verification token: unique per (request, verifier)
//! - vote: unique per (request, verifier)
//! - message: at most one per recipient
//! - email delivery: at most one ledger row per message

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::errors::{StoreError, StoreResult};
use super::model::{
    EmailDelivery, Message, Recipient, Switch, User, VerificationRequest, VerificationToken,
    Verifier, VerifierStatus, Vote, VoteRecord,
};

/// Every persisted record, keyed by id.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Tables {
    pub users: BTreeMap<Uuid, User>,
    pub switches: BTreeMap<Uuid, Switch>,
    pub verifiers: BTreeMap<Uuid, Verifier>,
    pub requests: BTreeMap<Uuid, VerificationRequest>,
    pub tokens: BTreeMap<Uuid, VerificationToken>,
    pub votes: BTreeMap<Uuid, VoteRecord>,
    pub recipients: BTreeMap<Uuid, Recipient>,
    pub messages: BTreeMap<Uuid, Message>,
    pub deliveries: BTreeMap<Uuid, EmailDelivery>,
}

impl Tables {
    // =========================================================================
    // INSERTS (constraint-checked)
    // =========================================================================

    pub fn insert_user(&mut self, user: User) -> StoreResult<()> {
        if self
            .users
            .values()
            .any(|u| u.email.eq_ignore_ascii_case(&user.email))
        {
            return Err(StoreError::UniqueViolation("user email"));
        }
        self.users.insert(user.id, user);
        Ok(())
    }

    pub fn insert_switch(&mut self, switch: Switch) -> StoreResult<()> {
        if !self.users.contains_key(&switch.owner_id) {
            return Err(StoreError::DanglingReference("switch owner"));
        }
        self.switches.insert(switch.id, switch);
        Ok(())
    }

    pub fn insert_verifier(&mut self, verifier: Verifier) -> StoreResult<()> {
        if self.verifiers.values().any(|v| {
            v.switch_id == verifier.switch_id && v.email.eq_ignore_ascii_case(&verifier.email)
        }) {
            return Err(StoreError::UniqueViolation("verifier (switch, email)"));
        }
        self.verifiers.insert(verifier.id, verifier);
        Ok(())
    }

    pub fn insert_request(&mut self, request: VerificationRequest) -> StoreResult<()> {
        if request.is_open() && self.open_request_for(request.switch_id).is_some() {
            return Err(StoreError::UniqueViolation("open verification request per switch"));
        }
        self.requests.insert(request.id, request);
        Ok(())
    }

    pub fn insert_token(&mut self, token: VerificationToken) -> StoreResult<()> {
        if self
            .tokens
            .values()
            .any(|t| t.request_id == token.request_id && t.verifier_id == token.verifier_id)
        {
            return Err(StoreError::UniqueViolation("verification token (request, verifier)"));
        }
        self.tokens.insert(token.id, token);
        Ok(())
    }

    pub fn insert_vote(&mut self, vote: VoteRecord) -> StoreResult<()> {
        if self.has_voted(vote.request_id, vote.verifier_id) {
            return Err(StoreError::UniqueViolation("vote (request, verifier)"));
        }
        self.votes.insert(vote.id, vote);
        Ok(())
    }

    pub fn insert_recipient(&mut self, recipient: Recipient) -> StoreResult<()> {
        if !self.switches.contains_key(&recipient.switch_id) {
            return Err(StoreError::DanglingReference("recipient switch"));
        }
        self.recipients.insert(recipient.id, recipient);
        Ok(())
    }

    pub fn insert_message(&mut self, message: Message) -> StoreResult<()> {
        if !self.recipients.contains_key(&message.recipient_id) {
            return Err(StoreError::DanglingReference("message recipient"));
        }
        if self.message_for_recipient(message.recipient_id).is_some() {
            return Err(StoreError::UniqueViolation("message per recipient"));
        }
        self.messages.insert(message.id, message);
        Ok(())
    }

    pub fn insert_delivery(&mut self, delivery: EmailDelivery) -> StoreResult<()> {
        if self.delivery_for_message(delivery.message_id).is_some() {
            return Err(StoreError::UniqueViolation("email delivery per message"));
        }
        self.deliveries.insert(delivery.id, delivery);
        Ok(())
    }

    // =========================================================================
    // QUERIES
    // =========================================================================

    pub fn open_request_for(&self, switch_id: Uuid) -> Option<&VerificationRequest> {
        self.requests
            .values()
            .find(|r| r.switch_id == switch_id && r.is_open())
    }

    pub fn open_request_id_for(&self, switch_id: Uuid) -> Option<Uuid> {
        self.open_request_for(switch_id).map(|r| r.id)
    }

    /// Accepted verifiers of a switch.
    pub fn accepted_verifiers(&self, switch_id: Uuid) -> Vec<&Verifier> {
        self.verifiers
            .values()
            .filter(|v| v.switch_id == switch_id && v.status == VerifierStatus::Accepted)
            .collect()
    }

    pub fn verifiers_for(&self, switch_id: Uuid) -> Vec<&Verifier> {
        self.verifiers
            .values()
            .filter(|v| v.switch_id == switch_id)
            .collect()
    }

    pub fn verifier_by_invite_hash(&self, hash: &str) -> Option<&Verifier> {
        self.verifiers
            .values()
            .find(|v| v.invite_token_hash.as_deref() == Some(hash))
    }

    pub fn token_by_hash(&self, hash: &str) -> Option<&VerificationToken> {
        self.tokens.values().find(|t| t.token_hash == hash)
    }

    pub fn has_voted(&self, request_id: Uuid, verifier_id: Uuid) -> bool {
        self.votes
            .values()
            .any(|v| v.request_id == request_id && v.verifier_id == verifier_id)
    }

    /// Number of `vote` records cast on a request.
    pub fn count_votes(&self, request_id: Uuid, vote: Vote) -> u32 {
        self.votes
            .values()
            .filter(|v| v.request_id == request_id && v.vote == vote)
            .count() as u32
    }

    pub fn recipients_for(&self, switch_id: Uuid) -> Vec<&Recipient> {
        self.recipients
            .values()
            .filter(|r| r.switch_id == switch_id)
            .collect()
    }

    pub fn messages_for_switch(&self, switch_id: Uuid) -> Vec<&Message> {
        self.messages
            .values()
            .filter(|m| m.switch_id == switch_id)
            .collect()
    }

    pub fn message_for_recipient(&self, recipient_id: Uuid) -> Option<&Message> {
        self.messages
            .values()
            .find(|m| m.recipient_id == recipient_id)
    }

    pub fn delivery_for_message(&self, message_id: Uuid) -> Option<&EmailDelivery> {
        self.deliveries
            .values()
            .find(|d| d.message_id == message_id)
    }

    // =========================================================================
    // CASCADING DELETES
    // =========================================================================

    /// Remove a recipient together with its message and delivery rows.
    pub fn remove_recipient_cascade(&mut self, recipient_id: Uuid) -> Option<Recipient> {
        let recipient = self.recipients.remove(&recipient_id)?;
        let message_ids: Vec<Uuid> = self
            .messages
            .values()
            .filter(|m| m.recipient_id == recipient_id)
            .map(|m| m.id)
            .collect();
        for message_id in message_ids {
            self.remove_message_cascade(message_id);
        }
        Some(recipient)
    }

    /// Remove a message and its delivery row.
    pub fn remove_message_cascade(&mut self, message_id: Uuid) -> Option<Message> {
        let message = self.messages.remove(&message_id)?;
        self.deliveries.retain(|_, d| d.message_id != message_id);
        Some(message)
    }

    /// Remove a switch and every row that hangs off it.
    pub fn remove_switch_cascade(&mut self, switch_id: Uuid) -> Option<Switch> {
        let switch = self.switches.remove(&switch_id)?;

        let request_ids: Vec<Uuid> = self
            .requests
            .values()
            .filter(|r| r.switch_id == switch_id)
            .map(|r| r.id)
            .collect();
        self.tokens.retain(|_, t| !request_ids.contains(&t.request_id));
        self.votes.retain(|_, v| !request_ids.contains(&v.request_id));
        self.requests.retain(|_, r| r.switch_id != switch_id);
        self.verifiers.retain(|_, v| v.switch_id != switch_id);

        let recipient_ids: Vec<Uuid> = self
            .recipients
            .values()
            .filter(|r| r.switch_id == switch_id)
            .map(|r| r.id)
            .collect();
        for recipient_id in recipient_ids {
            self.remove_recipient_cascade(recipient_id);
        }

        Some(switch)
    }
}
