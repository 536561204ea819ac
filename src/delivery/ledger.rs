//! # Message Delivery
//!
//! At-most-once release of final messages. The `EmailDelivery` row of a
//! message is the concurrency boundary:
//!
//! 1. claim the row in one unit of work (skip unless the switch is due for
//!    release, if sent, or if another run claimed it less than the claim
//!    TTL ago)
//! 2. decrypt and send outside the unit of work
//! 3. record `sent` or `failed` on the row
//!
//! A crash between 2 and 3 leaves a pending row that is reclaimed only
//! after the claim TTL.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use serde_json::json;
use uuid::Uuid;

use super::errors::{DeliveryError, DeliveryResult};
use crate::audit::{AuditAction, AuditEvent, EntityRef};
use crate::clock::Clock;
use crate::crypto::EncryptionService;
use crate::notify::{Notification, Notifier};
use crate::store::{DeliveryStatus, EmailDelivery, RecordStore, Switch};
use crate::switch::SwitchStatus;

/// Result of one delivery attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum DeliveryOutcome {
    /// Sent by this call.
    Sent { provider_message_id: String },
    /// The ledger already records a send.
    AlreadySent,
    /// Another run holds a fresh claim.
    InFlight,
    /// The switch is no longer due for release (e.g. the owner checked in).
    NotExecutable,
    /// Decryption or transport failed; recorded on the ledger.
    Failed { error: String },
}

/// Per-switch delivery tally.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DeliveryReport {
    pub sent: u32,
    pub already_sent: u32,
    pub in_flight: u32,
    pub not_executable: u32,
    pub failed: u32,
    /// `(message_id, error)` of every failed message.
    pub failures: Vec<(Uuid, String)>,
}

impl DeliveryReport {
    fn record(&mut self, message_id: Uuid, outcome: &DeliveryOutcome) {
        match outcome {
            DeliveryOutcome::Sent { .. } => self.sent += 1,
            DeliveryOutcome::AlreadySent => self.already_sent += 1,
            DeliveryOutcome::InFlight => self.in_flight += 1,
            DeliveryOutcome::NotExecutable => self.not_executable += 1,
            DeliveryOutcome::Failed { error } => {
                self.failed += 1;
                self.failures.push((message_id, error.clone()));
            }
        }
    }

    pub fn is_complete(&self) -> bool {
        self.failed == 0 && self.in_flight == 0 && self.not_executable == 0
    }
}

/// Everything needed to send, captured at claim time.
struct Claim {
    delivery_id: Uuid,
    claimed_at: DateTime<Utc>,
    to: String,
    recipient_name: String,
    owner_name: String,
    subject_ciphertext: String,
    body_ciphertext: String,
}

enum ClaimResult {
    Claimed(Claim),
    Skip(DeliveryOutcome),
}

/// Thin decrypt-and-send wrapper over the delivery ledger.
pub struct MessageDelivery<S: RecordStore> {
    store: Arc<S>,
    clock: Arc<dyn Clock>,
    cipher: Arc<EncryptionService>,
    notifier: Arc<dyn Notifier>,
    claim_ttl: Duration,
}

impl<S: RecordStore> Clone for MessageDelivery<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            clock: self.clock.clone(),
            cipher: self.cipher.clone(),
            notifier: self.notifier.clone(),
            claim_ttl: self.claim_ttl,
        }
    }
}

impl<S: RecordStore> MessageDelivery<S> {
    pub fn new(
        store: Arc<S>,
        clock: Arc<dyn Clock>,
        cipher: Arc<EncryptionService>,
        notifier: Arc<dyn Notifier>,
        claim_ttl: Duration,
    ) -> Self {
        Self {
            store,
            clock,
            cipher,
            notifier,
            claim_ttl,
        }
    }

    /// Deliver one message at most once.
    pub fn deliver(&self, message_id: Uuid) -> DeliveryResult<DeliveryOutcome> {
        let claim = match self.claim(message_id)? {
            ClaimResult::Claimed(claim) => claim,
            ClaimResult::Skip(outcome) => {
                tracing::debug!(%message_id, ?outcome, "delivery skipped");
                return Ok(outcome);
            }
        };

        let opened = self
            .cipher
            .decrypt(&claim.subject_ciphertext)
            .and_then(|subject| Ok((subject, self.cipher.decrypt(&claim.body_ciphertext)?)));
        let (subject, body) = match opened {
            Ok(plain) => plain,
            Err(e) => return self.record_failure(message_id, &claim, e.to_string()),
        };

        let notification = Notification::FinalMessage {
            owner_name: claim.owner_name.clone(),
            recipient_name: claim.recipient_name.clone(),
            subject,
            body,
        };

        match self.notifier.send(&claim.to, &notification) {
            Ok(provider_message_id) => self.record_sent(message_id, &claim, provider_message_id),
            Err(e) => self.record_failure(message_id, &claim, e.to_string()),
        }
    }

    /// Deliver every message of a switch. Failures are tallied, not raised.
    pub fn deliver_switch(&self, switch_id: Uuid) -> DeliveryResult<DeliveryReport> {
        let message_ids = self.store.read(|tables| {
            tables
                .messages_for_switch(switch_id)
                .into_iter()
                .map(|m| m.id)
                .collect::<Vec<_>>()
        })?;

        let mut report = DeliveryReport::default();
        for message_id in message_ids {
            let outcome = self.deliver(message_id)?;
            report.record(message_id, &outcome);
        }
        Ok(report)
    }

    /// Re-attempt unsent messages of a switch whose ledger row is below
    /// `max_attempts`. Stale pending claims are picked up too; fresh ones
    /// are skipped by the claim.
    pub fn retry_failed(&self, switch_id: Uuid, max_attempts: u32) -> DeliveryResult<DeliveryReport> {
        let message_ids = self.store.read(|tables| {
            tables
                .messages_for_switch(switch_id)
                .into_iter()
                .filter(|m| {
                    tables.delivery_for_message(m.id).map_or(true, |d| {
                        d.status != DeliveryStatus::Sent && d.retry_count < max_attempts
                    })
                })
                .map(|m| m.id)
                .collect::<Vec<_>>()
        })?;

        let mut report = DeliveryReport::default();
        for message_id in message_ids {
            let outcome = self.deliver(message_id)?;
            report.record(message_id, &outcome);
        }
        Ok(report)
    }

    fn claim(&self, message_id: Uuid) -> DeliveryResult<ClaimResult> {
        let now = self.clock.now();
        let claim_ttl = self.claim_ttl;

        self.store.transaction(|tx| {
            let message = tx
                .messages
                .get(&message_id)
                .cloned()
                .ok_or(DeliveryError::NotFound("message"))?;

            let releasable = tx
                .switches
                .get(&message.switch_id)
                .map_or(false, |s| is_releasable(s, now));
            if !releasable {
                return Ok(ClaimResult::Skip(DeliveryOutcome::NotExecutable));
            }

            if let Some(existing) = tx.delivery_for_message(message_id) {
                match existing.status {
                    DeliveryStatus::Sent => return Ok(ClaimResult::Skip(DeliveryOutcome::AlreadySent)),
                    DeliveryStatus::Pending
                        if existing.claimed_at.map_or(false, |at| now - at < claim_ttl) =>
                    {
                        return Ok(ClaimResult::Skip(DeliveryOutcome::InFlight));
                    }
                    _ => {}
                }
            }

            let recipient = tx
                .recipients
                .get(&message.recipient_id)
                .cloned()
                .ok_or(DeliveryError::NotFound("recipient"))?;
            let owner_name = tx
                .switches
                .get(&message.switch_id)
                .and_then(|s| tx.users.get(&s.owner_id))
                .map(|u| u.display_name.clone())
                .unwrap_or_default();

            let existing_id = tx.delivery_for_message(message_id).map(|d| d.id);
            let delivery_id = match existing_id {
                Some(id) => {
                    if let Some(row) = tx.deliveries.get_mut(&id) {
                        row.status = DeliveryStatus::Pending;
                        row.retry_count += 1;
                        row.claimed_at = Some(now);
                        row.updated_at = now;
                    }
                    id
                }
                None => {
                    let row = EmailDelivery {
                        id: Uuid::new_v4(),
                        message_id,
                        status: DeliveryStatus::Pending,
                        provider_message_id: None,
                        retry_count: 1,
                        claimed_at: Some(now),
                        last_error: None,
                        created_at: now,
                        updated_at: now,
                    };
                    let id = row.id;
                    tx.insert_delivery(row)?;
                    id
                }
            };

            Ok::<_, DeliveryError>(ClaimResult::Claimed(Claim {
                delivery_id,
                claimed_at: now,
                to: recipient.email,
                recipient_name: recipient.name,
                owner_name,
                subject_ciphertext: message.subject_ciphertext,
                body_ciphertext: message.body_ciphertext,
            }))
        })
    }

    fn record_sent(
        &self,
        message_id: Uuid,
        claim: &Claim,
        provider_message_id: String,
    ) -> DeliveryResult<DeliveryOutcome> {
        let now = self.clock.now();
        self.store.transaction(|tx| {
            if let Some(row) = tx.deliveries.get_mut(&claim.delivery_id) {
                row.status = DeliveryStatus::Sent;
                row.provider_message_id = Some(provider_message_id.clone());
                row.claimed_at = None;
                row.last_error = None;
                row.updated_at = now;
            }
            tx.audit(
                AuditEvent::new(
                    EntityRef::EmailDelivery(claim.delivery_id),
                    AuditAction::MessageDelivered,
                    now,
                )
                .with_metadata(json!({
                    "message_id": message_id,
                    "provider_message_id": provider_message_id,
                })),
            );
            Ok::<_, DeliveryError>(())
        })?;

        tracing::info!(%message_id, %provider_message_id, "final message delivered");
        Ok(DeliveryOutcome::Sent {
            provider_message_id,
        })
    }

    fn record_failure(
        &self,
        message_id: Uuid,
        claim: &Claim,
        error: String,
    ) -> DeliveryResult<DeliveryOutcome> {
        let now = self.clock.now();
        self.store.transaction(|tx| {
            let mut retry_count = 0;
            if let Some(row) = tx.deliveries.get_mut(&claim.delivery_id) {
                // A newer claim owns the row now.
                if row.status == DeliveryStatus::Pending && row.claimed_at == Some(claim.claimed_at) {
                    row.status = DeliveryStatus::Failed;
                    row.claimed_at = None;
                    row.last_error = Some(error.clone());
                    row.updated_at = now;
                }
                retry_count = row.retry_count;
            }
            tx.audit(
                AuditEvent::new(
                    EntityRef::EmailDelivery(claim.delivery_id),
                    AuditAction::DeliveryFailed,
                    now,
                )
                .with_metadata(json!({
                    "message_id": message_id,
                    "error": error,
                    "retry_count": retry_count,
                })),
            );
            Ok::<_, DeliveryError>(())
        })?;

        tracing::error!(%message_id, %error, "final message delivery failed");
        Ok(DeliveryOutcome::Failed { error })
    }
}

/// Messages go out only for EXECUTED switches or VERIFIED ones past their
/// execution time.
fn is_releasable(switch: &Switch, now: DateTime<Utc>) -> bool {
    match switch.status {
        SwitchStatus::Executed => true,
        SwitchStatus::Verified => switch.scheduled_execution_at.map_or(false, |at| at < now),
        _ => false,
    }
}
