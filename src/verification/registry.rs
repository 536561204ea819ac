//! # Verifier Registry
//!
//! Invitation lifecycle of verifiers, independent of any open request.
//! Invite tokens are stored as SHA-256 hashes and cleared once consumed or
//! revoked.

use std::sync::Arc;

use chrono::Duration;
use serde_json::json;
use uuid::Uuid;

use super::engine::VerificationPolicy;
use super::errors::{VerificationError, VerifyResult};
use crate::audit::{AuditAction, AuditEvent, EntityRef};
use crate::clock::Clock;
use crate::crypto::{generate_token, hash_token};
use crate::notify::{Notification, Notifier};
use crate::store::{Actor, RecordStore, Verifier, VerifierStatus};
use crate::switch::{owned_switch, validate_email, SwitchError, SwitchStatus};

/// Owner and verifier operations on the verifier list of a switch.
pub struct VerifierRegistry<S: RecordStore> {
    store: Arc<S>,
    clock: Arc<dyn Clock>,
    notifier: Arc<dyn Notifier>,
    policy: VerificationPolicy,
}

impl<S: RecordStore> Clone for VerifierRegistry<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            clock: self.clock.clone(),
            notifier: self.notifier.clone(),
            policy: self.policy,
        }
    }
}

impl<S: RecordStore> VerifierRegistry<S> {
    pub fn new(
        store: Arc<S>,
        clock: Arc<dyn Clock>,
        notifier: Arc<dyn Notifier>,
        policy: VerificationPolicy,
    ) -> Self {
        Self {
            store,
            clock,
            notifier,
            policy,
        }
    }

    /// Invite a verifier and mail them the invite link.
    ///
    /// A failed send is logged; the invitation stays valid.
    pub fn add_verifier(
        &self,
        actor: &Actor,
        switch_id: Uuid,
        email: &str,
        name: Option<&str>,
    ) -> VerifyResult<Verifier> {
        validate_email(email)?;
        let now = self.clock.now();
        let invite_token = generate_token();
        let expires_at = now + Duration::days(i64::from(self.policy.invite_ttl_days));

        let (verifier, owner_name, switch_name) = self.store.transaction(|tx| {
            let switch = owned_switch(tx, actor, switch_id)?;
            if switch.status == SwitchStatus::Executed {
                return Err(SwitchError::NotEditable(switch.status).into());
            }
            let switch_name = switch.name.clone();
            let owner_name = tx
                .users
                .get(&actor.user_id)
                .map(|u| u.display_name.clone())
                .unwrap_or_default();

            if tx
                .verifiers_for(switch_id)
                .iter()
                .any(|v| v.email.eq_ignore_ascii_case(email))
            {
                return Err(VerificationError::VerifierExists);
            }

            let verifier = Verifier {
                id: Uuid::new_v4(),
                switch_id,
                email: email.trim().to_string(),
                name: name.map(|n| n.trim().to_string()).filter(|n| !n.is_empty()),
                status: VerifierStatus::Invited,
                invite_token_hash: Some(hash_token(&invite_token)),
                invite_expires_at: Some(expires_at),
                invited_at: now,
                accepted_at: None,
                revoked_at: None,
            };
            tx.insert_verifier(verifier.clone())?;
            tx.audit(
                AuditEvent::new(EntityRef::Verifier(verifier.id), AuditAction::VerifierInvited, now)
                    .with_actor(Some(actor.user_id))
                    .with_metadata(json!({ "switch_id": switch_id, "expires_at": expires_at })),
            );
            Ok((verifier, owner_name, switch_name))
        })?;

        let invitation = Notification::VerifierInvitation {
            owner_name,
            switch_name,
            invite_token,
            expires_at,
        };
        if let Err(e) = self.notifier.send(&verifier.email, &invitation) {
            tracing::warn!(verifier_id = %verifier.id, error = %e, "failed to send verifier invitation");
        }

        tracing::info!(%switch_id, verifier_id = %verifier.id, "verifier invited");
        Ok(verifier)
    }

    /// Accept an invitation by its raw token.
    pub fn accept_invitation(&self, token: &str) -> VerifyResult<Verifier> {
        let now = self.clock.now();
        let hash = hash_token(token);

        let verifier = self.store.transaction(|tx| {
            let verifier_id = tx
                .verifier_by_invite_hash(&hash)
                .filter(|v| v.status == VerifierStatus::Invited)
                .map(|v| v.id)
                .ok_or(VerificationError::InvitationNotFound)?;

            let verifier = tx
                .verifiers
                .get_mut(&verifier_id)
                .ok_or(VerificationError::InvitationNotFound)?;
            if verifier.invite_expires_at.map_or(false, |at| now > at) {
                return Err(VerificationError::InvitationExpired);
            }

            verifier.status = VerifierStatus::Accepted;
            verifier.accepted_at = Some(now);
            verifier.invite_token_hash = None;
            verifier.invite_expires_at = None;
            let accepted = verifier.clone();

            tx.audit(
                AuditEvent::new(EntityRef::Verifier(verifier_id), AuditAction::VerifierAccepted, now)
                    .with_metadata(json!({ "switch_id": accepted.switch_id })),
            );
            Ok(accepted)
        })?;

        tracing::info!(switch_id = %verifier.switch_id, verifier_id = %verifier.id, "verifier accepted invitation");
        Ok(verifier)
    }

    /// Revoke a verifier. Votes already cast stand.
    pub fn revoke_verifier(&self, actor: &Actor, verifier_id: Uuid) -> VerifyResult<Verifier> {
        let now = self.clock.now();
        self.store.transaction(|tx| {
            let switch_id = tx
                .verifiers
                .get(&verifier_id)
                .map(|v| v.switch_id)
                .ok_or(SwitchError::NotFound("verifier"))?;
            owned_switch(tx, actor, switch_id)?;

            let verifier = tx
                .verifiers
                .get_mut(&verifier_id)
                .ok_or(SwitchError::NotFound("verifier"))?;
            verifier.status = VerifierStatus::Revoked;
            verifier.revoked_at = Some(now);
            verifier.invite_token_hash = None;
            verifier.invite_expires_at = None;
            let revoked = verifier.clone();

            tx.audit(
                AuditEvent::new(EntityRef::Verifier(verifier_id), AuditAction::VerifierRevoked, now)
                    .with_actor(Some(actor.user_id))
                    .with_metadata(json!({ "switch_id": switch_id })),
            );
            Ok::<_, VerificationError>(revoked)
        })
    }

    pub fn list_verifiers(&self, actor: &Actor, switch_id: Uuid) -> VerifyResult<Vec<Verifier>> {
        self.store.read(|tables| -> VerifyResult<Vec<Verifier>> {
            owned_switch(tables, actor, switch_id)?;
            Ok(tables.verifiers_for(switch_id).into_iter().cloned().collect())
        })?
    }
}
