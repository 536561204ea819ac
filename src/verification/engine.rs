//! # Verification Quorum Engine
//!
//! Opens a verification request for a switch, mints one OTP-gated,
//! single-use voting token per accepted verifier, and resolves the request
//! from the votes cast:
//!
//! - a single DENY completes the request as denied and stops the switch
//!   according to the [`DenyPolicy`]
//! - CONFIRM votes are recounted inside the same unit of work as the vote
//!   insert; reaching `required_confirmations` completes the request as
//!   confirmed and moves the switch to VERIFIED
//!
//! Vote validation runs in a fixed order: token exists, link not expired,
//! token unused, OTP matches and is not expired, request still open,
//! verifier has not voted.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

use super::errors::{VerificationError, VerifyResult};
use crate::audit::{AuditAction, AuditEvent, EntityRef};
use crate::clock::Clock;
use crate::crypto::{generate_otp, generate_token, hash_otp, hash_token, verify_otp};
use crate::notify::{Notification, Notifier};
use crate::store::{
    RecordStore, RequestMetadata, Tx, VerificationRequest, VerificationResult,
    VerificationToken, VerifierStatus, Vote, VoteRecord,
};
use crate::switch::{StateMachine, SwitchError, SwitchStatus, TransitionContext};

/// What a DENY vote does to the switch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DenyPolicy {
    /// Stop at PAUSED until the owner reactivates.
    #[default]
    Pause,
    /// Return to ACTIVE with fresh timers.
    ResetToActive,
}

impl DenyPolicy {
    pub fn target(self) -> SwitchStatus {
        match self {
            DenyPolicy::Pause => SwitchStatus::Paused,
            DenyPolicy::ResetToActive => SwitchStatus::Active,
        }
    }
}

/// Timing and deny behaviour shared by the engine and the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationPolicy {
    pub otp_ttl_hours: u32,
    pub invite_ttl_days: u32,
    pub deny_policy: DenyPolicy,
}

impl Default for VerificationPolicy {
    fn default() -> Self {
        Self {
            otp_ttl_hours: 72,
            invite_ttl_days: 7,
            deny_policy: DenyPolicy::Pause,
        }
    }
}

/// Plaintext credentials for one verifier. Exists only in memory, for
/// delivery.
#[derive(Clone, PartialEq, Eq)]
pub struct IssuedCredential {
    pub verifier_id: Uuid,
    pub email: String,
    pub token: String,
    pub otp: String,
}

impl std::fmt::Debug for IssuedCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IssuedCredential")
            .field("verifier_id", &self.verifier_id)
            .field("email", &self.email)
            .finish_non_exhaustive()
    }
}

/// A freshly opened request with the credentials to hand out.
#[derive(Debug, Clone)]
pub struct IssuedRequest {
    pub request: VerificationRequest,
    pub credentials: Vec<IssuedCredential>,
}

/// Request state after a vote.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VoteResolution {
    Pending,
    Confirmed,
    Denied,
}

/// Result of a successful vote.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VoteOutcome {
    pub outcome: VoteResolution,
    pub vote: VoteRecord,
}

/// Read-only view of a voting token for the verification page.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TokenDetails {
    pub valid: bool,
    pub switch_name: String,
    pub owner_name: String,
    pub verifier_email: String,
    pub link_expires_at: DateTime<Utc>,
    pub link_expired: bool,
    pub otp_expires_at: DateTime<Utc>,
    pub otp_expired: bool,
    pub used: bool,
    pub already_voted: bool,
    pub request_completed: bool,
    pub request_result: Option<VerificationResult>,
}

/// A request closed by the expiry pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExpiredRequest {
    pub request_id: Uuid,
    pub switch_id: Uuid,
    pub switch_paused: bool,
}

/// Verification quorum protocol over a record store.
pub struct VerificationQuorumEngine<S: RecordStore> {
    store: Arc<S>,
    clock: Arc<dyn Clock>,
    notifier: Arc<dyn Notifier>,
    policy: VerificationPolicy,
}

impl<S: RecordStore> Clone for VerificationQuorumEngine<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            clock: self.clock.clone(),
            notifier: self.notifier.clone(),
            policy: self.policy,
        }
    }
}

impl<S: RecordStore> VerificationQuorumEngine<S> {
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

    pub fn policy(&self) -> &VerificationPolicy {
        &self.policy
    }

    // ==================
    // Request creation
    // ==================

    /// Open a request for a switch and move it to PENDING_VERIFICATION.
    pub fn create_request(&self, switch_id: Uuid) -> VerifyResult<IssuedRequest> {
        let ctx = TransitionContext::system(self.clock.now(), "verification_started");
        let issued = self
            .store
            .transaction(|tx| self.create_request_in(tx, switch_id, &ctx))?;

        tracing::info!(
            %switch_id,
            request_id = %issued.request.id,
            verifiers = issued.credentials.len(),
            "verification request opened"
        );
        Ok(issued)
    }

    fn create_request_in(
        &self,
        tx: &mut Tx<'_>,
        switch_id: Uuid,
        ctx: &TransitionContext,
    ) -> VerifyResult<IssuedRequest> {
        let switch = tx
            .switches
            .get(&switch_id)
            .cloned()
            .ok_or(SwitchError::NotFound("switch"))?;

        if !switch.status.can_transition_to(SwitchStatus::PendingVerification) {
            return Err(SwitchError::InvalidTransition {
                from: switch.status,
                to: SwitchStatus::PendingVerification,
            }
            .into());
        }
        if !switch.use_verifiers {
            return Err(VerificationError::InsufficientVerifiers(
                "switch does not use verifiers".to_string(),
            ));
        }

        let verifiers: Vec<(Uuid, String)> = tx
            .accepted_verifiers(switch_id)
            .into_iter()
            .map(|v| (v.id, v.email.clone()))
            .collect();
        if (verifiers.len() as u32) < switch.required_confirmations {
            return Err(VerificationError::InsufficientVerifiers(format!(
                "{} accepted, {} required",
                verifiers.len(),
                switch.required_confirmations
            )));
        }

        let now = ctx.now;
        let request = VerificationRequest {
            id: Uuid::new_v4(),
            switch_id,
            started_at: now,
            expires_at: now + Duration::days(i64::from(switch.verification_window_days)),
            required_confirmations: switch.required_confirmations,
            completed_at: None,
            result: None,
        };
        tx.insert_request(request.clone())?;

        // The OTP never lapses before the link it came with.
        let otp_expires_at =
            (now + Duration::hours(i64::from(self.policy.otp_ttl_hours))).max(request.expires_at);
        let mut credentials = Vec::with_capacity(verifiers.len());
        for (verifier_id, email) in verifiers {
            let token = generate_token();
            let otp = generate_otp();
            tx.insert_token(VerificationToken {
                id: Uuid::new_v4(),
                request_id: request.id,
                verifier_id,
                token_hash: hash_token(&token),
                otp_hash: hash_otp(&otp)?,
                otp_expires_at,
                link_expires_at: request.expires_at,
                used_at: None,
            })?;
            credentials.push(IssuedCredential {
                verifier_id,
                email,
                token,
                otp,
            });
        }

        tx.audit(
            AuditEvent::new(
                EntityRef::VerificationRequest(request.id),
                AuditAction::VerificationStarted,
                now,
            )
            .with_correlation(ctx.correlation_id)
            .with_metadata(json!({
                "switch_id": switch_id,
                "required_confirmations": request.required_confirmations,
                "verifier_count": credentials.len(),
                "expires_at": request.expires_at,
            })),
        );

        StateMachine::<S>::apply(tx, switch_id, SwitchStatus::PendingVerification, ctx)?
            .into_result()?;

        Ok(IssuedRequest {
            request,
            credentials,
        })
    }

    // ==================
    // Voting
    // ==================

    /// Record a vote and resolve the request if it is decided.
    pub fn submit_vote(
        &self,
        token: &str,
        otp: &str,
        vote: Vote,
        metadata: RequestMetadata,
    ) -> VerifyResult<VoteOutcome> {
        let now = self.clock.now();
        let token_hash = hash_token(token);
        let ctx = TransitionContext::system(now, "verifier_vote");

        let (outcome, switch_id) = self.store.transaction(|tx| {
            // 1. token exists
            let record = tx
                .token_by_hash(&token_hash)
                .cloned()
                .ok_or(VerificationError::TokenNotFound)?;
            // 2. link window
            if now > record.link_expires_at {
                return Err(VerificationError::LinkExpired);
            }
            // 3. single use
            if record.used_at.is_some() {
                if tx.has_voted(record.request_id, record.verifier_id) {
                    return Err(VerificationError::AlreadyVoted);
                }
                return Err(VerificationError::TokenUsed);
            }
            // 4. OTP
            if !verify_otp(otp, &record.otp_hash) {
                return Err(VerificationError::InvalidOtp);
            }
            if now > record.otp_expires_at {
                return Err(VerificationError::OtpExpired);
            }
            // 5. request still open
            let request = tx
                .requests
                .get(&record.request_id)
                .cloned()
                .ok_or(VerificationError::TokenNotFound)?;
            if !request.is_open() {
                return Err(VerificationError::RequestCompleted);
            }
            // 6. one vote per verifier
            if tx.has_voted(request.id, record.verifier_id) {
                return Err(VerificationError::AlreadyVoted);
            }
            let verifier_revoked = tx
                .verifiers
                .get(&record.verifier_id)
                .map_or(true, |v| v.status == VerifierStatus::Revoked);
            if verifier_revoked {
                return Err(VerificationError::VerifierRevoked);
            }

            if let Some(t) = tx.tokens.get_mut(&record.id) {
                t.used_at = Some(now);
            }
            let vote_record = VoteRecord {
                id: Uuid::new_v4(),
                request_id: request.id,
                verifier_id: record.verifier_id,
                vote,
                voted_at: now,
                metadata,
            };
            tx.insert_vote(vote_record.clone())?;
            tx.audit(
                AuditEvent::new(EntityRef::Vote(vote_record.id), AuditAction::VoteCast, now)
                    .with_correlation(ctx.correlation_id)
                    .with_metadata(json!({
                        "request_id": request.id,
                        "verifier_id": record.verifier_id,
                        "vote": vote.as_str(),
                        "ip_address": vote_record.metadata.ip_address,
                        "user_agent": vote_record.metadata.user_agent,
                    })),
            );

            let resolution = match vote {
                Vote::Deny => {
                    StateMachine::<S>::complete_open_request(
                        tx,
                        request.switch_id,
                        VerificationResult::Denied,
                        &ctx,
                    );
                    StateMachine::<S>::apply(
                        tx,
                        request.switch_id,
                        self.policy.deny_policy.target(),
                        &ctx,
                    )?
                    .into_result()?;
                    VoteResolution::Denied
                }
                Vote::Confirm => {
                    let confirmations = tx.count_votes(request.id, Vote::Confirm);
                    if confirmations >= request.required_confirmations {
                        StateMachine::<S>::apply(
                            tx,
                            request.switch_id,
                            SwitchStatus::Verified,
                            &ctx,
                        )?
                        .into_result()?;
                        StateMachine::<S>::complete_open_request(
                            tx,
                            request.switch_id,
                            VerificationResult::Confirmed,
                            &ctx,
                        );
                        VoteResolution::Confirmed
                    } else {
                        VoteResolution::Pending
                    }
                }
            };

            Ok((
                VoteOutcome {
                    outcome: resolution,
                    vote: vote_record,
                },
                request.switch_id,
            ))
        })?;

        tracing::info!(
            %switch_id,
            vote = outcome.vote.vote.as_str(),
            outcome = ?outcome.outcome,
            "verifier vote recorded"
        );

        if outcome.outcome == VoteResolution::Denied
            && self.policy.deny_policy == DenyPolicy::Pause
        {
            self.notify_owner_paused(switch_id, "A verifier denied the release request.");
        }

        Ok(outcome)
    }

    // ==================
    // Lookups
    // ==================

    /// Token state for rendering the verification page. Never exposes
    /// message content.
    pub fn token_details(&self, token: &str) -> VerifyResult<TokenDetails> {
        let now = self.clock.now();
        let token_hash = hash_token(token);

        self.store.read(|tables| -> VerifyResult<TokenDetails> {
            let record = tables
                .token_by_hash(&token_hash)
                .ok_or(VerificationError::TokenNotFound)?;
            let request = tables
                .requests
                .get(&record.request_id)
                .ok_or(VerificationError::TokenNotFound)?;
            let switch = tables
                .switches
                .get(&request.switch_id)
                .ok_or(VerificationError::TokenNotFound)?;
            let verifier_email = tables
                .verifiers
                .get(&record.verifier_id)
                .map(|v| v.email.clone())
                .unwrap_or_default();
            let owner_name = tables
                .users
                .get(&switch.owner_id)
                .map(|u| u.display_name.clone())
                .unwrap_or_default();

            let link_expired = now > record.link_expires_at;
            let otp_expired = now > record.otp_expires_at;
            let used = record.used_at.is_some();
            let already_voted = tables.has_voted(request.id, record.verifier_id);
            let request_completed = !request.is_open();

            Ok(TokenDetails {
                valid: !(link_expired || otp_expired || used || already_voted || request_completed),
                switch_name: switch.name.clone(),
                owner_name,
                verifier_email,
                link_expires_at: record.link_expires_at,
                link_expired,
                otp_expires_at: record.otp_expires_at,
                otp_expired,
                used,
                already_voted,
                request_completed,
                request_result: request.result,
            })
        })?
    }

    // ==================
    // Expiry
    // ==================

    /// Close an open request whose window has passed and pause its switch.
    ///
    /// Returns `None` when the request is already closed or not yet due.
    pub fn expire_request(&self, request_id: Uuid) -> VerifyResult<Option<ExpiredRequest>> {
        let now = self.clock.now();
        let ctx = TransitionContext::system(now, "verification_expired");

        let expired = self.store.transaction(|tx| {
            let request = match tx.requests.get(&request_id) {
                Some(r) if r.is_open() && r.expires_at < now => r.clone(),
                _ => return Ok::<_, VerificationError>(None),
            };

            if let Some(r) = tx.requests.get_mut(&request_id) {
                r.complete(VerificationResult::Expired, now);
            }
            let confirmations = tx.count_votes(request_id, Vote::Confirm);
            tx.audit(
                AuditEvent::new(
                    EntityRef::VerificationRequest(request_id),
                    AuditAction::VerificationExpired,
                    now,
                )
                .with_correlation(ctx.correlation_id)
                .with_metadata(json!({
                    "switch_id": request.switch_id,
                    "expires_at": request.expires_at,
                    "confirmations": confirmations,
                    "required_confirmations": request.required_confirmations,
                })),
            );

            let switch_paused =
                StateMachine::<S>::apply(tx, request.switch_id, SwitchStatus::Paused, &ctx)?
                    .is_applied();

            Ok(Some(ExpiredRequest {
                request_id,
                switch_id: request.switch_id,
                switch_paused,
            }))
        })?;

        if let Some(e) = &expired {
            tracing::info!(switch_id = %e.switch_id, request_id = %e.request_id, "verification request expired");
            if e.switch_paused {
                self.notify_owner_paused(
                    e.switch_id,
                    "Verification window closed without a decision.",
                );
            }
        }
        Ok(expired)
    }

    /// Open requests whose window has passed.
    pub fn expired_request_ids(&self) -> VerifyResult<Vec<Uuid>> {
        let now = self.clock.now();
        Ok(self.store.read(|tables| {
            tables
                .requests
                .values()
                .filter(|r| r.is_open() && r.expires_at < now)
                .map(|r| r.id)
                .collect()
        })?)
    }

    fn notify_owner_paused(&self, switch_id: Uuid, reason: &str) {
        let target = self.store.read(|tables| {
            let switch = tables.switches.get(&switch_id)?;
            let owner = tables.users.get(&switch.owner_id)?;
            Some((owner.email.clone(), owner.display_name.clone(), switch.name.clone()))
        });

        if let Ok(Some((email, owner_name, switch_name))) = target {
            let notification = Notification::SwitchPaused {
                owner_name,
                switch_name,
                reason: reason.to_string(),
            };
            if let Err(e) = self.notifier.send(&email, &notification) {
                tracing::warn!(%switch_id, error = %e, "failed to notify owner of pause");
            }
        }
    }
}
