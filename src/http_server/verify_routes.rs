//! Verifier-facing routes
//!
//! - `GET /verify/:token` - token details for the verification page
//! - `POST /verify/:token` - submit OTP and vote
//! - `POST /verifiers/accept/:token` - accept a verifier invitation

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::{header::USER_AGENT, HeaderMap},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::errors::ApiError;
use super::state::ApiState;
use crate::store::{RecordStore, RequestMetadata, Vote, VerifierStatus};
use crate::verification::{TokenDetails, VoteOutcome};

/// Vote submission body
#[derive(Debug, Clone, Deserialize)]
pub struct VoteBody {
    pub otp: String,
    pub vote: Vote,
}

/// Verifier summary returned after accepting an invitation
#[derive(Debug, Clone, Serialize)]
pub struct AcceptedVerifier {
    pub verifier_id: Uuid,
    pub switch_id: Uuid,
    pub email: String,
    pub status: VerifierStatus,
    pub accepted_at: Option<DateTime<Utc>>,
}

pub fn verify_routes<S: RecordStore + 'static>() -> Router<Arc<ApiState<S>>> {
    Router::new()
        .route(
            "/verify/:token",
            get(details_handler::<S>).post(vote_handler::<S>),
        )
        .route("/verifiers/accept/:token", post(accept_handler::<S>))
}

async fn details_handler<S: RecordStore + 'static>(
    State(state): State<Arc<ApiState<S>>>,
    Path(token): Path<String>,
) -> Result<Json<TokenDetails>, ApiError> {
    Ok(Json(state.app.verification.token_details(&token)?))
}

async fn vote_handler<S: RecordStore + 'static>(
    State(state): State<Arc<ApiState<S>>>,
    Path(token): Path<String>,
    headers: HeaderMap,
    Json(body): Json<VoteBody>,
) -> Result<Json<VoteOutcome>, ApiError> {
    let metadata = request_metadata(&headers);
    let engine = state.app.verification.clone();
    // OTP hashing and mail sends block.
    let outcome = tokio::task::spawn_blocking(move || {
        engine.submit_vote(&token, &body.otp, body.vote, metadata)
    })
    .await??;
    Ok(Json(outcome))
}

async fn accept_handler<S: RecordStore + 'static>(
    State(state): State<Arc<ApiState<S>>>,
    Path(token): Path<String>,
) -> Result<Json<AcceptedVerifier>, ApiError> {
    let verifier = state.app.verifiers.accept_invitation(&token)?;
    Ok(Json(AcceptedVerifier {
        verifier_id: verifier.id,
        switch_id: verifier.switch_id,
        email: verifier.email,
        status: verifier.status,
        accepted_at: verifier.accepted_at,
    }))
}

fn request_metadata(headers: &HeaderMap) -> RequestMetadata {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.to_string())
    };
    RequestMetadata {
        ip_address: header("x-forwarded-for")
            .and_then(|v| v.split(',').next().map(|ip| ip.trim().to_string()))
            .filter(|ip| !ip.is_empty()),
        user_agent: header(USER_AGENT.as_str()),
    }
}
