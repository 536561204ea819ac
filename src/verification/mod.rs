//! # Verification
//!
//! Verifier invitations and the quorum vote that gates release of a
//! switch's messages.

mod engine;
mod errors;
mod registry;

pub use engine::{
    DenyPolicy, ExpiredRequest, IssuedCredential, IssuedRequest, TokenDetails,
    VerificationPolicy, VerificationQuorumEngine, VoteOutcome, VoteResolution,
};
pub use errors::{VerificationError, VerifyResult};
pub use registry::VerifierRegistry;
