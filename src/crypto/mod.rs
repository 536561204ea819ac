//! # Confidentiality Layer
//!
//! Authenticated encryption for stored messages, and the token/OTP
//! primitives used by verifier invitations and votes.

pub mod cipher;
pub mod errors;
pub mod tokens;

pub use cipher::EncryptionService;
pub use errors::{CryptoError, CryptoResult};
pub use tokens::{
    constant_time_str_eq, generate_otp, generate_token, hash_otp, hash_token, verify_otp,
};
