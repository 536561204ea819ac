//! # Tokens and One-Time Codes
//!
//! Secure randomness for link tokens and OTPs, plus one-way hashing.
//!
//! ## Invariants
//! - Link tokens and invite tokens are stored only as SHA-256 hashes
//! - OTPs are stored only as Argon2id hashes; the plaintext leaves memory
//!   once it has been handed to the notifier
//! - Secret comparison is constant-time

use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::rngs::OsRng;
use rand::{Rng, RngCore};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use super::errors::{CryptoError, CryptoResult};

/// Number of decimal digits in an OTP
pub const OTP_DIGITS: usize = 6;

/// Generate a cryptographically secure random token
///
/// Returns a 256-bit (32-byte) random value as URL-safe base64.
pub fn generate_token() -> String {
    let mut bytes = [0u8; 32];
    OsRng.fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Hash a token for storage using SHA-256
///
/// Tokens are stored hashed; the raw token only travels in the emailed link.
pub fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    URL_SAFE_NO_PAD.encode(hasher.finalize())
}

/// Generate a 6-digit one-time code, zero padded.
pub fn generate_otp() -> String {
    let code: u32 = OsRng.gen_range(0..1_000_000);
    format!("{:0width$}", code, width = OTP_DIGITS)
}

/// Hash an OTP with Argon2id.
pub fn hash_otp(otp: &str) -> CryptoResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(otp.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|_| CryptoError::HashingFailed)
}

/// Verify an OTP against its stored hash.
///
/// A malformed stored hash verifies as `false`.
pub fn verify_otp(otp: &str, hash: &str) -> bool {
    if otp.len() != OTP_DIGITS || !otp.bytes().all(|b| b.is_ascii_digit()) {
        return false;
    }

    match PasswordHash::new(hash) {
        Ok(parsed) => Argon2::default()
            .verify_password(otp.as_bytes(), &parsed)
            .is_ok(),
        Err(_) => false,
    }
}

/// Constant-time comparison of two strings
pub fn constant_time_str_eq(a: &str, b: &str) -> bool {
    a.as_bytes().ct_eq(b.as_bytes()).into()
}
