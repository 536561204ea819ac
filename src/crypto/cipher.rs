//! # Message Encryption
//!
//! Authenticated symmetric encryption for message bodies.
//!
//! Blob layout (base64, URL-safe, no padding):
//!
//! ```text
//! salt (16) ‖ nonce (12) ‖ tag (16) ‖ ciphertext (n)
//! ```
//!
//! Each call draws a fresh salt and nonce. The AES-256-GCM key is derived
//! per call from the master secret and the salt with Argon2id.

use aes_gcm::aead::{AeadInPlace, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce, Tag};
use argon2::{Algorithm, Argon2, Params, Version};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::rngs::OsRng;
use rand::RngCore;
use zeroize::Zeroizing;

use super::errors::{CryptoError, CryptoResult};

const SALT_LEN: usize = 16;
const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;
const KEY_LEN: usize = 32;
const HEADER_LEN: usize = SALT_LEN + NONCE_LEN + TAG_LEN;

/// Minimum accepted master secret length in bytes
pub const MIN_MASTER_KEY_LEN: usize = 32;

// The master secret is high-entropy, so the KDF runs with a small memory cost.
const KDF_MEMORY_KIB: u32 = 8 * 1024;
const KDF_ITERATIONS: u32 = 2;

/// Encryption service holding the master secret.
pub struct EncryptionService {
    master_key: Zeroizing<Vec<u8>>,
}

impl std::fmt::Debug for EncryptionService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncryptionService").finish_non_exhaustive()
    }
}

impl EncryptionService {
    /// Create a service from the configured master secret.
    pub fn new(master_key: &str) -> CryptoResult<Self> {
        if master_key.len() < MIN_MASTER_KEY_LEN {
            return Err(CryptoError::InvalidMasterKey(format!(
                "master key must be at least {} bytes",
                MIN_MASTER_KEY_LEN
            )));
        }

        Ok(Self {
            master_key: Zeroizing::new(master_key.as_bytes().to_vec()),
        })
    }

    /// Encrypt a UTF-8 plaintext into a self-describing blob.
    pub fn encrypt(&self, plaintext: &str) -> CryptoResult<String> {
        let mut salt = [0u8; SALT_LEN];
        let mut nonce = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut salt);
        OsRng.fill_bytes(&mut nonce);

        let key = self
            .derive_key(&salt)
            .map_err(|_| CryptoError::EncryptionFailed)?;
        let cipher =
            Aes256Gcm::new_from_slice(&key[..]).map_err(|_| CryptoError::EncryptionFailed)?;

        let mut buffer = plaintext.as_bytes().to_vec();
        let tag = cipher
            .encrypt_in_place_detached(Nonce::from_slice(&nonce), b"", &mut buffer)
            .map_err(|_| CryptoError::EncryptionFailed)?;

        let mut blob = Vec::with_capacity(HEADER_LEN + buffer.len());
        blob.extend_from_slice(&salt);
        blob.extend_from_slice(&nonce);
        blob.extend_from_slice(tag.as_slice());
        blob.extend_from_slice(&buffer);

        Ok(URL_SAFE_NO_PAD.encode(blob))
    }

    /// Decrypt a blob produced by [`EncryptionService::encrypt`].
    ///
    /// Every failure collapses into [`CryptoError::DecryptionFailed`].
    pub fn decrypt(&self, blob: &str) -> CryptoResult<String> {
        let raw = URL_SAFE_NO_PAD
            .decode(blob.trim())
            .map_err(|_| CryptoError::DecryptionFailed)?;
        if raw.len() < HEADER_LEN {
            return Err(CryptoError::DecryptionFailed);
        }

        let (salt, rest) = raw.split_at(SALT_LEN);
        let (nonce, rest) = rest.split_at(NONCE_LEN);
        let (tag, ciphertext) = rest.split_at(TAG_LEN);

        let key = self
            .derive_key(salt)
            .map_err(|_| CryptoError::DecryptionFailed)?;
        let cipher =
            Aes256Gcm::new_from_slice(&key[..]).map_err(|_| CryptoError::DecryptionFailed)?;

        let mut buffer = ciphertext.to_vec();
        cipher
            .decrypt_in_place_detached(
                Nonce::from_slice(nonce),
                b"",
                &mut buffer,
                Tag::from_slice(tag),
            )
            .map_err(|_| CryptoError::DecryptionFailed)?;

        String::from_utf8(buffer).map_err(|_| CryptoError::DecryptionFailed)
    }

    fn derive_key(&self, salt: &[u8]) -> Result<Zeroizing<[u8; KEY_LEN]>, argon2::Error> {
        let params = Params::new(KDF_MEMORY_KIB, KDF_ITERATIONS, 1, Some(KEY_LEN))?;
        let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);

        let mut key = Zeroizing::new([0u8; KEY_LEN]);
        argon2.hash_password_into(&self.master_key, salt, &mut key[..])?;
        Ok(key)
    }
}
