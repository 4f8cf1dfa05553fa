//! AES-256-GCM credential vault.
//!
//! Each secret is encrypted with a fresh random nonce and the GCM authentication
//! tag is kept detached from the ciphertext, so a stored record is the triple
//! `(ciphertext, nonce, tag)`. Decryption refuses to run without a tag: records
//! written by the old tag-less scheme are reported as integrity failures instead
//! of being decrypted with a guessed tag.

use aes_gcm::{
    aead::{AeadCore, AeadInPlace, KeyInit, OsRng},
    Aes256Gcm, Nonce, Tag,
};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use std::fmt;
use thiserror::Error;

/// Size of the encryption key in bytes (256 bits)
const KEY_SIZE: usize = 32;

/// Size of the nonce in bytes (96 bits, standard for GCM)
const NONCE_SIZE: usize = 12;

/// Size of the GCM authentication tag in bytes
const TAG_SIZE: usize = 16;

/// Vault failures.
#[derive(Debug, Error)]
pub enum VaultError {
    #[error("invalid encryption key: {0}")]
    InvalidKey(String),

    #[error("encryption failed")]
    Encryption,

    /// Tag missing, malformed, or rejected by GCM verification.
    #[error("integrity check failed: {0}")]
    Integrity(String),
}

/// Base64-encoded output of a single encryption.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EncryptedSecret {
    pub ciphertext: String,
    pub nonce: String,
    pub tag: String,
}

/// Validates that the master key is exactly 32 bytes when base64 decoded.
pub fn validate_key(key_base64: &str) -> Result<Vec<u8>, VaultError> {
    let key_bytes = BASE64
        .decode(key_base64.trim())
        .map_err(|e| VaultError::InvalidKey(format!("not valid base64: {}", e)))?;

    if key_bytes.len() != KEY_SIZE {
        return Err(VaultError::InvalidKey(format!(
            "must be {} bytes (256 bits), got {} bytes",
            KEY_SIZE,
            key_bytes.len()
        )));
    }

    Ok(key_bytes)
}

/// Encrypts `plaintext` under `key` with a random nonce.
///
/// Returns the ciphertext, the nonce and the detached authentication tag, all
/// base64-encoded for storage.
pub fn encrypt(plaintext: &str, key: &[u8]) -> Result<EncryptedSecret, VaultError> {
    let cipher = cipher_for(key)?;

    // Generate random nonce (never reuse!)
    let nonce = Aes256Gcm::generate_nonce(&mut OsRng);

    let mut buffer = plaintext.as_bytes().to_vec();
    let tag = cipher
        .encrypt_in_place_detached(&nonce, b"", &mut buffer)
        .map_err(|_| VaultError::Encryption)?;

    Ok(EncryptedSecret {
        ciphertext: BASE64.encode(&buffer),
        nonce: BASE64.encode(nonce),
        tag: BASE64.encode(tag),
    })
}

/// Decrypts a stored triple.
///
/// `tag` is optional only so that callers can hand over a record exactly as it
/// was read; a missing tag always fails with [`VaultError::Integrity`].
pub fn decrypt(
    ciphertext: &str,
    nonce: &str,
    tag: Option<&str>,
    key: &[u8],
) -> Result<String, VaultError> {
    let cipher = cipher_for(key)?;

    let tag = tag
        .filter(|t| !t.is_empty())
        .ok_or_else(|| VaultError::Integrity("authentication tag missing".to_string()))?;

    let tag_bytes = BASE64
        .decode(tag)
        .map_err(|_| VaultError::Integrity("authentication tag is not valid base64".to_string()))?;
    if tag_bytes.len() != TAG_SIZE {
        return Err(VaultError::Integrity(format!(
            "authentication tag must be {} bytes, got {}",
            TAG_SIZE,
            tag_bytes.len()
        )));
    }

    let nonce_bytes = BASE64
        .decode(nonce)
        .map_err(|_| VaultError::Integrity("nonce is not valid base64".to_string()))?;
    if nonce_bytes.len() != NONCE_SIZE {
        return Err(VaultError::Integrity(format!(
            "invalid nonce size: expected {}, got {}",
            NONCE_SIZE,
            nonce_bytes.len()
        )));
    }

    let mut buffer = BASE64
        .decode(ciphertext)
        .map_err(|_| VaultError::Integrity("ciphertext is not valid base64".to_string()))?;

    cipher
        .decrypt_in_place_detached(
            Nonce::from_slice(&nonce_bytes),
            b"",
            &mut buffer,
            Tag::from_slice(&tag_bytes),
        )
        .map_err(|_| VaultError::Integrity("tag verification failed".to_string()))?;

    String::from_utf8(buffer)
        .map_err(|_| VaultError::Integrity("decrypted data is not valid UTF-8".to_string()))
}

fn cipher_for(key: &[u8]) -> Result<Aes256Gcm, VaultError> {
    if key.len() != KEY_SIZE {
        return Err(VaultError::InvalidKey(format!(
            "must be {} bytes",
            KEY_SIZE
        )));
    }
    Aes256Gcm::new_from_slice(key).map_err(|e| VaultError::InvalidKey(e.to_string()))
}

/// Process-wide vault holding the master key loaded at startup.
#[derive(Clone)]
pub struct CredentialVault {
    key: Vec<u8>,
}

impl CredentialVault {
    pub fn new(key: &[u8]) -> Result<Self, VaultError> {
        cipher_for(key)?;
        Ok(Self { key: key.to_vec() })
    }

    /// Builds a vault from a base64-encoded 32-byte key.
    pub fn from_base64(key_base64: &str) -> Result<Self, VaultError> {
        let key = validate_key(key_base64)?;
        Ok(Self { key })
    }

    pub fn encrypt(&self, plaintext: &str) -> Result<EncryptedSecret, VaultError> {
        encrypt(plaintext, &self.key)
    }

    pub fn decrypt(
        &self,
        ciphertext: &str,
        nonce: &str,
        tag: Option<&str>,
    ) -> Result<String, VaultError> {
        decrypt(ciphertext, nonce, tag, &self.key)
    }
}

impl fmt::Debug for CredentialVault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialVault").finish_non_exhaustive()
    }
}
