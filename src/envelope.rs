//! AES-256-GCM envelopes: `iv[12] ‖ ciphertext ‖ tag[16]`, base64 for text
//! storage.
//!
//! Every way a ciphertext can be wrong (truncated, bad base64, flipped bit,
//! wrong key, not UTF-8) yields the same [`EnvelopeError::AuthenticationFailure`].

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use rand::RngCore;
use rand::rngs::OsRng;

use crate::backend::{BackendError, IV_SIZE, SecretKey, TAG_SIZE};

#[derive(Debug, thiserror::Error)]
pub enum EnvelopeError {
    #[error("key backend unavailable: {0}")]
    BackendUnavailable(String),
    #[error("authentication failure")]
    AuthenticationFailure,
}

impl From<BackendError> for EnvelopeError {
    fn from(e: BackendError) -> Self {
        match e {
            BackendError::AuthenticationFailure => EnvelopeError::AuthenticationFailure,
            other => EnvelopeError::BackendUnavailable(other.to_string()),
        }
    }
}

pub fn encrypt(key: &SecretKey, plaintext: &[u8]) -> Result<Vec<u8>, EnvelopeError> {
    let mut iv = [0u8; IV_SIZE];
    OsRng.fill_bytes(&mut iv);

    let ciphertext = key.encrypt(&iv, plaintext)?;

    let mut envelope = Vec::with_capacity(IV_SIZE + ciphertext.len());
    envelope.extend_from_slice(&iv);
    envelope.extend_from_slice(&ciphertext);
    Ok(envelope)
}

pub fn decrypt(key: &SecretKey, envelope: &[u8]) -> Result<Vec<u8>, EnvelopeError> {
    if envelope.len() < IV_SIZE + TAG_SIZE {
        return Err(EnvelopeError::AuthenticationFailure);
    }
    let (iv, ciphertext) = envelope.split_at(IV_SIZE);
    let iv: &[u8; IV_SIZE] = iv
        .try_into()
        .map_err(|_| EnvelopeError::AuthenticationFailure)?;
    Ok(key.decrypt(iv, ciphertext)?)
}

pub fn encrypt_str(key: &SecretKey, plaintext: &str) -> Result<String, EnvelopeError> {
    encrypt(key, plaintext.as_bytes()).map(|envelope| STANDARD.encode(envelope))
}

pub fn decrypt_str(key: &SecretKey, encoded: &str) -> Result<String, EnvelopeError> {
    let plaintext = decrypt_base64(key, encoded)?;
    String::from_utf8(plaintext).map_err(|_| EnvelopeError::AuthenticationFailure)
}

/// Base64 envelope in, raw bytes out.
pub fn decrypt_base64(key: &SecretKey, encoded: &str) -> Result<Vec<u8>, EnvelopeError> {
    let envelope = STANDARD
        .decode(encoded.trim())
        .map_err(|_| EnvelopeError::AuthenticationFailure)?;
    decrypt(key, &envelope)
}

/// Raw bytes in, base64 envelope out.
pub fn encrypt_base64(key: &SecretKey, plaintext: &[u8]) -> Result<String, EnvelopeError> {
    encrypt(key, plaintext).map(|envelope| STANDARD.encode(envelope))
}
