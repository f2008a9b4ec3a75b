pub mod software;
#[cfg(feature = "tpm")]
pub mod tpm;

use std::fmt;
use std::path::Path;
use std::sync::{Arc, Mutex};

use aes_gcm::aead::Aead;
use aes_gcm::{Aes256Gcm, KeyInit, Nonce};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use rand::RngCore;
use rand::rngs::OsRng;
use zeroize::Zeroizing;

pub use software::SoftwareBackend;

pub const KEY_SIZE: usize = 32;
pub const IV_SIZE: usize = 12;
pub const TAG_SIZE: usize = 16;

#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("key backend unavailable: {0}")]
    Unavailable(String),
    #[error("authentication failure")]
    AuthenticationFailure,
    #[error("unknown key alias: {0}")]
    UnknownKey(String),
    #[error("invalid key alias: {0}")]
    InvalidAlias(String),
}

/// Opaque reference to a key held by a [`SecretBackend`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct KeyHandle {
    alias: String,
}

impl KeyHandle {
    pub(crate) fn new(alias: &str) -> Self {
        Self {
            alias: alias.to_string(),
        }
    }

    pub fn alias(&self) -> &str {
        &self.alias
    }
}

/// Key custody capability. AES-256-GCM runs inside the backend so that
/// callers only ever hold a [`KeyHandle`].
///
/// All methods may block on hardware or disk I/O. Call from `spawn_blocking`.
pub trait SecretBackend: Send + Sync {
    /// Create a 256-bit AES key under `alias` unless one exists already.
    fn get_or_create(&self, alias: &str) -> Result<KeyHandle, BackendError>;

    /// Returns `ciphertext ‖ tag`.
    fn encrypt(
        &self,
        key: &KeyHandle,
        iv: &[u8; IV_SIZE],
        plaintext: &[u8],
    ) -> Result<Vec<u8>, BackendError>;

    fn decrypt(
        &self,
        key: &KeyHandle,
        iv: &[u8; IV_SIZE],
        ciphertext: &[u8],
    ) -> Result<Vec<u8>, BackendError>;
}

/// Which backend holds the long-lived credential key.
#[derive(clap::ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    Tpm,
    Software,
}

/// Construct the backend selected in the config. The TPM is not touched
/// until the first key is requested.
pub fn open(
    kind: BackendKind,
    tpm_device: &str,
    keys_dir: &Path,
) -> Result<Arc<dyn SecretBackend>, BackendError> {
    match kind {
        BackendKind::Software => {
            tracing::warn!(
                keys_dir = %keys_dir.display(),
                "Software key backend selected; keys are stored unprotected on disk"
            );
            Ok(Arc::new(SoftwareBackend::persistent(keys_dir)))
        }
        #[cfg(feature = "tpm")]
        BackendKind::Tpm => Ok(Arc::new(tpm::TpmBackend::new(tpm_device, keys_dir))),
        #[cfg(not(feature = "tpm"))]
        BackendKind::Tpm => {
            let _ = tpm_device;
            Err(BackendError::Unavailable(
                "built without the `tpm` feature".into(),
            ))
        }
    }
}

/// A key bound to the backend that holds it.
#[derive(Clone)]
pub struct SecretKey {
    backend: Arc<dyn SecretBackend>,
    handle: KeyHandle,
}

impl SecretKey {
    pub fn bound(backend: Arc<dyn SecretBackend>, handle: KeyHandle) -> Self {
        Self { backend, handle }
    }

    /// Wrap exportable key material in a single-key software backend.
    pub fn exportable(raw: &RawKey) -> Self {
        let handle = KeyHandle::new(software::EXPORTABLE_ALIAS);
        let backend = SoftwareBackend::with_key(software::EXPORTABLE_ALIAS, raw.clone());
        Self {
            backend: Arc::new(backend),
            handle,
        }
    }

    pub fn handle(&self) -> &KeyHandle {
        &self.handle
    }

    pub(crate) fn encrypt(
        &self,
        iv: &[u8; IV_SIZE],
        plaintext: &[u8],
    ) -> Result<Vec<u8>, BackendError> {
        self.backend.encrypt(&self.handle, iv, plaintext)
    }

    pub(crate) fn decrypt(
        &self,
        iv: &[u8; IV_SIZE],
        ciphertext: &[u8],
    ) -> Result<Vec<u8>, BackendError> {
        self.backend.decrypt(&self.handle, iv, ciphertext)
    }
}

impl fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecretKey")
            .field("alias", &self.handle.alias)
            .finish_non_exhaustive()
    }
}

/// Lazily resolved key: looked up (or created) by alias on first use and
/// reused for the rest of the process.
pub struct KeyRef {
    backend: Arc<dyn SecretBackend>,
    alias: String,
    resolved: Mutex<Option<KeyHandle>>,
}

impl KeyRef {
    pub fn new(backend: Arc<dyn SecretBackend>, alias: &str) -> Self {
        Self {
            backend,
            alias: alias.to_string(),
            resolved: Mutex::new(None),
        }
    }

    pub fn alias(&self) -> &str {
        &self.alias
    }

    pub fn resolve(&self) -> Result<SecretKey, BackendError> {
        let mut slot = self
            .resolved
            .lock()
            .map_err(|_| BackendError::Unavailable("key slot mutex poisoned".into()))?;
        let handle = match slot.as_ref() {
            Some(handle) => handle.clone(),
            None => {
                let handle = self.backend.get_or_create(&self.alias)?;
                tracing::debug!(alias = %self.alias, "Key resolved");
                *slot = Some(handle.clone());
                handle
            }
        };
        Ok(SecretKey::bound(self.backend.clone(), handle))
    }
}

/// Exportable 256-bit key material. Zeroed on drop.
#[derive(Clone, PartialEq, Eq)]
pub struct RawKey(Zeroizing<[u8; KEY_SIZE]>);

impl RawKey {
    pub fn generate() -> Self {
        let mut key = Zeroizing::new([0u8; KEY_SIZE]);
        OsRng.fill_bytes(&mut key[..]);
        Self(key)
    }

    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        let key: [u8; KEY_SIZE] = bytes.try_into().ok()?;
        Some(Self(Zeroizing::new(key)))
    }

    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.0
    }

    pub fn to_base64(&self) -> String {
        STANDARD.encode(self.as_bytes())
    }
}

impl fmt::Debug for RawKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("RawKey(..)")
    }
}

pub(crate) fn validate_alias(alias: &str) -> Result<(), BackendError> {
    let ok = !alias.is_empty()
        && alias
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-');
    if ok {
        Ok(())
    } else {
        Err(BackendError::InvalidAlias(alias.to_string()))
    }
}

pub(crate) fn gcm_encrypt(
    key: &[u8; KEY_SIZE],
    iv: &[u8; IV_SIZE],
    plaintext: &[u8],
) -> Result<Vec<u8>, BackendError> {
    let cipher = Aes256Gcm::new_from_slice(key)
        .map_err(|e| BackendError::Unavailable(e.to_string()))?;
    cipher
        .encrypt(Nonce::from_slice(iv), plaintext)
        .map_err(|_| BackendError::Unavailable("AES-GCM encryption failed".into()))
}

pub(crate) fn gcm_decrypt(
    key: &[u8; KEY_SIZE],
    iv: &[u8; IV_SIZE],
    ciphertext: &[u8],
) -> Result<Vec<u8>, BackendError> {
    let cipher = Aes256Gcm::new_from_slice(key)
        .map_err(|e| BackendError::Unavailable(e.to_string()))?;
    cipher
        .decrypt(Nonce::from_slice(iv), ciphertext)
        .map_err(|_| BackendError::AuthenticationFailure)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alias_validation() {
        assert!(validate_alias("pref_enc_key").is_ok());
        assert!(validate_alias("push-key-1").is_ok());
        assert!(validate_alias("").is_err());
        assert!(validate_alias("../escape").is_err());
        assert!(validate_alias("a/b").is_err());
    }

    #[test]
    fn test_raw_key_from_bytes_requires_32() {
        assert!(RawKey::from_bytes(&[0u8; 31]).is_none());
        assert!(RawKey::from_bytes(&[0u8; 33]).is_none());
        let key = RawKey::from_bytes(&[7u8; 32]).unwrap();
        assert_eq!(key.as_bytes(), &[7u8; 32]);
    }

    #[test]
    fn test_raw_key_debug_is_redacted() {
        let key = RawKey::from_bytes(&[0x41u8; 32]).unwrap();
        assert_eq!(format!("{key:?}"), "RawKey(..)");
    }

    #[test]
    fn test_key_ref_resolves_once() {
        let backend: Arc<dyn SecretBackend> = Arc::new(SoftwareBackend::new());
        let key_ref = KeyRef::new(backend, "pref_enc_key");
        let a = key_ref.resolve().unwrap();
        let b = key_ref.resolve().unwrap();
        assert_eq!(a.handle(), b.handle());

        let iv = [1u8; IV_SIZE];
        let ct = a.encrypt(&iv, b"hello").unwrap();
        assert_eq!(b.decrypt(&iv, &ct).unwrap(), b"hello");
    }
}
