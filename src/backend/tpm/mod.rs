pub mod context;
pub mod seal;

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

pub use context::TpmContext;
use seal::SealedBlob;

use super::{BackendError, IV_SIZE, KeyHandle, RawKey, SecretBackend, gcm_decrypt, gcm_encrypt, validate_alias};

#[derive(Debug, thiserror::Error)]
pub enum TpmError {
    #[error("TPM context error: {0}")]
    Context(String),
    #[error("TPM primary key error: {0}")]
    Primary(String),
    #[error("TPM seal error: {0}")]
    Seal(String),
    #[error("TPM error: {0}")]
    Other(String),
}

impl From<tss_esapi::Error> for TpmError {
    fn from(e: tss_esapi::Error) -> Self {
        TpmError::Other(e.to_string())
    }
}

impl From<TpmError> for BackendError {
    fn from(e: TpmError) -> Self {
        BackendError::Unavailable(e.to_string())
    }
}

/// Hardware-backed custody: every alias is an AES-256 key sealed to this
/// TPM and stored as `<keys_dir>/<alias>.blob`. Unsealed keys stay inside
/// the backend.
pub struct TpmBackend {
    device: String,
    keys_dir: PathBuf,
    ctx: Mutex<Option<TpmContext>>,
    unsealed: Mutex<HashMap<String, RawKey>>,
}

impl TpmBackend {
    pub fn new(device: &str, keys_dir: &Path) -> Self {
        Self {
            device: device.to_string(),
            keys_dir: keys_dir.to_path_buf(),
            ctx: Mutex::new(None),
            unsealed: Mutex::new(HashMap::new()),
        }
    }

    fn context(&self) -> Result<TpmContext, BackendError> {
        let mut slot = self
            .ctx
            .lock()
            .map_err(|_| BackendError::Unavailable("TPM context mutex poisoned".into()))?;
        if let Some(ctx) = slot.as_ref() {
            return Ok(ctx.clone());
        }
        let ctx = TpmContext::new(&self.device)?;
        tracing::info!(device = %self.device, "TPM context initialized");
        *slot = Some(ctx.clone());
        Ok(ctx)
    }

    fn unsealed(&self) -> Result<MutexGuard<'_, HashMap<String, RawKey>>, BackendError> {
        self.unsealed
            .lock()
            .map_err(|_| BackendError::Unavailable("TPM key cache mutex poisoned".into()))
    }

    fn key(&self, handle: &KeyHandle) -> Result<RawKey, BackendError> {
        self.unsealed()?
            .get(handle.alias())
            .cloned()
            .ok_or_else(|| BackendError::UnknownKey(handle.alias().to_string()))
    }

    fn load_or_create(&self, alias: &str) -> Result<RawKey, BackendError> {
        let path = self.keys_dir.join(format!("{alias}.blob"));
        let tpm = self.context()?;
        if path.exists() {
            let bytes = std::fs::read(&path)
                .map_err(|e| BackendError::Unavailable(format!("{}: {e}", path.display())))?;
            let blob = SealedBlob::decode(&bytes)?;
            let key = tpm.with_ctx(|ctx, primary| seal::unseal(ctx, primary, &blob))?;
            tracing::debug!(alias, "Unsealed key");
            Ok(key)
        } else {
            let (blob, key) = tpm.with_ctx(|ctx, primary| seal::create_seal(ctx, primary))?;
            std::fs::create_dir_all(&self.keys_dir)
                .and_then(|()| std::fs::write(&path, blob.encode()))
                .map_err(|e| BackendError::Unavailable(format!("{}: {e}", path.display())))?;
            tracing::info!(alias, path = %path.display(), "Sealed new key");
            Ok(key)
        }
    }
}

impl SecretBackend for TpmBackend {
    fn get_or_create(&self, alias: &str) -> Result<KeyHandle, BackendError> {
        validate_alias(alias)?;
        // Held across creation so two callers cannot seal competing keys.
        let mut unsealed = self.unsealed()?;
        if !unsealed.contains_key(alias) {
            let key = self.load_or_create(alias)?;
            unsealed.insert(alias.to_string(), key);
        }
        Ok(KeyHandle::new(alias))
    }

    fn encrypt(
        &self,
        key: &KeyHandle,
        iv: &[u8; IV_SIZE],
        plaintext: &[u8],
    ) -> Result<Vec<u8>, BackendError> {
        gcm_encrypt(self.key(key)?.as_bytes(), iv, plaintext)
    }

    fn decrypt(
        &self,
        key: &KeyHandle,
        iv: &[u8; IV_SIZE],
        ciphertext: &[u8],
    ) -> Result<Vec<u8>, BackendError> {
        gcm_decrypt(self.key(key)?.as_bytes(), iv, ciphertext)
    }
}
