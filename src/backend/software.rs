use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use super::{BackendError, IV_SIZE, KeyHandle, RawKey, SecretBackend, gcm_decrypt, gcm_encrypt, validate_alias};

pub(crate) const EXPORTABLE_ALIAS: &str = "exportable";

/// Keys held as raw bytes in process memory. Used for key material that has
/// to exist outside the secure element, such as the push key.
///
/// A backend opened with [`SoftwareBackend::persistent`] also keeps every
/// key as `<keys_dir>/<alias>.key` (mode 0600) so it survives restarts.
/// Those files are not protected by anything but their permissions.
#[derive(Default)]
pub struct SoftwareBackend {
    keys_dir: Option<PathBuf>,
    keys: Mutex<HashMap<String, RawKey>>,
}

impl SoftwareBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn persistent(keys_dir: &Path) -> Self {
        Self {
            keys_dir: Some(keys_dir.to_path_buf()),
            keys: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_key(alias: &str, key: RawKey) -> Self {
        let mut keys = HashMap::new();
        keys.insert(alias.to_string(), key);
        Self {
            keys_dir: None,
            keys: Mutex::new(keys),
        }
    }

    fn keys(&self) -> Result<MutexGuard<'_, HashMap<String, RawKey>>, BackendError> {
        self.keys
            .lock()
            .map_err(|_| BackendError::Unavailable("software keystore mutex poisoned".into()))
    }

    fn key(&self, handle: &KeyHandle) -> Result<RawKey, BackendError> {
        self.keys()?
            .get(handle.alias())
            .cloned()
            .ok_or_else(|| BackendError::UnknownKey(handle.alias().to_string()))
    }

    fn load_or_create(&self, alias: &str) -> Result<RawKey, BackendError> {
        let Some(dir) = &self.keys_dir else {
            return Ok(RawKey::generate());
        };
        let path = dir.join(format!("{alias}.key"));
        let unavailable = |e: std::io::Error| BackendError::Unavailable(format!("{}: {e}", path.display()));

        match std::fs::read(&path) {
            Ok(bytes) => {
                let key = RawKey::from_bytes(&bytes).ok_or_else(|| {
                    BackendError::Unavailable(format!("{}: not a 256-bit key", path.display()))
                })?;
                tracing::debug!(alias, "Loaded software key");
                Ok(key)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let key = RawKey::generate();
                write_key_file(dir, &path, &key).map_err(unavailable)?;
                tracing::info!(alias, path = %path.display(), "Stored new software key");
                Ok(key)
            }
            Err(e) => Err(unavailable(e)),
        }
    }
}

fn write_key_file(dir: &Path, path: &Path, key: &RawKey) -> std::io::Result<()> {
    std::fs::create_dir_all(dir)?;
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        tmp.as_file()
            .set_permissions(std::fs::Permissions::from_mode(0o600))?;
    }
    tmp.write_all(key.as_bytes())?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

impl SecretBackend for SoftwareBackend {
    fn get_or_create(&self, alias: &str) -> Result<KeyHandle, BackendError> {
        validate_alias(alias)?;
        // Held across creation so two callers cannot store competing keys.
        let mut keys = self.keys()?;
        if !keys.contains_key(alias) {
            let key = self.load_or_create(alias)?;
            keys.insert(alias.to_string(), key);
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
