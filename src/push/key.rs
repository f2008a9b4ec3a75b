use std::sync::Arc;

use uuid::Uuid;

use crate::backend::{KeyRef, RawKey};
use crate::envelope;
use crate::error::{Error, Result};
use crate::store::{self, SharedPreferences, keys};

/// Owner of the per-device push decryption key and device id.
///
/// The push key is exportable (it is sent to the server once per
/// registration) but is wrapped at rest by the hardware-backed credential key.
pub struct PushKeyManager {
    prefs: SharedPreferences,
    wrapping_key: Arc<KeyRef>,
}

impl PushKeyManager {
    pub fn new(prefs: SharedPreferences, wrapping_key: Arc<KeyRef>) -> Self {
        Self {
            prefs,
            wrapping_key,
        }
    }

    /// Return the stored key, generating and persisting one if none exists.
    /// Blocking.
    pub fn get_or_create(&self) -> Result<RawKey> {
        let wrapping = self.wrapping_key.resolve()?;
        // Check-and-create under one lock so concurrent callers agree on the key.
        let mut prefs = store::lock(&self.prefs)?;
        if let Some(encrypted) = prefs.get(keys::PUSH_ENC_KEY) {
            let bytes = envelope::decrypt_base64(&wrapping, encrypted)?;
            return RawKey::from_bytes(&bytes)
                .ok_or_else(|| Error::Schema("stored push key has the wrong length".into()));
        }

        let key = RawKey::generate();
        let encrypted = envelope::encrypt_base64(&wrapping, key.as_bytes())?;
        prefs.set(keys::PUSH_ENC_KEY, &encrypted)?;
        tracing::info!("Generated new push encryption key");
        Ok(key)
    }

    /// Stored key or `None`. Never generates: a key the server does not know
    /// would make every later push undecryptable. Blocking.
    pub fn get_existing(&self) -> Option<RawKey> {
        match self.load_existing() {
            Ok(key) => key,
            Err(e) => {
                tracing::error!(error = %e, "Failed to load push encryption key");
                None
            }
        }
    }

    fn load_existing(&self) -> Result<Option<RawKey>> {
        let encrypted = {
            let prefs = store::lock(&self.prefs)?;
            match prefs.get(keys::PUSH_ENC_KEY) {
                Some(encrypted) => encrypted.to_string(),
                None => return Ok(None),
            }
        };
        let wrapping = self.wrapping_key.resolve()?;
        let bytes = envelope::decrypt_base64(&wrapping, &encrypted)?;
        RawKey::from_bytes(&bytes)
            .map(Some)
            .ok_or_else(|| Error::Schema("stored push key has the wrong length".into()))
    }

    /// Stable device id, generated on first use. Blocking.
    pub fn device_id(&self) -> Result<Uuid> {
        let mut prefs = store::lock(&self.prefs)?;
        if let Some(stored) = prefs.get(keys::DEVICE_ID) {
            return Uuid::parse_str(stored)
                .map_err(|e| Error::Schema(format!("stored device id: {e}")));
        }
        let id = Uuid::new_v4();
        prefs.set(keys::DEVICE_ID, &id.to_string())?;
        tracing::debug!(device_id = %id, "Generated new device ID");
        Ok(id)
    }
}
