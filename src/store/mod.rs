pub mod prefs;

use std::sync::{Arc, Mutex, MutexGuard};

pub use prefs::Preferences;

pub type SharedPreferences = Arc<Mutex<Preferences>>;

pub fn lock(prefs: &SharedPreferences) -> Result<MutexGuard<'_, Preferences>, StoreError> {
    prefs.lock().map_err(|_| StoreError::Poisoned)
}

/// Preference keys.
pub mod keys {
    pub const SERVER_URL: &str = "server_url";
    pub const USERNAME: &str = "username";
    /// base64 envelope under the credential key
    pub const PASSWORD: &str = "password";
    pub const DEVICE_ID: &str = "device_id";
    /// base64 envelope of the raw push key under the credential key
    pub const PUSH_ENC_KEY: &str = "push_enc_key";
    pub const PUSH_TOKEN: &str = "push_token";
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("I/O: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialize: {0}")]
    Serialization(String),
    #[error("Corrupt: {0}")]
    Corrupt(String),
    #[error("Preferences lock poisoned")]
    Poisoned,
}
