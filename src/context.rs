use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use crate::backend::{self, KeyRef, SecretBackend};
use crate::bridge::{BridgeDeps, RegistrationThrottle};
use crate::config::{self, Config};
use crate::error::{Error, Result};
use crate::notify::ChannelConfig;
use crate::push::{PushKeyManager, TokenPublisher};
use crate::store::Preferences;
use crate::vault::CredentialVault;

/// Everything the process shares, built once at startup and passed down.
pub struct ShellContext {
    pub data_dir: PathBuf,
    pub vault: Arc<CredentialVault>,
    pub push_keys: Arc<PushKeyManager>,
    pub throttle: Arc<RegistrationThrottle>,
    pub tokens: Arc<TokenPublisher>,
    pub channels: ChannelConfig,
}

impl ShellContext {
    /// Open the data dir and backend selected in `cfg`. Blocking.
    pub fn open(cfg: &Config) -> Result<Self> {
        let data_dir = data_dir(cfg)?;
        let backend = backend::open(cfg.backend, &cfg.tpm_device, &data_dir.join(config::KEYS_DIR))?;
        let channels = ChannelConfig {
            noisy: cfg.noisy_channel.clone(),
            silent: cfg.silent_channel.clone(),
        };
        Self::with_backend(data_dir, backend, channels)
    }

    pub fn with_backend(
        data_dir: PathBuf,
        backend: Arc<dyn SecretBackend>,
        channels: ChannelConfig,
    ) -> Result<Self> {
        std::fs::create_dir_all(&data_dir)?;
        let prefs = Arc::new(Mutex::new(Preferences::open(data_dir.join(config::PREFS_FILE))?));
        let credential_key = Arc::new(KeyRef::new(backend, config::CREDENTIAL_KEY_ALIAS));
        let tokens = TokenPublisher::load(prefs.clone())?;
        tracing::debug!(data_dir = %data_dir.display(), "Shell context ready");

        Ok(Self {
            vault: Arc::new(CredentialVault::new(prefs.clone(), credential_key.clone())),
            push_keys: Arc::new(PushKeyManager::new(prefs.clone(), credential_key.clone())),
            throttle: Arc::new(RegistrationThrottle::new(config::REGISTRATION_INTERVAL)),
            tokens: Arc::new(tokens),
            data_dir,
            channels,
        })
    }

    pub fn tray_path(&self) -> PathBuf {
        self.data_dir.join(config::TRAY_FILE)
    }

    pub fn bridge_deps(&self) -> BridgeDeps {
        BridgeDeps {
            vault: self.vault.clone(),
            push_keys: self.push_keys.clone(),
            throttle: self.throttle.clone(),
        }
    }
}

pub fn data_dir(cfg: &Config) -> Result<PathBuf> {
    if let Some(dir) = &cfg.data_dir {
        return Ok(dir.clone());
    }
    directories::ProjectDirs::from("", "", config::APP_NAME)
        .map(|dirs| dirs.data_dir().to_path_buf())
        .ok_or_else(|| Error::Internal("cannot determine XDG data dir".into()))
}

/// Runtime dir when available so the lock disappears with the session.
pub fn lock_path(data_dir: &Path) -> PathBuf {
    std::env::var("XDG_RUNTIME_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| data_dir.to_path_buf())
        .join(config::LOCK_FILE)
}
