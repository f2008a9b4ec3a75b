use std::path::PathBuf;
use std::time::Duration;

use crate::backend::BackendKind;
use crate::notify::{NOISY_CHANNEL_ID, SILENT_CHANNEL_ID};

pub const APP_NAME: &str = "gomuks-native";
/// Alias of the hardware-backed key that wraps credentials and the push key.
pub const CREDENTIAL_KEY_ALIAS: &str = "gomuks_credentials";
pub const REGISTRATION_INTERVAL: Duration = Duration::from_secs(12 * 60 * 60);
pub const CHANNEL_CAPACITY: usize = 64;
pub const PROMPT_TIMEOUT_SECS: u64 = 120;

pub const PREFS_FILE: &str = "preferences.json";
pub const TRAY_FILE: &str = "tray.json";
pub const KEYS_DIR: &str = "keys";
pub const LOCK_FILE: &str = "gomuks-native.lock";

#[derive(clap::Parser, Debug, Clone)]
#[command(name = APP_NAME, version, about = "Native core for the gomuks web shell")]
pub struct Config {
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,
    /// Defaults to the platform data directory.
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,
    #[arg(long, value_enum, default_value_t = BackendKind::for_build(), global = true)]
    pub backend: BackendKind,
    #[arg(long, default_value = "/dev/tpmrm0", global = true)]
    pub tpm_device: String,
    #[arg(long, default_value = "pinentry", global = true)]
    pub pinentry: String,
    #[arg(long, default_value = NOISY_CHANNEL_ID, global = true)]
    pub noisy_channel: String,
    #[arg(long, default_value = SILENT_CHANNEL_ID, global = true)]
    pub silent_channel: String,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(clap::Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Run the bridge and push queue over JSON lines on stdin/stdout.
    Serve,
    /// Store server URL and username; the password is read with pinentry.
    SetCredentials {
        server_url: String,
        username: String,
        /// Error to display in the prompt (e.g. from a failed login).
        #[arg(long)]
        error: Option<String>,
    },
    /// Process one push: a JSON object of transport fields, from FILE or stdin.
    Push {
        #[arg(long)]
        file: Option<PathBuf>,
    },
    /// Store a new push token for the next session.
    RegisterToken { token: String },
    /// Print the web client URL that opens a matrix: or matrix.to link.
    OpenUri { target: String },
    /// Delete stored credentials, keys and notifications, then exit.
    Wipe,
}

impl BackendKind {
    pub const fn for_build() -> Self {
        if cfg!(feature = "tpm") {
            BackendKind::Tpm
        } else {
            BackendKind::Software
        }
    }
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::*;

    #[test]
    fn test_parse_global_flags_after_subcommand() {
        let cfg = Config::try_parse_from([APP_NAME, "serve", "-vv", "--backend", "software"]).unwrap();
        assert_eq!(cfg.command, Command::Serve);
        assert_eq!(cfg.verbose, 2);
        assert_eq!(cfg.backend, BackendKind::Software);
        assert_eq!(cfg.noisy_channel, NOISY_CHANNEL_ID);
    }

    #[test]
    fn test_parse_set_credentials() {
        let cfg = Config::try_parse_from([
            APP_NAME,
            "set-credentials",
            "https://gomuks.example",
            "alice",
            "--error",
            "bad password",
        ])
        .unwrap();
        assert_eq!(
            cfg.command,
            Command::SetCredentials {
                server_url: "https://gomuks.example".into(),
                username: "alice".into(),
                error: Some("bad password".into()),
            }
        );
    }
}
