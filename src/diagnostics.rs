use std::path::Path;

use crate::backend::BackendKind;
use crate::config::{Command, Config};

pub fn check(cfg: &Config, data_dir: &Path) -> anyhow::Result<()> {
    let mut errors: Vec<String> = Vec::new();

    // Check 1: data dir writable
    if let Err(e) = std::fs::create_dir_all(data_dir).and_then(|()| tempfile::tempfile_in(data_dir)) {
        errors.push(format!(
            "cannot write to data dir {}: {e}\n  \
             → pass --data-dir or fix the directory permissions",
            data_dir.display()
        ));
    }

    // Check 2: TPM device readable (commands that touch keys)
    let needs_keys = matches!(
        cfg.command,
        Command::Serve | Command::SetCredentials { .. } | Command::Push { .. }
    );
    if needs_keys && cfg.backend == BackendKind::Tpm {
        if let Err(e) = std::fs::OpenOptions::new().read(true).open(&cfg.tpm_device) {
            errors.push(format!(
                "cannot open {}: {e}\n  \
                 → add yourself to the 'tss' group: sudo usermod -aG tss $USER\n  \
                 → or run with --backend software (keys stored unprotected on disk)",
                cfg.tpm_device
            ));
        }
    }

    // Check 3: pinentry binary found (interactive credential entry only)
    if matches!(cfg.command, Command::SetCredentials { .. }) {
        if let Err(e) = std::process::Command::new(&cfg.pinentry)
            .arg("--version")
            .output()
        {
            errors.push(format!(
                "pinentry binary not found: '{}': {e}\n  \
                 → install pinentry or pass --pinentry",
                cfg.pinentry
            ));
        }
    }

    if errors.is_empty() {
        return Ok(());
    }

    for err in &errors {
        eprintln!("ERROR: {err}");
    }
    anyhow::bail!("{} preflight check(s) failed", errors.len());
}
