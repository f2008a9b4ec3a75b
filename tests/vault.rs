use std::sync::{Arc, Mutex};

use gomuks_native::backend::{KeyRef, SoftwareBackend};
use gomuks_native::store::{Preferences, SharedPreferences, keys};
use gomuks_native::vault::CredentialVault;

fn prefs(dir: &std::path::Path) -> SharedPreferences {
    Arc::new(Mutex::new(Preferences::open(dir.join("prefs.json")).unwrap()))
}

fn key(backend: &Arc<SoftwareBackend>) -> Arc<KeyRef> {
    Arc::new(KeyRef::new(backend.clone(), "credentials"))
}

#[test]
fn test_vault_roundtrip_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let backend = Arc::new(SoftwareBackend::new());

    {
        let vault = CredentialVault::new(prefs(dir.path()), key(&backend));
        assert!(vault.get_credentials().is_none());
        vault
            .set_credentials("https://gomuks.example", "alice", "hunter2")
            .unwrap();
    }

    let vault = CredentialVault::new(prefs(dir.path()), key(&backend));
    let record = vault.get_credentials().expect("credentials stored");
    assert_eq!(record.server_url, "https://gomuks.example");
    assert_eq!(record.username, "alice");
    assert_eq!(record.password.as_str(), "hunter2");
    assert_eq!(vault.server_url().as_deref(), Some("https://gomuks.example"));
}

#[test]
fn test_password_not_stored_in_plaintext() {
    let dir = tempfile::tempdir().unwrap();
    let backend = Arc::new(SoftwareBackend::new());
    let vault = CredentialVault::new(prefs(dir.path()), key(&backend));
    vault
        .set_credentials("https://gomuks.example", "alice", "hunter2")
        .unwrap();

    let on_disk = std::fs::read_to_string(dir.path().join("prefs.json")).unwrap();
    assert!(!on_disk.contains("hunter2"));
}

#[test]
fn test_wrong_key_yields_none() {
    let dir = tempfile::tempdir().unwrap();
    let vault = CredentialVault::new(prefs(dir.path()), key(&Arc::new(SoftwareBackend::new())));
    vault
        .set_credentials("https://gomuks.example", "alice", "hunter2")
        .unwrap();

    // Same file, different key material.
    let other = CredentialVault::new(prefs(dir.path()), key(&Arc::new(SoftwareBackend::new())));
    assert!(other.get_credentials().is_none());
    assert_eq!(other.server_url().as_deref(), Some("https://gomuks.example"));
}

#[test]
fn test_missing_field_yields_none() {
    let dir = tempfile::tempdir().unwrap();
    let backend = Arc::new(SoftwareBackend::new());
    let shared = prefs(dir.path());
    let vault = CredentialVault::new(shared.clone(), key(&backend));
    vault
        .set_credentials("https://gomuks.example", "alice", "hunter2")
        .unwrap();

    shared.lock().unwrap().remove(keys::USERNAME).unwrap();
    assert!(vault.get_credentials().is_none());
}

#[test]
fn test_software_backend_keeps_secrets_across_restart() {
    use clap::Parser;
    use gomuks_native::config::Config;
    use gomuks_native::context::ShellContext;

    let dir = tempfile::tempdir().unwrap();
    let cfg = Config::try_parse_from([
        "gomuks-native",
        "--backend",
        "software",
        "--data-dir",
        dir.path().to_str().unwrap(),
        "serve",
    ])
    .unwrap();

    let push_key = {
        let ctx = ShellContext::open(&cfg).unwrap();
        ctx.vault
            .set_credentials("https://gomuks.example", "alice", "hunter2")
            .unwrap();
        ctx.push_keys.get_or_create().unwrap()
    };

    let ctx = ShellContext::open(&cfg).unwrap();
    let record = ctx.vault.get_credentials().expect("credentials after restart");
    assert_eq!(record.username, "alice");
    assert_eq!(record.password.as_str(), "hunter2");
    assert_eq!(ctx.push_keys.get_existing(), Some(push_key));
}
