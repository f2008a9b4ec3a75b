#![cfg(feature = "tpm")]

use std::sync::Arc;

use gomuks_native::backend::tpm::{TpmBackend, TpmContext};
use gomuks_native::backend::{KeyRef, SecretBackend};
use gomuks_native::envelope;

fn test_device() -> Option<String> {
    let device = std::env::var("GOMUKS_NATIVE_TEST_TPM").unwrap_or_else(|_| "/dev/tpmrm0".into());
    // Skip when no context can be opened.
    match TpmContext::new(&device) {
        Ok(_) => Some(device),
        Err(e) => {
            println!("SKIP: TPM not accessible ({e}), skipping TPM smoke tests");
            None
        }
    }
}

#[test]
fn test_sealed_key_survives_new_backend() {
    let Some(device) = test_device() else { return };
    let dir = tempfile::tempdir().unwrap();

    let sealed = {
        let backend = Arc::new(TpmBackend::new(&device, dir.path()));
        let key = KeyRef::new(backend, "smoke").resolve().expect("seal new key");
        envelope::encrypt_str(&key, "hunter2").unwrap()
    };
    assert!(dir.path().join("smoke.blob").exists());

    // A fresh backend unseals the same blob.
    let backend = Arc::new(TpmBackend::new(&device, dir.path()));
    let key = KeyRef::new(backend, "smoke").resolve().expect("unseal key");
    assert_eq!(envelope::decrypt_str(&key, &sealed).unwrap(), "hunter2");
}

#[test]
fn test_get_or_create_is_idempotent() {
    let Some(device) = test_device() else { return };
    let dir = tempfile::tempdir().unwrap();
    let backend = TpmBackend::new(&device, dir.path());

    let a = backend.get_or_create("alias").unwrap();
    let b = backend.get_or_create("alias").unwrap();
    assert_eq!(a, b);
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
}

#[test]
fn test_unreachable_device_is_unavailable() {
    let dir = tempfile::tempdir().unwrap();
    let backend = TpmBackend::new("/nonexistent/tpm", dir.path());
    assert!(matches!(
        backend.get_or_create("alias"),
        Err(gomuks_native::backend::BackendError::Unavailable(_))
    ));
}
