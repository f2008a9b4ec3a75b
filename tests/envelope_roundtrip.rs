use std::sync::Arc;

use gomuks_native::backend::{KeyRef, RawKey, SecretKey, SoftwareBackend};
use gomuks_native::envelope::{self, EnvelopeError};

fn bound_key() -> SecretKey {
    let backend = Arc::new(SoftwareBackend::new());
    KeyRef::new(backend, "credentials").resolve().unwrap()
}

#[test]
fn test_roundtrip_bytes() {
    let key = bound_key();
    let messages: [&[u8]; 4] = [b"", b"x", b"hello world", &[0u8; 4096]];
    for message in messages {
        let sealed = envelope::encrypt(&key, message).unwrap();
        assert_eq!(envelope::decrypt(&key, &sealed).unwrap(), message);
    }
}

#[test]
fn test_fresh_iv_per_call() {
    let key = SecretKey::exportable(&RawKey::generate());
    let a = envelope::encrypt(&key, b"same message").unwrap();
    let b = envelope::encrypt(&key, b"same message").unwrap();
    assert_ne!(a, b);
    assert_ne!(a[..12], b[..12], "IV must differ");
    assert_eq!(envelope::decrypt(&key, &a).unwrap(), b"same message");
    assert_eq!(envelope::decrypt(&key, &b).unwrap(), b"same message");
}

#[test]
fn test_flipped_last_byte_fails() {
    let key = bound_key();
    let mut sealed = envelope::encrypt(&key, b"secret").unwrap();
    let last = sealed.len() - 1;
    sealed[last] ^= 0x01;
    assert!(matches!(
        envelope::decrypt(&key, &sealed),
        Err(EnvelopeError::AuthenticationFailure)
    ));
}

#[test]
fn test_wrong_key_fails() {
    let sealed = envelope::encrypt_str(&bound_key(), "hunter2").unwrap();
    assert!(matches!(
        envelope::decrypt_str(&bound_key(), &sealed),
        Err(EnvelopeError::AuthenticationFailure)
    ));
}

#[test]
fn test_text_roundtrip_through_base64() {
    let key = SecretKey::exportable(&RawKey::generate());
    let sealed = envelope::encrypt_str(&key, "pässwörd").unwrap();
    assert_eq!(envelope::decrypt_str(&key, &sealed).unwrap(), "pässwörd");
}

#[test]
fn test_exportable_key_matches_raw_bytes() {
    // A key rebuilt from the same raw bytes opens the envelope.
    let raw = RawKey::generate();
    let sealed = envelope::encrypt(&SecretKey::exportable(&raw), b"push").unwrap();
    let copy = RawKey::from_bytes(raw.as_bytes()).unwrap();
    assert_eq!(envelope::decrypt(&SecretKey::exportable(&copy), &sealed).unwrap(), b"push");
}
