mod common;

use std::sync::OnceLock;

use common::test_config;
use dircrypt::crypto::{self, anonymized_file_name, HEADER_LEN, TAG_LEN};
use dircrypt::{CipherMode, DerivedKeyMaterial, EngineError, HashAlgorithm, KeyDerivation};
use proptest::prelude::*;
use secrecy::SecretString;

fn key(password: &str) -> DerivedKeyMaterial {
    KeyDerivation::new(&test_config())
        .derive(
            &SecretString::new(password.to_string()),
            "s",
            HashAlgorithm::Pbkdf2Sha256,
            10,
        )
        .unwrap()
}

fn shared_key() -> &'static DerivedKeyMaterial {
    static KEY: OnceLock<DerivedKeyMaterial> = OnceLock::new();
    KEY.get_or_init(|| key("p"))
}

fn any_mode() -> impl Strategy<Value = CipherMode> {
    prop_oneof![Just(CipherMode::Aes256Gcm), Just(CipherMode::ChaCha20Poly1305)]
}

proptest! {
    #[test]
    fn decode_reverses_encode(content in proptest::collection::vec(any::<u8>(), 0..4096), mode in any_mode()) {
        let envelope = crypto::encode(&content, shared_key(), mode).unwrap();
        prop_assert_eq!(envelope.len(), HEADER_LEN + content.len() + TAG_LEN);

        let decoded = crypto::decode(&envelope, shared_key(), mode).unwrap();
        prop_assert_eq!(decoded.content, content);
        prop_assert!(decoded.original_name.is_none());
    }

    #[test]
    fn embedded_name_survives(content in proptest::collection::vec(any::<u8>(), 0..512), name in "[a-zA-Z0-9 ._-]{1,40}") {
        let envelope = crypto::encode_with_name(&content, Some(&name), shared_key(), CipherMode::Aes256Gcm).unwrap();
        let decoded = crypto::decode(&envelope, shared_key(), CipherMode::Aes256Gcm).unwrap();
        prop_assert_eq!(decoded.content, content);
        prop_assert_eq!(decoded.original_name, Some(name));
    }

    #[test]
    fn any_flipped_byte_is_detected(
        content in proptest::collection::vec(any::<u8>(), 0..256),
        position in any::<prop::sample::Index>(),
        bit in 0u8..8,
        mode in any_mode(),
    ) {
        let mut envelope = crypto::encode_with_name(&content, Some("a.txt"), shared_key(), mode).unwrap();
        let at = position.index(envelope.len());
        envelope[at] ^= 1 << bit;

        let result = crypto::decode(&envelope, shared_key(), mode);
        prop_assert!(matches!(result, Err(EngineError::DecryptionFailed(_))));
    }
}

#[test]
fn wrong_password_fails() {
    let envelope = crypto::encode(b"secret", shared_key(), CipherMode::Aes256Gcm).unwrap();
    let result = crypto::decode(&envelope, &key("q"), CipherMode::Aes256Gcm);
    assert!(matches!(result, Err(EngineError::DecryptionFailed(_))));
}

#[test]
fn mode_mismatch_fails() {
    let envelope = crypto::encode(b"secret", shared_key(), CipherMode::ChaCha20Poly1305).unwrap();
    let result = crypto::decode(&envelope, shared_key(), CipherMode::Aes256Gcm);
    assert!(matches!(result, Err(EngineError::DecryptionFailed(_))));
}

#[test]
fn truncated_envelopes_fail() {
    let envelope = crypto::encode(b"secret", shared_key(), CipherMode::Aes256Gcm).unwrap();
    for len in [0, 4, HEADER_LEN, HEADER_LEN + TAG_LEN - 1, envelope.len() - 1] {
        let result = crypto::decode(&envelope[..len], shared_key(), CipherMode::Aes256Gcm);
        assert!(matches!(result, Err(EngineError::DecryptionFailed(_))), "len {}", len);
    }
}

#[test]
fn nonces_are_fresh() {
    let a = crypto::encode(b"same", shared_key(), CipherMode::Aes256Gcm).unwrap();
    let b = crypto::encode(b"same", shared_key(), CipherMode::Aes256Gcm).unwrap();
    assert_ne!(a, b);
}

#[test]
fn anonymized_names_are_stable_and_keyed() {
    let first = anonymized_file_name(shared_key(), "report.pdf");
    assert_eq!(first, anonymized_file_name(shared_key(), "report.pdf"));
    assert_ne!(first, anonymized_file_name(shared_key(), "report.pdf.bak"));
    assert_ne!(first, anonymized_file_name(&key("q"), "report.pdf"));
    assert!(first.ends_with(".enom"));
    assert_eq!(first.len(), 32 + ".enom".len());
    assert!(!first.contains("report"));
}
