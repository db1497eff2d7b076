mod common;

use common::test_config;
use dircrypt::{EngineError, HashAlgorithm, KeyDerivation};
use secrecy::SecretString;

fn secret(s: &str) -> SecretString {
    SecretString::new(s.to_string())
}

#[test]
fn same_inputs_same_key() {
    let kdf = KeyDerivation::new(&test_config());
    for algorithm in [HashAlgorithm::Pbkdf2Sha256, HashAlgorithm::Argon2id] {
        let a = kdf.derive(&secret("password"), "saltsalt", algorithm, 3).unwrap();
        let b = kdf.derive(&secret("password"), "saltsalt", algorithm, 3).unwrap();
        assert!(a.same_key(&b), "{} is not deterministic", algorithm);
        assert_eq!(a.salt(), "saltsalt");
        assert_eq!(a.iterations(), 3);
        assert_eq!(a.algorithm(), algorithm);
    }
}

#[test]
fn any_changed_input_changes_the_key() {
    let kdf = KeyDerivation::new(&test_config());
    let base = kdf
        .derive(&secret("password"), "saltsalt", HashAlgorithm::Pbkdf2Sha256, 10)
        .unwrap();

    let variants = [
        kdf.derive(&secret("Password"), "saltsalt", HashAlgorithm::Pbkdf2Sha256, 10),
        kdf.derive(&secret("password"), "saltsalT", HashAlgorithm::Pbkdf2Sha256, 10),
        kdf.derive(&secret("password"), "saltsalt", HashAlgorithm::Argon2id, 10),
        kdf.derive(&secret("password"), "saltsalt", HashAlgorithm::Pbkdf2Sha256, 11),
    ];
    for variant in variants {
        assert!(!base.same_key(&variant.unwrap()));
    }
}

#[test]
fn pbkdf2_matches_reference_vector() {
    // RFC 7914 section 11: PBKDF2-HMAC-SHA256("passwd", "salt", 1)
    let material = KeyDerivation::new(&test_config())
        .derive(&secret("passwd"), "salt", HashAlgorithm::Pbkdf2Sha256, 1)
        .unwrap();
    assert_eq!(
        hex::encode(material.key()),
        "55ac046e56e3089fec1691c22544b605f94185216dde0465e68b9d57c20dacbc"
    );
}

#[test]
fn invalid_inputs_are_rejected() {
    let kdf = KeyDerivation::new(&test_config());
    let cases = [
        kdf.derive(&secret(""), "salt", HashAlgorithm::Pbkdf2Sha256, 1),
        kdf.derive(&secret("p"), "", HashAlgorithm::Pbkdf2Sha256, 1),
        kdf.derive(&secret("p"), "salt", HashAlgorithm::Pbkdf2Sha256, 0),
        kdf.derive(&secret("p"), "short", HashAlgorithm::Argon2id, 1),
    ];
    for case in cases {
        assert!(matches!(case, Err(EngineError::InvalidParameters(_))));
    }
}

#[test]
fn single_byte_salt_works_with_default_algorithm() {
    let material = KeyDerivation::new(&test_config())
        .derive(&secret("p"), "s", HashAlgorithm::Pbkdf2Sha256, 10)
        .unwrap();
    assert_eq!(material.key().len(), 32);
}
