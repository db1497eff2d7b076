use std::fmt;
use std::str::FromStr;

use argon2::{Algorithm, Argon2, Params, Version};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use tracing::debug;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::config::EngineConfig;
use crate::error::{EngineError, Result};

pub const KEY_LEN: usize = 32;

/// Argon2 refuses salts shorter than this.
pub const ARGON2_MIN_SALT_LEN: usize = 8;

/// Password hashing function used to stretch the password into a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HashAlgorithm {
    #[serde(rename = "pbkdf2", alias = "pbkdf2-sha256")]
    Pbkdf2Sha256,
    #[serde(rename = "argon2", alias = "argon2id")]
    Argon2id,
}

impl HashAlgorithm {
    pub fn identifier(&self) -> &'static str {
        match self {
            HashAlgorithm::Pbkdf2Sha256 => "pbkdf2",
            HashAlgorithm::Argon2id => "argon2",
        }
    }
}

impl fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HashAlgorithm::Pbkdf2Sha256 => write!(f, "PBKDF2-HMAC-SHA256"),
            HashAlgorithm::Argon2id => write!(f, "Argon2id"),
        }
    }
}

impl FromStr for HashAlgorithm {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pbkdf2" | "pbkdf2-sha256" => Ok(HashAlgorithm::Pbkdf2Sha256),
            "argon2" | "argon2id" => Ok(HashAlgorithm::Argon2id),
            other => Err(EngineError::UnsupportedAlgorithm(format!(
                "unknown hash algorithm '{}'",
                other
            ))),
        }
    }
}

/// A derived symmetric key together with the parameters that reproduce it.
///
/// Lives for one request only. The key bytes are wiped when the value is
/// dropped, and `Debug` never prints them.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct DerivedKeyMaterial {
    key: [u8; KEY_LEN],
    #[zeroize(skip)]
    salt: String,
    #[zeroize(skip)]
    iterations: u32,
    #[zeroize(skip)]
    algorithm: HashAlgorithm,
}

impl DerivedKeyMaterial {
    pub fn key(&self) -> &[u8; KEY_LEN] {
        &self.key
    }

    pub fn salt(&self) -> &str {
        &self.salt
    }

    pub fn iterations(&self) -> u32 {
        self.iterations
    }

    pub fn algorithm(&self) -> HashAlgorithm {
        self.algorithm
    }

    /// Constant-time comparison of the key bytes.
    pub fn same_key(&self, other: &DerivedKeyMaterial) -> bool {
        self.key
            .iter()
            .zip(other.key.iter())
            .fold(0u8, |acc, (a, b)| acc | (a ^ b))
            == 0
    }
}

impl fmt::Debug for DerivedKeyMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DerivedKeyMaterial")
            .field("key", &"[REDACTED]")
            .field("salt", &self.salt)
            .field("iterations", &self.iterations)
            .field("algorithm", &self.algorithm)
            .finish()
    }
}

/// Turns a password and salt into key material.
#[derive(Debug, Clone)]
pub struct KeyDerivation {
    argon2_memory_kib: u32,
    argon2_parallelism: u32,
}

impl Default for KeyDerivation {
    fn default() -> Self {
        Self::new(&EngineConfig::default())
    }
}

impl KeyDerivation {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            argon2_memory_kib: config.argon2_memory_kib,
            argon2_parallelism: config.argon2_parallelism,
        }
    }

    /// Deterministic: the same inputs always give the same key.
    ///
    /// Cost grows with `iterations`, so callers derive once per request and
    /// share the result across files.
    pub fn derive(
        &self,
        password: &SecretString,
        salt: &str,
        algorithm: HashAlgorithm,
        iterations: u32,
    ) -> Result<DerivedKeyMaterial> {
        let password = password.expose_secret();

        if password.is_empty() {
            return Err(EngineError::InvalidParameters(
                "password must not be empty".to_string(),
            ));
        }
        if salt.is_empty() {
            return Err(EngineError::InvalidParameters(
                "salt must not be empty".to_string(),
            ));
        }
        if iterations < 1 {
            return Err(EngineError::InvalidParameters(
                "iterations must be at least 1".to_string(),
            ));
        }

        debug!(%algorithm, iterations, "deriving key");

        let mut key = [0u8; KEY_LEN];
        match algorithm {
            HashAlgorithm::Pbkdf2Sha256 => {
                pbkdf2::pbkdf2_hmac::<Sha256>(password.as_bytes(), salt.as_bytes(), iterations, &mut key);
            }
            HashAlgorithm::Argon2id => {
                if salt.len() < ARGON2_MIN_SALT_LEN {
                    return Err(EngineError::InvalidParameters(format!(
                        "argon2 needs a salt of at least {} bytes",
                        ARGON2_MIN_SALT_LEN
                    )));
                }

                let params = Params::new(
                    self.argon2_memory_kib,
                    iterations,
                    self.argon2_parallelism,
                    Some(KEY_LEN),
                )
                .map_err(|e| EngineError::InvalidParameters(format!("argon2 parameters: {}", e)))?;

                Argon2::new(Algorithm::Argon2id, Version::V0x13, params)
                    .hash_password_into(password.as_bytes(), salt.as_bytes(), &mut key)
                    .map_err(|e| EngineError::InvalidParameters(format!("argon2: {}", e)))?;
            }
        }

        let material = DerivedKeyMaterial {
            key,
            salt: salt.to_owned(),
            iterations,
            algorithm,
        };
        key.zeroize();

        Ok(material)
    }
}
