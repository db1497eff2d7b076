use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use crate::config::EngineConfig;
use crate::crypto::CipherMode;
use crate::error::{EngineError, Result};
use crate::key_management::HashAlgorithm;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Encrypt,
    Decrypt,
}

impl Operation {
    pub fn past_tense(&self) -> &'static str {
        match self {
            Operation::Encrypt => "encrypted",
            Operation::Decrypt => "decrypted",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::Encrypt => write!(f, "encrypt"),
            Operation::Decrypt => write!(f, "decrypt"),
        }
    }
}

impl FromStr for Operation {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "encrypt" => Ok(Operation::Encrypt),
            "decrypt" => Ok(Operation::Decrypt),
            other => Err(EngineError::InvalidParameters(format!(
                "unknown operation '{}'",
                other
            ))),
        }
    }
}

/// One encrypt or decrypt request. Consumed by the engine; the password is
/// wiped when the request is dropped.
#[derive(Debug)]
pub struct OperationRequest {
    pub source: PathBuf,
    /// Output directory. Defaults to the source directory (or the file's parent).
    pub target: Option<PathBuf>,
    pub password: SecretString,
    pub salt: String,
    pub operation: Operation,
    pub mode: CipherMode,
    pub hash_algorithm: HashAlgorithm,
    pub iterations: u32,
    /// Worker count; only directory runs use more than one.
    pub threads: usize,
    pub delete_source: bool,
    pub anonymize: bool,
    pub dry_run: bool,
    pub verbose: bool,
}

impl OperationRequest {
    pub fn new(
        source: impl Into<PathBuf>,
        password: impl Into<String>,
        salt: impl Into<String>,
        operation: Operation,
    ) -> Self {
        Self::from_config(&EngineConfig::default(), source, password, salt, operation)
    }

    pub fn from_config(
        config: &EngineConfig,
        source: impl Into<PathBuf>,
        password: impl Into<String>,
        salt: impl Into<String>,
        operation: Operation,
    ) -> Self {
        Self {
            source: source.into(),
            target: None,
            password: SecretString::new(password.into()),
            salt: salt.into(),
            operation,
            mode: config.default_mode,
            hash_algorithm: config.default_hash_algorithm,
            iterations: config.default_iterations,
            threads: config.default_threads,
            delete_source: false,
            anonymize: false,
            dry_run: false,
            verbose: false,
        }
    }

    pub fn with_target(mut self, target: impl Into<PathBuf>) -> Self {
        self.target = Some(target.into());
        self
    }

    pub fn with_mode(mut self, mode: CipherMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_hash_algorithm(mut self, algorithm: HashAlgorithm) -> Self {
        self.hash_algorithm = algorithm;
        self
    }

    pub fn with_iterations(mut self, iterations: u32) -> Self {
        self.iterations = iterations;
        self
    }

    pub fn with_threads(mut self, threads: usize) -> Self {
        self.threads = threads;
        self
    }

    pub fn with_delete_source(mut self, delete_source: bool) -> Self {
        self.delete_source = delete_source;
        self
    }

    pub fn with_anonymize(mut self, anonymize: bool) -> Self {
        self.anonymize = anonymize;
        self
    }

    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.password.expose_secret().is_empty() {
            return Err(EngineError::InvalidParameters("password must not be empty".to_string()));
        }
        if self.salt.is_empty() {
            return Err(EngineError::InvalidParameters("salt must not be empty".to_string()));
        }
        if self.iterations < 1 {
            return Err(EngineError::InvalidParameters("iterations must be at least 1".to_string()));
        }
        if self.threads < 1 {
            return Err(EngineError::InvalidParameters("threads must be at least 1".to_string()));
        }
        Ok(())
    }

    /// The non-secret switches every worker needs.
    pub fn settings(&self) -> RunSettings {
        RunSettings {
            operation: self.operation,
            mode: self.mode,
            delete_source: self.delete_source,
            anonymize: self.anonymize,
            dry_run: self.dry_run,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunSettings {
    pub operation: Operation,
    pub mode: CipherMode,
    pub delete_source: bool,
    pub anonymize: bool,
    pub dry_run: bool,
}

/// A single file to process.
///
/// `target` is the default output path. The final name may still change:
/// anonymized encryption replaces it, and decrypting an envelope that carries
/// an embedded name restores that name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileTask {
    pub source: PathBuf,
    pub target: PathBuf,
    pub size: u64,
}
