use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::crypto::CipherMode;
use crate::key_management::HashAlgorithm;
use crate::utils::default_protected_paths;

/// Engine-wide defaults. Read-only: nothing here is ever written back.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub default_mode: CipherMode,
    pub default_hash_algorithm: HashAlgorithm,
    pub default_iterations: u32,
    pub default_threads: usize,
    pub argon2_memory_kib: u32,
    pub argon2_parallelism: u32,
    /// Files are processed in memory; anything larger fails on its own.
    pub max_file_size: Option<u64>,
    /// Directories that may never be used as a directory source.
    pub protected_paths: Vec<PathBuf>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_mode: CipherMode::Aes256Gcm,
            default_hash_algorithm: HashAlgorithm::Pbkdf2Sha256,
            default_iterations: 10,
            default_threads: 8,
            argon2_memory_kib: argon2::Params::DEFAULT_M_COST,
            argon2_parallelism: 4,
            max_file_size: Some(1024 * 1024 * 1024), // 1GB
            protected_paths: default_protected_paths(),
        }
    }
}

impl EngineConfig {
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;

        let config: EngineConfig = match path.extension().and_then(|s| s.to_str()) {
            Some("yaml") | Some("yml") => serde_yaml::from_str(&content)
                .with_context(|| format!("parsing YAML config {}", path.display()))?,
            _ => serde_json::from_str(&content)
                .with_context(|| format!("parsing JSON config {}", path.display()))?,
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.default_iterations < 1 {
            anyhow::bail!("default_iterations must be at least 1");
        }
        if self.default_threads < 1 {
            anyhow::bail!("default_threads must be at least 1");
        }
        if self.argon2_parallelism < 1 {
            anyhow::bail!("argon2_parallelism must be at least 1");
        }
        if self.argon2_memory_kib < 8 * self.argon2_parallelism {
            anyhow::bail!(
                "argon2_memory_kib must be at least 8 x argon2_parallelism ({})",
                8 * self.argon2_parallelism
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn unknown_mode_is_rejected() {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        writeln!(file, "default_mode: ecb").unwrap();
        assert!(EngineConfig::from_file(file.path()).is_err());
    }

    #[test]
    fn partial_yaml_keeps_defaults() {
        let mut file = tempfile::Builder::new().suffix(".yml").tempfile().unwrap();
        writeln!(file, "default_threads: 2\ndefault_hash_algorithm: argon2\ndefault_mode: chacha20").unwrap();
        let config = EngineConfig::from_file(file.path()).unwrap();
        assert_eq!(config.default_threads, 2);
        assert_eq!(config.default_hash_algorithm, HashAlgorithm::Argon2id);
        assert_eq!(config.default_mode, CipherMode::ChaCha20Poly1305);
        assert_eq!(config.default_iterations, 10);
    }

    #[test]
    fn json_config_is_validated() {
        let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        write!(file, r#"{{"default_threads": 0}}"#).unwrap();
        let err = EngineConfig::from_file(file.path()).unwrap_err();
        assert!(err.to_string().contains("default_threads"));
    }
}
