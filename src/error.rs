//! Error taxonomy shared by every stage of a run.
//!
//! Request-level errors (`InvalidParameters`, `UnsupportedAlgorithm`) stop a
//! run before any file is touched. Everything else is recorded against the
//! file or directory entry it happened on and never aborts the batch.

use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    /// Malformed request or configuration.
    #[error("invalid parameters: {0}")]
    InvalidParameters(String),

    #[error("unsupported algorithm: {0}")]
    UnsupportedAlgorithm(String),

    #[error("path not found: {}", .0.display())]
    PathNotFound(PathBuf),

    #[error("permission denied: {}", .0.display())]
    PermissionDenied(PathBuf),

    /// Wrong key, wrong mode, or a truncated/tampered envelope.
    #[error("decryption failed: {0}")]
    DecryptionFailed(String),

    #[error("encryption failed: {0}")]
    EncryptionFailed(String),

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl EngineError {
    pub fn from_io(path: &Path, err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::NotFound => EngineError::PathNotFound(path.to_path_buf()),
            io::ErrorKind::PermissionDenied => EngineError::PermissionDenied(path.to_path_buf()),
            _ => EngineError::Io {
                path: path.to_path_buf(),
                source: err,
            },
        }
    }

    /// True for errors that reject the request as a whole.
    pub fn is_request_error(&self) -> bool {
        matches!(
            self,
            EngineError::InvalidParameters(_) | EngineError::UnsupportedAlgorithm(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;
