//! Read-only directory enumeration.
//!
//! Symbolic links below the root are never followed. They are recorded in
//! [`DirectoryScan::skipped`] together with sockets, FIFOs and other special
//! files, so a link cycle can never be entered.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;
use walkdir::WalkDir;

use crate::error::{EngineError, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScannedFile {
    pub path: PathBuf,
    pub size: u64,
}

/// An entry the walker could not read. Its siblings are still enumerated.
#[derive(Debug)]
pub struct ScanEntryError {
    pub path: PathBuf,
    pub error: EngineError,
}

#[derive(Debug, Default)]
pub struct DirectoryScan {
    pub root: PathBuf,
    pub files: Vec<ScannedFile>,
    pub folders: Vec<PathBuf>,
    pub skipped: Vec<PathBuf>,
    pub errors: Vec<ScanEntryError>,
    pub total_size: u64,
}

impl DirectoryScan {
    pub fn file_count(&self) -> usize {
        self.files.len()
    }

    /// Sub-folders below the root; the root itself is not counted.
    pub fn folder_count(&self) -> usize {
        self.folders.len()
    }
}

/// Pre-flight summary shown before a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationalInfo {
    pub operating_system: String,
    pub file_count: usize,
    pub folder_count: usize,
    pub total_size_bytes: u64,
    pub unreadable_entries: usize,
    pub skipped_links: usize,
}

impl OperationalInfo {
    pub fn from_scan(scan: &DirectoryScan) -> Self {
        Self {
            operating_system: std::env::consts::OS.to_string(),
            file_count: scan.file_count(),
            folder_count: scan.folder_count(),
            total_size_bytes: scan.total_size,
            unreadable_entries: scan.errors.len(),
            skipped_links: scan.skipped.len(),
        }
    }

    pub fn for_file(size: u64) -> Self {
        Self {
            operating_system: std::env::consts::OS.to_string(),
            file_count: 1,
            folder_count: 0,
            total_size_bytes: size,
            unreadable_entries: 0,
            skipped_links: 0,
        }
    }
}

/// Walks `root` recursively. Fails only if the root itself is unusable.
pub fn scan_directory(root: &Path) -> Result<DirectoryScan> {
    let meta = std::fs::metadata(root).map_err(|e| EngineError::from_io(root, e))?;
    if !meta.is_dir() {
        return Err(EngineError::InvalidParameters(format!(
            "{} is not a directory",
            root.display()
        )));
    }

    let mut scan = DirectoryScan {
        root: root.to_path_buf(),
        ..Default::default()
    };

    let walker = WalkDir::new(root)
        .follow_links(false)
        .min_depth(1)
        .sort_by_file_name();

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                let path = err.path().unwrap_or(root).to_path_buf();
                let error = match err.into_io_error() {
                    Some(io) => EngineError::from_io(&path, io),
                    None => EngineError::InvalidParameters(format!(
                        "filesystem loop at {}",
                        path.display()
                    )),
                };
                debug!(path = %path.display(), %error, "unreadable entry");
                scan.errors.push(ScanEntryError { path, error });
                continue;
            }
        };

        let file_type = entry.file_type();
        if file_type.is_dir() {
            scan.folders.push(entry.into_path());
        } else if file_type.is_file() {
            match entry.metadata() {
                Ok(meta) => {
                    scan.total_size += meta.len();
                    scan.files.push(ScannedFile {
                        path: entry.into_path(),
                        size: meta.len(),
                    });
                }
                Err(err) => {
                    let path = entry.into_path();
                    let error = match err.into_io_error() {
                        Some(io) => EngineError::from_io(&path, io),
                        None => EngineError::PathNotFound(path.clone()),
                    };
                    scan.errors.push(ScanEntryError { path, error });
                }
            }
        } else {
            scan.skipped.push(entry.into_path());
        }
    }

    debug!(
        root = %root.display(),
        files = scan.files.len(),
        folders = scan.folders.len(),
        errors = scan.errors.len(),
        "scan complete"
    );

    Ok(scan)
}

/// Metadata for a single-file source.
pub fn scan_file(path: &Path) -> Result<ScannedFile> {
    let meta = std::fs::metadata(path).map_err(|e| EngineError::from_io(path, e))?;
    if !meta.is_file() {
        return Err(EngineError::InvalidParameters(format!(
            "{} is not a regular file",
            path.display()
        )));
    }
    Ok(ScannedFile {
        path: path.to_path_buf(),
        size: meta.len(),
    })
}
