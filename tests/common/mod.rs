//! Shared fixtures for the integration tests.

use std::fs;
use std::path::Path;

use dircrypt::{EngineConfig, EngineEvent, EventReceiver, ProgressEvent, VerboseLogEntry};

#[allow(dead_code)]
pub const PASSWORD: &str = "p";
#[allow(dead_code)]
pub const SALT: &str = "s";

/// Few iterations keep the suite fast; benches cover real costs.
#[allow(dead_code)]
pub const ITERATIONS: u32 = 10;

/// Config with a tiny Argon2 memory cost and no protected paths, since test
/// directories live under the system temp dir.
#[allow(dead_code)]
pub fn test_config() -> EngineConfig {
    EngineConfig {
        argon2_memory_kib: 64,
        argon2_parallelism: 1,
        protected_paths: Vec::new(),
        ..EngineConfig::default()
    }
}

#[allow(dead_code)]
pub fn write_file(root: &Path, relative: &str, contents: &[u8]) {
    let path = root.join(relative);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, contents).unwrap();
}

/// Relative path -> bytes for every regular file under `root`.
#[allow(dead_code)]
pub fn snapshot(root: &Path) -> Vec<(String, Vec<u8>)> {
    let mut files: Vec<_> = walkdir::WalkDir::new(root)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| {
            let relative = e
                .path()
                .strip_prefix(root)
                .unwrap()
                .to_string_lossy()
                .into_owned();
            (relative, fs::read(e.path()).unwrap())
        })
        .collect();
    files.sort();
    files
}

#[allow(dead_code)]
pub fn drain(rx: &mut EventReceiver) -> (Vec<ProgressEvent>, Vec<VerboseLogEntry>) {
    let mut progress = Vec::new();
    let mut logs = Vec::new();
    while let Ok(event) = rx.try_recv() {
        match event {
            EngineEvent::Progress(p) => progress.push(p),
            EngineEvent::Log(l) => logs.push(l),
        }
    }
    (progress, logs)
}
