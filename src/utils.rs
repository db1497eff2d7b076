use anyhow::Result;
use std::ffi::OsString;
use std::path::{Path, PathBuf};

use crate::crypto::ENCRYPTED_EXTENSION;

pub fn default_protected_paths() -> Vec<PathBuf> {
    let roots: &[&str] = if cfg!(windows) {
        &["C:\\", "C:\\Windows", "C:\\Program Files", "C:\\Users"]
    } else {
        &[
            "/", "/root", "/home", "/boot", "/usr", "/lib", "/lib64", "/lib32", "/libx32", "/mnt",
            "/dev", "/sys", "/run", "/bin", "/sbin", "/proc", "/media", "/var", "/etc", "/srv",
            "/opt",
        ]
    };
    roots.iter().map(PathBuf::from).collect()
}

/// Exact match against the protected list; subdirectories are allowed.
pub fn is_protected_location(path: &Path, protected: &[PathBuf]) -> bool {
    let resolved = std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
    protected.iter().any(|p| p == &resolved || p == path)
}

pub fn has_encrypted_extension(path: &Path) -> bool {
    path.extension().map_or(false, |ext| ext == ENCRYPTED_EXTENSION)
}

/// `report.pdf` -> `report.pdf.enom`
pub fn encrypted_file_name(name: &std::ffi::OsStr) -> OsString {
    let mut out = name.to_os_string();
    out.push(".");
    out.push(ENCRYPTED_EXTENSION);
    out
}

/// `report.pdf.enom` -> `report.pdf`; names without the extension pass through.
pub fn decrypted_file_name(name: &std::ffi::OsStr) -> OsString {
    let path = Path::new(name);
    if has_encrypted_extension(path) {
        if let Some(stem) = path.file_stem() {
            return stem.to_os_string();
        }
    }
    name.to_os_string()
}

/// Re-roots `path` from `source_root` onto `target_root`.
pub fn map_into_target(path: &Path, source_root: &Path, target_root: &Path) -> PathBuf {
    match path.strip_prefix(source_root) {
        Ok(relative) => target_root.join(relative),
        Err(_) => target_root.join(path.file_name().unwrap_or_default()),
    }
}

/// Hidden sibling used while an output file is being written.
pub fn partial_path(target: &Path) -> PathBuf {
    let name = target
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    target.with_file_name(format!(".{}.{}.partial", name, uuid::Uuid::new_v4().simple()))
}

/// `encrypted` -> `Encrypted`
pub fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Installs a global fmt subscriber for front ends embedding the engine.
///
/// `RUST_LOG` takes precedence over `level`. Fails if a subscriber is
/// already installed.
pub fn setup_logging(level: &str, no_color: bool) -> Result<()> {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let env_filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(level)?,
    };

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_ansi(!no_color)
        .with_target(false);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init()?;

    Ok(())
}
