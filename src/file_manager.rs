use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use tokio::fs;
use tokio::io::AsyncWriteExt;

use crate::config::EngineConfig;
use crate::crypto::{self, anonymized_file_name};
use crate::error::{EngineError, Result};
use crate::events::Reporter;
use crate::key_management::DerivedKeyMaterial;
use crate::request::{FileTask, Operation, RunSettings};
use crate::utils::{capitalize, partial_path};

/// Applies one request to one file.
pub struct FileManager {
    max_file_size: Option<u64>,
}

/// What happened to a single [`FileTask`].
#[derive(Debug)]
pub struct FileOutcome {
    pub source: PathBuf,
    /// Final output path. Set on success, and on a dry run to the path that
    /// would have been written.
    pub output: Option<PathBuf>,
    pub dry_run: bool,
    pub source_deleted: bool,
    pub error: Option<EngineError>,
}

impl FileOutcome {
    fn failed(task: &FileTask, dry_run: bool, error: EngineError) -> Self {
        Self {
            source: task.source.clone(),
            output: None,
            dry_run,
            source_deleted: false,
            error: Some(error),
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

impl FileManager {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            max_file_size: config.max_file_size,
        }
    }

    pub async fn create_dir_all(&self, path: &Path) -> Result<()> {
        fs::create_dir_all(path)
            .await
            .map_err(|e| EngineError::from_io(path, e))
    }

    /// Never panics and never aborts the caller: every failure is folded into
    /// the returned outcome and reported at error level.
    pub async fn process(
        &self,
        task: &FileTask,
        material: &Arc<DerivedKeyMaterial>,
        settings: &RunSettings,
        reporter: &Reporter,
    ) -> FileOutcome {
        match self.transform(task, material, settings, reporter).await {
            Ok(outcome) => outcome,
            Err(error) => {
                reporter.error(format!(
                    "Failed to {} {}: {}",
                    settings.operation,
                    task.source.display(),
                    error
                ));
                FileOutcome::failed(task, settings.dry_run, error)
            }
        }
    }

    async fn transform(
        &self,
        task: &FileTask,
        material: &Arc<DerivedKeyMaterial>,
        settings: &RunSettings,
        reporter: &Reporter,
    ) -> Result<FileOutcome> {
        let source = task.source.as_path();

        let meta = fs::metadata(source)
            .await
            .map_err(|e| EngineError::from_io(source, e))?;
        if !meta.is_file() {
            return Err(EngineError::InvalidParameters(format!(
                "{} is not a regular file",
                source.display()
            )));
        }
        if let Some(limit) = self.max_file_size {
            if meta.len() > limit {
                return Err(EngineError::InvalidParameters(format!(
                    "{} is {} bytes, larger than the {} byte limit",
                    source.display(),
                    meta.len(),
                    limit
                )));
            }
        }

        reporter.info(format!("Reading {}", source.display()));
        let data = fs::read(source)
            .await
            .map_err(|e| EngineError::from_io(source, e))?;

        let original_name = source.file_name().and_then(|n| n.to_str()).map(str::to_owned);

        let (target, output) = match settings.operation {
            Operation::Encrypt => {
                let embedded = if settings.anonymize {
                    Some(original_name.ok_or_else(|| {
                        EngineError::InvalidParameters(format!(
                            "cannot anonymize {}: file name is not valid UTF-8",
                            source.display()
                        ))
                    })?)
                } else {
                    None
                };

                let target = match &embedded {
                    Some(name) => task
                        .target
                        .with_file_name(anonymized_file_name(material, name)),
                    None => task.target.clone(),
                };

                if settings.dry_run {
                    (target, None)
                } else {
                    let material = Arc::clone(material);
                    let mode = settings.mode;
                    let sealed = tokio::task::spawn_blocking(move || {
                        crypto::encode_with_name(&data, embedded.as_deref(), &material, mode)
                    })
                    .await
                    .map_err(|e| EngineError::EncryptionFailed(format!("worker task failed: {}", e)))??;
                    (target, Some(sealed))
                }
            }
            Operation::Decrypt => {
                // Dry runs authenticate too.
                let material = Arc::clone(material);
                let mode = settings.mode;
                let decoded = tokio::task::spawn_blocking(move || crypto::decode(&data, &material, mode))
                    .await
                    .map_err(|e| EngineError::DecryptionFailed(format!("worker task failed: {}", e)))??;

                let target = match &decoded.original_name {
                    Some(name) if is_single_component(name) => task.target.with_file_name(name),
                    Some(name) => {
                        return Err(EngineError::DecryptionFailed(format!(
                            "embedded file name {:?} is not a plain file name",
                            name
                        )))
                    }
                    None => task.target.clone(),
                };

                if settings.dry_run {
                    (target, None)
                } else {
                    (target, Some(decoded.content))
                }
            }
        };

        if target == task.source {
            return Err(EngineError::InvalidParameters(format!(
                "output would overwrite the source {}",
                source.display()
            )));
        }

        let bytes = match output {
            Some(bytes) => bytes,
            None => {
                check_writable(&target).await?;
                reporter.info(format!(
                    "Dry run: {} -> {}",
                    source.display(),
                    target.display()
                ));
                return Ok(FileOutcome {
                    source: task.source.clone(),
                    output: Some(target),
                    dry_run: true,
                    source_deleted: false,
                    error: None,
                });
            }
        };

        write_verified(&target, &bytes).await?;
        reporter.info(format!(
            "{} {} -> {}",
            capitalize(settings.operation.past_tense()),
            source.display(),
            target.display()
        ));

        let mut source_deleted = false;
        if settings.delete_source {
            fs::remove_file(source)
                .await
                .map_err(|e| EngineError::from_io(source, e))?;
            source_deleted = true;
            reporter.info(format!("Deleted source {}", source.display()));
        }

        Ok(FileOutcome {
            source: task.source.clone(),
            output: Some(target),
            dry_run: false,
            source_deleted,
            error: None,
        })
    }
}

/// Writes through a hidden sibling, renames it into place and checks the
/// final length. The partial file is removed on any failure.
async fn write_verified(target: &Path, bytes: &[u8]) -> Result<()> {
    let partial = partial_path(target);

    let written: Result<()> = async {
        let mut file = fs::File::create(&partial)
            .await
            .map_err(|e| EngineError::from_io(&partial, e))?;
        file.write_all(bytes)
            .await
            .map_err(|e| EngineError::from_io(&partial, e))?;
        file.sync_all()
            .await
            .map_err(|e| EngineError::from_io(&partial, e))?;
        drop(file);
        fs::rename(&partial, target)
            .await
            .map_err(|e| EngineError::from_io(target, e))
    }
    .await;

    if let Err(err) = written {
        let _ = fs::remove_file(&partial).await;
        return Err(err);
    }

    let on_disk = fs::metadata(target)
        .await
        .map_err(|e| EngineError::from_io(target, e))?
        .len();
    if on_disk != bytes.len() as u64 {
        return Err(EngineError::Io {
            path: target.to_path_buf(),
            source: std::io::Error::new(
                std::io::ErrorKind::Other,
                format!("expected {} bytes on disk, found {}", bytes.len(), on_disk),
            ),
        });
    }

    Ok(())
}

/// Dry-run check: the target must not be a directory and its nearest existing
/// ancestor must be a directory whose permission bits allow writing.
///
/// This reads mode bits only (`Permissions::readonly`). It does not resolve
/// whether the current user may write there, so ownership, ACLs and root
/// access are not considered and a dry run can pass where the real write fails.
async fn check_writable(target: &Path) -> Result<()> {
    if let Ok(meta) = fs::metadata(target).await {
        if meta.is_dir() {
            return Err(EngineError::InvalidParameters(format!(
                "{} is a directory",
                target.display()
            )));
        }
    }

    let mut ancestor = target.parent();
    while let Some(dir) = ancestor {
        let candidate = if dir.as_os_str().is_empty() { Path::new(".") } else { dir };
        match fs::metadata(candidate).await {
            Ok(meta) if meta.is_dir() && !meta.permissions().readonly() => return Ok(()),
            Ok(meta) if meta.is_dir() => return Err(EngineError::PermissionDenied(candidate.to_path_buf())),
            Ok(_) => {
                return Err(EngineError::InvalidParameters(format!(
                    "{} is not a directory",
                    candidate.display()
                )))
            }
            Err(_) => ancestor = dir.parent(),
        }
    }

    Err(EngineError::PathNotFound(target.to_path_buf()))
}

fn is_single_component(name: &str) -> bool {
    if name.contains('/') || name.contains('\\') {
        return false;
    }
    let mut components = Path::new(name).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    )
}
