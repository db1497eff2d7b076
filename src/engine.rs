//! Request orchestration: validation, key derivation, planning, dispatch.
//!
//! Each request is self-contained. The engine keeps only its configuration
//! between calls; the password and derived key live for one run and are
//! dropped (and wiped) before the result is returned.

use std::path::Path;
use std::sync::Arc;

use tracing::{debug, info};

use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use crate::events::{EventSink, ProgressEvent, Reporter};
use crate::file_manager::FileManager;
use crate::key_management::{DerivedKeyMaterial, KeyDerivation};
use crate::request::{FileTask, Operation, OperationRequest};
use crate::results::{OperationResult, ResultAggregator};
use crate::scanner::{self, DirectoryScan, OperationalInfo};
use crate::scheduler::{CancelFlag, WorkScheduler};
use crate::utils::{
    capitalize, decrypted_file_name, encrypted_file_name, has_encrypted_extension,
    is_protected_location, map_into_target,
};

pub struct Engine {
    config: EngineConfig,
    kdf: KeyDerivation,
    files: Arc<FileManager>,
}

impl Default for Engine {
    fn default() -> Self {
        Self::new(&EngineConfig::default())
    }
}

impl Engine {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            config: config.clone(),
            kdf: KeyDerivation::new(config),
            files: Arc::new(FileManager::new(config)),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Pre-flight statistics for `path`. Read-only.
    ///
    /// Unreadable entries below a directory are counted in
    /// [`OperationalInfo::unreadable_entries`]; only an unusable `path`
    /// itself is an error.
    pub fn scan(&self, path: &Path, is_directory: bool) -> Result<OperationalInfo> {
        if is_directory {
            let scan = scanner::scan_directory(path)?;
            Ok(OperationalInfo::from_scan(&scan))
        } else {
            let file = scanner::scan_file(path)?;
            Ok(OperationalInfo::for_file(file.size))
        }
    }

    /// Encrypts or decrypts one file without a worker pool.
    ///
    /// The output lands in `request.target` (treated as a directory) or next
    /// to the source.
    pub async fn execute_file(&self, request: OperationRequest, events: &EventSink) -> OperationResult {
        let reporter = Reporter::new(events, request.verbose);
        let settings = request.settings();
        let target_dir = request.target.clone();

        let task = match self.plan_file(&request) {
            Ok(task) => task,
            Err(err) => return self.failed_to_start(&reporter, err),
        };

        let material = match self.derive_key(request, &reporter).await {
            Ok(material) => material,
            Err(err) => return self.failed_to_start(&reporter, err),
        };

        // Only touch the disk once the request is known to be runnable.
        if let (Some(dir), false) = (&target_dir, settings.dry_run) {
            if let Err(err) = self.files.create_dir_all(dir).await {
                reporter.error(format!("Cannot create {}: {}", dir.display(), err));
            }
        }

        let name = display_name(&task.source);
        reporter.progress(ProgressEvent::new(0, 1, format!("Starting to {} {}", settings.operation, name)));

        let outcome = self.files.process(&task, &material, &settings, &reporter).await;

        let message = if outcome.is_success() {
            format!("{} {}", capitalize(settings.operation.past_tense()), name)
        } else {
            format!("Failed {}", name)
        };
        reporter.progress(ProgressEvent::new(1, 1, message));

        let mut aggregator = ResultAggregator::new(settings.operation, settings.dry_run);
        aggregator.record(&outcome);

        release(material, &reporter);
        let result = aggregator.finish();
        info!("{}", result.message);
        result
    }

    /// Encrypts or decrypts every regular file below `request.source`.
    ///
    /// Files are spread over `request.threads` workers. A failing file never
    /// stops its siblings. Setting `cancel` stops queued files from starting.
    pub async fn execute_directory(
        &self,
        request: OperationRequest,
        events: &EventSink,
        cancel: CancelFlag,
    ) -> OperationResult {
        let reporter = Reporter::new(events, request.verbose);
        let settings = request.settings();
        let workers = request.threads;

        let scan = match self.prepare_directory(&request, &reporter).await {
            Ok(scan) => scan,
            Err(err) => return self.failed_to_start(&reporter, err),
        };

        let source_root = request.source.clone();
        let target_root = request.target.clone().unwrap_or_else(|| source_root.clone());

        let material = match self.derive_key(request, &reporter).await {
            Ok(material) => material,
            Err(err) => return self.failed_to_start(&reporter, err),
        };

        if !settings.dry_run {
            self.mirror_folders(&scan, &source_root, &target_root, &reporter).await;
        }

        let mut aggregator = ResultAggregator::new(settings.operation, settings.dry_run);
        for entry in &scan.errors {
            reporter.error(format!("Cannot read {}: {}", entry.path.display(), entry.error));
            aggregator.record_scan_error();
        }
        for link in &scan.skipped {
            reporter.warn(format!("Skipping {} (not a regular file)", link.display()));
        }

        let (tasks, filtered) = plan_directory(&scan, &source_root, &target_root, settings.operation);
        if filtered > 0 {
            reporter.info(format!("Skipping {} files without the encrypted extension", filtered));
        }
        aggregator.skipped(filtered);

        info!(
            operation = %settings.operation,
            files = tasks.len(),
            workers,
            dry_run = settings.dry_run,
            "dispatching directory run"
        );

        let scheduler = WorkScheduler::new(workers, cancel);
        let report = scheduler
            .run(tasks, Arc::clone(&self.files), Arc::clone(&material), settings, &reporter)
            .await;

        for outcome in &report.outcomes {
            aggregator.record(outcome);
        }
        aggregator.skipped(report.not_started);
        if report.cancelled {
            aggregator.mark_cancelled();
        }

        release(material, &reporter);
        let result = aggregator.finish();
        info!("{}", result.message);
        result
    }

    fn plan_file(&self, request: &OperationRequest) -> Result<FileTask> {
        request.validate()?;

        let scanned = scanner::scan_file(&request.source)?;
        if request.operation == Operation::Encrypt && has_encrypted_extension(&scanned.path) {
            return Err(EngineError::InvalidParameters(format!(
                "{} is already encrypted",
                scanned.path.display()
            )));
        }

        let file_name = scanned.path.file_name().ok_or_else(|| {
            EngineError::InvalidParameters(format!("{} has no file name", scanned.path.display()))
        })?;
        let target_name = match request.operation {
            Operation::Encrypt => encrypted_file_name(file_name),
            Operation::Decrypt => decrypted_file_name(file_name),
        };
        let target = match &request.target {
            Some(dir) => dir.join(target_name),
            None => scanned.path.with_file_name(target_name),
        };

        Ok(FileTask {
            target,
            source: scanned.path,
            size: scanned.size,
        })
    }

    async fn prepare_directory(&self, request: &OperationRequest, reporter: &Reporter) -> Result<DirectoryScan> {
        request.validate()?;

        if is_protected_location(&request.source, &self.config.protected_paths) {
            return Err(EngineError::InvalidParameters(format!(
                "{} is a protected system location",
                request.source.display()
            )));
        }

        reporter.info(format!("Scanning {}", request.source.display()));
        let root = request.source.clone();
        let scan = tokio::task::spawn_blocking(move || scanner::scan_directory(&root))
            .await
            .map_err(|e| EngineError::Io {
                path: request.source.clone(),
                source: std::io::Error::new(std::io::ErrorKind::Other, e.to_string()),
            })??;

        if request.operation == Operation::Encrypt {
            if let Some(existing) = scan.files.iter().find(|f| has_encrypted_extension(&f.path)) {
                return Err(EngineError::InvalidParameters(format!(
                    "{} already contains encrypted files such as {}",
                    request.source.display(),
                    existing.path.display()
                )));
            }
        }

        reporter.info(format!(
            "Found {} files in {} folders ({} bytes)",
            scan.file_count(),
            scan.folder_count(),
            scan.total_size
        ));

        Ok(scan)
    }

    /// Consumes the request so the password is dropped once the key exists.
    async fn derive_key(&self, request: OperationRequest, reporter: &Reporter) -> Result<Arc<DerivedKeyMaterial>> {
        let OperationRequest {
            password,
            salt,
            hash_algorithm,
            iterations,
            ..
        } = request;

        reporter.info(format!(
            "Deriving key with {} ({} iterations)",
            hash_algorithm, iterations
        ));

        let kdf = self.kdf.clone();
        let material = tokio::task::spawn_blocking(move || kdf.derive(&password, &salt, hash_algorithm, iterations))
            .await
            .map_err(|e| EngineError::InvalidParameters(format!("key derivation task failed: {}", e)))??;

        Ok(Arc::new(material))
    }

    async fn mirror_folders(&self, scan: &DirectoryScan, source_root: &Path, target_root: &Path, reporter: &Reporter) {
        let folders = std::iter::once(target_root.to_path_buf())
            .chain(scan.folders.iter().map(|f| map_into_target(f, source_root, target_root)));
        for folder in folders {
            if let Err(err) = self.files.create_dir_all(&folder).await {
                reporter.error(format!("Cannot create {}: {}", folder.display(), err));
            }
        }
    }

    fn failed_to_start(&self, reporter: &Reporter, err: EngineError) -> OperationResult {
        reporter.error(format!("Operation could not start: {}", err));
        OperationResult::failed_to_start(&err)
    }
}

/// Turns scanned files into tasks. On decrypt, files without the encrypted
/// extension are left alone and counted.
fn plan_directory(
    scan: &DirectoryScan,
    source_root: &Path,
    target_root: &Path,
    operation: Operation,
) -> (Vec<FileTask>, usize) {
    let mut tasks = Vec::with_capacity(scan.files.len());
    let mut filtered = 0;

    for file in &scan.files {
        let Some(name) = file.path.file_name() else { continue };
        let target_name = match operation {
            Operation::Encrypt => encrypted_file_name(name),
            Operation::Decrypt if has_encrypted_extension(&file.path) => decrypted_file_name(name),
            Operation::Decrypt => {
                debug!(path = %file.path.display(), "not an encrypted file");
                filtered += 1;
                continue;
            }
        };
        let target = map_into_target(&file.path, source_root, target_root).with_file_name(target_name);
        tasks.push(FileTask {
            source: file.path.clone(),
            target,
            size: file.size,
        });
    }

    (tasks, filtered)
}

fn release(material: Arc<DerivedKeyMaterial>, reporter: &Reporter) {
    drop(material);
    reporter.info("Key material released");
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use crate::scanner::ScannedFile;

    fn scan_of(root: &str, files: &[&str]) -> DirectoryScan {
        DirectoryScan {
            root: PathBuf::from(root),
            files: files
                .iter()
                .map(|f| ScannedFile {
                    path: Path::new(root).join(f),
                    size: 1,
                })
                .collect(),
            ..Default::default()
        }
    }

    #[test]
    fn encrypt_plan_mirrors_into_target() {
        let scan = scan_of("/src", &["a.txt", "docs/b.md"]);
        let (tasks, filtered) = plan_directory(&scan, Path::new("/src"), Path::new("/out"), Operation::Encrypt);
        assert_eq!(filtered, 0);
        assert_eq!(tasks[0].target, PathBuf::from("/out/a.txt.enom"));
        assert_eq!(tasks[1].target, PathBuf::from("/out/docs/b.md.enom"));
    }

    #[test]
    fn decrypt_plan_skips_plain_files() {
        let scan = scan_of("/src", &["a.txt.enom", "notes.txt"]);
        let (tasks, filtered) = plan_directory(&scan, Path::new("/src"), Path::new("/src"), Operation::Decrypt);
        assert_eq!(filtered, 1);
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].target, PathBuf::from("/src/a.txt"));
    }
}
