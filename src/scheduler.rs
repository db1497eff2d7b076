//! Bounded concurrent dispatch of [`FileTask`]s.
//!
//! At most `workers` tasks are in flight at once. Completions are collected
//! by a single loop, which is also the only place progress is emitted, so the
//! percentage a consumer sees never goes backwards even though files finish
//! in arbitrary order.

use std::collections::HashMap;
use std::future::Future;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::task::{self, JoinSet};
use tracing::{debug, warn};

use crate::error::EngineError;
use crate::events::{ProgressEvent, Reporter};
use crate::file_manager::{FileManager, FileOutcome};
use crate::key_management::DerivedKeyMaterial;
use crate::request::{FileTask, RunSettings};
use crate::utils::capitalize;

/// Best-effort stop signal for a running request.
///
/// Checked before each queued task starts. Tasks already running finish
/// normally, so no half-written output is left behind.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug)]
pub struct SchedulerReport {
    pub outcomes: Vec<FileOutcome>,
    /// Tasks dropped from the queue after cancellation.
    pub not_started: usize,
    pub cancelled: bool,
}

/// Running tasks keyed by their tokio id, so a worker that panics or is
/// aborted can still be reported against the file it was handling.
struct InFlight {
    set: JoinSet<FileOutcome>,
    sources: HashMap<task::Id, PathBuf>,
    dry_run: bool,
}

impl InFlight {
    fn new(dry_run: bool) -> Self {
        Self {
            set: JoinSet::new(),
            sources: HashMap::new(),
            dry_run,
        }
    }

    fn len(&self) -> usize {
        self.set.len()
    }

    fn spawn<F>(&mut self, source: PathBuf, work: F)
    where
        F: Future<Output = FileOutcome> + Send + 'static,
    {
        let id = self.set.spawn(work).id();
        self.sources.insert(id, source);
    }

    async fn next(&mut self, reporter: &Reporter) -> Option<FileOutcome> {
        match self.set.join_next_with_id().await? {
            Ok((id, outcome)) => {
                self.sources.remove(&id);
                Some(outcome)
            }
            Err(err) => {
                let source = self.sources.remove(&err.id()).unwrap_or_default();
                reporter.error(format!("Worker task for {} aborted: {}", source.display(), err));
                Some(FileOutcome {
                    output: None,
                    dry_run: self.dry_run,
                    source_deleted: false,
                    error: Some(EngineError::Io {
                        path: source.clone(),
                        source: std::io::Error::new(std::io::ErrorKind::Other, err.to_string()),
                    }),
                    source,
                })
            }
        }
    }
}

pub struct WorkScheduler {
    workers: usize,
    cancel: CancelFlag,
}

impl WorkScheduler {
    pub fn new(workers: usize, cancel: CancelFlag) -> Self {
        Self {
            workers: workers.max(1),
            cancel,
        }
    }

    pub async fn run(
        &self,
        tasks: Vec<FileTask>,
        files: Arc<FileManager>,
        material: Arc<DerivedKeyMaterial>,
        settings: RunSettings,
        reporter: &Reporter,
    ) -> SchedulerReport {
        let total = tasks.len() as u64;
        let verb = settings.operation.past_tense();

        reporter.progress(ProgressEvent::new(
            0,
            total,
            format!("Starting to {} {} files", settings.operation, total),
        ));

        let mut queue = tasks.into_iter();
        let mut in_flight = InFlight::new(settings.dry_run);
        let mut outcomes = Vec::with_capacity(queue.len());
        let mut completed = 0u64;
        let mut cancelled = false;

        loop {
            while !cancelled && in_flight.len() < self.workers {
                if self.cancel.is_cancelled() {
                    cancelled = true;
                    warn!(remaining = queue.len(), "cancellation requested");
                    break;
                }
                let Some(task) = queue.next() else { break };

                let files = Arc::clone(&files);
                let material = Arc::clone(&material);
                let reporter = reporter.clone();
                in_flight.spawn(task.source.clone(), async move {
                    files.process(&task, &material, &settings, &reporter).await
                });
            }

            let Some(outcome) = in_flight.next(reporter).await else { break };

            completed += 1;
            let name = outcome
                .source
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            let message = if outcome.is_success() {
                format!("{} {}", capitalize(verb), name)
            } else {
                format!("Failed {}", name)
            };
            reporter.progress(ProgressEvent::new(completed, total, message));
            outcomes.push(outcome);
        }

        let not_started = queue.len();
        debug!(completed, not_started, "scheduler drained");

        reporter.progress(ProgressEvent::new(
            completed,
            total,
            if cancelled {
                format!("Cancelled after {} of {} files", completed, total)
            } else {
                format!("Finished {} of {} files", completed, total)
            },
        ));

        SchedulerReport {
            outcomes,
            not_started,
            cancelled,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancel_flag_is_shared_between_clones() {
        let flag = CancelFlag::new();
        let other = flag.clone();
        assert!(!other.is_cancelled());
        flag.cancel();
        assert!(other.is_cancelled());
    }

    #[test]
    fn zero_workers_still_makes_progress() {
        let scheduler = WorkScheduler::new(0, CancelFlag::new());
        assert_eq!(scheduler.workers, 1);
    }

    #[tokio::test]
    async fn panicking_worker_keeps_its_source_path() {
        use crate::events::{EngineEvent, EventSink};

        let (sink, mut rx) = EventSink::channel();
        let reporter = Reporter::new(&sink, false);
        let mut in_flight = InFlight::new(false);
        in_flight.spawn(PathBuf::from("/data/x.txt"), async {
            Option::<FileOutcome>::None.expect("worker blew up")
        });

        let outcome = in_flight.next(&reporter).await.unwrap();
        assert_eq!(outcome.source, PathBuf::from("/data/x.txt"));
        assert!(!outcome.is_success());
        assert!(matches!(
            &outcome.error,
            Some(EngineError::Io { path, .. }) if path == &PathBuf::from("/data/x.txt")
        ));
        assert!(in_flight.sources.is_empty());
        assert!(in_flight.next(&reporter).await.is_none());

        match rx.try_recv().unwrap() {
            EngineEvent::Log(entry) => assert!(entry.message.contains("/data/x.txt")),
            other => panic!("unexpected event {:?}", other),
        }
    }
}
