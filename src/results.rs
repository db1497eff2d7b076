//! Folding per-file outcomes into the terminal [`OperationResult`].

use serde::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::file_manager::FileOutcome;
use crate::request::Operation;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RunStatus {
    Completed,
    CompletedWithWarnings,
    Cancelled,
    FailedToStart,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationResult {
    pub success: bool,
    pub message: String,
    pub success_count: usize,
    pub failed_count: usize,
    pub skipped_count: usize,
    pub status: RunStatus,
}

impl OperationResult {
    /// The request was rejected before any file was touched.
    pub fn failed_to_start(error: &EngineError) -> Self {
        Self {
            success: false,
            message: format!("Failed to start: {}", error),
            success_count: 0,
            failed_count: 0,
            skipped_count: 0,
            status: RunStatus::FailedToStart,
        }
    }
}

/// Running tally for one request.
#[derive(Debug)]
pub struct ResultAggregator {
    operation: Operation,
    dry_run: bool,
    succeeded: usize,
    failed: usize,
    skipped: usize,
    cancelled: bool,
}

impl ResultAggregator {
    pub fn new(operation: Operation, dry_run: bool) -> Self {
        Self {
            operation,
            dry_run,
            succeeded: 0,
            failed: 0,
            skipped: 0,
            cancelled: false,
        }
    }

    pub fn record(&mut self, outcome: &FileOutcome) {
        if outcome.is_success() {
            self.succeeded += 1;
        } else {
            self.failed += 1;
        }
    }

    /// An entry the walker could not read.
    pub fn record_scan_error(&mut self) {
        self.failed += 1;
    }

    pub fn skipped(&mut self, count: usize) {
        self.skipped += count;
    }

    pub fn mark_cancelled(&mut self) {
        self.cancelled = true;
    }

    pub fn finish(self) -> OperationResult {
        let verb = self.operation.past_tense();
        let outcome = if self.dry_run {
            format!("would be {}", verb)
        } else {
            verb.to_string()
        };

        let (status, message) = if self.cancelled {
            (
                RunStatus::Cancelled,
                format!(
                    "Cancelled: {} files {}, {} failed, {} not started",
                    self.succeeded, outcome, self.failed, self.skipped
                ),
            )
        } else if self.failed > 0 {
            (
                RunStatus::CompletedWithWarnings,
                format!(
                    "Completed with warnings: {} files {}, {} failed",
                    self.succeeded, outcome, self.failed
                ),
            )
        } else if self.dry_run {
            (
                RunStatus::Completed,
                format!("Dry run: {} files {}", self.succeeded, outcome),
            )
        } else {
            (
                RunStatus::Completed,
                format!("Successfully {} {} files", verb, self.succeeded),
            )
        };

        OperationResult {
            success: status == RunStatus::Completed,
            message,
            success_count: self.succeeded,
            failed_count: self.failed,
            skipped_count: self.skipped,
            status,
        }
    }
}

/// One-shot form of [`ResultAggregator`].
pub fn summarize<'a>(
    operation: Operation,
    dry_run: bool,
    outcomes: impl IntoIterator<Item = &'a FileOutcome>,
) -> OperationResult {
    let mut aggregator = ResultAggregator::new(operation, dry_run);
    for outcome in outcomes {
        aggregator.record(outcome);
    }
    aggregator.finish()
}
