//! Progress and log events streamed to a presentation layer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Info,
    Warn,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub current: u64,
    pub total: u64,
    pub percentage: f64,
    pub message: String,
}

impl ProgressEvent {
    pub fn new(current: u64, total: u64, message: impl Into<String>) -> Self {
        let percentage = if total == 0 {
            100.0
        } else {
            (current.min(total) as f64 / total as f64) * 100.0
        };
        Self {
            current,
            total,
            percentage,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerboseLogEntry {
    pub level: LogLevel,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "payload", rename_all = "kebab-case")]
pub enum EngineEvent {
    Progress(ProgressEvent),
    Log(VerboseLogEntry),
}

pub type EventReceiver = mpsc::UnboundedReceiver<EngineEvent>;

/// Sending half of the event stream. Cheap to clone; safe to use from any
/// worker. A dropped receiver is not an error.
#[derive(Debug, Clone)]
pub struct EventSink {
    tx: Option<mpsc::UnboundedSender<EngineEvent>>,
}

impl EventSink {
    pub fn channel() -> (Self, EventReceiver) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx: Some(tx) }, rx)
    }

    /// Discards every event. Logs still reach `tracing`.
    pub fn disabled() -> Self {
        Self { tx: None }
    }

    fn send(&self, event: EngineEvent) {
        if let Some(tx) = &self.tx {
            let _ = tx.send(event);
        }
    }
}

/// Applies a run's verbosity to an [`EventSink`].
///
/// Every entry is mirrored to `tracing`. Info and warn entries reach the sink
/// only when verbose is on; error entries always do.
#[derive(Debug, Clone)]
pub struct Reporter {
    sink: EventSink,
    verbose: bool,
}

impl Reporter {
    pub fn new(sink: &EventSink, verbose: bool) -> Self {
        Self {
            sink: sink.clone(),
            verbose,
        }
    }

    pub fn silent() -> Self {
        Self::new(&EventSink::disabled(), false)
    }

    pub fn progress(&self, event: ProgressEvent) {
        debug!(current = event.current, total = event.total, "{}", event.message);
        self.sink.send(EngineEvent::Progress(event));
    }

    pub fn info(&self, message: impl Into<String>) {
        let message = message.into();
        info!("{}", message);
        if self.verbose {
            self.log(LogLevel::Info, message);
        }
    }

    pub fn warn(&self, message: impl Into<String>) {
        let message = message.into();
        warn!("{}", message);
        if self.verbose {
            self.log(LogLevel::Warn, message);
        }
    }

    pub fn error(&self, message: impl Into<String>) {
        let message = message.into();
        error!("{}", message);
        self.log(LogLevel::Error, message);
    }

    fn log(&self, level: LogLevel, message: String) {
        self.sink.send(EngineEvent::Log(VerboseLogEntry {
            level,
            message,
            timestamp: Utc::now(),
        }));
    }
}
