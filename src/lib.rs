/*!
 * dircrypt - password-based file and directory encryption engine
 *
 * Derives a key from a password and salt, then encrypts or decrypts a single
 * file or a whole directory tree on a bounded worker pool, streaming progress
 * and log events to whatever front end drives it.
 *
 * ```no_run
 * use dircrypt::{CancelFlag, Engine, EventSink, Operation, OperationRequest};
 *
 * # async fn run() {
 * let engine = Engine::default();
 * let (events, mut rx) = EventSink::channel();
 * tokio::spawn(async move {
 *     while let Some(event) = rx.recv().await {
 *         println!("{:?}", event);
 *     }
 * });
 *
 * let request = OperationRequest::new("/data/photos", "p", "s", Operation::Encrypt)
 *     .with_threads(4);
 * let result = engine.execute_directory(request, &events, CancelFlag::new()).await;
 * println!("{}", result.message);
 * # }
 * ```
 */

pub mod config;
pub mod crypto;
pub mod engine;
pub mod error;
pub mod events;
pub mod file_manager;
pub mod key_management;
pub mod request;
pub mod results;
pub mod scanner;
pub mod scheduler;
pub mod utils;

pub use crate::config::EngineConfig;
pub use crate::crypto::{CipherMode, DecodedPayload};
pub use crate::engine::Engine;
pub use crate::error::{EngineError, Result};
pub use crate::events::{EngineEvent, EventReceiver, EventSink, LogLevel, ProgressEvent, VerboseLogEntry};
pub use crate::file_manager::{FileManager, FileOutcome};
pub use crate::key_management::{DerivedKeyMaterial, HashAlgorithm, KeyDerivation};
pub use crate::request::{FileTask, Operation, OperationRequest, RunSettings};
pub use crate::results::{summarize, OperationResult, ResultAggregator, RunStatus};
pub use crate::scanner::{scan_directory, DirectoryScan, OperationalInfo, ScannedFile};
pub use crate::scheduler::{CancelFlag, SchedulerReport, WorkScheduler};
