pub mod catalog;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod platform;
pub mod progress;
pub mod queue;
pub mod scheduler;
pub mod storage;
pub mod uploader;

pub use config::AppConfig;
pub use coordinator::{BatchSummary, UploadCoordinator};
pub use error::{Error, Result};
pub use progress::{ProgressReporter, SilentReporter};
pub use scheduler::{Strategy, WorkerCommand};
pub use storage::{Database, UploadStatus};
pub use uploader::{LocalUploader, Uploader};
