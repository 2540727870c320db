use crate::coordinator::BatchSummary;
use crate::storage::{FileRecord, UploadStatus};

/// Trait for reporting scan and upload progress.
///
/// The CLI implements it with indicatif; tests use it to observe dispatch order.
/// All methods have default no-op implementations.
pub trait ProgressReporter: Send + Sync {
    fn on_scan_start(&self, _root_dir: &str) {}
    fn on_scan_progress(&self, _files_seen: usize, _current_path: &str) {}
    fn on_scan_complete(&self, _files_created: usize, _duration_secs: f64) {}
    fn on_upload_start(&self, _pending: u64) {}
    fn on_dispatch(&self, _record: &FileRecord) {}
    fn on_settled(&self, _file_id: &str, _status: UploadStatus) {}
    fn on_upload_complete(&self, _summary: &BatchSummary) {}
}

/// No-op progress reporter for silent operation.
pub struct SilentReporter;

impl ProgressReporter for SilentReporter {}
