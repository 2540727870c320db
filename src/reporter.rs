use indicatif::{ProgressBar, ProgressStyle};
use pfu::storage::{FileRecord, UploadStatus};
use pfu::{BatchSummary, ProgressReporter};
use std::sync::Mutex;

/// CLI progress reporter using indicatif progress bars.
///
/// - Scan phase: spinner (file count unknown upfront)
/// - Upload phase: progress bar over the pending records
pub struct CliReporter {
    bar: Mutex<Option<ProgressBar>>,
}

impl CliReporter {
    pub fn new() -> Self {
        Self {
            bar: Mutex::new(None),
        }
    }

    fn set_bar(&self, pb: ProgressBar) {
        let mut guard = self.bar.lock().unwrap();
        if let Some(old) = guard.take() {
            old.finish_and_clear();
        }
        *guard = Some(pb);
    }

    fn finish_bar(&self) {
        let mut guard = self.bar.lock().unwrap();
        if let Some(pb) = guard.take() {
            pb.finish_and_clear();
        }
    }
}

impl ProgressReporter for CliReporter {
    fn on_scan_start(&self, root_dir: &str) {
        let pb = ProgressBar::new_spinner();
        pb.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {msg}")
                .unwrap()
                .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏"),
        );
        pb.set_message(format!("Scanning {}...", root_dir));
        pb.enable_steady_tick(std::time::Duration::from_millis(80));
        self.set_bar(pb);
    }

    fn on_scan_progress(&self, files_seen: usize, _current_path: &str) {
        let guard = self.bar.lock().unwrap();
        if let Some(pb) = guard.as_ref() {
            pb.set_message(format!("Scanning... {} files found", files_seen));
        }
    }

    fn on_scan_complete(&self, files_created: usize, duration_secs: f64) {
        self.finish_bar();
        eprintln!(
            "  \x1b[32m✓\x1b[0m Scan complete: {} new files in {:.2}s",
            files_created, duration_secs
        );
    }

    fn on_upload_start(&self, pending: u64) {
        let pb = ProgressBar::new(pending);
        pb.set_style(
            ProgressStyle::with_template(
                "  {spinner:.cyan} Uploading [{bar:30.cyan/dim}] {pos}/{len} files {msg}",
            )
            .unwrap()
            .progress_chars("━╸─")
            .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏"),
        );
        pb.enable_steady_tick(std::time::Duration::from_millis(80));
        self.set_bar(pb);
    }

    fn on_dispatch(&self, record: &FileRecord) {
        let guard = self.bar.lock().unwrap();
        if let Some(pb) = guard.as_ref() {
            pb.set_message(record.file_name.clone());
        }
    }

    fn on_settled(&self, _file_id: &str, _status: UploadStatus) {
        let guard = self.bar.lock().unwrap();
        if let Some(pb) = guard.as_ref() {
            pb.inc(1);
        }
    }

    fn on_upload_complete(&self, summary: &BatchSummary) {
        self.finish_bar();
        eprintln!(
            "  \x1b[32m✓\x1b[0m Upload complete: {} completed, {} failed in {:.2}s",
            summary.completed,
            summary.failed,
            summary.duration.as_secs_f64()
        );
    }
}
