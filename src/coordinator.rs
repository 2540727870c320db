use crate::catalog::FileCatalog;
use crate::config::AppConfig;
use crate::error::{Error, Result};
use crate::progress::ProgressReporter;
use crate::scheduler::{
    CooperativeDispatcher, Dispatcher, ParallelDispatcher, ScheduleOptions, Scheduler, Strategy,
    WorkerCommand,
};
use crate::storage::Database;
use crate::uploader::{LocalUploader, Uploader};
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info};

/// What one upload run did.
#[derive(Debug, Clone)]
pub struct BatchSummary {
    pub batch_id: String,
    pub strategy: Strategy,
    /// Records created by this run's scan; files already known are not counted.
    pub files_created: usize,
    pub dispatched: usize,
    pub completed: usize,
    pub failed: usize,
    pub skipped: usize,
    /// Outcomes that could not be written back to the store.
    pub unrecorded: usize,
    /// Files left out of the catalog because their path is not valid UTF-8.
    pub files_skipped: usize,
    pub duration: Duration,
}

/// Scans a root directory into a new batch, then uploads every Pending
/// record in the store under the configured concurrency bound.
pub struct UploadCoordinator<'a> {
    db: &'a Database,
    config: &'a AppConfig,
}

impl<'a> UploadCoordinator<'a> {
    pub fn new(db: &'a Database, config: &'a AppConfig) -> Self {
        Self { db, config }
    }

    /// Blocking entry point. Builds the runtime the strategy needs: a
    /// single-threaded one for cooperative uploads, a multi-threaded one to
    /// supervise worker processes.
    pub fn run(
        &self,
        root_dir: &Path,
        strategy: Strategy,
        reporter: &dyn ProgressReporter,
    ) -> Result<BatchSummary> {
        let mut builder = match strategy {
            Strategy::Cooperative => tokio::runtime::Builder::new_current_thread(),
            Strategy::Parallel => tokio::runtime::Builder::new_multi_thread(),
        };
        let runtime = builder.enable_all().build()?;

        match strategy {
            Strategy::Cooperative => {
                let uploader = Arc::new(LocalUploader::new(&self.config.object_store_root));
                runtime.block_on(self.run_cooperative(root_dir, uploader, reporter))
            }
            Strategy::Parallel => {
                let worker = WorkerCommand::current_exe(Path::new(&self.config.object_store_root))?;
                runtime.block_on(self.run_parallel(root_dir, worker, reporter))
            }
        }
    }

    pub async fn run_cooperative(
        &self,
        root_dir: &Path,
        uploader: Arc<dyn Uploader>,
        reporter: &dyn ProgressReporter,
    ) -> Result<BatchSummary> {
        let mut dispatcher = CooperativeDispatcher::new(uploader);
        self.run_with(root_dir, &mut dispatcher, reporter).await
    }

    pub async fn run_parallel(
        &self,
        root_dir: &Path,
        worker: WorkerCommand,
        reporter: &dyn ProgressReporter,
    ) -> Result<BatchSummary> {
        let mut dispatcher = ParallelDispatcher::new(worker);
        self.run_with(root_dir, &mut dispatcher, reporter).await
    }

    async fn run_with<D: Dispatcher>(
        &self,
        root_dir: &Path,
        dispatcher: &mut D,
        reporter: &dyn ProgressReporter,
    ) -> Result<BatchSummary> {
        if !root_dir.is_dir() {
            return Err(Error::RootNotFound(root_dir.to_path_buf()));
        }
        let start = Instant::now();
        let root = fs::canonicalize(root_dir)?;

        let batch = self.db.create_batch(&root.to_string_lossy())?;
        info!("Created batch {} for {}", batch.id, batch.root_dir);

        let scan = FileCatalog::new(self.db)
            .with_ignore_patterns(&self.config.ignore_patterns)
            .scan(&batch.id, &root, reporter)?;

        let pending = match self.db.pending_count() {
            Ok(count) => count.max(0) as u64,
            Err(e) => {
                error!("Cannot count pending records: {}", e);
                0
            }
        };
        reporter.on_upload_start(pending);

        let stats = Scheduler::new(self.db, &batch.id, ScheduleOptions::from(self.config))
            .run(dispatcher, reporter)
            .await?;

        let summary = BatchSummary {
            batch_id: batch.id,
            strategy: dispatcher.strategy(),
            files_created: scan.created,
            dispatched: stats.dispatched,
            completed: stats.completed,
            failed: stats.failed,
            skipped: stats.skipped,
            unrecorded: stats.unrecorded,
            files_skipped: scan.skipped,
            duration: start.elapsed(),
        };
        info!(
            "Batch {} finished in {:.2}s: {} completed, {} failed",
            summary.batch_id,
            summary.duration.as_secs_f64(),
            summary.completed,
            summary.failed
        );
        reporter.on_upload_complete(&summary);
        Ok(summary)
    }
}
