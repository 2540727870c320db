use super::gate::AdmissionGate;
use super::{Dispatcher, Strategy, UnitTicket, UploadOutcome};
use crate::error::{Error, Result};
use crate::storage::UploadStatus;
use crate::uploader::{perform_upload, LocalUploader, UploadTask, Uploader};
use async_trait::async_trait;
use std::ffi::OsString;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio::task::JoinSet;
use tracing::{debug, error, warn};

/// Command line used to start one upload worker process.
///
/// The worker reads a JSON [`UploadTask`] from stdin and prints a JSON
/// [`UploadOutcome`] to stdout.
#[derive(Debug, Clone)]
pub struct WorkerCommand {
    program: PathBuf,
    args: Vec<OsString>,
}

impl WorkerCommand {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Re-executes the running binary in worker mode.
    pub fn current_exe(store_root: &Path) -> Result<Self> {
        Ok(Self::new(std::env::current_exe()?)
            .arg("worker")
            .arg("--store-root")
            .arg(store_root))
    }

    async fn run(&self, task: &UploadTask) -> Result<UploadOutcome> {
        let payload = serde_json::to_vec(task)?;
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()?;
        debug!("Started worker {:?} for {}", child.id(), task.id);

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| Error::Worker("worker stdin unavailable".to_string()))?;
        stdin.write_all(&payload).await?;
        stdin.shutdown().await?;
        drop(stdin);

        let output = child.wait_with_output().await?;
        if !output.status.success() {
            return Err(Error::Worker(format!(
                "worker for {} exited with {}",
                task.id, output.status
            )));
        }

        let report: UploadOutcome = serde_json::from_slice(&output.stdout)?;
        if report.file_id != task.id {
            return Err(Error::Worker(format!(
                "worker answered for {} instead of {}",
                report.file_id, task.id
            )));
        }
        Ok(report)
    }
}

/// Runs every admitted unit in its own worker process. A supervising task
/// per unit feeds the task to the worker and relays its report.
pub struct ParallelDispatcher {
    worker: WorkerCommand,
    workers: JoinSet<()>,
}

impl ParallelDispatcher {
    pub fn new(worker: WorkerCommand) -> Self {
        Self {
            worker,
            workers: JoinSet::new(),
        }
    }
}

#[async_trait]
impl Dispatcher for ParallelDispatcher {
    fn strategy(&self) -> Strategy {
        Strategy::Parallel
    }

    fn dispatch(&mut self, task: UploadTask, ticket: UnitTicket) {
        let worker = self.worker.clone();
        self.workers.spawn(async move {
            let status = match worker.run(&task).await {
                Ok(report) if report.status.is_terminal() => report.status,
                Ok(report) => {
                    warn!("Worker reported non-terminal status {} for {}", report.status, task.id);
                    UploadStatus::Failed
                }
                Err(e) => {
                    warn!("Worker for {} failed: {}", task.file_path.display(), e);
                    UploadStatus::Failed
                }
            };
            ticket.complete(status);
        });
    }

    async fn join(&mut self, gate: &AdmissionGate) -> Result<()> {
        while let Some(joined) = self.workers.join_next().await {
            if let Err(e) = joined {
                error!("Worker supervisor ended abnormally: {}", e);
            }
        }
        gate.wait_idle().await
    }
}

/// Runs one upload described by `input` and returns its outcome.
pub async fn serve_task(uploader: &dyn Uploader, input: &[u8]) -> Result<UploadOutcome> {
    let task: UploadTask = serde_json::from_slice(input)?;
    let status = perform_upload(uploader, &task).await;
    Ok(UploadOutcome {
        file_id: task.id,
        status,
    })
}

/// Worker process entry point: one task on stdin, one report on stdout.
pub fn run_worker(store_root: &Path) -> Result<()> {
    let mut input = Vec::new();
    std::io::stdin().read_to_end(&mut input)?;

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    let uploader = LocalUploader::new(store_root);
    let outcome = runtime.block_on(serve_task(&uploader, &input))?;

    let mut stdout = std::io::stdout().lock();
    serde_json::to_writer(&mut stdout, &outcome)?;
    writeln!(stdout)?;
    stdout.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::FileRecord;

    fn task_for(path: &Path) -> UploadTask {
        let record = FileRecord {
            id: "rec-7".to_string(),
            batch_id: "batch".to_string(),
            size: 5,
            last_modified: 0,
            permissions: "644".to_string(),
            file_name: "five.txt".to_string(),
            file_path: path.to_string_lossy().to_string(),
            status: UploadStatus::InProgress,
        };
        UploadTask::from_record(&record, "bucket")
    }

    #[tokio::test]
    async fn test_serve_task_uploads_file_and_metadata() {
        let src = tempfile::tempdir().unwrap();
        let store = tempfile::tempdir().unwrap();
        let file = src.path().join("five.txt");
        std::fs::write(&file, b"12345").unwrap();

        let uploader = LocalUploader::new(store.path());
        let input = serde_json::to_vec(&task_for(&file)).unwrap();
        let outcome = serve_task(&uploader, &input).await.unwrap();

        assert_eq!(outcome.file_id, "rec-7");
        assert_eq!(outcome.status, UploadStatus::Completed);
        assert_eq!(uploader.get_uploaded_data("bucket", "rec-7").await.unwrap(), b"12345");
        let metadata = uploader
            .get_uploaded_data("bucket", "metadata-rec-7")
            .await
            .unwrap();
        let metadata: serde_json::Value = serde_json::from_slice(&metadata).unwrap();
        assert_eq!(metadata["file_name"], "five.txt");
    }

    #[tokio::test]
    async fn test_serve_task_missing_file_is_failed() {
        let store = tempfile::tempdir().unwrap();
        let uploader = LocalUploader::new(store.path());
        let input = serde_json::to_vec(&task_for(Path::new("/no/such/five.txt"))).unwrap();
        let outcome = serve_task(&uploader, &input).await.unwrap();
        assert_eq!(outcome.status, UploadStatus::Failed);
    }

    #[tokio::test]
    async fn test_serve_task_rejects_garbage() {
        let store = tempfile::tempdir().unwrap();
        let uploader = LocalUploader::new(store.path());
        assert!(matches!(
            serve_task(&uploader, b"not json").await,
            Err(Error::Json(_))
        ));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_failing_worker_becomes_failed_outcome() {
        let src = tempfile::tempdir().unwrap();
        let file = src.path().join("five.txt");
        std::fs::write(&file, b"12345").unwrap();

        let gate = AdmissionGate::new(1);
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let mut dispatcher = ParallelDispatcher::new(WorkerCommand::new("false"));
        let ticket = UnitTicket::new("rec-7", gate.acquire().await.unwrap(), tx);
        dispatcher.dispatch(task_for(&file), ticket);
        dispatcher.join(&gate).await.unwrap();

        let outcome = rx.recv().await.unwrap();
        assert_eq!(outcome.status, UploadStatus::Failed);
        assert!(rx.recv().await.is_none());
    }
}
