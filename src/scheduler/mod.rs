pub mod cooperative;
pub mod gate;
pub mod parallel;

use crate::config::AppConfig;
use crate::error::Result;
use crate::progress::ProgressReporter;
use crate::queue::PendingFiles;
use crate::storage::{Database, UploadStatus};
use crate::uploader::UploadTask;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

pub use cooperative::CooperativeDispatcher;
pub use gate::{AdmissionGate, GatePermit};
pub use parallel::{ParallelDispatcher, WorkerCommand};

/// How admitted uploads are executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Strategy {
    /// Interleaved tasks on a single thread, in-process uploader.
    #[default]
    Cooperative,
    /// One worker process per upload.
    Parallel,
}

impl Strategy {
    /// Parallel only when `parallel` is requested without `concurrent`.
    pub fn from_flags(concurrent: bool, parallel: bool) -> Self {
        if parallel && !concurrent {
            Strategy::Parallel
        } else {
            Strategy::Cooperative
        }
    }
}

impl std::fmt::Display for Strategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Strategy::Cooperative => write!(f, "cooperative"),
            Strategy::Parallel => write!(f, "parallel"),
        }
    }
}

/// Result of one upload unit. Also the report a worker process prints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadOutcome {
    pub file_id: String,
    pub status: UploadStatus,
}

pub type OutcomeSender = mpsc::UnboundedSender<UploadOutcome>;

/// Admission of one unit: its gate permit plus the channel its outcome goes
/// back on. The outcome is always sent before the permit is released. A
/// ticket dropped without [`UnitTicket::complete`], e.g. while a panicking
/// unit unwinds, reports `Failed`.
#[derive(Debug)]
pub struct UnitTicket {
    file_id: String,
    outcomes: Option<OutcomeSender>,
    _permit: GatePermit,
}

impl UnitTicket {
    pub fn new(file_id: impl Into<String>, permit: GatePermit, outcomes: OutcomeSender) -> Self {
        Self {
            file_id: file_id.into(),
            outcomes: Some(outcomes),
            _permit: permit,
        }
    }

    pub fn file_id(&self) -> &str {
        &self.file_id
    }

    /// Reports `status` and releases the slot.
    pub fn complete(mut self, status: UploadStatus) {
        self.send(status);
    }

    fn send(&mut self, status: UploadStatus) {
        if let Some(outcomes) = self.outcomes.take() {
            let _ = outcomes.send(UploadOutcome {
                file_id: std::mem::take(&mut self.file_id),
                status,
            });
        }
    }
}

impl Drop for UnitTicket {
    // Runs before the permit field is dropped
    fn drop(&mut self) {
        if self.outcomes.is_some() {
            warn!("Upload unit for {} ended without an outcome", self.file_id);
            self.send(UploadStatus::Failed);
        }
    }
}

/// Executes admitted upload units.
///
/// `dispatch` must not block. The unit it starts owns the ticket until it
/// has an outcome.
#[async_trait]
pub trait Dispatcher: Send {
    fn strategy(&self) -> Strategy;

    fn dispatch(&mut self, task: UploadTask, ticket: UnitTicket);

    /// Resolves once every dispatched unit has finished.
    async fn join(&mut self, gate: &AdmissionGate) -> Result<()>;
}

#[derive(Debug, Clone)]
pub struct ScheduleOptions {
    pub bucket: String,
    pub concurrency: usize,
    pub page_size: usize,
}

impl From<&AppConfig> for ScheduleOptions {
    fn from(config: &AppConfig) -> Self {
        Self {
            bucket: config.bucket_name.clone(),
            concurrency: config.concurrency,
            page_size: config.page_size,
        }
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ScheduleStats {
    pub dispatched: usize,
    pub completed: usize,
    pub failed: usize,
    /// Records that left Pending before they could be claimed.
    pub skipped: usize,
    /// Outcomes the store refused or failed to write.
    pub unrecorded: usize,
}

/// Drains the work queue through an admission gate into a dispatcher.
///
/// The scheduler is the only writer of record status while it runs:
/// InProgress is persisted before a unit is dispatched, and terminal
/// statuses are written from the outcomes units report back. Outcomes are
/// settled right after each permit is acquired, so a slot freed by a unit
/// is never reused before that unit's record has left InProgress.
pub struct Scheduler<'a> {
    db: &'a Database,
    batch_id: String,
    options: ScheduleOptions,
}

impl<'a> Scheduler<'a> {
    pub fn new(db: &'a Database, batch_id: impl Into<String>, options: ScheduleOptions) -> Self {
        Self {
            db,
            batch_id: batch_id.into(),
            options,
        }
    }

    pub async fn run<D: Dispatcher>(
        &self,
        dispatcher: &mut D,
        reporter: &dyn ProgressReporter,
    ) -> Result<ScheduleStats> {
        let gate = AdmissionGate::new(self.options.concurrency);
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut in_flight: HashMap<String, String> = HashMap::new();
        let mut stats = ScheduleStats::default();

        info!(
            "Dispatching pending files ({} strategy, {} at a time)",
            dispatcher.strategy(),
            gate.capacity()
        );

        for record in PendingFiles::new(self.db, self.options.page_size) {
            let record = match record {
                Ok(record) => record,
                Err(e) => {
                    error!("Stopping dispatch, work queue unavailable: {}", e);
                    break;
                }
            };

            let permit = gate.acquire().await?;
            while let Ok(outcome) = rx.try_recv() {
                self.settle(&mut in_flight, outcome, &mut stats, reporter);
            }

            let job_id = match self.db.begin_upload(&self.batch_id, &record.id) {
                Ok(Some(job_id)) => job_id,
                Ok(None) => {
                    debug!("Record {} is no longer pending, skipping", record.id);
                    stats.skipped += 1;
                    continue;
                }
                Err(e) => {
                    error!("Cannot mark {} in progress: {}", record.file_path, e);
                    stats.skipped += 1;
                    continue;
                }
            };

            in_flight.insert(record.id.clone(), job_id);
            reporter.on_dispatch(&record);
            stats.dispatched += 1;
            dispatcher.dispatch(
                UploadTask::from_record(&record, &self.options.bucket),
                UnitTicket::new(record.id.as_str(), permit, tx.clone()),
            );
        }

        drop(tx);
        dispatcher.join(&gate).await?;
        while let Some(outcome) = rx.recv().await {
            self.settle(&mut in_flight, outcome, &mut stats, reporter);
        }


        info!(
            "Dispatch finished: {} dispatched, {} completed, {} failed, {} skipped, {} unrecorded",
            stats.dispatched, stats.completed, stats.failed, stats.skipped, stats.unrecorded
        );
        Ok(stats)
    }

    fn settle(
        &self,
        in_flight: &mut HashMap<String, String>,
        outcome: UploadOutcome,
        stats: &mut ScheduleStats,
        reporter: &dyn ProgressReporter,
    ) {
        let Some(job_id) = in_flight.remove(&outcome.file_id) else {
            warn!("Ignoring outcome for unknown record {}", outcome.file_id);
            return;
        };

        let status = if outcome.status.is_terminal() {
            outcome.status
        } else {
            UploadStatus::Failed
        };

        match self.db.finish_upload(&job_id, &outcome.file_id, status) {
            Ok(true) => match status {
                UploadStatus::Completed => stats.completed += 1,
                _ => stats.failed += 1,
            },
            Ok(false) => {
                warn!("Record {} was not in progress when settled", outcome.file_id);
                stats.unrecorded += 1;
            }
            Err(e) => {
                error!("Cannot record outcome for {}: {}", outcome.file_id, e);
                stats.unrecorded += 1;
            }
        }
        reporter.on_settled(&outcome.file_id, status);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::NewFileRecord;
    use std::sync::{Arc, Mutex};

    #[test]
    fn test_strategy_from_flags() {
        assert_eq!(Strategy::from_flags(false, false), Strategy::Cooperative);
        assert_eq!(Strategy::from_flags(true, false), Strategy::Cooperative);
        assert_eq!(Strategy::from_flags(false, true), Strategy::Parallel);
        assert_eq!(Strategy::from_flags(true, true), Strategy::Cooperative);
    }

    /// Settles every unit immediately with a scripted status, or drops
    /// drops the ticket unanswered for ids in `silent`.
    struct InlineDispatcher {
        fail: Vec<String>,
        silent: Vec<String>,
        seen: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl Dispatcher for InlineDispatcher {
        fn strategy(&self) -> Strategy {
            Strategy::Cooperative
        }

        fn dispatch(&mut self, task: UploadTask, ticket: UnitTicket) {
            self.seen.lock().unwrap().push(task.metadata.file_name.clone());
            if self.silent.contains(&task.metadata.file_name) {
                drop(ticket);
                return;
            }
            let status = if self.fail.contains(&task.metadata.file_name) {
                UploadStatus::Failed
            } else {
                UploadStatus::Completed
            };
            ticket.complete(status);
        }

        async fn join(&mut self, gate: &AdmissionGate) -> Result<()> {
            gate.wait_idle().await
        }
    }

    fn seed(db: &Database, files: &[(&str, u64)]) -> String {
        let batch = db.create_batch("/root").unwrap();
        for (name, size) in files {
            db.insert_file_record(
                &batch.id,
                &NewFileRecord {
                    size: *size,
                    last_modified: 0,
                    permissions: "644".to_string(),
                    file_name: name.to_string(),
                    file_path: format!("/root/{}", name),
                },
            )
            .unwrap();
        }
        batch.id
    }

    fn options(concurrency: usize) -> ScheduleOptions {
        ScheduleOptions {
            bucket: "bucket".to_string(),
            concurrency,
            page_size: 2,
        }
    }

    #[tokio::test]
    async fn test_dispatches_in_size_order_and_settles() {
        let db = Database::open_in_memory().unwrap();
        let batch_id = seed(&db, &[("big", 50), ("small", 10), ("mid", 20)]);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut dispatcher = InlineDispatcher {
            fail: vec!["big".to_string()],
            silent: Vec::new(),
            seen: Arc::clone(&seen),
        };

        let stats = Scheduler::new(&db, &batch_id, options(2))
            .run(&mut dispatcher, &crate::progress::SilentReporter)
            .await
            .unwrap();

        assert_eq!(*seen.lock().unwrap(), vec!["small", "mid", "big"]);
        assert_eq!(
            stats,
            ScheduleStats {
                dispatched: 3,
                completed: 2,
                failed: 1,
                skipped: 0,
                unrecorded: 0,
            }
        );
        let counts = db.status_counts().unwrap();
        assert_eq!((counts.completed, counts.failed, counts.in_progress), (2, 1, 0));
    }

    #[tokio::test]
    async fn test_unreported_unit_is_marked_failed() {
        let db = Database::open_in_memory().unwrap();
        let batch_id = seed(&db, &[("lost", 1), ("fine", 2)]);
        let mut dispatcher = InlineDispatcher {
            fail: Vec::new(),
            silent: vec!["lost".to_string()],
            seen: Arc::new(Mutex::new(Vec::new())),
        };

        let stats = Scheduler::new(&db, &batch_id, options(1))
            .run(&mut dispatcher, &crate::progress::SilentReporter)
            .await
            .unwrap();

        assert_eq!((stats.completed, stats.failed), (1, 1));
        let counts = db.status_counts().unwrap();
        assert_eq!((counts.completed, counts.failed, counts.in_progress), (1, 1, 0));
    }

    #[tokio::test]
    async fn test_dropped_ticket_reports_failed_before_releasing_slot() {
        let gate = AdmissionGate::new(1);
        let (tx, mut rx) = mpsc::unbounded_channel();
        let ticket = UnitTicket::new("rec-1", gate.acquire().await.unwrap(), tx);

        let unit = tokio::spawn(async move {
            let _ticket = ticket;
            panic!("uploader blew up");
        });
        assert!(unit.await.unwrap_err().is_panic());

        assert_eq!(gate.in_flight(), 0);
        assert_eq!(
            rx.recv().await.unwrap(),
            UploadOutcome {
                file_id: "rec-1".to_string(),
                status: UploadStatus::Failed
            }
        );
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_completed_ticket_reports_once() {
        let gate = AdmissionGate::new(1);
        let (tx, mut rx) = mpsc::unbounded_channel();
        let ticket = UnitTicket::new("rec-2", gate.acquire().await.unwrap(), tx);
        assert_eq!(ticket.file_id(), "rec-2");

        ticket.complete(UploadStatus::Completed);
        assert_eq!(gate.in_flight(), 0);
        assert_eq!(rx.recv().await.unwrap().status, UploadStatus::Completed);
        assert!(rx.recv().await.is_none());
    }

    #[test]
    fn test_refused_outcome_is_not_counted_as_settled() {
        let db = Database::open_in_memory().unwrap();
        let batch_id = seed(&db, &[("raced", 3)]);
        let record = db.fetch_pending_page(None, 1).unwrap().remove(0);
        let job_id = db.begin_upload(&batch_id, &record.id).unwrap().unwrap();
        // Someone else settles it first
        assert!(db.finish_upload(&job_id, &record.id, UploadStatus::Completed).unwrap());

        let scheduler = Scheduler::new(&db, &batch_id, options(1));
        let mut in_flight = HashMap::from([(record.id.clone(), job_id)]);
        let mut stats = ScheduleStats::default();
        scheduler.settle(
            &mut in_flight,
            UploadOutcome {
                file_id: record.id.clone(),
                status: UploadStatus::Failed,
            },
            &mut stats,
            &crate::progress::SilentReporter,
        );

        assert_eq!((stats.completed, stats.failed, stats.unrecorded), (0, 0, 1));
        let stored = db.get_file_record(&record.id).unwrap().unwrap();
        assert_eq!(stored.status, UploadStatus::Completed);
    }

    #[tokio::test]
    async fn test_empty_queue_dispatches_nothing() {
        let db = Database::open_in_memory().unwrap();
        let batch = db.create_batch("/root").unwrap();
        let mut dispatcher = InlineDispatcher {
            fail: Vec::new(),
            silent: Vec::new(),
            seen: Arc::new(Mutex::new(Vec::new())),
        };

        let stats = Scheduler::new(&db, &batch.id, options(4))
            .run(&mut dispatcher, &crate::progress::SilentReporter)
            .await
            .unwrap();
        assert_eq!(stats, ScheduleStats::default());
    }
}
