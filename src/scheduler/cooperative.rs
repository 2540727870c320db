use super::gate::AdmissionGate;
use super::{Dispatcher, Strategy, UnitTicket};
use crate::error::Result;
use crate::uploader::{perform_upload, UploadTask, Uploader};
use async_trait::async_trait;
use std::sync::Arc;

/// Runs each admitted unit as a task on the current runtime, calling the
/// in-process uploader. On a current-thread runtime the units interleave
/// cooperatively at their I/O points.
pub struct CooperativeDispatcher {
    uploader: Arc<dyn Uploader>,
}

impl CooperativeDispatcher {
    pub fn new(uploader: Arc<dyn Uploader>) -> Self {
        Self { uploader }
    }
}

#[async_trait]
impl Dispatcher for CooperativeDispatcher {
    fn strategy(&self) -> Strategy {
        Strategy::Cooperative
    }

    fn dispatch(&mut self, task: UploadTask, ticket: UnitTicket) {
        let uploader = Arc::clone(&self.uploader);
        tokio::spawn(async move {
            let status = perform_upload(uploader.as_ref(), &task).await;
            ticket.complete(status);
        });
    }

    async fn join(&mut self, gate: &AdmissionGate) -> Result<()> {
        gate.wait_idle().await
    }
}
