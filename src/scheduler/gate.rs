use crate::error::Result;
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Admission gate bounding simultaneous in-flight uploads to `capacity`.
#[derive(Debug, Clone)]
pub struct AdmissionGate {
    permits: Arc<Semaphore>,
    capacity: usize,
}

/// One unit of gate capacity. Dropping it returns the unit.
#[derive(Debug)]
pub struct GatePermit {
    _permit: OwnedSemaphorePermit,
}

impl AdmissionGate {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.clamp(1, u32::MAX as usize);
        Self {
            permits: Arc::new(Semaphore::new(capacity)),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Units currently held.
    pub fn in_flight(&self) -> usize {
        self.capacity - self.permits.available_permits()
    }

    /// Suspends until a unit is free.
    pub async fn acquire(&self) -> Result<GatePermit> {
        let permit = Arc::clone(&self.permits).acquire_owned().await?;
        Ok(GatePermit { _permit: permit })
    }

    /// Suspends until every unit has been returned.
    pub async fn wait_idle(&self) -> Result<()> {
        let _all = self.permits.acquire_many(self.capacity as u32).await?;
        Ok(())
    }
}
