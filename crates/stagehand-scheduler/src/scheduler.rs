//! Scheduler facade used by transports.

use async_trait::async_trait;
use stagehand_core::{CapabilityFilter, Error, Result, StageAssignment, StageDescriptor};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::queue::{Queue, QueueStats};

/// The two sides of stage scheduling, plus operator controls.
#[async_trait]
pub trait Scheduler: Send + Sync {
    /// Tell the scheduler a stage may have become eligible.
    ///
    /// Only triggers a re-scan; eligibility is always re-read from the store.
    async fn schedule(&self, stage: &StageDescriptor) -> Result<()>;

    /// Wait for a stage this worker can run.
    ///
    /// There is no built-in deadline; the caller cancels through `cancel`.
    async fn request(
        &self,
        filter: CapabilityFilter,
        cancel: CancellationToken,
    ) -> Result<StageAssignment>;

    /// Like [`Scheduler::request`], giving up with [`Error::Timeout`] after `timeout`.
    async fn request_timeout(
        &self,
        filter: CapabilityFilter,
        timeout: Duration,
    ) -> Result<StageAssignment> {
        let cancel = CancellationToken::new();
        let request = self.request(filter, cancel.clone());
        tokio::pin!(request);

        tokio::select! {
            result = &mut request => return result,
            _ = tokio::time::sleep(timeout) => {}
        }

        // Cancel and let the request settle so a stage delivered at the
        // deadline is still returned.
        cancel.cancel();
        match request.await {
            Err(Error::Cancelled) => Err(Error::Timeout(format!(
                "no stage within {}s",
                timeout.as_secs_f64()
            ))),
            other => other,
        }
    }

    async fn pause(&self) -> Result<()>;

    async fn resume(&self) -> Result<()>;

    async fn stats(&self) -> Result<QueueStats>;
}

/// [`Scheduler`] backed by an in-process [`Queue`].
pub struct QueueScheduler {
    queue: Arc<Queue>,
}

impl QueueScheduler {
    pub fn new(queue: Arc<Queue>) -> Self {
        Self { queue }
    }

    pub fn queue(&self) -> Arc<Queue> {
        Arc::clone(&self.queue)
    }

    /// Spawn the scheduling loop on the current runtime.
    pub fn start(&self, shutdown: CancellationToken) -> JoinHandle<()> {
        let queue = self.queue();
        tokio::spawn(async move { queue.run(shutdown).await })
    }
}

#[async_trait]
impl Scheduler for QueueScheduler {
    async fn schedule(&self, stage: &StageDescriptor) -> Result<()> {
        debug!(stage_id = %stage.id, "Stage scheduled");
        self.queue.notify();
        Ok(())
    }

    async fn request(
        &self,
        filter: CapabilityFilter,
        cancel: CancellationToken,
    ) -> Result<StageAssignment> {
        self.queue.register_and_wait(filter, &cancel).await
    }

    async fn pause(&self) -> Result<()> {
        self.queue.pause();
        Ok(())
    }

    async fn resume(&self) -> Result<()> {
        self.queue.resume();
        Ok(())
    }

    async fn stats(&self) -> Result<QueueStats> {
        Ok(self.queue.stats())
    }
}
