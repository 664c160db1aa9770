//! Application state.

use stagehand_config::SchedulerConfig;
use stagehand_core::{StageRepo, StageStore};
use stagehand_scheduler::{Queue, QueueScheduler, Scheduler};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub repo: Arc<dyn StageRepo>,
    pub scheduler: Arc<dyn Scheduler>,
    /// How long a runner request is held open before answering with no work.
    pub request_timeout: Duration,
    /// Fires when the server starts draining; open runner requests give up.
    pub draining: CancellationToken,
}

impl AppState {
    pub fn new(
        repo: Arc<dyn StageRepo>,
        scheduler: Arc<dyn Scheduler>,
        request_timeout: Duration,
    ) -> Self {
        Self {
            repo,
            scheduler,
            request_timeout,
            draining: CancellationToken::new(),
        }
    }

    /// Use `draining` to end open runner requests on shutdown.
    pub fn with_draining(mut self, draining: CancellationToken) -> Self {
        self.draining = draining;
        self
    }

    /// Wire one store into both the scheduler and the stage endpoints.
    ///
    /// The returned [`QueueScheduler`] still has to be started.
    pub fn with_store<S>(
        store: Arc<S>,
        config: &SchedulerConfig,
        request_timeout: Duration,
    ) -> (Self, Arc<QueueScheduler>)
    where
        S: StageStore + StageRepo + 'static,
    {
        let queue = Arc::new(Queue::new(store.clone(), config));
        let scheduler = Arc::new(QueueScheduler::new(queue));
        let state = Self::new(store, scheduler.clone(), request_timeout);
        (state, scheduler)
    }
}
