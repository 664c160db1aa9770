//! Worker registry and the scheduling loop.

use serde::Serialize;
use stagehand_config::SchedulerConfig;
use stagehand_core::{
    CapabilityFilter, Error, Result, StageAssignment, StageDescriptor, StageFilter, StageStore,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::{Notify, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::matcher::matches;

/// One runner waiting in `register_and_wait`.
struct WorkerHandle {
    filter: CapabilityFilter,
    delivery: oneshot::Sender<StageAssignment>,
}

#[derive(Default)]
struct Registry {
    workers: HashMap<u64, WorkerHandle>,
    paused: bool,
}

impl Registry {
    /// First registered worker able to run `stage`, in map order.
    fn find_match(&self, stage: &StageDescriptor) -> Option<u64> {
        self.workers
            .iter()
            .find(|(_, worker)| matches(&worker.filter, stage))
            .map(|(key, _)| *key)
    }
}

/// Point-in-time view of the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct QueueStats {
    /// Workers currently waiting for a stage.
    pub waiting: usize,
    pub paused: bool,
    /// Passes that queried the store.
    pub passes: u64,
    /// Stages handed to workers since start.
    pub delivered: u64,
}

/// Matches waiting workers with eligible stages.
///
/// Every registry change and every delivery happens under one mutex, so a
/// worker is either matched or cancelled, never both. Scan passes are
/// serialized separately so the store query can run without holding the
/// registry lock.
///
/// A stage goes to at most one worker per pass. It stays eligible until the
/// runner claims it with [`stagehand_core::StageRepo::accept`], so a later pass
/// may offer it again; the store's conditional `accept` is the real claim.
pub struct Queue {
    store: Arc<dyn StageStore>,
    interval: Duration,
    registry: Mutex<Registry>,
    pass_lock: tokio::sync::Mutex<()>,
    ready: Notify,
    next_worker: AtomicU64,
    passes: AtomicU64,
    delivered: AtomicU64,
}

impl Queue {
    pub fn new(store: Arc<dyn StageStore>, config: &SchedulerConfig) -> Self {
        Self {
            store,
            interval: config.poll_interval,
            registry: Mutex::new(Registry {
                workers: HashMap::new(),
                paused: config.paused,
            }),
            pass_lock: tokio::sync::Mutex::new(()),
            ready: Notify::new(),
            next_worker: AtomicU64::new(1),
            passes: AtomicU64::new(0),
            delivered: AtomicU64::new(0),
        }
    }

    /// Ask the loop to scan again.
    ///
    /// Never blocks. Calls made before the loop wakes up collapse into a
    /// single pass.
    pub fn notify(&self) {
        self.ready.notify_one();
    }

    /// Register a worker and wait until it is handed a stage or `cancel` fires.
    ///
    /// On cancellation the worker leaves the registry and [`Error::Cancelled`]
    /// is returned, unless a stage was delivered first, in which case the
    /// stage wins. Dropping the returned future also removes the worker.
    pub async fn register_and_wait(
        &self,
        filter: CapabilityFilter,
        cancel: &CancellationToken,
    ) -> Result<StageAssignment> {
        let (tx, mut rx) = oneshot::channel();
        let key = self.next_worker.fetch_add(1, Ordering::Relaxed);
        debug!(worker = key, ?filter, "Worker waiting for a stage");
        self.registry().workers.insert(
            key,
            WorkerHandle {
                filter,
                delivery: tx,
            },
        );
        let _registration = Registration { queue: self, key };
        self.notify();

        let delivered = tokio::select! {
            delivered = &mut rx => Some(delivered),
            _ = cancel.cancelled() => None,
        };

        match delivered {
            Some(result) => {
                result.map_err(|_| Error::Internal("delivery slot closed".to_string()))
            }
            None => {
                if self.deregister(key) {
                    debug!(worker = key, "Worker cancelled");
                    return Err(Error::Cancelled);
                }
                // Matched before we got the lock; the stage is already in the slot.
                rx.try_recv().map_err(|_| Error::Cancelled)
            }
        }
    }

    /// Run the scheduling loop until `shutdown` fires.
    ///
    /// Wakes on [`Queue::notify`] or after the poll interval and runs one
    /// pass each time. A failed pass is logged and the loop carries on.
    pub async fn run(&self, shutdown: CancellationToken) {
        info!(interval = ?self.interval, "Starting scheduling loop");

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = self.ready.notified() => {}
                _ = tokio::time::sleep(self.interval) => {}
            }

            if let Err(e) = self.scan().await {
                error!(error = %e, "Scan pass failed");
            }
        }

        info!("Scheduling loop stopped");
    }

    /// One match-and-assign pass. Returns how many stages were delivered.
    ///
    /// Stages are offered in the order the store returns them, each to the
    /// first matching worker found.
    pub async fn scan(&self) -> Result<usize> {
        let _pass = self.pass_lock.lock().await;

        if !self.wants_work() {
            return Ok(0);
        }

        self.passes.fetch_add(1, Ordering::Relaxed);
        let stages = self.store.find_eligible(&StageFilter::eligible()).await?;
        debug!(eligible = stages.len(), "Scanning eligible stages");

        let mut registry = self.registry();
        if registry.paused {
            return Ok(0);
        }

        let mut delivered = 0;
        for stage in &stages {
            if registry.workers.is_empty() {
                break;
            }
            // The store may lag behind claims made elsewhere.
            if !stage.is_eligible() {
                continue;
            }
            if Self::offer(&mut registry, stage) {
                delivered += 1;
            }
        }
        drop(registry);

        self.delivered.fetch_add(delivered as u64, Ordering::Relaxed);
        Ok(delivered)
    }

    /// Stop handing out stages. Workers keep waiting.
    pub fn pause(&self) {
        self.registry().paused = true;
        info!("Scheduling paused");
    }

    pub fn resume(&self) {
        self.registry().paused = false;
        info!("Scheduling resumed");
        self.notify();
    }

    pub fn paused(&self) -> bool {
        self.registry().paused
    }

    /// Number of workers currently registered.
    pub fn waiting(&self) -> usize {
        self.registry().workers.len()
    }

    pub fn stats(&self) -> QueueStats {
        let registry = self.registry();
        QueueStats {
            waiting: registry.workers.len(),
            paused: registry.paused,
            passes: self.passes.load(Ordering::Relaxed),
            delivered: self.delivered.load(Ordering::Relaxed),
        }
    }

    pub fn poll_interval(&self) -> Duration {
        self.interval
    }

    fn wants_work(&self) -> bool {
        let registry = self.registry();
        !registry.paused && !registry.workers.is_empty()
    }

    /// Hand `stage` to the first matching worker. Workers whose caller has
    /// already gone away are dropped and the next match is tried.
    fn offer(registry: &mut Registry, stage: &StageDescriptor) -> bool {
        while let Some(key) = registry.find_match(stage) {
            let Some(worker) = registry.workers.remove(&key) else {
                break;
            };
            match worker.delivery.send(StageAssignment::from(stage)) {
                Ok(()) => {
                    info!(stage_id = %stage.id, build_id = %stage.build_id, worker = key, "Stage assigned");
                    return true;
                }
                Err(_) => {
                    debug!(worker = key, "Worker left before delivery");
                }
            }
        }
        false
    }

    fn deregister(&self, key: u64) -> bool {
        self.registry().workers.remove(&key).is_some()
    }

    fn registry(&self) -> MutexGuard<'_, Registry> {
        // Registry updates are single map operations, so a poisoned lock
        // still guards a consistent map.
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Removes a worker from the registry when its wait ends for any reason.
struct Registration<'a> {
    queue: &'a Queue,
    key: u64,
}

impl Drop for Registration<'_> {
    fn drop(&mut self) {
        if self.queue.deregister(self.key) {
            debug!(worker = self.key, "Worker dropped while waiting");
        }
    }
}
