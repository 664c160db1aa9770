//! Store traits.
//!
//! The scheduler only ever reads through [`StageStore`]. [`StageRepo`] is the
//! write side used by the transport and by whatever drives the build state
//! machine (claiming, finishing and releasing stages).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::{BuildId, Result, StageDescriptor, StageId, StageStatus};

/// Which stages a store query should leave out.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StageFilter {
    /// Leave out stages whose status is `running`.
    pub exclude_running: bool,
    /// Leave out stages that already have a machine.
    pub exclude_assigned: bool,
    /// Leave out stages with a finished status.
    pub exclude_done: bool,
}

impl StageFilter {
    /// The filter the scheduler uses: unassigned, not running and not finished.
    pub fn eligible() -> Self {
        Self {
            exclude_running: true,
            exclude_assigned: true,
            exclude_done: true,
        }
    }

    pub fn admits(&self, stage: &StageDescriptor) -> bool {
        if self.exclude_running && stage.status.is_running() {
            return false;
        }
        if self.exclude_assigned && !stage.machine.is_empty() {
            return false;
        }
        if self.exclude_done && stage.status.is_done() {
            return false;
        }
        true
    }
}

/// Read access to stages for the scheduling loop.
#[async_trait]
pub trait StageStore: Send + Sync {
    /// List stages passing `filter`.
    ///
    /// The order of the returned stages is the order they are offered to
    /// workers in; implementations return oldest first.
    async fn find_eligible(&self, filter: &StageFilter) -> Result<Vec<StageDescriptor>>;
}

/// A stage to be inserted into the store.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewStage {
    pub build_id: Option<BuildId>,
    pub name: String,
    #[serde(default)]
    pub kind: String,
    #[serde(default, rename = "type")]
    pub stage_type: String,
    #[serde(default)]
    pub os: String,
    #[serde(default)]
    pub arch: String,
}

/// Stage lifecycle operations owned by the surrounding system.
#[async_trait]
pub trait StageRepo: Send + Sync {
    async fn create(&self, stage: NewStage) -> Result<StageDescriptor>;

    async fn get(&self, id: StageId) -> Result<StageDescriptor>;

    /// Claim an unassigned stage for `machine` and mark it running.
    ///
    /// Fails with [`crate::Error::Conflict`] when another machine got there first.
    async fn accept(&self, id: StageId, machine: &str) -> Result<StageDescriptor>;

    /// Clear the machine and put the stage back to pending so the scheduler
    /// offers it again.
    async fn release(&self, id: StageId) -> Result<StageDescriptor>;

    async fn update_status(&self, id: StageId, status: StageStatus) -> Result<StageDescriptor>;
}
