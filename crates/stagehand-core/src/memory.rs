//! In-memory stage store.

use async_trait::async_trait;
use chrono::Utc;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::{
    BuildId, Error, NewStage, Result, StageDescriptor, StageFilter, StageId, StageRepo,
    StageStatus, StageStore,
};

/// Keeps stages in insertion order, which is also the order they are
/// returned to the scheduler.
#[derive(Debug, Default)]
pub struct MemoryStageStore {
    stages: RwLock<Vec<StageDescriptor>>,
}

impl MemoryStageStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a stage as-is, replacing any stage with the same id.
    pub fn insert(&self, stage: StageDescriptor) -> Result<()> {
        let mut stages = self.write()?;
        match stages.iter_mut().find(|s| s.id == stage.id) {
            Some(existing) => *existing = stage,
            None => stages.push(stage),
        }
        Ok(())
    }

    /// Snapshot of every stored stage.
    pub fn all(&self) -> Result<Vec<StageDescriptor>> {
        Ok(self.read()?.clone())
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Vec<StageDescriptor>>> {
        self.stages
            .read()
            .map_err(|_| Error::Internal("stage store lock poisoned".to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Vec<StageDescriptor>>> {
        self.stages
            .write()
            .map_err(|_| Error::Internal("stage store lock poisoned".to_string()))
    }

    fn modify<F>(&self, id: StageId, f: F) -> Result<StageDescriptor>
    where
        F: FnOnce(&mut StageDescriptor) -> Result<()>,
    {
        let mut stages = self.write()?;
        let stage = stages
            .iter_mut()
            .find(|s| s.id == id)
            .ok_or_else(|| Error::NotFound(format!("stage {}", id)))?;
        f(stage)?;
        Ok(stage.clone())
    }
}

#[async_trait]
impl StageStore for MemoryStageStore {
    async fn find_eligible(&self, filter: &StageFilter) -> Result<Vec<StageDescriptor>> {
        Ok(self
            .read()?
            .iter()
            .filter(|s| filter.admits(s))
            .cloned()
            .collect())
    }
}

#[async_trait]
impl StageRepo for MemoryStageStore {
    async fn create(&self, new: NewStage) -> Result<StageDescriptor> {
        if new.name.is_empty() {
            return Err(Error::InvalidInput("stage name is required".to_string()));
        }
        let mut stage =
            StageDescriptor::pending(new.build_id.unwrap_or_else(BuildId::new), new.name);
        stage.kind = new.kind;
        stage.stage_type = new.stage_type;
        stage.os = new.os;
        stage.arch = new.arch;
        self.write()?.push(stage.clone());
        Ok(stage)
    }

    async fn get(&self, id: StageId) -> Result<StageDescriptor> {
        self.read()?
            .iter()
            .find(|s| s.id == id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("stage {}", id)))
    }

    async fn accept(&self, id: StageId, machine: &str) -> Result<StageDescriptor> {
        if machine.is_empty() {
            return Err(Error::InvalidInput("machine is required".to_string()));
        }
        self.modify(id, |stage| {
            if !stage.machine.is_empty() {
                return Err(Error::Conflict(format!(
                    "stage {} already accepted by {}",
                    id, stage.machine
                )));
            }
            stage.machine = machine.to_string();
            stage.status = StageStatus::Running;
            stage.started = Some(Utc::now());
            Ok(())
        })
    }

    async fn release(&self, id: StageId) -> Result<StageDescriptor> {
        self.modify(id, |stage| {
            stage.machine.clear();
            stage.status = StageStatus::Pending;
            stage.started = None;
            stage.stopped = None;
            Ok(())
        })
    }

    async fn update_status(&self, id: StageId, status: StageStatus) -> Result<StageDescriptor> {
        self.modify(id, |stage| {
            stage.status = status;
            if status.is_done() {
                stage.stopped = Some(Utc::now());
            }
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_stage(name: &str) -> NewStage {
        NewStage {
            name: name.to_string(),
            os: "linux".to_string(),
            arch: "amd64".to_string(),
            ..NewStage::default()
        }
    }

    #[tokio::test]
    async fn test_find_eligible_keeps_insertion_order() {
        let store = MemoryStageStore::new();
        let a = store.create(new_stage("a")).await.unwrap();
        let b = store.create(new_stage("b")).await.unwrap();
        let c = store.create(new_stage("c")).await.unwrap();
        store.accept(b.id, "runner-1").await.unwrap();

        let eligible = store.find_eligible(&StageFilter::eligible()).await.unwrap();
        let ids: Vec<_> = eligible.iter().map(|s| s.id).collect();
        assert_eq!(ids, vec![a.id, c.id]);

        let everything = store.find_eligible(&StageFilter::default()).await.unwrap();
        assert_eq!(everything.len(), 3);
    }

    #[tokio::test]
    async fn test_finished_unclaimed_stage_is_not_eligible() {
        let store = MemoryStageStore::new();
        let killed = store.create(new_stage("killed")).await.unwrap();
        let pending = store.create(new_stage("pending")).await.unwrap();
        store
            .update_status(killed.id, StageStatus::Killed)
            .await
            .unwrap();

        let eligible = store.find_eligible(&StageFilter::eligible()).await.unwrap();
        let ids: Vec<_> = eligible.iter().map(|s| s.id).collect();
        assert_eq!(ids, vec![pending.id]);
    }

    #[tokio::test]
    async fn test_accept_conflicts_once_claimed() {
        let store = MemoryStageStore::new();
        let stage = store.create(new_stage("build")).await.unwrap();

        let accepted = store.accept(stage.id, "runner-1").await.unwrap();
        assert_eq!(accepted.machine, "runner-1");
        assert_eq!(accepted.status, StageStatus::Running);
        assert!(accepted.started.is_some());

        let err = store.accept(stage.id, "runner-2").await.unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));
    }

    #[tokio::test]
    async fn test_release_makes_stage_eligible_again() {
        let store = MemoryStageStore::new();
        let stage = store.create(new_stage("build")).await.unwrap();
        store.accept(stage.id, "runner-1").await.unwrap();

        let released = store.release(stage.id).await.unwrap();
        assert!(released.is_eligible());
        assert_eq!(released.status, StageStatus::Pending);
    }

    #[tokio::test]
    async fn test_update_status_stamps_stopped() {
        let store = MemoryStageStore::new();
        let stage = store.create(new_stage("build")).await.unwrap();

        let running = store
            .update_status(stage.id, StageStatus::Running)
            .await
            .unwrap();
        assert!(running.stopped.is_none());

        let done = store
            .update_status(stage.id, StageStatus::Success)
            .await
            .unwrap();
        assert!(done.stopped.is_some());
    }

    #[tokio::test]
    async fn test_missing_stage_is_not_found() {
        let store = MemoryStageStore::new();
        let err = store.get(StageId::new()).await.unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[tokio::test]
    async fn test_create_requires_name() {
        let store = MemoryStageStore::new();
        let err = store.create(NewStage::default()).await.unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }
}
