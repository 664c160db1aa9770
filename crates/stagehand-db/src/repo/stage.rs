//! Stage repository.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use stagehand_core::{
    BuildId, NewStage, Result, StageDescriptor, StageFilter, StageId, StageRepo, StageStatus,
    StageStore,
};
use tracing::debug;

use crate::{DbError, DbResult};

/// A stage row.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct StageRecord {
    pub id: uuid::Uuid,
    pub build_id: uuid::Uuid,
    pub name: String,
    pub kind: String,
    #[sqlx(rename = "type")]
    pub stage_type: String,
    pub os: String,
    pub arch: String,
    pub status: String,
    pub machine: String,
    pub started: Option<DateTime<Utc>>,
    pub stopped: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<StageRecord> for StageDescriptor {
    type Error = DbError;

    fn try_from(record: StageRecord) -> DbResult<Self> {
        let status: StageStatus = record.status.parse().map_err(|_| {
            DbError::InvalidRow(format!(
                "stage {} has unknown status {:?}",
                record.id, record.status
            ))
        })?;
        Ok(StageDescriptor {
            id: StageId::from(record.id),
            build_id: BuildId::from(record.build_id),
            name: record.name,
            kind: record.kind,
            stage_type: record.stage_type,
            os: record.os,
            arch: record.arch,
            status,
            machine: record.machine,
            started: record.started,
            stopped: record.stopped,
        })
    }
}

fn to_descriptors(records: Vec<StageRecord>) -> DbResult<Vec<StageDescriptor>> {
    records.into_iter().map(StageDescriptor::try_from).collect()
}

/// PostgreSQL implementation of [`StageStore`] and [`StageRepo`].
#[derive(Clone)]
pub struct PgStageStore {
    pool: PgPool,
}

impl PgStageStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn query_eligible(&self, filter: &StageFilter) -> DbResult<Vec<StageDescriptor>> {
        let records = sqlx::query_as::<_, StageRecord>(
            r#"
            SELECT * FROM stages
            WHERE ($1 = FALSE OR status <> 'running')
              AND ($2 = FALSE OR machine = '')
              AND ($3 = FALSE OR status IN ('pending', 'running'))
            ORDER BY created_at ASC, id ASC
            "#,
        )
        .bind(filter.exclude_running)
        .bind(filter.exclude_assigned)
        .bind(filter.exclude_done)
        .fetch_all(&self.pool)
        .await?;
        to_descriptors(records)
    }

    async fn insert(&self, new: NewStage) -> DbResult<StageDescriptor> {
        let id = StageId::new();
        let build_id = new.build_id.unwrap_or_else(BuildId::new);
        let record = sqlx::query_as::<_, StageRecord>(
            r#"
            INSERT INTO stages (id, build_id, name, kind, type, os, arch, status, machine, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, 'pending', '', NOW(), NOW())
            RETURNING *
            "#,
        )
        .bind(id.as_uuid())
        .bind(build_id.as_uuid())
        .bind(&new.name)
        .bind(&new.kind)
        .bind(&new.stage_type)
        .bind(&new.os)
        .bind(&new.arch)
        .fetch_one(&self.pool)
        .await?;
        record.try_into()
    }

    async fn fetch(&self, id: StageId) -> DbResult<StageDescriptor> {
        let record = sqlx::query_as::<_, StageRecord>("SELECT * FROM stages WHERE id = $1")
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| DbError::NotFound(format!("stage {}", id)))?;
        record.try_into()
    }

    /// Claim the stage only while no machine holds it.
    async fn claim(&self, id: StageId, machine: &str) -> DbResult<StageDescriptor> {
        let record = sqlx::query_as::<_, StageRecord>(
            r#"
            UPDATE stages
            SET machine = $2, status = 'running', started = NOW(), updated_at = NOW()
            WHERE id = $1 AND machine = ''
            RETURNING *
            "#,
        )
        .bind(id.as_uuid())
        .bind(machine)
        .fetch_optional(&self.pool)
        .await?;

        match record {
            Some(record) => record.try_into(),
            None => {
                let existing = self.fetch(id).await?;
                Err(DbError::Conflict(format!(
                    "stage {} already accepted by {}",
                    id, existing.machine
                )))
            }
        }
    }

    async fn unclaim(&self, id: StageId) -> DbResult<StageDescriptor> {
        let record = sqlx::query_as::<_, StageRecord>(
            r#"
            UPDATE stages
            SET machine = '', status = 'pending', started = NULL, stopped = NULL, updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| DbError::NotFound(format!("stage {}", id)))?;
        record.try_into()
    }

    async fn set_status(&self, id: StageId, status: StageStatus) -> DbResult<StageDescriptor> {
        let record = sqlx::query_as::<_, StageRecord>(
            r#"
            UPDATE stages
            SET status = $2,
                stopped = CASE WHEN $3 THEN NOW() ELSE stopped END,
                updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id.as_uuid())
        .bind(status.as_str())
        .bind(status.is_done())
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| DbError::NotFound(format!("stage {}", id)))?;
        record.try_into()
    }
}

#[async_trait]
impl StageStore for PgStageStore {
    async fn find_eligible(&self, filter: &StageFilter) -> Result<Vec<StageDescriptor>> {
        let stages = self.query_eligible(filter).await?;
        debug!(count = stages.len(), "Loaded eligible stages");
        Ok(stages)
    }
}

#[async_trait]
impl StageRepo for PgStageStore {
    async fn create(&self, stage: NewStage) -> Result<StageDescriptor> {
        if stage.name.is_empty() {
            return Err(stagehand_core::Error::InvalidInput(
                "stage name is required".to_string(),
            ));
        }
        Ok(self.insert(stage).await?)
    }

    async fn get(&self, id: StageId) -> Result<StageDescriptor> {
        Ok(self.fetch(id).await?)
    }

    async fn accept(&self, id: StageId, machine: &str) -> Result<StageDescriptor> {
        if machine.is_empty() {
            return Err(stagehand_core::Error::InvalidInput(
                "machine is required".to_string(),
            ));
        }
        Ok(self.claim(id, machine).await?)
    }

    async fn release(&self, id: StageId) -> Result<StageDescriptor> {
        Ok(self.unclaim(id).await?)
    }

    async fn update_status(&self, id: StageId, status: StageStatus) -> Result<StageDescriptor> {
        Ok(self.set_status(id, status).await?)
    }
}
