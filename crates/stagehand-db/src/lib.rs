//! PostgreSQL persistence for Stagehand.
//!
//! [`PgStageStore`] backs both the scheduler's eligible-stage query and the
//! stage lifecycle endpoints.

pub mod error;
pub mod repo;

pub use error::{DbError, DbResult};
pub use repo::*;

use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use std::time::Duration;
use tracing::info;

/// How long a query waits for a free connection before failing the pass.
const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(5);

fn pool_options(max_connections: u32) -> PgPoolOptions {
    PgPoolOptions::new()
        .max_connections(max_connections.max(1))
        .acquire_timeout(ACQUIRE_TIMEOUT)
}

/// Open a connection pool of at most `max_connections`.
pub async fn create_pool(database_url: &str, max_connections: u32) -> DbResult<PgPool> {
    let pool = pool_options(max_connections).connect(database_url).await?;
    Ok(pool)
}

/// Apply the bundled migrations.
pub async fn run_migrations(pool: &PgPool) -> DbResult<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

/// Connect, migrate and return a ready stage store.
pub async fn connect(database_url: &str, max_connections: u32) -> DbResult<PgStageStore> {
    let pool = create_pool(database_url, max_connections).await?;
    run_migrations(&pool).await?;
    info!(max_connections, "Stage store connected");
    Ok(PgStageStore::new(pool))
}
