//! Persistence for assets, analyses, blobs, and the run ledger.
//!
//! [`PipelineStore`] is the boundary the pipeline talks to. [`PgStore`] backs
//! it with Postgres; [`MemoryStore`] keeps everything in process.

use sqlx::{postgres::PgPoolOptions, PgPool};
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

// Resolved from crates/feedplan-db; the SQL lives in <workspace-root>/migrations/.
static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("../../migrations");

/// Connection limits for the Postgres pool behind [`PgStore`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolConfig {
    pub max_connections: u32,
    pub min_connections: u32,
    pub acquire_timeout: Duration,
}

impl Default for PoolConfig {
    /// A single CLI invocation rarely holds more than a handful of
    /// connections: one per concurrent analysis plus the commit.
    fn default() -> Self {
        Self {
            max_connections: 10,
            min_connections: 1,
            acquire_timeout: Duration::from_secs(10),
        }
    }
}

impl PoolConfig {
    #[must_use]
    pub fn from_app_config(config: &feedplan_core::AppConfig) -> Self {
        Self {
            max_connections: config.db_max_connections,
            min_connections: config.db_min_connections,
            acquire_timeout: Duration::from_secs(config.db_acquire_timeout_secs),
        }
    }
}

#[derive(Debug, Error)]
pub enum DbError {
    #[error("record not found")]
    NotFound,
    #[error("run {run_number} for campaign {campaign_id} is not above the last issued run number {last}")]
    RunNumberConflict {
        campaign_id: Uuid,
        run_number: u32,
        last: u32,
    },
    #[error("day {day_number} for campaign {campaign_id} collides with already issued days (last {last})")]
    DayNumberConflict {
        campaign_id: Uuid,
        day_number: u32,
        last: u32,
    },
    #[error("stored value out of range: {0}")]
    Corrupt(String),
    #[error("store rejected the write: {0}")]
    Rejected(String),
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
    #[error(transparent)]
    Migration(#[from] sqlx::migrate::MigrateError),
}

pub mod analyses;
pub mod assets;
pub mod blobs;
pub mod generation_runs;
pub mod leases;
pub mod ledger;
pub mod memory;
pub mod store;

pub use generation_runs::{GenerationRunRow, RunItemRow};
pub use leases::CampaignLease;
pub use ledger::LedgerMarks;
pub use memory::MemoryStore;
pub use store::{PgStore, PipelineStore};

/// Opens the pool that [`PgStore`] runs on.
///
/// # Errors
///
/// Returns [`sqlx::Error`] if no connection can be established within the
/// configured acquire timeout.
pub async fn connect_pool(database_url: &str, config: PoolConfig) -> Result<PgPool, sqlx::Error> {
    let PoolConfig {
        max_connections,
        min_connections,
        acquire_timeout,
    } = config;
    PgPoolOptions::new()
        .max_connections(max_connections)
        .min_connections(min_connections.min(max_connections))
        .acquire_timeout(acquire_timeout)
        .connect(database_url)
        .await
}

/// Successful rows in the sqlx bookkeeping table; zero before the first run
/// has created it.
async fn applied_migration_count(pool: &PgPool) -> i64 {
    sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM _sqlx_migrations WHERE success")
        .fetch_one(pool)
        .await
        .unwrap_or(0)
}

/// Brings the schema for assets, analyses, blobs, and the run ledger up to
/// date and reports how many migrations this call applied.
///
/// # Errors
///
/// Returns [`sqlx::migrate::MigrateError`] if any migration fails.
pub async fn run_migrations(pool: &PgPool) -> Result<usize, sqlx::migrate::MigrateError> {
    let before = applied_migration_count(pool).await;
    MIGRATOR.run(pool).await?;
    let after = applied_migration_count(pool).await;
    Ok(usize::try_from(after.saturating_sub(before)).unwrap_or_default())
}

/// Round-trips a trivial query to prove the database is reachable.
///
/// # Errors
///
/// Returns [`sqlx::Error`] if the query fails.
pub async fn ping(pool: &PgPool) -> Result<(), sqlx::Error> {
    sqlx::query("SELECT 1").execute(pool).await.map(|_| ())
}

/// Converts a stored `INTEGER` into a day or run number.
pub(crate) fn to_u32(value: i32, what: &str) -> Result<u32, DbError> {
    u32::try_from(value).map_err(|_| DbError::Corrupt(format!("negative {what}: {value}")))
}

/// Converts a day or run number into a bindable `INTEGER`.
pub(crate) fn to_i32(value: u32, what: &str) -> Result<i32, DbError> {
    i32::try_from(value).map_err(|_| DbError::Corrupt(format!("{what} too large: {value}")))
}
