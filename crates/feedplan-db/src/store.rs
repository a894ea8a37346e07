//! The persistence boundary used by the pipeline.

use std::collections::HashSet;

use async_trait::async_trait;
use feedplan_core::{AnalysisRecord, Asset, DegradedItem, GenerationRun, RunItem};
use sqlx::PgPool;
use uuid::Uuid;

use crate::leases::{self, CampaignLease};
use crate::{analyses, assets, blobs, generation_runs, DbError};

/// Storage operations the orchestrator needs. Blobs are opaque bytes.
///
/// Implementations must make [`PipelineStore::commit_run`] atomic: either the
/// run and every one of its items become visible together, or nothing does
/// and the ledger marks stay where they were.
#[async_trait]
pub trait PipelineStore: Send + Sync {
    async fn put_asset(&self, asset: &Asset) -> Result<(), DbError>;

    async fn list_assets(&self, campaign_id: Uuid) -> Result<Vec<Asset>, DbError>;

    async fn put_analysis(&self, record: &AnalysisRecord) -> Result<(), DbError>;

    async fn list_analyses(&self, campaign_id: Uuid) -> Result<Vec<AnalysisRecord>, DbError>;

    async fn put_blob(&self, key: &str, bytes: &[u8]) -> Result<(), DbError>;

    async fn get_blob(&self, key: &str) -> Result<Option<Vec<u8>>, DbError>;

    /// One past the highest run number ever issued for the campaign.
    async fn next_run_number(&self, campaign_id: Uuid) -> Result<u32, DbError>;

    /// One past the highest day number ever issued for the campaign.
    async fn next_day_number(&self, campaign_id: Uuid) -> Result<u32, DbError>;

    async fn commit_run(
        &self,
        campaign_id: Uuid,
        run_number: u32,
        items: &[RunItem],
        degraded: &[DegradedItem],
    ) -> Result<Uuid, DbError>;

    /// Retained run numbers, newest first.
    async fn list_run_numbers(&self, campaign_id: Uuid) -> Result<Vec<u32>, DbError>;

    async fn load_run(&self, campaign_id: Uuid, run_number: u32)
        -> Result<GenerationRun, DbError>;

    async fn delete_run(&self, campaign_id: Uuid, run_number: u32) -> Result<(), DbError>;

    async fn consumed_asset_ids(&self, campaign_id: Uuid) -> Result<HashSet<Uuid>, DbError>;

    /// Exclusive claim on the campaign across every process sharing the
    /// store; `None` if someone else holds it.
    async fn try_lock_campaign(&self, campaign_id: Uuid)
        -> Result<Option<CampaignLease>, DbError>;

    /// The current run: the newest retained one.
    async fn latest_run(&self, campaign_id: Uuid) -> Result<Option<GenerationRun>, DbError> {
        match self.list_run_numbers(campaign_id).await?.first() {
            Some(&n) => self.load_run(campaign_id, n).await.map(Some),
            None => Ok(None),
        }
    }
}

/// Postgres-backed store.
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl PipelineStore for PgStore {
    async fn put_asset(&self, asset: &Asset) -> Result<(), DbError> {
        assets::upsert_asset(&self.pool, asset).await
    }

    async fn list_assets(&self, campaign_id: Uuid) -> Result<Vec<Asset>, DbError> {
        assets::list_assets(&self.pool, campaign_id).await
    }

    async fn put_analysis(&self, record: &AnalysisRecord) -> Result<(), DbError> {
        analyses::upsert_analysis(&self.pool, record).await
    }

    async fn list_analyses(&self, campaign_id: Uuid) -> Result<Vec<AnalysisRecord>, DbError> {
        analyses::list_analyses(&self.pool, campaign_id).await
    }

    async fn put_blob(&self, key: &str, bytes: &[u8]) -> Result<(), DbError> {
        blobs::put_blob(&self.pool, key, bytes).await
    }

    async fn get_blob(&self, key: &str) -> Result<Option<Vec<u8>>, DbError> {
        blobs::get_blob(&self.pool, key).await
    }

    async fn next_run_number(&self, campaign_id: Uuid) -> Result<u32, DbError> {
        let marks = generation_runs::ledger_marks(&self.pool, campaign_id).await?;
        Ok(marks.next_run_number())
    }

    async fn next_day_number(&self, campaign_id: Uuid) -> Result<u32, DbError> {
        let marks = generation_runs::ledger_marks(&self.pool, campaign_id).await?;
        Ok(marks.next_day_number())
    }

    async fn commit_run(
        &self,
        campaign_id: Uuid,
        run_number: u32,
        items: &[RunItem],
        degraded: &[DegradedItem],
    ) -> Result<Uuid, DbError> {
        generation_runs::commit_run(&self.pool, campaign_id, run_number, items, degraded).await
    }

    async fn list_run_numbers(&self, campaign_id: Uuid) -> Result<Vec<u32>, DbError> {
        generation_runs::list_run_numbers(&self.pool, campaign_id).await
    }

    async fn load_run(
        &self,
        campaign_id: Uuid,
        run_number: u32,
    ) -> Result<GenerationRun, DbError> {
        generation_runs::load_run(&self.pool, campaign_id, run_number).await
    }

    async fn delete_run(&self, campaign_id: Uuid, run_number: u32) -> Result<(), DbError> {
        generation_runs::delete_run(&self.pool, campaign_id, run_number).await
    }

    async fn consumed_asset_ids(&self, campaign_id: Uuid) -> Result<HashSet<Uuid>, DbError> {
        generation_runs::consumed_asset_ids(&self.pool, campaign_id).await
    }

    async fn try_lock_campaign(
        &self,
        campaign_id: Uuid,
    ) -> Result<Option<CampaignLease>, DbError> {
        leases::try_lock_campaign(&self.pool, campaign_id).await
    }
}
