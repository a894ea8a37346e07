//! In-process store. Holds everything behind one lock, so every operation
//! (including `commit_run`) is atomic with respect to the others.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use feedplan_core::{AnalysisRecord, Asset, DegradedItem, GenerationRun, RunItem};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::leases::{CampaignLease, LocalLeases};
use crate::ledger::LedgerMarks;
use crate::store::PipelineStore;
use crate::DbError;

#[derive(Debug, Default)]
struct State {
    assets: HashMap<Uuid, Asset>,
    analyses: HashMap<Uuid, AnalysisRecord>,
    blobs: HashMap<String, Vec<u8>>,
    marks: HashMap<Uuid, LedgerMarks>,
    runs: BTreeMap<(Uuid, u32), GenerationRun>,
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    state: RwLock<State>,
    reject_commits: AtomicBool,
    leases: LocalLeases,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every following `commit_run` fail with [`DbError::Rejected`]
    /// without touching state. Used to exercise persistence-failure paths.
    pub fn reject_commits(&self, reject: bool) {
        self.reject_commits.store(reject, Ordering::SeqCst);
    }

    /// Number of analyses currently stored; handy for assertions.
    pub async fn analysis_count(&self) -> usize {
        self.state.read().await.analyses.len()
    }
}

#[async_trait]
impl PipelineStore for MemoryStore {
    async fn put_asset(&self, asset: &Asset) -> Result<(), DbError> {
        self.state
            .write()
            .await
            .assets
            .insert(asset.id, asset.clone());
        Ok(())
    }

    async fn list_assets(&self, campaign_id: Uuid) -> Result<Vec<Asset>, DbError> {
        let state = self.state.read().await;
        let mut assets: Vec<Asset> = state
            .assets
            .values()
            .filter(|a| a.campaign_id == campaign_id)
            .cloned()
            .collect();
        assets.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(assets)
    }

    async fn put_analysis(&self, record: &AnalysisRecord) -> Result<(), DbError> {
        self.state
            .write()
            .await
            .analyses
            .insert(record.asset_id, record.clone());
        Ok(())
    }

    async fn list_analyses(&self, campaign_id: Uuid) -> Result<Vec<AnalysisRecord>, DbError> {
        let state = self.state.read().await;
        Ok(state
            .analyses
            .values()
            .filter(|r| r.campaign_id == campaign_id)
            .cloned()
            .collect())
    }

    async fn put_blob(&self, key: &str, bytes: &[u8]) -> Result<(), DbError> {
        self.state
            .write()
            .await
            .blobs
            .insert(key.to_string(), bytes.to_vec());
        Ok(())
    }

    async fn get_blob(&self, key: &str) -> Result<Option<Vec<u8>>, DbError> {
        Ok(self.state.read().await.blobs.get(key).cloned())
    }

    async fn next_run_number(&self, campaign_id: Uuid) -> Result<u32, DbError> {
        let state = self.state.read().await;
        let marks = state.marks.get(&campaign_id).copied().unwrap_or_default();
        Ok(marks.next_run_number())
    }

    async fn next_day_number(&self, campaign_id: Uuid) -> Result<u32, DbError> {
        let state = self.state.read().await;
        let marks = state.marks.get(&campaign_id).copied().unwrap_or_default();
        Ok(marks.next_day_number())
    }

    async fn commit_run(
        &self,
        campaign_id: Uuid,
        run_number: u32,
        items: &[RunItem],
        degraded: &[DegradedItem],
    ) -> Result<Uuid, DbError> {
        if self.reject_commits.load(Ordering::SeqCst) {
            return Err(DbError::Rejected("commits are disabled".to_string()));
        }

        let mut state = self.state.write().await;
        let marks = state.marks.get(&campaign_id).copied().unwrap_or_default();
        let after = marks.admit(campaign_id, run_number, items)?;

        let mut sorted = items.to_vec();
        sorted.sort_by_key(|i| i.item.day_number);

        let run = GenerationRun {
            id: Uuid::new_v4(),
            campaign_id,
            run_number,
            items: sorted,
            degraded: degraded.to_vec(),
            created_at: Utc::now(),
        };
        let id = run.id;
        state.runs.insert((campaign_id, run_number), run);
        state.marks.insert(campaign_id, after);
        Ok(id)
    }

    async fn list_run_numbers(&self, campaign_id: Uuid) -> Result<Vec<u32>, DbError> {
        let state = self.state.read().await;
        Ok(state
            .runs
            .keys()
            .filter(|(c, _)| *c == campaign_id)
            .map(|(_, n)| *n)
            .rev()
            .collect())
    }

    async fn load_run(
        &self,
        campaign_id: Uuid,
        run_number: u32,
    ) -> Result<GenerationRun, DbError> {
        self.state
            .read()
            .await
            .runs
            .get(&(campaign_id, run_number))
            .cloned()
            .ok_or(DbError::NotFound)
    }

    async fn delete_run(&self, campaign_id: Uuid, run_number: u32) -> Result<(), DbError> {
        self.state
            .write()
            .await
            .runs
            .remove(&(campaign_id, run_number))
            .map(|_| ())
            .ok_or(DbError::NotFound)
    }

    async fn consumed_asset_ids(&self, campaign_id: Uuid) -> Result<HashSet<Uuid>, DbError> {
        let state = self.state.read().await;
        Ok(state
            .runs
            .values()
            .filter(|r| r.campaign_id == campaign_id)
            .flat_map(|r| r.items.iter().flat_map(|i| i.item.asset_ids.iter().copied()))
            .collect())
    }

    async fn try_lock_campaign(
        &self,
        campaign_id: Uuid,
    ) -> Result<Option<CampaignLease>, DbError> {
        Ok(self.leases.try_lock(campaign_id))
    }
}
