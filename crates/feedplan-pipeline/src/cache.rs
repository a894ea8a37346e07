//! Analysis reuse: only assets without a valid, current record reach the analyzer.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};

use feedplan_core::{AnalysisRecord, Asset, DegradedItem, DegradedKind};
use feedplan_db::PipelineStore;
use feedplan_gateway::{Capability, CapabilityProvider, ResilientInvoker};
use futures::stream::{self, StreamExt};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::PipelineError;
use crate::progress::{NoopProgress, ProgressEvent, ProgressSink, Stage};

pub const DEFAULT_ANALYSIS_CONCURRENCY: usize = 3;

#[derive(Debug, Clone, Default)]
pub struct CacheOutcome {
    /// One record per distinct input asset, in input order.
    pub analyses: Vec<AnalysisRecord>,
    /// Analyzer calls that produced a valid record.
    pub newly_analyzed_count: usize,
    pub degraded: Vec<DegradedItem>,
}

struct Fresh {
    record: AnalysisRecord,
    degraded: Option<DegradedItem>,
}

pub struct AnalysisCache<'a> {
    store: &'a dyn PipelineStore,
    provider: &'a dyn CapabilityProvider,
    invoker: &'a ResilientInvoker,
    concurrency: usize,
}

impl<'a> AnalysisCache<'a> {
    #[must_use]
    pub fn new(
        store: &'a dyn PipelineStore,
        provider: &'a dyn CapabilityProvider,
        invoker: &'a ResilientInvoker,
    ) -> Self {
        Self {
            store,
            provider,
            invoker,
            concurrency: DEFAULT_ANALYSIS_CONCURRENCY,
        }
    }

    #[must_use]
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Returns a record for every asset, analyzing only those without a
    /// reusable one.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Persistence`] if existing records cannot be read.
    pub async fn get_or_analyze(&self, assets: &[Asset]) -> Result<CacheOutcome, PipelineError> {
        self.run(assets, &NoopProgress, &CancellationToken::new())
            .await
    }

    pub(crate) async fn run(
        &self,
        assets: &[Asset],
        progress: &dyn ProgressSink,
        cancel: &CancellationToken,
    ) -> Result<CacheOutcome, PipelineError> {
        let mut records = self.existing_records(assets).await?;

        let mut seen = HashSet::new();
        let missing: Vec<&Asset> = assets
            .iter()
            .filter(|a| seen.insert(a.id))
            .filter(|a| !records.get(&a.id).is_some_and(|r| r.is_reusable_for(a)))
            .collect();

        tracing::info!(
            total = seen.len(),
            cached = seen.len() - missing.len(),
            to_analyze = missing.len(),
            "analysis cache partitioned assets"
        );

        let total = missing.len();
        let completed = AtomicUsize::new(0);
        let fresh: Vec<Fresh> = stream::iter(missing)
            .map(|asset| {
                let completed = &completed;
                async move {
                    if cancel.is_cancelled() {
                        return None;
                    }
                    let fresh = self.analyze_one(asset).await;
                    let done = completed.fetch_add(1, Ordering::SeqCst) + 1;
                    progress.report(ProgressEvent {
                        stage: Stage::Analyzing,
                        current: done,
                        total,
                        message: format!("analyzed asset {}", asset.id),
                    });
                    Some(fresh)
                }
            })
            .buffer_unordered(self.concurrency)
            .filter_map(|f| async move { f })
            .collect()
            .await;

        if cancel.is_cancelled() {
            return Err(PipelineError::Cancelled);
        }

        let mut outcome = CacheOutcome::default();
        for item in fresh {
            if item.degraded.is_none() {
                outcome.newly_analyzed_count += 1;
            }
            outcome.degraded.extend(item.degraded);
            records.insert(item.record.asset_id, item.record);
        }

        let mut emitted = HashSet::new();
        outcome.analyses = assets
            .iter()
            .filter(|a| emitted.insert(a.id))
            .filter_map(|a| records.get(&a.id).cloned())
            .collect();
        Ok(outcome)
    }

    async fn existing_records(
        &self,
        assets: &[Asset],
    ) -> Result<HashMap<Uuid, AnalysisRecord>, PipelineError> {
        let campaigns: BTreeSet<Uuid> = assets.iter().map(|a| a.campaign_id).collect();
        let mut records = HashMap::new();
        for campaign_id in campaigns {
            for record in self.store.list_analyses(campaign_id).await? {
                records.insert(record.asset_id, record);
            }
        }
        Ok(records)
    }

    /// Calls the analyzer for one asset and persists whatever comes out,
    /// substituting a placeholder on failure.
    async fn analyze_one(&self, asset: &Asset) -> Fresh {
        let result = self
            .invoker
            .invoke(Capability::Analyze, || self.provider.analyze(asset))
            .await;

        let fresh = match result {
            Ok(record) if record.is_reusable_for(asset) => Fresh {
                record,
                degraded: None,
            },
            Ok(record) => {
                tracing::warn!(
                    asset = %asset.id,
                    chars = record.description.chars().count(),
                    "analyzer output failed validity check, using placeholder"
                );
                placeholder(asset, "analyzer output failed validity check".to_string())
            }
            Err(e) => {
                tracing::warn!(
                    asset = %asset.id,
                    kind = ?e.kind(),
                    error = %e,
                    "analysis failed, using placeholder"
                );
                placeholder(asset, e.to_string())
            }
        };

        if let Err(e) = self.store.put_analysis(&fresh.record).await {
            tracing::warn!(
                asset = %asset.id,
                error = %e,
                "failed to persist analysis record"
            );
        }
        fresh
    }
}

fn placeholder(asset: &Asset, reason: String) -> Fresh {
    Fresh {
        record: AnalysisRecord::placeholder(asset),
        degraded: Some(DegradedItem {
            kind: DegradedKind::Analysis,
            day_number: None,
            asset_id: Some(asset.id),
            reason,
        }),
    }
}
