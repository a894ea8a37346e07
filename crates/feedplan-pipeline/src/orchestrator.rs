//! The plan orchestrator: analysis, planning, writing, the review loop, and
//! the final commit of one immutable run.

use std::collections::HashMap;
use std::sync::Arc;

use feedplan_core::{
    AnalysisRecord, AppConfig, Asset, Caption, DatedItem, DegradedItem, DegradedKind,
    NarrativePhase, PlanConstraints, ReviewReport, RunItem, StyleProfile,
};
use feedplan_db::PipelineStore;
use feedplan_gateway::{
    Capability, CapabilityError, CapabilityProvider, ResilientInvoker, ResourceLedger,
    ReviewRequest, UsageSnapshot,
};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::cache::{AnalysisCache, DEFAULT_ANALYSIS_CONCURRENCY};
use crate::context::StageContext;
use crate::error::PipelineError;
use crate::gate::{QualityPolicy, ReviewState};
use crate::history::{history_digest, MAX_HISTORY_ENTRIES};
use crate::illustrate::{
    illustrate_items, IllustrationOutcome, DEFAULT_ILLUSTRATION_CONCURRENCY,
};
use crate::locks::CampaignLocks;
use crate::planning::plan_items;
use crate::progress::{NoopProgress, ProgressSink, Stage};
use crate::writing::{rewrite_feedback, write_captions, WriteMode, WriteOutcome};

/// What to generate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationRequest {
    pub campaign_id: Uuid,
    pub target_days: usize,
    pub phase: NarrativePhase,
    /// Explicit asset selection; empty means every unconsumed asset.
    pub asset_ids: Vec<Uuid>,
    pub notes: Option<String>,
    pub illustrate: bool,
}

impl GenerationRequest {
    #[must_use]
    pub fn new(campaign_id: Uuid, target_days: usize) -> Self {
        Self {
            campaign_id,
            target_days,
            phase: NarrativePhase::default(),
            asset_ids: Vec::new(),
            notes: None,
            illustrate: false,
        }
    }
}

/// Caller-side handles for one generation: progress, cancellation, and the
/// usage ledger (readable at any time while the generation runs).
#[derive(Clone)]
pub struct RunControl {
    pub progress: Arc<dyn ProgressSink>,
    pub cancel: CancellationToken,
    pub ledger: ResourceLedger,
}

impl Default for RunControl {
    fn default() -> Self {
        Self {
            progress: Arc::new(NoopProgress),
            cancel: CancellationToken::new(),
            ledger: ResourceLedger::new(),
        }
    }
}

impl RunControl {
    #[must_use]
    pub fn with_progress(progress: Arc<dyn ProgressSink>) -> Self {
        Self {
            progress,
            ..Self::default()
        }
    }
}

/// Result of a committed generation.
#[derive(Debug, Clone)]
pub struct GenerationOutcome {
    pub run_id: Uuid,
    pub run_number: u32,
    pub items: Vec<RunItem>,
    pub degraded: Vec<DegradedItem>,
    /// Every review score obtained, in order, including the final report-only one.
    pub review_scores: Vec<u8>,
    pub stages: Vec<Stage>,
    pub newly_analyzed_count: usize,
    pub usage: UsageSnapshot,
}

/// Stage trace plus the cancellation checkpoint run at every transition.
struct Trace<'a> {
    ctx: StageContext<'a>,
    stages: Vec<Stage>,
}

impl<'a> Trace<'a> {
    fn new(ctx: StageContext<'a>) -> Self {
        Self {
            ctx,
            stages: Vec::new(),
        }
    }

    fn enter(&mut self, stage: Stage, total: usize, message: &str) -> Result<(), PipelineError> {
        if self.ctx.is_cancelled() {
            tracing::info!(%stage, "cancellation requested, not entering stage");
            return Err(PipelineError::Cancelled);
        }
        tracing::info!(%stage, total, "{message}");
        self.stages.push(stage);
        self.ctx.report(stage, 0, total, message);
        Ok(())
    }
}

/// Identifies where a batch's graphics are stored.
#[derive(Debug, Clone, Copy)]
struct Batch {
    campaign_id: Uuid,
    run_number: u32,
    illustrate: bool,
}

/// Degradations grouped by origin, so a re-plan can discard the ones that
/// belonged to the abandoned plan.
#[derive(Default)]
struct DegradedLog {
    analysis: Vec<DegradedItem>,
    plan: Option<DegradedItem>,
    captions: Vec<DegradedItem>,
    illustrations: Vec<DegradedItem>,
    reviews: Vec<DegradedItem>,
}

impl DegradedLog {
    fn into_vec(self) -> Vec<DegradedItem> {
        let mut all = self.analysis;
        all.extend(self.plan);
        all.extend(self.captions);
        all.extend(self.illustrations);
        all.extend(self.reviews);
        all
    }
}

pub struct Orchestrator {
    store: Arc<dyn PipelineStore>,
    provider: Arc<dyn CapabilityProvider>,
    invoker: ResilientInvoker,
    policy: QualityPolicy,
    style: StyleProfile,
    analysis_concurrency: usize,
    illustration_concurrency: usize,
    locks: CampaignLocks,
}

impl Orchestrator {
    #[must_use]
    pub fn new(
        store: Arc<dyn PipelineStore>,
        provider: Arc<dyn CapabilityProvider>,
        style: StyleProfile,
    ) -> Self {
        Self {
            store,
            provider,
            invoker: ResilientInvoker::new(3, 1_000, std::time::Duration::from_secs(120)),
            policy: QualityPolicy::default(),
            style,
            analysis_concurrency: DEFAULT_ANALYSIS_CONCURRENCY,
            illustration_concurrency: DEFAULT_ILLUSTRATION_CONCURRENCY,
            locks: CampaignLocks::new(),
        }
    }

    #[must_use]
    pub fn from_app_config(
        config: &AppConfig,
        store: Arc<dyn PipelineStore>,
        provider: Arc<dyn CapabilityProvider>,
        style: StyleProfile,
    ) -> Self {
        Self::new(store, provider, style)
            .with_invoker(ResilientInvoker::from_app_config(config))
            .with_policy(QualityPolicy::from_app_config(config))
            .with_concurrency(config.analysis_concurrency, config.illustration_concurrency)
    }

    #[must_use]
    pub fn with_invoker(mut self, invoker: ResilientInvoker) -> Self {
        self.invoker = invoker;
        self
    }

    #[must_use]
    pub fn with_policy(mut self, policy: QualityPolicy) -> Self {
        self.policy = policy;
        self
    }

    #[must_use]
    pub fn with_concurrency(mut self, analysis: usize, illustration: usize) -> Self {
        self.analysis_concurrency = analysis.max(1);
        self.illustration_concurrency = illustration.max(1);
        self
    }

    #[must_use]
    pub fn locks(&self) -> &CampaignLocks {
        &self.locks
    }

    /// Runs the whole pipeline for one campaign and commits the result as a
    /// new run.
    ///
    /// Capability failures never abort: they degrade to placeholders, the
    /// naive plan, or an early accept, and are listed in the outcome's
    /// `degraded` report.
    ///
    /// # Errors
    ///
    /// - [`PipelineError::CampaignBusy`] if another generation for the
    ///   campaign is in progress, in this process or any other sharing the
    ///   store.
    /// - [`PipelineError::NothingToPlan`] if no assets are selected or left
    ///   unconsumed, or the plan comes back empty; no run number is used up.
    /// - [`PipelineError::UnknownAsset`] if an explicitly selected asset does
    ///   not belong to the campaign.
    /// - [`PipelineError::Cancelled`] if `control.cancel` fired; nothing is
    ///   committed.
    /// - [`PipelineError::Persistence`] if the store fails; in particular a
    ///   failed commit leaves no partial run behind.
    pub async fn generate(
        &self,
        request: &GenerationRequest,
        control: &RunControl,
    ) -> Result<GenerationOutcome, PipelineError> {
        if request.target_days == 0 {
            return Err(PipelineError::InvalidRequest(
                "target day count must be at least 1".to_string(),
            ));
        }
        let _guard = self.locks.try_acquire(request.campaign_id)?;
        let _lease = self
            .store
            .try_lock_campaign(request.campaign_id)
            .await?
            .ok_or(PipelineError::CampaignBusy(request.campaign_id))?;

        control.ledger.reset();
        let invoker = self.invoker.with_ledger(control.ledger.clone());
        let ctx = StageContext {
            store: self.store.as_ref(),
            provider: self.provider.as_ref(),
            invoker: &invoker,
            style: &self.style,
            progress: control.progress.as_ref(),
            cancel: &control.cancel,
        };

        let campaign_id = request.campaign_id;
        let run_number = self.store.next_run_number(campaign_id).await?;
        let start_day = self.store.next_day_number(campaign_id).await?;
        let assets = self.select_assets(request).await?;
        if assets.is_empty() {
            tracing::warn!(campaign = %campaign_id, "no unconsumed assets, nothing to plan");
            return Err(PipelineError::NothingToPlan(campaign_id));
        }
        let history = history_digest(ctx.store, campaign_id, MAX_HISTORY_ENTRIES).await?;

        tracing::info!(
            campaign = %campaign_id,
            run_number,
            start_day,
            assets = assets.len(),
            target_days = request.target_days,
            "starting generation"
        );

        let mut trace = Trace::new(ctx);
        let mut degraded = DegradedLog::default();
        let mut review_scores = Vec::new();

        trace.enter(Stage::Analyzing, assets.len(), "analyzing assets")?;
        let analyzed = AnalysisCache::new(ctx.store, ctx.provider, ctx.invoker)
            .with_concurrency(self.analysis_concurrency)
            .run(&assets, ctx.progress, ctx.cancel)
            .await?;
        degraded.analysis = analyzed.degraded;
        let analyses = analyzed.analyses;

        let mut constraints = PlanConstraints::new(request.target_days, start_day, request.phase);
        constraints.history = history;
        constraints.notes.clone_from(&request.notes);

        trace.enter(Stage::Planning, request.target_days, "planning items")?;
        let plan = plan_items(ctx, &analyses, &constraints).await;
        degraded.plan = plan.degraded;
        let mut items = require_items(campaign_id, plan.items)?;

        trace.enter(Stage::Writing, items.len(), "writing captions")?;
        let batch = Batch {
            campaign_id,
            run_number,
            illustrate: request.illustrate,
        };
        let (written, mut illustrated) = self
            .write_batch(&mut trace, Stage::Writing, batch, &items, &analyses)
            .await?;
        let mut captions = written.captions;
        degraded.captions = written.degraded;
        degraded.illustrations.clone_from(&illustrated.degraded);

        let mut last_report: Option<ReviewReport> = None;
        let mut state = ReviewState::start();
        loop {
            state = match state {
                ReviewState::Accept => break,
                ReviewState::Review { escalations } => {
                    trace.enter(state_stage(escalations), items.len(), "reviewing captions")?;
                    match self.review(ctx, &items, &captions).await {
                        Ok(report) => {
                            log_report(state_stage(escalations), &report);
                            review_scores.push(report.score);
                            let next =
                                ReviewState::after_review(&self.policy, &report, escalations);
                            last_report = Some(report);
                            next
                        }
                        Err(e) => {
                            degraded.reviews.push(review_failure(&e));
                            ReviewState::Accept
                        }
                    }
                }
                ReviewState::Rewrite { issues } => {
                    trace.enter(Stage::Rewrite, issues.len(), "rewriting flagged days")?;
                    let summary = last_report.as_ref().map_or("", |r| r.summary.as_str());
                    let feedback = rewrite_feedback(summary, &issues);
                    let rewritten = write_captions(
                        ctx,
                        Stage::Rewrite,
                        &items,
                        &analyses,
                        WriteMode::Rewrite {
                            existing: &captions,
                            feedback: &feedback,
                        },
                    )
                    .await?;
                    let days = last_report
                        .as_ref()
                        .map(ReviewReport::days_needing_rewrite)
                        .unwrap_or_default();
                    tracing::info!(
                        ?days,
                        calls = rewritten.calls,
                        "rewrite complete"
                    );
                    captions = rewritten.captions;
                    ReviewState::after_rewrite()
                }
                ReviewState::Replan => {
                    trace.enter(Stage::RePlanning, request.target_days, "re-planning")?;
                    let replan_constraints = PlanConstraints {
                        feedback: last_report.as_ref().map(ReviewReport::feedback_text),
                        ..constraints.clone()
                    };
                    let plan = plan_items(ctx, &analyses, &replan_constraints).await;
                    degraded.plan = plan.degraded;
                    items = require_items(campaign_id, plan.items)?;

                    trace.enter(Stage::ReWriting, items.len(), "re-writing captions")?;
                    let (written, redone) = self
                        .write_batch(&mut trace, Stage::ReWriting, batch, &items, &analyses)
                        .await?;
                    captions = written.captions;
                    degraded.captions = written.degraded;
                    degraded.illustrations.clone_from(&redone.degraded);
                    illustrated = redone;
                    ReviewState::after_replan()
                }
                ReviewState::FinalReview => {
                    trace.enter(Stage::FinalReview, items.len(), "final review (report only)")?;
                    match self.review(ctx, &items, &captions).await {
                        Ok(report) => {
                            log_report(Stage::FinalReview, &report);
                            review_scores.push(report.score);
                        }
                        Err(e) => degraded.reviews.push(review_failure(&e)),
                    }
                    ReviewState::Accept
                }
            };
        }

        trace.enter(Stage::Accept, items.len(), "committing run")?;
        illustrated.apply(&mut items);
        let entries = pair_captions(items, captions);
        let degraded = degraded.into_vec();

        let run_id = self
            .store
            .commit_run(campaign_id, run_number, &entries, &degraded)
            .await
            .inspect_err(|e| {
                tracing::error!(
                    campaign = %campaign_id,
                    run_number,
                    error = %e,
                    "failed to commit run"
                );
            })?;

        tracing::info!(
            campaign = %campaign_id,
            run_number,
            items = entries.len(),
            degraded = degraded.len(),
            scores = ?review_scores,
            "run committed"
        );

        Ok(GenerationOutcome {
            run_id,
            run_number,
            items: entries,
            degraded,
            review_scores,
            stages: trace.stages,
            newly_analyzed_count: analyzed.newly_analyzed_count,
            usage: control.ledger.snapshot(),
        })
    }

    async fn select_assets(&self, request: &GenerationRequest) -> Result<Vec<Asset>, PipelineError> {
        let campaign_id = request.campaign_id;
        let all = self.store.list_assets(campaign_id).await?;

        if !request.asset_ids.is_empty() {
            let by_id: HashMap<Uuid, &Asset> = all.iter().map(|a| (a.id, a)).collect();
            return request
                .asset_ids
                .iter()
                .map(|&asset_id| {
                    by_id
                        .get(&asset_id)
                        .map(|a| (*a).clone())
                        .ok_or(PipelineError::UnknownAsset {
                            campaign_id,
                            asset_id,
                        })
                })
                .collect();
        }

        let consumed = self.store.consumed_asset_ids(campaign_id).await?;
        Ok(all
            .into_iter()
            .filter(|a| !consumed.contains(&a.id))
            .collect())
    }

    /// Writes captions for `items`; when `illustrate` is set, graphics are
    /// generated alongside without holding up the caption fold.
    async fn write_batch(
        &self,
        trace: &mut Trace<'_>,
        stage: Stage,
        batch: Batch,
        items: &[DatedItem],
        analyses: &[AnalysisRecord],
    ) -> Result<(WriteOutcome, IllustrationOutcome), PipelineError> {
        let ctx = trace.ctx;
        let writing = write_captions(ctx, stage, items, analyses, WriteMode::Fresh);

        if !batch.illustrate {
            return Ok((writing.await?, IllustrationOutcome::default()));
        }

        let requested = items.iter().filter(|i| i.graphic.is_some()).count();
        trace.enter(Stage::Illustrating, requested, "illustrating requested graphics")?;
        let illustrating = illustrate_items(
            ctx,
            batch.campaign_id,
            batch.run_number,
            items,
            self.illustration_concurrency,
        );
        let (written, illustrated) = tokio::join!(writing, illustrating);
        Ok((written?, illustrated))
    }

    async fn review(
        &self,
        ctx: StageContext<'_>,
        items: &[DatedItem],
        captions: &[Caption],
    ) -> Result<ReviewReport, CapabilityError> {
        let request = ReviewRequest {
            items,
            captions,
            style: ctx.style,
        };
        ctx.invoker
            .invoke(Capability::Review, || ctx.provider.review(&request))
            .await
    }
}

fn state_stage(escalations: u8) -> Stage {
    ReviewState::Review { escalations }.stage()
}

/// A run is only ever committed with at least one item.
fn require_items(campaign_id: Uuid, items: Vec<DatedItem>) -> Result<Vec<DatedItem>, PipelineError> {
    if items.is_empty() {
        tracing::warn!(campaign = %campaign_id, "plan is empty, aborting without a commit");
        return Err(PipelineError::NothingToPlan(campaign_id));
    }
    Ok(items)
}

fn log_report(stage: Stage, report: &ReviewReport) {
    tracing::info!(
        %stage,
        score = report.score,
        issues = report.issues.len(),
        actionable = report.actionable_issues().len(),
        summary = %report.summary,
        "review report"
    );
}

fn review_failure(err: &CapabilityError) -> DegradedItem {
    tracing::warn!(
        kind = ?err.kind(),
        error = %err,
        "review failed, accepting current captions"
    );
    DegradedItem {
        kind: DegradedKind::Review,
        day_number: None,
        asset_id: None,
        reason: err.to_string(),
    }
}

/// Binds each item to its caption by day number.
fn pair_captions(items: Vec<DatedItem>, captions: Vec<Caption>) -> Vec<RunItem> {
    let mut by_day: HashMap<u32, Caption> =
        captions.into_iter().map(|c| (c.day_number, c)).collect();
    items
        .into_iter()
        .map(|item| {
            let caption = by_day
                .remove(&item.day_number)
                .unwrap_or_else(|| Caption::placeholder(&item));
            RunItem { item, caption }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_plan_is_refused_before_commit() {
        let campaign = Uuid::new_v4();
        assert!(matches!(
            require_items(campaign, Vec::new()),
            Err(PipelineError::NothingToPlan(id)) if id == campaign
        ));

        let items = require_items(campaign, vec![DatedItem::new(3, vec![], "seed")]).unwrap();
        assert_eq!(items[0].day_number, 3);
    }
}
