//! Planner call, output validation, and the naive fallback plan.

use std::collections::HashSet;

use feedplan_core::{AnalysisRecord, DatedItem, DegradedItem, DegradedKind, PlanConstraints};
use feedplan_gateway::{Capability, CapabilityError, ErrorKind, PlanRequest};
use uuid::Uuid;

use crate::context::StageContext;

/// Longest slice of an analysis description used as a fallback seed.
const FALLBACK_SEED_CHARS: usize = 80;

#[derive(Debug, Clone)]
pub(crate) struct PlanOutcome {
    pub items: Vec<DatedItem>,
    pub degraded: Option<DegradedItem>,
}

/// Why a planner answer was not used.
enum Rejection {
    Invalid(String),
    Failed(CapabilityError),
}

/// Asks the planner for items, retrying once with strict constraints when it
/// references unknown assets, and falling back to one asset per day.
///
/// The returned items are truncated to `constraints.target_days` and numbered
/// consecutively from `constraints.start_day`.
pub(crate) async fn plan_items(
    ctx: StageContext<'_>,
    analyses: &[AnalysisRecord],
    constraints: &PlanConstraints,
) -> PlanOutcome {
    let known: HashSet<Uuid> = analyses.iter().map(|a| a.asset_id).collect();

    let first = request_plan(ctx, analyses, constraints, &known).await;
    let outcome = match first {
        Ok(items) => Ok(items),
        Err(Rejection::Invalid(reason)) => {
            tracing::warn!(%reason, "planner output failed validation, retrying with strict constraints");
            let strict = PlanConstraints {
                strict: true,
                ..constraints.clone()
            };
            request_plan(ctx, analyses, &strict, &known).await
        }
        Err(failed) => Err(failed),
    };

    let (items, degraded) = match outcome {
        Ok(items) => (items, None),
        Err(rejection) => {
            let reason = match rejection {
                Rejection::Invalid(reason) => reason,
                Rejection::Failed(e) => e.to_string(),
            };
            tracing::warn!(%reason, "planning failed, using one-asset-per-day fallback");
            let degraded = DegradedItem {
                kind: DegradedKind::Plan,
                day_number: None,
                asset_id: None,
                reason,
            };
            (naive_plan(analyses, ctx.style.default_post_time.as_str()), Some(degraded))
        }
    };

    let items = finalize(items, constraints);
    log_unreferenced(analyses, &items);
    PlanOutcome { items, degraded }
}

async fn request_plan(
    ctx: StageContext<'_>,
    analyses: &[AnalysisRecord],
    constraints: &PlanConstraints,
    known: &HashSet<Uuid>,
) -> Result<Vec<DatedItem>, Rejection> {
    let request = PlanRequest {
        analyses,
        constraints,
        style: ctx.style,
    };
    let items = ctx
        .invoker
        .invoke(Capability::Plan, || ctx.provider.plan(&request))
        .await
        .map_err(|e| match e.kind() {
            ErrorKind::ValidationFailure => Rejection::Invalid(e.to_string()),
            _ => Rejection::Failed(e),
        })?;

    validate(&items, known).map_err(Rejection::Invalid)?;
    Ok(items)
}

/// Every referenced asset must be one of the planned-over analyses.
fn validate(items: &[DatedItem], known: &HashSet<Uuid>) -> Result<(), String> {
    if items.is_empty() {
        return Err("planner returned no items".to_string());
    }
    let unknown: Vec<String> = items
        .iter()
        .flat_map(|i| i.asset_ids.iter())
        .filter(|id| !known.contains(id))
        .map(ToString::to_string)
        .collect();
    if unknown.is_empty() {
        Ok(())
    } else {
        Err(format!("planner referenced unknown assets: {}", unknown.join(", ")))
    }
}

/// One item per analysis, in input order.
pub(crate) fn naive_plan(analyses: &[AnalysisRecord], post_time: &str) -> Vec<DatedItem> {
    analyses
        .iter()
        .zip(1u32..)
        .map(|(analysis, day)| {
            let mut item = DatedItem::new(day, vec![analysis.asset_id], fallback_seed(analysis));
            item.rationale = "fallback: one asset per day".to_string();
            item.post_time = post_time.to_string();
            item
        })
        .collect()
}

fn fallback_seed(analysis: &AnalysisRecord) -> String {
    if analysis.is_placeholder {
        return format!("Post featuring asset {}", analysis.asset_id);
    }
    analysis
        .description
        .chars()
        .take(FALLBACK_SEED_CHARS)
        .collect()
}

/// Orders by the planner's day numbers, truncates to the target count, and
/// renumbers from the campaign's next free day.
pub(crate) fn finalize(mut items: Vec<DatedItem>, constraints: &PlanConstraints) -> Vec<DatedItem> {
    items.sort_by_key(|i| i.day_number);

    if items.len() > constraints.target_days {
        let dropped: Vec<String> = items[constraints.target_days..]
            .iter()
            .map(|i| i.seed.clone())
            .collect();
        tracing::warn!(
            target = constraints.target_days,
            produced = items.len(),
            ?dropped,
            "planner over-produced, truncating plan"
        );
        items.truncate(constraints.target_days);
    }

    for (item, day) in items.iter_mut().zip(constraints.start_day..) {
        item.day_number = day;
        if item.seed.trim().is_empty() {
            item.seed = if item.rationale.trim().is_empty() {
                format!("Day {day}")
            } else {
                item.rationale.clone()
            };
        }
    }
    items
}

fn log_unreferenced(analyses: &[AnalysisRecord], items: &[DatedItem]) {
    let used: HashSet<Uuid> = items
        .iter()
        .flat_map(|i| i.asset_ids.iter().copied())
        .collect();
    let unreferenced: Vec<String> = analyses
        .iter()
        .filter(|a| !used.contains(&a.asset_id))
        .map(|a| a.asset_id.to_string())
        .collect();
    if !unreferenced.is_empty() {
        tracing::warn!(
            count = unreferenced.len(),
            assets = %unreferenced.join(", "),
            "some analyzed assets are not referenced by the plan"
        );
    }
}
