//! Caption writing as a left fold over the day list.
//!
//! Each write call receives the caption accepted for the previous day, so the
//! fold runs strictly in ascending day order and never in parallel.

use std::collections::{BTreeMap, HashMap};

use feedplan_core::{AnalysisRecord, Caption, DatedItem, DegradedItem, DegradedKind, ReviewIssue};
use feedplan_gateway::{Capability, CapabilityError, WriteRequest};
use futures::stream::{self, TryStreamExt};
use uuid::Uuid;

use crate::context::StageContext;
use crate::error::PipelineError;
use crate::progress::Stage;

#[derive(Debug, Clone, Copy)]
pub(crate) enum WriteMode<'r> {
    /// Write every day from scratch; failures become placeholders.
    Fresh,
    /// Rewrite only days with feedback; other days keep `existing`, and a
    /// failed rewrite keeps the original caption.
    Rewrite {
        existing: &'r [Caption],
        feedback: &'r BTreeMap<u32, String>,
    },
}

#[derive(Debug, Default)]
pub(crate) struct WriteOutcome {
    pub captions: Vec<Caption>,
    pub degraded: Vec<DegradedItem>,
    /// Writer invocations attempted.
    pub calls: usize,
}

#[derive(Default)]
struct Fold {
    outcome: WriteOutcome,
    /// Last real (non-placeholder) caption, fed to the next call.
    previous: Option<String>,
}

/// Produces one caption per item, in the items' order.
///
/// # Errors
///
/// Returns [`PipelineError::Cancelled`] if cancellation is requested; checked
/// before every item.
pub(crate) async fn write_captions(
    ctx: StageContext<'_>,
    stage: Stage,
    items: &[DatedItem],
    analyses: &[AnalysisRecord],
    mode: WriteMode<'_>,
) -> Result<WriteOutcome, PipelineError> {
    let descriptions: HashMap<Uuid, &str> = analyses
        .iter()
        .filter(|a| !a.is_placeholder)
        .map(|a| (a.asset_id, a.description.as_str()))
        .collect();
    let total = items.len();

    let fold = stream::iter(items.iter().enumerate().map(Ok::<_, PipelineError>))
        .try_fold(Fold::default(), |mut acc, (index, item)| {
            let descriptions = &descriptions;
            async move {
                if ctx.is_cancelled() {
                    return Err(PipelineError::Cancelled);
                }

                let caption = match mode {
                    WriteMode::Fresh => {
                        acc.outcome.calls += 1;
                        match write_one(ctx, item, descriptions, acc.previous.as_deref(), None).await
                        {
                            Ok(caption) => caption,
                            Err(e) => {
                                tracing::warn!(
                                    day = item.day_number,
                                    kind = ?e.kind(),
                                    error = %e,
                                    "write failed, using placeholder caption"
                                );
                                acc.outcome.degraded.push(DegradedItem {
                                    kind: DegradedKind::Caption,
                                    day_number: Some(item.day_number),
                                    asset_id: None,
                                    reason: e.to_string(),
                                });
                                Caption::placeholder(item)
                            }
                        }
                    }
                    WriteMode::Rewrite { existing, feedback } => {
                        let original = existing
                            .iter()
                            .find(|c| c.day_number == item.day_number)
                            .cloned()
                            .unwrap_or_else(|| Caption::placeholder(item));
                        match feedback.get(&item.day_number) {
                            None => original,
                            Some(notes) => {
                                acc.outcome.calls += 1;
                                let previous = acc.previous.as_deref();
                                match write_one(ctx, item, descriptions, previous, Some(notes)).await
                                {
                                    Ok(caption) => caption,
                                    Err(e) => {
                                        tracing::warn!(
                                            day = item.day_number,
                                            error = %e,
                                            "rewrite failed, keeping original caption"
                                        );
                                        original
                                    }
                                }
                            }
                        }
                    }
                };

                if !caption.is_placeholder {
                    acc.previous = Some(caption.text.clone());
                }
                acc.outcome.captions.push(caption);
                ctx.report(stage, index + 1, total, format!("day {}", item.day_number));
                Ok(acc)
            }
        })
        .await?;

    Ok(fold.outcome)
}

async fn write_one(
    ctx: StageContext<'_>,
    item: &DatedItem,
    descriptions: &HashMap<Uuid, &str>,
    previous_caption: Option<&str>,
    rewrite_feedback: Option<&str>,
) -> Result<Caption, CapabilityError> {
    let request = WriteRequest {
        item,
        image_context: item
            .asset_ids
            .iter()
            .filter_map(|id| descriptions.get(id).copied())
            .collect(),
        previous_caption,
        style: ctx.style,
        rewrite_feedback,
    };
    let mut caption = ctx
        .invoker
        .invoke(Capability::Write, || ctx.provider.write(&request))
        .await?;
    caption.day_number = item.day_number;
    Ok(caption)
}

/// Groups actionable issues into per-day rewrite instructions.
pub(crate) fn rewrite_feedback(summary: &str, issues: &[ReviewIssue]) -> BTreeMap<u32, String> {
    let mut feedback: BTreeMap<u32, String> = BTreeMap::new();
    for issue in issues {
        let entry = feedback
            .entry(issue.day_number)
            .or_insert_with(|| summary.trim().to_string());
        if !entry.is_empty() {
            entry.push('\n');
        }
        entry.push_str(&format!(
            "[{}/{}] {}",
            issue.severity, issue.category, issue.message
        ));
    }
    feedback
}
