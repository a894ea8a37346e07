//! Optional graphics for items that request one. Never fatal.

use std::collections::BTreeMap;

use feedplan_core::{DatedItem, DegradedItem, DegradedKind};
use feedplan_gateway::{Capability, IllustrateRequest};
use futures::stream::{self, StreamExt};
use uuid::Uuid;

use crate::context::StageContext;

pub const DEFAULT_ILLUSTRATION_CONCURRENCY: usize = 2;

#[derive(Debug, Default)]
pub(crate) struct IllustrationOutcome {
    /// Blob key per day number, for items that got a graphic.
    pub blob_keys: BTreeMap<u32, String>,
    pub degraded: Vec<DegradedItem>,
}

impl IllustrationOutcome {
    pub fn apply(&self, items: &mut [DatedItem]) {
        for item in items {
            item.graphic_blob_key = self.blob_keys.get(&item.day_number).cloned();
        }
    }
}

#[must_use]
pub fn graphic_blob_key(campaign_id: Uuid, run_number: u32, day_number: u32) -> String {
    format!("graphics/{campaign_id}/run-{run_number}/day-{day_number}")
}

/// Generates and stores graphics with bounded concurrency. Items started
/// after cancellation are skipped.
pub(crate) async fn illustrate_items(
    ctx: StageContext<'_>,
    campaign_id: Uuid,
    run_number: u32,
    items: &[DatedItem],
    concurrency: usize,
) -> IllustrationOutcome {
    let requested: Vec<(&DatedItem, &str)> = items
        .iter()
        .filter_map(|i| i.graphic.as_ref().map(|g| (i, g.concept.as_str())))
        .collect();
    if requested.is_empty() {
        return IllustrationOutcome::default();
    }
    tracing::info!(count = requested.len(), "illustrating requested graphics");

    let results: Vec<(u32, Result<String, String>)> = stream::iter(requested)
        .map(|(item, concept)| async move {
            let day = item.day_number;
            if ctx.is_cancelled() {
                return (day, Err("cancelled before start".to_string()));
            }
            (day, illustrate_one(ctx, campaign_id, run_number, day, concept).await)
        })
        .buffer_unordered(concurrency.max(1))
        .collect()
        .await;

    let mut outcome = IllustrationOutcome::default();
    for (day, result) in results {
        match result {
            Ok(key) => {
                outcome.blob_keys.insert(day, key);
            }
            Err(reason) => {
                tracing::warn!(day, %reason, "illustration skipped, day proceeds without a graphic");
                outcome.degraded.push(DegradedItem {
                    kind: DegradedKind::Illustration,
                    day_number: Some(day),
                    asset_id: None,
                    reason,
                });
            }
        }
    }
    outcome.degraded.sort_by_key(|d| d.day_number);
    outcome
}

async fn illustrate_one(
    ctx: StageContext<'_>,
    campaign_id: Uuid,
    run_number: u32,
    day_number: u32,
    concept: &str,
) -> Result<String, String> {
    let request = IllustrateRequest {
        day_number,
        concept,
        style: ctx.style,
    };
    let bytes = ctx
        .invoker
        .invoke(Capability::Illustrate, || ctx.provider.illustrate(&request))
        .await
        .map_err(|e| e.to_string())?;

    let key = graphic_blob_key(campaign_id, run_number, day_number);
    ctx.store
        .put_blob(&key, &bytes)
        .await
        .map_err(|e| format!("failed to store graphic: {e}"))?;
    Ok(key)
}

#[cfg(test)]
mod tests {
    use feedplan_core::GraphicRequest;

    use super::*;

    #[test]
    fn apply_sets_keys_only_for_illustrated_days() {
        let mut items = vec![DatedItem::new(5, vec![], "a"), DatedItem::new(6, vec![], "b")];
        items[0].graphic = Some(GraphicRequest {
            concept: "logo".to_string(),
        });
        let campaign = Uuid::nil();
        let mut outcome = IllustrationOutcome::default();
        outcome
            .blob_keys
            .insert(5, graphic_blob_key(campaign, 2, 5));

        outcome.apply(&mut items);
        assert_eq!(
            items[0].graphic_blob_key.as_deref(),
            Some("graphics/00000000-0000-0000-0000-000000000000/run-2/day-5")
        );
        assert!(items[1].graphic_blob_key.is_none());
    }
}
