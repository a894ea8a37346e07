//! Digest of earlier runs handed to the planner for continuity.

use feedplan_core::GenerationRun;
use feedplan_db::{DbError, PipelineStore};
use uuid::Uuid;

pub const MAX_HISTORY_ENTRIES: usize = 30;

/// Builds the digest from the newest retained runs.
///
/// # Errors
///
/// Returns [`DbError`] if the runs cannot be listed or loaded.
pub async fn history_digest(
    store: &dyn PipelineStore,
    campaign_id: Uuid,
    max_entries: usize,
) -> Result<String, DbError> {
    let mut runs = Vec::new();
    let mut entries = 0;
    for run_number in store.list_run_numbers(campaign_id).await? {
        if entries >= max_entries {
            break;
        }
        let run = store.load_run(campaign_id, run_number).await?;
        entries += run.items.len();
        runs.push(run);
    }
    // Newest first from the store; the digest reads oldest first.
    runs.reverse();
    Ok(digest(&runs, max_entries))
}

/// One line per day: `Day N: seed | first caption line`, most recent last,
/// keeping only the last `max_entries` days.
#[must_use]
pub fn digest(runs: &[GenerationRun], max_entries: usize) -> String {
    let mut lines: Vec<(u32, String)> = runs
        .iter()
        .flat_map(|run| run.items.iter())
        .map(|entry| {
            let first_line = entry.caption.text.lines().next().unwrap_or("").trim();
            (
                entry.item.day_number,
                format!("Day {}: {} | {}", entry.item.day_number, entry.item.seed, first_line),
            )
        })
        .collect();
    lines.sort_by_key(|(day, _)| *day);
    let skip = lines.len().saturating_sub(max_entries);
    lines
        .into_iter()
        .skip(skip)
        .map(|(_, line)| line)
        .collect::<Vec<_>>()
        .join("\n")
}
