//! Read-only run queries plus run deletion.

use feedplan_core::GenerationRun;
use feedplan_db::PipelineStore;
use uuid::Uuid;

use crate::generate::{format_degraded, format_item};

/// One summary line per run: number, item count, day span, creation time.
pub(crate) fn run_summary(run: &GenerationRun) -> String {
    let days = match (run.items.first(), run.last_day()) {
        (Some(first), Some(last)) => format!("days {}-{}", first.item.day_number, last),
        _ => "no items".to_string(),
    };
    format!(
        "run {:>3}  {:>2} items  {:<12} {} degraded  {}",
        run.run_number,
        run.items.len(),
        days,
        run.degraded.len(),
        run.created_at.format("%Y-%m-%d %H:%M")
    )
}

/// # Errors
///
/// Returns an error if the store cannot be read.
pub(crate) async fn run_runs_list(store: &dyn PipelineStore, campaign_id: Uuid) -> anyhow::Result<()> {
    let numbers = store.list_run_numbers(campaign_id).await?;
    if numbers.is_empty() {
        println!("no runs for campaign {campaign_id}");
        return Ok(());
    }
    for run_number in numbers {
        let run = store.load_run(campaign_id, run_number).await?;
        println!("{}", run_summary(&run));
    }
    Ok(())
}

/// # Errors
///
/// Returns an error if the run does not exist or the store cannot be read.
pub(crate) async fn run_runs_show(
    store: &dyn PipelineStore,
    campaign_id: Uuid,
    run_number: Option<u32>,
) -> anyhow::Result<()> {
    let run = match run_number {
        Some(n) => store.load_run(campaign_id, n).await?,
        None => store
            .latest_run(campaign_id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("campaign {campaign_id} has no runs"))?,
    };

    println!("{}", run_summary(&run));
    for entry in &run.items {
        println!("{}", format_item(entry));
    }
    if !run.degraded.is_empty() {
        println!("\nneeds attention:");
        for item in &run.degraded {
            println!("  {}", format_degraded(item));
        }
    }
    Ok(())
}

/// # Errors
///
/// Returns an error if the run does not exist or cannot be deleted.
pub(crate) async fn run_runs_delete(
    store: &dyn PipelineStore,
    campaign_id: Uuid,
    run_number: u32,
) -> anyhow::Result<()> {
    store.delete_run(campaign_id, run_number).await?;
    tracing::info!(campaign = %campaign_id, run_number, "run deleted");
    println!("deleted run {run_number}; its run and day numbers will not be reused");
    Ok(())
}
