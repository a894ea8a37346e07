//! The `generate` command: wires the store and HTTP capability client into
//! the orchestrator, renders progress, and maps Ctrl-C to cancellation.

use std::sync::Arc;

use anyhow::Context;
use feedplan_core::{AppConfig, DegradedItem, RunItem};
use feedplan_db::PipelineStore;
use feedplan_gateway::{Capability, CapabilityProvider, HttpCapabilityClient, UsageSnapshot};
use feedplan_pipeline::{
    ChannelProgress, GenerationOutcome, GenerationRequest, Orchestrator, PipelineError,
    ProgressEvent, RunControl,
};
use tokio::sync::mpsc::UnboundedReceiver;

/// # Errors
///
/// Returns an error if the style profile or capability client cannot be set
/// up, or if the generation fails outright (busy campaign, cancellation,
/// persistence). Degraded steps are printed, not returned as errors.
pub(crate) async fn run_generate(
    store: Arc<dyn PipelineStore>,
    config: &AppConfig,
    request: GenerationRequest,
) -> anyhow::Result<()> {
    let style = feedplan_core::load_style(&config.style_path)
        .with_context(|| format!("failed to load style from {}", config.style_path.display()))?;
    let client = HttpCapabilityClient::new(
        &config.capability_url,
        config.capability_api_key.clone(),
        config.request_timeout_secs,
    )
    .map_err(|e| anyhow::anyhow!("failed to build capability client: {e}"))?;
    let provider: Arc<dyn CapabilityProvider> = Arc::new(client);
    let orchestrator = Orchestrator::from_app_config(config, store, provider, style);

    let (sink, events) = ChannelProgress::new();
    let renderer = tokio::spawn(render_progress(events));
    let control = RunControl::with_progress(Arc::new(sink));

    let cancel = control.cancel.clone();
    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("interrupt received, cancelling at the next checkpoint");
            cancel.cancel();
        }
    });

    let result = orchestrator.generate(&request, &control).await;

    interrupt.abort();
    // Dropping the last sender lets the renderer drain and finish.
    drop(control);
    drop(orchestrator);
    if let Err(e) = renderer.await {
        tracing::warn!(error = %e, "progress renderer stopped unexpectedly");
    }

    match result {
        Ok(outcome) => {
            print_outcome(&outcome);
            Ok(())
        }
        Err(PipelineError::Cancelled) => {
            eprintln!("generation cancelled; nothing was committed");
            Err(PipelineError::Cancelled.into())
        }
        Err(e) => Err(e.into()),
    }
}

async fn render_progress(mut events: UnboundedReceiver<ProgressEvent>) {
    while let Some(event) = events.recv().await {
        eprintln!("{}", format_event(&event));
    }
}

pub(crate) fn format_event(event: &ProgressEvent) -> String {
    if event.current == 0 {
        format!("[{}] {}", event.stage, event.message)
    } else {
        format!(
            "[{}] {}/{} {}",
            event.stage, event.current, event.total, event.message
        )
    }
}

fn print_outcome(outcome: &GenerationOutcome) {
    println!(
        "run {} committed ({} items, scores {:?})",
        outcome.run_number,
        outcome.items.len(),
        outcome.review_scores
    );
    for entry in &outcome.items {
        println!("{}", format_item(entry));
    }

    if !outcome.degraded.is_empty() {
        println!("\nneeds attention:");
        for item in &outcome.degraded {
            println!("  {}", format_degraded(item));
        }
    }

    println!("\nusage:");
    for line in usage_lines(&outcome.usage) {
        println!("  {line}");
    }
}

pub(crate) fn format_item(entry: &RunItem) -> String {
    let mut out = format!(
        "\nDay {} at {}: {}",
        entry.item.day_number, entry.item.post_time, entry.item.seed
    );
    if let Some(key) = &entry.item.graphic_blob_key {
        out.push_str(&format!("\n  graphic: {key}"));
    }
    for line in entry.caption.text.lines() {
        out.push_str(&format!("\n  {line}"));
    }
    out
}

pub(crate) fn format_degraded(item: &DegradedItem) -> String {
    let mut out = format!("[{}]", item.kind);
    if let Some(day) = item.day_number {
        out.push_str(&format!(" day {day}"));
    }
    if let Some(asset) = item.asset_id {
        out.push_str(&format!(" asset {asset}"));
    }
    out.push_str(&format!(": {}", item.reason));
    out
}

pub(crate) fn usage_lines(usage: &UsageSnapshot) -> Vec<String> {
    let mut lines: Vec<String> = Capability::ALL
        .iter()
        .map(|&capability| (capability, usage.for_capability(capability)))
        .filter(|(_, totals)| totals.calls > 0)
        .map(|(capability, totals)| {
            format!(
                "{:<10} calls {:>3}  prompt {:>7}  completion {:>7}",
                capability.as_str(),
                totals.calls,
                totals.prompt_units,
                totals.completion_units
            )
        })
        .collect();
    lines.push(format!(
        "{:<10} calls {:>3}  prompt {:>7}  completion {:>7}",
        "total", usage.total.calls, usage.total.prompt_units, usage.total.completion_units
    ));
    lines
}
