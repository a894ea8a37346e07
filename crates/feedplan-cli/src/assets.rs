//! Asset registration and listing.

use std::collections::HashMap;
use std::path::Path;

use anyhow::Context;
use feedplan_core::{AnalysisRecord, Asset};
use feedplan_db::PipelineStore;
use uuid::Uuid;

/// Default blob key for an uploaded file.
pub(crate) fn default_blob_key(campaign_id: Uuid, path: &Path) -> anyhow::Result<String> {
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| anyhow::anyhow!("'{}' has no usable file name", path.display()))?;
    Ok(format!("assets/{campaign_id}/{file_name}"))
}

/// Stores the file's bytes as a blob and registers an asset pointing at it.
///
/// Re-adding changed bytes under the same key yields a new fingerprint, so the
/// next generation re-analyzes the image.
///
/// # Errors
///
/// Returns an error if the file cannot be read or the store rejects a write.
pub(crate) async fn run_assets_add(
    store: &dyn PipelineStore,
    campaign_id: Uuid,
    blob_key: Option<String>,
    path: &Path,
) -> anyhow::Result<()> {
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("failed to read {}", path.display()))?;
    let blob_key = match blob_key {
        Some(key) => key,
        None => default_blob_key(campaign_id, path)?,
    };

    store.put_blob(&blob_key, &bytes).await?;
    let asset = Asset::new(campaign_id, blob_key, &bytes);
    store.put_asset(&asset).await?;

    tracing::info!(
        campaign = %campaign_id,
        asset = %asset.id,
        blob_key = %asset.blob_key,
        bytes = bytes.len(),
        "asset registered"
    );
    println!("{}", asset.id);
    Ok(())
}

/// # Errors
///
/// Returns an error if the store cannot be read.
pub(crate) async fn run_assets_list(
    store: &dyn PipelineStore,
    campaign_id: Uuid,
) -> anyhow::Result<()> {
    let assets = store.list_assets(campaign_id).await?;
    if assets.is_empty() {
        println!("no assets for campaign {campaign_id}");
        return Ok(());
    }

    let consumed = store.consumed_asset_ids(campaign_id).await?;
    let records: HashMap<Uuid, AnalysisRecord> = store
        .list_analyses(campaign_id)
        .await?
        .into_iter()
        .map(|r| (r.asset_id, r))
        .collect();

    for asset in &assets {
        let used = if consumed.contains(&asset.id) { "used" } else { "unused" };
        let analysis = if records.get(&asset.id).is_some_and(|r| r.is_reusable_for(asset)) {
            "analyzed"
        } else {
            "pending"
        };
        println!("{}  {:<8} {:<8} {}", asset.id, used, analysis, asset.blob_key);
    }
    Ok(())
}
