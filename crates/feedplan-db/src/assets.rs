//! Database operations for `assets`.

use chrono::{DateTime, Utc};
use feedplan_core::Asset;
use sqlx::PgPool;
use uuid::Uuid;

use crate::DbError;

/// A row from the `assets` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct AssetRow {
    pub id: Uuid,
    pub campaign_id: Uuid,
    pub blob_key: String,
    pub fingerprint: String,
    pub created_at: DateTime<Utc>,
}

impl From<AssetRow> for Asset {
    fn from(row: AssetRow) -> Self {
        Asset {
            id: row.id,
            campaign_id: row.campaign_id,
            blob_key: row.blob_key,
            fingerprint: row.fingerprint,
            created_at: row.created_at,
        }
    }
}

/// Inserts an asset. Re-inserting the same id updates the blob key and
/// fingerprint, which is how a replaced upload invalidates its analysis.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the insert fails.
pub async fn upsert_asset(pool: &PgPool, asset: &Asset) -> Result<(), DbError> {
    sqlx::query(
        "INSERT INTO assets (id, campaign_id, blob_key, fingerprint, created_at) \
         VALUES ($1, $2, $3, $4, $5) \
         ON CONFLICT (id) DO UPDATE SET \
             blob_key = EXCLUDED.blob_key, \
             fingerprint = EXCLUDED.fingerprint",
    )
    .bind(asset.id)
    .bind(asset.campaign_id)
    .bind(&asset.blob_key)
    .bind(&asset.fingerprint)
    .bind(asset.created_at)
    .execute(pool)
    .await?;

    Ok(())
}

/// Returns every asset of a campaign in upload order.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_assets(pool: &PgPool, campaign_id: Uuid) -> Result<Vec<Asset>, DbError> {
    let rows = sqlx::query_as::<_, AssetRow>(
        "SELECT id, campaign_id, blob_key, fingerprint, created_at \
         FROM assets \
         WHERE campaign_id = $1 \
         ORDER BY created_at, id",
    )
    .bind(campaign_id)
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(Asset::from).collect())
}
