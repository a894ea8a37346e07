//! Database operations for `analysis_records`.

use chrono::{DateTime, Utc};
use feedplan_core::AnalysisRecord;
use sqlx::PgPool;
use uuid::Uuid;

use crate::DbError;

/// A row from the `analysis_records` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct AnalysisRow {
    pub asset_id: Uuid,
    pub campaign_id: Uuid,
    pub fingerprint: String,
    pub description: String,
    pub mood: Option<String>,
    pub strategic_fit: Option<String>,
    pub is_placeholder: bool,
    pub created_at: DateTime<Utc>,
}

impl From<AnalysisRow> for AnalysisRecord {
    fn from(row: AnalysisRow) -> Self {
        AnalysisRecord {
            asset_id: row.asset_id,
            campaign_id: row.campaign_id,
            fingerprint: row.fingerprint,
            description: row.description,
            mood: row.mood,
            strategic_fit: row.strategic_fit,
            is_placeholder: row.is_placeholder,
            created_at: row.created_at,
        }
    }
}

/// Stores the analysis for an asset, superseding any earlier record.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the upsert fails.
pub async fn upsert_analysis(pool: &PgPool, record: &AnalysisRecord) -> Result<(), DbError> {
    sqlx::query(
        "INSERT INTO analysis_records \
             (asset_id, campaign_id, fingerprint, description, mood, strategic_fit, \
              is_placeholder, created_at) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8) \
         ON CONFLICT (asset_id) DO UPDATE SET \
             fingerprint    = EXCLUDED.fingerprint, \
             description    = EXCLUDED.description, \
             mood           = EXCLUDED.mood, \
             strategic_fit  = EXCLUDED.strategic_fit, \
             is_placeholder = EXCLUDED.is_placeholder, \
             created_at     = EXCLUDED.created_at, \
             updated_at     = NOW()",
    )
    .bind(record.asset_id)
    .bind(record.campaign_id)
    .bind(&record.fingerprint)
    .bind(&record.description)
    .bind(&record.mood)
    .bind(&record.strategic_fit)
    .bind(record.is_placeholder)
    .bind(record.created_at)
    .execute(pool)
    .await?;

    Ok(())
}

/// Returns every stored analysis for a campaign, valid or not.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_analyses(
    pool: &PgPool,
    campaign_id: Uuid,
) -> Result<Vec<AnalysisRecord>, DbError> {
    let rows = sqlx::query_as::<_, AnalysisRow>(
        "SELECT asset_id, campaign_id, fingerprint, description, mood, strategic_fit, \
                is_placeholder, created_at \
         FROM analysis_records \
         WHERE campaign_id = $1",
    )
    .bind(campaign_id)
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(AnalysisRecord::from).collect())
}
