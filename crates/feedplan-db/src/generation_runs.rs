//! Database operations for `generation_runs`, `run_items`, and `campaign_ledgers`.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use feedplan_core::{
    Caption, DatedItem, DegradedItem, GenerationRun, GraphicRequest, HookCta, RunItem,
};
use sqlx::types::Json;
use sqlx::PgPool;
use uuid::Uuid;

use crate::ledger::LedgerMarks;
use crate::{to_i32, to_u32, DbError};

// ---------------------------------------------------------------------------
// Row types
// ---------------------------------------------------------------------------

/// A row from the `generation_runs` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct GenerationRunRow {
    pub id: Uuid,
    pub campaign_id: Uuid,
    pub run_number: i32,
    pub degraded: Json<Vec<DegradedItem>>,
    pub created_at: DateTime<Utc>,
}

/// A row from the `run_items` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct RunItemRow {
    pub day_number: i32,
    pub asset_ids: Vec<Uuid>,
    pub seed: String,
    pub rationale: String,
    pub post_time: String,
    pub hook: Option<String>,
    pub cta: Option<String>,
    pub graphic_concept: Option<String>,
    pub graphic_blob_key: Option<String>,
    pub caption: String,
    pub caption_placeholder: bool,
}

impl RunItemRow {
    fn into_run_item(self) -> Result<RunItem, DbError> {
        let day_number = to_u32(self.day_number, "day number")?;
        let hook_cta = match (self.hook, self.cta) {
            (Some(hook), Some(cta)) => Some(HookCta { hook, cta }),
            _ => None,
        };
        Ok(RunItem {
            item: DatedItem {
                day_number,
                asset_ids: self.asset_ids,
                seed: self.seed,
                rationale: self.rationale,
                post_time: self.post_time,
                hook_cta,
                graphic: self.graphic_concept.map(|concept| GraphicRequest { concept }),
                graphic_blob_key: self.graphic_blob_key,
            },
            caption: Caption {
                day_number,
                text: self.caption,
                is_placeholder: self.caption_placeholder,
            },
        })
    }
}

// ---------------------------------------------------------------------------
// Ledger reads
// ---------------------------------------------------------------------------

/// Reads the high-water marks for a campaign, falling back to the numbers
/// actually present when no ledger row exists yet.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn ledger_marks(pool: &PgPool, campaign_id: Uuid) -> Result<LedgerMarks, DbError> {
    let (last_run, last_day): (i32, i32) = sqlx::query_as(
        "SELECT \
             GREATEST(COALESCE(l.last_run_number, 0), COALESCE(r.max_run, 0)), \
             GREATEST(COALESCE(l.last_day_number, 0), COALESCE(d.max_day, 0)) \
         FROM (SELECT $1::uuid AS campaign_id) c \
         LEFT JOIN campaign_ledgers l ON l.campaign_id = c.campaign_id \
         LEFT JOIN (SELECT MAX(run_number) AS max_run FROM generation_runs \
                    WHERE campaign_id = $1) r ON TRUE \
         LEFT JOIN (SELECT MAX(day_number) AS max_day FROM run_items \
                    WHERE campaign_id = $1) d ON TRUE",
    )
    .bind(campaign_id)
    .fetch_one(pool)
    .await?;

    Ok(LedgerMarks {
        last_run_number: to_u32(last_run, "run number")?,
        last_day_number: to_u32(last_day, "day number")?,
    })
}

// ---------------------------------------------------------------------------
// Commit
// ---------------------------------------------------------------------------

/// Writes a run and all of its items in one transaction.
///
/// The ledger row is locked for the duration, so two commits for the same
/// campaign serialize. If any check or insert fails the transaction is
/// dropped and rolled back; no item of the run becomes visible and neither
/// high-water mark moves.
///
/// # Errors
///
/// - [`DbError::RunNumberConflict`] / [`DbError::DayNumberConflict`] if the
///   numbers were already issued.
/// - [`DbError::Sqlx`] if any statement fails.
pub async fn commit_run(
    pool: &PgPool,
    campaign_id: Uuid,
    run_number: u32,
    items: &[RunItem],
    degraded: &[DegradedItem],
) -> Result<Uuid, DbError> {
    let mut tx = pool.begin().await?;

    sqlx::query(
        "INSERT INTO campaign_ledgers (campaign_id) VALUES ($1) \
         ON CONFLICT (campaign_id) DO NOTHING",
    )
    .bind(campaign_id)
    .execute(&mut *tx)
    .await?;

    let (last_run, last_day): (i32, i32) = sqlx::query_as(
        "SELECT last_run_number, last_day_number FROM campaign_ledgers \
         WHERE campaign_id = $1 FOR UPDATE",
    )
    .bind(campaign_id)
    .fetch_one(&mut *tx)
    .await?;

    let marks = LedgerMarks {
        last_run_number: to_u32(last_run, "run number")?,
        last_day_number: to_u32(last_day, "day number")?,
    }
    .admit(campaign_id, run_number, items)?;

    let run_id = Uuid::new_v4();
    sqlx::query(
        "INSERT INTO generation_runs (id, campaign_id, run_number, degraded) \
         VALUES ($1, $2, $3, $4)",
    )
    .bind(run_id)
    .bind(campaign_id)
    .bind(to_i32(run_number, "run number")?)
    .bind(Json(degraded))
    .execute(&mut *tx)
    .await?;

    for entry in items {
        let item = &entry.item;
        sqlx::query(
            "INSERT INTO run_items \
                 (run_id, campaign_id, day_number, asset_ids, seed, rationale, post_time, \
                  hook, cta, graphic_concept, graphic_blob_key, caption, caption_placeholder) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)",
        )
        .bind(run_id)
        .bind(campaign_id)
        .bind(to_i32(item.day_number, "day number")?)
        .bind(&item.asset_ids)
        .bind(&item.seed)
        .bind(&item.rationale)
        .bind(&item.post_time)
        .bind(item.hook_cta.as_ref().map(|h| h.hook.as_str()))
        .bind(item.hook_cta.as_ref().map(|h| h.cta.as_str()))
        .bind(item.graphic.as_ref().map(|g| g.concept.as_str()))
        .bind(item.graphic_blob_key.as_deref())
        .bind(&entry.caption.text)
        .bind(entry.caption.is_placeholder)
        .execute(&mut *tx)
        .await?;
    }

    sqlx::query(
        "UPDATE campaign_ledgers \
         SET last_run_number = $2, last_day_number = $3 \
         WHERE campaign_id = $1",
    )
    .bind(campaign_id)
    .bind(to_i32(marks.last_run_number, "run number")?)
    .bind(to_i32(marks.last_day_number, "day number")?)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(run_id)
}

// ---------------------------------------------------------------------------
// Reads
// ---------------------------------------------------------------------------

/// Returns the retained run numbers of a campaign, newest first.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_run_numbers(pool: &PgPool, campaign_id: Uuid) -> Result<Vec<u32>, DbError> {
    let numbers = sqlx::query_scalar::<_, i32>(
        "SELECT run_number FROM generation_runs \
         WHERE campaign_id = $1 \
         ORDER BY run_number DESC",
    )
    .bind(campaign_id)
    .fetch_all(pool)
    .await?;

    numbers
        .into_iter()
        .map(|n| to_u32(n, "run number"))
        .collect()
}

/// Loads exactly the items committed under one run, ordered by day.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if the run does not exist, or
/// [`DbError::Sqlx`] if a query fails.
pub async fn load_run(
    pool: &PgPool,
    campaign_id: Uuid,
    run_number: u32,
) -> Result<GenerationRun, DbError> {
    let row = sqlx::query_as::<_, GenerationRunRow>(
        "SELECT id, campaign_id, run_number, degraded, created_at \
         FROM generation_runs \
         WHERE campaign_id = $1 AND run_number = $2",
    )
    .bind(campaign_id)
    .bind(to_i32(run_number, "run number")?)
    .fetch_optional(pool)
    .await?
    .ok_or(DbError::NotFound)?;

    let item_rows = sqlx::query_as::<_, RunItemRow>(
        "SELECT day_number, asset_ids, seed, rationale, post_time, hook, cta, \
                graphic_concept, graphic_blob_key, caption, caption_placeholder \
         FROM run_items \
         WHERE run_id = $1 \
         ORDER BY day_number",
    )
    .bind(row.id)
    .fetch_all(pool)
    .await?;

    let items = item_rows
        .into_iter()
        .map(RunItemRow::into_run_item)
        .collect::<Result<Vec<_>, _>>()?;

    Ok(GenerationRun {
        id: row.id,
        campaign_id: row.campaign_id,
        run_number: to_u32(row.run_number, "run number")?,
        items,
        degraded: row.degraded.0,
        created_at: row.created_at,
    })
}

/// Deletes a run and its items. The ledger marks are left untouched.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if the run does not exist, or
/// [`DbError::Sqlx`] if the delete fails.
pub async fn delete_run(pool: &PgPool, campaign_id: Uuid, run_number: u32) -> Result<(), DbError> {
    let result = sqlx::query(
        "DELETE FROM generation_runs WHERE campaign_id = $1 AND run_number = $2",
    )
    .bind(campaign_id)
    .bind(to_i32(run_number, "run number")?)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::NotFound);
    }

    Ok(())
}

/// Asset ids referenced by any retained run of the campaign.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn consumed_asset_ids(pool: &PgPool, campaign_id: Uuid) -> Result<HashSet<Uuid>, DbError> {
    let ids = sqlx::query_scalar::<_, Uuid>(
        "SELECT DISTINCT unnest(asset_ids) FROM run_items WHERE campaign_id = $1",
    )
    .bind(campaign_id)
    .fetch_all(pool)
    .await?;

    Ok(ids.into_iter().collect())
}
