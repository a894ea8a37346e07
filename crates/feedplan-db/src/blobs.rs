//! Opaque binary payloads (uploaded images, generated graphics).

use sqlx::PgPool;

use crate::DbError;

/// Stores `bytes` under `key`, replacing any previous payload.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the upsert fails.
pub async fn put_blob(pool: &PgPool, key: &str, bytes: &[u8]) -> Result<(), DbError> {
    sqlx::query(
        "INSERT INTO blobs (key, bytes) VALUES ($1, $2) \
         ON CONFLICT (key) DO UPDATE SET bytes = EXCLUDED.bytes",
    )
    .bind(key)
    .bind(bytes)
    .execute(pool)
    .await?;

    Ok(())
}

/// Fetches the payload stored under `key`.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn get_blob(pool: &PgPool, key: &str) -> Result<Option<Vec<u8>>, DbError> {
    let bytes = sqlx::query_scalar::<_, Vec<u8>>("SELECT bytes FROM blobs WHERE key = $1")
        .bind(key)
        .fetch_optional(pool)
        .await?;

    Ok(bytes)
}
