//! Catalog queries

use crate::db::models::{DiscRow, StreamRow, TitleRow};
use crate::Result;
use sqlx::SqlitePool;

/// Latest generation cataloged for a fingerprint, if any
pub async fn latest_disc_by_fingerprint(
    pool: &SqlitePool,
    fingerprint: &str,
) -> Result<Option<DiscRow>> {
    let row = sqlx::query_as::<_, DiscRow>(
        "SELECT * FROM discs WHERE fingerprint = ?
         ORDER BY generation DESC LIMIT 1",
    )
    .bind(fingerprint)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

/// Every generation for a fingerprint, oldest first
pub async fn disc_lineage(pool: &SqlitePool, fingerprint: &str) -> Result<Vec<DiscRow>> {
    let rows = sqlx::query_as::<_, DiscRow>(
        "SELECT * FROM discs WHERE fingerprint = ? ORDER BY generation ASC",
    )
    .bind(fingerprint)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

/// Titles of one disc generation, in title-index order
pub async fn titles_for_disc(pool: &SqlitePool, disc_uid: &str) -> Result<Vec<TitleRow>> {
    let rows = sqlx::query_as::<_, TitleRow>(
        "SELECT * FROM disc_titles WHERE disc_uid = ? ORDER BY title_index ASC",
    )
    .bind(disc_uid)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

/// Streams of one title, in stream-index order
pub async fn streams_for_title(
    pool: &SqlitePool,
    disc_uid: &str,
    title_index: i64,
) -> Result<Vec<StreamRow>> {
    let rows = sqlx::query_as::<_, StreamRow>(
        "SELECT * FROM disc_streams WHERE disc_uid = ? AND title_index = ?
         ORDER BY stream_index ASC",
    )
    .bind(disc_uid)
    .bind(title_index)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}
