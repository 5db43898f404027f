//! Database initialization and schema creation

use crate::Result;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use std::path::Path;
use tracing::info;

/// Initialize the catalog database, creating it if missing.
///
/// Schema creation is idempotent, so this is safe to call on every startup.
pub async fn init_database(db_path: &Path) -> Result<SqlitePool> {
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
    info!("Opening catalog database at {}", db_path.display());

    let pool = SqlitePoolOptions::new()
        .max_connections(10)
        .connect(&db_url)
        .await?;

    configure_connection(&pool).await?;
    create_schema(&pool).await?;

    Ok(pool)
}

/// In-memory database for tests. Single connection, since each connection
/// to `:memory:` gets its own database.
pub async fn init_database_in_memory() -> Result<SqlitePool> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await?;

    configure_connection(&pool).await?;
    create_schema(&pool).await?;

    Ok(pool)
}

async fn configure_connection(pool: &SqlitePool) -> Result<()> {
    sqlx::query("PRAGMA foreign_keys = ON").execute(pool).await?;
    sqlx::query("PRAGMA journal_mode = WAL").execute(pool).await?;
    sqlx::query("PRAGMA busy_timeout = 5000").execute(pool).await?;
    Ok(())
}

/// Create the catalog tables if they do not exist.
///
/// `discs` rows are keyed by a surrogate `disc_uid` rather than the content
/// fingerprint: every re-read that supersedes a prior read inserts a new row
/// with the same fingerprint and a higher generation, and
/// `UNIQUE (fingerprint, generation)` keeps the lineage consistent.
async fn create_schema(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS discs (
            disc_uid        TEXT PRIMARY KEY,
            fingerprint     TEXT NOT NULL,
            generation      INTEGER NOT NULL,
            supersedes_uid  TEXT REFERENCES discs(disc_uid),
            label           TEXT,
            disc_type       TEXT,
            device_path     TEXT,
            read_status     TEXT NOT NULL DEFAULT 'pending',
            layout_digest   TEXT NOT NULL,
            last_verified   TEXT,
            created_at      TEXT NOT NULL,
            UNIQUE (fingerprint, generation)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS disc_titles (
            disc_uid        TEXT NOT NULL REFERENCES discs(disc_uid),
            title_index     INTEGER NOT NULL,
            name            TEXT,
            duration_secs   INTEGER NOT NULL DEFAULT 0,
            chapter_count   INTEGER NOT NULL DEFAULT 0,
            size_bytes      INTEGER NOT NULL DEFAULT 0,
            PRIMARY KEY (disc_uid, title_index)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS disc_streams (
            disc_uid        TEXT NOT NULL,
            title_index     INTEGER NOT NULL,
            stream_index    INTEGER NOT NULL,
            kind            TEXT NOT NULL,
            codec           TEXT,
            language        TEXT,
            attributes      TEXT NOT NULL DEFAULT '{}',
            PRIMARY KEY (disc_uid, title_index, stream_index),
            FOREIGN KEY (disc_uid, title_index)
                REFERENCES disc_titles(disc_uid, title_index)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_discs_fingerprint ON discs(fingerprint)")
        .execute(pool)
        .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_init_creates_schema() {
        let pool = init_database_in_memory().await.unwrap();

        // All three tables exist and are queryable
        for table in ["discs", "disc_titles", "disc_streams"] {
            let count: (i64,) = sqlx::query_as(&format!("SELECT COUNT(*) FROM {}", table))
                .fetch_one(&pool)
                .await
                .unwrap();
            assert_eq!(count.0, 0);
        }
    }

    #[tokio::test]
    async fn test_schema_creation_is_idempotent() {
        let pool = init_database_in_memory().await.unwrap();
        create_schema(&pool).await.unwrap();
        create_schema(&pool).await.unwrap();
    }

    #[tokio::test]
    async fn test_fingerprint_generation_unique() {
        let pool = init_database_in_memory().await.unwrap();

        let insert = |uid: &'static str, generation: i64| {
            let pool = pool.clone();
            async move {
                sqlx::query(
                    "INSERT INTO discs (disc_uid, fingerprint, generation, layout_digest, created_at)
                     VALUES (?, 'fp', ?, 'ld', '2026-01-01T00:00:00Z')",
                )
                .bind(uid)
                .bind(generation)
                .execute(&pool)
                .await
            }
        };

        insert("a", 1).await.unwrap();
        insert("b", 2).await.unwrap();
        // Same fingerprint and generation again is rejected
        assert!(insert("c", 2).await.is_err());
    }

    #[tokio::test]
    async fn test_file_database_created_with_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("nested").join("catalog.db");
        let pool = init_database(&db_path).await.unwrap();
        drop(pool);
        assert!(db_path.exists());
    }
}
