//! Catalog reconciliation
//!
//! Decides what an assembled disc graph means for the catalog and commits
//! it atomically. The catalog is append-only: a changed disc layout becomes
//! a new generation of rows superseding the prior one, never an update in
//! place. The only mutation of an existing row is the `last_verified`
//! timestamp when a re-read confirms an identical layout.

use crate::error::SessionError;
use crate::graph::DiscGraph;
use chrono::Utc;
use discat_common::db::{catalog, DiscRow, ReadStatus};
use sha2::{Digest, Sha256};
use sqlx::SqlitePool;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::info;
use uuid::Uuid;

/// Identity fingerprint of a disc.
///
/// Covers only what names the physical disc (volume name, disc type,
/// label), not its title layout, so a re-read of the same disc with a
/// different tool version still resolves to the same lineage.
pub fn fingerprint(graph: &DiscGraph) -> String {
    let mut hasher = Sha256::new();
    for part in [&graph.volume_name, &graph.disc_type, &graph.label] {
        hasher.update(part.as_deref().unwrap_or(""));
        hasher.update([0x1f]);
    }
    hex_digest(hasher)
}

/// Digest of the disc's title/stream layout, used to decide whether a
/// re-read saw the same content as the cataloged generation.
pub fn layout_digest(graph: &DiscGraph) -> String {
    let mut hasher = Sha256::new();
    for title in &graph.titles {
        hasher.update(title.index.to_string());
        hasher.update([0x1f]);
        hasher.update(title.duration_secs.to_string());
        hasher.update([0x1f]);
        hasher.update(title.chapter_count.to_string());
        hasher.update([0x1f]);
        hasher.update(title.size_bytes.to_string());
        hasher.update([0x1e]);
        for stream in &title.streams {
            hasher.update(stream.index.to_string());
            hasher.update([0x1f]);
            hasher.update(stream.kind.as_str());
            hasher.update([0x1f]);
            hasher.update(stream.codec.as_deref().unwrap_or(""));
            hasher.update([0x1f]);
            hasher.update(stream.language.as_deref().unwrap_or(""));
            hasher.update([0x1e]);
        }
        hasher.update([0x1d]);
    }
    hex_digest(hasher)
}

fn hex_digest(hasher: Sha256) -> String {
    hasher
        .finalize()
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect()
}

/// How a session's graph should enter the catalog
#[derive(Debug, Clone)]
pub struct ReconcileOptions {
    /// Operator explicitly requested a re-read; authorizes superseding a
    /// cataloged generation whose layout differs
    pub explicit_reread: bool,
    /// Final status to record on the new disc row
    pub read_status: ReadStatus,
    /// Device the disc was read from
    pub device_path: Option<String>,
}

/// Result of a successful reconcile
#[derive(Debug, Clone)]
pub struct CommitOutcome {
    pub disc_uid: String,
    pub fingerprint: String,
    pub generation: i64,
    /// True when an identical layout only refreshed `last_verified`
    pub confirmed: bool,
    pub read_status: String,
    pub titles_committed: usize,
    pub streams_committed: usize,
}

/// Plans and commits disc graphs against the catalog
#[derive(Debug, Clone)]
pub struct Reconciler {
    pool: SqlitePool,
    /// Per-fingerprint locks serializing plan-then-commit, so two sessions
    /// reading copies of the same disc cannot both claim a generation
    locks: Arc<Mutex<HashMap<String, Arc<Mutex<()>>>>>,
}

impl Reconciler {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            locks: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Reconcile an assembled graph into the catalog.
    ///
    /// Planning and commit happen under a per-fingerprint lock. The commit
    /// itself is one transaction: on any failure the catalog is untouched.
    pub async fn reconcile(
        &self,
        graph: &DiscGraph,
        opts: &ReconcileOptions,
    ) -> Result<CommitOutcome, SessionError> {
        let fp = fingerprint(graph);
        let digest = layout_digest(graph);

        let lock = {
            let mut locks = self.locks.lock().await;
            locks.entry(fp.clone()).or_default().clone()
        };
        let guard = lock.lock().await;
        let outcome = self.plan_and_commit(graph, opts, &fp, &digest).await;
        drop(guard);
        drop(lock);

        // Drop the map entry once no other session is queued on it, so the
        // registry does not grow with every distinct disc ever read
        let mut locks = self.locks.lock().await;
        if locks.get(&fp).map_or(false, |l| Arc::strong_count(l) == 1) {
            locks.remove(&fp);
        }

        outcome
    }

    async fn plan_and_commit(
        &self,
        graph: &DiscGraph,
        opts: &ReconcileOptions,
        fp: &str,
        digest: &str,
    ) -> Result<CommitOutcome, SessionError> {
        let prior = catalog::latest_disc_by_fingerprint(&self.pool, fp).await?;

        match prior {
            Some(prior) => {
                let prior_partial = prior.read_status == ReadStatus::Partial.as_str();
                // A complete read never confirms a partial generation, even
                // with a matching digest; it supersedes so the recorded
                // status reflects the complete read
                let completes_partial =
                    prior_partial && opts.read_status == ReadStatus::Complete;

                if prior.layout_digest == digest && !completes_partial {
                    self.confirm_read(&prior, opts).await?;
                    info!(
                        fingerprint = %fp,
                        generation = prior.generation,
                        "Re-read confirmed existing generation"
                    );
                    Ok(CommitOutcome {
                        disc_uid: prior.disc_uid,
                        fingerprint: fp.to_string(),
                        generation: prior.generation,
                        confirmed: true,
                        read_status: prior.read_status,
                        titles_committed: 0,
                        streams_committed: 0,
                    })
                } else if opts.explicit_reread || prior_partial {
                    self.insert_generation(
                        graph,
                        opts,
                        fp,
                        digest,
                        prior.generation + 1,
                        Some(&prior.disc_uid),
                    )
                    .await
                } else {
                    Err(SessionError::ConflictingIdentity {
                        fingerprint: fp.to_string(),
                    })
                }
            }
            None => self.insert_generation(graph, opts, fp, digest, 1, None).await,
        }
    }

    async fn confirm_read(
        &self,
        prior: &DiscRow,
        opts: &ReconcileOptions,
    ) -> Result<(), SessionError> {
        sqlx::query("UPDATE discs SET last_verified = ?, device_path = ? WHERE disc_uid = ?")
            .bind(Utc::now().to_rfc3339())
            .bind(&opts.device_path)
            .bind(&prior.disc_uid)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn insert_generation(
        &self,
        graph: &DiscGraph,
        opts: &ReconcileOptions,
        fp: &str,
        digest: &str,
        generation: i64,
        supersedes_uid: Option<&str>,
    ) -> Result<CommitOutcome, SessionError> {
        let disc_uid = Uuid::new_v4().to_string();
        let now = Utc::now().to_rfc3339();
        let mut streams_committed = 0usize;

        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "INSERT INTO discs (disc_uid, fingerprint, generation, supersedes_uid,
                                label, disc_type, device_path, read_status,
                                layout_digest, last_verified, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&disc_uid)
        .bind(fp)
        .bind(generation)
        .bind(supersedes_uid)
        .bind(&graph.label)
        .bind(&graph.disc_type)
        .bind(&opts.device_path)
        .bind(opts.read_status.as_str())
        .bind(digest)
        .bind(&now)
        .bind(&now)
        .execute(&mut *tx)
        .await?;

        for title in &graph.titles {
            sqlx::query(
                "INSERT INTO disc_titles (disc_uid, title_index, name,
                                          duration_secs, chapter_count, size_bytes)
                 VALUES (?, ?, ?, ?, ?, ?)",
            )
            .bind(&disc_uid)
            .bind(title.index as i64)
            .bind(&title.name)
            .bind(title.duration_secs as i64)
            .bind(title.chapter_count as i64)
            .bind(title.size_bytes as i64)
            .execute(&mut *tx)
            .await?;

            for stream in &title.streams {
                let attributes = serde_json::to_string(&stream.attributes)
                    .unwrap_or_else(|_| "{}".to_string());
                sqlx::query(
                    "INSERT INTO disc_streams (disc_uid, title_index, stream_index,
                                               kind, codec, language, attributes)
                     VALUES (?, ?, ?, ?, ?, ?, ?)",
                )
                .bind(&disc_uid)
                .bind(title.index as i64)
                .bind(stream.index as i64)
                .bind(stream.kind.as_str())
                .bind(&stream.codec)
                .bind(&stream.language)
                .bind(&attributes)
                .execute(&mut *tx)
                .await?;
                streams_committed += 1;
            }
        }

        tx.commit().await?;

        info!(
            fingerprint = %fp,
            generation,
            titles = graph.titles.len(),
            streams = streams_committed,
            status = opts.read_status.as_str(),
            "Committed disc generation"
        );

        Ok(CommitOutcome {
            disc_uid,
            fingerprint: fp.to_string(),
            generation,
            confirmed: false,
            read_status: opts.read_status.as_str().to_string(),
            titles_committed: graph.titles.len(),
            streams_committed,
        })
    }
}
