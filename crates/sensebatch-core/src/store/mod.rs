//! WorkStore: the shared SQLite store behind every component.
//!
//! Many independent processes (builders on different shards, a monitor, a
//! fetcher, the queue server) open the same database file. Contention is
//! handled by SQLite's `busy_timeout`: a writer that cannot get the lock
//! waits a bounded time and then fails with a database error instead of
//! blocking forever.
//!
//! ## Atomicity boundaries
//!
//! | Operation                       | Transaction                              |
//! |---------------------------------|------------------------------------------|
//! | `open_batch_with_assignments`   | batch row + every assignment row         |
//! | `mark_sent`                     | one conditional update                   |
//! | `record_progress`               | read last snapshot + clamped insert      |
//! | `apply_result` / `append_cost`  | one statement each                       |
//! | `drain_batch`                   | all results + costs + `mark_retrieved`   |
//!
//! No method holds a transaction across a network call; callers do their
//! network I/O between store calls.

mod ingest;
mod schema;

pub use ingest::NewUnit;
pub use schema::create_schema;

use std::str::FromStr;

use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{QueryBuilder, Sqlite, SqliteConnection, SqlitePool};

use crate::config::StoreConfig;
use crate::error::{Result, SenseError};
use crate::types::*;

/// Totals produced by draining one batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainTotals {
    pub units_resolved: u64,
    pub usage: TokenUsage,
}

/// A batch that was committed locally but never sent.
#[derive(Debug, Clone, PartialEq)]
pub struct UnsentBatch {
    pub batch: Batch,
    pub assignment_count: i64,
}

#[derive(Clone)]
pub struct WorkStore {
    pool: SqlitePool,
}

impl WorkStore {
    /// Open (creating if missing) the database and ensure the schema exists.
    pub async fn connect(config: &StoreConfig) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(&config.url)?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(config.busy_timeout())
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(config.busy_timeout())
            .connect_with(options)
            .await?;

        let store = Self { pool };
        create_schema(&store.pool).await?;
        tracing::debug!(url = %config.url, "Work store ready");
        Ok(store)
    }

    pub fn from_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    // ── Selection ──

    /// Units that may be assigned to a new batch or handed to a worker.
    ///
    /// Excludes resolved units, units with at most one candidate sense,
    /// trivial tokens, and units assigned to any batch not yet retrieved.
    /// Ordered by unit id so that repeated calls are deterministic.
    pub async fn select_eligible_units(
        &self,
        shard: Option<ShardSpec>,
        limit: Option<u32>,
    ) -> Result<Vec<PendingUnit>> {
        let mut query = QueryBuilder::<Sqlite>::new(
            r#"
            SELECT u.id AS unit_id, s.story_id, u.sentence_id, u.position, u.text
            FROM units u
            JOIN sentences s ON s.id = u.sentence_id
            WHERE u.resolved_label IS NULL
              AND u.sense_count > 1
              AND u.trivial = 0
              AND NOT EXISTS (
                  SELECT 1 FROM assignments a
                  JOIN batches b ON b.id = a.batch_id
                  WHERE a.unit_id = u.id AND b.retrieved_at IS NULL
              )
            "#,
        );

        if let Some(shard) = shard {
            query.push(" AND s.story_id % ");
            query.push_bind(shard.modulo);
            query.push(" = ");
            query.push_bind(shard.congruent);
        }

        query.push(" ORDER BY u.id");

        if let Some(limit) = limit {
            query.push(" LIMIT ");
            query.push_bind(i64::from(limit));
        }

        let units = query
            .build_query_as::<PendingUnit>()
            .fetch_all(&self.pool)
            .await?;
        Ok(units)
    }

    /// Ambiguous units with no label, regardless of batch assignment.
    pub async fn count_unresolved(&self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM units
            WHERE resolved_label IS NULL AND sense_count > 1 AND trivial = 0
            "#,
        )
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    // ── Batch lifecycle ──

    /// Open a batch and assign every unit to it, in one transaction.
    ///
    /// An empty unit list is refused: no empty batch is ever created.
    pub async fn open_batch_with_assignments(&self, units: &[UnitId]) -> Result<BatchId> {
        if units.is_empty() {
            return Err(SenseError::NoWork);
        }

        let mut tx = self.pool.begin().await?;

        let batch_id: BatchId =
            sqlx::query_scalar("INSERT INTO batches (created_at) VALUES (?) RETURNING id")
                .bind(Utc::now())
                .fetch_one(&mut *tx)
                .await?;

        for unit_id in units {
            sqlx::query("INSERT INTO assignments (batch_id, unit_id) VALUES (?, ?)")
                .bind(batch_id)
                .bind(unit_id)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;

        tracing::info!(batch_id, units = units.len(), "Opened batch");
        Ok(batch_id)
    }

    /// Record the provider's correlation id. Only an open, unsent batch
    /// may be marked sent.
    pub async fn mark_sent(&self, batch_id: BatchId, external_id: &str) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE batches SET external_id = ?, sent_at = ?
            WHERE id = ? AND sent_at IS NULL
            "#,
        )
        .bind(external_id)
        .bind(Utc::now())
        .bind(batch_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() != 1 {
            return Err(SenseError::InvalidState(format!(
                "updated {} rows marking batch {batch_id} sent as {external_id}",
                result.rows_affected()
            )));
        }
        Ok(())
    }

    /// Append a progress snapshot. Counters are clamped to the previous
    /// snapshot so that the series never decreases.
    pub async fn record_progress(
        &self,
        batch_id: BatchId,
        completed: i64,
        failed: i64,
    ) -> Result<ProgressSnapshot> {
        let mut tx = self.pool.begin().await?;

        // Take the write lock before reading the previous snapshot, so a
        // concurrent poll of the same batch waits instead of clamping
        // against a stale row.
        sqlx::query("UPDATE batches SET sent_at = sent_at WHERE id = ?")
            .bind(batch_id)
            .execute(&mut *tx)
            .await?;

        let sent: Option<Option<DateTime<Utc>>> =
            sqlx::query_scalar("SELECT sent_at FROM batches WHERE id = ?")
                .bind(batch_id)
                .fetch_optional(&mut *tx)
                .await?;
        match sent {
            None => return Err(SenseError::NotFound(format!("batch {batch_id}"))),
            Some(None) => {
                return Err(SenseError::InvalidState(format!(
                    "batch {batch_id} has not been sent"
                )))
            }
            Some(Some(_)) => {}
        }

        let previous: Option<(i64, i64)> = sqlx::query_as(
            r#"
            SELECT completed, failed FROM batch_progress
            WHERE batch_id = ?
            ORDER BY rowid DESC LIMIT 1
            "#,
        )
        .bind(batch_id)
        .fetch_optional(&mut *tx)
        .await?;

        let (completed, failed) = match previous {
            Some((prev_completed, prev_failed)) => {
                if completed < prev_completed || failed < prev_failed {
                    tracing::warn!(
                        batch_id,
                        completed,
                        failed,
                        prev_completed,
                        prev_failed,
                        "Provider counters went backwards, clamping"
                    );
                }
                (completed.max(prev_completed), failed.max(prev_failed))
            }
            None => (completed.max(0), failed.max(0)),
        };

        let snapshot = ProgressSnapshot {
            batch_id,
            checked_at: Utc::now(),
            completed,
            failed,
        };

        sqlx::query(
            "INSERT INTO batch_progress (batch_id, checked_at, completed, failed) VALUES (?, ?, ?, ?)",
        )
        .bind(snapshot.batch_id)
        .bind(snapshot.checked_at)
        .bind(snapshot.completed)
        .bind(snapshot.failed)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(snapshot)
    }

    /// Write a unit's label. A full overwrite, so re-applying is harmless.
    pub async fn apply_result(
        &self,
        unit_id: UnitId,
        label: &str,
        source: &str,
        compute_time: Option<f64>,
    ) -> Result<()> {
        let mut conn = self.pool.acquire().await?;
        if !apply_result_on(&mut *conn, unit_id, label, source, compute_time).await? {
            return Err(SenseError::NotFound(format!("unit {unit_id}")));
        }
        Ok(())
    }

    pub async fn append_cost(
        &self,
        unit_id: UnitId,
        usage: TokenUsage,
        source: &str,
    ) -> Result<()> {
        let mut conn = self.pool.acquire().await?;
        append_cost_on(&mut *conn, unit_id, usage, source).await
    }

    /// Apply a resolution and its cost row together.
    pub async fn resolve(&self, resolution: &Resolution) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        let applied = apply_result_on(
            &mut *tx,
            resolution.unit_id,
            &resolution.label,
            &resolution.source,
            resolution.compute_time,
        )
        .await?;
        if !applied {
            return Err(SenseError::NotFound(format!("unit {}", resolution.unit_id)));
        }
        if let Some(usage) = resolution.usage {
            append_cost_on(&mut *tx, resolution.unit_id, usage, &resolution.source).await?;
        }
        tx.commit().await?;
        Ok(())
    }

    /// Set `retrieved_at`. Only a sent, unretrieved batch qualifies.
    pub async fn mark_retrieved(&self, batch_id: BatchId) -> Result<()> {
        let mut conn = self.pool.acquire().await?;
        mark_retrieved_on(&mut *conn, batch_id).await
    }

    /// Apply every result of one batch, append their cost rows, and mark
    /// the batch retrieved, all in a single transaction.
    ///
    /// A crash anywhere inside leaves the batch unretrieved with none of
    /// its results or costs committed, so the next drain starts over.
    pub async fn drain_batch(
        &self,
        batch_id: BatchId,
        resolutions: &[Resolution],
    ) -> Result<DrainTotals> {
        let mut tx = self.pool.begin().await?;
        let mut totals = DrainTotals::default();

        for resolution in resolutions {
            let applied = apply_result_on(
                &mut *tx,
                resolution.unit_id,
                &resolution.label,
                &resolution.source,
                resolution.compute_time,
            )
            .await?;
            if !applied {
                tracing::warn!(
                    batch_id,
                    unit_id = resolution.unit_id,
                    "Result for unknown unit skipped"
                );
                continue;
            }
            totals.units_resolved += 1;

            if let Some(usage) = resolution.usage {
                append_cost_on(&mut *tx, resolution.unit_id, usage, &resolution.source).await?;
                totals.usage += usage;
            }
        }

        mark_retrieved_on(&mut *tx, batch_id).await?;
        tx.commit().await?;

        tracing::info!(
            batch_id,
            units_resolved = totals.units_resolved,
            prompt_tokens = totals.usage.prompt_tokens,
            completion_tokens = totals.usage.completion_tokens,
            "Drained batch"
        );
        Ok(totals)
    }

    // ── Reads ──

    pub async fn sentence(&self, sentence_id: SentenceId) -> Result<Option<String>> {
        let sentence = sqlx::query_scalar("SELECT sentence FROM sentences WHERE id = ?")
            .bind(sentence_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(sentence)
    }

    pub async fn candidate_senses(&self, unit_id: UnitId) -> Result<Vec<CandidateSense>> {
        let senses = sqlx::query_as::<_, CandidateSense>(
            r#"
            SELECT s.label, s.description, s.example
            FROM unit_senses us
            JOIN senses s ON s.label = us.label
            WHERE us.unit_id = ?
            ORDER BY s.label
            "#,
        )
        .bind(unit_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(senses)
    }

    pub async fn unit(&self, unit_id: UnitId) -> Result<Option<Unit>> {
        let unit = sqlx::query_as::<_, Unit>(
            r#"
            SELECT id, sentence_id, position, text, sense_count, trivial,
                   resolved_label, resolving_source, resolved_at, compute_time
            FROM units WHERE id = ?
            "#,
        )
        .bind(unit_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(unit)
    }

    pub async fn batch(&self, batch_id: BatchId) -> Result<Option<Batch>> {
        let batch = sqlx::query_as::<_, Batch>(
            "SELECT id, external_id, created_at, sent_at, retrieved_at FROM batches WHERE id = ?",
        )
        .bind(batch_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(batch)
    }

    pub async fn batch_count(&self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM batches")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    /// Batches sent to the provider and not yet retrieved.
    pub async fn open_sent_batches(&self) -> Result<Vec<Batch>> {
        let batches = sqlx::query_as::<_, Batch>(
            r#"
            SELECT id, external_id, created_at, sent_at, retrieved_at
            FROM batches
            WHERE sent_at IS NOT NULL AND retrieved_at IS NULL
            ORDER BY id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(batches)
    }

    /// Batches committed locally that never reached `sent`.
    pub async fn unsent_batches(&self) -> Result<Vec<UnsentBatch>> {
        let rows: Vec<(BatchId, Option<String>, DateTime<Utc>, i64)> = sqlx::query_as(
            r#"
            SELECT b.id, b.external_id, b.created_at,
                   (SELECT COUNT(*) FROM assignments a WHERE a.batch_id = b.id)
            FROM batches b
            WHERE b.sent_at IS NULL
            ORDER BY b.id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(id, external_id, created_at, assignment_count)| UnsentBatch {
                batch: Batch {
                    id,
                    external_id,
                    created_at,
                    sent_at: None,
                    retrieved_at: None,
                },
                assignment_count,
            })
            .collect())
    }

    pub async fn assignments(&self, batch_id: BatchId) -> Result<Vec<UnitId>> {
        let units = sqlx::query_scalar(
            "SELECT unit_id FROM assignments WHERE batch_id = ? ORDER BY unit_id",
        )
        .bind(batch_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(units)
    }

    pub async fn progress_snapshots(&self, batch_id: BatchId) -> Result<Vec<ProgressSnapshot>> {
        let snapshots = sqlx::query_as::<_, ProgressSnapshot>(
            r#"
            SELECT batch_id, checked_at, completed, failed
            FROM batch_progress
            WHERE batch_id = ?
            ORDER BY rowid
            "#,
        )
        .bind(batch_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(snapshots)
    }

    pub async fn costs(&self, unit_id: UnitId) -> Result<Vec<CostRecord>> {
        let costs = sqlx::query_as::<_, CostRecord>(
            r#"
            SELECT unit_id, prompt_tokens, completion_tokens, incurred_at, source
            FROM costs WHERE unit_id = ?
            ORDER BY rowid
            "#,
        )
        .bind(unit_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(costs)
    }

    /// Units assigned to more than one unretrieved batch, with the count.
    /// Selection prevents this; a non-empty answer means the invariant was
    /// broken from outside.
    pub async fn double_assigned_units(&self) -> Result<Vec<(UnitId, i64)>> {
        let rows = sqlx::query_as(
            r#"
            SELECT a.unit_id, COUNT(*) AS open_batches
            FROM assignments a
            JOIN batches b ON b.id = a.batch_id
            WHERE b.retrieved_at IS NULL
            GROUP BY a.unit_id
            HAVING COUNT(*) > 1
            ORDER BY a.unit_id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}

// ── Statement helpers shared by single-step and composite operations ──

async fn apply_result_on(
    conn: &mut SqliteConnection,
    unit_id: UnitId,
    label: &str,
    source: &str,
    compute_time: Option<f64>,
) -> Result<bool> {
    let result = sqlx::query(
        r#"
        UPDATE units
        SET resolved_label = ?, resolving_source = ?, resolved_at = ?, compute_time = ?
        WHERE id = ?
        "#,
    )
    .bind(label)
    .bind(source)
    .bind(Utc::now())
    .bind(compute_time)
    .bind(unit_id)
    .execute(&mut *conn)
    .await?;
    Ok(result.rows_affected() == 1)
}

async fn append_cost_on(
    conn: &mut SqliteConnection,
    unit_id: UnitId,
    usage: TokenUsage,
    source: &str,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO costs (unit_id, prompt_tokens, completion_tokens, incurred_at, source)
        VALUES (?, ?, ?, ?, ?)
        "#,
    )
    .bind(unit_id)
    .bind(usage.prompt_tokens)
    .bind(usage.completion_tokens)
    .bind(Utc::now())
    .bind(source)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

async fn mark_retrieved_on(conn: &mut SqliteConnection, batch_id: BatchId) -> Result<()> {
    let result = sqlx::query(
        r#"
        UPDATE batches SET retrieved_at = ?
        WHERE id = ? AND sent_at IS NOT NULL AND retrieved_at IS NULL
        "#,
    )
    .bind(Utc::now())
    .bind(batch_id)
    .execute(&mut *conn)
    .await?;

    if result.rows_affected() != 1 {
        return Err(SenseError::InvalidState(format!(
            "batch {batch_id} is not awaiting retrieval"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn test_store() -> (tempfile::TempDir, WorkStore) {
        let dir = tempfile::tempdir().unwrap();
        let config = StoreConfig {
            url: format!("sqlite://{}", dir.path().join("store.db").display()),
            ..StoreConfig::default()
        };
        let store = WorkStore::connect(&config).await.unwrap();
        (dir, store)
    }

    async fn seed_ambiguous(store: &WorkStore, story_number: i64, word: &str) -> UnitId {
        let story = store.insert_story("test", story_number).await.unwrap();
        let sentence = store
            .insert_sentence(story, 0, &format!("A {word} here."))
            .await
            .unwrap();
        store
            .insert_unit(&NewUnit::new(
                sentence,
                1,
                word,
                vec![
                    CandidateSense::new(format!("{word}.n.01"), "first"),
                    CandidateSense::new(format!("{word}.v.01"), "second"),
                ],
            ))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_open_batch_rejects_empty() {
        let (_dir, store) = test_store().await;
        let err = store.open_batch_with_assignments(&[]).await.unwrap_err();
        assert!(matches!(err, SenseError::NoWork));
        assert_eq!(store.batch_count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_mark_sent_only_once() {
        let (_dir, store) = test_store().await;
        let unit = seed_ambiguous(&store, 0, "bank").await;
        let batch = store.open_batch_with_assignments(&[unit]).await.unwrap();

        store.mark_sent(batch, "batch_1").await.unwrap();
        let err = store.mark_sent(batch, "batch_2").await.unwrap_err();
        assert!(matches!(err, SenseError::InvalidState(_)));

        let row = store.batch(batch).await.unwrap().unwrap();
        assert_eq!(row.external_id.as_deref(), Some("batch_1"));
        assert_eq!(row.state(), BatchState::Sent);
    }

    #[tokio::test]
    async fn test_mark_retrieved_requires_sent_and_happens_once() {
        let (_dir, store) = test_store().await;
        let unit = seed_ambiguous(&store, 0, "bank").await;
        let batch = store.open_batch_with_assignments(&[unit]).await.unwrap();

        assert!(matches!(
            store.mark_retrieved(batch).await,
            Err(SenseError::InvalidState(_))
        ));
        store.mark_sent(batch, "batch_1").await.unwrap();
        store.mark_retrieved(batch).await.unwrap();
        assert!(matches!(
            store.mark_retrieved(batch).await,
            Err(SenseError::InvalidState(_))
        ));
    }

    #[tokio::test]
    async fn test_assigned_units_not_reselected_until_retrieved() {
        let (_dir, store) = test_store().await;
        let unit = seed_ambiguous(&store, 0, "bank").await;

        let first = store.select_eligible_units(None, None).await.unwrap();
        assert_eq!(first.len(), 1);
        let batch = store.open_batch_with_assignments(&[unit]).await.unwrap();
        assert!(store
            .select_eligible_units(None, None)
            .await
            .unwrap()
            .is_empty());

        // Retrieved without a result for this unit: eligible again.
        store.mark_sent(batch, "batch_1").await.unwrap();
        store.drain_batch(batch, &[]).await.unwrap();
        let again = store.select_eligible_units(None, None).await.unwrap();
        assert_eq!(again.len(), 1);
        assert_eq!(again[0].unit_id, unit);
    }

    #[tokio::test]
    async fn test_progress_is_clamped_monotonic() {
        let (_dir, store) = test_store().await;
        let unit = seed_ambiguous(&store, 0, "bank").await;
        let batch = store.open_batch_with_assignments(&[unit]).await.unwrap();
        assert!(matches!(
            store.record_progress(batch, 0, 0).await,
            Err(SenseError::InvalidState(_))
        ));
        store.mark_sent(batch, "batch_1").await.unwrap();

        store.record_progress(batch, 5, 1).await.unwrap();
        let clamped = store.record_progress(batch, 3, 0).await.unwrap();
        assert_eq!((clamped.completed, clamped.failed), (5, 1));
        store.record_progress(batch, 9, 2).await.unwrap();

        let series = store.progress_snapshots(batch).await.unwrap();
        let processed: Vec<i64> = series.iter().map(|s| s.processed()).collect();
        assert_eq!(processed, vec![6, 6, 11]);
    }

    #[tokio::test]
    async fn test_concurrent_progress_stays_monotonic() {
        let (_dir, store) = test_store().await;
        let unit = seed_ambiguous(&store, 0, "bank").await;
        let batch = store.open_batch_with_assignments(&[unit]).await.unwrap();
        store.mark_sent(batch, "batch_1").await.unwrap();

        let counts = [4, 9, 2, 7, 1, 8, 3, 6, 5, 10];
        let mut polls = tokio::task::JoinSet::new();
        for completed in counts {
            let store = store.clone();
            polls.spawn(async move { store.record_progress(batch, completed, 0).await });
        }
        while let Some(joined) = polls.join_next().await {
            joined.unwrap().unwrap();
        }

        let series = store.progress_snapshots(batch).await.unwrap();
        assert_eq!(series.len(), counts.len());
        for pair in series.windows(2) {
            assert!(pair[1].completed >= pair[0].completed, "{series:?}");
        }
        assert_eq!(series.last().unwrap().completed, 10);
    }

    #[tokio::test]
    async fn test_resolve_writes_label_and_cost() {
        let (_dir, store) = test_store().await;
        let unit = seed_ambiguous(&store, 0, "bank").await;
        store
            .resolve(&Resolution {
                unit_id: unit,
                label: "bank.n.01".into(),
                source: "llama3".into(),
                compute_time: Some(1.5),
                usage: Some(TokenUsage {
                    prompt_tokens: 10,
                    completion_tokens: 2,
                }),
            })
            .await
            .unwrap();

        let row = store.unit(unit).await.unwrap().unwrap();
        assert_eq!(row.resolved_label.as_deref(), Some("bank.n.01"));
        assert_eq!(row.resolving_source.as_deref(), Some("llama3"));
        assert_eq!(row.compute_time, Some(1.5));
        assert!(row.resolved_at.is_some());
        assert_eq!(store.costs(unit).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_apply_result_unknown_unit() {
        let (_dir, store) = test_store().await;
        let err = store
            .apply_result(999, "x.n.01", "test", None)
            .await
            .unwrap_err();
        assert!(matches!(err, SenseError::NotFound(_)));
    }
}
