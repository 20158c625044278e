//! Table and index definitions. Every statement is idempotent so that any
//! component may call [`create_schema`] on start-up.

use sqlx::SqlitePool;

use crate::error::Result;

const STATEMENTS: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS stories (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        source TEXT NOT NULL,
        story_number INTEGER NOT NULL,
        UNIQUE(source, story_number)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS sentences (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        story_id INTEGER NOT NULL REFERENCES stories(id),
        sentence_number INTEGER NOT NULL,
        sentence TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS units (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        sentence_id INTEGER NOT NULL REFERENCES sentences(id),
        position INTEGER NOT NULL,
        text TEXT NOT NULL,
        sense_count INTEGER NOT NULL,
        trivial INTEGER NOT NULL DEFAULT 0,
        resolved_label TEXT,
        resolving_source TEXT,
        resolved_at TEXT,
        compute_time REAL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS senses (
        label TEXT PRIMARY KEY,
        description TEXT NOT NULL,
        example TEXT
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS unit_senses (
        unit_id INTEGER NOT NULL REFERENCES units(id),
        label TEXT NOT NULL REFERENCES senses(label),
        PRIMARY KEY(unit_id, label)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS batches (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        external_id TEXT,
        created_at TEXT NOT NULL,
        sent_at TEXT,
        retrieved_at TEXT,
        CHECK (sent_at IS NULL OR external_id IS NOT NULL),
        CHECK (retrieved_at IS NULL OR sent_at IS NOT NULL)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS assignments (
        batch_id INTEGER NOT NULL REFERENCES batches(id),
        unit_id INTEGER NOT NULL REFERENCES units(id),
        PRIMARY KEY(batch_id, unit_id)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS costs (
        unit_id INTEGER NOT NULL REFERENCES units(id),
        prompt_tokens INTEGER NOT NULL,
        completion_tokens INTEGER NOT NULL,
        incurred_at TEXT NOT NULL,
        source TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS batch_progress (
        batch_id INTEGER NOT NULL REFERENCES batches(id),
        checked_at TEXT NOT NULL,
        completed INTEGER NOT NULL,
        failed INTEGER NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS sentences_by_story ON sentences(story_id)",
    "CREATE INDEX IF NOT EXISTS units_by_sentence ON units(sentence_id)",
    r#"
    CREATE INDEX IF NOT EXISTS unresolved_units ON units(id)
    WHERE resolved_label IS NULL AND sense_count > 1 AND trivial = 0
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS batches_to_retrieve ON batches(external_id)
    WHERE sent_at IS NOT NULL AND retrieved_at IS NULL
    "#,
    "CREATE INDEX IF NOT EXISTS assignments_by_unit ON assignments(unit_id)",
    "CREATE INDEX IF NOT EXISTS costs_by_unit ON costs(unit_id)",
    "CREATE INDEX IF NOT EXISTS progress_by_batch ON batch_progress(batch_id, checked_at)",
];

pub async fn create_schema(pool: &SqlitePool) -> Result<()> {
    let mut tx = pool.begin().await?;
    for statement in STATEMENTS {
        sqlx::query(statement).execute(&mut *tx).await?;
    }
    tx.commit().await?;
    Ok(())
}
