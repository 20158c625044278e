//! Ingestion helpers. Corpus tokenization lives elsewhere; these write the
//! rows it produces and settle every unit that never needs inference.

use chrono::Utc;

use super::WorkStore;
use crate::error::Result;
use crate::types::{
    is_trivial_token, CandidateSense, SentenceId, StoryId, UnitId, INGEST_SOURCE, NO_SENSE_LABEL,
};

/// A unit as produced by the tokenizer, with its candidate senses.
#[derive(Debug, Clone)]
pub struct NewUnit {
    pub sentence_id: SentenceId,
    pub position: i64,
    pub text: String,
    pub senses: Vec<CandidateSense>,
}

impl NewUnit {
    pub fn new(
        sentence_id: SentenceId,
        position: i64,
        text: impl Into<String>,
        senses: Vec<CandidateSense>,
    ) -> Self {
        Self {
            sentence_id,
            position,
            text: text.into(),
            senses,
        }
    }

    /// Label settled at ingestion, if the unit is not ambiguous.
    fn preresolved_label(&self) -> Option<&str> {
        match self.senses.as_slice() {
            [] => Some(NO_SENSE_LABEL),
            [only] => Some(only.label.as_str()),
            _ => None,
        }
    }
}

impl WorkStore {
    pub async fn insert_story(&self, source: &str, story_number: i64) -> Result<StoryId> {
        let id = sqlx::query_scalar(
            "INSERT INTO stories (source, story_number) VALUES (?, ?) RETURNING id",
        )
        .bind(source)
        .bind(story_number)
        .fetch_one(self.pool())
        .await?;
        Ok(id)
    }

    pub async fn insert_sentence(
        &self,
        story_id: StoryId,
        sentence_number: i64,
        sentence: &str,
    ) -> Result<SentenceId> {
        let id = sqlx::query_scalar(
            "INSERT INTO sentences (story_id, sentence_number, sentence) VALUES (?, ?, ?) RETURNING id",
        )
        .bind(story_id)
        .bind(sentence_number)
        .bind(sentence)
        .fetch_one(self.pool())
        .await?;
        Ok(id)
    }

    /// Insert a unit with its candidate senses.
    ///
    /// Units with at most one candidate are written already resolved and
    /// trivial tokens are flagged, so neither ever reaches selection.
    pub async fn insert_unit(&self, unit: &NewUnit) -> Result<UnitId> {
        let mut tx = self.pool().begin().await?;

        let preresolved = unit.preresolved_label();
        let unit_id: UnitId = sqlx::query_scalar(
            r#"
            INSERT INTO units
                (sentence_id, position, text, sense_count, trivial,
                 resolved_label, resolving_source, resolved_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            RETURNING id
            "#,
        )
        .bind(unit.sentence_id)
        .bind(unit.position)
        .bind(&unit.text)
        .bind(unit.senses.len() as i64)
        .bind(is_trivial_token(&unit.text))
        .bind(preresolved)
        .bind(preresolved.map(|_| INGEST_SOURCE))
        .bind(preresolved.map(|_| Utc::now()))
        .fetch_one(&mut *tx)
        .await?;

        for sense in &unit.senses {
            // Senses are shared across units; the first description wins.
            sqlx::query(
                "INSERT OR IGNORE INTO senses (label, description, example) VALUES (?, ?, ?)",
            )
            .bind(&sense.label)
            .bind(&sense.description)
            .bind(&sense.example)
            .execute(&mut *tx)
            .await?;

            sqlx::query("INSERT OR IGNORE INTO unit_senses (unit_id, label) VALUES (?, ?)")
                .bind(unit_id)
                .bind(&sense.label)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(unit_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StoreConfig;

    #[tokio::test]
    async fn test_units_with_one_or_no_sense_are_preresolved() {
        let dir = tempfile::tempdir().unwrap();
        let store = WorkStore::connect(&StoreConfig {
            url: format!("sqlite://{}", dir.path().join("ingest.db").display()),
            ..StoreConfig::default()
        })
        .await
        .unwrap();

        let story = store.insert_story("test", 1).await.unwrap();
        let sentence = store
            .insert_sentence(story, 0, "They sat by the river.")
            .await
            .unwrap();

        let none = store
            .insert_unit(&NewUnit::new(sentence, 4, "river", vec![]))
            .await
            .unwrap();
        let single = store
            .insert_unit(&NewUnit::new(
                sentence,
                1,
                "sat",
                vec![CandidateSense::new("sit.v.01", "be seated")],
            ))
            .await
            .unwrap();
        let trivial = store
            .insert_unit(&NewUnit::new(
                sentence,
                0,
                "They",
                vec![
                    CandidateSense::new("they.n.01", "a"),
                    CandidateSense::new("they.n.02", "b"),
                ],
            ))
            .await
            .unwrap();

        let none = store.unit(none).await.unwrap().unwrap();
        assert_eq!(none.resolved_label.as_deref(), Some(NO_SENSE_LABEL));
        assert_eq!(none.resolving_source.as_deref(), Some(INGEST_SOURCE));

        let single = store.unit(single).await.unwrap().unwrap();
        assert_eq!(single.resolved_label.as_deref(), Some("sit.v.01"));
        assert_eq!(single.sense_count, 1);

        let trivial = store.unit(trivial).await.unwrap().unwrap();
        assert!(trivial.trivial);
        assert!(trivial.resolved_label.is_none());

        assert!(store
            .select_eligible_units(None, None)
            .await
            .unwrap()
            .is_empty());
    }
}
