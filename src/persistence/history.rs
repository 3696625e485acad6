//! Validation-history repository. The log is append-only; ordering by
//! `processed_at` is the authoritative trace of what the pipeline did.

use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};
use tracing::debug;

use crate::domain::Outcome;
use crate::error::{PipelineError, PipelineResult};

use super::NewHistoryEntry;

/// One persisted history row.
#[derive(Debug, Clone, FromRow)]
pub struct HistoryEntry {
    pub id: i64,
    pub venue_id: i64,
    pub score: i32,
    pub status: String,
    pub notes: String,
    pub breakdown: Option<serde_json::Value>,
    pub place_snapshot: Option<serde_json::Value>,
    pub place_found: bool,
    pub prompt_version: Option<String>,
    pub processed_at: DateTime<Utc>,
}

impl HistoryEntry {
    pub fn outcome(&self) -> Outcome {
        Outcome::from_str(&self.status)
    }
}

const HISTORY_COLUMNS: &str = r#"
    id, venue_id, score, status, notes, breakdown, place_snapshot,
    place_found, prompt_version, processed_at
"#;

#[derive(Clone)]
pub struct HistoryRepository {
    pool: PgPool,
}

impl HistoryRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Append one attempt. Returns the new row id.
    pub async fn insert(&self, entry: &NewHistoryEntry) -> PipelineResult<i64> {
        let breakdown = serde_json::to_value(&entry.breakdown)
            .map_err(|e| PipelineError::storage("history.insert", e))?;
        let snapshot = entry
            .place_snapshot
            .as_ref()
            .map(serde_json::to_value)
            .transpose()
            .map_err(|e| PipelineError::storage("history.insert", e))?;

        let (id,): (i64,) = sqlx::query_as(
            r#"
            INSERT INTO venue_validation_histories
                (venue_id, score, status, notes, breakdown, place_snapshot,
                 place_found, prompt_version, processed_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, NOW())
            RETURNING id
            "#,
        )
        .bind(entry.venue_id)
        .bind(entry.score as i32)
        .bind(entry.outcome.as_str())
        .bind(&entry.notes)
        .bind(breakdown)
        .bind(snapshot)
        .bind(entry.place_found)
        .bind(&entry.prompt_version)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| PipelineError::storage("history.insert", e))?;

        debug!(
            venue_id = entry.venue_id,
            history_id = id,
            status = entry.outcome.as_str(),
            "history row appended"
        );
        Ok(id)
    }

    pub async fn has_history(&self, venue_id: i64) -> PipelineResult<bool> {
        let (exists,): (bool,) = sqlx::query_as(
            "SELECT EXISTS (SELECT 1 FROM venue_validation_histories WHERE venue_id = $1)",
        )
        .bind(venue_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| PipelineError::storage("history.has_history", e))?;
        Ok(exists)
    }

    pub async fn latest_for_venue(&self, venue_id: i64) -> PipelineResult<Option<HistoryEntry>> {
        let entry = sqlx::query_as::<_, HistoryEntry>(&format!(
            r#"
            SELECT {HISTORY_COLUMNS}
            FROM venue_validation_histories
            WHERE venue_id = $1
            ORDER BY processed_at DESC
            LIMIT 1
            "#
        ))
        .bind(venue_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| PipelineError::storage("history.latest_for_venue", e))?;
        Ok(entry)
    }

    pub async fn list_for_venue(&self, venue_id: i64) -> PipelineResult<Vec<HistoryEntry>> {
        let entries = sqlx::query_as::<_, HistoryEntry>(&format!(
            r#"
            SELECT {HISTORY_COLUMNS}
            FROM venue_validation_histories
            WHERE venue_id = $1
            ORDER BY processed_at DESC
            "#
        ))
        .bind(venue_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| PipelineError::storage("history.list_for_venue", e))?;
        Ok(entries)
    }

    /// The manual review queue: most recent attempt per still-pending
    /// venue that landed in manual review, ranked score desc then recency.
    pub async fn manual_review_queue(&self, limit: i64) -> PipelineResult<Vec<HistoryEntry>> {
        let entries = sqlx::query_as::<_, HistoryEntry>(
            r#"
            SELECT DISTINCT ON (h.venue_id)
                h.id, h.venue_id, h.score, h.status, h.notes, h.breakdown,
                h.place_snapshot, h.place_found, h.prompt_version, h.processed_at
            FROM venue_validation_histories h
            JOIN venues v ON v.id = h.venue_id
            WHERE v.active = 0 AND h.status = 'manual_review'
            ORDER BY h.venue_id, h.processed_at DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| PipelineError::storage("history.manual_review_queue", e))?;

        let mut latest = entries;
        latest.sort_by(|a, b| {
            b.score
                .cmp(&a.score)
                .then(b.processed_at.cmp(&a.processed_at))
        });
        latest.truncate(limit.max(0) as usize);
        Ok(latest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_outcome_parsing() {
        let entry = HistoryEntry {
            id: 1,
            venue_id: 2,
            score: 88,
            status: "approved".to_string(),
            notes: String::new(),
            breakdown: None,
            place_snapshot: None,
            place_found: true,
            prompt_version: Some("v1-default".to_string()),
            processed_at: Utc::now(),
        };
        assert_eq!(entry.outcome(), Outcome::Approved);
    }
}
