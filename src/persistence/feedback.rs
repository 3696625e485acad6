//! Editor feedback repository: thumbs up/down on automated decisions,
//! keyed by prompt version so prompt iterations can be compared.

use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};
use std::net::IpAddr;
use tracing::debug;

use crate::error::{PipelineError, PipelineResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedbackKind {
    ThumbsUp,
    ThumbsDown,
}

impl FeedbackKind {
    pub fn as_str(self) -> &'static str {
        match self {
            FeedbackKind::ThumbsUp => "thumbs_up",
            FeedbackKind::ThumbsDown => "thumbs_down",
        }
    }

    pub fn from_str(value: &str) -> Option<Self> {
        match value {
            "thumbs_up" => Some(FeedbackKind::ThumbsUp),
            "thumbs_down" => Some(FeedbackKind::ThumbsDown),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct NewFeedback {
    pub venue_id: i64,
    pub prompt_version: Option<String>,
    pub kind: FeedbackKind,
    pub comment: Option<String>,
    pub source_ip: Option<IpAddr>,
}

#[derive(Debug, Clone, FromRow)]
pub struct Feedback {
    pub id: i64,
    pub venue_id: i64,
    pub prompt_version: Option<String>,
    pub feedback_type: String,
    pub comment: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct FeedbackRepository {
    pool: PgPool,
}

impl FeedbackRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn insert(&self, feedback: &NewFeedback) -> PipelineResult<i64> {
        let (id,): (i64,) = sqlx::query_as(
            r#"
            INSERT INTO editor_feedback
                (venue_id, prompt_version, feedback_type, comment, ip, created_at)
            VALUES ($1, $2, $3, $4, $5::inet, NOW())
            RETURNING id
            "#,
        )
        .bind(feedback.venue_id)
        .bind(&feedback.prompt_version)
        .bind(feedback.kind.as_str())
        .bind(&feedback.comment)
        .bind(feedback.source_ip.map(|ip| ip.to_string()))
        .fetch_one(&self.pool)
        .await
        .map_err(|e| PipelineError::storage("feedback.insert", e))?;

        debug!(
            venue_id = feedback.venue_id,
            kind = feedback.kind.as_str(),
            "editor feedback recorded"
        );
        Ok(id)
    }

    pub async fn list_for_venue(&self, venue_id: i64) -> PipelineResult<Vec<Feedback>> {
        sqlx::query_as::<_, Feedback>(
            r#"
            SELECT id, venue_id, prompt_version, feedback_type, comment, created_at
            FROM editor_feedback
            WHERE venue_id = $1
            ORDER BY created_at DESC
            "#,
        )
        .bind(venue_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| PipelineError::storage("feedback.list_for_venue", e))
    }

    /// Up/down tallies per prompt version.
    pub async fn tally_by_prompt_version(&self) -> PipelineResult<Vec<(String, i64, i64)>> {
        sqlx::query_as::<_, (String, i64, i64)>(
            r#"
            SELECT
                COALESCE(prompt_version, 'unversioned') AS version,
                COUNT(*) FILTER (WHERE feedback_type = 'thumbs_up') AS ups,
                COUNT(*) FILTER (WHERE feedback_type = 'thumbs_down') AS downs
            FROM editor_feedback
            GROUP BY version
            ORDER BY version
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| PipelineError::storage("feedback.tally_by_prompt_version", e))
    }
}
