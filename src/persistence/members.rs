//! Member repository: assembles the submitter profile the trust
//! calculator consumes from the members, ambassadors, and venue_admin
//! tables.

use sqlx::{FromRow, PgPool};

use crate::domain::Submitter;
use crate::error::{PipelineError, PipelineResult};

#[derive(Debug, Clone, FromRow)]
struct MemberRow {
    id: i64,
    display_name: String,
    trusted: bool,
    contributions: i64,
}

#[derive(Debug, Clone, FromRow)]
struct AmbassadorRow {
    level: i32,
    points: i64,
    region: Option<String>,
}

#[derive(Clone)]
pub struct MemberRepository {
    pool: PgPool,
}

impl MemberRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Load the submitter of `venue_id`, resolving ambassador standing,
    /// per-venue admin ownership, and the approved-venue count.
    pub async fn load_submitter(
        &self,
        member_id: i64,
        venue_id: i64,
    ) -> PipelineResult<Option<Submitter>> {
        let member = sqlx::query_as::<_, MemberRow>(
            "SELECT id, display_name, trusted, contributions FROM members WHERE id = $1",
        )
        .bind(member_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| PipelineError::storage("members.load_submitter", e))?;

        let Some(member) = member else {
            return Ok(None);
        };

        let ambassador = sqlx::query_as::<_, AmbassadorRow>(
            "SELECT level, points, region FROM ambassadors WHERE member_id = $1",
        )
        .bind(member_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| PipelineError::storage("members.load_ambassador", e))?;

        let (is_venue_admin,): (bool,) = sqlx::query_as(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM venue_admin WHERE member_id = $1 AND venue_id = $2
            )
            "#,
        )
        .bind(member_id)
        .bind(venue_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| PipelineError::storage("members.load_venue_admin", e))?;

        let (approved_venues,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM venues WHERE member_id = $1 AND active = 1",
        )
        .bind(member_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| PipelineError::storage("members.count_approved", e))?;

        Ok(Some(Submitter {
            id: member.id,
            display_name: member.display_name,
            trusted: member.trusted,
            contributions: member.contributions,
            ambassador_level: ambassador.as_ref().map(|a| a.level),
            ambassador_points: ambassador.as_ref().map(|a| a.points),
            ambassador_region: ambassador.and_then(|a| a.region),
            is_venue_admin,
            approved_venues,
        }))
    }
}
