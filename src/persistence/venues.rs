//! Venue repository: reads for the pipeline and the batch trigger
//! endpoints.

use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};

use crate::domain::{ApprovalStatus, EntryType, Venue};
use crate::error::{PipelineError, PipelineResult};

/// Raw venues row; converted into the domain type after fetch.
#[derive(Debug, Clone, FromRow)]
struct VenueRow {
    id: i64,
    name: String,
    location: String,
    lat: Option<f64>,
    lng: Option<f64>,
    zipcode: Option<String>,
    phone: Option<String>,
    url: Option<String>,
    social_url: Option<String>,
    hours: Option<String>,
    description: Option<String>,
    path: Option<String>,
    entry_type: i16,
    vegan: bool,
    vegetarian_only: bool,
    category_id: Option<i32>,
    member_id: i64,
    admin_note: Option<String>,
    active: i16,
    created_at: DateTime<Utc>,
    last_admin_update: Option<DateTime<Utc>>,
}

impl From<VenueRow> for Venue {
    fn from(row: VenueRow) -> Self {
        Venue {
            id: row.id,
            name: row.name,
            location: row.location,
            lat: row.lat,
            lng: row.lng,
            zipcode: row.zipcode,
            phone: row.phone,
            url: row.url,
            social_url: row.social_url,
            hours: row.hours,
            description: row.description,
            path: row.path,
            entry_type: EntryType::from_db(row.entry_type),
            vegan: row.vegan,
            vegetarian_only: row.vegetarian_only,
            category_id: row.category_id,
            member_id: row.member_id,
            admin_note: row.admin_note,
            status: ApprovalStatus::from_db(row.active),
            created_at: row.created_at,
            last_admin_update: row.last_admin_update,
        }
    }
}

const VENUE_COLUMNS: &str = r#"
    id, name, location, lat, lng, zipcode, phone, url, social_url, hours,
    description, path, entry_type, vegan, vegetarian_only, category_id,
    member_id, admin_note, active, created_at, last_admin_update
"#;

#[derive(Clone)]
pub struct VenueRepository {
    pool: PgPool,
}

impl VenueRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn find_by_id(&self, venue_id: i64) -> PipelineResult<Option<Venue>> {
        let row = sqlx::query_as::<_, VenueRow>(&format!(
            "SELECT {VENUE_COLUMNS} FROM venues WHERE id = $1"
        ))
        .bind(venue_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| PipelineError::storage("venues.find_by_id", e))?;

        Ok(row.map(Venue::from))
    }

    /// Pending records that have never been validated: the `/validate`
    /// backlog sweep.
    pub async fn list_pending_without_history(&self, limit: i64) -> PipelineResult<Vec<Venue>> {
        let rows = sqlx::query_as::<_, VenueRow>(&format!(
            r#"
            SELECT {VENUE_COLUMNS}
            FROM venues v
            WHERE v.active = 0
              AND NOT EXISTS (
                  SELECT 1 FROM venue_validation_histories h WHERE h.venue_id = v.id
              )
            ORDER BY v.created_at ASC
            LIMIT $1
            "#
        ))
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| PipelineError::storage("venues.list_pending_without_history", e))?;

        Ok(rows.into_iter().map(Venue::from).collect())
    }

    /// Fetch a selected id set, preserving only rows that still exist.
    pub async fn list_by_ids(&self, venue_ids: &[i64]) -> PipelineResult<Vec<Venue>> {
        if venue_ids.is_empty() {
            return Ok(Vec::new());
        }
        let rows = sqlx::query_as::<_, VenueRow>(&format!(
            "SELECT {VENUE_COLUMNS} FROM venues WHERE id = ANY($1)"
        ))
        .bind(venue_ids)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| PipelineError::storage("venues.list_by_ids", e))?;

        Ok(rows.into_iter().map(Venue::from).collect())
    }

    pub async fn count_pending(&self) -> PipelineResult<i64> {
        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM venues WHERE active = 0")
                .fetch_one(&self.pool)
                .await
                .map_err(|e| PipelineError::storage("venues.count_pending", e))?;
        Ok(count)
    }
}
