//! Transactional approval and rejection with audit logging.
//!
//! The unit of work wraps one sqlx transaction; the multi-step writes
//! (field replacement, status change, audit row) either all commit or all
//! roll back.

use sqlx::{PgPool, Postgres, Transaction};
use tracing::{info, warn};

use crate::domain::{ApprovalStatus, DataReplacement};
use crate::error::{PipelineError, PipelineResult};

use super::{VenueApproval, VenueRejection};

/// Venue columns a replacement may touch. Field names outside this list
/// are skipped with a warning rather than interpolated into SQL.
const REPLACEABLE_TEXT_COLUMNS: &[&str] = &[
    "name",
    "location",
    "phone",
    "url",
    "social_url",
    "hours",
    "description",
    "zipcode",
];
const REPLACEABLE_COORD_COLUMNS: &[&str] = &["lat", "lng"];

/// Transaction-scoped repository handle.
pub struct UnitOfWork {
    tx: Transaction<'static, Postgres>,
}

impl UnitOfWork {
    pub async fn begin(pool: &PgPool) -> PipelineResult<Self> {
        let tx = pool
            .begin()
            .await
            .map_err(|e| PipelineError::storage("uow.begin", e))?;
        Ok(Self { tx })
    }

    /// Apply the replacement values to the venue row.
    pub async fn apply_replacement(
        &mut self,
        venue_id: i64,
        replacement: &DataReplacement,
    ) -> PipelineResult<()> {
        for (field, value) in &replacement.replacement {
            if REPLACEABLE_TEXT_COLUMNS.contains(&field.as_str()) {
                sqlx::query(&format!("UPDATE venues SET {field} = $1 WHERE id = $2"))
                    .bind(value)
                    .bind(venue_id)
                    .execute(&mut *self.tx)
                    .await
                    .map_err(|e| PipelineError::storage("uow.apply_replacement", e))?;
            } else if REPLACEABLE_COORD_COLUMNS.contains(&field.as_str()) {
                let parsed: f64 = value.trim().parse().map_err(|_| {
                    PipelineError::validation(
                        "uow.apply_replacement",
                        format!("non-numeric {field} replacement: {value}"),
                    )
                })?;
                sqlx::query(&format!("UPDATE venues SET {field} = $1 WHERE id = $2"))
                    .bind(parsed)
                    .bind(venue_id)
                    .execute(&mut *self.tx)
                    .await
                    .map_err(|e| PipelineError::storage("uow.apply_replacement", e))?;
            } else {
                warn!(field, "skipping replacement for unknown venue column");
            }
        }
        Ok(())
    }

    /// Stamp the terminal status. Admin id is NULL for automated
    /// decisions.
    pub async fn set_status(
        &mut self,
        venue_id: i64,
        status: ApprovalStatus,
        admin_id: Option<i64>,
    ) -> PipelineResult<()> {
        sqlx::query(
            r#"
            UPDATE venues
            SET active = $1, approved_by = $2, last_admin_update = NOW()
            WHERE id = $3
            "#,
        )
        .bind(status.to_db())
        .bind(admin_id)
        .bind(venue_id)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| PipelineError::storage("uow.set_status", e))?;
        Ok(())
    }

    /// Append the audit row with the serialized replacement pair.
    pub async fn insert_audit(
        &mut self,
        venue_id: i64,
        history_id: Option<i64>,
        admin_id: Option<i64>,
        status: ApprovalStatus,
        reason: &str,
        replacement: Option<&DataReplacement>,
    ) -> PipelineResult<i64> {
        let replacements_json = replacement.map(DataReplacement::to_json);
        let status_str = match status {
            ApprovalStatus::Approved => "approved",
            ApprovalStatus::Rejected => "rejected",
            ApprovalStatus::Pending => "pending",
        };

        let (id,): (i64,) = sqlx::query_as(
            r#"
            INSERT INTO venue_audit_logs
                (venue_id, history_id, admin_id, status, reason, data_replacements, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, NOW())
            RETURNING id
            "#,
        )
        .bind(venue_id)
        .bind(history_id)
        .bind(admin_id)
        .bind(status_str)
        .bind(reason)
        .bind(replacements_json)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(|e| PipelineError::storage("uow.insert_audit", e))?;
        Ok(id)
    }

    /// Current status inside the transaction, to keep the at-most-once
    /// transition invariant under concurrent admins.
    pub async fn current_status(&mut self, venue_id: i64) -> PipelineResult<ApprovalStatus> {
        let (active,): (i16,) = sqlx::query_as("SELECT active FROM venues WHERE id = $1")
            .bind(venue_id)
            .fetch_one(&mut *self.tx)
            .await
            .map_err(|e| PipelineError::storage("uow.current_status", e))?;
        Ok(ApprovalStatus::from_db(active))
    }

    pub async fn commit(self) -> PipelineResult<()> {
        self.tx
            .commit()
            .await
            .map_err(|e| PipelineError::storage("uow.commit", e))
    }
}

/// Approve a venue: apply replacements, set status, audit — atomically.
/// A venue already in a terminal state is left untouched (logged no-op).
pub async fn approve_venue_with_replacement(
    pool: &PgPool,
    approval: &VenueApproval,
) -> PipelineResult<()> {
    let mut uow = UnitOfWork::begin(pool).await?;

    let status = uow.current_status(approval.venue_id).await?;
    if status.is_terminal() {
        warn!(
            venue_id = approval.venue_id,
            status = ?status,
            "approval requested for venue already in terminal state, skipping"
        );
        return Ok(());
    }

    if let Some(replacement) = &approval.replacement {
        uow.apply_replacement(approval.venue_id, replacement).await?;
    }
    uow.set_status(approval.venue_id, ApprovalStatus::Approved, approval.admin_id)
        .await?;
    uow.insert_audit(
        approval.venue_id,
        approval.history_id,
        approval.admin_id,
        ApprovalStatus::Approved,
        &approval.reason,
        approval.replacement.as_ref(),
    )
    .await?;
    uow.commit().await?;

    info!(
        venue_id = approval.venue_id,
        admin_id = ?approval.admin_id,
        "venue approved"
    );
    Ok(())
}

/// Reject a venue with an audit row, atomically; terminal states are a
/// logged no-op.
pub async fn reject_venue(pool: &PgPool, rejection: &VenueRejection) -> PipelineResult<()> {
    let mut uow = UnitOfWork::begin(pool).await?;

    let status = uow.current_status(rejection.venue_id).await?;
    if status.is_terminal() {
        warn!(
            venue_id = rejection.venue_id,
            status = ?status,
            "rejection requested for venue already in terminal state, skipping"
        );
        return Ok(());
    }

    uow.set_status(rejection.venue_id, ApprovalStatus::Rejected, rejection.admin_id)
        .await?;
    uow.insert_audit(
        rejection.venue_id,
        rejection.history_id,
        rejection.admin_id,
        ApprovalStatus::Rejected,
        &rejection.reason,
        None,
    )
    .await?;
    uow.commit().await?;

    info!(
        venue_id = rejection.venue_id,
        admin_id = ?rejection.admin_id,
        "venue rejected"
    );
    Ok(())
}
