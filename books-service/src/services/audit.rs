//! Audit recorder: immutable before/after change log.

use crate::models::{AuditKind, RequestContext};
use crate::services::database::Database;
use chrono::Utc;
use service_core::error::AppError;
use sqlx::postgres::PgConnection;
use tracing::debug;

/// Records before/after images of changed records. A no-op when nothing
/// changed, so re-saving an unchanged document leaves no trace.
pub struct AuditRecorder;

impl AuditRecorder {
    /// Record a change to `table`/`record_id` inside the caller's
    /// transaction. `before`/`after` are the full serialized record, or
    /// `None` on either side of an insert/delete.
    pub async fn record(
        conn: &mut PgConnection,
        ctx: &RequestContext,
        table: &str,
        record_id: i64,
        before: Option<&serde_json::Value>,
        after: Option<&serde_json::Value>,
    ) -> Result<(), AppError> {
        let at = Utc::now();

        match (before, after) {
            (None, None) => Ok(()),
            (Some(b), Some(a)) if b == a => {
                debug!(table = table, record_id = record_id, "No change, audit skipped");
                Ok(())
            }
            (None, Some(a)) => {
                Database::insert_audit(
                    conn,
                    table,
                    record_id,
                    AuditKind::Insert.as_str(),
                    at,
                    &ctx.user,
                    a,
                )
                .await
            }
            (Some(b), Some(a)) => {
                // Update and Previous share one timestamp so the pair can be
                // diffed as a unit.
                Database::insert_audit(
                    conn,
                    table,
                    record_id,
                    AuditKind::Update.as_str(),
                    at,
                    &ctx.user,
                    a,
                )
                .await?;
                Database::insert_audit(
                    conn,
                    table,
                    record_id,
                    AuditKind::Previous.as_str(),
                    at,
                    &ctx.user,
                    b,
                )
                .await
            }
            (Some(b), None) => {
                Database::insert_audit(
                    conn,
                    table,
                    record_id,
                    AuditKind::Delete.as_str(),
                    at,
                    &ctx.user,
                    b,
                )
                .await
            }
        }
    }

    /// Record a completed (final) reconciliation as a single event carrying
    /// the whole cleared batch.
    pub async fn record_reconcile(
        conn: &mut PgConnection,
        ctx: &RequestContext,
        account_id: i64,
        batch: &serde_json::Value,
    ) -> Result<(), AppError> {
        Database::insert_audit(
            conn,
            "journals",
            account_id,
            AuditKind::Reconcile.as_str(),
            Utc::now(),
            &ctx.user,
            batch,
        )
        .await
    }
}
