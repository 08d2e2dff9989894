use crate::models::AuditRecord;
use crate::routes::AppState;
use crate::services::integrity::Finding;
use crate::services::IntegritySweep;
use axum::extract::{Query, State};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use service_core::error::AppError;

#[derive(Debug, Deserialize)]
pub struct AuditQuery {
    pub table: String,
    pub record_id: i64,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

pub async fn query(
    State(state): State<AppState>,
    Query(q): Query<AuditQuery>,
) -> Result<Json<Vec<AuditRecord>>, AppError> {
    let records = state
        .db
        .query_audit(&q.table, q.record_id, q.from, q.to)
        .await?;
    Ok(Json(records))
}

pub async fn integrity(State(state): State<AppState>) -> Result<Json<Vec<Finding>>, AppError> {
    Ok(Json(IntegritySweep::run(&state.db).await?))
}
