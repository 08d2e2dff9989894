use crate::models::{DetailLine, Document, DocumentHeader, FullDocument};
use crate::routes::{request_context, AppState};
use crate::services::PostingEngine;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use chrono::NaiveDate;
use axum::Json;
use serde::{Deserialize, Serialize};
use service_core::error::AppError;

#[derive(Debug, Deserialize)]
pub struct PostDocumentRequest {
    pub header: DocumentHeader,
    #[serde(default)]
    pub detail: Vec<DetailLine>,
}

#[derive(Debug, Serialize)]
pub struct PostDocumentResponse {
    pub id: i64,
    pub identifier: String,
    pub message: String,
}

pub async fn post_document(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<PostDocumentRequest>,
) -> Result<(StatusCode, Json<PostDocumentResponse>), AppError> {
    let ctx = request_context(&headers);
    let created = req.header.document_id.is_none();

    let outcome = PostingEngine::post(&state.db, &ctx, req.header, req.detail).await?;

    let status = if created {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((
        status,
        Json(PostDocumentResponse {
            id: outcome.document_id,
            identifier: outcome.identifier,
            message: "Document posted".to_string(),
        }),
    ))
}

#[derive(Debug, Deserialize)]
pub struct ListDocumentsQuery {
    pub account_id: Option<i64>,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

pub async fn list(
    State(state): State<AppState>,
    Query(q): Query<ListDocumentsQuery>,
) -> Result<Json<Vec<Document>>, AppError> {
    let documents = state.db.list_documents(q.account_id, q.from, q.to).await?;
    Ok(Json(documents))
}

pub async fn get_one(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<FullDocument>, AppError> {
    let mut conn = state.db.pool().acquire().await.map_err(|e| {
        AppError::DatabaseError(anyhow::anyhow!("Failed to acquire connection: {}", e))
    })?;
    let full = PostingEngine::load_full(&mut conn, id)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Document not found")))?;
    Ok(Json(full))
}

pub async fn delete_one(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Result<StatusCode, AppError> {
    let ctx = request_context(&headers);
    PostingEngine::delete(&state.db, &ctx, id).await?;
    Ok(StatusCode::NO_CONTENT)
}
