use crate::models::{NameAddress, NameKind};
use crate::routes::AppState;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use service_core::error::AppError;

#[derive(Debug, Deserialize)]
pub struct CreateNameRequest {
    pub kind: String,
    pub name: String,
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub contact: String,
}

#[derive(Debug, Deserialize)]
pub struct ListNamesQuery {
    pub kind: Option<String>,
}

pub async fn create(
    State(state): State<AppState>,
    Json(req): Json<CreateNameRequest>,
) -> Result<(StatusCode, Json<NameAddress>), AppError> {
    let kind = NameKind::parse(&req.kind).ok_or_else(|| {
        AppError::BadRequest(anyhow::anyhow!("Unknown counterparty kind '{}'", req.kind))
    })?;
    if req.name.trim().is_empty() {
        return Err(AppError::BadRequest(anyhow::anyhow!(
            "Counterparty name must not be empty"
        )));
    }

    let record = state
        .db
        .create_name_address(kind, req.name.trim(), &req.address, &req.contact)
        .await?;
    Ok((StatusCode::CREATED, Json(record)))
}

pub async fn list(
    State(state): State<AppState>,
    Query(query): Query<ListNamesQuery>,
) -> Result<Json<Vec<NameAddress>>, AppError> {
    let kind = match query.kind {
        Some(k) => Some(NameKind::parse(&k).ok_or_else(|| {
            AppError::BadRequest(anyhow::anyhow!("Unknown counterparty kind '{}'", k))
        })?),
        None => None,
    };
    Ok(Json(state.db.list_name_addresses(kind).await?))
}

pub async fn get_one(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<NameAddress>, AppError> {
    let record = state
        .db
        .get_name_address(id)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Counterparty not found")))?;
    Ok(Json(record))
}
