use crate::models::{Account, AccountType};
use crate::routes::AppState;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use service_core::error::AppError;

#[derive(Debug, Deserialize)]
pub struct CreateAccountRequest {
    pub name: String,
    pub account_type: String,
}

pub async fn create(
    State(state): State<AppState>,
    Json(req): Json<CreateAccountRequest>,
) -> Result<(StatusCode, Json<Account>), AppError> {
    if req.name.trim().is_empty() {
        return Err(AppError::BadRequest(anyhow::anyhow!(
            "Account name must not be empty"
        )));
    }
    let account_type = AccountType::parse(&req.account_type).ok_or_else(|| {
        AppError::BadRequest(anyhow::anyhow!(
            "Unknown account type '{}'",
            req.account_type
        ))
    })?;

    let account = state.db.create_account(req.name.trim(), account_type).await?;
    Ok((StatusCode::CREATED, Json(account)))
}

pub async fn list(State(state): State<AppState>) -> Result<Json<Vec<Account>>, AppError> {
    Ok(Json(state.db.list_accounts().await?))
}

pub async fn get_one(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Account>, AppError> {
    let account = state
        .db
        .get_account(id)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Account not found")))?;
    Ok(Json(account))
}

pub async fn delete_one(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<StatusCode, AppError> {
    state.db.delete_account(id).await?;
    Ok(StatusCode::NO_CONTENT)
}
