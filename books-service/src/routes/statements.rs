//! Statement format, import, matching and reconciliation endpoints.

use crate::models::{Candidate, ImportSession, MatchMode, NameKind, ParsedRow};
use crate::routes::{request_context, AppState};
use crate::services::database::Database;
use crate::services::matching::{Matcher, Resolution};
use crate::services::metrics::STATEMENT_IMPORTS_TOTAL;
use crate::services::reconcile::{ReconcilePayload, ReconcileOutcome, Reconciler};
use crate::services::{CompiledFormat, PostingEngine};
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use service_core::error::AppError;
use uuid::Uuid;

#[derive(Debug, Serialize)]
pub struct FormatResponse {
    pub template: String,
}

#[derive(Debug, Deserialize)]
pub struct PutFormatRequest {
    pub template: String,
}

pub async fn get_format(
    State(state): State<AppState>,
    Path(account_id): Path<i64>,
) -> Result<Json<FormatResponse>, AppError> {
    let template = state
        .db
        .get_statement_format(account_id)
        .await?
        .ok_or_else(|| {
            AppError::NotFound(anyhow::anyhow!("No statement format saved for this account"))
        })?;
    Ok(Json(FormatResponse { template }))
}

pub async fn put_format(
    State(state): State<AppState>,
    Path(account_id): Path<i64>,
    Json(req): Json<PutFormatRequest>,
) -> Result<StatusCode, AppError> {
    // Reject templates that will never parse anything.
    CompiledFormat::compile(&req.template)?;
    state
        .db
        .put_statement_format(account_id, &req.template)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
pub struct ImportRequest {
    /// Statement text as pasted or uploaded.
    pub text: String,
    /// Overrides the account's saved format when present.
    pub template: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ImportResponse {
    pub session_id: Uuid,
    pub rows: Vec<ParsedRow>,
    pub warning_count: usize,
}

pub async fn import(
    State(state): State<AppState>,
    Path(account_id): Path<i64>,
    Json(req): Json<ImportRequest>,
) -> Result<(StatusCode, Json<ImportResponse>), AppError> {
    let result = import_inner(&state, account_id, req).await;
    let status = if result.is_ok() { "ok" } else { "error" };
    STATEMENT_IMPORTS_TOTAL.with_label_values(&[status]).inc();
    result
}

async fn import_inner(
    state: &AppState,
    account_id: i64,
    req: ImportRequest,
) -> Result<(StatusCode, Json<ImportResponse>), AppError> {
    let account = state
        .db
        .get_account(account_id)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Account not found")))?;
    let reconcilable = account
        .parsed_type()
        .map(|t| t.is_statement_account())
        .unwrap_or(false);
    if !reconcilable {
        return Err(AppError::BadRequest(anyhow::anyhow!(
            "Statements can only be imported into bank and credit card accounts"
        )));
    }

    let (template, supplied) = match req.template {
        Some(t) => (t, true),
        None => {
            let saved = state
                .db
                .get_statement_format(account_id)
                .await?
                .ok_or_else(|| {
                    AppError::BadRequest(anyhow::anyhow!(
                        "No statement format saved for this account; supply a template"
                    ))
                })?;
            (saved, false)
        }
    };

    let format = CompiledFormat::compile(&template)?;
    // A supplied template only becomes the account's saved format once it
    // compiles.
    if supplied {
        state.db.put_statement_format(account_id, &template).await?;
    }
    let rows = format.parse(&req.text);
    if rows.is_empty() {
        return Err(AppError::BadRequest(anyhow::anyhow!(
            "Statement text is empty"
        )));
    }

    let session = ImportSession::new(account_id, rows);
    let response = ImportResponse {
        session_id: session.session_id,
        rows: session.rows.clone(),
        warning_count: session.warning_count,
    };
    state.sessions.insert(session);

    Ok((StatusCode::CREATED, Json(response)))
}

pub async fn get_session(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ImportSession>, AppError> {
    Ok(Json(state.sessions.get(id)?))
}

pub async fn discard_session(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    if state.sessions.remove(id) {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::NotFound(anyhow::anyhow!(
            "Import session not found"
        )))
    }
}

#[derive(Debug, Deserialize)]
pub struct CandidatesQuery {
    pub since: Option<NaiveDate>,
}

pub async fn candidates(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(query): Query<CandidatesQuery>,
) -> Result<Json<Vec<Candidate>>, AppError> {
    let session = state.sessions.get(id)?;

    // Dedup against the statement's own window by default.
    let since = query
        .since
        .or_else(|| {
            session
                .rows
                .iter()
                .filter_map(|r| r.as_line().and_then(|l| l.date))
                .min()
        })
        .unwrap_or_else(|| chrono::Utc::now().date_naive());

    let candidates = Matcher::candidates(&state.db, session.account_id, since).await?;
    state.sessions.set_candidates(id, candidates.clone())?;
    Ok(Json(candidates))
}

#[derive(Debug, Deserialize)]
pub struct MatchRequest {
    pub line_index: usize,
    /// Index into the candidate list, or -1 for none.
    #[serde(default = "default_candidate_index")]
    pub candidate_index: i64,
    #[serde(flatten)]
    pub mode: MatchMode,
    pub detail_account_id: Option<i64>,
    pub transfer_account_id: Option<i64>,
}

fn default_candidate_index() -> i64 {
    -1
}

#[derive(Debug, Serialize)]
pub struct MatchResponse {
    pub document_id: i64,
    pub resolution: Resolution,
    pub session: ImportSession,
}

pub async fn match_line(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
    Json(req): Json<MatchRequest>,
) -> Result<Json<MatchResponse>, AppError> {
    let ctx = request_context(&headers);
    let session = state.sessions.get(id)?;

    let line = session
        .line(req.line_index)
        .ok_or_else(|| {
            AppError::BadRequest(anyhow::anyhow!(
                "Statement line {} does not exist or is a warning row",
                req.line_index
            ))
        })?
        .clone();

    let candidate = if req.candidate_index >= 0 {
        Some(
            session
                .candidates
                .get(req.candidate_index as usize)
                .ok_or_else(|| {
                    AppError::BadRequest(anyhow::anyhow!(
                        "Candidate index {} is out of range",
                        req.candidate_index
                    ))
                })?
                .clone(),
        )
    } else {
        None
    };

    let resolution = Matcher::resolve(
        &state.db,
        session.account_id,
        &line,
        candidate.as_ref(),
        req.mode,
        req.detail_account_id,
        req.transfer_account_id,
    )
    .await?;

    let document_id = match &resolution {
        Resolution::Existing { document_id, .. } => *document_id,
        Resolution::Draft(draft) => {
            let mut header = draft.header.clone();
            if header.name_address_id.is_none() && !draft.counterparty.is_empty() {
                let mut conn = state.db.pool().acquire().await.map_err(|e| {
                    AppError::DatabaseError(anyhow::anyhow!(
                        "Failed to acquire connection: {}",
                        e
                    ))
                })?;
                let name_id =
                    Database::ensure_name_address(&mut conn, NameKind::Other, &draft.counterparty)
                        .await?;
                header.name_address_id = Some(name_id);
            }
            let outcome =
                PostingEngine::post(&state.db, &ctx, header, draft.detail.clone()).await?;
            outcome.document_id
        }
    };

    let session = state
        .sessions
        .record_match(id, req.line_index, document_id)?;

    Ok(Json(MatchResponse {
        document_id,
        resolution,
        session,
    }))
}

#[derive(Debug, Deserialize)]
pub struct ReconcileRequest {
    #[serde(flatten)]
    pub payload: ReconcilePayload,
    /// Import session to close on a successful final reconciliation.
    pub session_id: Option<Uuid>,
}

pub async fn reconcile(
    State(state): State<AppState>,
    Path(account_id): Path<i64>,
    headers: HeaderMap,
    Json(req): Json<ReconcileRequest>,
) -> Result<Json<ReconcileOutcome>, AppError> {
    let ctx = request_context(&headers);
    let provisional = req.payload.provisional;

    let outcome = Reconciler::finalize(&state.db, &ctx, account_id, req.payload).await?;

    if !provisional {
        if let Some(session_id) = req.session_id {
            // The session may already have expired; that is not an error.
            let _ = state.sessions.mark_reconciled(session_id);
        }
    }

    Ok(Json(outcome))
}
