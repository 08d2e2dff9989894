//! HTTP API routes.

pub mod accounts;
pub mod audit;
pub mod documents;
pub mod names;
pub mod statements;

use crate::config::BooksConfig;
use crate::models::RequestContext;
use crate::services::{Database, SessionStore};
use axum::http::HeaderMap;
use axum::routing::{get, post};
use axum::Router;
use std::sync::Arc;

/// Header naming the acting user, recorded against audit rows.
pub const USER_HEADER: &str = "x-user";

#[derive(Clone)]
pub struct AppState {
    pub config: BooksConfig,
    pub db: Arc<Database>,
    pub sessions: SessionStore,
}

pub fn request_context(headers: &HeaderMap) -> RequestContext {
    headers
        .get(USER_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(RequestContext::new)
        .unwrap_or_default()
}

pub fn api_router(state: AppState) -> Router {
    Router::new()
        .route("/accounts", post(accounts::create).get(accounts::list))
        .route(
            "/accounts/:id",
            get(accounts::get_one).delete(accounts::delete_one),
        )
        .route("/names", post(names::create).get(names::list))
        .route("/names/:id", get(names::get_one))
        .route(
            "/documents",
            post(documents::post_document).get(documents::list),
        )
        .route(
            "/documents/:id",
            get(documents::get_one).delete(documents::delete_one),
        )
        .route(
            "/accounts/:id/statement-format",
            get(statements::get_format).put(statements::put_format),
        )
        .route(
            "/accounts/:id/statement-import",
            post(statements::import),
        )
        .route("/accounts/:id/reconcile", post(statements::reconcile))
        .route(
            "/import-sessions/:id",
            get(statements::get_session).delete(statements::discard_session),
        )
        .route(
            "/import-sessions/:id/candidates",
            get(statements::candidates),
        )
        .route(
            "/import-sessions/:id/match",
            post(statements::match_line),
        )
        .route("/audit", get(audit::query))
        .route("/integrity", get(audit::integrity))
        .with_state(state)
}
