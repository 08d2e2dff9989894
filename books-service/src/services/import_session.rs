//! In-memory store for multi-step statement import sessions.
//!
//! A session is created by the import step, advanced by each match step
//! and closed by reconciliation. Abandoned sessions simply age out.

use crate::models::{ImportSession, ImportState};
use chrono::{Duration, Utc};
use dashmap::DashMap;
use service_core::error::AppError;
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

#[derive(Clone)]
pub struct SessionStore {
    sessions: Arc<DashMap<Uuid, ImportSession>>,
    ttl: Duration,
}

impl SessionStore {
    pub fn new(ttl_secs: i64) -> Self {
        Self {
            sessions: Arc::new(DashMap::new()),
            ttl: Duration::seconds(ttl_secs),
        }
    }

    /// Store a fresh session, discarding any earlier one for the same
    /// account. Starting a new import abandons the old workflow.
    pub fn insert(&self, session: ImportSession) -> Uuid {
        let account_id = session.account_id;
        self.sessions
            .retain(|_, s| s.account_id != account_id);
        let id = session.session_id;
        self.sessions.insert(id, session);
        debug!(session_id = %id, account_id = %account_id, "Import session created");
        id
    }

    pub fn get(&self, id: Uuid) -> Result<ImportSession, AppError> {
        let mut entry = self
            .sessions
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Import session not found")))?;
        entry.touched_utc = Utc::now();
        Ok(entry.clone())
    }

    /// Record that one statement row has been matched. The session moves
    /// to `Matching` on the first recorded match.
    pub fn record_match(
        &self,
        id: Uuid,
        row_index: usize,
        document_id: i64,
    ) -> Result<ImportSession, AppError> {
        let mut entry = self
            .sessions
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Import session not found")))?;
        if entry.state == ImportState::Reconciled {
            return Err(AppError::Conflict(anyhow::anyhow!(
                "Import session is already reconciled"
            )));
        }
        let slot = entry.matched.get_mut(row_index).ok_or_else(|| {
            AppError::BadRequest(anyhow::anyhow!(
                "Statement line index {} is out of range",
                row_index
            ))
        })?;
        *slot = Some(document_id);
        entry.state = ImportState::Matching;
        entry.touched_utc = Utc::now();
        Ok(entry.clone())
    }

    /// Remember the candidate list offered to the user; subsequent match
    /// decisions index into it.
    pub fn set_candidates(
        &self,
        id: Uuid,
        candidates: Vec<crate::models::Candidate>,
    ) -> Result<(), AppError> {
        let mut entry = self
            .sessions
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Import session not found")))?;
        entry.candidates = candidates;
        entry.touched_utc = Utc::now();
        Ok(())
    }

    /// Close the session after a successful final reconciliation.
    pub fn mark_reconciled(&self, id: Uuid) -> Result<(), AppError> {
        let mut entry = self
            .sessions
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Import session not found")))?;
        entry.state = ImportState::Reconciled;
        entry.touched_utc = Utc::now();
        Ok(())
    }

    pub fn remove(&self, id: Uuid) -> bool {
        self.sessions.remove(&id).is_some()
    }

    /// Drop sessions idle past the TTL. Runs from a periodic task, counting
    /// removals in the predicate so concurrent inserts cannot skew the tally.
    pub fn sweep(&self) {
        let cutoff = Utc::now() - self.ttl;
        let mut dropped = 0usize;
        self.sessions.retain(|_, s| {
            let keep = s.touched_utc >= cutoff;
            if !keep {
                dropped += 1;
            }
            keep
        });
        if dropped > 0 {
            info!(dropped, "Expired import sessions removed");
        }
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
