//! Statement import and matching models.

use crate::models::document::{DetailLine, DocumentHeader, DocumentType};
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One successfully parsed statement line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatementLine {
    pub date: Option<NaiveDate>,
    pub amount: Option<Decimal>,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub memo: String,
}

/// Output row of a statement parse. Unparseable input lines are retained as
/// warnings so a few malformed lines never abort the import.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "class", rename_all = "lowercase")]
pub enum ParsedRow {
    Line(StatementLine),
    Warning { text: String },
}

impl ParsedRow {
    pub fn as_line(&self) -> Option<&StatementLine> {
        match self {
            Self::Line(line) => Some(line),
            Self::Warning { .. } => None,
        }
    }
}

/// An existing posting eligible to be matched against a statement line.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Candidate {
    pub journal_id: i64,
    pub document_id: i64,
    pub document_type: String,
    pub document_date: NaiveDate,
    pub identifier: String,
    pub amount: Decimal,
    pub name_address_id: i64,
    pub counterparty: String,
    pub memo: String,
    pub cleared: String,
}

/// How the user chose to resolve one statement line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum MatchMode {
    /// The candidate *is* this transaction; amounts must agree exactly.
    Same,
    /// Create a new document of the given type, seeded from the candidate.
    New { document_type: DocumentType },
    /// Create a transfer between two accounts.
    Transfer,
}

/// A document the match resolver proposes; posted through the regular
/// posting engine once the user confirms.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DraftDocument {
    pub header: DocumentHeader,
    pub detail: Vec<DetailLine>,
    /// Counterparty to attach; may name a record that does not exist yet.
    pub counterparty: String,
    pub counterparty_is_new: bool,
}

/// Import workflow phases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImportState {
    Imported,
    Matching,
    Reconciled,
}

/// Serializable snapshot of one in-progress statement import. Lives in the
/// server-side session store between the import step and each match step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportSession {
    pub session_id: Uuid,
    pub account_id: i64,
    pub state: ImportState,
    pub rows: Vec<ParsedRow>,
    /// Per-row document id once the row has been matched and posted.
    pub matched: Vec<Option<i64>>,
    /// Candidate list as last offered to the user; match decisions index
    /// into this.
    #[serde(default)]
    pub candidates: Vec<Candidate>,
    pub warning_count: usize,
    pub created_utc: DateTime<Utc>,
    pub touched_utc: DateTime<Utc>,
}

impl ImportSession {
    pub fn new(account_id: i64, rows: Vec<ParsedRow>) -> Self {
        let now = Utc::now();
        let warning_count = rows
            .iter()
            .filter(|r| matches!(r, ParsedRow::Warning { .. }))
            .count();
        let matched = vec![None; rows.len()];
        Self {
            session_id: Uuid::new_v4(),
            account_id,
            state: ImportState::Imported,
            rows,
            matched,
            candidates: Vec::new(),
            warning_count,
            created_utc: now,
            touched_utc: now,
        }
    }

    pub fn line(&self, index: usize) -> Option<&StatementLine> {
        self.rows.get(index).and_then(|r| r.as_line())
    }
}
