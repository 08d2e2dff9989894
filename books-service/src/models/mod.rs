//! Domain models for books-service.

pub mod account;
pub mod audit;
pub mod document;
pub mod statement;

pub use account::{Account, AccountType, NameAddress, NameKind};
pub use audit::{AuditKind, AuditRecord};
pub use document::{
    DetailLine, Document, DocumentHeader, DocumentType, FullDocument, Journal, JournalLine, Line,
};
pub use statement::{
    Candidate, DraftDocument, ImportSession, ImportState, MatchMode, ParsedRow, StatementLine,
};

/// Request-scoped context passed into every engine call instead of ambient
/// global state. Carries the acting user for the audit trail.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub user: String,
}

impl RequestContext {
    pub fn new(user: impl Into<String>) -> Self {
        Self { user: user.into() }
    }
}

impl Default for RequestContext {
    fn default() -> Self {
        Self {
            user: "system".to_string(),
        }
    }
}
