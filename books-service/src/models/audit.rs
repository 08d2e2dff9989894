//! Audit trail models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Change kinds recorded in the audit trail. An update writes an `Update`
/// row (new state) and a `Previous` row (old state) with a shared timestamp;
/// diffing the two latest rows for a record reconstructs "what changed".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditKind {
    Insert,
    Update,
    Previous,
    Delete,
    Reconcile,
}

impl AuditKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Insert => "insert",
            Self::Update => "update",
            Self::Previous => "previous",
            Self::Delete => "delete",
            Self::Reconcile => "reconcile",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "insert" => Some(Self::Insert),
            "update" => Some(Self::Update),
            "previous" => Some(Self::Previous),
            "delete" => Some(Self::Delete),
            "reconcile" => Some(Self::Reconcile),
            _ => None,
        }
    }
}

/// One append-only audit row carrying the full serialized record.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct AuditRecord {
    pub audit_id: i64,
    pub table_name: String,
    pub record_id: i64,
    pub kind: String,
    pub at: DateTime<Utc>,
    pub user_name: String,
    pub body: serde_json::Value,
}
