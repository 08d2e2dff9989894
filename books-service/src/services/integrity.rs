//! Read-only ledger integrity sweep. Findings are reported, never fixed.

use crate::services::database::Database;
use crate::services::metrics::DB_QUERY_DURATION;
use rust_decimal::Decimal;
use serde::Serialize;
use service_core::error::AppError;
use sqlx::FromRow;
use tracing::{info, instrument};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FindingKind {
    UnbalancedDocument,
    JournalNumberGap,
    MisplacedVatJournal,
    CounterpartyMismatch,
}

#[derive(Debug, Clone, Serialize)]
pub struct Finding {
    pub kind: FindingKind,
    pub record_id: i64,
    pub detail: String,
}

#[derive(FromRow)]
struct DocumentSum {
    document_id: i64,
    total: Decimal,
}

#[derive(FromRow)]
struct CounterpartySum {
    name_address_id: i64,
    name: String,
    amount_total: Decimal,
    outstanding_total: Decimal,
}

pub struct IntegritySweep;

impl IntegritySweep {
    /// Run every check and collect findings.
    #[instrument(skip(db))]
    pub async fn run(db: &Database) -> Result<Vec<Finding>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["integrity_sweep"])
            .start_timer();

        let mut findings = Vec::new();
        Self::unbalanced_documents(db, &mut findings).await?;
        Self::journal_number_gaps(db, &mut findings).await?;
        Self::misplaced_vat_journals(db, &mut findings).await?;
        Self::counterparty_mismatches(db, &mut findings).await?;

        timer.observe_duration();
        info!(findings = findings.len(), "Integrity sweep complete");
        Ok(findings)
    }

    async fn unbalanced_documents(
        db: &Database,
        findings: &mut Vec<Finding>,
    ) -> Result<(), AppError> {
        let rows = sqlx::query_as::<_, DocumentSum>(
            r#"
            SELECT document_id, SUM(amount) AS total
            FROM journals
            GROUP BY document_id
            HAVING SUM(amount) <> 0
            "#,
        )
        .fetch_all(db.pool())
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to check document sums: {}", e))
        })?;

        for row in rows {
            findings.push(Finding {
                kind: FindingKind::UnbalancedDocument,
                record_id: row.document_id,
                detail: format!("Journal amounts sum to {} instead of 0", row.total),
            });
        }
        Ok(())
    }

    async fn journal_number_gaps(
        db: &Database,
        findings: &mut Vec<Finding>,
    ) -> Result<(), AppError> {
        let ids: Vec<i64> = sqlx::query_scalar(
            r#"
            SELECT document_id
            FROM journals
            GROUP BY document_id
            HAVING MIN(journal_num) <> 1 OR MAX(journal_num) <> COUNT(*)
            "#,
        )
        .fetch_all(db.pool())
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to check journal numbers: {}", e))
        })?;

        for document_id in ids {
            findings.push(Finding {
                kind: FindingKind::JournalNumberGap,
                record_id: document_id,
                detail: "Journal numbers are not a gapless 1..n sequence".to_string(),
            });
        }
        Ok(())
    }

    async fn misplaced_vat_journals(
        db: &Database,
        findings: &mut Vec<Finding>,
    ) -> Result<(), AppError> {
        let vat = db.vat_account().await?;

        let ids: Vec<i64> = sqlx::query_scalar(
            r#"
            SELECT DISTINCT j.document_id
            FROM journals j
            WHERE j.account_id = $1
              AND j.journal_num <> (
                  SELECT MAX(j2.journal_num) FROM journals j2
                  WHERE j2.document_id = j.document_id
              )
            UNION
            SELECT document_id
            FROM journals
            WHERE account_id = $1
            GROUP BY document_id
            HAVING COUNT(*) > 1
            "#,
        )
        .bind(vat.account_id)
        .fetch_all(db.pool())
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to check VAT journals: {}", e))
        })?;

        for document_id in ids {
            findings.push(Finding {
                kind: FindingKind::MisplacedVatJournal,
                record_id: document_id,
                detail: "VAT posting is not the single last journal".to_string(),
            });
        }
        Ok(())
    }

    async fn counterparty_mismatches(
        db: &Database,
        findings: &mut Vec<Finding>,
    ) -> Result<(), AppError> {
        let rows = sqlx::query_as::<_, CounterpartySum>(
            r#"
            SELECT j.name_address_id, n.name,
                   SUM(j.amount) AS amount_total,
                   SUM(j.outstanding) AS outstanding_total
            FROM journals j
            INNER JOIN accounts a ON a.account_id = j.account_id
            INNER JOIN name_addresses n ON n.name_address_id = j.name_address_id
            WHERE a.account_type IN ('receivable', 'payable')
            GROUP BY j.name_address_id, n.name
            HAVING SUM(j.amount) <> SUM(j.outstanding)
            "#,
        )
        .fetch_all(db.pool())
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to check counterparties: {}", e))
        })?;

        for row in rows {
            findings.push(Finding {
                kind: FindingKind::CounterpartyMismatch,
                record_id: row.name_address_id,
                detail: format!(
                    "Control postings for '{}' sum to {} but outstanding sums to {}",
                    row.name, row.amount_total, row.outstanding_total
                ),
            });
        }
        Ok(())
    }
}
