//! Reconciliation finalizer: stamps clearing marks on a batch of postings
//! once the cleared total agrees with the statement's ending balance.

use crate::models::RequestContext;
use crate::services::audit::AuditRecorder;
use crate::services::database::Database;
use crate::services::metrics::{self, RECONCILIATIONS_TOTAL};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use service_core::error::AppError;
use tracing::{info, instrument};

/// One posting in a reconciliation batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconcileLine {
    pub journal_id: i64,
    pub amount: Decimal,
    pub cleared: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconcilePayload {
    pub opening_balance: Decimal,
    pub ending_balance: Option<Decimal>,
    #[serde(default)]
    pub provisional: bool,
    pub lines: Vec<ReconcileLine>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReconcileOutcome {
    pub cleared_count: usize,
    pub running_balance: Decimal,
    pub provisional: bool,
}

pub struct Reconciler;

impl Reconciler {
    /// Apply clearing marks for one account. A final run requires the
    /// running balance over cleared lines to land exactly on the ending
    /// balance; it fails before any mark is written otherwise. A
    /// provisional run stamps `"*"` and skips the balance check.
    #[instrument(skip(db, ctx, payload), fields(account_id = %account_id, provisional = payload.provisional))]
    pub async fn finalize(
        db: &Database,
        ctx: &RequestContext,
        account_id: i64,
        payload: ReconcilePayload,
    ) -> Result<ReconcileOutcome, AppError> {
        let kind = if payload.provisional { "provisional" } else { "final" };
        let result = Self::finalize_inner(db, ctx, account_id, payload).await;
        match &result {
            Ok(_) => RECONCILIATIONS_TOTAL.with_label_values(&[kind, "ok"]).inc(),
            Err(e) => {
                RECONCILIATIONS_TOTAL.with_label_values(&[kind, "error"]).inc();
                metrics::record_error(e);
            }
        }
        result
    }

    async fn finalize_inner(
        db: &Database,
        ctx: &RequestContext,
        account_id: i64,
        payload: ReconcilePayload,
    ) -> Result<ReconcileOutcome, AppError> {
        let account = db
            .get_account(account_id)
            .await?
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Account not found")))?;
        let statement_account = account
            .parsed_type()
            .map(|t| t.is_statement_account())
            .unwrap_or(false);
        if !statement_account {
            return Err(AppError::BadRequest(anyhow::anyhow!(
                "Only bank and credit card accounts can be reconciled"
            )));
        }

        let running = running_balance(payload.opening_balance, &payload.lines);

        if !payload.provisional {
            let ending = payload.ending_balance.ok_or_else(|| {
                AppError::BadRequest(anyhow::anyhow!(
                    "A final reconciliation needs an ending balance"
                ))
            })?;
            if running != ending {
                return Err(AppError::BadRequest(anyhow::anyhow!(
                    "Cleared balance {} does not agree with ending balance {} (difference {})",
                    running,
                    ending,
                    ending - running
                )));
            }
        }

        let mark = if payload.provisional { "*" } else { "X" };
        let mut cleared_count = 0usize;

        let mut tx = db.begin().await?;
        for line in &payload.lines {
            let new_mark = if line.cleared { mark } else { "" };
            Database::set_cleared(&mut tx, line.journal_id, new_mark).await?;
            if line.cleared {
                cleared_count += 1;
            }
        }

        if !payload.provisional {
            let batch = serde_json::to_value(&payload).map_err(anyhow::Error::new)?;
            AuditRecorder::record_reconcile(&mut tx, ctx, account_id, &batch).await?;
        }

        tx.commit().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to commit reconciliation: {}", e))
        })?;

        info!(
            account_id = %account_id,
            cleared_count,
            running_balance = %running,
            provisional = payload.provisional,
            "Reconciliation applied"
        );

        Ok(ReconcileOutcome {
            cleared_count,
            running_balance: running,
            provisional: payload.provisional,
        })
    }
}

fn running_balance(opening: Decimal, lines: &[ReconcileLine]) -> Decimal {
    opening
        + lines
            .iter()
            .filter(|l| l.cleared)
            .map(|l| l.amount)
            .sum::<Decimal>()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    #[test]
    fn running_balance_sums_cleared_lines_only() {
        let lines = vec![
            ReconcileLine { journal_id: 1, amount: dec("-12.50"), cleared: true },
            ReconcileLine { journal_id: 2, amount: dec("-99.00"), cleared: false },
            ReconcileLine { journal_id: 3, amount: dec("40.00"), cleared: true },
        ];
        assert_eq!(running_balance(dec("100.00"), &lines), dec("127.50"));
        assert_eq!(running_balance(Decimal::ZERO, &[]), Decimal::ZERO);
    }
}
