//! Posting engine: turns a document header plus detail lines into a
//! balanced set of journal postings, with an audit trail.

use crate::models::{
    account::BLANK_NAME_ADDRESS_ID, AccountType, DetailLine, Document, DocumentHeader,
    DocumentType, FullDocument, Journal, JournalLine, Line, RequestContext,
};
use crate::models::document::NEXT_IDENTIFIER;
use crate::services::audit::AuditRecorder;
use crate::services::database::Database;
use crate::services::metrics::{self, POSTINGS_TOTAL};
use rust_decimal::Decimal;
use service_core::error::AppError;
use sqlx::postgres::PgConnection;
use tracing::{info, instrument};

/// Result of a successful post.
#[derive(Debug, Clone, serde::Serialize)]
pub struct PostOutcome {
    pub document_id: i64,
    pub identifier: String,
}

/// Accumulated totals over the non-empty detail lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct DetailTotals {
    net: Decimal,
    vat: Decimal,
}

fn detail_totals(detail: &[DetailLine]) -> DetailTotals {
    let mut net = Decimal::ZERO;
    let mut vat = Decimal::ZERO;
    for line in detail.iter().filter(|l| !l.is_empty()) {
        net += line.amount;
        vat += line.vat_amount;
    }
    DetailTotals { net, vat }
}

/// Header account types acceptable per document type. `None` means any.
fn allowed_header_types(document_type: DocumentType) -> Option<&'static [AccountType]> {
    use AccountType::*;
    match document_type {
        DocumentType::Invoice | DocumentType::CreditNote => Some(&[Receivable]),
        DocumentType::Bill | DocumentType::SupplierCredit => Some(&[Payable]),
        DocumentType::Cheque | DocumentType::Deposit => Some(&[Bank]),
        DocumentType::CardCharge | DocumentType::CardCredit => Some(&[CreditCard]),
        DocumentType::Transfer => Some(&[Bank, CreditCard]),
        DocumentType::Journal | DocumentType::VatReturn => None,
    }
}

pub struct PostingEngine;

impl PostingEngine {
    /// Post (create or fully rewrite) a document. Everything runs in one
    /// transaction; any failure rolls the whole write back.
    #[instrument(skip(db, ctx, header, detail), fields(document_type = %header.document_type, document_id = ?header.document_id))]
    pub async fn post(
        db: &Database,
        ctx: &RequestContext,
        header: DocumentHeader,
        detail: Vec<DetailLine>,
    ) -> Result<PostOutcome, AppError> {
        let result = Self::post_inner(db, ctx, header, detail).await;
        match &result {
            Ok(_) => POSTINGS_TOTAL.with_label_values(&["ok"]).inc(),
            Err(e) => {
                POSTINGS_TOTAL.with_label_values(&["error"]).inc();
                metrics::record_error(e);
            }
        }
        result
    }

    async fn post_inner(
        db: &Database,
        ctx: &RequestContext,
        header: DocumentHeader,
        detail: Vec<DetailLine>,
    ) -> Result<PostOutcome, AppError> {
        let doc_type = header.document_type;

        let account = db
            .get_account(header.account_id)
            .await?
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Account not found")))?;
        let account_type = account.parsed_type().ok_or_else(|| {
            AppError::InternalError(anyhow::anyhow!(
                "Account {} has unknown type '{}'",
                account.account_id,
                account.account_type
            ))
        })?;
        if let Some(allowed) = allowed_header_types(doc_type) {
            if !allowed.contains(&account_type) {
                return Err(AppError::BadRequest(anyhow::anyhow!(
                    "A {} cannot post to a {} account",
                    doc_type,
                    account_type
                )));
            }
        }

        let vat_account = db.vat_account().await?;

        let totals = detail_totals(&detail);
        if header.amount != totals.net + totals.vat {
            return Err(AppError::BadRequest(anyhow::anyhow!(
                "Document does not balance: amount {} != net {} + VAT {} (discrepancy {})",
                header.amount,
                totals.net,
                totals.vat,
                header.amount - (totals.net + totals.vat)
            )));
        }
        if doc_type.vat_free() && !totals.vat.is_zero() {
            return Err(AppError::BadRequest(anyhow::anyhow!(
                "A {} cannot carry VAT",
                doc_type
            )));
        }

        let mut tx = db.begin().await?;

        // Prior version, for the audit diff and the VAT-declared guard.
        let before = match header.document_id {
            Some(id) => Some(Self::load_full(&mut tx, id).await?.ok_or_else(|| {
                AppError::NotFound(anyhow::anyhow!("Document {} not found", id))
            })?),
            None => None,
        };
        // The VAT control journal of the prior version, if it had one. It is
        // always the last journal, so a detail posting that happens to touch
        // the VAT account is never mistaken for it.
        let prior_vat_journal = before.as_ref().and_then(|full| {
            let had_vat = full
                .document
                .parsed_type()
                .is_some_and(|t| !t.vat_free());
            if !had_vat {
                return None;
            }
            full.journals
                .iter()
                .map(|jl| &jl.journal)
                .max_by_key(|j| j.journal_num)
                .filter(|j| j.journal_num > 1 && j.account_id == vat_account.account_id)
                .cloned()
        });

        let ds = doc_type.detail_sign();
        let signed_vat = ds * totals.vat;

        if let Some(full) = &before {
            let prior_vat_amount = prior_vat_journal
                .as_ref()
                .map(|j| j.amount)
                .unwrap_or(Decimal::ZERO);
            if full.document.vat_return_id.is_some() && prior_vat_amount != signed_vat {
                return Err(AppError::Conflict(anyhow::anyhow!(
                    "VAT on this document has been declared and cannot be changed"
                )));
            }
        }

        // Resolve "<next>" before writing the header row.
        let identifier = if header.identifier == NEXT_IDENTIFIER {
            let number =
                Database::allocate_identifier(&mut tx, header.account_id, doc_type).await?;
            number.to_string()
        } else {
            header.identifier.clone()
        };

        let name_address_id = header.name_address_id.unwrap_or(BLANK_NAME_ADDRESS_ID);
        let document_id = Self::write_document(
            &mut tx,
            &header,
            &identifier,
            name_address_id,
            before.as_ref().map(|f| &f.document),
        )
        .await?;

        // The VAT row is reused by identity, never by position: park it at
        // num 0 so a detail journal cannot claim its slot when the line
        // count changes, and keep it out of the positional reuse set.
        if let Some(vat) = &prior_vat_journal {
            sqlx::query("UPDATE journals SET journal_num = 0 WHERE journal_id = $1")
                .bind(vat.journal_id)
                .execute(&mut *tx)
                .await
                .map_err(|e| {
                    AppError::DatabaseError(anyhow::anyhow!("Failed to park VAT journal: {}", e))
                })?;
        }
        let existing: Vec<Journal> = before
            .as_ref()
            .map(|f| {
                f.journals
                    .iter()
                    .map(|jl| jl.journal.clone())
                    .filter(|j| {
                        prior_vat_journal
                            .as_ref()
                            .map_or(true, |v| v.journal_id != j.journal_id)
                    })
                    .collect()
            })
            .unwrap_or_default();

        // Header journal is always num 1; detail journals follow; the VAT
        // journal, when present, is always last.
        let mut num: i32 = 1;
        Self::write_journal(
            &mut tx,
            &existing,
            document_id,
            num,
            header.account_id,
            doc_type.header_sign() * header.amount,
            name_address_id,
            &header.memo,
            None,
        )
        .await?;

        for line in detail.iter().filter(|l| !l.is_empty()) {
            num += 1;
            let line_ext = if doc_type.vat_free() {
                None
            } else {
                Some(Line {
                    journal_id: 0, // assigned on write
                    quantity: line.quantity,
                    product: line.product.clone(),
                    vat_code: line.vat_code.clone(),
                    vat_rate: line.vat_rate,
                    vat_amount: line.vat_amount,
                    net_amount: ds * line.amount,
                })
            };
            Self::write_journal(
                &mut tx,
                &existing,
                document_id,
                num,
                line.account_id,
                ds * line.amount,
                name_address_id,
                &line.memo,
                line_ext,
            )
            .await?;
        }

        // Delete detail rows left over from a previous, longer version before
        // the VAT row takes the next number. The parked VAT row sits at num 0
        // and is untouched.
        sqlx::query("DELETE FROM journals WHERE document_id = $1 AND journal_num > $2")
            .bind(document_id)
            .bind(num)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                AppError::DatabaseError(anyhow::anyhow!("Failed to delete stale journals: {}", e))
            })?;

        if !signed_vat.is_zero() {
            num += 1;
            match &prior_vat_journal {
                Some(p) => {
                    // Allocations already made against the VAT row survive an
                    // edit: outstanding moves by the change in VAT.
                    let outstanding = p.outstanding + (signed_vat - p.amount);
                    sqlx::query(
                        r#"
                        UPDATE journals
                        SET journal_num = $2, amount = $3, outstanding = $4,
                            name_address_id = $5, memo = $6
                        WHERE journal_id = $1
                        "#,
                    )
                    .bind(p.journal_id)
                    .bind(num)
                    .bind(signed_vat)
                    .bind(outstanding)
                    .bind(name_address_id)
                    .bind(&header.memo)
                    .execute(&mut *tx)
                    .await
                    .map_err(|e| {
                        AppError::DatabaseError(anyhow::anyhow!(
                            "Failed to update VAT journal: {}",
                            e
                        ))
                    })?;
                }
                None => {
                    Self::write_journal(
                        &mut tx,
                        &existing,
                        document_id,
                        num,
                        vat_account.account_id,
                        signed_vat,
                        name_address_id,
                        &header.memo,
                        None,
                    )
                    .await?;
                }
            }
        } else if let Some(p) = &prior_vat_journal {
            sqlx::query("DELETE FROM journals WHERE journal_id = $1")
                .bind(p.journal_id)
                .execute(&mut *tx)
                .await
                .map_err(|e| {
                    AppError::DatabaseError(anyhow::anyhow!("Failed to delete VAT journal: {}", e))
                })?;
        }

        let after = Self::load_full(&mut tx, document_id).await?.ok_or_else(|| {
            AppError::InternalError(anyhow::anyhow!("Document vanished during post"))
        })?;

        let before_json = before
            .map(|f| serde_json::to_value(f).map_err(anyhow::Error::new))
            .transpose()?;
        let after_json = serde_json::to_value(&after).map_err(anyhow::Error::new)?;
        AuditRecorder::record(
            &mut tx,
            ctx,
            "documents",
            document_id,
            before_json.as_ref(),
            Some(&after_json),
        )
        .await?;

        tx.commit().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to commit posting: {}", e))
        })?;

        info!(
            document_id = %document_id,
            journal_count = num,
            amount = %header.amount,
            "Document posted"
        );

        Ok(PostOutcome {
            document_id,
            identifier,
        })
    }

    /// Delete a document: only allowed when nothing has been allocated
    /// against its control-account postings and its VAT is undeclared.
    #[instrument(skip(db, ctx), fields(document_id = %document_id))]
    pub async fn delete(
        db: &Database,
        ctx: &RequestContext,
        document_id: i64,
    ) -> Result<(), AppError> {
        let mut tx = db.begin().await?;

        let full = Self::load_full(&mut tx, document_id)
            .await?
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Document not found")))?;

        if full.document.vat_return_id.is_some() {
            return Err(AppError::Conflict(anyhow::anyhow!(
                "Document has been VAT-declared and cannot be deleted"
            )));
        }

        for jl in &full.journals {
            let account_type: String =
                sqlx::query_scalar("SELECT account_type FROM accounts WHERE account_id = $1")
                    .bind(jl.journal.account_id)
                    .fetch_one(&mut *tx)
                    .await
                    .map_err(|e| {
                        AppError::DatabaseError(anyhow::anyhow!("Failed to get account: {}", e))
                    })?;
            let is_control = AccountType::parse(&account_type)
                .map(|t| t.is_control())
                .unwrap_or(false);
            if is_control && jl.journal.outstanding != jl.journal.amount {
                return Err(AppError::Conflict(anyhow::anyhow!(
                    "Document has been paid or allocated against and cannot be deleted"
                )));
            }
        }

        let final_json = serde_json::to_value(&full).map_err(anyhow::Error::new)?;
        AuditRecorder::record(&mut tx, ctx, "documents", document_id, Some(&final_json), None)
            .await?;

        // Lines cascade from journals.
        sqlx::query("DELETE FROM journals WHERE document_id = $1")
            .bind(document_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                AppError::DatabaseError(anyhow::anyhow!("Failed to delete journals: {}", e))
            })?;
        sqlx::query("DELETE FROM documents WHERE document_id = $1")
            .bind(document_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                AppError::DatabaseError(anyhow::anyhow!("Failed to delete document: {}", e))
            })?;

        tx.commit().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to commit delete: {}", e))
        })?;

        info!(document_id = %document_id, "Document deleted");

        Ok(())
    }

    /// Load the complete persisted image of a document.
    pub async fn load_full(
        conn: &mut PgConnection,
        document_id: i64,
    ) -> Result<Option<FullDocument>, AppError> {
        let Some(document) = Database::get_document_on(&mut *conn, document_id).await? else {
            return Ok(None);
        };
        let journals = Database::journals_for_document(&mut *conn, document_id).await?;
        let lines = Database::lines_for_document(&mut *conn, document_id).await?;

        let journals = journals
            .into_iter()
            .map(|journal| {
                let line = lines.iter().find(|l| l.journal_id == journal.journal_id);
                JournalLine {
                    line: line.cloned(),
                    journal,
                }
            })
            .collect();

        Ok(Some(FullDocument { document, journals }))
    }

    async fn write_document(
        conn: &mut PgConnection,
        header: &DocumentHeader,
        identifier: &str,
        name_address_id: i64,
        prior: Option<&Document>,
    ) -> Result<i64, AppError> {
        match prior {
            Some(doc) => {
                // An unchanged header keeps its updated_utc, so an
                // unchanged repost audits as a no-op.
                let unchanged = doc.document_type == header.document_type.as_str()
                    && doc.document_date == header.document_date
                    && doc.identifier == identifier
                    && doc.memo == header.memo
                    && doc.address == header.address
                    && doc.name_address_id == name_address_id;
                if unchanged {
                    return Ok(doc.document_id);
                }
                sqlx::query(
                    r#"
                    UPDATE documents
                    SET document_type = $2, document_date = $3, identifier = $4, memo = $5,
                        address = $6, name_address_id = $7, updated_utc = NOW()
                    WHERE document_id = $1
                    "#,
                )
                .bind(doc.document_id)
                .bind(header.document_type.as_str())
                .bind(header.document_date)
                .bind(identifier)
                .bind(&header.memo)
                .bind(&header.address)
                .bind(name_address_id)
                .execute(conn)
                .await
                .map_err(|e| {
                    AppError::DatabaseError(anyhow::anyhow!("Failed to update document: {}", e))
                })?;
                Ok(doc.document_id)
            }
            None => {
                let id: i64 = sqlx::query_scalar(
                    r#"
                    INSERT INTO documents (document_type, document_date, identifier, memo, address, name_address_id)
                    VALUES ($1, $2, $3, $4, $5, $6)
                    RETURNING document_id
                    "#,
                )
                .bind(header.document_type.as_str())
                .bind(header.document_date)
                .bind(identifier)
                .bind(&header.memo)
                .bind(&header.address)
                .bind(name_address_id)
                .fetch_one(conn)
                .await
                .map_err(|e| {
                    AppError::DatabaseError(anyhow::anyhow!("Failed to insert document: {}", e))
                })?;
                Ok(id)
            }
        }
    }

    /// Write one journal row for `(document_id, journal_num)`, reusing an
    /// existing row to preserve its id and allocated outstanding. The
    /// outstanding moves by the amount delta, never to the new absolute
    /// value.
    #[allow(clippy::too_many_arguments)]
    async fn write_journal(
        conn: &mut PgConnection,
        existing: &[Journal],
        document_id: i64,
        journal_num: i32,
        account_id: i64,
        amount: Decimal,
        name_address_id: i64,
        memo: &str,
        line: Option<Line>,
    ) -> Result<i64, AppError> {
        let prior = existing.iter().find(|j| j.journal_num == journal_num);

        let journal_id = match prior {
            Some(p) => {
                let outstanding = p.outstanding + (amount - p.amount);
                sqlx::query(
                    r#"
                    UPDATE journals
                    SET account_id = $2, amount = $3, outstanding = $4, name_address_id = $5, memo = $6
                    WHERE journal_id = $1
                    "#,
                )
                .bind(p.journal_id)
                .bind(account_id)
                .bind(amount)
                .bind(outstanding)
                .bind(name_address_id)
                .bind(memo)
                .execute(&mut *conn)
                .await
                .map_err(|e| {
                    AppError::DatabaseError(anyhow::anyhow!("Failed to update journal: {}", e))
                })?;
                p.journal_id
            }
            None => sqlx::query_scalar(
                r#"
                INSERT INTO journals (document_id, journal_num, account_id, amount, outstanding, name_address_id, memo)
                VALUES ($1, $2, $3, $4, $4, $5, $6)
                RETURNING journal_id
                "#,
            )
            .bind(document_id)
            .bind(journal_num)
            .bind(account_id)
            .bind(amount)
            .bind(name_address_id)
            .bind(memo)
            .fetch_one(&mut *conn)
            .await
            .map_err(|e| {
                AppError::DatabaseError(anyhow::anyhow!("Failed to insert journal: {}", e))
            })?,
        };

        match line {
            Some(l) => {
                sqlx::query(
                    r#"
                    INSERT INTO lines (journal_id, quantity, product, vat_code, vat_rate, vat_amount, net_amount)
                    VALUES ($1, $2, $3, $4, $5, $6, $7)
                    ON CONFLICT (journal_id) DO UPDATE
                    SET quantity = EXCLUDED.quantity, product = EXCLUDED.product,
                        vat_code = EXCLUDED.vat_code, vat_rate = EXCLUDED.vat_rate,
                        vat_amount = EXCLUDED.vat_amount, net_amount = EXCLUDED.net_amount
                    "#,
                )
                .bind(journal_id)
                .bind(l.quantity)
                .bind(&l.product)
                .bind(&l.vat_code)
                .bind(l.vat_rate)
                .bind(l.vat_amount)
                .bind(l.net_amount)
                .execute(conn)
                .await
                .map_err(|e| {
                    AppError::DatabaseError(anyhow::anyhow!("Failed to write line: {}", e))
                })?;
            }
            None => {
                sqlx::query("DELETE FROM lines WHERE journal_id = $1")
                    .bind(journal_id)
                    .execute(conn)
                    .await
                    .map_err(|e| {
                        AppError::DatabaseError(anyhow::anyhow!("Failed to clear line: {}", e))
                    })?;
            }
        }

        Ok(journal_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    fn line(amount: &str, vat: &str) -> DetailLine {
        DetailLine {
            account_id: 10,
            amount: amount.parse().unwrap(),
            quantity: Decimal::ONE,
            product: String::new(),
            vat_code: String::new(),
            vat_rate: Decimal::ZERO,
            vat_amount: vat.parse().unwrap(),
            memo: String::new(),
        }
    }

    #[test]
    fn totals_accumulate_net_and_vat() {
        let detail = vec![line("90.00", "10.00"), line("5.00", "1.00")];
        let totals = detail_totals(&detail);
        assert_eq!(totals.net, dec("95.00"));
        assert_eq!(totals.vat, dec("11.00"));
    }

    #[test]
    fn empty_lines_are_skipped() {
        let mut empty = line("0.00", "0.00");
        empty.account_id = 0;
        let detail = vec![line("90.00", "0.00"), empty];
        let totals = detail_totals(&detail);
        assert_eq!(totals.net, dec("90.00"));
        assert_eq!(totals.vat, Decimal::ZERO);
    }

    #[test]
    fn every_document_type_sums_to_zero() {
        // header_sign * amount + detail_sign * (net + vat) must cancel.
        for doc_type in [
            DocumentType::Invoice,
            DocumentType::CreditNote,
            DocumentType::Bill,
            DocumentType::SupplierCredit,
            DocumentType::Cheque,
            DocumentType::Deposit,
            DocumentType::CardCharge,
            DocumentType::CardCredit,
            DocumentType::Transfer,
            DocumentType::Journal,
        ] {
            let amount = dec("110.00");
            let total = doc_type.header_sign() * amount + doc_type.detail_sign() * amount;
            assert_eq!(total, Decimal::ZERO, "{} does not cancel", doc_type);
        }
    }

    #[test]
    fn invoice_restricted_to_receivable() {
        let allowed = allowed_header_types(DocumentType::Invoice).unwrap();
        assert_eq!(allowed, &[AccountType::Receivable]);
        assert!(allowed_header_types(DocumentType::Journal).is_none());
    }
}
