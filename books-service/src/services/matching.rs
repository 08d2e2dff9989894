//! Candidate selection and statement-line matching.
//!
//! The candidate selector offers existing postings to match against; the
//! resolver turns one statement line plus the user's decision into either a
//! reference to an existing posting or a draft document ready for posting.

use crate::models::{
    Candidate, DetailLine, DocumentHeader, DocumentType, DraftDocument, MatchMode, StatementLine,
};
use crate::models::document::NEXT_IDENTIFIER;
use crate::services::database::{Database, MatchablePosting};
use crate::services::posting::PostingEngine;
use chrono::{Duration, NaiveDate, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use service_core::error::AppError;
use std::collections::HashSet;
use tracing::{debug, instrument};

/// Similarity at or above this reuses an existing counterparty.
const SIMILARITY_THRESHOLD: f64 = 0.5;

/// Finally-cleared postings older than this are collapsed to one template
/// per repeating transaction.
const DEDUP_AGE_DAYS: i64 = 7;

const NAME_PREFIX_LEN: usize = 5;

/// Outcome of resolving one statement line.
#[derive(Debug, Clone, serde::Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Resolution {
    /// The statement line is an existing posting; nothing to create.
    Existing { journal_id: i64, document_id: i64 },
    /// A new document to post.
    Draft(DraftDocument),
}

pub struct Matcher;

impl Matcher {
    /// Every posting to `account_id` eligible for matching. Unreconciled
    /// postings are all offered; finally-cleared postings more than a week
    /// older than `since` are deduplicated by (counterparty, type, memo),
    /// keeping only the most recent as a template.
    #[instrument(skip(db), fields(account_id = %account_id, since = %since))]
    pub async fn candidates(
        db: &Database,
        account_id: i64,
        since: NaiveDate,
    ) -> Result<Vec<Candidate>, AppError> {
        let postings = db.postings_for_matching(account_id).await?;
        let cutoff = since - Duration::days(DEDUP_AGE_DAYS);

        let mut seen: HashSet<(String, String, String)> = HashSet::new();
        let mut candidates = Vec::with_capacity(postings.len());
        // Query order is newest first, so the first posting per key is the
        // one to keep.
        for p in postings {
            if p.cleared == "X" && p.document_date < cutoff {
                let key = (
                    p.counterparty.to_lowercase(),
                    p.document_type.clone(),
                    p.memo.to_lowercase(),
                );
                if !seen.insert(key) {
                    continue;
                }
            }
            candidates.push(to_candidate(p));
        }

        debug!(count = candidates.len(), "Candidate set built");
        Ok(candidates)
    }

    /// Resolve one statement line against an optional chosen candidate.
    ///
    /// `detail_account_id` seeds the detail line when no candidate was
    /// chosen for a new document; `transfer_account_id` names the far side
    /// of a transfer.
    #[instrument(skip(db, line, candidate), fields(account_id = %account_id, mode = ?mode))]
    pub async fn resolve(
        db: &Database,
        account_id: i64,
        line: &StatementLine,
        candidate: Option<&Candidate>,
        mode: MatchMode,
        detail_account_id: Option<i64>,
        transfer_account_id: Option<i64>,
    ) -> Result<Resolution, AppError> {
        let amount = line.amount.ok_or_else(|| {
            AppError::BadRequest(anyhow::anyhow!("Statement line has no amount"))
        })?;

        match mode {
            MatchMode::Same => {
                let candidate = candidate.ok_or_else(|| {
                    AppError::BadRequest(anyhow::anyhow!(
                        "Matching as the same transaction requires a candidate"
                    ))
                })?;
                if candidate.amount != amount {
                    return Err(AppError::BadRequest(anyhow::anyhow!(
                        "Candidate amount {} does not equal statement amount {}",
                        candidate.amount,
                        amount
                    )));
                }
                Ok(Resolution::Existing {
                    journal_id: candidate.journal_id,
                    document_id: candidate.document_id,
                })
            }
            MatchMode::New { document_type } => {
                let draft = Self::draft_new(
                    db,
                    account_id,
                    line,
                    amount,
                    candidate,
                    document_type,
                    detail_account_id,
                )
                .await?;
                Ok(Resolution::Draft(draft))
            }
            MatchMode::Transfer => {
                let other = transfer_account_id.ok_or_else(|| {
                    AppError::BadRequest(anyhow::anyhow!(
                        "A transfer needs the other account"
                    ))
                })?;
                Ok(Resolution::Draft(Self::draft_transfer(
                    account_id, other, line, amount,
                )))
            }
        }
    }

    async fn draft_new(
        db: &Database,
        account_id: i64,
        line: &StatementLine,
        amount: Decimal,
        candidate: Option<&Candidate>,
        document_type: DocumentType,
        detail_account_id: Option<i64>,
    ) -> Result<DraftDocument, AppError> {
        let gross = amount.abs();

        let mut detail = match candidate {
            Some(c) => Self::detail_from_document(db, c.document_id).await?,
            None => Vec::new(),
        };
        if detail.is_empty() {
            let account = detail_account_id.ok_or_else(|| {
                AppError::BadRequest(anyhow::anyhow!(
                    "A new document needs a candidate or a detail account"
                ))
            })?;
            detail.push(DetailLine {
                account_id: account,
                amount: gross,
                quantity: Decimal::ONE,
                product: String::new(),
                vat_code: String::new(),
                vat_rate: Decimal::ZERO,
                vat_amount: Decimal::ZERO,
                memo: String::new(),
            });
        }

        fold_difference(&mut detail, gross);

        let identifier = if document_type.uses_sequence() {
            NEXT_IDENTIFIER.to_string()
        } else {
            String::new()
        };

        let mut header = DocumentHeader {
            document_id: None,
            document_type,
            document_date: line.date.unwrap_or_else(|| Utc::now().date_naive()),
            account_id,
            amount: gross,
            name_address_id: None,
            memo: String::new(),
            identifier,
            address: String::new(),
        };

        let (counterparty, counterparty_is_new) =
            Self::guess_counterparty(db, line, candidate, &mut header).await?;

        header.memo = synthesize_memo(&header.memo, &counterparty, &line.memo);

        Ok(DraftDocument {
            header,
            detail,
            counterparty,
            counterparty_is_new,
        })
    }

    fn draft_transfer(
        account_id: i64,
        other_account_id: i64,
        line: &StatementLine,
        amount: Decimal,
    ) -> DraftDocument {
        // The header side of a transfer is the account money leaves.
        let (from, to) = if amount.is_sign_negative() {
            (account_id, other_account_id)
        } else {
            (other_account_id, account_id)
        };

        let gross = amount.abs();
        let memo = synthesize_memo("", &line.name, &line.memo);

        DraftDocument {
            header: DocumentHeader {
                document_id: None,
                document_type: DocumentType::Transfer,
                document_date: line.date.unwrap_or_else(|| Utc::now().date_naive()),
                account_id: from,
                amount: gross,
                name_address_id: None,
                memo,
                identifier: String::new(),
                address: String::new(),
            },
            detail: vec![DetailLine {
                account_id: to,
                amount: gross,
                quantity: Decimal::ONE,
                product: String::new(),
                vat_code: String::new(),
                vat_rate: Decimal::ZERO,
                vat_amount: Decimal::ZERO,
                memo: String::new(),
            }],
            counterparty: String::new(),
            counterparty_is_new: false,
        }
    }

    /// Rebuild user-facing detail lines from a stored document.
    async fn detail_from_document(
        db: &Database,
        document_id: i64,
    ) -> Result<Vec<DetailLine>, AppError> {
        let mut conn = db.pool().acquire().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to acquire connection: {}", e))
        })?;
        let Some(full) = PostingEngine::load_full(&mut conn, document_id).await? else {
            return Ok(Vec::new());
        };

        let ds = DocumentType::parse(&full.document.document_type)
            .map(|t| t.detail_sign())
            .unwrap_or(Decimal::ONE);

        let detail = full
            .journals
            .iter()
            .filter(|jl| jl.journal.journal_num >= 2)
            .filter_map(|jl| {
                let line = jl.line.as_ref()?;
                Some(DetailLine {
                    account_id: jl.journal.account_id,
                    amount: ds * jl.journal.amount,
                    quantity: line.quantity,
                    product: line.product.clone(),
                    vat_code: line.vat_code.clone(),
                    vat_rate: line.vat_rate,
                    vat_amount: line.vat_amount,
                    memo: jl.journal.memo.clone(),
                })
            })
            .collect();
        Ok(detail)
    }

    /// Pick a counterparty for the draft. Keeps the candidate's one when it
    /// resembles the statement payee; otherwise searches existing "other"
    /// names near the payee, falling back to a brand-new name.
    async fn guess_counterparty(
        db: &Database,
        line: &StatementLine,
        candidate: Option<&Candidate>,
        header: &mut DocumentHeader,
    ) -> Result<(String, bool), AppError> {
        let payee = first_line(&line.name);
        if payee.is_empty() {
            if let Some(c) = candidate {
                header.name_address_id = Some(c.name_address_id);
                return Ok((c.counterparty.clone(), false));
            }
            return Ok((String::new(), false));
        }

        if let Some(c) = candidate {
            if !c.counterparty.is_empty()
                && similarity(payee, &c.counterparty) >= SIMILARITY_THRESHOLD
            {
                header.name_address_id = Some(c.name_address_id);
                return Ok((c.counterparty.clone(), false));
            }
        }

        let prefix: String = payee.chars().take(NAME_PREFIX_LEN).collect();
        let nearby = db.find_other_names_before(&prefix, payee).await?;
        for record in nearby {
            if similarity(payee, &record.name) >= SIMILARITY_THRESHOLD {
                header.name_address_id = Some(record.name_address_id);
                return Ok((record.name, false));
            }
        }

        debug!(payee = %payee, "No matching counterparty, proposing a new one");
        Ok((payee.to_string(), true))
    }
}

fn to_candidate(p: MatchablePosting) -> Candidate {
    Candidate {
        journal_id: p.journal_id,
        document_id: p.document_id,
        document_type: p.document_type,
        document_date: p.document_date,
        identifier: p.identifier,
        amount: p.amount,
        name_address_id: p.name_address_id,
        counterparty: p.counterparty,
        memo: p.memo,
        cleared: p.cleared,
    }
}

fn first_line(text: &str) -> &str {
    text.lines().next().unwrap_or("").trim()
}

/// Word-overlap similarity: the share of the payee's word characters found
/// verbatim in the candidate name, case-insensitive.
pub fn similarity(payee: &str, candidate_name: &str) -> f64 {
    let candidate = candidate_name.to_lowercase();
    let mut total = 0usize;
    let mut found = 0usize;
    for word in payee.split_whitespace() {
        let word = word.to_lowercase();
        total += word.chars().count();
        if candidate.contains(&word) {
            found += word.chars().count();
        }
    }
    if total == 0 {
        return 0.0;
    }
    found as f64 / total as f64
}

/// Fold the difference between the target gross and the draft's current
/// total into the first VAT-bearing line, recomputing its VAT from the
/// inclusive rate; a draft without VAT takes the whole difference on net.
pub fn fold_difference(detail: &mut [DetailLine], target_gross: Decimal) {
    let current: Decimal = detail.iter().map(|l| l.amount + l.vat_amount).sum();
    let diff = target_gross - current;
    if diff.is_zero() || detail.is_empty() {
        return;
    }

    let index = detail
        .iter()
        .position(|l| !l.vat_rate.is_zero())
        .unwrap_or(0);
    let line = &mut detail[index];
    let line_gross = line.amount + line.vat_amount + diff;

    if line.vat_rate.is_zero() {
        line.amount += diff;
    } else {
        let vat = (line_gross * line.vat_rate
            / (Decimal::ONE_HUNDRED + line.vat_rate))
            .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
        line.vat_amount = vat;
        line.amount = line_gross - vat;
    }
}

/// Blank memos get the payee name, plus the statement memo when it adds
/// anything the name does not already carry.
fn synthesize_memo(existing: &str, name: &str, statement_memo: &str) -> String {
    if !existing.trim().is_empty() {
        return existing.to_string();
    }
    let name = name.trim();
    let memo = statement_memo.trim();
    if memo.is_empty() || name.is_empty() {
        if name.is_empty() {
            return memo.to_string();
        }
        return name.to_string();
    }
    if memo.to_lowercase().contains(&name.to_lowercase()) {
        return memo.to_string();
    }
    format!("{} {}", name, memo)
}
