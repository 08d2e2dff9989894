//! Document, journal and line models.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// On save, a header identifier of `"<next>"` allocates the account's next
/// cheque or deposit sequence number.
pub const NEXT_IDENTIFIER: &str = "<next>";

/// User-facing transaction kinds. Each drives the sign applied to its detail
/// lines; the header posting always balances them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentType {
    Invoice,
    CreditNote,
    Bill,
    SupplierCredit,
    Cheque,
    Deposit,
    CardCharge,
    CardCredit,
    Transfer,
    Journal,
    VatReturn,
}

impl DocumentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Invoice => "invoice",
            Self::CreditNote => "credit_note",
            Self::Bill => "bill",
            Self::SupplierCredit => "supplier_credit",
            Self::Cheque => "cheque",
            Self::Deposit => "deposit",
            Self::CardCharge => "card_charge",
            Self::CardCredit => "card_credit",
            Self::Transfer => "transfer",
            Self::Journal => "journal",
            Self::VatReturn => "vat_return",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "invoice" => Some(Self::Invoice),
            "credit_note" => Some(Self::CreditNote),
            "bill" => Some(Self::Bill),
            "supplier_credit" => Some(Self::SupplierCredit),
            "cheque" => Some(Self::Cheque),
            "deposit" => Some(Self::Deposit),
            "card_charge" => Some(Self::CardCharge),
            "card_credit" => Some(Self::CardCredit),
            "transfer" => Some(Self::Transfer),
            "journal" => Some(Self::Journal),
            "vat_return" => Some(Self::VatReturn),
            _ => None,
        }
    }

    /// Sign applied to detail-line (and VAT) postings. The header posting
    /// carries the opposite sign so every document sums to zero.
    pub fn detail_sign(&self) -> Decimal {
        match self {
            Self::Invoice | Self::SupplierCredit | Self::Deposit | Self::CardCredit => {
                Decimal::NEGATIVE_ONE
            }
            Self::CreditNote
            | Self::Bill
            | Self::Cheque
            | Self::CardCharge
            | Self::Transfer
            | Self::Journal
            | Self::VatReturn => Decimal::ONE,
        }
    }

    pub fn header_sign(&self) -> Decimal {
        -self.detail_sign()
    }

    /// Whether this type draws from the deposit number sequence rather than
    /// the cheque number sequence when the identifier is `"<next>"`.
    pub fn uses_deposit_sequence(&self) -> bool {
        matches!(self, Self::Deposit | Self::CardCredit)
    }

    /// Types whose identifier comes from an account sequence when left as
    /// `"<next>"`.
    pub fn uses_sequence(&self) -> bool {
        matches!(
            self,
            Self::Cheque | Self::Deposit | Self::CardCharge | Self::CardCredit
        )
    }

    /// Types that never carry VAT detail.
    pub fn vat_free(&self) -> bool {
        matches!(self, Self::Transfer | Self::VatReturn)
    }
}

impl std::fmt::Display for DocumentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Persisted document header row.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Document {
    pub document_id: i64,
    pub document_type: String,
    pub document_date: NaiveDate,
    pub identifier: String,
    pub memo: String,
    pub address: String,
    pub name_address_id: i64,
    pub vat_return_id: Option<i64>,
    pub created_utc: DateTime<Utc>,
    pub updated_utc: DateTime<Utc>,
}

impl Document {
    pub fn parsed_type(&self) -> Option<DocumentType> {
        DocumentType::parse(&self.document_type)
    }
}

/// One ledger posting belonging to a document. `journal_num` is 1-based and
/// gapless within the document.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Journal {
    pub journal_id: i64,
    pub document_id: i64,
    pub journal_num: i32,
    pub account_id: i64,
    pub amount: Decimal,
    pub outstanding: Decimal,
    pub name_address_id: i64,
    pub memo: String,
    pub cleared: String,
}

/// Line-item extension of a journal (quantity, product, VAT split).
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Line {
    pub journal_id: i64,
    pub quantity: Decimal,
    pub product: String,
    pub vat_code: String,
    pub vat_rate: Decimal,
    pub vat_amount: Decimal,
    pub net_amount: Decimal,
}

/// A journal together with its optional line extension.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JournalLine {
    pub journal: Journal,
    pub line: Option<Line>,
}

/// The complete persisted image of a document, used for reads and for the
/// audit before/after snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FullDocument {
    pub document: Document,
    pub journals: Vec<JournalLine>,
}

/// Incoming document header for the posting engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentHeader {
    #[serde(default)]
    pub document_id: Option<i64>,
    pub document_type: DocumentType,
    pub document_date: NaiveDate,
    /// Account the balancing header journal posts to (bank account for a
    /// cheque, receivable control for an invoice, and so on).
    pub account_id: i64,
    pub amount: Decimal,
    #[serde(default)]
    pub name_address_id: Option<i64>,
    #[serde(default)]
    pub memo: String,
    #[serde(default)]
    pub identifier: String,
    #[serde(default)]
    pub address: String,
}

/// Incoming detail line for the posting engine. `amount` is the net amount
/// as entered; the engine applies the document-type sign.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetailLine {
    pub account_id: i64,
    pub amount: Decimal,
    #[serde(default = "DetailLine::default_quantity")]
    pub quantity: Decimal,
    #[serde(default)]
    pub product: String,
    #[serde(default)]
    pub vat_code: String,
    #[serde(default)]
    pub vat_rate: Decimal,
    #[serde(default)]
    pub vat_amount: Decimal,
    #[serde(default)]
    pub memo: String,
}

impl DetailLine {
    fn default_quantity() -> Decimal {
        Decimal::ONE
    }

    /// Lines with no account or no movement are skipped by the engine.
    pub fn is_empty(&self) -> bool {
        self.account_id == 0 || (self.amount.is_zero() && self.vat_amount.is_zero())
    }
}
