//! Account and counterparty models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// The reserved blank/unknown counterparty row.
pub const BLANK_NAME_ADDRESS_ID: i64 = 1;

/// Ledger account categories. `Vat` is the single control account that
/// accumulates tax due/receivable; `Receivable`/`Payable` carry outstanding
/// balances per posting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountType {
    Bank,
    CreditCard,
    Income,
    Expense,
    Receivable,
    Payable,
    Investment,
    Equity,
    Vat,
}

impl AccountType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Bank => "bank",
            Self::CreditCard => "creditcard",
            Self::Income => "income",
            Self::Expense => "expense",
            Self::Receivable => "receivable",
            Self::Payable => "payable",
            Self::Investment => "investment",
            Self::Equity => "equity",
            Self::Vat => "vat",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "bank" => Some(Self::Bank),
            "creditcard" => Some(Self::CreditCard),
            "income" => Some(Self::Income),
            "expense" => Some(Self::Expense),
            "receivable" => Some(Self::Receivable),
            "payable" => Some(Self::Payable),
            "investment" => Some(Self::Investment),
            "equity" => Some(Self::Equity),
            "vat" => Some(Self::Vat),
            _ => None,
        }
    }

    /// Control accounts track an outstanding (unallocated) amount per posting.
    pub fn is_control(&self) -> bool {
        matches!(self, Self::Receivable | Self::Payable)
    }

    /// Accounts that can be reconciled against a bank/card statement.
    pub fn is_statement_account(&self) -> bool {
        matches!(self, Self::Bank | Self::CreditCard)
    }
}

impl std::fmt::Display for AccountType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Ledger account. Names may be hierarchical ("Payroll:Taxes").
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Account {
    pub account_id: i64,
    pub name: String,
    pub account_type: String,
    pub protected: bool,
    pub next_cheque_number: i64,
    pub next_deposit_number: i64,
    pub created_utc: DateTime<Utc>,
}

impl Account {
    pub fn parsed_type(&self) -> Option<AccountType> {
        AccountType::parse(&self.account_type)
    }
}

/// Counterparty categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NameKind {
    Customer,
    Supplier,
    Other,
    Member,
}

impl NameKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Customer => "customer",
            Self::Supplier => "supplier",
            Self::Other => "other",
            Self::Member => "member",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "customer" => Some(Self::Customer),
            "supplier" => Some(Self::Supplier),
            "other" => Some(Self::Other),
            "member" => Some(Self::Member),
            _ => None,
        }
    }
}

/// Counterparty (name/address) record. `(kind, name)` is unique; row 1 is
/// the reserved blank counterparty.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct NameAddress {
    pub name_address_id: i64,
    pub kind: String,
    pub name: String,
    pub address: String,
    pub contact: String,
    pub created_utc: DateTime<Utc>,
}
