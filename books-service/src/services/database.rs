//! Database service for books-service: the persisted ledger store.

use crate::models::{Account, AccountType, AuditRecord, Document, DocumentType, Journal, Line, NameAddress, NameKind};
use crate::services::metrics::DB_QUERY_DURATION;
use chrono::{DateTime, NaiveDate, Utc};
use service_core::error::AppError;
use sqlx::postgres::{PgConnection, PgPool, PgPoolOptions};
use sqlx::{Postgres, Transaction};
use std::time::Duration;
use tracing::{info, instrument};

/// Database connection pool wrapper.
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// Create a new database connection pool.
    #[instrument(skip(database_url), fields(service = "books-service"))]
    pub async fn new(
        database_url: &str,
        max_connections: u32,
        min_connections: u32,
    ) -> Result<Self, AppError> {
        info!(
            max_connections = max_connections,
            min_connections = min_connections,
            "Connecting to PostgreSQL"
        );

        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .min_connections(min_connections)
            .acquire_timeout(Duration::from_secs(30))
            .idle_timeout(Duration::from_secs(600))
            .connect(database_url)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to connect: {}", e)))?;

        info!("PostgreSQL connection pool established");

        Ok(Self { pool })
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Begin a transaction. All multi-row writes run inside one.
    pub async fn begin(&self) -> Result<Transaction<'static, Postgres>, AppError> {
        self.pool.begin().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to begin transaction: {}", e))
        })
    }

    /// Check database health.
    #[instrument(skip(self))]
    pub async fn health_check(&self) -> Result<(), AppError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Health check failed: {}", e)))?;
        Ok(())
    }

    /// Run database migrations.
    #[instrument(skip(self))]
    pub async fn run_migrations(&self) -> Result<(), AppError> {
        info!("Running database migrations");
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Migration failed: {}", e)))?;
        info!("Database migrations completed");
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Account Operations
    // -------------------------------------------------------------------------

    /// Create a new account.
    #[instrument(skip(self), fields(name = %name))]
    pub async fn create_account(
        &self,
        name: &str,
        account_type: AccountType,
    ) -> Result<Account, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["create_account"])
            .start_timer();

        if account_type == AccountType::Vat {
            return Err(AppError::BadRequest(anyhow::anyhow!(
                "The VAT control account is system-managed and cannot be created"
            )));
        }

        let account = sqlx::query_as::<_, Account>(
            r#"
            INSERT INTO accounts (name, account_type)
            VALUES ($1, $2)
            RETURNING account_id, name, account_type, protected, next_cheque_number, next_deposit_number, created_utc
            "#,
        )
        .bind(name)
        .bind(account_type.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db_err) if db_err.is_unique_violation() => {
                AppError::Conflict(anyhow::anyhow!("Account '{}' already exists", name))
            }
            _ => AppError::DatabaseError(anyhow::anyhow!("Failed to create account: {}", e)),
        })?;

        timer.observe_duration();
        info!(account_id = %account.account_id, account_type = %account.account_type, "Account created");

        Ok(account)
    }

    /// Get an account by ID.
    #[instrument(skip(self), fields(account_id = %account_id))]
    pub async fn get_account(&self, account_id: i64) -> Result<Option<Account>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_account"])
            .start_timer();

        let account = sqlx::query_as::<_, Account>(
            r#"
            SELECT account_id, name, account_type, protected, next_cheque_number, next_deposit_number, created_utc
            FROM accounts
            WHERE account_id = $1
            "#,
        )
        .bind(account_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to get account: {}", e)))?;

        timer.observe_duration();

        Ok(account)
    }

    /// List all accounts ordered by name.
    #[instrument(skip(self))]
    pub async fn list_accounts(&self) -> Result<Vec<Account>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_accounts"])
            .start_timer();

        let accounts = sqlx::query_as::<_, Account>(
            r#"
            SELECT account_id, name, account_type, protected, next_cheque_number, next_deposit_number, created_utc
            FROM accounts
            ORDER BY name
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to list accounts: {}", e)))?;

        timer.observe_duration();

        Ok(accounts)
    }

    /// Delete an account. System accounts and accounts with postings are
    /// refused.
    #[instrument(skip(self), fields(account_id = %account_id))]
    pub async fn delete_account(&self, account_id: i64) -> Result<(), AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["delete_account"])
            .start_timer();

        let account = self
            .get_account(account_id)
            .await?
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Account not found")))?;

        if account.protected {
            return Err(AppError::BadRequest(anyhow::anyhow!(
                "Account '{}' is a system account and cannot be deleted",
                account.name
            )));
        }

        let posting_count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM journals WHERE account_id = $1")
                .bind(account_id)
                .fetch_one(&self.pool)
                .await
                .map_err(|e| {
                    AppError::DatabaseError(anyhow::anyhow!("Failed to count postings: {}", e))
                })?;

        if posting_count > 0 {
            return Err(AppError::Conflict(anyhow::anyhow!(
                "Account '{}' has postings and cannot be deleted",
                account.name
            )));
        }

        sqlx::query("DELETE FROM statement_formats WHERE account_id = $1")
            .bind(account_id)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                AppError::DatabaseError(anyhow::anyhow!("Failed to delete statement format: {}", e))
            })?;

        sqlx::query("DELETE FROM accounts WHERE account_id = $1")
            .bind(account_id)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                AppError::DatabaseError(anyhow::anyhow!("Failed to delete account: {}", e))
            })?;

        timer.observe_duration();
        info!(account_id = %account_id, "Account deleted");

        Ok(())
    }

    /// The single VAT control account.
    #[instrument(skip(self))]
    pub async fn vat_account(&self) -> Result<Account, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["vat_account"])
            .start_timer();

        let account = sqlx::query_as::<_, Account>(
            r#"
            SELECT account_id, name, account_type, protected, next_cheque_number, next_deposit_number, created_utc
            FROM accounts
            WHERE account_type = 'vat'
            "#,
        )
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("VAT control account missing: {}", e))
        })?;

        timer.observe_duration();

        Ok(account)
    }

    /// Allocate the next cheque/deposit sequence number for an account,
    /// inside the caller's transaction.
    pub async fn allocate_identifier(
        conn: &mut PgConnection,
        account_id: i64,
        document_type: DocumentType,
    ) -> Result<i64, AppError> {
        let column = if document_type.uses_deposit_sequence() {
            "next_deposit_number"
        } else {
            "next_cheque_number"
        };

        let query = format!(
            "UPDATE accounts SET {col} = {col} + 1 WHERE account_id = $1 RETURNING {col} - 1",
            col = column
        );

        let number: i64 = sqlx::query_scalar(&query)
            .bind(account_id)
            .fetch_one(conn)
            .await
            .map_err(|e| {
                AppError::DatabaseError(anyhow::anyhow!("Failed to allocate identifier: {}", e))
            })?;

        Ok(number)
    }

    // -------------------------------------------------------------------------
    // NameAddress Operations
    // -------------------------------------------------------------------------

    /// Create a counterparty record. `(kind, name)` is unique.
    #[instrument(skip(self), fields(kind = %kind.as_str(), name = %name))]
    pub async fn create_name_address(
        &self,
        kind: NameKind,
        name: &str,
        address: &str,
        contact: &str,
    ) -> Result<NameAddress, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["create_name_address"])
            .start_timer();

        let record = sqlx::query_as::<_, NameAddress>(
            r#"
            INSERT INTO name_addresses (kind, name, address, contact)
            VALUES ($1, $2, $3, $4)
            RETURNING name_address_id, kind, name, address, contact, created_utc
            "#,
        )
        .bind(kind.as_str())
        .bind(name)
        .bind(address)
        .bind(contact)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db_err) if db_err.is_unique_violation() => {
                AppError::Conflict(anyhow::anyhow!(
                    "A {} named '{}' already exists",
                    kind.as_str(),
                    name
                ))
            }
            _ => AppError::DatabaseError(anyhow::anyhow!("Failed to create counterparty: {}", e)),
        })?;

        timer.observe_duration();
        info!(name_address_id = %record.name_address_id, "Counterparty created");

        Ok(record)
    }

    /// Get a counterparty by ID.
    #[instrument(skip(self), fields(name_address_id = %name_address_id))]
    pub async fn get_name_address(
        &self,
        name_address_id: i64,
    ) -> Result<Option<NameAddress>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_name_address"])
            .start_timer();

        let record = sqlx::query_as::<_, NameAddress>(
            r#"
            SELECT name_address_id, kind, name, address, contact, created_utc
            FROM name_addresses
            WHERE name_address_id = $1
            "#,
        )
        .bind(name_address_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to get counterparty: {}", e)))?;

        timer.observe_duration();

        Ok(record)
    }

    /// List counterparties, optionally by kind, ordered by name.
    #[instrument(skip(self))]
    pub async fn list_name_addresses(
        &self,
        kind: Option<NameKind>,
    ) -> Result<Vec<NameAddress>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_name_addresses"])
            .start_timer();

        let records = sqlx::query_as::<_, NameAddress>(
            r#"
            SELECT name_address_id, kind, name, address, contact, created_utc
            FROM name_addresses
            WHERE ($1::text IS NULL OR kind = $1)
            ORDER BY name
            "#,
        )
        .bind(kind.map(|k| k.as_str()))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to list counterparties: {}", e))
        })?;

        timer.observe_duration();

        Ok(records)
    }

    /// "Other" counterparties whose name is alphabetically at or before the
    /// payee and shares its prefix, nearest first. Used by the match
    /// resolver's fuzzy name guess.
    #[instrument(skip(self), fields(payee = %payee))]
    pub async fn find_other_names_before(
        &self,
        prefix: &str,
        payee: &str,
    ) -> Result<Vec<NameAddress>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["find_other_names_before"])
            .start_timer();

        let like = format!(
            "{}%",
            prefix.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_")
        );

        let records = sqlx::query_as::<_, NameAddress>(
            r#"
            SELECT name_address_id, kind, name, address, contact, created_utc
            FROM name_addresses
            WHERE kind = 'other' AND name <= $1 AND name ILIKE $2
            ORDER BY name DESC
            "#,
        )
        .bind(payee)
        .bind(like)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to search names: {}", e)))?;

        timer.observe_duration();

        Ok(records)
    }

    /// Get-or-create a counterparty by `(kind, name)` inside the caller's
    /// transaction.
    pub async fn ensure_name_address(
        conn: &mut PgConnection,
        kind: NameKind,
        name: &str,
    ) -> Result<i64, AppError> {
        let existing: Option<i64> = sqlx::query_scalar(
            "SELECT name_address_id FROM name_addresses WHERE kind = $1 AND name = $2",
        )
        .bind(kind.as_str())
        .bind(name)
        .fetch_optional(&mut *conn)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to look up name: {}", e)))?;

        if let Some(id) = existing {
            return Ok(id);
        }

        let id: i64 = sqlx::query_scalar(
            "INSERT INTO name_addresses (kind, name) VALUES ($1, $2) RETURNING name_address_id",
        )
        .bind(kind.as_str())
        .bind(name)
        .fetch_one(conn)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to create name: {}", e)))?;

        Ok(id)
    }

    // -------------------------------------------------------------------------
    // Document / Journal Operations
    // -------------------------------------------------------------------------

    /// Get a document header row.
    #[instrument(skip(self), fields(document_id = %document_id))]
    pub async fn get_document(&self, document_id: i64) -> Result<Option<Document>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_document"])
            .start_timer();

        let document = Self::get_document_on(&self.pool, document_id).await?;

        timer.observe_duration();

        Ok(document)
    }

    pub(crate) async fn get_document_on<'e, E>(
        executor: E,
        document_id: i64,
    ) -> Result<Option<Document>, AppError>
    where
        E: sqlx::PgExecutor<'e>,
    {
        sqlx::query_as::<_, Document>(
            r#"
            SELECT document_id, document_type, document_date, identifier, memo, address, name_address_id, vat_return_id, created_utc, updated_utc
            FROM documents
            WHERE document_id = $1
            "#,
        )
        .bind(document_id)
        .fetch_optional(executor)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to get document: {}", e)))
    }

    /// List document headers, newest first, optionally filtered to a date
    /// range and to documents with a posting on an account.
    #[instrument(skip(self))]
    pub async fn list_documents(
        &self,
        account_id: Option<i64>,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
    ) -> Result<Vec<Document>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_documents"])
            .start_timer();

        let documents = sqlx::query_as::<_, Document>(
            r#"
            SELECT d.document_id, d.document_type, d.document_date, d.identifier, d.memo, d.address, d.name_address_id, d.vat_return_id, d.created_utc, d.updated_utc
            FROM documents d
            WHERE ($1::BIGINT IS NULL OR EXISTS (
                      SELECT 1 FROM journals j
                      WHERE j.document_id = d.document_id AND j.account_id = $1))
              AND ($2::DATE IS NULL OR d.document_date >= $2)
              AND ($3::DATE IS NULL OR d.document_date <= $3)
            ORDER BY d.document_date DESC, d.document_id DESC
            "#,
        )
        .bind(account_id)
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to list documents: {}", e))
        })?;

        timer.observe_duration();

        Ok(documents)
    }

    /// All journals for a document in `journal_num` order.
    pub(crate) async fn journals_for_document<'e, E>(
        executor: E,
        document_id: i64,
    ) -> Result<Vec<Journal>, AppError>
    where
        E: sqlx::PgExecutor<'e>,
    {
        sqlx::query_as::<_, Journal>(
            r#"
            SELECT journal_id, document_id, journal_num, account_id, amount, outstanding, name_address_id, memo, cleared
            FROM journals
            WHERE document_id = $1
            ORDER BY journal_num
            "#,
        )
        .bind(document_id)
        .fetch_all(executor)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to get journals: {}", e)))
    }

    /// Line extensions for a document's journals, keyed by journal id.
    pub(crate) async fn lines_for_document<'e, E>(
        executor: E,
        document_id: i64,
    ) -> Result<Vec<Line>, AppError>
    where
        E: sqlx::PgExecutor<'e>,
    {
        sqlx::query_as::<_, Line>(
            r#"
            SELECT l.journal_id, l.quantity, l.product, l.vat_code, l.vat_rate, l.vat_amount, l.net_amount
            FROM lines l
            INNER JOIN journals j ON j.journal_id = l.journal_id
            WHERE j.document_id = $1
            ORDER BY j.journal_num
            "#,
        )
        .bind(document_id)
        .fetch_all(executor)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to get lines: {}", e)))
    }

    /// Get a single journal row.
    #[instrument(skip(self), fields(journal_id = %journal_id))]
    pub async fn get_journal(&self, journal_id: i64) -> Result<Option<Journal>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_journal"])
            .start_timer();

        let journal = sqlx::query_as::<_, Journal>(
            r#"
            SELECT journal_id, document_id, journal_num, account_id, amount, outstanding, name_address_id, memo, cleared
            FROM journals
            WHERE journal_id = $1
            "#,
        )
        .bind(journal_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to get journal: {}", e)))?;

        timer.observe_duration();

        Ok(journal)
    }

    /// Postings to an account that are unreconciled or finally cleared,
    /// joined with their document and counterparty, newest first.
    #[instrument(skip(self), fields(account_id = %account_id))]
    pub async fn postings_for_matching(
        &self,
        account_id: i64,
    ) -> Result<Vec<MatchablePosting>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["postings_for_matching"])
            .start_timer();

        let postings = sqlx::query_as::<_, MatchablePosting>(
            r#"
            SELECT j.journal_id, j.document_id, j.amount, j.memo, j.cleared, j.name_address_id,
                   d.document_type, d.document_date, d.identifier,
                   n.name AS counterparty
            FROM journals j
            INNER JOIN documents d ON d.document_id = j.document_id
            INNER JOIN name_addresses n ON n.name_address_id = j.name_address_id
            WHERE j.account_id = $1 AND j.cleared IN ('', 'X')
            ORDER BY d.document_date DESC, j.journal_id DESC
            "#,
        )
        .bind(account_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to fetch postings: {}", e)))?;

        timer.observe_duration();

        Ok(postings)
    }

    /// Stamp a clearing mark on a journal inside the caller's transaction.
    pub async fn set_cleared(
        conn: &mut PgConnection,
        journal_id: i64,
        mark: &str,
    ) -> Result<(), AppError> {
        let result = sqlx::query("UPDATE journals SET cleared = $2 WHERE journal_id = $1")
            .bind(journal_id)
            .bind(mark)
            .execute(conn)
            .await
            .map_err(|e| {
                AppError::DatabaseError(anyhow::anyhow!("Failed to set clearing mark: {}", e))
            })?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(anyhow::anyhow!(
                "Journal {} not found",
                journal_id
            )));
        }

        Ok(())
    }

    // -------------------------------------------------------------------------
    // Audit Operations
    // -------------------------------------------------------------------------

    /// Append one audit row inside the caller's transaction.
    pub async fn insert_audit(
        conn: &mut PgConnection,
        table_name: &str,
        record_id: i64,
        kind: &str,
        at: DateTime<Utc>,
        user_name: &str,
        body: &serde_json::Value,
    ) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO audit_trail (table_name, record_id, kind, at, user_name, body)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(table_name)
        .bind(record_id)
        .bind(kind)
        .bind(at)
        .bind(user_name)
        .bind(body)
        .execute(conn)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to write audit row: {}", e)))?;

        Ok(())
    }

    /// Query the audit trail by table, record and time range.
    #[instrument(skip(self))]
    pub async fn query_audit(
        &self,
        table_name: &str,
        record_id: i64,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> Result<Vec<AuditRecord>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["query_audit"])
            .start_timer();

        let records = sqlx::query_as::<_, AuditRecord>(
            r#"
            SELECT audit_id, table_name, record_id, kind, at, user_name, body
            FROM audit_trail
            WHERE table_name = $1 AND record_id = $2
              AND ($3::timestamptz IS NULL OR at >= $3)
              AND ($4::timestamptz IS NULL OR at <= $4)
            ORDER BY at, audit_id
            "#,
        )
        .bind(table_name)
        .bind(record_id)
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to query audit: {}", e)))?;

        timer.observe_duration();

        Ok(records)
    }

    /// Count of audit rows for a record, used by idempotence checks.
    #[instrument(skip(self))]
    pub async fn audit_count(&self, table_name: &str, record_id: i64) -> Result<i64, AppError> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM audit_trail WHERE table_name = $1 AND record_id = $2",
        )
        .bind(table_name)
        .bind(record_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to count audit rows: {}", e)))?;

        Ok(count)
    }

    // -------------------------------------------------------------------------
    // Statement Format Operations
    // -------------------------------------------------------------------------

    /// Get the persisted statement parse template for an account.
    #[instrument(skip(self), fields(account_id = %account_id))]
    pub async fn get_statement_format(&self, account_id: i64) -> Result<Option<String>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_statement_format"])
            .start_timer();

        let template: Option<String> =
            sqlx::query_scalar("SELECT template FROM statement_formats WHERE account_id = $1")
                .bind(account_id)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| {
                    AppError::DatabaseError(anyhow::anyhow!("Failed to get format: {}", e))
                })?;

        timer.observe_duration();

        Ok(template)
    }

    /// Store (or replace) the statement parse template for an account.
    #[instrument(skip(self, template), fields(account_id = %account_id))]
    pub async fn put_statement_format(
        &self,
        account_id: i64,
        template: &str,
    ) -> Result<(), AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["put_statement_format"])
            .start_timer();

        sqlx::query(
            r#"
            INSERT INTO statement_formats (account_id, template)
            VALUES ($1, $2)
            ON CONFLICT (account_id) DO UPDATE SET template = EXCLUDED.template
            "#,
        )
        .bind(account_id)
        .bind(template)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to store format: {}", e)))?;

        timer.observe_duration();

        Ok(())
    }
}

/// Row shape returned by [`Database::postings_for_matching`].
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct MatchablePosting {
    pub journal_id: i64,
    pub document_id: i64,
    pub amount: rust_decimal::Decimal,
    pub memo: String,
    pub cleared: String,
    pub name_address_id: i64,
    pub document_type: String,
    pub document_date: chrono::NaiveDate,
    pub identifier: String,
    pub counterparty: String,
}
