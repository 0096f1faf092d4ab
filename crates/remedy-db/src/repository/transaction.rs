//! # Ledger Transaction Repository
//!
//! Scoped reads of ledger transactions and the write paths that touch them.
//!
//! ## Transaction Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  1. INSERT DRAFT                                                        │
//! │     └── insert_draft() → status 'draft', total = Σ debits, version 0   │
//! │                                                                         │
//! │  2. ALLOCATE (any number of times while draft)                          │
//! │     └── begin_write()                                                   │
//! │         ├── claim_draft()   UPDATE … version+1 WHERE status='draft'    │
//! │         │                   (takes the SQLite write lock first)        │
//! │         ├── get_scoped() / referencing() / funding_edges()             │
//! │         ├── update_funding()                                           │
//! │         └── commit()                                                    │
//! │                                                                         │
//! │  3. CONFIRM                                                             │
//! │     └── confirm() → 'confirmed', only from the version that was checked│
//! │                                                                         │
//! │  4. (OPTIONAL) CANCEL                                                   │
//! │     └── cancel() → 'cancelled', no longer counted as usage             │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every read is filtered by the caller's [`FundingScope`]: a transaction of
//! another owner (or, when the scope names one, another organization) is
//! indistinguishable from a missing one.

use chrono::{DateTime, NaiveDate, Utc};
use sqlx::sqlite::{Sqlite, SqliteConnection};
use sqlx::{QueryBuilder, SqlitePool, Transaction};
use std::collections::HashMap;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use remedy_core::funding::UsageLine;
use remedy_core::{DateRange, FundingScope, LedgerEntry, LedgerTransaction, Money, TransactionStatus};

/// Bound parameters per `IN (…)` list when loading entries.
const ENTRY_BATCH: usize = 500;

// =============================================================================
// Row Types
// =============================================================================

#[derive(Debug, sqlx::FromRow)]
struct TransactionRow {
    id: String,
    group_number: String,
    description: String,
    transaction_date: DateTime<Utc>,
    status: TransactionStatus,
    total_cents: i64,
    created_by: String,
    organization_id: Option<String>,
    version: i64,
}

impl TransactionRow {
    fn into_transaction(self, entries: Vec<LedgerEntry>) -> LedgerTransaction {
        LedgerTransaction {
            id: self.id,
            group_number: self.group_number,
            description: self.description,
            transaction_date: self.transaction_date,
            status: self.status,
            total_amount: Money::from_cents(self.total_cents),
            created_by: self.created_by,
            organization_id: self.organization_id,
            entries,
            version: self.version,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct EntryRow {
    transaction_id: String,
    account_id: String,
    debit_cents: i64,
    credit_cents: i64,
    source_transaction_id: Option<String>,
    funding_path: String,
}

impl EntryRow {
    fn into_entry(self) -> DbResult<LedgerEntry> {
        Ok(LedgerEntry {
            account_id: self.account_id,
            debit_amount: Money::from_cents(self.debit_cents),
            credit_amount: Money::from_cents(self.credit_cents),
            source_transaction_id: self.source_transaction_id,
            funding_path: serde_json::from_str(&self.funding_path)?,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct UsageLineRow {
    source_transaction_id: String,
    transaction_id: String,
    line_no: i64,
    debit_cents: i64,
    credit_cents: i64,
}

/// What happened when an allocation tried to claim its target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DraftClaim {
    /// The draft is ours until commit or rollback.
    Claimed,
    /// No such transaction within scope.
    Missing,
    /// The transaction exists but is no longer a draft.
    NotDraft(TransactionStatus),
}

/// Generates a new transaction ID.
pub fn new_transaction_id() -> String {
    Uuid::new_v4().to_string()
}

// =============================================================================
// Repository
// =============================================================================

/// Repository for ledger transactions.
#[derive(Debug, Clone)]
pub struct TransactionRepository {
    pool: SqlitePool,
}

impl TransactionRepository {
    pub fn new(pool: SqlitePool) -> Self {
        TransactionRepository { pool }
    }

    /// Gets a transaction (with entries) if it is visible in `scope`.
    pub async fn get_scoped(&self, id: &str, scope: &FundingScope) -> DbResult<Option<LedgerTransaction>> {
        let mut conn = self.pool.acquire().await?;
        select_scoped(&mut conn, id, scope).await
    }

    /// Non-cancelled transactions in scope with an entry drawing on `source_id`.
    pub async fn referencing(&self, source_id: &str, scope: &FundingScope) -> DbResult<Vec<LedgerTransaction>> {
        let mut conn = self.pool.acquire().await?;
        select_referencing(&mut conn, source_id, scope).await
    }

    /// Every funded entry of every non-cancelled transaction in scope, in one
    /// query. Feeds `UsageTally` for source listings and flow analysis.
    pub async fn usage_lines(&self, scope: &FundingScope) -> DbResult<Vec<UsageLine>> {
        let rows: Vec<UsageLineRow> = sqlx::query_as(
            r#"
            SELECT
                e.source_transaction_id,
                e.transaction_id,
                e.line_no,
                e.debit_cents,
                e.credit_cents
            FROM ledger_entries e
            JOIN ledger_transactions t ON t.id = e.transaction_id
            WHERE e.source_transaction_id IS NOT NULL
              AND t.status != 'cancelled'
              AND t.created_by = ?1
              AND (?2 IS NULL OR t.organization_id = ?2)
            ORDER BY e.transaction_id, e.line_no
            "#,
        )
        .bind(&scope.owner_id)
        .bind(scope.organization_id.as_deref())
        .fetch_all(&self.pool)
        .await?;

        debug!(lines = rows.len(), "Loaded usage lines");

        Ok(rows
            .into_iter()
            .map(|row| UsageLine {
                source_transaction_id: row.source_transaction_id,
                transaction_id: row.transaction_id,
                line_no: row.line_no as usize,
                debit_amount: Money::from_cents(row.debit_cents),
                credit_amount: Money::from_cents(row.credit_cents),
            })
            .collect())
    }

    /// Confirmed transactions in scope, newest first.
    ///
    /// ## Filters
    /// - `account_id`: only transactions with an entry on that account
    /// - `range`: only transactions dated inside it (inclusive)
    pub async fn confirmed(
        &self,
        scope: &FundingScope,
        account_id: Option<&str>,
        range: Option<&DateRange>,
    ) -> DbResult<Vec<LedgerTransaction>> {
        let mut conn = self.pool.acquire().await?;

        let rows: Vec<TransactionRow> = sqlx::query_as(
            r#"
            SELECT t.*
            FROM ledger_transactions t
            WHERE t.status = 'confirmed'
              AND t.created_by = ?1
              AND (?2 IS NULL OR t.organization_id = ?2)
              AND (?3 IS NULL OR EXISTS (
                    SELECT 1 FROM ledger_entries e
                    WHERE e.transaction_id = t.id AND e.account_id = ?3
              ))
            ORDER BY t.transaction_date DESC, t.group_number DESC
            "#,
        )
        .bind(&scope.owner_id)
        .bind(scope.organization_id.as_deref())
        .bind(account_id)
        .fetch_all(&mut *conn)
        .await?;

        // Compared as timestamps, not as stored text.
        let rows: Vec<TransactionRow> = rows
            .into_iter()
            .filter(|row| range.map_or(true, |r| r.contains(row.transaction_date)))
            .collect();

        with_entries(&mut conn, rows).await
    }

    /// `(transaction_id, source_transaction_id)` for every funded entry of a
    /// non-cancelled transaction in scope.
    pub async fn funding_edges(&self, scope: &FundingScope) -> DbResult<Vec<(String, String)>> {
        let mut conn = self.pool.acquire().await?;
        select_funding_edges(&mut conn, scope).await
    }

    /// Inserts `draft` as a new draft transaction.
    ///
    /// Status is forced to `draft`, `version` to 0 and `total_amount` to the
    /// sum of the debit entries. Returns the row as stored.
    ///
    /// Funding references are written as given, unchecked. Callers that take
    /// them from users go through [`LedgerWriteTx::insert_draft`] and check
    /// them before committing.
    pub async fn insert_draft(&self, draft: &LedgerTransaction) -> DbResult<LedgerTransaction> {
        let mut tx = self.pool.begin().await?;
        let stored = insert_draft_rows(&mut tx, draft).await?;

        tx.commit()
            .await
            .map_err(|e| DbError::TransactionFailed(e.to_string()))?;

        Ok(stored)
    }

    /// Marks a draft confirmed, provided it is still at `expected_version`.
    ///
    /// ## Errors
    /// `DbError::Conflict` if the row is gone from scope, is no longer a
    /// draft, or was written since the caller read it.
    pub async fn confirm(&self, id: &str, scope: &FundingScope, expected_version: i64) -> DbResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE ledger_transactions SET
                status = 'confirmed',
                version = version + 1,
                updated_at = ?4
            WHERE id = ?1
              AND created_by = ?2
              AND (?3 IS NULL OR organization_id = ?3)
              AND status = 'draft'
              AND version = ?5
            "#,
        )
        .bind(id)
        .bind(&scope.owner_id)
        .bind(scope.organization_id.as_deref())
        .bind(Utc::now())
        .bind(expected_version)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::Conflict(format!(
                "transaction {} changed before it could be confirmed",
                id
            )));
        }

        info!(id = %id, "Transaction confirmed");
        Ok(())
    }

    /// Cancels a transaction. Returns false if it was already cancelled or
    /// is not visible in scope.
    pub async fn cancel(&self, id: &str, scope: &FundingScope) -> DbResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE ledger_transactions SET
                status = 'cancelled',
                version = version + 1,
                updated_at = ?4
            WHERE id = ?1
              AND created_by = ?2
              AND (?3 IS NULL OR organization_id = ?3)
              AND status != 'cancelled'
            "#,
        )
        .bind(id)
        .bind(&scope.owner_id)
        .bind(scope.organization_id.as_deref())
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        let cancelled = result.rows_affected() > 0;
        if cancelled {
            info!(id = %id, "Transaction cancelled");
        }
        Ok(cancelled)
    }

    /// Next group number of `owner_id` for `date`: `YYYYMMDD` followed by a
    /// 3-digit daily sequence starting at `001`.
    ///
    /// ## Example
    /// `20260105001`, `20260105002`, …
    pub async fn next_group_number(&self, owner_id: &str, date: NaiveDate) -> DbResult<String> {
        let prefix = date.format("%Y%m%d").to_string();

        let last: Option<String> = sqlx::query_scalar(
            r#"
            SELECT MAX(group_number)
            FROM ledger_transactions
            WHERE created_by = ?1 AND group_number LIKE ?2
            "#,
        )
        .bind(owner_id)
        .bind(format!("{}%", prefix))
        .fetch_one(&self.pool)
        .await?;

        let sequence = match last {
            Some(number) => number
                .get(prefix.len()..)
                .and_then(|suffix| suffix.parse::<u32>().ok())
                .ok_or_else(|| DbError::Internal(format!("unparseable group number {}", number)))?
                + 1,
            None => 1,
        };

        Ok(format!("{}{:03}", prefix, sequence))
    }

    /// Opens a write transaction for an allocation or a funded draft.
    ///
    /// SQLite transactions begin deferred; the write lock is taken by the
    /// first statement, which is always [`LedgerWriteTx::claim_draft`] or
    /// [`LedgerWriteTx::insert_draft`].
    pub async fn begin_write(&self) -> DbResult<LedgerWriteTx> {
        let tx = self.pool.begin().await?;
        Ok(LedgerWriteTx { tx })
    }
}

// =============================================================================
// Write Transaction
// =============================================================================

/// One allocation's (or funded draft's) unit of work. Dropping it without
/// [`commit`] rolls back.
///
/// [`commit`]: LedgerWriteTx::commit
#[derive(Debug)]
pub struct LedgerWriteTx {
    tx: Transaction<'static, Sqlite>,
}

impl LedgerWriteTx {
    /// Bumps the target's version if it is a draft in scope.
    ///
    /// Runs as the first statement so the transaction holds the database
    /// write lock from here on: concurrent allocators queue behind it instead
    /// of both passing the sufficiency check.
    pub async fn claim_draft(&mut self, id: &str, scope: &FundingScope) -> DbResult<DraftClaim> {
        let result = sqlx::query(
            r#"
            UPDATE ledger_transactions SET
                version = version + 1,
                updated_at = ?4
            WHERE id = ?1
              AND created_by = ?2
              AND (?3 IS NULL OR organization_id = ?3)
              AND status = 'draft'
            "#,
        )
        .bind(id)
        .bind(&scope.owner_id)
        .bind(scope.organization_id.as_deref())
        .bind(Utc::now())
        .execute(&mut *self.tx)
        .await?;

        if result.rows_affected() > 0 {
            return Ok(DraftClaim::Claimed);
        }

        let status: Option<TransactionStatus> = sqlx::query_scalar(
            r#"
            SELECT status FROM ledger_transactions
            WHERE id = ?1 AND created_by = ?2 AND (?3 IS NULL OR organization_id = ?3)
            "#,
        )
        .bind(id)
        .bind(&scope.owner_id)
        .bind(scope.organization_id.as_deref())
        .fetch_optional(&mut *self.tx)
        .await?;

        Ok(match status {
            Some(status) => DraftClaim::NotDraft(status),
            None => DraftClaim::Missing,
        })
    }

    /// Inserts a new draft inside this transaction, as its first statement.
    ///
    /// Same normalisation as [`TransactionRepository::insert_draft`]; the
    /// caller checks the funding references before [`commit`].
    ///
    /// [`commit`]: LedgerWriteTx::commit
    pub async fn insert_draft(&mut self, draft: &LedgerTransaction) -> DbResult<LedgerTransaction> {
        insert_draft_rows(&mut self.tx, draft).await
    }

    pub async fn get_scoped(&mut self, id: &str, scope: &FundingScope) -> DbResult<Option<LedgerTransaction>> {
        select_scoped(&mut self.tx, id, scope).await
    }

    pub async fn referencing(&mut self, source_id: &str, scope: &FundingScope) -> DbResult<Vec<LedgerTransaction>> {
        select_referencing(&mut self.tx, source_id, scope).await
    }

    pub async fn funding_edges(&mut self, scope: &FundingScope) -> DbResult<Vec<(String, String)>> {
        select_funding_edges(&mut self.tx, scope).await
    }

    /// Writes back `source_transaction_id` and `funding_path` of every entry.
    pub async fn update_funding(&mut self, transaction: &LedgerTransaction) -> DbResult<()> {
        for (line_no, entry) in transaction.entries.iter().enumerate() {
            let result = sqlx::query(
                r#"
                UPDATE ledger_entries SET
                    source_transaction_id = ?3,
                    funding_path = ?4
                WHERE transaction_id = ?1 AND line_no = ?2
                "#,
            )
            .bind(&transaction.id)
            .bind(line_no as i64)
            .bind(entry.source_transaction_id.as_deref())
            .bind(serde_json::to_string(&entry.funding_path)?)
            .execute(&mut *self.tx)
            .await?;

            if result.rows_affected() == 0 {
                return Err(DbError::not_found(
                    "Ledger entry",
                    format!("{}#{}", transaction.id, line_no),
                ));
            }
        }

        debug!(id = %transaction.id, entries = transaction.entries.len(), "Funding references updated");
        Ok(())
    }

    pub async fn commit(self) -> DbResult<()> {
        self.tx.commit().await.map_err(|e| match DbError::from(e) {
            DbError::Conflict(message) => DbError::Conflict(message),
            other => DbError::TransactionFailed(other.to_string()),
        })
    }
}

// =============================================================================
// Shared Queries
// =============================================================================
// Used both on pooled connections and inside a LedgerWriteTx.

async fn insert_draft_rows(conn: &mut SqliteConnection, draft: &LedgerTransaction) -> DbResult<LedgerTransaction> {
    let now = Utc::now();
    let mut stored = draft.clone();
    stored.status = TransactionStatus::Draft;
    stored.version = 0;
    stored.total_amount = draft.debit_total();

    debug!(id = %stored.id, group_number = %stored.group_number, "Inserting draft transaction");

    sqlx::query(
        r#"
        INSERT INTO ledger_transactions (
            id, group_number, description, transaction_date,
            status, total_cents, created_by, organization_id,
            version, created_at, updated_at
        ) VALUES (
            ?1, ?2, ?3, ?4,
            'draft', ?5, ?6, ?7,
            0, ?8, ?8
        )
        "#,
    )
    .bind(&stored.id)
    .bind(&stored.group_number)
    .bind(&stored.description)
    .bind(stored.transaction_date)
    .bind(stored.total_amount.cents())
    .bind(&stored.created_by)
    .bind(stored.organization_id.as_deref())
    .bind(now)
    .execute(&mut *conn)
    .await?;

    for (line_no, entry) in stored.entries.iter().enumerate() {
        sqlx::query(
            r#"
            INSERT INTO ledger_entries (
                transaction_id, line_no, account_id,
                debit_cents, credit_cents,
                source_transaction_id, funding_path
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
        )
        .bind(&stored.id)
        .bind(line_no as i64)
        .bind(&entry.account_id)
        .bind(entry.debit_amount.cents())
        .bind(entry.credit_amount.cents())
        .bind(entry.source_transaction_id.as_deref())
        .bind(serde_json::to_string(&entry.funding_path)?)
        .execute(&mut *conn)
        .await?;
    }

    Ok(stored)
}

async fn select_scoped(
    conn: &mut SqliteConnection,
    id: &str,
    scope: &FundingScope,
) -> DbResult<Option<LedgerTransaction>> {
    let row: Option<TransactionRow> = sqlx::query_as(
        r#"
        SELECT t.*
        FROM ledger_transactions t
        WHERE t.id = ?1
          AND t.created_by = ?2
          AND (?3 IS NULL OR t.organization_id = ?3)
        "#,
    )
    .bind(id)
    .bind(&scope.owner_id)
    .bind(scope.organization_id.as_deref())
    .fetch_optional(&mut *conn)
    .await?;

    match row {
        Some(row) => Ok(with_entries(conn, vec![row]).await?.pop()),
        None => Ok(None),
    }
}

async fn select_referencing(
    conn: &mut SqliteConnection,
    source_id: &str,
    scope: &FundingScope,
) -> DbResult<Vec<LedgerTransaction>> {
    let rows: Vec<TransactionRow> = sqlx::query_as(
        r#"
        SELECT t.*
        FROM ledger_transactions t
        WHERE t.status != 'cancelled'
          AND t.created_by = ?2
          AND (?3 IS NULL OR t.organization_id = ?3)
          AND EXISTS (
                SELECT 1 FROM ledger_entries e
                WHERE e.transaction_id = t.id AND e.source_transaction_id = ?1
          )
        ORDER BY t.transaction_date DESC
        "#,
    )
    .bind(source_id)
    .bind(&scope.owner_id)
    .bind(scope.organization_id.as_deref())
    .fetch_all(&mut *conn)
    .await?;

    with_entries(conn, rows).await
}

async fn select_funding_edges(conn: &mut SqliteConnection, scope: &FundingScope) -> DbResult<Vec<(String, String)>> {
    let edges: Vec<(String, String)> = sqlx::query_as(
        r#"
        SELECT DISTINCT e.transaction_id, e.source_transaction_id
        FROM ledger_entries e
        JOIN ledger_transactions t ON t.id = e.transaction_id
        WHERE e.source_transaction_id IS NOT NULL
          AND t.status != 'cancelled'
          AND t.created_by = ?1
          AND (?2 IS NULL OR t.organization_id = ?2)
        "#,
    )
    .bind(&scope.owner_id)
    .bind(scope.organization_id.as_deref())
    .fetch_all(&mut *conn)
    .await?;

    Ok(edges)
}

/// Loads the entries of `rows` and assembles full transactions, keeping the
/// order of `rows`.
async fn with_entries(conn: &mut SqliteConnection, rows: Vec<TransactionRow>) -> DbResult<Vec<LedgerTransaction>> {
    let ids: Vec<&str> = rows.iter().map(|row| row.id.as_str()).collect();
    let mut entries: HashMap<String, Vec<LedgerEntry>> = HashMap::new();

    for chunk in ids.chunks(ENTRY_BATCH) {
        let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new(
            "SELECT transaction_id, account_id, debit_cents, credit_cents, \
             source_transaction_id, funding_path \
             FROM ledger_entries WHERE transaction_id IN (",
        );
        let mut separated = builder.separated(", ");
        for id in chunk {
            separated.push_bind(*id);
        }
        separated.push_unseparated(") ORDER BY transaction_id, line_no");

        let entry_rows: Vec<EntryRow> = builder.build_query_as().fetch_all(&mut *conn).await?;
        for row in entry_rows {
            entries
                .entry(row.transaction_id.clone())
                .or_default()
                .push(row.into_entry()?);
        }
    }

    Ok(rows
        .into_iter()
        .map(|row| {
            let own = entries.remove(&row.id).unwrap_or_default();
            row.into_transaction(own)
        })
        .collect())
}

// =============================================================================
// Unit Tests
// =============================================================================
