//! # Account Repository
//!
//! Chart-of-accounts lookups used to label funding sources.
//!
//! Accounts belong to an owner; an account without an organization is
//! shared by all of that owner's organizations.

use chrono::Utc;
use sqlx::SqlitePool;
use std::collections::HashMap;
use tracing::debug;

use crate::error::DbResult;
use remedy_core::{Account, AccountType, FundingScope};

#[derive(Debug, sqlx::FromRow)]
struct AccountRow {
    id: String,
    code: String,
    name: String,
    account_type: AccountType,
    owner_id: String,
    organization_id: Option<String>,
}

impl From<AccountRow> for Account {
    fn from(row: AccountRow) -> Self {
        Account {
            id: row.id,
            code: row.code,
            name: row.name,
            account_type: row.account_type,
            owner_id: row.owner_id,
            organization_id: row.organization_id,
        }
    }
}

/// Repository for accounts.
#[derive(Debug, Clone)]
pub struct AccountRepository {
    pool: SqlitePool,
}

impl AccountRepository {
    pub fn new(pool: SqlitePool) -> Self {
        AccountRepository { pool }
    }

    /// Inserts an account.
    ///
    /// ## Errors
    /// `DbError::UniqueViolation` if the owner already has an account with
    /// the same code.
    pub async fn insert(&self, account: &Account) -> DbResult<()> {
        debug!(id = %account.id, code = %account.code, "Inserting account");

        sqlx::query(
            r#"
            INSERT INTO accounts (id, owner_id, organization_id, code, name, account_type, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
        )
        .bind(&account.id)
        .bind(&account.owner_id)
        .bind(account.organization_id.as_deref())
        .bind(&account.code)
        .bind(&account.name)
        .bind(account.account_type)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Account>> {
        let row: Option<AccountRow> = sqlx::query_as(
            r#"
            SELECT id, code, name, account_type, owner_id, organization_id
            FROM accounts
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Account::from))
    }

    /// Accounts visible in `scope`, keyed by id.
    pub async fn list_in_scope(&self, scope: &FundingScope) -> DbResult<HashMap<String, Account>> {
        let rows: Vec<AccountRow> = sqlx::query_as(
            r#"
            SELECT id, code, name, account_type, owner_id, organization_id
            FROM accounts
            WHERE owner_id = ?1
              AND (?2 IS NULL OR organization_id IS NULL OR organization_id = ?2)
            ORDER BY code
            "#,
        )
        .bind(&scope.owner_id)
        .bind(scope.organization_id.as_deref())
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| (row.id.clone(), Account::from(row)))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DbError;
    use crate::pool::{Database, DbConfig};

    fn account(id: &str, code: &str, organization_id: Option<&str>) -> Account {
        Account {
            id: id.into(),
            code: code.into(),
            name: format!("Account {}", code),
            account_type: AccountType::Asset,
            owner_id: "owner-1".into(),
            organization_id: organization_id.map(String::from),
        }
    }

    #[tokio::test]
    async fn test_insert_and_get() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let repo = db.accounts();

        let cash = account("acct-cash", "1101", None);
        repo.insert(&cash).await.unwrap();

        assert_eq!(repo.get_by_id("acct-cash").await.unwrap(), Some(cash));
        assert_eq!(repo.get_by_id("acct-missing").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_duplicate_code_is_rejected() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let repo = db.accounts();

        repo.insert(&account("a", "1101", None)).await.unwrap();
        let err = repo.insert(&account("b", "1101", None)).await.unwrap_err();
        assert!(matches!(err, DbError::UniqueViolation { .. }));
    }

    #[tokio::test]
    async fn test_list_in_scope_includes_shared_accounts() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let repo = db.accounts();

        repo.insert(&account("shared", "1101", None)).await.unwrap();
        repo.insert(&account("org-1-bank", "1102", Some("org-1"))).await.unwrap();
        repo.insert(&account("org-2-bank", "1103", Some("org-2"))).await.unwrap();

        let org_1 = repo
            .list_in_scope(&FundingScope::new("owner-1").with_organization("org-1"))
            .await
            .unwrap();
        assert_eq!(org_1.len(), 2);
        assert!(org_1.contains_key("shared"));
        assert!(org_1.contains_key("org-1-bank"));

        let everything = repo.list_in_scope(&FundingScope::new("owner-1")).await.unwrap();
        assert_eq!(everything.len(), 3);

        let stranger = repo.list_in_scope(&FundingScope::new("owner-2")).await.unwrap();
        assert!(stranger.is_empty());
    }
}
