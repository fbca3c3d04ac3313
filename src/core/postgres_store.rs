//! PostgreSQL Account Store
//!
//! Row locks are real database row locks (`SELECT ... FOR UPDATE`) held by a
//! `sqlx::Transaction` until it commits or rolls back. Dropping an
//! uncommitted `sqlx::Transaction` rolls it back, which gives the same
//! drop-is-rollback behavior as the in-memory store.
//!
//! Lock waits are bounded only by the server (`lock_timeout`), never here.

use super::traits::{AccountStore, StoreTransaction};
use crate::types::{
    Account, AccountId, MethodDetail, PixKeyType, WithdrawError, Withdrawal, WithdrawalId,
    WithdrawalView,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::{Postgres, Row};
use std::collections::HashSet;

const SCHEMA: [&str; 5] = [
    r#"
    CREATE TABLE IF NOT EXISTS account (
        id UUID PRIMARY KEY,
        tax_id TEXT NOT NULL UNIQUE,
        name TEXT NOT NULL,
        balance NUMERIC(15, 2) NOT NULL DEFAULT 0,
        locked BOOLEAN NOT NULL DEFAULT FALSE,
        locked_at TIMESTAMPTZ,
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        CHECK (locked = (locked_at IS NOT NULL))
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS account_withdraw (
        id UUID PRIMARY KEY,
        account_id UUID NOT NULL REFERENCES account(id),
        method TEXT NOT NULL,
        amount NUMERIC(15, 2) NOT NULL CHECK (amount > 0),
        scheduled BOOLEAN NOT NULL DEFAULT FALSE,
        scheduled_for TIMESTAMPTZ,
        done BOOLEAN NOT NULL DEFAULT FALSE,
        error BOOLEAN NOT NULL DEFAULT FALSE,
        error_reason TEXT,
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        CHECK (scheduled = (scheduled_for IS NOT NULL))
    )
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS idx_account_withdraw_due
    ON account_withdraw(scheduled_for)
    WHERE scheduled AND NOT done AND NOT error
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS idx_account_withdraw_account
    ON account_withdraw(account_id)
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS account_withdraw_pix (
        id UUID PRIMARY KEY,
        account_withdraw_id UUID NOT NULL UNIQUE REFERENCES account_withdraw(id),
        "type" TEXT NOT NULL,
        "key" TEXT NOT NULL
    )
    "#,
];

const ACCOUNT_COLUMNS: &str =
    "id, tax_id, name, balance, locked, locked_at, created_at, updated_at";

const VIEW_SELECT: &str = r#"
    SELECT w.id, w.account_id, w.method, w.amount, w.scheduled, w.scheduled_for,
           w.done, w.error, w.error_reason, w.created_at, w.updated_at,
           p.id AS pix_id, p."type" AS pix_type, p."key" AS pix_key,
           a.id AS account_id_ref, a.tax_id AS account_tax_id, a.name AS account_name,
           a.balance AS account_balance, a.locked AS account_locked,
           a.locked_at AS account_locked_at, a.created_at AS account_created_at,
           a.updated_at AS account_updated_at
    FROM account_withdraw w
    JOIN account a ON a.id = w.account_id
    LEFT JOIN account_withdraw_pix p ON p.account_withdraw_id = w.id
"#;

fn account_from_row(row: &PgRow) -> Result<Account, WithdrawError> {
    Ok(Account {
        id: row.try_get("id")?,
        tax_id: row.try_get("tax_id")?,
        name: row.try_get("name")?,
        balance: row.try_get("balance")?,
        locked: row.try_get("locked")?,
        locked_at: row.try_get("locked_at")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn withdrawal_from_row(row: &PgRow) -> Result<Withdrawal, WithdrawError> {
    Ok(Withdrawal {
        id: row.try_get("id")?,
        account_id: row.try_get("account_id")?,
        method: row.try_get("method")?,
        amount: row.try_get("amount")?,
        scheduled: row.try_get("scheduled")?,
        scheduled_for: row.try_get("scheduled_for")?,
        done: row.try_get("done")?,
        error: row.try_get("error")?,
        error_reason: row.try_get("error_reason")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn detail_from_row(row: &PgRow, withdrawal_id: WithdrawalId) -> Result<Option<MethodDetail>, WithdrawError> {
    let Some(id) = row.try_get::<Option<uuid::Uuid>, _>("pix_id")? else {
        return Ok(None);
    };
    let raw_type: String = row.try_get("pix_type")?;
    let key_type: PixKeyType = raw_type
        .parse()
        .map_err(|_| WithdrawError::storage(format!("unknown PIX key type '{}' in storage", raw_type)))?;

    Ok(Some(MethodDetail {
        id,
        withdrawal_id,
        key_type,
        key: row.try_get("pix_key")?,
    }))
}

fn view_from_row(row: &PgRow) -> Result<WithdrawalView, WithdrawError> {
    let withdrawal = withdrawal_from_row(row)?;
    let detail = detail_from_row(row, withdrawal.id)?;
    let account = Account {
        id: row.try_get("account_id_ref")?,
        tax_id: row.try_get("account_tax_id")?,
        name: row.try_get("account_name")?,
        balance: row.try_get("account_balance")?,
        locked: row.try_get("account_locked")?,
        locked_at: row.try_get("account_locked_at")?,
        created_at: row.try_get("account_created_at")?,
        updated_at: row.try_get("account_updated_at")?,
    };
    Ok(WithdrawalView {
        withdrawal,
        detail,
        account,
    })
}

#[derive(Debug, Clone)]
pub struct PostgresAccountStore {
    pool: PgPool,
}

impl PostgresAccountStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect with a pool of at most `max_connections`
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self, WithdrawError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await?;
        Ok(Self::new(pool))
    }

    /// Create tables and indexes when missing
    pub async fn migrate(&self) -> Result<(), WithdrawError> {
        let mut tx = self.pool.begin().await?;
        for statement in SCHEMA {
            sqlx::query(statement).execute(&mut *tx).await?;
        }
        tx.commit().await?;
        Ok(())
    }
}

#[async_trait]
impl AccountStore for PostgresAccountStore {
    async fn begin(&self) -> Result<Box<dyn StoreTransaction>, WithdrawError> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PostgresTransaction {
            tx,
            locked: HashSet::new(),
        }))
    }

    async fn find_due_scheduled(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<WithdrawalView>, WithdrawError> {
        let query = format!(
            "{} WHERE w.scheduled AND NOT w.done AND NOT w.error AND w.scheduled_for <= $1 \
             ORDER BY w.scheduled_for, w.id",
            VIEW_SELECT
        );
        let rows = sqlx::query(&query).bind(now).fetch_all(&self.pool).await?;
        rows.iter().map(view_from_row).collect()
    }

    async fn find_account(&self, id: AccountId) -> Result<Option<Account>, WithdrawError> {
        let query = format!("SELECT {} FROM account WHERE id = $1", ACCOUNT_COLUMNS);
        let row = sqlx::query(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(account_from_row).transpose()
    }

    async fn find_withdrawal(
        &self,
        id: WithdrawalId,
    ) -> Result<Option<WithdrawalView>, WithdrawError> {
        let query = format!("{} WHERE w.id = $1", VIEW_SELECT);
        let row = sqlx::query(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(view_from_row).transpose()
    }

    async fn insert_account(&self, account: &Account) -> Result<(), WithdrawError> {
        sqlx::query(
            r#"
            INSERT INTO account (id, tax_id, name, balance, locked, locked_at, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(account.id)
        .bind(&account.tax_id)
        .bind(&account.name)
        .bind(account.balance)
        .bind(account.locked)
        .bind(account.locked_at)
        .bind(account.created_at)
        .bind(account.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_accounts(&self) -> Result<Vec<Account>, WithdrawError> {
        let query = format!("SELECT {} FROM account ORDER BY id", ACCOUNT_COLUMNS);
        let rows = sqlx::query(&query).fetch_all(&self.pool).await?;
        rows.iter().map(account_from_row).collect()
    }
}

pub struct PostgresTransaction {
    tx: sqlx::Transaction<'static, Postgres>,
    /// Accounts whose row lock this transaction holds
    locked: HashSet<AccountId>,
}

#[async_trait]
impl StoreTransaction for PostgresTransaction {
    async fn get_for_update(&mut self, id: AccountId) -> Result<Account, WithdrawError> {
        let query = format!("SELECT {} FROM account WHERE id = $1 FOR UPDATE", ACCOUNT_COLUMNS);
        let row = sqlx::query(&query)
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await?
            .ok_or_else(|| WithdrawError::account_not_found(id))?;

        self.locked.insert(id);
        account_from_row(&row)
    }

    async fn save_account(&mut self, account: &Account) -> Result<(), WithdrawError> {
        if !self.locked.contains(&account.id) {
            return Err(WithdrawError::storage(format!(
                "account {} saved without holding its row lock",
                account.id
            )));
        }

        sqlx::query(
            r#"
            UPDATE account
            SET balance = $2, locked = $3, locked_at = $4, updated_at = $5
            WHERE id = $1
            "#,
        )
        .bind(account.id)
        .bind(account.balance)
        .bind(account.locked)
        .bind(account.locked_at)
        .bind(account.updated_at)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn create_withdrawal(&mut self, withdrawal: &Withdrawal) -> Result<(), WithdrawError> {
        sqlx::query(
            r#"
            INSERT INTO account_withdraw
                (id, account_id, method, amount, scheduled, scheduled_for,
                 done, error, error_reason, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(withdrawal.id)
        .bind(withdrawal.account_id)
        .bind(&withdrawal.method)
        .bind(withdrawal.amount)
        .bind(withdrawal.scheduled)
        .bind(withdrawal.scheduled_for)
        .bind(withdrawal.done)
        .bind(withdrawal.error)
        .bind(&withdrawal.error_reason)
        .bind(withdrawal.created_at)
        .bind(withdrawal.updated_at)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn update_withdrawal(&mut self, withdrawal: &Withdrawal) -> Result<(), WithdrawError> {
        let result = sqlx::query(
            r#"
            UPDATE account_withdraw
            SET done = $2, error = $3, error_reason = $4, updated_at = $5
            WHERE id = $1 AND account_id = $6 AND amount = $7
              AND NOT done AND NOT error
            "#,
        )
        .bind(withdrawal.id)
        .bind(withdrawal.done)
        .bind(withdrawal.error)
        .bind(&withdrawal.error_reason)
        .bind(withdrawal.updated_at)
        .bind(withdrawal.account_id)
        .bind(withdrawal.amount)
        .execute(&mut *self.tx)
        .await?;

        if result.rows_affected() == 1 {
            return Ok(());
        }

        match self.get_withdrawal(withdrawal.id).await? {
            Some((current, _)) if current.is_terminal() => {
                Err(WithdrawError::WithdrawalFinalized { id: withdrawal.id })
            }
            Some(_) => Err(WithdrawError::storage(format!(
                "withdrawal {} account and amount are immutable",
                withdrawal.id
            ))),
            None => Err(WithdrawError::storage(format!(
                "withdrawal {} does not exist",
                withdrawal.id
            ))),
        }
    }

    async fn get_withdrawal(
        &mut self,
        id: WithdrawalId,
    ) -> Result<Option<(Withdrawal, Option<MethodDetail>)>, WithdrawError> {
        let row = sqlx::query(
            r#"
            SELECT w.id, w.account_id, w.method, w.amount, w.scheduled, w.scheduled_for,
                   w.done, w.error, w.error_reason, w.created_at, w.updated_at,
                   p.id AS pix_id, p."type" AS pix_type, p."key" AS pix_key
            FROM account_withdraw w
            LEFT JOIN account_withdraw_pix p ON p.account_withdraw_id = w.id
            WHERE w.id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&mut *self.tx)
        .await?;

        match row {
            Some(row) => {
                let withdrawal = withdrawal_from_row(&row)?;
                let detail = detail_from_row(&row, withdrawal.id)?;
                Ok(Some((withdrawal, detail)))
            }
            None => Ok(None),
        }
    }

    async fn create_method_detail(&mut self, detail: &MethodDetail) -> Result<(), WithdrawError> {
        sqlx::query(
            r#"
            INSERT INTO account_withdraw_pix (id, account_withdraw_id, "type", "key")
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(detail.id)
        .bind(detail.withdrawal_id)
        .bind(detail.key_type.as_str())
        .bind(&detail.key)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), WithdrawError> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), WithdrawError> {
        self.tx.rollback().await?;
        Ok(())
    }
}
