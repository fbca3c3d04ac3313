//! Account Store contract
//!
//! The store exposes two layers:
//!
//! - [`AccountStore`]: non-locking reads, provisioning, the due-withdrawal
//!   query, and [`AccountStore::begin`] which opens a transaction.
//! - [`StoreTransaction`]: everything that must happen inside a transaction,
//!   including the blocking row lock taken by
//!   [`StoreTransaction::get_for_update`].
//!
//! # Transaction scope
//!
//! A `StoreTransaction` is a scope guard. [`StoreTransaction::commit`] makes
//! its writes visible; [`StoreTransaction::rollback`] or simply dropping it
//! discards them. Either way every row lock it holds is released when the
//! transaction ends, so no exit path (including `?` and panics) can leave a
//! row locked.

use crate::types::{
    Account, AccountId, MethodDetail, WithdrawError, Withdrawal, WithdrawalId, WithdrawalView,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Durable storage for accounts and withdrawal records
#[async_trait]
pub trait AccountStore: Send + Sync {
    /// Open a transaction
    async fn begin(&self) -> Result<Box<dyn StoreTransaction>, WithdrawError>;

    /// Scheduled, pending withdrawals with `scheduled_for <= now`, each
    /// joined with its account and method detail, oldest schedule first
    async fn find_due_scheduled(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<WithdrawalView>, WithdrawError>;

    /// Committed state of an account, without locking it
    async fn find_account(&self, id: AccountId) -> Result<Option<Account>, WithdrawError>;

    /// Committed state of a withdrawal with its detail and account
    async fn find_withdrawal(
        &self,
        id: WithdrawalId,
    ) -> Result<Option<WithdrawalView>, WithdrawError>;

    /// Provision a new account
    async fn insert_account(&self, account: &Account) -> Result<(), WithdrawError>;

    /// All accounts, ordered by id
    async fn list_accounts(&self) -> Result<Vec<Account>, WithdrawError>;
}

/// Operations scoped to one open transaction
#[async_trait]
pub trait StoreTransaction: Send {
    /// Exclusive row lock on the account, held until the transaction ends.
    ///
    /// Waits for as long as another transaction holds the same row; there is
    /// no timeout at this layer.
    async fn get_for_update(&mut self, id: AccountId) -> Result<Account, WithdrawError>;

    /// Persist an account whose row lock this transaction holds
    async fn save_account(&mut self, account: &Account) -> Result<(), WithdrawError>;

    async fn create_withdrawal(&mut self, withdrawal: &Withdrawal) -> Result<(), WithdrawError>;

    /// Persist a state change. Fails with `WithdrawalFinalized` when the
    /// stored record is already terminal.
    async fn update_withdrawal(&mut self, withdrawal: &Withdrawal) -> Result<(), WithdrawError>;

    /// A withdrawal and its detail as seen by this transaction
    async fn get_withdrawal(
        &mut self,
        id: WithdrawalId,
    ) -> Result<Option<(Withdrawal, Option<MethodDetail>)>, WithdrawError>;

    async fn create_method_detail(&mut self, detail: &MethodDetail) -> Result<(), WithdrawError>;

    async fn commit(self: Box<Self>) -> Result<(), WithdrawError>;

    async fn rollback(self: Box<Self>) -> Result<(), WithdrawError>;
}
