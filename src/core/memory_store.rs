//! In-process Account Store with real row locks
//!
//! # Design
//!
//! Committed state lives in `DashMap`s, like the rest of the engine's
//! concurrent state. Each account row additionally owns an async mutex that
//! plays the role of the database row lock:
//!
//! ```text
//! MemoryAccountStore
//!     └── Arc<Tables>
//!           ├── accounts     DashMap<AccountId, Account>
//!           ├── withdrawals  DashMap<WithdrawalId, Withdrawal>
//!           ├── details      DashMap<WithdrawalId, MethodDetail>
//!           ├── row_locks    DashMap<AccountId, Arc<Mutex<()>>>
//!           └── commit_gate  RwLock<()>
//! ```
//!
//! A [`MemoryTransaction`] keeps the owned guards of every row it locked and
//! stages its writes locally. `commit` applies the staged writes under the
//! commit gate (so non-locking readers never observe half a commit) and then
//! drops the guards. Dropping the transaction without committing discards
//! the staged writes and releases the rows, which is exactly a rollback.

use super::traits::{AccountStore, StoreTransaction};
use crate::types::{
    Account, AccountId, MethodDetail, WithdrawError, Withdrawal, WithdrawalId, WithdrawalView,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tokio::sync::{Mutex, OwnedMutexGuard};

#[derive(Debug, Default)]
struct Tables {
    accounts: DashMap<AccountId, Account>,
    withdrawals: DashMap<WithdrawalId, Withdrawal>,
    details: DashMap<WithdrawalId, MethodDetail>,
    row_locks: DashMap<AccountId, Arc<Mutex<()>>>,
    commit_gate: RwLock<()>,
}

impl Tables {
    fn row_lock(&self, id: AccountId) -> Arc<Mutex<()>> {
        Arc::clone(&self.row_locks.entry(id).or_default())
    }

    fn read_gate(&self) -> RwLockReadGuard<'_, ()> {
        self.commit_gate
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write_gate(&self) -> RwLockWriteGuard<'_, ()> {
        self.commit_gate
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn view(&self, withdrawal: Withdrawal) -> Option<WithdrawalView> {
        let account = self.accounts.get(&withdrawal.account_id)?.clone();
        let detail = self.details.get(&withdrawal.id).map(|d| d.clone());
        Some(WithdrawalView {
            withdrawal,
            detail,
            account,
        })
    }
}

/// Thread-safe in-memory Account Store
///
/// Cloning is cheap and every clone shares the same tables.
#[derive(Debug, Clone, Default)]
pub struct MemoryAccountStore {
    tables: Arc<Tables>,
}

impl MemoryAccountStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AccountStore for MemoryAccountStore {
    async fn begin(&self) -> Result<Box<dyn StoreTransaction>, WithdrawError> {
        Ok(Box::new(MemoryTransaction {
            tables: Arc::clone(&self.tables),
            row_guards: HashMap::new(),
            accounts: HashMap::new(),
            withdrawals: HashMap::new(),
            details: Vec::new(),
        }))
    }

    async fn find_due_scheduled(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<WithdrawalView>, WithdrawError> {
        let _gate = self.tables.read_gate();

        let mut due: Vec<WithdrawalView> = self
            .tables
            .withdrawals
            .iter()
            .filter(|entry| entry.value().is_due(now))
            .filter_map(|entry| self.tables.view(entry.value().clone()))
            .collect();

        due.sort_by_key(|view| (view.withdrawal.scheduled_for, view.withdrawal.id));
        Ok(due)
    }

    async fn find_account(&self, id: AccountId) -> Result<Option<Account>, WithdrawError> {
        let _gate = self.tables.read_gate();
        Ok(self.tables.accounts.get(&id).map(|account| account.clone()))
    }

    async fn find_withdrawal(
        &self,
        id: WithdrawalId,
    ) -> Result<Option<WithdrawalView>, WithdrawError> {
        let _gate = self.tables.read_gate();
        let withdrawal = match self.tables.withdrawals.get(&id) {
            Some(withdrawal) => withdrawal.clone(),
            None => return Ok(None),
        };
        Ok(self.tables.view(withdrawal))
    }

    async fn insert_account(&self, account: &Account) -> Result<(), WithdrawError> {
        let _gate = self.tables.write_gate();

        if self.tables.accounts.contains_key(&account.id) {
            return Err(WithdrawError::storage(format!(
                "account {} already exists",
                account.id
            )));
        }
        if self
            .tables
            .accounts
            .iter()
            .any(|existing| existing.tax_id == account.tax_id)
        {
            return Err(WithdrawError::storage(format!(
                "tax id {} is already registered",
                account.tax_id
            )));
        }

        self.tables.accounts.insert(account.id, account.clone());
        Ok(())
    }

    async fn list_accounts(&self) -> Result<Vec<Account>, WithdrawError> {
        let _gate = self.tables.read_gate();
        let mut accounts: Vec<Account> = self
            .tables
            .accounts
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        accounts.sort_by_key(|account| account.id);
        Ok(accounts)
    }
}

/// An open transaction against [`MemoryAccountStore`]
pub struct MemoryTransaction {
    tables: Arc<Tables>,
    row_guards: HashMap<AccountId, OwnedMutexGuard<()>>,
    accounts: HashMap<AccountId, Account>,
    withdrawals: HashMap<WithdrawalId, Withdrawal>,
    details: Vec<MethodDetail>,
}

impl MemoryTransaction {
    fn current_withdrawal(&self, id: WithdrawalId) -> Option<Withdrawal> {
        self.withdrawals
            .get(&id)
            .cloned()
            .or_else(|| self.tables.withdrawals.get(&id).map(|w| w.clone()))
    }

    fn current_detail(&self, withdrawal_id: WithdrawalId) -> Option<MethodDetail> {
        self.details
            .iter()
            .find(|detail| detail.withdrawal_id == withdrawal_id)
            .cloned()
            .or_else(|| self.tables.details.get(&withdrawal_id).map(|d| d.clone()))
    }
}

#[async_trait]
impl StoreTransaction for MemoryTransaction {
    async fn get_for_update(&mut self, id: AccountId) -> Result<Account, WithdrawError> {
        if !self.row_guards.contains_key(&id) {
            if !self.tables.accounts.contains_key(&id) {
                return Err(WithdrawError::account_not_found(id));
            }
            let row_lock = self.tables.row_lock(id);
            let guard = row_lock.lock_owned().await;
            self.row_guards.insert(id, guard);
        }

        if let Some(staged) = self.accounts.get(&id) {
            return Ok(staged.clone());
        }
        self.tables
            .accounts
            .get(&id)
            .map(|account| account.clone())
            .ok_or_else(|| WithdrawError::account_not_found(id))
    }

    async fn save_account(&mut self, account: &Account) -> Result<(), WithdrawError> {
        if !self.row_guards.contains_key(&account.id) {
            return Err(WithdrawError::storage(format!(
                "account {} saved without holding its row lock",
                account.id
            )));
        }
        self.accounts.insert(account.id, account.clone());
        Ok(())
    }

    async fn create_withdrawal(&mut self, withdrawal: &Withdrawal) -> Result<(), WithdrawError> {
        if self.current_withdrawal(withdrawal.id).is_some() {
            return Err(WithdrawError::storage(format!(
                "withdrawal {} already exists",
                withdrawal.id
            )));
        }
        self.withdrawals.insert(withdrawal.id, withdrawal.clone());
        Ok(())
    }

    async fn update_withdrawal(&mut self, withdrawal: &Withdrawal) -> Result<(), WithdrawError> {
        let current = self.current_withdrawal(withdrawal.id).ok_or_else(|| {
            WithdrawError::storage(format!("withdrawal {} does not exist", withdrawal.id))
        })?;

        if current.is_terminal() {
            return Err(WithdrawError::WithdrawalFinalized { id: withdrawal.id });
        }
        if current.account_id != withdrawal.account_id || current.amount != withdrawal.amount {
            return Err(WithdrawError::storage(format!(
                "withdrawal {} account and amount are immutable",
                withdrawal.id
            )));
        }

        self.withdrawals.insert(withdrawal.id, withdrawal.clone());
        Ok(())
    }

    async fn get_withdrawal(
        &mut self,
        id: WithdrawalId,
    ) -> Result<Option<(Withdrawal, Option<MethodDetail>)>, WithdrawError> {
        Ok(self
            .current_withdrawal(id)
            .map(|withdrawal| (withdrawal, self.current_detail(id))))
    }

    async fn create_method_detail(&mut self, detail: &MethodDetail) -> Result<(), WithdrawError> {
        if self.current_withdrawal(detail.withdrawal_id).is_none() {
            return Err(WithdrawError::storage(format!(
                "method detail references unknown withdrawal {}",
                detail.withdrawal_id
            )));
        }
        if self.current_detail(detail.withdrawal_id).is_some() {
            return Err(WithdrawError::storage(format!(
                "withdrawal {} already has a method detail",
                detail.withdrawal_id
            )));
        }
        self.details.push(detail.clone());
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), WithdrawError> {
        let MemoryTransaction {
            tables,
            row_guards,
            accounts,
            withdrawals,
            details,
        } = *self;

        {
            let _gate = tables.write_gate();
            for (id, account) in accounts {
                tables.accounts.insert(id, account);
            }
            for (id, withdrawal) in withdrawals {
                tables.withdrawals.insert(id, withdrawal);
            }
            for detail in details {
                tables.details.insert(detail.withdrawal_id, detail);
            }
        }

        drop(row_guards);
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), WithdrawError> {
        drop(self);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PixKeyType;
    use rust_decimal::Decimal;
    use std::time::Duration;

    async fn store_with_account(balance: i64) -> (MemoryAccountStore, AccountId) {
        let store = MemoryAccountStore::new();
        let account = Account::new("12345678901", "Maria", Decimal::new(balance, 2));
        store.insert_account(&account).await.unwrap();
        (store, account.id)
    }

    #[tokio::test]
    async fn test_get_for_update_unknown_account() {
        let store = MemoryAccountStore::new();
        let mut tx = store.begin().await.unwrap();

        let result = tx.get_for_update(uuid::Uuid::now_v7()).await;
        assert!(matches!(result, Err(WithdrawError::AccountNotFound { .. })));
    }

    #[tokio::test]
    async fn test_commit_makes_writes_visible() {
        let (store, id) = store_with_account(10000).await;

        let mut tx = store.begin().await.unwrap();
        let mut account = tx.get_for_update(id).await.unwrap();
        account.balance = Decimal::new(2500, 2);
        tx.save_account(&account).await.unwrap();

        // Not visible before commit
        let before = store.find_account(id).await.unwrap().unwrap();
        assert_eq!(before.balance, Decimal::new(10000, 2));

        tx.commit().await.unwrap();

        let after = store.find_account(id).await.unwrap().unwrap();
        assert_eq!(after.balance, Decimal::new(2500, 2));
    }

    #[tokio::test]
    async fn test_drop_discards_writes() {
        let (store, id) = store_with_account(10000).await;

        {
            let mut tx = store.begin().await.unwrap();
            let mut account = tx.get_for_update(id).await.unwrap();
            account.lock(Utc::now());
            tx.save_account(&account).await.unwrap();
        }

        let account = store.find_account(id).await.unwrap().unwrap();
        assert!(!account.locked);
    }

    #[tokio::test]
    async fn test_save_requires_row_lock() {
        let (store, id) = store_with_account(100).await;
        let account = store.find_account(id).await.unwrap().unwrap();

        let mut tx = store.begin().await.unwrap();
        let result = tx.save_account(&account).await;
        assert!(matches!(result, Err(WithdrawError::Storage { .. })));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_row_lock_blocks_second_transaction_until_commit() {
        let (store, id) = store_with_account(10000).await;

        let mut first = store.begin().await.unwrap();
        first.get_for_update(id).await.unwrap();

        let contender_store = store.clone();
        let contender = tokio::spawn(async move {
            let mut second = contender_store.begin().await.unwrap();
            let account = second.get_for_update(id).await.unwrap();
            second.commit().await.unwrap();
            account.balance
        });

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!contender.is_finished());

        let mut account = first.get_for_update(id).await.unwrap();
        account.balance = Decimal::new(4000, 2);
        first.save_account(&account).await.unwrap();
        first.commit().await.unwrap();

        // The waiter observes the committed balance, never the stale one
        assert_eq!(contender.await.unwrap(), Decimal::new(4000, 2));
    }

    #[tokio::test]
    async fn test_finalized_withdrawal_cannot_be_updated() {
        let (store, id) = store_with_account(10000).await;
        let now = Utc::now();
        let mut withdrawal = Withdrawal::new(id, "PIX", Decimal::new(1000, 2), None, now);

        let mut tx = store.begin().await.unwrap();
        tx.create_withdrawal(&withdrawal).await.unwrap();
        withdrawal.mark_done(now).unwrap();
        tx.update_withdrawal(&withdrawal).await.unwrap();
        tx.commit().await.unwrap();

        let mut tampered = withdrawal.clone();
        tampered.done = false;
        let mut tx = store.begin().await.unwrap();
        assert_eq!(
            tx.update_withdrawal(&tampered).await,
            Err(WithdrawError::WithdrawalFinalized { id: withdrawal.id })
        );
    }

    #[tokio::test]
    async fn test_find_due_scheduled_filters_and_joins() {
        let (store, id) = store_with_account(10000).await;
        let now = Utc::now();

        let due = Withdrawal::new(id, "PIX", Decimal::new(100, 2), Some(now - chrono::Duration::minutes(1)), now);
        let future = Withdrawal::new(id, "PIX", Decimal::new(100, 2), Some(now + chrono::Duration::minutes(1)), now);
        let immediate = Withdrawal::new(id, "PIX", Decimal::new(100, 2), None, now);

        let mut tx = store.begin().await.unwrap();
        for withdrawal in [&due, &future, &immediate] {
            tx.create_withdrawal(withdrawal).await.unwrap();
        }
        tx.create_method_detail(&MethodDetail::new(due.id, PixKeyType::Email, "a@b.com"))
            .await
            .unwrap();
        tx.commit().await.unwrap();

        let found = store.find_due_scheduled(now).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].withdrawal.id, due.id);
        assert_eq!(found[0].account.id, id);
        assert_eq!(found[0].detail.as_ref().map(|d| d.key.as_str()), Some("a@b.com"));
    }

    #[tokio::test]
    async fn test_duplicate_tax_id_rejected() {
        let (store, _) = store_with_account(100).await;
        let duplicate = Account::new("12345678901", "Other", Decimal::ZERO);

        assert!(store.insert_account(&duplicate).await.is_err());
    }
}
