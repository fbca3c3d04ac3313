//! Account-related types for the withdrawal engine
//!
//! An account carries the balance that withdrawals draw from and the
//! application-level lock (`locked` / `locked_at`) that marks it busy.

use super::error::WithdrawError;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Account identifier (UUIDv7, time-sortable)
pub type AccountId = Uuid;

/// Fractional digits kept for every monetary value
pub const MONEY_SCALE: u32 = 2;

/// Customer account state
///
/// `locked == true` is always paired with `locked_at == Some(_)`, and
/// `locked == false` with `None`. Only [`Account::lock`] and
/// [`Account::unlock`] touch those two fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    pub id: AccountId,

    /// National tax id, unique and immutable
    pub tax_id: String,

    pub name: String,

    /// Current balance. May be negative as a pre-existing state; the engine
    /// never debits past zero itself.
    pub balance: Decimal,

    /// Application lock flag
    pub locked: bool,

    /// When the application lock was taken
    pub locked_at: Option<DateTime<Utc>>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Account {
    /// Create an unlocked account with a fresh time-sortable id
    pub fn new(tax_id: impl Into<String>, name: impl Into<String>, balance: Decimal) -> Self {
        let now = Utc::now();
        Account {
            id: Uuid::now_v7(),
            tax_id: tax_id.into(),
            name: name.into(),
            balance: balance.round_dp(MONEY_SCALE),
            locked: false,
            locked_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_locked(&self) -> bool {
        self.locked
    }

    /// Take the application lock
    pub fn lock(&mut self, now: DateTime<Utc>) {
        self.locked = true;
        self.locked_at = Some(now);
        self.updated_at = now;
    }

    /// Release the application lock
    pub fn unlock(&mut self, now: DateTime<Utc>) {
        self.locked = false;
        self.locked_at = None;
        self.updated_at = now;
    }

    /// Whether the current balance covers `amount`
    pub fn can_cover(&self, amount: Decimal) -> bool {
        amount <= self.balance
    }

    /// Deduct `amount` from the balance
    pub fn debit(&mut self, amount: Decimal, now: DateTime<Utc>) -> Result<(), WithdrawError> {
        self.balance = self
            .balance
            .checked_sub(amount)
            .ok_or_else(|| WithdrawError::storage(format!("balance underflow on account {}", self.id)))?;
        self.updated_at = now;
        Ok(())
    }

    /// Add `amount` back to the balance (debit reversal)
    pub fn credit(&mut self, amount: Decimal, now: DateTime<Utc>) -> Result<(), WithdrawError> {
        self.balance = self
            .balance
            .checked_add(amount)
            .ok_or_else(|| WithdrawError::storage(format!("balance overflow on account {}", self.id)))?;
        self.updated_at = now;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_new_account_is_unlocked() {
        let account = Account::new("12345678901", "Maria", Decimal::new(10050, 2));

        assert!(!account.locked);
        assert!(account.locked_at.is_none());
        assert_eq!(account.balance, Decimal::new(10050, 2));
    }

    #[test]
    fn test_lock_and_unlock_keep_flag_and_timestamp_paired() {
        let mut account = Account::new("12345678901", "Maria", Decimal::ZERO);
        let now = Utc::now();

        account.lock(now);
        assert!(account.is_locked());
        assert_eq!(account.locked_at, Some(now));

        account.unlock(now);
        assert!(!account.is_locked());
        assert_eq!(account.locked_at, None);
    }

    #[rstest]
    #[case::exact(Decimal::new(5000, 2), Decimal::new(5000, 2), true)]
    #[case::below(Decimal::new(5000, 2), Decimal::new(4999, 2), true)]
    #[case::above(Decimal::new(5000, 2), Decimal::new(5001, 2), false)]
    #[case::zero_balance(Decimal::ZERO, Decimal::new(1, 2), false)]
    #[case::negative_balance(Decimal::new(-1000, 2), Decimal::new(1, 2), false)]
    fn test_can_cover(#[case] balance: Decimal, #[case] amount: Decimal, #[case] expected: bool) {
        let account = Account::new("1", "A", balance);
        assert_eq!(account.can_cover(amount), expected);
    }

    #[test]
    fn test_debit_then_credit_restores_balance() {
        let mut account = Account::new("1", "A", Decimal::new(100000, 2));
        let now = Utc::now();

        account.debit(Decimal::new(60000, 2), now).unwrap();
        assert_eq!(account.balance, Decimal::new(40000, 2));

        account.credit(Decimal::new(60000, 2), now).unwrap();
        assert_eq!(account.balance, Decimal::new(100000, 2));
    }
}
