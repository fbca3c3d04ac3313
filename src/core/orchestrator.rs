//! Withdrawal orchestrator
//!
//! The concurrency-control core. Every operation against an account runs in
//! a store transaction that holds the account's row lock, and marks the
//! account busy through the application lock (`locked` / `locked_at`).
//!
//! # Immediate and scheduled requests
//!
//! [`WithdrawalOrchestrator::withdraw`] runs as a single transaction:
//!
//! ```text
//! get_for_update ─► locked? ─► schedule / balance ─► method.validate
//!       ─► lock flag ─► create withdrawal ─► create details
//!       ─► (immediate) settle ─► unlock flag ─► commit ─► notify
//! ```
//!
//! Validation failures and storage failures roll the transaction back, so no
//! withdrawal record is written and the lock flag set in the same
//! transaction is discarded with it. Transfer failures are settlement
//! outcomes: they are recorded on the withdrawal and committed.
//!
//! # Due scheduled withdrawals
//!
//! [`WithdrawalOrchestrator::process_scheduled`] sets the application lock in
//! its own committed transaction, so concurrent requests see the account as
//! busy while settlement runs. Settlement and release then commit together.
//! When settlement fails unexpectedly, a fresh transaction records the
//! failure on the withdrawal and releases the account.

use super::clock::{BusinessTime, Clock};
use super::traits::{AccountStore, StoreTransaction};
use crate::config::{EngineConfig, SettlementFailurePolicy};
use crate::method::{MethodRegistry, PaymentMethod};
use crate::notification::NotificationDispatcher;
use crate::types::{
    Account, AccountId, MethodDetail, WithdrawError, WithdrawRequest, Withdrawal, WithdrawalId,
    WithdrawalView,
};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, info_span, warn, Instrument};

/// Attempts at clearing the application lock after a failed settlement
const RELEASE_ATTEMPTS: u32 = 3;
const RELEASE_BACKOFF: Duration = Duration::from_millis(50);

/// Result of one settlement attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SettlementOutcome {
    /// Balance deducted and transfer executed
    Settled,
    /// Balance no longer covers the amount; nothing deducted
    Rejected { reason: String },
    /// The transfer step failed after the deduction
    Failed { reason: String },
    /// Not attempted (account busy, or the withdrawal is no longer pending)
    Skipped,
}

impl SettlementOutcome {
    pub fn is_settled(&self) -> bool {
        matches!(self, SettlementOutcome::Settled)
    }
}

/// An accepted request before commit
struct Accepted {
    withdrawal: Withdrawal,
    detail: MethodDetail,
    account: Account,
    method: Arc<dyn PaymentMethod>,
}

pub struct WithdrawalOrchestrator {
    store: Arc<dyn AccountStore>,
    methods: Arc<MethodRegistry>,
    notifications: NotificationDispatcher,
    clock: Arc<dyn Clock>,
    business_time: BusinessTime,
    failure_policy: SettlementFailurePolicy,
}

impl WithdrawalOrchestrator {
    pub fn new(
        store: Arc<dyn AccountStore>,
        methods: Arc<MethodRegistry>,
        notifications: NotificationDispatcher,
        clock: Arc<dyn Clock>,
        config: &EngineConfig,
    ) -> Self {
        Self {
            store,
            methods,
            notifications,
            clock,
            business_time: config.business_time,
            failure_policy: config.settlement_failure_policy,
        }
    }

    pub fn store(&self) -> &Arc<dyn AccountStore> {
        &self.store
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub fn business_time(&self) -> BusinessTime {
        self.business_time
    }

    /// Accept a withdrawal request and settle it now unless it is scheduled.
    ///
    /// # Arguments
    ///
    /// * `request` - shape-validated request (amount > 0, schedule parseable)
    ///
    /// # Returns
    ///
    /// * `Ok(WithdrawalView)` - the withdrawal with its detail and account.
    ///   An immediate withdrawal whose transfer failed is returned here too,
    ///   with `error = true`.
    /// * `Err(WithdrawError)` - request rejected; nothing was written
    pub async fn withdraw(&self, request: WithdrawRequest) -> Result<WithdrawalView, WithdrawError> {
        let span = info_span!(
            "withdraw",
            account_id = %request.account_id,
            method = %request.method,
            amount = %request.amount,
            correlation_id = request.correlation_id.as_deref().unwrap_or("-"),
        );
        self.withdraw_in_transaction(request).instrument(span).await
    }

    async fn withdraw_in_transaction(
        &self,
        request: WithdrawRequest,
    ) -> Result<WithdrawalView, WithdrawError> {
        let mut tx = self.store.begin().await?;

        let accepted = match self.accept(tx.as_mut(), &request).await {
            Ok(accepted) => accepted,
            Err(e) => {
                if let Err(rollback_error) = tx.rollback().await {
                    error!(error = %rollback_error, "Rollback failed");
                }
                if e.is_business() {
                    info!(error = %e, "Withdrawal rejected");
                } else {
                    error!(error = %e, "Withdrawal aborted");
                }
                return Err(e);
            }
        };
        tx.commit().await?;

        let Accepted {
            withdrawal,
            detail,
            account,
            method,
        } = accepted;

        let view = WithdrawalView {
            withdrawal,
            detail: Some(detail),
            account,
        };

        if !view.withdrawal.scheduled && view.withdrawal.done && !view.withdrawal.error {
            self.notify(method.as_ref(), &view);
        }

        Ok(view)
    }

    /// Steps run under the row lock. Any error aborts the transaction.
    async fn accept(
        &self,
        tx: &mut dyn StoreTransaction,
        request: &WithdrawRequest,
    ) -> Result<Accepted, WithdrawError> {
        let mut account = tx.get_for_update(request.account_id).await?;

        if account.is_locked() {
            return Err(WithdrawError::account_locked(account.id));
        }

        match request.schedule {
            Some(schedule) => {
                let now = self.business_time.now(self.clock.as_ref());
                if schedule <= now {
                    return Err(WithdrawError::invalid_schedule(
                        schedule.format("%Y-%m-%d %H:%M:%S"),
                    ));
                }
            }
            None => {
                if !account.can_cover(request.amount) {
                    return Err(WithdrawError::insufficient_balance(
                        request.amount,
                        account.balance,
                    ));
                }
            }
        }

        let method = self.methods.resolve(&request.method)?;
        method.validate(request)?;

        let now = self.clock.now();
        account.lock(now);
        tx.save_account(&account).await?;
        debug!(account_id = %account.id, "Account locked for balance operation");

        let mut withdrawal = Withdrawal::new(
            account.id,
            method.name(),
            request.amount,
            request.schedule.map(|at| at.with_timezone(&Utc)),
            now,
        );
        tx.create_withdrawal(&withdrawal).await?;
        info!(
            withdrawal_id = %withdrawal.id,
            scheduled = withdrawal.scheduled,
            scheduled_for = ?withdrawal.scheduled_for.map(|at| self.business_time.format(at)),
            "Withdrawal record created"
        );

        let detail = method.create_details(tx, &withdrawal, request).await?;

        if !withdrawal.scheduled {
            self.settle(tx, method.as_ref(), &mut withdrawal, Some(&detail), &mut account)
                .await?;
        }

        account.unlock(self.clock.now());
        tx.save_account(&account).await?;
        debug!(account_id = %account.id, "Account unlocked after balance operation");

        Ok(Accepted {
            withdrawal,
            detail,
            account,
            method,
        })
    }

    /// Settle a pending withdrawal against an account whose row lock `tx` holds.
    ///
    /// Re-checks the balance, deducts it, executes the transfer and records
    /// the outcome on the withdrawal. Only storage failures are returned as
    /// errors.
    async fn settle(
        &self,
        tx: &mut dyn StoreTransaction,
        method: &dyn PaymentMethod,
        withdrawal: &mut Withdrawal,
        detail: Option<&MethodDetail>,
        account: &mut Account,
    ) -> Result<SettlementOutcome, WithdrawError> {
        let now = self.clock.now();

        if !account.can_cover(withdrawal.amount) {
            let reason = format!(
                "Saldo insuficiente no momento do processamento. Valor solicitado: R$ {:.2}, Saldo disponível: R$ {:.2}",
                withdrawal.amount, account.balance
            );
            warn!(
                withdrawal_id = %withdrawal.id,
                account_id = %account.id,
                requested_amount = %withdrawal.amount,
                available_balance = %account.balance,
                "Settlement rejected: insufficient balance"
            );
            withdrawal.mark_processed_with_error(reason.clone(), now)?;
            tx.update_withdrawal(withdrawal).await?;
            return Ok(SettlementOutcome::Rejected { reason });
        }

        let previous_balance = account.balance;
        account.debit(withdrawal.amount, now)?;
        tx.save_account(account).await?;
        info!(
            account_id = %account.id,
            amount_deducted = %withdrawal.amount,
            previous_balance = %previous_balance,
            new_balance = %account.balance,
            "Balance deducted from account"
        );

        let failure = match method.execute(withdrawal, detail, account).await {
            Ok(true) => None,
            Ok(false) => Some(format!("{} transfer was not accepted", method.name())),
            Err(e) => Some(e.to_string()),
        };

        match failure {
            None => {
                withdrawal.mark_done(now)?;
                tx.update_withdrawal(withdrawal).await?;
                info!(
                    withdrawal_id = %withdrawal.id,
                    account_id = %account.id,
                    amount = %withdrawal.amount,
                    scheduled = withdrawal.scheduled,
                    "Withdrawal settled"
                );
                Ok(SettlementOutcome::Settled)
            }
            Some(reason) => {
                if self.failure_policy == SettlementFailurePolicy::ReverseDebit {
                    account.credit(withdrawal.amount, now)?;
                    tx.save_account(account).await?;
                    info!(
                        account_id = %account.id,
                        amount = %withdrawal.amount,
                        balance = %account.balance,
                        "Debit reversed after transfer failure"
                    );
                }
                withdrawal.mark_processed_with_error(reason.clone(), now)?;
                tx.update_withdrawal(withdrawal).await?;
                error!(
                    withdrawal_id = %withdrawal.id,
                    account_id = %account.id,
                    reason = %reason,
                    "Transfer failed"
                );
                Ok(SettlementOutcome::Failed { reason })
            }
        }
    }

    /// Settle one due scheduled withdrawal.
    ///
    /// # Returns
    ///
    /// * `Ok(Skipped)` - account busy or withdrawal already processed
    /// * `Ok(Settled | Rejected | Failed)` - outcome recorded on the withdrawal
    /// * `Err(_)` - settlement failed unexpectedly; the failure was recorded
    ///   on the withdrawal when the store allowed it, and the account was
    ///   released either way
    pub async fn process_scheduled(
        &self,
        view: &WithdrawalView,
    ) -> Result<SettlementOutcome, WithdrawError> {
        let withdrawal_id = view.withdrawal.id;
        let account_id = view.withdrawal.account_id;
        let span = info_span!(
            "process_scheduled",
            withdrawal_id = %withdrawal_id,
            account_id = %account_id,
        );

        async move {
            info!(
                amount = %view.withdrawal.amount,
                scheduled_for = ?view.withdrawal.scheduled_for.map(|at| self.business_time.format(at)),
                "Processing scheduled withdrawal"
            );

            if !self.acquire(withdrawal_id, account_id).await? {
                return Ok(SettlementOutcome::Skipped);
            }

            match self.settle_scheduled(withdrawal_id, account_id).await {
                Ok((outcome, method, view)) => {
                    if outcome.is_settled() {
                        self.notify(method.as_ref(), &view);
                    }
                    Ok(outcome)
                }
                Err(e) => {
                    error!(error = %e, "Error processing scheduled withdrawal");
                    self.record_failure_and_release(withdrawal_id, account_id, &e)
                        .await?;
                    Err(e)
                }
            }
        }
        .instrument(span)
        .await
    }

    /// Take the application lock in its own transaction.
    ///
    /// Returns `false` when the withdrawal should be skipped this run.
    async fn acquire(
        &self,
        withdrawal_id: WithdrawalId,
        account_id: AccountId,
    ) -> Result<bool, WithdrawError> {
        let mut tx = self.store.begin().await?;
        let mut account = tx.get_for_update(account_id).await?;

        let pending = tx
            .get_withdrawal(withdrawal_id)
            .await?
            .is_some_and(|(withdrawal, _)| withdrawal.is_pending());
        if !pending {
            tx.rollback().await?;
            debug!("Scheduled withdrawal already processed");
            return Ok(false);
        }

        if account.is_locked() {
            tx.rollback().await?;
            warn!("Scheduled withdrawal skipped: account is locked");
            return Ok(false);
        }

        account.lock(self.clock.now());
        tx.save_account(&account).await?;
        tx.commit().await?;
        debug!("Account locked for balance operation");
        Ok(true)
    }

    /// Settle and release in one transaction
    async fn settle_scheduled(
        &self,
        withdrawal_id: WithdrawalId,
        account_id: AccountId,
    ) -> Result<(SettlementOutcome, Arc<dyn PaymentMethod>, WithdrawalView), WithdrawError> {
        let mut tx = self.store.begin().await?;
        let mut account = tx.get_for_update(account_id).await?;
        let (mut withdrawal, detail) = tx.get_withdrawal(withdrawal_id).await?.ok_or_else(|| {
            WithdrawError::storage(format!("withdrawal {} disappeared", withdrawal_id))
        })?;

        let method = self.methods.resolve(&withdrawal.method)?;
        let outcome = self
            .settle(
                tx.as_mut(),
                method.as_ref(),
                &mut withdrawal,
                detail.as_ref(),
                &mut account,
            )
            .await?;

        account.unlock(self.clock.now());
        tx.save_account(&account).await?;
        tx.commit().await?;
        debug!("Account unlocked after balance operation");

        Ok((
            outcome,
            method,
            WithdrawalView {
                withdrawal,
                detail,
                account,
            },
        ))
    }

    /// Record the failure on the withdrawal, then release the account.
    ///
    /// The release runs in its own transaction whether or not the failure
    /// could be recorded, so a failed settlement never leaves the
    /// application lock set. A withdrawal whose failure was not recorded
    /// stays pending and is picked up by a later sweep.
    async fn record_failure_and_release(
        &self,
        withdrawal_id: WithdrawalId,
        account_id: AccountId,
        cause: &WithdrawError,
    ) -> Result<(), WithdrawError> {
        let recorded = self.record_failure(withdrawal_id, cause).await;
        if let Err(e) = &recorded {
            error!(error = %e, "Failed to record settlement failure; withdrawal stays pending");
        }

        self.release(account_id).await?;
        recorded
    }

    async fn record_failure(
        &self,
        withdrawal_id: WithdrawalId,
        cause: &WithdrawError,
    ) -> Result<(), WithdrawError> {
        let mut tx = self.store.begin().await?;
        if let Some((mut withdrawal, _)) = tx.get_withdrawal(withdrawal_id).await? {
            if withdrawal.is_pending() {
                withdrawal.mark_processed_with_error(cause.to_string(), self.clock.now())?;
                tx.update_withdrawal(&withdrawal).await?;
            }
        }
        tx.commit().await
    }

    /// Clear the application lock, retrying with a growing pause
    async fn release(&self, account_id: AccountId) -> Result<(), WithdrawError> {
        let mut attempt = 1;
        loop {
            match self.try_release(account_id).await {
                Ok(()) => {
                    debug!(attempt, "Account unlocked after failed settlement");
                    return Ok(());
                }
                Err(e) if attempt < RELEASE_ATTEMPTS => {
                    warn!(attempt, error = %e, "Account release failed, retrying");
                    tokio::time::sleep(RELEASE_BACKOFF * attempt).await;
                    attempt += 1;
                }
                Err(e) => {
                    error!(attempts = attempt, error = %e, "Account left locked after failed settlement");
                    return Err(e);
                }
            }
        }
    }

    async fn try_release(&self, account_id: AccountId) -> Result<(), WithdrawError> {
        let mut tx = self.store.begin().await?;
        let mut account = tx.get_for_update(account_id).await?;
        account.unlock(self.clock.now());
        tx.save_account(&account).await?;
        tx.commit().await
    }

    fn notify(&self, method: &dyn PaymentMethod, view: &WithdrawalView) {
        if let Some(recipient) =
            method.notification_recipient(&view.withdrawal, view.detail.as_ref())
        {
            self.notifications.notify_async(view, &recipient);
        }
    }
}

impl std::fmt::Debug for WithdrawalOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WithdrawalOrchestrator")
            .field("methods", &self.methods)
            .field("business_time", &self.business_time)
            .field("failure_policy", &self.failure_policy)
            .finish()
    }
}
