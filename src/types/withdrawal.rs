//! Withdrawal records and their method-specific detail
//!
//! A withdrawal is created `pending` when a request is accepted and moves to
//! exactly one terminal state afterwards:
//!
//! ```text
//!            ┌──────────► done   (done=true,  error=false)
//! pending ───┤
//!            └──────────► failed (error=true, done=true|false)
//! ```
//!
//! Terminal records are immutable; every `mark_*` method refuses to touch them.

use super::account::{Account, AccountId};
use super::error::WithdrawError;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Withdrawal identifier (UUIDv7, time-sortable)
pub type WithdrawalId = Uuid;

/// Derived state of a withdrawal record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WithdrawalStatus {
    /// Accepted, not yet settled (immediate in flight, or scheduled and waiting)
    Pending,
    /// Settled successfully
    Done,
    /// Rejected or processed with failure
    Failed,
}

impl fmt::Display for WithdrawalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            WithdrawalStatus::Pending => "pending",
            WithdrawalStatus::Done => "done",
            WithdrawalStatus::Failed => "failed",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Withdrawal {
    pub id: WithdrawalId,
    pub account_id: AccountId,

    /// Payment method name, uppercased (e.g. "PIX")
    pub method: String,

    /// Always > 0, two fractional digits
    pub amount: Decimal,

    pub scheduled: bool,

    /// Present iff `scheduled`
    pub scheduled_for: Option<DateTime<Utc>>,

    pub done: bool,
    pub error: bool,
    pub error_reason: Option<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Withdrawal {
    /// Create a pending withdrawal. `scheduled_for` decides whether it is scheduled.
    pub fn new(
        account_id: AccountId,
        method: impl Into<String>,
        amount: Decimal,
        scheduled_for: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Self {
        Withdrawal {
            id: Uuid::now_v7(),
            account_id,
            method: method.into(),
            amount,
            scheduled: scheduled_for.is_some(),
            scheduled_for,
            done: false,
            error: false,
            error_reason: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn status(&self) -> WithdrawalStatus {
        match (self.done, self.error) {
            (_, true) => WithdrawalStatus::Failed,
            (true, false) => WithdrawalStatus::Done,
            (false, false) => WithdrawalStatus::Pending,
        }
    }

    pub fn is_pending(&self) -> bool {
        !self.done && !self.error
    }

    pub fn is_terminal(&self) -> bool {
        !self.is_pending()
    }

    /// Scheduled, still pending, and its time has come
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.scheduled
            && self.is_pending()
            && self.scheduled_for.is_some_and(|at| at <= now)
    }

    fn ensure_pending(&self) -> Result<(), WithdrawError> {
        if self.is_terminal() {
            return Err(WithdrawError::WithdrawalFinalized { id: self.id });
        }
        Ok(())
    }

    /// Settled successfully
    pub fn mark_done(&mut self, now: DateTime<Utc>) -> Result<(), WithdrawError> {
        self.ensure_pending()?;
        self.done = true;
        self.updated_at = now;
        Ok(())
    }

    /// Processed, but the outcome is a failure
    pub fn mark_processed_with_error(
        &mut self,
        reason: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Result<(), WithdrawError> {
        self.ensure_pending()?;
        self.done = true;
        self.error = true;
        self.error_reason = Some(reason.into());
        self.updated_at = now;
        Ok(())
    }
}

/// PIX key types recognized by the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PixKeyType {
    Email,
    Cpf,
    Cnpj,
    Phone,
    Random,
}

impl PixKeyType {
    pub const ALL: [PixKeyType; 5] = [
        PixKeyType::Email,
        PixKeyType::Cpf,
        PixKeyType::Cnpj,
        PixKeyType::Phone,
        PixKeyType::Random,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PixKeyType::Email => "email",
            PixKeyType::Cpf => "cpf",
            PixKeyType::Cnpj => "cnpj",
            PixKeyType::Phone => "phone",
            PixKeyType::Random => "random",
        }
    }

    /// Label shown to customers
    pub fn label(&self) -> &'static str {
        match self {
            PixKeyType::Email => "E-mail",
            PixKeyType::Cpf => "CPF",
            PixKeyType::Cnpj => "CNPJ",
            PixKeyType::Phone => "Telefone",
            PixKeyType::Random => "Chave Aleatória",
        }
    }

    /// Maximum key length per the central bank rules
    pub fn max_length(&self) -> usize {
        match self {
            PixKeyType::Email => 77,
            PixKeyType::Cpf => 11,
            PixKeyType::Cnpj => 14,
            PixKeyType::Phone => 14,
            PixKeyType::Random => 36,
        }
    }
}

impl fmt::Display for PixKeyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PixKeyType {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PixKeyType::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or(())
    }
}

/// Method-specific child record, owned 1:1 by a withdrawal
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MethodDetail {
    pub id: Uuid,
    pub withdrawal_id: WithdrawalId,
    pub key_type: PixKeyType,
    pub key: String,
}

impl MethodDetail {
    pub fn new(withdrawal_id: WithdrawalId, key_type: PixKeyType, key: impl Into<String>) -> Self {
        MethodDetail {
            id: Uuid::now_v7(),
            withdrawal_id,
            key_type,
            key: key.into(),
        }
    }
}

/// A withdrawal eagerly loaded with its method detail and owning account
#[derive(Debug, Clone, PartialEq)]
pub struct WithdrawalView {
    pub withdrawal: Withdrawal,
    pub detail: Option<MethodDetail>,
    pub account: Account,
}

impl WithdrawalView {
    /// Outward success message for an accepted request
    pub fn success_message(&self) -> &'static str {
        if self.withdrawal.scheduled {
            "Saque agendado com sucesso"
        } else {
            "Saque realizado com sucesso"
        }
    }
}
