//! Error types for the withdrawal engine
//!
//! Every failure the core can produce is a variant of [`WithdrawError`].
//! Most variants are expected business outcomes (a rejected withdrawal is not
//! a bug); the remaining ones are defects that surface as an opaque failure.
//!
//! # Error Categories
//!
//! - **Lookup/locking**: account not found, account busy
//! - **Validation**: insufficient balance, invalid schedule, unsupported method,
//!   malformed PIX key, malformed request
//! - **Not implemented**: a recognized variant that has no validator yet
//! - **Defects**: storage failures, transfer failures, writes to finalized records

use crate::types::{AccountId, WithdrawalId};
use rust_decimal::Decimal;
use serde::Serialize;
use thiserror::Error;

/// Main error type for the withdrawal engine
#[derive(Debug, Clone, PartialEq, Error)]
pub enum WithdrawError {
    /// The referenced account does not exist
    #[error("Account not found: {account_id}")]
    AccountNotFound {
        /// Account id as supplied by the caller
        account_id: String,
    },

    /// Another in-flight operation holds the application lock on the account
    #[error("Account {account_id} is locked by another operation")]
    AccountLocked { account_id: AccountId },

    /// Requested amount exceeds the balance at validation or settlement time
    #[error("Insufficient balance: requested {requested:.2}, available {available:.2}")]
    InsufficientBalance {
        requested: Decimal,
        available: Decimal,
    },

    /// Schedule timestamp is not strictly in the future (business timezone)
    #[error("Invalid schedule: {scheduled_for} is not in the future")]
    InvalidSchedule { scheduled_for: String },

    /// No payment method is registered under this name
    #[error("Unsupported withdrawal method: {method}")]
    UnsupportedMethod { method: String },

    /// Method-specific key validation failed
    #[error("Invalid PIX key ({field}): {reason}")]
    InvalidPixKey { field: String, reason: String },

    /// A recognized method or key type whose validation is not built yet
    #[error("Not implemented: {feature}")]
    NotImplemented { feature: String, reason: String },

    /// Request shape rejected at the inbound boundary
    #[error("Invalid request field '{field}': {reason}")]
    InvalidRequest { field: String, reason: String },

    /// Attempt to mutate a withdrawal that already reached a terminal state
    #[error("Withdrawal {id} is already finalized")]
    WithdrawalFinalized { id: WithdrawalId },

    /// The payment method failed to execute the transfer
    #[error("Transfer failed: {reason}")]
    Transfer { reason: String },

    /// Persistence layer failure
    #[error("Storage error: {message}")]
    Storage { message: String },
}

/// Generic message shown for defects, without internal detail
pub const INTERNAL_ERROR_MESSAGE: &str = "Internal Server Error";

impl WithdrawError {
    pub fn account_not_found(account_id: impl ToString) -> Self {
        WithdrawError::AccountNotFound {
            account_id: account_id.to_string(),
        }
    }

    pub fn account_locked(account_id: AccountId) -> Self {
        WithdrawError::AccountLocked { account_id }
    }

    pub fn insufficient_balance(requested: Decimal, available: Decimal) -> Self {
        WithdrawError::InsufficientBalance {
            requested,
            available,
        }
    }

    pub fn invalid_schedule(scheduled_for: impl ToString) -> Self {
        WithdrawError::InvalidSchedule {
            scheduled_for: scheduled_for.to_string(),
        }
    }

    pub fn unsupported_method(method: &str) -> Self {
        WithdrawError::UnsupportedMethod {
            method: method.to_string(),
        }
    }

    pub fn invalid_pix_key(field: &str, reason: impl Into<String>) -> Self {
        WithdrawError::InvalidPixKey {
            field: field.to_string(),
            reason: reason.into(),
        }
    }

    pub fn not_implemented(feature: &str, reason: impl Into<String>) -> Self {
        WithdrawError::NotImplemented {
            feature: feature.to_string(),
            reason: reason.into(),
        }
    }

    pub fn invalid_request(field: &str, reason: impl Into<String>) -> Self {
        WithdrawError::InvalidRequest {
            field: field.to_string(),
            reason: reason.into(),
        }
    }

    pub fn transfer(reason: impl Into<String>) -> Self {
        WithdrawError::Transfer {
            reason: reason.into(),
        }
    }

    pub fn storage(message: impl Into<String>) -> Self {
        WithdrawError::Storage {
            message: message.into(),
        }
    }

    /// True for expected business outcomes, false for defects.
    pub fn is_business(&self) -> bool {
        !matches!(
            self,
            WithdrawError::WithdrawalFinalized { .. }
                | WithdrawError::Transfer { .. }
                | WithdrawError::Storage { .. }
        )
    }

    /// Stable numeric signal for each failure kind.
    pub fn status_code(&self) -> u16 {
        match self {
            WithdrawError::AccountNotFound { .. } => 404,
            WithdrawError::AccountLocked { .. } => 423,
            WithdrawError::InsufficientBalance { .. }
            | WithdrawError::InvalidSchedule { .. }
            | WithdrawError::UnsupportedMethod { .. }
            | WithdrawError::InvalidPixKey { .. }
            | WithdrawError::InvalidRequest { .. } => 422,
            WithdrawError::NotImplemented { .. } => 501,
            WithdrawError::WithdrawalFinalized { .. }
            | WithdrawError::Transfer { .. }
            | WithdrawError::Storage { .. } => 500,
        }
    }

    /// Human-readable (pt-BR) message for the end user.
    ///
    /// Defects never leak their internal detail.
    pub fn user_message(&self) -> String {
        match self {
            WithdrawError::AccountNotFound { account_id } => {
                format!("Conta não encontrada: {}", account_id)
            }
            WithdrawError::AccountLocked { account_id } => format!(
                "Conta {} está temporariamente bloqueada para operações. Tente novamente em alguns segundos.",
                account_id
            ),
            WithdrawError::InsufficientBalance {
                requested,
                available,
            } => format!(
                "Saldo insuficiente. Valor solicitado: R$ {:.2}, Saldo disponível: R$ {:.2}",
                requested, available
            ),
            WithdrawError::InvalidSchedule { scheduled_for } => format!(
                "Data de agendamento inválida. A data {} está no passado.",
                scheduled_for
            ),
            WithdrawError::UnsupportedMethod { method } => {
                format!("Método de saque não suportado: {}", method)
            }
            WithdrawError::InvalidPixKey { reason, .. }
            | WithdrawError::NotImplemented { reason, .. }
            | WithdrawError::InvalidRequest { reason, .. } => reason.clone(),
            WithdrawError::WithdrawalFinalized { .. }
            | WithdrawError::Transfer { .. }
            | WithdrawError::Storage { .. } => INTERNAL_ERROR_MESSAGE.to_string(),
        }
    }

    /// Outward rendering of this error.
    pub fn to_response(&self) -> ErrorResponse {
        ErrorResponse {
            success: false,
            code: self.status_code(),
            message: self.user_message(),
        }
    }
}

#[cfg(feature = "postgres")]
impl From<sqlx::Error> for WithdrawError {
    fn from(error: sqlx::Error) -> Self {
        WithdrawError::Storage {
            message: error.to_string(),
        }
    }
}

/// Outward error payload: a stable code plus a user-facing message
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub code: u16,
    pub message: String,
}
