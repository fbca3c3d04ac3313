//! Types module
//!
//! Contains the shared data model used throughout the engine:
//! - `account`: accounts and the application lock
//! - `withdrawal`: withdrawal records, method detail, eager views
//! - `request`: inbound withdrawal requests
//! - `error`: error taxonomy and its outward rendering

pub mod account;
pub mod error;
pub mod request;
pub mod withdrawal;

pub use account::{Account, AccountId, MONEY_SCALE};
pub use error::{ErrorResponse, WithdrawError, INTERNAL_ERROR_MESSAGE};
pub use request::{PixData, WithdrawRequest};
pub use withdrawal::{
    MethodDetail, PixKeyType, Withdrawal, WithdrawalId, WithdrawalStatus, WithdrawalView,
};
