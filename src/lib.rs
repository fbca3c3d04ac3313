//! Withdrawal Engine Library
//! # Overview
//!
//! This library implements account withdrawals with per-account concurrency
//! control: immediate withdrawals settled inside one locked transaction,
//! scheduled withdrawals settled later by a background sweeper, and
//! confirmation notifications sent after the fact.
//!
//! # Architecture
//!
//! The system is organized into several key components:
//!
//! - [`types`] - Core data types (Account, Withdrawal, WithdrawRequest, errors)
//! - [`cli`] - CLI arguments parsing
//! - [`config`] - Engine configuration (business timezone, sweep interval, failure policy)
//! - [`core`] - Business logic components:
//!   - [`core::orchestrator`] - Withdrawal acceptance and settlement
//!   - [`core::sweeper`] - Periodic settlement of due scheduled withdrawals
//!   - [`core::memory_store`] - In-memory transactional account store
//! - [`method`] - Withdrawal method plug-ins (PIX)
//! - [`notification`] - Confirmation messages and their delivery
//! - [`io`] - CSV input and output
//! - [`runner`] - Wiring of the above for the command-line tool
//!
//! # Withdrawal Lifecycle
//!
//! - **pending**: scheduled and waiting for its time, no funds moved
//! - **done**: settled, funds debited and transferred
//! - **failed**: processed with an error reason, no further transitions
//!
//! # Account States
//!
//! Each account maintains:
//! - `balance`: Funds available for withdrawal, never negative
//! - `locked`: Whether a settlement is currently in progress for the account

// Module declarations
pub mod cli;
pub mod config;
pub mod core;
pub mod io;
pub mod method;
pub mod notification;
pub mod runner;
pub mod types;

pub use config::{EngineConfig, SettlementFailurePolicy};
pub use core::{
    AccountStore, MemoryAccountStore, ScheduledWithdrawalSweeper, SettlementOutcome,
    StoreTransaction, WithdrawalOrchestrator,
};
pub use io::{write_accounts_csv, write_results_csv};
pub use runner::{RunOptions, WithdrawalRunner};
pub use types::{Account, AccountId, WithdrawError, WithdrawRequest, Withdrawal, WithdrawalView};
