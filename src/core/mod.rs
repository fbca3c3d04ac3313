//! Core business logic module
//!
//! This module contains the withdrawal concurrency-control components:
//! - `traits` - Account Store contract (transactions, row locks, due query)
//! - `memory_store` - In-process Account Store with real row locks
//! - `postgres_store` - PostgreSQL Account Store (feature `postgres`)
//! - `orchestrator` - Withdraw and settlement state machine
//! - `sweeper` - Periodic processing of due scheduled withdrawals
//! - `clock` - Time sources and the business timezone

pub mod clock;
pub mod memory_store;
pub mod orchestrator;
#[cfg(feature = "postgres")]
pub mod postgres_store;
pub mod sweeper;
pub mod traits;

pub use clock::{BusinessTime, Clock, ManualClock, SystemClock};
pub use memory_store::MemoryAccountStore;
pub use orchestrator::{SettlementOutcome, WithdrawalOrchestrator};
#[cfg(feature = "postgres")]
pub use postgres_store::PostgresAccountStore;
pub use sweeper::{ScheduledWithdrawalSweeper, SweepSummary};
pub use traits::{AccountStore, StoreTransaction};
