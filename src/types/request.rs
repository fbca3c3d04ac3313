//! Inbound withdrawal request
//!
//! Requests reach the core already shape-validated (required fields present,
//! amount numeric and positive, schedule parseable). See `io::csv_format`.

use super::account::AccountId;
use chrono::{DateTime, FixedOffset};
use rust_decimal::Decimal;

/// PIX destination as supplied by the caller
///
/// `key_type` stays a raw string so that unknown types are reported by the
/// method validator rather than lost during parsing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PixData {
    pub key_type: String,
    pub key: String,
}

impl PixData {
    pub fn new(key_type: impl Into<String>, key: impl Into<String>) -> Self {
        PixData {
            key_type: key_type.into(),
            key: key.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct WithdrawRequest {
    pub account_id: AccountId,

    /// Method name, uppercased on construction
    pub method: String,

    pub amount: Decimal,
    pub pix: PixData,

    /// Settlement time in the business timezone; `None` means immediate
    pub schedule: Option<DateTime<FixedOffset>>,

    /// Opaque tracing identifier, only ever attached to log fields
    pub correlation_id: Option<String>,
}

impl WithdrawRequest {
    pub fn new(account_id: AccountId, method: &str, amount: Decimal, pix: PixData) -> Self {
        WithdrawRequest {
            account_id,
            method: method.trim().to_uppercase(),
            amount,
            pix,
            schedule: None,
            correlation_id: None,
        }
    }

    pub fn scheduled_for(mut self, schedule: DateTime<FixedOffset>) -> Self {
        self.schedule = Some(schedule);
        self
    }

    pub fn with_correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = Some(correlation_id.into());
        self
    }

    pub fn is_scheduled(&self) -> bool {
        self.schedule.is_some()
    }
}
