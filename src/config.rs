//! Engine configuration
//!
//! Values come from the CLI (see `cli::CliArgs::to_engine_config`). Invalid
//! values never abort startup: they fall back to the default with a warning.

use crate::core::clock::{parse_utc_offset, BusinessTime};
use crate::notification::DEFAULT_SENDER;
use std::time::Duration;
use tracing::warn;

/// What happens to the debited balance when the transfer step fails
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SettlementFailurePolicy {
    /// Credit the amount back in the same transaction
    #[default]
    ReverseDebit,
    /// Leave the account debited
    KeepDebit,
}

#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Timezone used for "now" and for naive schedule timestamps
    pub business_time: BusinessTime,
    /// Period of the scheduled-withdrawal sweeper
    pub sweep_interval: Duration,
    /// Bound on in-flight withdraw calls in the runner
    pub max_concurrent_requests: usize,
    pub settlement_failure_policy: SettlementFailurePolicy,
    /// `From:` address of confirmation messages
    pub sender_address: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            business_time: BusinessTime::sao_paulo(),
            sweep_interval: Duration::from_secs(60),
            max_concurrent_requests: num_cpus::get(),
            settlement_failure_policy: SettlementFailurePolicy::default(),
            sender_address: DEFAULT_SENDER.to_string(),
        }
    }
}

impl EngineConfig {
    /// Build a config, replacing invalid values with defaults
    ///
    /// # Arguments
    ///
    /// * `utc_offset` - business offset as `±HH:MM`
    /// * `sweep_interval_secs` - sweeper period, must be > 0
    /// * `max_concurrent_requests` - must be > 0
    /// * `settlement_failure_policy` - transfer failure handling
    pub fn new(
        utc_offset: Option<&str>,
        sweep_interval_secs: Option<u64>,
        max_concurrent_requests: Option<usize>,
        settlement_failure_policy: SettlementFailurePolicy,
    ) -> Self {
        let default = Self::default();

        let business_time = match utc_offset {
            None => default.business_time,
            Some(raw) => match parse_utc_offset(raw) {
                Some(offset) => BusinessTime::new(offset),
                None => {
                    warn!(
                        utc_offset = raw,
                        default = %default.business_time.offset(),
                        "Invalid business UTC offset, using default"
                    );
                    default.business_time
                }
            },
        };

        let sweep_interval = match sweep_interval_secs {
            None => default.sweep_interval,
            Some(0) => {
                warn!(
                    default_secs = default.sweep_interval.as_secs(),
                    "Invalid sweep interval (0), using default"
                );
                default.sweep_interval
            }
            Some(secs) => Duration::from_secs(secs),
        };

        let max_concurrent_requests = match max_concurrent_requests {
            None => default.max_concurrent_requests,
            Some(0) => {
                warn!(
                    default = default.max_concurrent_requests,
                    "Invalid max_concurrent_requests (0), using default"
                );
                default.max_concurrent_requests
            }
            Some(n) => n,
        };

        Self {
            business_time,
            sweep_interval,
            max_concurrent_requests,
            settlement_failure_policy,
            sender_address: default.sender_address,
        }
    }
}
