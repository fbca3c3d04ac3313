use crate::config::{EngineConfig, SettlementFailurePolicy};
use clap::Parser;
use std::path::PathBuf;

/// Process PIX withdrawal requests against customer accounts
#[derive(Parser, Debug)]
#[command(name = "withdrawal-engine")]
#[command(about = "Process withdrawal requests with per-account concurrency control", long_about = None)]
pub struct CliArgs {
    /// Account provisioning CSV (id,tax_id,name,balance)
    #[arg(long = "accounts", value_name = "CSV", help = "Path to the account provisioning CSV file")]
    pub accounts_file: Option<PathBuf>,

    /// Withdrawal request CSV
    #[arg(
        long = "requests",
        value_name = "CSV",
        help = "Path to the withdrawal request CSV file (account_id,method,amount,pix_type,pix_key,schedule,correlation_id)"
    )]
    pub requests_file: Option<PathBuf>,

    /// Maximum number of in-flight withdraw calls
    #[arg(
        long = "max-concurrent",
        value_name = "COUNT",
        help = "Maximum number of requests processed concurrently (default: CPU cores)"
    )]
    pub max_concurrent: Option<usize>,

    /// Sweeper period in seconds
    #[arg(
        long = "sweep-interval-secs",
        value_name = "SECS",
        help = "Seconds between scheduled withdrawal sweeps (default: 60)"
    )]
    pub sweep_interval_secs: Option<u64>,

    /// Business timezone offset
    #[arg(
        long = "utc-offset",
        value_name = "±HH:MM",
        allow_hyphen_values = true,
        help = "Business timezone UTC offset (default: -03:00, America/Sao_Paulo)"
    )]
    pub utc_offset: Option<String>,

    /// Keep the debit when the transfer step fails instead of reversing it
    #[arg(long = "keep-debit-on-transfer-failure")]
    pub keep_debit_on_transfer_failure: bool,

    /// Run one sweep of due scheduled withdrawals after the requests
    #[arg(long = "sweep-once")]
    pub sweep_once: bool,

    /// Keep sweeping scheduled withdrawals until Ctrl-C
    #[arg(long = "watch")]
    pub watch: bool,

    /// Write final account states to this CSV file
    #[arg(long = "accounts-out", value_name = "CSV")]
    pub accounts_out: Option<PathBuf>,

    /// PostgreSQL connection string; the in-memory store is used when absent
    #[cfg(feature = "postgres")]
    #[arg(long = "database-url", value_name = "URL")]
    pub database_url: Option<String>,
}

impl CliArgs {
    /// Create an EngineConfig from CLI arguments
    ///
    /// Values not given on the command line take their defaults; invalid ones
    /// fall back to defaults with a warning.
    pub fn to_engine_config(&self) -> EngineConfig {
        let policy = if self.keep_debit_on_transfer_failure {
            SettlementFailurePolicy::KeepDebit
        } else {
            SettlementFailurePolicy::ReverseDebit
        };

        EngineConfig::new(
            self.utc_offset.as_deref(),
            self.sweep_interval_secs,
            self.max_concurrent,
            policy,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::time::Duration;

    #[rstest]
    #[case::nothing(&["program"], None, None)]
    #[case::requests_only(&["program", "--requests", "in.csv"], None, Some("in.csv"))]
    #[case::both(
        &["program", "--accounts", "acc.csv", "--requests", "in.csv"],
        Some("acc.csv"),
        Some("in.csv")
    )]
    fn test_file_options(
        #[case] args: &[&str],
        #[case] accounts: Option<&str>,
        #[case] requests: Option<&str>,
    ) {
        let parsed = CliArgs::try_parse_from(args).unwrap();
        assert_eq!(parsed.accounts_file, accounts.map(PathBuf::from));
        assert_eq!(parsed.requests_file, requests.map(PathBuf::from));
    }

    #[rstest]
    #[case::all_defaults(&["program"], num_cpus::get(), 60, -3 * 3600)]
    #[case::custom_concurrency(&["program", "--max-concurrent", "8"], 8, 60, -3 * 3600)]
    #[case::custom_interval(&["program", "--sweep-interval-secs", "5"], num_cpus::get(), 5, -3 * 3600)]
    #[case::custom_offset(&["program", "--utc-offset", "-05:00"], num_cpus::get(), 60, -5 * 3600)]
    #[case::zero_concurrency_fallback(&["program", "--max-concurrent", "0"], num_cpus::get(), 60, -3 * 3600)]
    #[case::zero_interval_fallback(&["program", "--sweep-interval-secs", "0"], num_cpus::get(), 60, -3 * 3600)]
    #[case::bad_offset_fallback(&["program", "--utc-offset", "BRT"], num_cpus::get(), 60, -3 * 3600)]
    fn test_engine_config_conversion(
        #[case] args: &[&str],
        #[case] expected_concurrency: usize,
        #[case] expected_interval: u64,
        #[case] expected_offset: i32,
    ) {
        let config = CliArgs::try_parse_from(args).unwrap().to_engine_config();

        assert_eq!(config.max_concurrent_requests, expected_concurrency);
        assert_eq!(config.sweep_interval, Duration::from_secs(expected_interval));
        assert_eq!(config.business_time.offset().local_minus_utc(), expected_offset);
    }

    #[rstest]
    #[case::default_reverses(&["program"], SettlementFailurePolicy::ReverseDebit)]
    #[case::keep_debit(&["program", "--keep-debit-on-transfer-failure"], SettlementFailurePolicy::KeepDebit)]
    fn test_failure_policy(#[case] args: &[&str], #[case] expected: SettlementFailurePolicy) {
        let config = CliArgs::try_parse_from(args).unwrap().to_engine_config();
        assert_eq!(config.settlement_failure_policy, expected);
    }

    #[rstest]
    #[case::non_numeric_concurrency(&["program", "--max-concurrent", "many"])]
    #[case::negative_interval(&["program", "--sweep-interval-secs", "-1"])]
    #[case::unknown_flag(&["program", "--dry-run"])]
    fn test_parsing_errors(#[case] args: &[&str]) {
        assert!(CliArgs::try_parse_from(args).is_err());
    }
}
