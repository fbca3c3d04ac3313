//! Withdrawal Engine CLI
//!
//! Command-line interface for processing withdrawal requests from CSV files.
//!
//! # Usage
//!
//! ```bash
//! cargo run -- --accounts accounts.csv --requests requests.csv > results.csv
//! cargo run -- --accounts accounts.csv --requests requests.csv --sweep-once --accounts-out final.csv
//! cargo run -- --accounts accounts.csv --requests requests.csv --watch --sweep-interval-secs 10
//! RUST_LOG=debug cargo run -- --requests requests.csv --max-concurrent 8
//! ```
//!
//! The program provisions accounts, runs each request through the withdrawal
//! orchestrator and writes one result row per request to stdout. Logs go to
//! stderr.
//!
//! # Exit Codes
//!
//! - 0: Success (rejected requests are reported in the output, not as failures)
//! - 1: Error (file not found, file not readable, store unavailable, etc.)

use std::process;
use tracing_subscriber::EnvFilter;
use withdrawal_engine::cli;
use withdrawal_engine::runner::{RunOptions, WithdrawalRunner};

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let args = cli::parse_args();
    let runner = WithdrawalRunner::new(args.to_engine_config());

    let mut output = std::io::stdout();
    if let Err(e) = runner.run(&RunOptions::from(&args), &mut output) {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}
