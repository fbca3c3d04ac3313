//! Engine runner
//!
//! Wires the store, method registry, notification dispatcher, orchestrator
//! and sweeper together, and drives them from CSV files.
//!
//! # Architecture
//!
//! ```text
//! WithdrawalRunner
//!     ├── EngineConfig
//!     ├── AccountReader ─────────► AccountStore (memory, or postgres)
//!     ├── RequestReader (batches)
//!     │     └── buffer_unordered(max_concurrent) ─► WithdrawalOrchestrator::withdraw
//!     ├── write_results_csv ─────► output
//!     └── ScheduledWithdrawalSweeper (once, or until Ctrl-C)
//! ```
//!
//! Requests within a batch run concurrently, so several requests against the
//! same account genuinely contend for its row lock.

use crate::cli::CliArgs;
use crate::config::EngineConfig;
use crate::core::{
    AccountStore, MemoryAccountStore, ScheduledWithdrawalSweeper, SystemClock,
    WithdrawalOrchestrator,
};
use crate::io::{
    write_accounts_csv, write_results_csv, AccountReader, ParsedRequest, RequestOutcome,
    RequestReader,
};
use crate::method::MethodRegistry;
use crate::notification::{LogNotifier, NotificationDispatcher};
use futures::stream::{self, StreamExt};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Rows read from the request file per batch
const REQUEST_BATCH_SIZE: usize = 1000;

/// What to do in one run
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub accounts_file: Option<PathBuf>,
    pub requests_file: Option<PathBuf>,
    pub sweep_once: bool,
    pub watch: bool,
    pub accounts_out: Option<PathBuf>,
    #[cfg(feature = "postgres")]
    pub database_url: Option<String>,
}

impl From<&CliArgs> for RunOptions {
    fn from(args: &CliArgs) -> Self {
        Self {
            accounts_file: args.accounts_file.clone(),
            requests_file: args.requests_file.clone(),
            sweep_once: args.sweep_once,
            watch: args.watch,
            accounts_out: args.accounts_out.clone(),
            #[cfg(feature = "postgres")]
            database_url: args.database_url.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct WithdrawalRunner {
    config: EngineConfig,
}

impl WithdrawalRunner {
    pub fn new(config: EngineConfig) -> Self {
        Self { config }
    }

    /// Run the engine on a fresh multi-threaded tokio runtime
    ///
    /// # Arguments
    ///
    /// * `options` - input files and sweep mode
    /// * `output` - receives the result CSV (one row per request)
    ///
    /// # Returns
    ///
    /// * `Ok(())` if the run completed. Rejected requests are results, not errors.
    /// * `Err(String)` on fatal failures (unreadable files, store unavailable, I/O)
    pub fn run(&self, options: &RunOptions, output: &mut dyn Write) -> Result<(), String> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(self.config.max_concurrent_requests)
            .enable_all()
            .build()
            .map_err(|e| format!("Failed to create tokio runtime: {}", e))?;

        runtime.block_on(self.run_async(options, output))
    }

    /// Same as [`WithdrawalRunner::run`], on the caller's runtime
    pub async fn run_async(&self, options: &RunOptions, output: &mut dyn Write) -> Result<(), String> {
        let store = self.open_store(options).await?;

        if let Some(path) = &options.accounts_file {
            load_accounts(store.as_ref(), path).await?;
        }

        let orchestrator = Arc::new(WithdrawalOrchestrator::new(
            Arc::clone(&store),
            Arc::new(MethodRegistry::with_defaults()),
            NotificationDispatcher::new(
                Arc::new(LogNotifier),
                self.config.business_time,
                self.config.sender_address.clone(),
            ),
            Arc::new(SystemClock),
            &self.config,
        ));

        if let Some(path) = &options.requests_file {
            let outcomes = self.process_requests(&orchestrator, path).await?;
            write_results_csv(&outcomes, &self.config.business_time, output)?;
        }

        let sweeper = ScheduledWithdrawalSweeper::new(
            Arc::clone(&orchestrator),
            self.config.sweep_interval,
        );
        if options.sweep_once {
            sweeper.process_due_scheduled().await;
        }
        if options.watch {
            let shutdown = CancellationToken::new();
            let on_signal = shutdown.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    info!("Shutdown requested");
                    on_signal.cancel();
                }
            });
            sweeper.run(shutdown).await;
        }

        if let Some(path) = &options.accounts_out {
            let accounts = store
                .list_accounts()
                .await
                .map_err(|e| format!("Failed to list accounts: {}", e))?;
            let mut file = std::fs::File::create(path)
                .map_err(|e| format!("Failed to create file '{}': {}", path.display(), e))?;
            write_accounts_csv(&accounts, &mut file)?;
        }

        Ok(())
    }

    async fn open_store(&self, options: &RunOptions) -> Result<Arc<dyn AccountStore>, String> {
        #[cfg(feature = "postgres")]
        if let Some(url) = &options.database_url {
            let max_connections = u32::try_from(self.config.max_concurrent_requests + 1).unwrap_or(u32::MAX);
            let store = crate::core::PostgresAccountStore::connect(url, max_connections)
                .await
                .map_err(|e| format!("Failed to connect to database: {}", e))?;
            store
                .migrate()
                .await
                .map_err(|e| format!("Failed to prepare database schema: {}", e))?;
            info!("Using PostgreSQL account store");
            return Ok(Arc::new(store));
        }

        #[cfg(not(feature = "postgres"))]
        let _ = options;

        Ok(Arc::new(MemoryAccountStore::new()))
    }

    /// Feed every request row through the orchestrator
    ///
    /// # Returns
    ///
    /// One outcome per data row, in completion order.
    pub async fn process_requests(
        &self,
        orchestrator: &Arc<WithdrawalOrchestrator>,
        path: &Path,
    ) -> Result<Vec<RequestOutcome>, String> {
        let file = tokio::fs::File::open(path)
            .await
            .map_err(|e| format!("Failed to open file '{}': {}", path.display(), e))?;

        // Wrap tokio file in a compatibility layer for csv-async
        let compat_file = tokio_util::compat::TokioAsyncReadCompatExt::compat(file);
        let mut reader = RequestReader::new(compat_file, self.config.business_time);

        let mut outcomes = Vec::new();
        loop {
            let batch = reader.read_batch(REQUEST_BATCH_SIZE).await;
            if batch.is_empty() {
                break;
            }

            let results: Vec<RequestOutcome> = stream::iter(batch)
                .map(|parsed| handle_request(Arc::clone(orchestrator), parsed))
                .buffer_unordered(self.config.max_concurrent_requests)
                .collect()
                .await;
            outcomes.extend(results);
        }

        let accepted = outcomes.iter().filter(|o| o.result.is_ok()).count();
        info!(
            total = outcomes.len(),
            accepted,
            rejected = outcomes.len() - accepted,
            "Withdrawal requests processed"
        );
        Ok(outcomes)
    }
}

async fn handle_request(orchestrator: Arc<WithdrawalOrchestrator>, parsed: ParsedRequest) -> RequestOutcome {
    let result = match parsed.request {
        Ok(request) => orchestrator.withdraw(request).await,
        Err(e) => Err(e),
    };
    RequestOutcome {
        line: parsed.line,
        account_id: parsed.account_id,
        result,
    }
}

async fn load_accounts(store: &dyn AccountStore, path: &Path) -> Result<(), String> {
    let reader = AccountReader::new(path)?;
    let mut loaded = 0usize;

    for row in reader {
        match row {
            Ok(account) => match store.insert_account(&account).await {
                Ok(()) => loaded += 1,
                Err(e) => warn!(account_id = %account.id, error = %e, "Account not provisioned"),
            },
            Err(e) => warn!(error = %e, "Invalid account row"),
        }
    }

    info!(count = loaded, "Accounts provisioned");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    /// Helper function to create a temporary CSV file for testing
    fn create_temp_csv(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().expect("Failed to create temp file");
        file.write_all(content.as_bytes())
            .expect("Failed to write to temp file");
        file.flush().expect("Failed to flush temp file");
        file
    }

    const ACCOUNT_ID: &str = "0190a4b2-7c3e-7d1a-9f00-0000000000aa";

    #[test]
    fn test_run_processes_requests_and_writes_accounts() {
        let accounts = create_temp_csv(&format!(
            "id,tax_id,name,balance\n{},12345678901,Maria,100.00\n",
            ACCOUNT_ID
        ));
        let requests = create_temp_csv(&format!(
            "account_id,method,amount,pix_type,pix_key,schedule,correlation_id\n\
             {id},PIX,30.00,email,maria@example.com,,\n\
             {id},PIX,500.00,email,maria@example.com,,\n",
            id = ACCOUNT_ID
        ));
        let accounts_out = NamedTempFile::new().unwrap();

        let options = RunOptions {
            accounts_file: Some(accounts.path().to_path_buf()),
            requests_file: Some(requests.path().to_path_buf()),
            accounts_out: Some(accounts_out.path().to_path_buf()),
            ..RunOptions::default()
        };
        let config = EngineConfig {
            max_concurrent_requests: 1,
            ..EngineConfig::default()
        };

        let mut output = Vec::new();
        WithdrawalRunner::new(config).run(&options, &mut output).unwrap();

        let results = String::from_utf8(output).unwrap();
        let lines: Vec<&str> = results.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[1].starts_with("2,"));
        assert!(lines[1].ends_with(",done,200,Saque realizado com sucesso"));
        assert!(lines[2].starts_with("3,,"));
        assert!(lines[2].contains(",rejected,422,"));

        let accounts_csv = std::fs::read_to_string(accounts_out.path()).unwrap();
        assert!(accounts_csv.contains(&format!("{},12345678901,Maria,70.00,false", ACCOUNT_ID)));
    }

    #[test]
    fn test_run_fails_on_missing_request_file() {
        let options = RunOptions {
            requests_file: Some(PathBuf::from("nonexistent.csv")),
            ..RunOptions::default()
        };

        let mut output = Vec::new();
        let result = WithdrawalRunner::new(EngineConfig::default()).run(&options, &mut output);
        assert!(result.unwrap_err().contains("Failed to open file"));
    }
}
