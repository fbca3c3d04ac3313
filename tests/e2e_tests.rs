//! End-to-end integration tests
//!
//! These tests validate the complete withdrawal pipeline using predefined CSV
//! test fixtures. Each test:
//! 1. Provisions accounts.csv from a fixture directory
//! 2. Runs every row of requests.csv through the engine
//! 3. Compares the result CSV with expected_results.csv
//! 4. Compares the final account states with expected_accounts.csv
//!
//! Withdrawal ids are generated per run, so the `withdrawal_id` column is
//! checked for presence and then dropped before comparing.
//!
//! Test fixtures are located in tests/fixtures/ and cover:
//! - Happy path scenarios
//! - Insufficient balance
//! - Invalid requests (shape, method, PIX key, account, schedule)
//! - Scheduled withdrawals
//!
//! Fixtures run one request at a time so results are deterministic. The
//! contention test at the bottom checks concurrent runs by their final
//! balances only.

#[cfg(test)]
mod tests {
    use rstest::rstest;
    use std::fs;
    use std::io::Write;
    use std::path::{Path, PathBuf};
    use tempfile::NamedTempFile;
    use withdrawal_engine::runner::{RunOptions, WithdrawalRunner};
    use withdrawal_engine::EngineConfig;

    fn read_records(content: &str) -> Vec<Vec<String>> {
        csv::ReaderBuilder::new()
            .has_headers(false)
            .from_reader(content.as_bytes())
            .records()
            .map(|record| {
                record
                    .expect("Invalid CSV record")
                    .iter()
                    .map(str::to_string)
                    .collect()
            })
            .collect()
    }

    /// Drop the generated withdrawal_id column, checking it is filled exactly
    /// for accepted rows
    fn without_withdrawal_ids(records: Vec<Vec<String>>) -> Vec<Vec<String>> {
        records
            .into_iter()
            .enumerate()
            .map(|(index, mut record)| {
                let id = record.remove(1);
                if index > 0 {
                    let accepted = record[5] != "rejected";
                    assert_eq!(!id.is_empty(), accepted, "withdrawal_id column in row {:?}", record);
                }
                record
            })
            .collect()
    }

    /// Run the engine over a fixture's accounts.csv and requests.csv
    ///
    /// # Returns
    ///
    /// The result CSV and the final account CSV, as written.
    fn run_engine(accounts: &Path, requests: &Path, max_concurrent: usize, sweep_once: bool) -> (String, String) {
        let accounts_out = NamedTempFile::new().expect("Failed to create temp file");
        let options = RunOptions {
            accounts_file: Some(accounts.to_path_buf()),
            requests_file: Some(requests.to_path_buf()),
            accounts_out: Some(accounts_out.path().to_path_buf()),
            sweep_once,
            ..RunOptions::default()
        };
        let config = EngineConfig {
            max_concurrent_requests: max_concurrent,
            ..EngineConfig::default()
        };

        let mut output = Vec::new();
        WithdrawalRunner::new(config)
            .run(&options, &mut output)
            .unwrap_or_else(|e| panic!("Failed to process requests: {}", e));

        let results = String::from_utf8(output).expect("Result CSV is not UTF-8");
        let final_accounts = fs::read_to_string(accounts_out.path())
            .unwrap_or_else(|e| panic!("Failed to read accounts output: {}", e));
        (results, final_accounts)
    }

    /// Run a test fixture and compare both outputs with the expected files
    ///
    /// # Panics
    ///
    /// Panics if:
    /// - Fixture files cannot be read
    /// - Either output doesn't match its expected file
    fn run_test_fixture(fixture_name: &str, sweep_once: bool) {
        let fixture_dir = PathBuf::from(format!("tests/fixtures/{}", fixture_name));
        let accounts_path = fixture_dir.join("accounts.csv");
        let requests_path = fixture_dir.join("requests.csv");
        let expected_results_path = fixture_dir.join("expected_results.csv");
        let expected_accounts_path = fixture_dir.join("expected_accounts.csv");

        for path in [&accounts_path, &requests_path, &expected_results_path, &expected_accounts_path] {
            assert!(path.exists(), "Fixture file not found: {}", path.display());
        }

        let (results, final_accounts) = run_engine(&accounts_path, &requests_path, 1, sweep_once);

        let expected_results = fs::read_to_string(&expected_results_path)
            .unwrap_or_else(|e| panic!("Failed to read {}: {}", expected_results_path.display(), e));
        assert_eq!(
            without_withdrawal_ids(read_records(&results)),
            read_records(&expected_results),
            "\n\nResult mismatch for fixture: {}\n\nActual output:\n{}\n",
            fixture_name,
            results
        );

        let expected_accounts = fs::read_to_string(&expected_accounts_path)
            .unwrap_or_else(|e| panic!("Failed to read {}: {}", expected_accounts_path.display(), e));
        assert_eq!(
            final_accounts, expected_accounts,
            "\n\nAccount mismatch for fixture: {}\n\nActual output:\n{}\n\nExpected output:\n{}\n",
            fixture_name, final_accounts, expected_accounts
        );
    }

    /// End-to-end test for all fixtures, with and without a sweep afterwards
    #[rstest]
    #[case("happy_path")]
    #[case("insufficient_funds")]
    #[case("invalid_requests")]
    #[case("scheduled")]
    fn test_fixtures(#[case] fixture: &str, #[values(false, true)] sweep_once: bool) {
        run_test_fixture(fixture, sweep_once);
    }

    fn temp_csv(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().expect("Failed to create temp file");
        file.write_all(content.as_bytes())
            .expect("Failed to write to temp file");
        file.flush().expect("Failed to flush temp file");
        file
    }

    #[rstest]
    #[case(2)]
    #[case(8)]
    fn test_concurrent_requests_on_one_account(#[case] max_concurrent: usize) {
        let account_id = "0190a4b2-7c3e-7d1a-9f00-0000000000c1";
        let accounts = temp_csv(&format!(
            "id,tax_id,name,balance\n{},33333333333,Carla,50.00\n",
            account_id
        ));
        let mut requests = String::from("account_id,method,amount,pix_type,pix_key,schedule,correlation_id\n");
        for i in 0..10 {
            requests.push_str(&format!(
                "{},PIX,10.00,email,carla@example.com,,req-{}\n",
                account_id, i
            ));
        }
        let requests = temp_csv(&requests);

        let (results, final_accounts) =
            run_engine(accounts.path(), requests.path(), max_concurrent, false);

        let records = read_records(&results);
        let done = records.iter().filter(|r| r[6] == "done").count();
        let rejected = records.iter().filter(|r| r[6] == "rejected").count();
        assert_eq!(done, 5);
        assert_eq!(rejected, 5);
        assert_eq!(
            final_accounts,
            format!("id,tax_id,name,balance,locked\n{},33333333333,Carla,0.00,false\n", account_id)
        );
    }
}
