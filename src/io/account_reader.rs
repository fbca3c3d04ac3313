//! Synchronous account provisioning reader
//!
//! Reads `id,tax_id,name,balance` rows with `csv::Reader` one at a time.
//! Invalid rows are yielded as `Err` with their line number so the caller
//! can log them and carry on.

use crate::io::csv_format::{convert_account_record, AccountCsvRecord};
use crate::types::Account;
use csv::{ReaderBuilder, Trim};
use std::fs::File;
use std::path::Path;

#[derive(Debug)]
pub struct AccountReader {
    reader: csv::Reader<File>,
    line_num: usize,
}

impl AccountReader {
    /// Open an account file
    ///
    /// # Returns
    ///
    /// * `Ok(AccountReader)` if file opened successfully
    /// * `Err(String)` if file could not be opened
    pub fn new(path: &Path) -> Result<Self, String> {
        let file = File::open(path)
            .map_err(|e| format!("Failed to open file '{}': {}", path.display(), e))?;

        let reader = ReaderBuilder::new()
            .trim(Trim::All)
            .flexible(true)
            .buffer_capacity(8 * 1024)
            .from_reader(file);

        Ok(Self {
            reader,
            line_num: 1,
        })
    }
}

impl Iterator for AccountReader {
    type Item = Result<Account, String>;

    fn next(&mut self) -> Option<Self::Item> {
        let mut deserializer = self.reader.deserialize::<AccountCsvRecord>();
        let next = deserializer.next()?;
        self.line_num += 1;

        Some(match next {
            Ok(record) => convert_account_record(record)
                .map_err(|e| format!("Line {}: {}", self.line_num, e)),
            Err(e) => Err(format!("Line {}: CSV parse error: {}", self.line_num, e)),
        })
    }
}
