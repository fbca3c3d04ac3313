//! I/O module
//!
//! Handles the CSV boundary of the engine.
//!
//! # Components
//!
//! - `csv_format` - record structures, request-shape validation, output serialization
//! - `account_reader` - synchronous account provisioning reader
//! - `request_reader` - asynchronous batched withdrawal request reader

pub mod account_reader;
pub mod csv_format;
pub mod request_reader;

pub use account_reader::AccountReader;
pub use csv_format::{
    convert_account_record, convert_request_record, write_accounts_csv, write_results_csv,
    AccountCsvRecord, RequestCsvRecord, RequestOutcome,
};
pub use request_reader::{ParsedRequest, RequestReader};
