//! Asynchronous withdrawal request reader
//!
//! Streams request rows from a CSV source in batches, converting each one
//! through `csv_format::convert_request_record`. Every data row yields
//! exactly one [`ParsedRequest`], so rejected rows still get a result line.
//!
//! # Architecture
//!
//! ```text
//! CSV source → RequestReader → Batches of ParsedRequest
//!                   ↓
//!            csv_format module
//!            (RequestCsvRecord, convert_request_record)
//! ```

use crate::core::clock::BusinessTime;
use crate::io::csv_format::{convert_request_record, RequestCsvRecord};
use crate::types::{WithdrawError, WithdrawRequest};
use csv_async::AsyncReaderBuilder;
use futures::io::AsyncRead;
use futures::stream::StreamExt;
use tracing::warn;

/// A request row after shape validation
#[derive(Debug, Clone)]
pub struct ParsedRequest {
    /// 1-based line number, header included
    pub line: u64,
    /// Account id exactly as written in the row
    pub account_id: String,
    pub request: Result<WithdrawRequest, WithdrawError>,
}

pub struct RequestReader<R: AsyncRead + Unpin> {
    csv_reader: csv_async::AsyncDeserializer<R>,
    business_time: BusinessTime,
    rows_read: u64,
}

impl<R: AsyncRead + Unpin + Send + 'static> RequestReader<R> {
    pub fn new(reader: R, business_time: BusinessTime) -> Self {
        let csv_reader = AsyncReaderBuilder::new()
            .flexible(true)
            .trim(csv_async::Trim::All)
            .create_deserializer(reader);

        Self {
            csv_reader,
            business_time,
            rows_read: 0,
        }
    }

    /// Read up to `batch_size` rows
    ///
    /// # Returns
    ///
    /// Parsed rows in file order; an empty vector at end of input.
    pub async fn read_batch(&mut self, batch_size: usize) -> Vec<ParsedRequest> {
        let mut batch = Vec::with_capacity(batch_size);
        let business_time = self.business_time;
        let mut rows_read = self.rows_read;
        let mut records = self.csv_reader.deserialize::<RequestCsvRecord>();

        while batch.len() < batch_size {
            let Some(next) = records.next().await else {
                break;
            };
            rows_read += 1;
            let line = rows_read + 1;

            let parsed = match next {
                Ok(record) => ParsedRequest {
                    line,
                    account_id: record.account_id.trim().to_string(),
                    request: convert_request_record(record, &business_time),
                },
                Err(e) => {
                    warn!(line, error = %e, "CSV parse error");
                    ParsedRequest {
                        line,
                        account_id: String::new(),
                        request: Err(WithdrawError::invalid_request(
                            "row",
                            format!("Linha {} inválida: {}", line, e),
                        )),
                    }
                }
            };
            batch.push(parsed);
        }

        drop(records);
        self.rows_read = rows_read;
        batch
    }
}
