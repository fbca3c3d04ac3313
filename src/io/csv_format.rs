//! CSV format handling for accounts, withdrawal requests and results
//!
//! This module centralizes all CSV format concerns, providing:
//! - Record structures for deserialization
//! - Conversion from CSV records to domain types, including the
//!   request-shape validation that happens before a request reaches the core
//! - Account and result serialization
//!
//! All functions are pure (no I/O) for easy testing.

use crate::core::clock::BusinessTime;
use crate::types::{
    Account, PixData, WithdrawError, WithdrawRequest, WithdrawalView, MONEY_SCALE,
};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::io::Write;
use std::str::FromStr;
use uuid::Uuid;

/// Account provisioning row: `id,tax_id,name,balance`
///
/// `id` may be left empty to have one generated.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct AccountCsvRecord {
    #[serde(default)]
    pub id: Option<String>,
    pub tax_id: String,
    pub name: String,
    pub balance: String,
}

/// Withdrawal request row:
/// `account_id,method,amount,pix_type,pix_key,schedule,correlation_id`
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct RequestCsvRecord {
    pub account_id: String,
    #[serde(default)]
    pub method: Option<String>,
    #[serde(default)]
    pub amount: Option<String>,
    #[serde(default)]
    pub pix_type: Option<String>,
    #[serde(default)]
    pub pix_key: Option<String>,
    #[serde(default)]
    pub schedule: Option<String>,
    #[serde(default)]
    pub correlation_id: Option<String>,
}

/// One processed request row, ready to be written
#[derive(Debug, Clone)]
pub struct RequestOutcome {
    /// 1-based line number in the request file
    pub line: u64,
    /// Account id as written in the request file
    pub account_id: String,
    pub result: Result<WithdrawalView, WithdrawError>,
}

fn non_empty(field: Option<String>) -> Option<String> {
    field
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

/// Convert an AccountCsvRecord to an Account
///
/// # Returns
///
/// * `Ok(Account)` - balance rounded to two decimal places
/// * `Err(String)` - description of the conversion failure
pub fn convert_account_record(record: AccountCsvRecord) -> Result<Account, String> {
    let balance = Decimal::from_str(record.balance.trim())
        .map_err(|_| format!("Invalid balance '{}' for tax id {}", record.balance, record.tax_id))?;

    if record.tax_id.trim().is_empty() {
        return Err("Account tax id is required".to_string());
    }

    let mut account = Account::new(record.tax_id.trim(), record.name.trim(), balance);
    if let Some(raw_id) = non_empty(record.id) {
        account.id = Uuid::parse_str(&raw_id)
            .map_err(|_| format!("Invalid account id '{}'", raw_id))?;
    }
    Ok(account)
}

/// Convert a RequestCsvRecord to a WithdrawRequest
///
/// This is the request-shape boundary: required fields present, amount
/// numeric and positive, schedule parseable. Naive schedule timestamps are
/// read in the business timezone.
///
/// # Returns
///
/// * `Ok(WithdrawRequest)` - ready for the orchestrator
/// * `Err(InvalidRequest)` - malformed field, with a pt-BR message
/// * `Err(AccountNotFound)` - the account id is not a valid identifier
pub fn convert_request_record(
    record: RequestCsvRecord,
    business_time: &BusinessTime,
) -> Result<WithdrawRequest, WithdrawError> {
    let account_id = Uuid::parse_str(record.account_id.trim())
        .map_err(|_| WithdrawError::account_not_found(record.account_id.trim()))?;

    let method = non_empty(record.method).ok_or_else(|| {
        WithdrawError::invalid_request("method", "O método de saque é obrigatório.")
    })?;
    let pix_type = non_empty(record.pix_type).ok_or_else(|| {
        WithdrawError::invalid_request("pix.type", "O tipo de chave PIX é obrigatório.")
    })?;
    let pix_key = non_empty(record.pix_key)
        .ok_or_else(|| WithdrawError::invalid_request("pix.key", "A chave PIX é obrigatória."))?;

    let raw_amount = non_empty(record.amount).ok_or_else(|| {
        WithdrawError::invalid_request("amount", "O valor do saque é obrigatório.")
    })?;
    let amount = Decimal::from_str(&raw_amount)
        .map_err(|_| {
            WithdrawError::invalid_request("amount", "O valor do saque deve ser numérico.")
        })?
        .round_dp(MONEY_SCALE);
    if amount <= Decimal::ZERO {
        return Err(WithdrawError::invalid_request(
            "amount",
            "O valor do saque deve ser maior que zero.",
        ));
    }

    let mut request = WithdrawRequest::new(account_id, &method, amount, PixData::new(pix_type, pix_key));

    if let Some(raw_schedule) = non_empty(record.schedule) {
        let schedule = business_time.parse_schedule(&raw_schedule).ok_or_else(|| {
            WithdrawError::invalid_request(
                "schedule",
                "A data de agendamento deve ser uma data válida.",
            )
        })?;
        request = request.scheduled_for(schedule);
    }

    if let Some(correlation_id) = non_empty(record.correlation_id) {
        request = request.with_correlation_id(correlation_id);
    }

    Ok(request)
}

/// Write account states to CSV format
///
/// Columns: id, tax_id, name, balance, locked. Sorted by id.
pub fn write_accounts_csv(accounts: &[Account], output: &mut dyn Write) -> Result<(), String> {
    use csv::Writer;

    let mut writer = Writer::from_writer(output);

    writer
        .write_record(["id", "tax_id", "name", "balance", "locked"])
        .map_err(|e| format!("Failed to write CSV header: {}", e))?;

    let mut sorted_accounts = accounts.to_vec();
    sorted_accounts.sort_by_key(|account| account.id);

    for account in sorted_accounts {
        writer
            .write_record(&[
                account.id.to_string(),
                account.tax_id,
                account.name,
                format!("{:.2}", account.balance),
                account.locked.to_string(),
            ])
            .map_err(|e| format!("Failed to write account record: {}", e))?;
    }

    writer
        .flush()
        .map_err(|e| format!("Failed to flush output: {}", e))?;

    Ok(())
}

/// Write one result row per request, in line order
///
/// Columns: line, withdrawal_id, account_id, method, amount, scheduled_for,
/// status, code, message. Rejected requests carry the error code and the
/// user-facing message; accepted ones carry status `pending`, `done` or
/// `failed` and code 200.
pub fn write_results_csv(
    outcomes: &[RequestOutcome],
    business_time: &BusinessTime,
    output: &mut dyn Write,
) -> Result<(), String> {
    use csv::Writer;

    let mut writer = Writer::from_writer(output);

    writer
        .write_record([
            "line",
            "withdrawal_id",
            "account_id",
            "method",
            "amount",
            "scheduled_for",
            "status",
            "code",
            "message",
        ])
        .map_err(|e| format!("Failed to write CSV header: {}", e))?;

    let mut sorted: Vec<&RequestOutcome> = outcomes.iter().collect();
    sorted.sort_by_key(|outcome| outcome.line);

    for outcome in sorted {
        let row = match &outcome.result {
            Ok(view) => {
                let withdrawal = &view.withdrawal;
                let message = match &withdrawal.error_reason {
                    Some(reason) if withdrawal.error => reason.clone(),
                    _ => view.success_message().to_string(),
                };
                [
                    outcome.line.to_string(),
                    withdrawal.id.to_string(),
                    withdrawal.account_id.to_string(),
                    withdrawal.method.clone(),
                    format!("{:.2}", withdrawal.amount),
                    withdrawal
                        .scheduled_for
                        .map(|at| business_time.format(at))
                        .unwrap_or_default(),
                    withdrawal.status().to_string(),
                    "200".to_string(),
                    message,
                ]
            }
            Err(e) => {
                let response = e.to_response();
                [
                    outcome.line.to_string(),
                    String::new(),
                    outcome.account_id.clone(),
                    String::new(),
                    String::new(),
                    String::new(),
                    "rejected".to_string(),
                    response.code.to_string(),
                    response.message,
                ]
            }
        };

        writer
            .write_record(&row)
            .map_err(|e| format!("Failed to write result record: {}", e))?;
    }

    writer
        .flush()
        .map_err(|e| format!("Failed to flush output: {}", e))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{MethodDetail, PixKeyType, Withdrawal};
    use chrono::{TimeZone, Utc};
    use rstest::rstest;

    const ACCOUNT: &str = "0190a4b2-7c3e-7d1a-9f00-000000000001";

    fn request_record(amount: Option<&str>, schedule: Option<&str>) -> RequestCsvRecord {
        RequestCsvRecord {
            account_id: ACCOUNT.to_string(),
            method: Some("pix".to_string()),
            amount: amount.map(str::to_string),
            pix_type: Some("email".to_string()),
            pix_key: Some("user@example.com".to_string()),
            schedule: schedule.map(str::to_string),
            correlation_id: None,
        }
    }

    #[test]
    fn test_convert_request_record_valid() {
        let record = RequestCsvRecord {
            correlation_id: Some(" req-1 ".to_string()),
            ..request_record(Some(" 150.5 "), None)
        };

        let request = convert_request_record(record, &BusinessTime::sao_paulo()).unwrap();

        assert_eq!(request.account_id, Uuid::parse_str(ACCOUNT).unwrap());
        assert_eq!(request.method, "PIX");
        assert_eq!(request.amount, Decimal::new(15050, 2));
        assert_eq!(request.pix, PixData::new("email", "user@example.com"));
        assert_eq!(request.correlation_id.as_deref(), Some("req-1"));
        assert!(!request.is_scheduled());
    }

    #[test]
    fn test_convert_request_record_naive_schedule() {
        let record = request_record(Some("10"), Some("2026-07-01 08:00:00"));
        let request = convert_request_record(record, &BusinessTime::sao_paulo()).unwrap();

        assert_eq!(
            request.schedule.map(|at| at.with_timezone(&Utc)),
            Some(Utc.with_ymd_and_hms(2026, 7, 1, 11, 0, 0).unwrap())
        );
    }

    #[rstest]
    #[case::missing_amount(None, None, "amount", "O valor do saque é obrigatório.")]
    #[case::blank_amount(Some("  "), None, "amount", "O valor do saque é obrigatório.")]
    #[case::non_numeric(Some("ten"), None, "amount", "O valor do saque deve ser numérico.")]
    #[case::zero(Some("0"), None, "amount", "O valor do saque deve ser maior que zero.")]
    #[case::negative(Some("-5.00"), None, "amount", "O valor do saque deve ser maior que zero.")]
    #[case::rounds_to_zero(Some("0.001"), None, "amount", "O valor do saque deve ser maior que zero.")]
    #[case::bad_schedule(Some("10"), Some("next week"), "schedule", "A data de agendamento deve ser uma data válida.")]
    fn test_convert_request_record_shape_errors(
        #[case] amount: Option<&str>,
        #[case] schedule: Option<&str>,
        #[case] expected_field: &str,
        #[case] expected_reason: &str,
    ) {
        let result = convert_request_record(request_record(amount, schedule), &BusinessTime::sao_paulo());
        assert_eq!(
            result,
            Err(WithdrawError::invalid_request(expected_field, expected_reason))
        );
    }

    #[rstest]
    #[case::method("method")]
    #[case::pix_type("pix.type")]
    #[case::pix_key("pix.key")]
    fn test_convert_request_record_required_fields(#[case] field: &str) {
        let mut record = request_record(Some("10"), None);
        match field {
            "method" => record.method = None,
            "pix.type" => record.pix_type = Some(String::new()),
            "pix.key" => record.pix_key = None,
            _ => unreachable!(),
        }

        let error = convert_request_record(record, &BusinessTime::sao_paulo()).unwrap_err();
        assert!(matches!(error, WithdrawError::InvalidRequest { field: ref f, .. } if f == field));
    }

    #[test]
    fn test_convert_request_record_bad_account_id() {
        let record = RequestCsvRecord {
            account_id: "42".to_string(),
            ..request_record(Some("10"), None)
        };
        assert_eq!(
            convert_request_record(record, &BusinessTime::sao_paulo()),
            Err(WithdrawError::account_not_found("42"))
        );
    }

    #[rstest]
    #[case::generated_id(None, true)]
    #[case::explicit_id(Some(ACCOUNT), true)]
    #[case::bad_id(Some("abc"), false)]
    fn test_convert_account_record(#[case] id: Option<&str>, #[case] ok: bool) {
        let record = AccountCsvRecord {
            id: id.map(str::to_string),
            tax_id: "12345678901".to_string(),
            name: "Maria".to_string(),
            balance: "1000.456".to_string(),
        };

        let result = convert_account_record(record);
        assert_eq!(result.is_ok(), ok);
        if let Ok(account) = result {
            assert_eq!(account.balance, Decimal::new(100046, 2));
            if let Some(id) = id {
                assert_eq!(account.id.to_string(), id);
            }
        }
    }

    #[test]
    fn test_write_accounts_csv() {
        let mut account = Account::new("12345678901", "Maria", Decimal::new(40000, 2));
        account.id = Uuid::parse_str(ACCOUNT).unwrap();

        let mut output = Vec::new();
        write_accounts_csv(&[account], &mut output).unwrap();

        assert_eq!(
            String::from_utf8(output).unwrap(),
            format!("id,tax_id,name,balance,locked\n{},12345678901,Maria,400.00,false\n", ACCOUNT)
        );
    }

    #[test]
    fn test_write_results_csv_orders_by_line() {
        let account = Account::new("1", "Maria", Decimal::new(10000, 2));
        let mut withdrawal = Withdrawal::new(account.id, "PIX", Decimal::new(2500, 2), None, Utc::now());
        withdrawal.mark_done(Utc::now()).unwrap();
        let detail = MethodDetail::new(withdrawal.id, PixKeyType::Email, "m@example.com");
        let outcomes = vec![
            RequestOutcome {
                line: 3,
                account_id: "nope".to_string(),
                result: Err(WithdrawError::account_not_found("nope")),
            },
            RequestOutcome {
                line: 2,
                account_id: account.id.to_string(),
                result: Ok(WithdrawalView {
                    withdrawal: withdrawal.clone(),
                    detail: Some(detail),
                    account: account.clone(),
                }),
            },
        ];

        let mut output = Vec::new();
        write_results_csv(&outcomes, &BusinessTime::sao_paulo(), &mut output).unwrap();
        let text = String::from_utf8(output).unwrap();
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(lines.len(), 3);
        assert_eq!(
            lines[1],
            format!(
                "2,{},{},PIX,25.00,,done,200,Saque realizado com sucesso",
                withdrawal.id, account.id
            )
        );
        assert_eq!(lines[2], "3,,nope,,,,rejected,404,Conta não encontrada: nope");
    }
}
