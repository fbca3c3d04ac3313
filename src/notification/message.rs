//! Withdrawal confirmation message
//!
//! Plain-text confirmation in pt-BR. Amounts use Brazilian formatting
//! (`1.234,56`) and timestamps are rendered in the business timezone.

use crate::core::clock::BusinessTime;
use crate::types::{WithdrawalId, WithdrawalView, MONEY_SCALE};
use rust_decimal::Decimal;

/// Default `From:` address
pub const DEFAULT_SENDER: &str = "noreply@tecnofit.com";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfirmationMessage {
    pub withdrawal_id: WithdrawalId,
    pub from: String,
    pub to: String,
    pub subject: String,
    pub body: String,
}

impl ConfirmationMessage {
    pub fn build(
        view: &WithdrawalView,
        recipient: &str,
        sender: &str,
        business_time: &BusinessTime,
    ) -> Self {
        let withdrawal = &view.withdrawal;
        let amount = format_brl(withdrawal.amount);
        let date_time = business_time
            .at(withdrawal.created_at)
            .format("%d/%m/%Y %H:%M:%S")
            .to_string();
        let (key_label, key) = match &view.detail {
            Some(detail) => (detail.key_type.label(), detail.key.as_str()),
            None => ("-", "-"),
        };

        let body = format!(
            "TECNOFIT - CONFIRMAÇÃO DE SAQUE {method}\n\
             \n\
             Olá {name},\n\
             \n\
             Seu saque via {method} foi processado com sucesso.\n\
             \n\
             DETALHES DA TRANSAÇÃO:\n\
             - Valor: R$ {amount}\n\
             - Data e Hora: {date_time}\n\
             - Método: {method}\n\
             - Tipo de Chave: {key_label}\n\
             - Chave PIX: {key}\n\
             - ID da Transação: {id}\n\
             \n\
             Se você não reconhece esta transação, entre em contato conosco imediatamente.\n\
             \n\
             ---\n\
             Este é um email automático. Por favor, não responda.\n\
             © TecnoFit - Todos os direitos reservados",
            method = withdrawal.method,
            name = view.account.name,
            amount = amount,
            date_time = date_time,
            key_label = key_label,
            key = key,
            id = withdrawal.id,
        );

        ConfirmationMessage {
            withdrawal_id: withdrawal.id,
            from: sender.to_string(),
            to: recipient.to_string(),
            subject: format!(
                "TecnoFit - Confirmação de Saque {} - R$ {}",
                withdrawal.method, amount
            ),
            body,
        }
    }
}

/// Format an amount as `1.234,56`
pub fn format_brl(amount: Decimal) -> String {
    let rounded = amount.round_dp(MONEY_SCALE);
    let plain = format!("{:.2}", rounded.abs());
    let (integer, fraction) = plain.split_once('.').unwrap_or((plain.as_str(), "00"));

    let digits: Vec<char> = integer.chars().collect();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, digit) in digits.iter().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push('.');
        }
        grouped.push(*digit);
    }

    let sign = if rounded.is_sign_negative() && !rounded.is_zero() {
        "-"
    } else {
        ""
    };
    format!("{}{},{}", sign, grouped, fraction)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Account, MethodDetail, PixKeyType, Withdrawal};
    use chrono::{TimeZone, Utc};
    use rstest::rstest;

    #[rstest]
    #[case(Decimal::new(123456, 2), "1.234,56")]
    #[case(Decimal::new(100, 2), "1,00")]
    #[case(Decimal::new(5, 1), "0,50")]
    #[case(Decimal::new(100000000, 2), "1.000.000,00")]
    #[case(Decimal::new(99999, 2), "999,99")]
    #[case(Decimal::new(-123456, 2), "-1.234,56")]
    fn test_format_brl(#[case] amount: Decimal, #[case] expected: &str) {
        assert_eq!(format_brl(amount), expected);
    }

    #[test]
    fn test_build_confirmation() {
        let account = Account::new("12345678901", "Maria Silva", Decimal::new(500000, 2));
        let created = Utc.with_ymd_and_hms(2026, 3, 15, 13, 30, 0).unwrap();
        let withdrawal = Withdrawal::new(account.id, "PIX", Decimal::new(123456, 2), None, created);
        let detail = MethodDetail::new(withdrawal.id, PixKeyType::Email, "maria@example.com");
        let view = WithdrawalView {
            withdrawal,
            detail: Some(detail),
            account,
        };

        let message = ConfirmationMessage::build(
            &view,
            "maria@example.com",
            DEFAULT_SENDER,
            &BusinessTime::sao_paulo(),
        );

        assert_eq!(message.subject, "TecnoFit - Confirmação de Saque PIX - R$ 1.234,56");
        assert_eq!(message.from, DEFAULT_SENDER);
        assert_eq!(message.to, "maria@example.com");
        assert!(message.body.contains("Olá Maria Silva,"));
        assert!(message.body.contains("- Data e Hora: 15/03/2026 10:30:00"));
        assert!(message.body.contains("- Tipo de Chave: E-mail"));
        assert!(message
            .body
            .contains(&format!("- ID da Transação: {}", view.withdrawal.id)));
    }
}
