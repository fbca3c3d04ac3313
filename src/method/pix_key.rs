//! PIX key validation per key type
//!
//! Maximum lengths follow the central bank rules:
//!
//! | type   | max | format                          |
//! |--------|-----|---------------------------------|
//! | email  | 77  | valid email address             |
//! | cpf    | 11  | digits only                     |
//! | cnpj   | 14  | digits only                     |
//! | phone  | 14  | `+5511999999999`                |
//! | random | 36  | UUID `xxxxxxxx-xxxx-...`        |
//!
//! Only email keys are validated today. The other types are recognized and
//! rejected with `NotImplemented`, which is distinct from an unknown type.

use crate::types::{PixKeyType, WithdrawError};

#[derive(Debug, Clone, Copy, Default)]
pub struct PixKeyValidator;

impl PixKeyValidator {
    pub fn new() -> Self {
        PixKeyValidator
    }

    /// Validate a raw key type and key.
    ///
    /// # Returns
    ///
    /// * `Ok(PixKeyType)` - the parsed type when the key is valid
    /// * `Err(InvalidPixKey)` - unknown type, malformed or oversized key
    /// * `Err(NotImplemented)` - recognized type with no validator yet
    pub fn validate(&self, key_type: &str, key: &str) -> Result<PixKeyType, WithdrawError> {
        let kind: PixKeyType = key_type.parse().map_err(|_| {
            WithdrawError::invalid_pix_key(
                "pix.type",
                format!(
                    "Tipo de chave PIX inválido: {}. Tipos permitidos: {}",
                    key_type,
                    self.supported_types().join(", ")
                ),
            )
        })?;

        match kind {
            PixKeyType::Email => validate_email(key)?,
            PixKeyType::Cpf => {
                return Err(WithdrawError::not_implemented(
                    "pix.cpf",
                    "Validação de chave PIX do tipo CPF ainda não implementada.",
                ))
            }
            PixKeyType::Cnpj => {
                return Err(WithdrawError::not_implemented(
                    "pix.cnpj",
                    "Validação de chave PIX do tipo CNPJ ainda não implementada.",
                ))
            }
            PixKeyType::Phone => {
                return Err(WithdrawError::not_implemented(
                    "pix.phone",
                    "Validação de chave PIX do tipo telefone ainda não implementada.",
                ))
            }
            PixKeyType::Random => {
                return Err(WithdrawError::not_implemented(
                    "pix.random",
                    "Validação de chave PIX do tipo aleatória ainda não implementada.",
                ))
            }
        }

        Ok(kind)
    }

    pub fn supported_types(&self) -> Vec<&'static str> {
        PixKeyType::ALL.iter().map(PixKeyType::as_str).collect()
    }

    pub fn is_type_implemented(&self, key_type: &str) -> bool {
        matches!(key_type.parse::<PixKeyType>(), Ok(PixKeyType::Email))
    }
}

fn validate_email(key: &str) -> Result<(), WithdrawError> {
    if !is_valid_email(key) {
        return Err(WithdrawError::invalid_pix_key(
            "pix.key",
            "Chave PIX do tipo email deve ser um email válido.",
        ));
    }

    let max = PixKeyType::Email.max_length();
    if key.len() > max {
        return Err(WithdrawError::invalid_pix_key(
            "pix.key",
            format!(
                "Chave PIX do tipo email deve ter no máximo {} caracteres.",
                max
            ),
        ));
    }

    Ok(())
}

/// Structural email check: one `@`, a dot-atom local part of at most 64
/// bytes, and a domain of dot-separated alphanumeric/hyphen labels with at
/// least two labels.
fn is_valid_email(input: &str) -> bool {
    let Some((local, domain)) = input.split_once('@') else {
        return false;
    };
    if domain.contains('@') || local.is_empty() || local.len() > 64 {
        return false;
    }

    let local_ok = local.split('.').all(|atom| {
        !atom.is_empty()
            && atom
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || "!#$%&'*+/=?^_`{|}~-".contains(c))
    });
    if !local_ok {
        return false;
    }

    let labels: Vec<&str> = domain.split('.').collect();
    labels.len() >= 2
        && labels.iter().all(|label| {
            !label.is_empty()
                && label.len() <= 63
                && !label.starts_with('-')
                && !label.ends_with('-')
                && label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("user@example.com")]
    #[case("first.last+tag@sub.example.com.br")]
    #[case("a_b-c@x-y.io")]
    fn test_valid_email_keys(#[case] key: &str) {
        assert_eq!(PixKeyValidator::new().validate("email", key), Ok(PixKeyType::Email));
    }

    #[rstest]
    #[case::no_at("user.example.com")]
    #[case::two_ats("a@b@example.com")]
    #[case::no_tld("user@localhost")]
    #[case::space("us er@example.com")]
    #[case::double_dot("user..name@example.com")]
    #[case::empty_label("user@example..com")]
    #[case::hyphen_edge("user@-example.com")]
    #[case::empty("")]
    fn test_malformed_email_keys(#[case] key: &str) {
        let result = PixKeyValidator::new().validate("email", key);
        assert!(matches!(
            result,
            Err(WithdrawError::InvalidPixKey { ref field, .. }) if field == "pix.key"
        ));
    }

    #[test]
    fn test_email_key_length_limit() {
        let key_of_len = |len: usize| format!("user@{}.{}.com", "b".repeat(30), "c".repeat(len - 40));
        let at_limit = key_of_len(77);
        let over_limit = key_of_len(78);
        assert_eq!(at_limit.len(), 77);
        let validator = PixKeyValidator::new();

        assert!(validator.validate("email", &at_limit).is_ok());
        assert_eq!(
            validator.validate("email", &over_limit),
            Err(WithdrawError::invalid_pix_key(
                "pix.key",
                "Chave PIX do tipo email deve ter no máximo 77 caracteres."
            ))
        );
    }

    #[rstest]
    #[case::cpf("cpf", "12345678901")]
    #[case::cnpj("cnpj", "12345678000199")]
    #[case::phone("phone", "+5511999999999")]
    #[case::random("random", "123e4567-e89b-12d3-a456-426614174000")]
    fn test_recognized_but_not_implemented(#[case] key_type: &str, #[case] key: &str) {
        let error = PixKeyValidator::new().validate(key_type, key).unwrap_err();
        assert!(matches!(error, WithdrawError::NotImplemented { .. }));
        assert_eq!(error.status_code(), 501);
    }

    #[rstest]
    #[case("iban")]
    #[case("EMAIL")]
    #[case("")]
    fn test_unknown_type(#[case] key_type: &str) {
        let error = PixKeyValidator::new()
            .validate(key_type, "user@example.com")
            .unwrap_err();
        match error {
            WithdrawError::InvalidPixKey { field, reason } => {
                assert_eq!(field, "pix.type");
                assert!(reason.starts_with("Tipo de chave PIX inválido"));
                assert!(reason.ends_with("email, cpf, cnpj, phone, random"));
            }
            other => panic!("Expected InvalidPixKey, got {:?}", other),
        }
    }

    #[test]
    fn test_is_type_implemented() {
        let validator = PixKeyValidator::new();
        assert!(validator.is_type_implemented("email"));
        assert!(!validator.is_type_implemented("cpf"));
        assert!(!validator.is_type_implemented("unknown"));
    }
}
