//! PIX instant transfer
//!
//! The transfer itself is simulated: `execute` logs the transfer and reports
//! success. Email keys double as the confirmation recipient.

use super::{PaymentMethod, PixKeyValidator};
use crate::core::traits::StoreTransaction;
use crate::types::{
    Account, MethodDetail, PixKeyType, WithdrawError, WithdrawRequest, Withdrawal,
};
use async_trait::async_trait;
use tracing::info;

#[derive(Debug, Clone, Default)]
pub struct PixMethod {
    validator: PixKeyValidator,
}

impl PixMethod {
    pub const NAME: &'static str = "PIX";

    pub fn new() -> Self {
        PixMethod {
            validator: PixKeyValidator::new(),
        }
    }
}

#[async_trait]
impl PaymentMethod for PixMethod {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn validate(&self, request: &WithdrawRequest) -> Result<(), WithdrawError> {
        self.validator
            .validate(&request.pix.key_type, &request.pix.key)
            .map(|_| ())
    }

    async fn create_details(
        &self,
        tx: &mut dyn StoreTransaction,
        withdrawal: &Withdrawal,
        request: &WithdrawRequest,
    ) -> Result<MethodDetail, WithdrawError> {
        let key_type = self
            .validator
            .validate(&request.pix.key_type, &request.pix.key)?;
        let detail = MethodDetail::new(withdrawal.id, key_type, request.pix.key.clone());
        tx.create_method_detail(&detail).await?;

        info!(
            withdrawal_id = %withdrawal.id,
            key_type = %detail.key_type,
            key = %detail.key,
            "Created PIX details"
        );
        Ok(detail)
    }

    async fn execute(
        &self,
        withdrawal: &Withdrawal,
        detail: Option<&MethodDetail>,
        account: &Account,
    ) -> Result<bool, WithdrawError> {
        let detail = detail.ok_or_else(|| {
            WithdrawError::transfer(format!("withdrawal {} has no PIX details", withdrawal.id))
        })?;

        info!(
            withdrawal_id = %withdrawal.id,
            account_id = %account.id,
            amount = %withdrawal.amount,
            key = %detail.key,
            key_type = %detail.key_type,
            "PIX transfer executed"
        );
        Ok(true)
    }

    fn notification_recipient(
        &self,
        _withdrawal: &Withdrawal,
        detail: Option<&MethodDetail>,
    ) -> Option<String> {
        detail
            .filter(|detail| detail.key_type == PixKeyType::Email)
            .map(|detail| detail.key.clone())
    }
}
