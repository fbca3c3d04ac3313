//! Payment method capability
//!
//! A payment method is looked up by name in the [`MethodRegistry`] and
//! contributes four steps to a withdrawal:
//!
//! 1. `validate` - method-specific request checks, before any write
//! 2. `create_details` - persist the method detail inside the open transaction
//! 3. `execute` - perform (or simulate) the transfer
//! 4. `notification_recipient` - where to send the confirmation, if anywhere
//!
//! Adding a method means implementing [`PaymentMethod`] and registering it;
//! the orchestrator never changes.

pub mod pix;
pub mod pix_key;
mod registry;

pub use pix::PixMethod;
pub use pix_key::PixKeyValidator;
pub use registry::MethodRegistry;

use crate::core::traits::StoreTransaction;
use crate::types::{Account, MethodDetail, WithdrawError, WithdrawRequest, Withdrawal};
use async_trait::async_trait;

#[async_trait]
pub trait PaymentMethod: Send + Sync {
    /// Registry key, uppercase
    fn name(&self) -> &'static str;

    /// Method-specific validation of the request
    fn validate(&self, request: &WithdrawRequest) -> Result<(), WithdrawError>;

    /// Persist the method detail for a freshly created withdrawal
    async fn create_details(
        &self,
        tx: &mut dyn StoreTransaction,
        withdrawal: &Withdrawal,
        request: &WithdrawRequest,
    ) -> Result<MethodDetail, WithdrawError>;

    /// Execute the transfer.
    ///
    /// # Returns
    ///
    /// * `Ok(true)` - transfer accepted
    /// * `Ok(false)` or `Err(_)` - settlement failure
    async fn execute(
        &self,
        withdrawal: &Withdrawal,
        detail: Option<&MethodDetail>,
        account: &Account,
    ) -> Result<bool, WithdrawError>;

    /// Confirmation address, or `None` when the method has nowhere to send it
    fn notification_recipient(
        &self,
        withdrawal: &Withdrawal,
        detail: Option<&MethodDetail>,
    ) -> Option<String>;
}
