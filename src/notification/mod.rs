//! Fire-and-forget withdrawal confirmations
//!
//! The orchestrator hands a settled withdrawal to
//! [`NotificationDispatcher::notify_async`] after its transaction commits.
//! The message is built eagerly and delivered on a detached tokio task; the
//! caller never awaits delivery and delivery failures are only logged.

pub mod message;

pub use message::{format_brl, ConfirmationMessage, DEFAULT_SENDER};

use crate::core::clock::BusinessTime;
use crate::types::WithdrawalView;
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;
use tokio::runtime::Handle;
use tracing::{error, info, warn};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NotificationError {
    #[error("Delivery to {recipient} failed: {reason}")]
    Delivery { recipient: String, reason: String },
}

/// Delivery transport for confirmation messages
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn deliver(&self, message: ConfirmationMessage) -> Result<(), NotificationError>;
}

/// Writes confirmations to the log instead of sending them
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn deliver(&self, message: ConfirmationMessage) -> Result<(), NotificationError> {
        info!(
            withdrawal_id = %message.withdrawal_id,
            from = %message.from,
            to = %message.to,
            subject = %message.subject,
            "Confirmation email"
        );
        Ok(())
    }
}

#[derive(Clone)]
pub struct NotificationDispatcher {
    notifier: Arc<dyn Notifier>,
    business_time: BusinessTime,
    sender: String,
}

impl NotificationDispatcher {
    pub fn new(notifier: Arc<dyn Notifier>, business_time: BusinessTime, sender: impl Into<String>) -> Self {
        NotificationDispatcher {
            notifier,
            business_time,
            sender: sender.into(),
        }
    }

    /// Dispatcher that only logs, in the given business timezone
    pub fn logging(business_time: BusinessTime) -> Self {
        Self::new(Arc::new(LogNotifier), business_time, DEFAULT_SENDER)
    }

    /// Queue a confirmation for `recipient` and return immediately.
    ///
    /// Outside a tokio runtime the confirmation is dropped with a warning.
    pub fn notify_async(&self, view: &WithdrawalView, recipient: &str) {
        let message = ConfirmationMessage::build(view, recipient, &self.sender, &self.business_time);

        let handle = match Handle::try_current() {
            Ok(handle) => handle,
            Err(_) => {
                warn!(
                    withdrawal_id = %message.withdrawal_id,
                    "No async runtime available, confirmation not sent"
                );
                return;
            }
        };

        let notifier = Arc::clone(&self.notifier);
        handle.spawn(async move {
            let withdrawal_id = message.withdrawal_id;
            let to = message.to.clone();
            match notifier.deliver(message).await {
                Ok(()) => info!(%withdrawal_id, %to, "Confirmation sent"),
                Err(e) => error!(%withdrawal_id, %to, error = %e, "Confirmation failed"),
            }
        });
    }
}

impl std::fmt::Debug for NotificationDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotificationDispatcher")
            .field("business_time", &self.business_time)
            .field("sender", &self.sender)
            .finish()
    }
}
