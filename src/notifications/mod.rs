//! Outbound customer notifications.
//!
//! Callers treat sends as fire-and-forget: a failed notification is logged
//! and never fails the operation that triggered it. Idempotency guards
//! (`payment_email_sent_at`, `shipment_notified_at`) live on the order, not
//! here.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;
use tracing::info;

use crate::config::NotifierConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmailKind {
    PaymentConfirmation,
    ShipmentUpdate,
    BankTransferInstructions,
    PasswordReset,
}

/// One outbound email, fully rendered by the caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailMessage {
    pub kind: EmailKind,
    pub to: String,
    pub subject: String,
    pub body: String,
}

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("Email relay error: {0}")]
    Relay(String),
    #[error("Invalid recipient: {0}")]
    InvalidRecipient(String),
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, message: EmailMessage) -> Result<(), NotifyError>;
}

/// Delivers through an HTTP transactional-email relay.
pub struct HttpEmailNotifier {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
}

impl HttpEmailNotifier {
    pub fn new(config: &NotifierConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: config.email_endpoint.clone(),
            api_key: config.email_api_key.clone(),
        }
    }
}

#[async_trait]
impl Notifier for HttpEmailNotifier {
    async fn send(&self, message: EmailMessage) -> Result<(), NotifyError> {
        if message.to.trim().is_empty() {
            return Err(NotifyError::InvalidRecipient("empty address".into()));
        }
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&json!({
                "kind": message.kind,
                "to": message.to,
                "subject": message.subject,
                "body": message.body,
            }))
            .send()
            .await
            .map_err(|e| NotifyError::Relay(e.to_string()))?;

        if !response.status().is_success() {
            return Err(NotifyError::Relay(format!(
                "relay returned {}",
                response.status()
            )));
        }
        Ok(())
    }
}

/// Logs instead of sending. Selected when no relay endpoint is configured,
/// and used by the test harness.
pub struct NoopNotifier;

#[async_trait]
impl Notifier for NoopNotifier {
    async fn send(&self, message: EmailMessage) -> Result<(), NotifyError> {
        info!(kind = ?message.kind, to = %message.to, subject = %message.subject, "email suppressed (no relay configured)");
        Ok(())
    }
}
