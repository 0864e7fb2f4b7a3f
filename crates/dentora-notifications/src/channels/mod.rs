//! Delivery channel adapters.

mod email;
mod webhook;

pub use email::{EmailAdapter, EmailSettings};
pub use webhook::{WebhookAdapter, WebhookSettings};

use async_trait::async_trait;

use crate::error::NotificationError;
use crate::types::Notification;

/// Template output handed to an adapter.
#[derive(Debug, Clone)]
pub struct RenderedContent {
    pub subject: Option<String>,
    pub body: String,
    pub html_body: Option<String>,
}

/// Outcome of a delivery attempt. A failed attempt is an `Ok` result with
/// `success == false`; `Err` is reserved for configuration problems.
#[derive(Debug, Clone)]
pub struct SendResult {
    pub success: bool,
    pub error: Option<String>,
}

impl SendResult {
    pub fn ok() -> Self {
        Self {
            success: true,
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
        }
    }
}

/// One way of getting a rendered notification to its recipient.
#[async_trait]
pub trait ChannelAdapter: Send + Sync {
    async fn send(
        &self,
        notification: &Notification,
        content: &RenderedContent,
    ) -> Result<SendResult, NotificationError>;
}
