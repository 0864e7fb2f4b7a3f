//! Webhook delivery with HMAC-SHA256 payload signatures.

use async_trait::async_trait;
use hmac::{Hmac, Mac};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;
use sha2::Sha256;
use time::OffsetDateTime;

use super::{ChannelAdapter, RenderedContent, SendResult};
use crate::error::NotificationError;
use crate::types::Notification;

type HmacSha256 = Hmac<Sha256>;

/// Webhook settings, normally supplied by the server config file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WebhookSettings {
    /// Fallback URL when the notification's recipient carries none.
    #[serde(default)]
    pub url: Option<String>,
    /// Shared secret; when set every payload is signed.
    #[serde(default)]
    pub secret: Option<String>,
}

pub struct WebhookAdapter {
    http_client: Client,
    settings: WebhookSettings,
}

impl WebhookAdapter {
    pub fn new(settings: WebhookSettings) -> Self {
        Self {
            http_client: Client::new(),
            settings,
        }
    }

    fn sign_payload(payload: &str, secret: &str) -> String {
        let mut mac =
            HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts any key size");
        mac.update(payload.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }
}

#[async_trait]
impl ChannelAdapter for WebhookAdapter {
    async fn send(
        &self,
        notification: &Notification,
        content: &RenderedContent,
    ) -> Result<SendResult, NotificationError> {
        let url = notification
            .recipient
            .webhook_url
            .as_ref()
            .or(self.settings.url.as_ref())
            .ok_or(NotificationError::MissingRecipient("webhook"))?;

        let timestamp = OffsetDateTime::now_utc()
            .format(&time::format_description::well_known::Rfc3339)
            .unwrap_or_default();

        let payload = json!({
            "notification_id": notification.id,
            "template_id": notification.template_id,
            "recipient": notification.recipient,
            "content": {
                "subject": content.subject,
                "body": content.body,
            },
            "data": notification.template_data,
            "timestamp": timestamp,
        });
        let payload_str = serde_json::to_string(&payload)
            .map_err(|e| NotificationError::Internal(e.to_string()))?;

        let mut request = self
            .http_client
            .post(url)
            .header("Content-Type", "application/json");

        if let Some(secret) = &self.settings.secret {
            let signature = Self::sign_payload(&payload_str, secret);
            request = request.header("X-Signature-256", format!("sha256={signature}"));
        }

        let response = match request.body(payload_str).send().await {
            Ok(r) => r,
            Err(e) => return Ok(SendResult::failed(format!("webhook request: {e}"))),
        };

        if response.status().is_success() {
            Ok(SendResult::ok())
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Ok(SendResult::failed(format!("webhook {status}: {body}")))
        }
    }
}
