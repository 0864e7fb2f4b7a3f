//! SMTP email delivery via lettre.

use async_trait::async_trait;
use lettre::{
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
    message::header::ContentType, transport::smtp::authentication::Credentials,
};
use serde::{Deserialize, Serialize};

use super::{ChannelAdapter, RenderedContent, SendResult};
use crate::error::NotificationError;
use crate::types::Notification;

/// SMTP settings, normally supplied by the server config file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailSettings {
    pub smtp_host: String,
    #[serde(default = "default_smtp_port")]
    pub smtp_port: u16,
    #[serde(default)]
    pub username: Option<String>,
    /// Prefer setting this via environment override rather than the file.
    #[serde(default)]
    pub password: Option<String>,
    pub from: String,
}

fn default_smtp_port() -> u16 {
    587
}

pub struct EmailAdapter {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: String,
}

impl EmailAdapter {
    pub fn new(settings: &EmailSettings) -> Result<Self, NotificationError> {
        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(
            &settings.smtp_host,
        )
        .map_err(|e| NotificationError::InvalidConfig(format!("smtp relay: {e}")))?
        .port(settings.smtp_port);

        if let (Some(username), Some(password)) = (&settings.username, &settings.password) {
            builder = builder.credentials(Credentials::new(username.clone(), password.clone()));
        }

        Ok(Self {
            transport: builder.build(),
            from: settings.from.clone(),
        })
    }
}

#[async_trait]
impl ChannelAdapter for EmailAdapter {
    async fn send(
        &self,
        notification: &Notification,
        content: &RenderedContent,
    ) -> Result<SendResult, NotificationError> {
        let to = notification
            .recipient
            .email
            .as_ref()
            .ok_or(NotificationError::MissingRecipient("email"))?;

        let subject = content.subject.as_deref().unwrap_or("Notification");

        let message = Message::builder()
            .from(
                self.from
                    .parse()
                    .map_err(|e| NotificationError::InvalidConfig(format!("from address: {e}")))?,
            )
            .to(to
                .parse()
                .map_err(|e| NotificationError::SendFailed(format!("to address: {e}")))?)
            .subject(subject)
            .header(ContentType::TEXT_PLAIN)
            .body(content.body.clone())
            .map_err(|e| NotificationError::SendFailed(e.to_string()))?;

        match self.transport.send(message).await {
            Ok(_) => Ok(SendResult::ok()),
            Err(e) => Ok(SendResult::failed(format!("smtp: {e}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settings_default_port() {
        let settings: EmailSettings = serde_json::from_str(
            r#"{"smtp_host": "mail.example.com", "from": "clinic@example.com"}"#,
        )
        .unwrap();
        assert_eq!(settings.smtp_port, 587);
        assert!(settings.username.is_none());
    }

    #[test]
    fn test_adapter_rejects_bad_from() {
        let adapter = EmailAdapter::new(&EmailSettings {
            smtp_host: "mail.example.com".to_string(),
            smtp_port: 587,
            username: None,
            password: None,
            from: "not an address".to_string(),
        })
        .unwrap();
        // The bad from address surfaces on send, when the message is built.
        let notification = crate::types::Notification::from_request(
            crate::types::EnqueueNotification {
                channel: crate::types::NotificationChannel::Email,
                recipient: crate::types::NotificationRecipient {
                    email: Some("ana@example.com".to_string()),
                    ..Default::default()
                },
                template_id: "message".to_string(),
                template_data: Default::default(),
                dedup_key: None,
                scheduled_at: None,
            },
        );
        let content = RenderedContent {
            subject: None,
            body: "hi".to_string(),
            html_body: None,
        };
        let result = tokio_test::block_on(adapter.send(&notification, &content));
        assert!(matches!(result, Err(NotificationError::InvalidConfig(_))));
    }
}
