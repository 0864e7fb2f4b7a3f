//! Background processor that drains the notification queue.

use std::sync::Arc;
use std::time::Duration;

use time::OffsetDateTime;
use tokio::time::interval;
use tracing::{debug, error, info, warn};

use crate::channels::{ChannelAdapter, EmailAdapter, EmailSettings, WebhookAdapter, WebhookSettings};
use crate::error::NotificationError;
use crate::queue::NotificationQueueStorage;
use crate::templates::TemplateRenderer;
use crate::types::{Notification, NotificationChannel, NotificationStatus};

const MAX_RETRIES: u32 = 5;
const BATCH_SIZE: u32 = 10;

/// Exponential backoff: 30s, 1m, 2m, 4m, 8m, capped at one hour.
fn backoff_delay(retry_count: u32) -> time::Duration {
    let seconds = 30i64.saturating_mul(1 << retry_count.min(12));
    time::Duration::seconds(seconds.min(3600))
}

/// Failures that no number of retries will fix.
fn is_permanent(error: &NotificationError) -> bool {
    matches!(
        error,
        NotificationError::MissingRecipient(_)
            | NotificationError::TemplateNotFound(_)
            | NotificationError::InvalidConfig(_)
    )
}

/// Drains due notifications, rendering and dispatching them per channel,
/// retrying failures with exponential backoff.
pub struct NotificationProcessor {
    queue: Arc<dyn NotificationQueueStorage>,
    templates: Arc<TemplateRenderer>,
    email: Option<Arc<dyn ChannelAdapter>>,
    webhook: Arc<dyn ChannelAdapter>,
}

impl NotificationProcessor {
    pub fn new(
        queue: Arc<dyn NotificationQueueStorage>,
        templates: Arc<TemplateRenderer>,
    ) -> Self {
        Self {
            queue,
            templates,
            email: None,
            webhook: Arc::new(WebhookAdapter::new(WebhookSettings::default())),
        }
    }

    /// Enables the email channel from SMTP settings.
    pub fn with_email(mut self, settings: &EmailSettings) -> Result<Self, NotificationError> {
        self.email = Some(Arc::new(EmailAdapter::new(settings)?));
        Ok(self)
    }

    /// Replaces the webhook adapter (configured URL/secret).
    pub fn with_webhook(mut self, settings: WebhookSettings) -> Self {
        self.webhook = Arc::new(WebhookAdapter::new(settings));
        self
    }

    #[cfg(test)]
    fn with_email_adapter(mut self, adapter: Arc<dyn ChannelAdapter>) -> Self {
        self.email = Some(adapter);
        self
    }

    /// Processing loop; runs until the task is aborted at shutdown.
    pub async fn run(self: Arc<Self>, poll_interval: Duration) {
        let mut ticker = interval(poll_interval);
        info!("notification processor started");
        loop {
            ticker.tick().await;
            match self.process_batch(BATCH_SIZE).await {
                Ok(processed) if processed > 0 => {
                    info!(count = processed, "notifications delivered");
                }
                Ok(_) => {}
                Err(e) => error!(error = %e, "notification batch failed"),
            }
        }
    }

    /// Processes one batch of due notifications; returns the delivered count.
    pub async fn process_batch(&self, limit: u32) -> Result<u32, NotificationError> {
        let due = self.queue.fetch_due(limit).await?;
        let mut delivered = 0;

        for notification in due {
            self.queue
                .update_status(notification.id, NotificationStatus::Sending, None)
                .await?;

            match self.deliver(&notification).await {
                Ok(()) => {
                    self.queue.mark_sent(notification.id).await?;
                    delivered += 1;
                    debug!(
                        notification_id = %notification.id,
                        channel = %notification.channel,
                        "notification sent"
                    );
                }
                Err(e) => {
                    let message = e.to_string();
                    if is_permanent(&e) || notification.retry_count >= MAX_RETRIES {
                        self.queue
                            .update_status(
                                notification.id,
                                NotificationStatus::Failed,
                                Some(&message),
                            )
                            .await?;
                        warn!(
                            notification_id = %notification.id,
                            error = %message,
                            retry_count = notification.retry_count,
                            "notification permanently failed"
                        );
                    } else {
                        let next_retry =
                            OffsetDateTime::now_utc() + backoff_delay(notification.retry_count);
                        self.queue
                            .schedule_retry(notification.id, next_retry, &message)
                            .await?;
                        warn!(
                            notification_id = %notification.id,
                            error = %message,
                            retry_count = notification.retry_count + 1,
                            "notification send failed, retry scheduled"
                        );
                    }
                }
            }
        }
        Ok(delivered)
    }

    async fn deliver(&self, notification: &Notification) -> Result<(), NotificationError> {
        let content = self
            .templates
            .render(&notification.template_id, &notification.template_data)?;

        let adapter: &Arc<dyn ChannelAdapter> = match notification.channel {
            NotificationChannel::Email => self.email.as_ref().ok_or_else(|| {
                NotificationError::InvalidConfig("email channel is not configured".to_string())
            })?,
            NotificationChannel::Webhook => &self.webhook,
        };

        let result = adapter.send(notification, &content).await?;
        if result.success {
            Ok(())
        } else {
            Err(NotificationError::SendFailed(
                result.error.unwrap_or_else(|| "unknown error".to_string()),
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channels::{RenderedContent, SendResult};
    use crate::queue::InMemoryNotificationQueue;
    use crate::types::{EnqueueNotification, NotificationRecipient};
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct FakeAdapter {
        calls: AtomicU32,
        fail: bool,
    }

    #[async_trait]
    impl ChannelAdapter for FakeAdapter {
        async fn send(
            &self,
            _notification: &Notification,
            _content: &RenderedContent,
        ) -> Result<SendResult, NotificationError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Ok(SendResult::failed("boom"))
            } else {
                Ok(SendResult::ok())
            }
        }
    }

    fn email_request() -> EnqueueNotification {
        EnqueueNotification {
            channel: NotificationChannel::Email,
            recipient: NotificationRecipient {
                email: Some("ana@example.com".to_string()),
                ..Default::default()
            },
            template_id: "message".to_string(),
            template_data: HashMap::from([
                ("subject".to_string(), serde_json::json!("Hi")),
                ("body".to_string(), serde_json::json!("Hello")),
            ]),
            dedup_key: None,
            scheduled_at: None,
        }
    }

    #[test]
    fn test_backoff_grows_and_caps() {
        assert_eq!(backoff_delay(0), time::Duration::seconds(30));
        assert_eq!(backoff_delay(1), time::Duration::seconds(60));
        assert_eq!(backoff_delay(4), time::Duration::seconds(480));
        assert_eq!(backoff_delay(10), time::Duration::seconds(3600));
        assert_eq!(backoff_delay(u32::MAX), time::Duration::seconds(3600));
    }

    #[tokio::test]
    async fn test_successful_delivery_marks_sent() {
        let queue = Arc::new(InMemoryNotificationQueue::new());
        let adapter = Arc::new(FakeAdapter {
            calls: AtomicU32::new(0),
            fail: false,
        });
        let processor = NotificationProcessor::new(
            queue.clone(),
            Arc::new(TemplateRenderer::with_defaults()),
        )
        .with_email_adapter(adapter.clone());

        let queued = queue
            .enqueue(Notification::from_request(email_request()))
            .await
            .unwrap();
        let delivered = processor.process_batch(10).await.unwrap();
        assert_eq!(delivered, 1);
        assert_eq!(adapter.calls.load(Ordering::SeqCst), 1);

        let sent = queue.get(queued.id).await.unwrap().unwrap();
        assert_eq!(sent.status, NotificationStatus::Sent);
        assert!(sent.sent_at.is_some());
    }

    #[tokio::test]
    async fn test_failure_schedules_retry() {
        let queue = Arc::new(InMemoryNotificationQueue::new());
        let processor = NotificationProcessor::new(
            queue.clone(),
            Arc::new(TemplateRenderer::with_defaults()),
        )
        .with_email_adapter(Arc::new(FakeAdapter {
            calls: AtomicU32::new(0),
            fail: true,
        }));

        let queued = queue
            .enqueue(Notification::from_request(email_request()))
            .await
            .unwrap();
        assert_eq!(processor.process_batch(10).await.unwrap(), 0);

        let retried = queue.get(queued.id).await.unwrap().unwrap();
        assert_eq!(retried.status, NotificationStatus::Pending);
        assert_eq!(retried.retry_count, 1);
        assert!(retried.next_retry_at.is_some());
        assert!(retried.error.as_deref().unwrap().contains("boom"));
    }

    #[tokio::test]
    async fn test_exhausted_retries_fail_permanently() {
        let queue = Arc::new(InMemoryNotificationQueue::new());
        let processor = NotificationProcessor::new(
            queue.clone(),
            Arc::new(TemplateRenderer::with_defaults()),
        )
        .with_email_adapter(Arc::new(FakeAdapter {
            calls: AtomicU32::new(0),
            fail: true,
        }));

        let mut notification = Notification::from_request(email_request());
        notification.retry_count = MAX_RETRIES;
        let queued = queue.enqueue(notification).await.unwrap();
        processor.process_batch(10).await.unwrap();

        let failed = queue.get(queued.id).await.unwrap().unwrap();
        assert_eq!(failed.status, NotificationStatus::Failed);
    }

    #[tokio::test]
    async fn test_unconfigured_channel_fails_without_retry() {
        let queue = Arc::new(InMemoryNotificationQueue::new());
        // No email adapter configured.
        let processor = NotificationProcessor::new(
            queue.clone(),
            Arc::new(TemplateRenderer::with_defaults()),
        );

        let queued = queue
            .enqueue(Notification::from_request(email_request()))
            .await
            .unwrap();
        processor.process_batch(10).await.unwrap();

        let failed = queue.get(queued.id).await.unwrap().unwrap();
        assert_eq!(failed.status, NotificationStatus::Failed);
        assert_eq!(failed.retry_count, 0);
        assert!(failed.error.as_deref().unwrap().contains("not configured"));
    }
}
