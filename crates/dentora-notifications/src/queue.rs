//! Queue storage trait and the in-memory implementation.

use std::collections::HashMap;

use async_trait::async_trait;
use time::OffsetDateTime;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::NotificationError;
use crate::types::{Notification, NotificationStats, NotificationStatus};

/// Persistent queue the processor drains and the API inspects.
#[async_trait]
pub trait NotificationQueueStorage: Send + Sync {
    /// Adds a notification to the queue. When the notification carries a
    /// `dedup_key` that is already present, the enqueue is a no-op and the
    /// existing notification is returned.
    async fn enqueue(&self, notification: Notification)
    -> Result<Notification, NotificationError>;

    async fn get(&self, id: Uuid) -> Result<Option<Notification>, NotificationError>;

    /// Lists notifications, optionally by status, newest first, with the
    /// total match count.
    async fn list(
        &self,
        status: Option<NotificationStatus>,
        limit: u32,
        offset: u64,
    ) -> Result<(Vec<Notification>, u64), NotificationError>;

    /// Fetches pending notifications whose scheduled and retry times have
    /// passed, oldest first.
    async fn fetch_due(&self, limit: u32) -> Result<Vec<Notification>, NotificationError>;

    async fn update_status(
        &self,
        id: Uuid,
        status: NotificationStatus,
        error: Option<&str>,
    ) -> Result<(), NotificationError>;

    /// Marks a notification delivered.
    async fn mark_sent(&self, id: Uuid) -> Result<(), NotificationError>;

    /// Puts a failed attempt back in the queue with a retry time and an
    /// incremented retry count.
    async fn schedule_retry(
        &self,
        id: Uuid,
        next_retry: OffsetDateTime,
        error: &str,
    ) -> Result<(), NotificationError>;

    /// Cancels a pending notification.
    ///
    /// # Errors
    ///
    /// Returns `NotificationError::NotPending` once delivery has started.
    async fn cancel(&self, id: Uuid) -> Result<Notification, NotificationError>;

    async fn stats(&self) -> Result<NotificationStats, NotificationError>;
}

/// In-memory queue for tests and the memory storage backend.
#[derive(Default)]
pub struct InMemoryNotificationQueue {
    entries: RwLock<HashMap<Uuid, Notification>>,
}

impl InMemoryNotificationQueue {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl NotificationQueueStorage for InMemoryNotificationQueue {
    async fn enqueue(
        &self,
        notification: Notification,
    ) -> Result<Notification, NotificationError> {
        let mut entries = self.entries.write().await;
        if let Some(key) = &notification.dedup_key
            && let Some(existing) = entries.values().find(|n| n.dedup_key.as_ref() == Some(key))
        {
            return Ok(existing.clone());
        }
        entries.insert(notification.id, notification.clone());
        Ok(notification)
    }

    async fn get(&self, id: Uuid) -> Result<Option<Notification>, NotificationError> {
        Ok(self.entries.read().await.get(&id).cloned())
    }

    async fn list(
        &self,
        status: Option<NotificationStatus>,
        limit: u32,
        offset: u64,
    ) -> Result<(Vec<Notification>, u64), NotificationError> {
        let entries = self.entries.read().await;
        let mut matches: Vec<Notification> = entries
            .values()
            .filter(|n| status.is_none_or(|s| n.status == s))
            .cloned()
            .collect();
        matches.sort_by_key(|n| (std::cmp::Reverse(n.created_at), n.id));
        let total = matches.len() as u64;
        let page = matches
            .into_iter()
            .skip(offset as usize)
            .take(limit as usize)
            .collect();
        Ok((page, total))
    }

    async fn fetch_due(&self, limit: u32) -> Result<Vec<Notification>, NotificationError> {
        let now = OffsetDateTime::now_utc();
        let entries = self.entries.read().await;
        let mut due: Vec<Notification> = entries
            .values()
            .filter(|n| {
                n.status == NotificationStatus::Pending
                    && n.scheduled_at.is_none_or(|at| at <= now)
                    && n.next_retry_at.is_none_or(|at| at <= now)
            })
            .cloned()
            .collect();
        due.sort_by_key(|n| (n.created_at, n.id));
        due.truncate(limit as usize);
        Ok(due)
    }

    async fn update_status(
        &self,
        id: Uuid,
        status: NotificationStatus,
        error: Option<&str>,
    ) -> Result<(), NotificationError> {
        let mut entries = self.entries.write().await;
        let notification = entries
            .get_mut(&id)
            .ok_or_else(|| NotificationError::NotFound(id.to_string()))?;
        notification.status = status;
        notification.error = error.map(str::to_string);
        Ok(())
    }

    async fn mark_sent(&self, id: Uuid) -> Result<(), NotificationError> {
        let mut entries = self.entries.write().await;
        let notification = entries
            .get_mut(&id)
            .ok_or_else(|| NotificationError::NotFound(id.to_string()))?;
        notification.status = NotificationStatus::Sent;
        notification.sent_at = Some(OffsetDateTime::now_utc());
        notification.error = None;
        Ok(())
    }

    async fn schedule_retry(
        &self,
        id: Uuid,
        next_retry: OffsetDateTime,
        error: &str,
    ) -> Result<(), NotificationError> {
        let mut entries = self.entries.write().await;
        let notification = entries
            .get_mut(&id)
            .ok_or_else(|| NotificationError::NotFound(id.to_string()))?;
        notification.status = NotificationStatus::Pending;
        notification.next_retry_at = Some(next_retry);
        notification.retry_count += 1;
        notification.error = Some(error.to_string());
        Ok(())
    }

    async fn cancel(&self, id: Uuid) -> Result<Notification, NotificationError> {
        let mut entries = self.entries.write().await;
        let notification = entries
            .get_mut(&id)
            .ok_or_else(|| NotificationError::NotFound(id.to_string()))?;
        if notification.status != NotificationStatus::Pending {
            return Err(NotificationError::NotPending);
        }
        notification.status = NotificationStatus::Cancelled;
        Ok(notification.clone())
    }

    async fn stats(&self) -> Result<NotificationStats, NotificationError> {
        let entries = self.entries.read().await;
        let mut stats = NotificationStats::default();
        for notification in entries.values() {
            match notification.status {
                NotificationStatus::Pending => stats.pending += 1,
                NotificationStatus::Sending => stats.sending += 1,
                NotificationStatus::Sent => stats.sent += 1,
                NotificationStatus::Failed => stats.failed += 1,
                NotificationStatus::Cancelled => stats.cancelled += 1,
            }
        }
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{EnqueueNotification, NotificationChannel, NotificationRecipient};
    use std::collections::HashMap;

    fn notification(dedup_key: Option<&str>) -> Notification {
        Notification::from_request(EnqueueNotification {
            channel: NotificationChannel::Email,
            recipient: NotificationRecipient {
                email: Some("ana@example.com".to_string()),
                ..Default::default()
            },
            template_id: "appointment_reminder".to_string(),
            template_data: HashMap::new(),
            dedup_key: dedup_key.map(str::to_string),
            scheduled_at: None,
        })
    }

    #[tokio::test]
    async fn test_enqueue_and_fetch_due() {
        let queue = InMemoryNotificationQueue::new();
        let queued = queue.enqueue(notification(None)).await.unwrap();

        let due = queue.fetch_due(10).await.unwrap();
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].id, queued.id);
    }

    #[tokio::test]
    async fn test_dedup_key_suppresses_duplicates() {
        let queue = InMemoryNotificationQueue::new();
        let first = queue
            .enqueue(notification(Some("reminder-abc")))
            .await
            .unwrap();
        let second = queue
            .enqueue(notification(Some("reminder-abc")))
            .await
            .unwrap();
        assert_eq!(first.id, second.id);

        let (all, total) = queue.list(None, 10, 0).await.unwrap();
        assert_eq!(total, 1);
        assert_eq!(all.len(), 1);
    }

    #[tokio::test]
    async fn test_scheduled_notifications_not_due_early() {
        let queue = InMemoryNotificationQueue::new();
        let mut n = notification(None);
        n.scheduled_at = Some(OffsetDateTime::now_utc() + time::Duration::hours(2));
        queue.enqueue(n).await.unwrap();

        assert!(queue.fetch_due(10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_retry_cycle() {
        let queue = InMemoryNotificationQueue::new();
        let queued = queue.enqueue(notification(None)).await.unwrap();

        queue
            .update_status(queued.id, NotificationStatus::Sending, None)
            .await
            .unwrap();
        queue
            .schedule_retry(
                queued.id,
                OffsetDateTime::now_utc() - time::Duration::seconds(1),
                "smtp timeout",
            )
            .await
            .unwrap();

        let retried = queue.get(queued.id).await.unwrap().unwrap();
        assert_eq!(retried.status, NotificationStatus::Pending);
        assert_eq!(retried.retry_count, 1);
        assert_eq!(retried.error.as_deref(), Some("smtp timeout"));
        assert_eq!(queue.fetch_due(10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_cancel_only_pending() {
        let queue = InMemoryNotificationQueue::new();
        let queued = queue.enqueue(notification(None)).await.unwrap();
        queue.mark_sent(queued.id).await.unwrap();

        assert!(matches!(
            queue.cancel(queued.id).await,
            Err(NotificationError::NotPending)
        ));
    }

    #[tokio::test]
    async fn test_stats() {
        let queue = InMemoryNotificationQueue::new();
        let a = queue.enqueue(notification(None)).await.unwrap();
        queue.enqueue(notification(None)).await.unwrap();
        queue.mark_sent(a.id).await.unwrap();

        let stats = queue.stats().await.unwrap();
        assert_eq!(stats.pending, 1);
        assert_eq!(stats.sent, 1);
    }
}
