//! PostgreSQL-backed notification queue.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx_core::query::query;
use sqlx_core::query_as::query_as;
use sqlx_postgres::PgPool;
use time::OffsetDateTime;
use uuid::Uuid;

use dentora_notifications::{
    Notification, NotificationChannel, NotificationError, NotificationQueueStorage,
    NotificationRecipient, NotificationStats, NotificationStatus,
};

use crate::queries::{chrono_to_time, time_to_chrono};

type NotificationRow = (
    Uuid,
    String,
    String,
    Value,
    String,
    Value,
    Option<String>,
    Option<DateTime<Utc>>,
    Option<DateTime<Utc>>,
    DateTime<Utc>,
    Option<DateTime<Utc>>,
    Option<String>,
    i32,
);

const COLUMNS: &str = "id, channel, status, recipient, template_id, template_data, dedup_key, \
     scheduled_at, next_retry_at, created_at, sent_at, error, retry_count";

fn internal(context: &str, e: impl std::fmt::Display) -> NotificationError {
    NotificationError::Internal(format!("{context}: {e}"))
}

fn from_row(row: NotificationRow) -> Result<Notification, NotificationError> {
    let channel: NotificationChannel = row.1.parse()?;
    let status: NotificationStatus = row.2.parse()?;
    let recipient: NotificationRecipient =
        serde_json::from_value(row.3).map_err(|e| internal("stored recipient", e))?;
    let template_data = serde_json::from_value(row.5)
        .map_err(|e| internal("stored template data", e))?;
    Ok(Notification {
        id: row.0,
        channel,
        status,
        recipient,
        template_id: row.4,
        template_data,
        dedup_key: row.6,
        scheduled_at: row.7.map(chrono_to_time),
        next_retry_at: row.8.map(chrono_to_time),
        created_at: chrono_to_time(row.9),
        sent_at: row.10.map(chrono_to_time),
        error: row.11,
        retry_count: row.12.max(0) as u32,
    })
}

/// Notification queue persisted in the `notifications` table, sharing the
/// server's connection pool.
pub struct PostgresNotificationQueue {
    pool: PgPool,
}

impl PostgresNotificationQueue {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl NotificationQueueStorage for PostgresNotificationQueue {
    async fn enqueue(
        &self,
        notification: Notification,
    ) -> Result<Notification, NotificationError> {
        let recipient = serde_json::to_value(&notification.recipient)
            .map_err(|e| internal("encode recipient", e))?;
        let template_data = serde_json::to_value(&notification.template_data)
            .map_err(|e| internal("encode template data", e))?;

        // A dedup-key collision makes the insert a no-op; the existing row
        // wins and is returned instead.
        let sql = format!(
            "INSERT INTO notifications \
             (id, channel, status, recipient, template_id, template_data, dedup_key, \
              scheduled_at, created_at, retry_count) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10) \
             ON CONFLICT (dedup_key) DO NOTHING \
             RETURNING {COLUMNS}"
        );
        let row: Option<NotificationRow> = query_as(&sql)
            .bind(notification.id)
            .bind(notification.channel.as_str())
            .bind(notification.status.as_str())
            .bind(&recipient)
            .bind(&notification.template_id)
            .bind(&template_data)
            .bind(&notification.dedup_key)
            .bind(notification.scheduled_at.map(time_to_chrono))
            .bind(time_to_chrono(notification.created_at))
            .bind(notification.retry_count as i32)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| internal("enqueue notification", e))?;

        match row {
            Some(row) => from_row(row),
            None => {
                let key = notification.dedup_key.as_deref().unwrap_or_default();
                let sql =
                    format!("SELECT {COLUMNS} FROM notifications WHERE dedup_key = $1");
                let row: NotificationRow = query_as(&sql)
                    .bind(key)
                    .fetch_one(&self.pool)
                    .await
                    .map_err(|e| internal("read deduplicated notification", e))?;
                from_row(row)
            }
        }
    }

    async fn get(&self, id: Uuid) -> Result<Option<Notification>, NotificationError> {
        let sql = format!("SELECT {COLUMNS} FROM notifications WHERE id = $1");
        let row: Option<NotificationRow> = query_as(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| internal("read notification", e))?;
        row.map(from_row).transpose()
    }

    async fn list(
        &self,
        status: Option<NotificationStatus>,
        limit: u32,
        offset: u64,
    ) -> Result<(Vec<Notification>, u64), NotificationError> {
        let status = status.map(|s| s.as_str().to_string());

        let total: i64 = sqlx_core::query_scalar::query_scalar(
            "SELECT COUNT(*) FROM notifications WHERE $1::text IS NULL OR status = $1",
        )
        .bind(&status)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| internal("count notifications", e))?;

        let sql = format!(
            "SELECT {COLUMNS} FROM notifications \
             WHERE $1::text IS NULL OR status = $1 \
             ORDER BY created_at DESC, id LIMIT $2 OFFSET $3"
        );
        let rows: Vec<NotificationRow> = query_as(&sql)
            .bind(&status)
            .bind(i64::from(limit))
            .bind(offset as i64)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| internal("list notifications", e))?;

        let notifications = rows
            .into_iter()
            .map(from_row)
            .collect::<Result<Vec<_>, _>>()?;
        Ok((notifications, total as u64))
    }

    async fn fetch_due(&self, limit: u32) -> Result<Vec<Notification>, NotificationError> {
        let sql = format!(
            "SELECT {COLUMNS} FROM notifications \
             WHERE status = 'pending' \
             AND (scheduled_at IS NULL OR scheduled_at <= now()) \
             AND (next_retry_at IS NULL OR next_retry_at <= now()) \
             ORDER BY created_at, id LIMIT $1"
        );
        let rows: Vec<NotificationRow> = query_as(&sql)
            .bind(i64::from(limit))
            .fetch_all(&self.pool)
            .await
            .map_err(|e| internal("fetch due notifications", e))?;
        rows.into_iter().map(from_row).collect()
    }

    async fn update_status(
        &self,
        id: Uuid,
        status: NotificationStatus,
        error: Option<&str>,
    ) -> Result<(), NotificationError> {
        let result = query("UPDATE notifications SET status = $2, error = $3 WHERE id = $1")
            .bind(id)
            .bind(status.as_str())
            .bind(error)
            .execute(&self.pool)
            .await
            .map_err(|e| internal("update notification status", e))?;
        if result.rows_affected() == 0 {
            return Err(NotificationError::NotFound(id.to_string()));
        }
        Ok(())
    }

    async fn mark_sent(&self, id: Uuid) -> Result<(), NotificationError> {
        let result = query(
            "UPDATE notifications SET status = 'sent', sent_at = now(), error = NULL \
             WHERE id = $1",
        )
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(|e| internal("mark notification sent", e))?;
        if result.rows_affected() == 0 {
            return Err(NotificationError::NotFound(id.to_string()));
        }
        Ok(())
    }

    async fn schedule_retry(
        &self,
        id: Uuid,
        next_retry: OffsetDateTime,
        error: &str,
    ) -> Result<(), NotificationError> {
        let result = query(
            "UPDATE notifications SET status = 'pending', next_retry_at = $2, \
             retry_count = retry_count + 1, error = $3 \
             WHERE id = $1",
        )
        .bind(id)
        .bind(time_to_chrono(next_retry))
        .bind(error)
        .execute(&self.pool)
        .await
        .map_err(|e| internal("schedule notification retry", e))?;
        if result.rows_affected() == 0 {
            return Err(NotificationError::NotFound(id.to_string()));
        }
        Ok(())
    }

    async fn cancel(&self, id: Uuid) -> Result<Notification, NotificationError> {
        let sql = format!(
            "UPDATE notifications SET status = 'cancelled' \
             WHERE id = $1 AND status = 'pending' \
             RETURNING {COLUMNS}"
        );
        let row: Option<NotificationRow> = query_as(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| internal("cancel notification", e))?;
        match row {
            Some(row) => from_row(row),
            None => match self.get(id).await? {
                Some(_) => Err(NotificationError::NotPending),
                None => Err(NotificationError::NotFound(id.to_string())),
            },
        }
    }

    async fn stats(&self) -> Result<NotificationStats, NotificationError> {
        let rows: Vec<(String, i64)> =
            query_as("SELECT status, COUNT(*) FROM notifications GROUP BY status")
                .fetch_all(&self.pool)
                .await
                .map_err(|e| internal("notification stats", e))?;

        let mut stats = NotificationStats::default();
        for (status, count) in rows {
            let count = count.max(0) as u64;
            match status.parse::<NotificationStatus>()? {
                NotificationStatus::Pending => stats.pending = count,
                NotificationStatus::Sending => stats.sending = count,
                NotificationStatus::Sent => stats.sent = count,
                NotificationStatus::Failed => stats.failed = count,
                NotificationStatus::Cancelled => stats.cancelled = count,
            }
        }
        Ok(stats)
    }
}
