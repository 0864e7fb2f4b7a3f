use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::error::NotificationError;

/// Outbound delivery channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationChannel {
    Email,
    Webhook,
}

impl NotificationChannel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Email => "email",
            Self::Webhook => "webhook",
        }
    }
}

impl fmt::Display for NotificationChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NotificationChannel {
    type Err = NotificationError;

    fn from_str(s: &str) -> Result<Self, NotificationError> {
        match s {
            "email" => Ok(Self::Email),
            "webhook" => Ok(Self::Webhook),
            other => Err(NotificationError::InvalidConfig(format!(
                "unknown channel '{other}'"
            ))),
        }
    }
}

/// Queue state of a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationStatus {
    Pending,
    Sending,
    Sent,
    Failed,
    Cancelled,
}

impl NotificationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Sending => "sending",
            Self::Sent => "sent",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for NotificationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NotificationStatus {
    type Err = NotificationError;

    fn from_str(s: &str) -> Result<Self, NotificationError> {
        match s {
            "pending" => Ok(Self::Pending),
            "sending" => Ok(Self::Sending),
            "sent" => Ok(Self::Sent),
            "failed" => Ok(Self::Failed),
            "cancelled" => Ok(Self::Cancelled),
            other => Err(NotificationError::InvalidConfig(format!(
                "unknown notification status '{other}'"
            ))),
        }
    }
}

/// Where a notification is delivered.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NotificationRecipient {
    /// Patient the notification concerns, when there is one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub patient_id: Option<Uuid>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub webhook_url: Option<String>,
}

/// A queued outbound notification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub id: Uuid,
    pub channel: NotificationChannel,
    pub status: NotificationStatus,
    pub recipient: NotificationRecipient,

    pub template_id: String,
    pub template_data: HashMap<String, serde_json::Value>,

    /// Suppresses duplicate enqueues (appointment reminders re-scanned by
    /// the scheduler carry one).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dedup_key: Option<String>,

    /// When to send; `None` means immediately.
    #[serde(with = "time::serde::rfc3339::option")]
    pub scheduled_at: Option<OffsetDateTime>,

    /// Earliest next delivery attempt after a failure.
    #[serde(with = "time::serde::rfc3339::option")]
    pub next_retry_at: Option<OffsetDateTime>,

    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,

    #[serde(with = "time::serde::rfc3339::option")]
    pub sent_at: Option<OffsetDateTime>,

    /// Last delivery error, if any.
    pub error: Option<String>,

    pub retry_count: u32,
}

impl Notification {
    /// Builds a fresh pending notification from an enqueue request.
    pub fn from_request(request: EnqueueNotification) -> Self {
        Self {
            id: Uuid::new_v4(),
            channel: request.channel,
            status: NotificationStatus::Pending,
            recipient: request.recipient,
            template_id: request.template_id,
            template_data: request.template_data,
            dedup_key: request.dedup_key,
            scheduled_at: request.scheduled_at,
            next_retry_at: None,
            created_at: OffsetDateTime::now_utc(),
            sent_at: None,
            error: None,
            retry_count: 0,
        }
    }
}

/// Request to queue a notification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnqueueNotification {
    pub channel: NotificationChannel,
    pub recipient: NotificationRecipient,
    pub template_id: String,
    #[serde(default)]
    pub template_data: HashMap<String, serde_json::Value>,
    #[serde(default)]
    pub dedup_key: Option<String>,
    #[serde(with = "time::serde::rfc3339::option", default)]
    pub scheduled_at: Option<OffsetDateTime>,
}

/// Queue counts by status.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationStats {
    pub pending: u64,
    pub sending: u64,
    pub sent: u64,
    pub failed: u64,
    pub cancelled: u64,
}
