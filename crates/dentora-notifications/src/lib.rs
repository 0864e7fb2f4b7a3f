//! Outbound notifications for the Dentora clinic server.
//!
//! A persistent queue of appointment reminders and budget events, drained by
//! a background processor that delivers over email (SMTP) and signed
//! webhooks, with `{{variable}}` templating and exponential-backoff retries.

pub mod channels;
pub mod error;
pub mod processor;
pub mod queue;
pub mod reminder;
pub mod templates;
pub mod types;

pub use channels::{ChannelAdapter, EmailSettings, RenderedContent, SendResult, WebhookSettings};
pub use error::NotificationError;
pub use processor::NotificationProcessor;
pub use queue::{InMemoryNotificationQueue, NotificationQueueStorage};
pub use reminder::{ReminderScheduler, ReminderSource, VisitReminder};
pub use templates::{Template, TemplateRenderer};
pub use types::{
    EnqueueNotification, Notification, NotificationChannel, NotificationRecipient,
    NotificationStats, NotificationStatus,
};

/// Type alias for a shareable queue instance.
pub type DynNotificationQueue = std::sync::Arc<dyn NotificationQueueStorage>;
