//! Appointment reminder scheduling.
//!
//! Periodically scans for booked visits a configurable number of days ahead
//! and queues one email reminder per visit. A deterministic dedup key keeps
//! repeated scans from stacking duplicates.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use time::Date;
use tokio::time::interval;
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::error::NotificationError;
use crate::queue::NotificationQueueStorage;
use crate::types::{
    EnqueueNotification, Notification, NotificationChannel, NotificationRecipient,
};

/// A booked visit the scheduler may remind about.
#[derive(Debug, Clone)]
pub struct VisitReminder {
    pub session_id: Uuid,
    pub patient_id: Uuid,
    pub patient_name: String,
    pub patient_email: Option<String>,
    pub doctor_name: String,
    pub date: Date,
    pub start_minute: Option<u16>,
}

/// Where the scheduler finds upcoming visits; implemented by the server on
/// top of its storage backend.
#[async_trait]
pub trait ReminderSource: Send + Sync {
    async fn visits_on(&self, date: Date) -> Result<Vec<VisitReminder>, NotificationError>;
}

pub struct ReminderScheduler {
    source: Arc<dyn ReminderSource>,
    queue: Arc<dyn NotificationQueueStorage>,
    clinic_name: String,
    days_ahead: u8,
}

impl ReminderScheduler {
    pub fn new(
        source: Arc<dyn ReminderSource>,
        queue: Arc<dyn NotificationQueueStorage>,
        clinic_name: String,
        days_ahead: u8,
    ) -> Self {
        Self {
            source,
            queue,
            clinic_name,
            days_ahead,
        }
    }

    /// Scan loop; runs until the task is aborted at shutdown.
    pub async fn run(self: Arc<Self>, scan_interval: Duration) {
        let mut ticker = interval(scan_interval);
        info!(days_ahead = self.days_ahead, "reminder scheduler started");
        loop {
            ticker.tick().await;
            match self.scan_once().await {
                Ok(queued) if queued > 0 => {
                    info!(count = queued, "appointment reminders queued");
                }
                Ok(_) => {}
                Err(e) => error!(error = %e, "reminder scan failed"),
            }
        }
    }

    /// One scan pass; returns how many reminders were newly queued.
    pub async fn scan_once(&self) -> Result<u32, NotificationError> {
        let target = time::OffsetDateTime::now_utc().date() + time::Duration::days(i64::from(self.days_ahead));
        let visits = self.source.visits_on(target).await?;
        let mut queued = 0;

        for visit in visits {
            let Some(email) = visit.patient_email.clone() else {
                debug!(session_id = %visit.session_id, "visit has no patient email, skipping reminder");
                continue;
            };

            let dedup_key = format!("reminder-{}-{}", visit.session_id, visit.date);
            let start_time = visit
                .start_minute
                .map(|m| format!("{:02}:{:02}", m / 60, m % 60))
                .unwrap_or_default();

            let template_data: HashMap<String, serde_json::Value> = HashMap::from([
                ("patient_name".to_string(), json!(visit.patient_name)),
                ("date".to_string(), json!(visit.date.to_string())),
                ("start_time".to_string(), json!(start_time)),
                ("doctor_name".to_string(), json!(visit.doctor_name)),
                ("clinic_name".to_string(), json!(self.clinic_name)),
            ]);

            let notification = Notification::from_request(EnqueueNotification {
                channel: NotificationChannel::Email,
                recipient: NotificationRecipient {
                    patient_id: Some(visit.patient_id),
                    email: Some(email),
                    webhook_url: None,
                },
                template_id: "appointment_reminder".to_string(),
                template_data,
                dedup_key: Some(dedup_key),
                scheduled_at: None,
            });

            let id = notification.id;
            let stored = self.queue.enqueue(notification).await?;
            if stored.id == id {
                queued += 1;
            }
        }
        Ok(queued)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::InMemoryNotificationQueue;
    use time::macros::date;

    struct FakeSource {
        visits: Vec<VisitReminder>,
    }

    #[async_trait]
    impl ReminderSource for FakeSource {
        async fn visits_on(&self, _date: Date) -> Result<Vec<VisitReminder>, NotificationError> {
            Ok(self.visits.clone())
        }
    }

    fn visit(email: Option<&str>) -> VisitReminder {
        VisitReminder {
            session_id: Uuid::new_v4(),
            patient_id: Uuid::new_v4(),
            patient_name: "Ana García".to_string(),
            patient_email: email.map(str::to_string),
            doctor_name: "Dr. Laura Pérez".to_string(),
            date: date!(2026 - 03 - 16),
            start_minute: Some(570),
        }
    }

    #[tokio::test]
    async fn test_scan_queues_reminders_with_dedup() {
        let queue = Arc::new(InMemoryNotificationQueue::new());
        let source = Arc::new(FakeSource {
            visits: vec![visit(Some("ana@example.com")), visit(None)],
        });
        let scheduler = ReminderScheduler::new(
            source,
            queue.clone(),
            "Dentora".to_string(),
            1,
        );

        // Only the visit with an email gets a reminder.
        assert_eq!(scheduler.scan_once().await.unwrap(), 1);
        // A second scan finds the dedup key and queues nothing new.
        assert_eq!(scheduler.scan_once().await.unwrap(), 0);

        let (all, total) = queue.list(None, 10, 0).await.unwrap();
        assert_eq!(total, 1);
        let reminder = &all[0];
        assert_eq!(reminder.template_id, "appointment_reminder");
        assert_eq!(
            reminder.template_data["start_time"],
            serde_json::json!("09:30")
        );
        assert!(reminder.dedup_key.as_deref().unwrap().starts_with("reminder-"));
    }
}
