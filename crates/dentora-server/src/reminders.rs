//! Adapts the storage backend to the reminder scheduler's visit source.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use time::Date;
use uuid::Uuid;

use dentora_core::SessionStatus;
use dentora_notifications::{NotificationError, ReminderSource, VisitReminder};
use dentora_storage::types::{Page, SessionFilter};
use dentora_storage::{ClinicStorage, StorageError};

fn source_err(e: StorageError) -> NotificationError {
    NotificationError::Internal(e.to_string())
}

/// Finds pending visits on a date by querying the clinic storage.
pub struct StorageReminderSource {
    storage: Arc<dyn ClinicStorage>,
}

impl StorageReminderSource {
    pub fn new(storage: Arc<dyn ClinicStorage>) -> Self {
        Self { storage }
    }
}

#[async_trait]
impl ReminderSource for StorageReminderSource {
    async fn visits_on(&self, date: Date) -> Result<Vec<VisitReminder>, NotificationError> {
        let mut visits = Vec::new();
        let mut doctor_names: HashMap<Uuid, String> = HashMap::new();
        let mut page_number = 1u32;

        loop {
            let filter = SessionFilter {
                status: Some(SessionStatus::Pending),
                from: Some(date),
                to: Some(date),
                ..Default::default()
            };
            let page = Page::new(page_number, 100);
            let sessions = self
                .storage
                .list_sessions(filter, page)
                .await
                .map_err(source_err)?;
            let fetched = sessions.items.len();

            for session in sessions.items {
                let Some(patient) = self
                    .storage
                    .get_patient(session.patient_id)
                    .await
                    .map_err(source_err)?
                else {
                    continue;
                };
                let doctor_name = match doctor_names.get(&session.doctor_id) {
                    Some(name) => name.clone(),
                    None => {
                        let name = self
                            .storage
                            .get_doctor(session.doctor_id)
                            .await
                            .map_err(source_err)?
                            .map(|d| d.full_name)
                            .unwrap_or_default();
                        doctor_names.insert(session.doctor_id, name.clone());
                        name
                    }
                };
                visits.push(VisitReminder {
                    session_id: session.id,
                    patient_id: patient.id,
                    patient_name: patient.full_name(),
                    patient_email: patient.email,
                    doctor_name,
                    date,
                    start_minute: session.start_minute,
                });
            }

            if fetched < 100 {
                break;
            }
            page_number += 1;
        }
        Ok(visits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dentora_db_memory::InMemoryStorage;
    use dentora_storage::types::{NewDoctor, NewPatient, NewSession};
    use dentora_storage::{CatalogStore, PatientStore, TreatmentStore};
    use time::macros::date;

    async fn seed(storage: &InMemoryStorage, email: Option<&str>) {
        let doctor = storage
            .create_doctor(NewDoctor {
                full_name: "Dr. Laura Pérez".to_string(),
                email: None,
            })
            .await
            .unwrap();
        let patient = storage
            .create_patient(NewPatient {
                first_name: "Ana".to_string(),
                last_name: "García".to_string(),
                email: email.map(str::to_string),
                phone: None,
                birth_date: None,
                doctor_id: Some(doctor.id),
                notes: None,
            })
            .await
            .unwrap();
        storage
            .create_session(NewSession {
                patient_id: patient.id,
                doctor_id: doctor.id,
                service_id: None,
                location_id: None,
                scheduled_date: Some(date!(2026 - 03 - 16)),
                start_minute: Some(570),
                end_minute: Some(600),
                notes: None,
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_visits_on_matching_date() {
        let storage = Arc::new(InMemoryStorage::new());
        seed(&storage, Some("ana@example.com")).await;
        let source = StorageReminderSource::new(storage);

        let visits = source.visits_on(date!(2026 - 03 - 16)).await.unwrap();
        assert_eq!(visits.len(), 1);
        assert_eq!(visits[0].patient_name, "Ana García");
        assert_eq!(visits[0].doctor_name, "Dr. Laura Pérez");
        assert_eq!(visits[0].start_minute, Some(570));

        // Other dates yield nothing.
        assert!(
            source
                .visits_on(date!(2026 - 03 - 17))
                .await
                .unwrap()
                .is_empty()
        );
    }
}
