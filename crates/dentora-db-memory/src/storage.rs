//! Dashmap-backed implementation of the clinic storage traits.

use std::collections::HashSet;

use async_trait::async_trait;
use dashmap::DashMap;
use time::Date;
use tokio::sync::Mutex;
use uuid::Uuid;

use dentora_core::{
    Budget, BudgetItem, BudgetStatus, Doctor, Location, Patient, Prescription, PrescriptionItem,
    ScheduleBlock, Service, SessionStatus, TreatmentSession, generate_id, now_utc,
    recompute_totals,
};
use dentora_storage::types::{
    BudgetFilter, BudgetUpdate, BudgetWithItems, NewBudget, NewBudgetItem, NewDoctor, NewLocation,
    NewPatient, NewPrescription, NewScheduleBlock, NewService, NewSession, Page, Paged,
    PatientFilter, PatientUpdate, PrescriptionWithItems, RevenueBucket, ServiceUpdate,
    SessionFilter, SessionUpdate,
};
use dentora_storage::{
    BudgetStore, CatalogStore, PatientStore, PrescriptionStore, ScheduleStore, StorageError,
    TreatmentStore,
};

/// In-memory clinic storage.
///
/// Each entity lives in its own concurrent map. Soft-deleted patients move
/// to a tombstone map so reads and lists never see them while the record is
/// retained. Budget lifecycle transitions take `transition_lock` so the
/// status flip and its session cascade are observed atomically.
pub struct InMemoryStorage {
    patients: DashMap<Uuid, Patient>,
    deleted_patients: DashMap<Uuid, Patient>,
    budgets: DashMap<Uuid, Budget>,
    /// Items keyed by budget id, kept in position order.
    budget_items: DashMap<Uuid, Vec<BudgetItem>>,
    sessions: DashMap<Uuid, TreatmentSession>,
    blocks: DashMap<Uuid, ScheduleBlock>,
    prescriptions: DashMap<Uuid, Prescription>,
    prescription_items: DashMap<Uuid, Vec<PrescriptionItem>>,
    services: DashMap<Uuid, Service>,
    locations: DashMap<Uuid, Location>,
    doctors: DashMap<Uuid, Doctor>,
    transition_lock: Mutex<()>,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self {
            patients: DashMap::new(),
            deleted_patients: DashMap::new(),
            budgets: DashMap::new(),
            budget_items: DashMap::new(),
            sessions: DashMap::new(),
            blocks: DashMap::new(),
            prescriptions: DashMap::new(),
            prescription_items: DashMap::new(),
            services: DashMap::new(),
            locations: DashMap::new(),
            doctors: DashMap::new(),
            transition_lock: Mutex::new(()),
        }
    }

    fn items_for_budget(&self, budget_id: Uuid) -> Vec<BudgetItem> {
        self.budget_items
            .get(&budget_id)
            .map(|v| v.clone())
            .unwrap_or_default()
    }

    fn item_ids_for_budget(&self, budget_id: Uuid) -> HashSet<Uuid> {
        self.items_for_budget(budget_id)
            .iter()
            .map(|i| i.id)
            .collect()
    }

    /// Sessions materialised from (or later linked to) the budget's items.
    fn sessions_for_budget(&self, budget_id: Uuid) -> Vec<TreatmentSession> {
        let item_ids = self.item_ids_for_budget(budget_id);
        self.sessions
            .iter()
            .filter(|e| {
                e.value()
                    .budget_item_id
                    .is_some_and(|item| item_ids.contains(&item))
            })
            .map(|e| e.value().clone())
            .collect()
    }

    fn build_items(budget_id: Uuid, items: Vec<NewBudgetItem>) -> Vec<BudgetItem> {
        items
            .into_iter()
            .enumerate()
            .map(|(position, item)| BudgetItem {
                id: generate_id(),
                budget_id,
                service_id: item.service_id,
                description: item.description,
                quantity: item.quantity,
                unit_price_cents: item.unit_price_cents,
                line_total_cents: 0,
                position: position as i32,
            })
            .collect()
    }
}

impl Default for InMemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

/// Sorts newest first (tie-broken by id for stable pages) and cuts one page.
fn paginate<T>(mut all: Vec<T>, page: Page, sort_key: impl Fn(&T) -> (time::OffsetDateTime, Uuid)) -> Paged<T> {
    all.sort_by_key(|t| {
        let (created, id) = sort_key(t);
        (std::cmp::Reverse(created), id)
    });
    let total = all.len() as u64;
    let items = all
        .into_iter()
        .skip(page.offset() as usize)
        .take(page.limit() as usize)
        .collect();
    Paged::new(items, total, page)
}

#[async_trait]
impl PatientStore for InMemoryStorage {
    async fn create_patient(&self, new: NewPatient) -> Result<Patient, StorageError> {
        let now = now_utc();
        let patient = Patient {
            id: generate_id(),
            first_name: new.first_name,
            last_name: new.last_name,
            email: new.email,
            phone: new.phone,
            birth_date: new.birth_date,
            doctor_id: new.doctor_id,
            notes: new.notes,
            created_at: now,
            updated_at: now,
        };
        self.patients.insert(patient.id, patient.clone());
        Ok(patient)
    }

    async fn get_patient(&self, id: Uuid) -> Result<Option<Patient>, StorageError> {
        Ok(self.patients.get(&id).map(|e| e.value().clone()))
    }

    async fn list_patients(
        &self,
        filter: PatientFilter,
        page: Page,
    ) -> Result<Paged<Patient>, StorageError> {
        let query = filter.query.as_deref().map(str::to_lowercase);
        let matches: Vec<Patient> = self
            .patients
            .iter()
            .map(|e| e.value().clone())
            .filter(|p| {
                if let Some(doctor_id) = filter.doctor_id
                    && p.doctor_id != Some(doctor_id)
                {
                    return false;
                }
                match &query {
                    Some(q) => p.full_name().to_lowercase().contains(q),
                    None => true,
                }
            })
            .collect();
        Ok(paginate(matches, page, |p| (p.created_at, p.id)))
    }

    async fn update_patient(
        &self,
        id: Uuid,
        update: PatientUpdate,
    ) -> Result<Patient, StorageError> {
        let mut entry = self
            .patients
            .get_mut(&id)
            .ok_or_else(|| StorageError::not_found("patient", id))?;
        let patient = entry.value_mut();
        patient.first_name = update.first_name;
        patient.last_name = update.last_name;
        patient.email = update.email;
        patient.phone = update.phone;
        patient.birth_date = update.birth_date;
        patient.doctor_id = update.doctor_id;
        patient.notes = update.notes;
        patient.updated_at = now_utc();
        Ok(patient.clone())
    }

    async fn delete_patient(&self, id: Uuid) -> Result<(), StorageError> {
        if !self.patients.contains_key(&id) {
            return Err(StorageError::not_found("patient", id));
        }
        let has_open_budget = self.budgets.iter().any(|e| {
            e.value().patient_id == id && e.value().status != BudgetStatus::Draft
        });
        if has_open_budget {
            return Err(StorageError::conflict(
                "patient has budgets beyond draft and cannot be deleted",
            ));
        }
        if let Some((_, patient)) = self.patients.remove(&id) {
            self.deleted_patients.insert(id, patient);
        }
        Ok(())
    }
}

#[async_trait]
impl BudgetStore for InMemoryStorage {
    async fn create_budget(&self, new: NewBudget) -> Result<BudgetWithItems, StorageError> {
        if !self.patients.contains_key(&new.patient_id) {
            return Err(StorageError::not_found("patient", new.patient_id));
        }
        let now = now_utc();
        let budget_id = generate_id();
        let mut items = Self::build_items(budget_id, new.items);
        let total_cents = recompute_totals(&mut items);
        let budget = Budget {
            id: budget_id,
            patient_id: new.patient_id,
            doctor_id: new.doctor_id,
            status: BudgetStatus::Draft,
            title: new.title,
            notes: new.notes,
            total_cents,
            created_at: now,
            updated_at: now,
            activated_at: None,
            completed_at: None,
        };
        self.budgets.insert(budget_id, budget.clone());
        self.budget_items.insert(budget_id, items.clone());
        Ok(BudgetWithItems { budget, items })
    }

    async fn get_budget(&self, id: Uuid) -> Result<Option<BudgetWithItems>, StorageError> {
        Ok(self.budgets.get(&id).map(|e| BudgetWithItems {
            budget: e.value().clone(),
            items: self.items_for_budget(id),
        }))
    }

    async fn list_budgets(
        &self,
        filter: BudgetFilter,
        page: Page,
    ) -> Result<Paged<Budget>, StorageError> {
        let matches: Vec<Budget> = self
            .budgets
            .iter()
            .map(|e| e.value().clone())
            .filter(|b| {
                filter.patient_id.is_none_or(|p| b.patient_id == p)
                    && filter.status.is_none_or(|s| b.status == s)
            })
            .collect();
        Ok(paginate(matches, page, |b| (b.created_at, b.id)))
    }

    async fn update_budget(
        &self,
        id: Uuid,
        update: BudgetUpdate,
    ) -> Result<BudgetWithItems, StorageError> {
        let _guard = self.transition_lock.lock().await;
        let mut entry = self
            .budgets
            .get_mut(&id)
            .ok_or_else(|| StorageError::not_found("budget", id))?;
        let budget = entry.value_mut();
        budget.ensure_can_edit()?;

        let mut items = Self::build_items(id, update.items);
        budget.title = update.title;
        budget.notes = update.notes;
        budget.total_cents = recompute_totals(&mut items);
        budget.updated_at = now_utc();
        let budget = budget.clone();
        drop(entry);
        self.budget_items.insert(id, items.clone());
        Ok(BudgetWithItems { budget, items })
    }

    async fn delete_budget(&self, id: Uuid) -> Result<(), StorageError> {
        let _guard = self.transition_lock.lock().await;
        let entry = self
            .budgets
            .get(&id)
            .ok_or_else(|| StorageError::not_found("budget", id))?;
        entry.value().ensure_can_delete()?;
        drop(entry);
        self.budgets.remove(&id);
        self.budget_items.remove(&id);
        Ok(())
    }

    async fn activate_budget(&self, id: Uuid) -> Result<BudgetWithItems, StorageError> {
        let _guard = self.transition_lock.lock().await;
        let mut entry = self
            .budgets
            .get_mut(&id)
            .ok_or_else(|| StorageError::not_found("budget", id))?;
        let budget = entry.value_mut();
        let items = self.items_for_budget(id);
        budget.ensure_can_activate(items.len())?;

        let now = now_utc();
        budget.status = BudgetStatus::Active;
        budget.activated_at = Some(now);
        budget.updated_at = now;
        let budget = budget.clone();
        drop(entry);

        for item in &items {
            let session = TreatmentSession {
                id: generate_id(),
                patient_id: budget.patient_id,
                doctor_id: budget.doctor_id,
                budget_item_id: Some(item.id),
                service_id: item.service_id,
                location_id: None,
                status: SessionStatus::Pending,
                scheduled_date: None,
                start_minute: None,
                end_minute: None,
                charged_amount_cents: None,
                performed_at: None,
                notes: None,
                created_at: now,
                updated_at: now,
            };
            self.sessions.insert(session.id, session);
        }
        Ok(BudgetWithItems { budget, items })
    }

    async fn complete_budget(&self, id: Uuid) -> Result<BudgetWithItems, StorageError> {
        let _guard = self.transition_lock.lock().await;
        let mut entry = self
            .budgets
            .get_mut(&id)
            .ok_or_else(|| StorageError::not_found("budget", id))?;
        let budget = entry.value_mut();
        budget.ensure_can_complete()?;

        let unsettled = self
            .sessions_for_budget(id)
            .iter()
            .filter(|s| !s.is_settled())
            .count();
        if unsettled > 0 {
            return Err(StorageError::conflict(format!(
                "budget has {unsettled} unsettled treatment session(s)"
            )));
        }

        let now = now_utc();
        budget.status = BudgetStatus::Completed;
        budget.completed_at = Some(now);
        budget.updated_at = now;
        let budget = budget.clone();
        drop(entry);
        Ok(BudgetWithItems {
            items: self.items_for_budget(id),
            budget,
        })
    }

    async fn revert_budget(&self, id: Uuid) -> Result<BudgetWithItems, StorageError> {
        let _guard = self.transition_lock.lock().await;
        let mut entry = self
            .budgets
            .get_mut(&id)
            .ok_or_else(|| StorageError::not_found("budget", id))?;
        let budget = entry.value_mut();
        budget.ensure_can_revert()?;

        let linked = self.sessions_for_budget(id);
        if linked.iter().any(|s| s.status == SessionStatus::Completed) {
            return Err(StorageError::conflict(
                "budget has completed treatment sessions and cannot be reverted",
            ));
        }

        budget.status = BudgetStatus::Draft;
        budget.activated_at = None;
        budget.updated_at = now_utc();
        let budget = budget.clone();
        drop(entry);

        for session in linked
            .iter()
            .filter(|s| s.status == SessionStatus::Pending)
        {
            self.sessions.remove(&session.id);
        }
        Ok(BudgetWithItems {
            items: self.items_for_budget(id),
            budget,
        })
    }
}

#[async_trait]
impl TreatmentStore for InMemoryStorage {
    async fn create_session(&self, new: NewSession) -> Result<TreatmentSession, StorageError> {
        if !self.patients.contains_key(&new.patient_id) {
            return Err(StorageError::not_found("patient", new.patient_id));
        }
        let now = now_utc();
        let session = TreatmentSession {
            id: generate_id(),
            patient_id: new.patient_id,
            doctor_id: new.doctor_id,
            budget_item_id: None,
            service_id: new.service_id,
            location_id: new.location_id,
            status: SessionStatus::Pending,
            scheduled_date: new.scheduled_date,
            start_minute: new.start_minute,
            end_minute: new.end_minute,
            charged_amount_cents: None,
            performed_at: None,
            notes: new.notes,
            created_at: now,
            updated_at: now,
        };
        self.sessions.insert(session.id, session.clone());
        Ok(session)
    }

    async fn get_session(&self, id: Uuid) -> Result<Option<TreatmentSession>, StorageError> {
        Ok(self.sessions.get(&id).map(|e| e.value().clone()))
    }

    async fn list_sessions(
        &self,
        filter: SessionFilter,
        page: Page,
    ) -> Result<Paged<TreatmentSession>, StorageError> {
        let budget_items = filter.budget_id.map(|b| self.item_ids_for_budget(b));
        let matches: Vec<TreatmentSession> = self
            .sessions
            .iter()
            .map(|e| e.value().clone())
            .filter(|s| {
                filter.patient_id.is_none_or(|p| s.patient_id == p)
                    && filter.doctor_id.is_none_or(|d| s.doctor_id == d)
                    && filter.status.is_none_or(|st| s.status == st)
                    && budget_items.as_ref().is_none_or(|ids| {
                        s.budget_item_id.is_some_and(|item| ids.contains(&item))
                    })
                    && filter
                        .from
                        .is_none_or(|from| s.scheduled_date.is_some_and(|d| d >= from))
                    && filter
                        .to
                        .is_none_or(|to| s.scheduled_date.is_some_and(|d| d <= to))
            })
            .collect();
        Ok(paginate(matches, page, |s| (s.created_at, s.id)))
    }

    async fn update_session(
        &self,
        id: Uuid,
        update: SessionUpdate,
    ) -> Result<TreatmentSession, StorageError> {
        let mut entry = self
            .sessions
            .get_mut(&id)
            .ok_or_else(|| StorageError::not_found("treatment session", id))?;
        let session = entry.value_mut();
        session.ensure_pending("edited")?;
        session.scheduled_date = update.scheduled_date;
        session.start_minute = update.start_minute;
        session.end_minute = update.end_minute;
        session.location_id = update.location_id;
        session.notes = update.notes;
        session.updated_at = now_utc();
        Ok(session.clone())
    }

    async fn delete_session(&self, id: Uuid) -> Result<(), StorageError> {
        let entry = self
            .sessions
            .get(&id)
            .ok_or_else(|| StorageError::not_found("treatment session", id))?;
        entry.value().ensure_pending("deleted")?;
        drop(entry);
        self.sessions.remove(&id);
        Ok(())
    }

    async fn complete_session(
        &self,
        id: Uuid,
        charged_amount_cents: Option<i64>,
    ) -> Result<TreatmentSession, StorageError> {
        let mut entry = self
            .sessions
            .get_mut(&id)
            .ok_or_else(|| StorageError::not_found("treatment session", id))?;
        let session = entry.value_mut();
        session.ensure_pending("completed")?;

        let charged = charged_amount_cents
            .or_else(|| {
                session.budget_item_id.and_then(|item_id| {
                    self.budget_items.iter().find_map(|e| {
                        e.value()
                            .iter()
                            .find(|i| i.id == item_id)
                            .map(|i| i.unit_price_cents)
                    })
                })
            })
            .or_else(|| {
                session
                    .service_id
                    .and_then(|sid| self.services.get(&sid).map(|s| s.price_cents))
            })
            .unwrap_or(0);

        let now = now_utc();
        session.status = SessionStatus::Completed;
        session.charged_amount_cents = Some(charged);
        session.performed_at = Some(now);
        session.updated_at = now;
        Ok(session.clone())
    }

    async fn cancel_session(&self, id: Uuid) -> Result<TreatmentSession, StorageError> {
        let mut entry = self
            .sessions
            .get_mut(&id)
            .ok_or_else(|| StorageError::not_found("treatment session", id))?;
        let session = entry.value_mut();
        session.ensure_pending("cancelled")?;
        session.status = SessionStatus::Cancelled;
        session.updated_at = now_utc();
        Ok(session.clone())
    }

    async fn revenue_by_month(
        &self,
        from: Date,
        to: Date,
    ) -> Result<Vec<RevenueBucket>, StorageError> {
        let mut buckets: std::collections::BTreeMap<(i32, u8), (i64, u64)> =
            std::collections::BTreeMap::new();
        for entry in self.sessions.iter() {
            let session = entry.value();
            if session.status != SessionStatus::Completed {
                continue;
            }
            let Some(performed_at) = session.performed_at else {
                continue;
            };
            let date = performed_at.date();
            if date < from || date > to {
                continue;
            }
            let key = (date.year(), date.month() as u8);
            let bucket = buckets.entry(key).or_insert((0, 0));
            bucket.0 += session.charged_amount_cents.unwrap_or(0);
            bucket.1 += 1;
        }
        Ok(buckets
            .into_iter()
            .map(|((year, month), (total_cents, completed_sessions))| RevenueBucket {
                year,
                month,
                total_cents,
                completed_sessions,
            })
            .collect())
    }
}

#[async_trait]
impl ScheduleStore for InMemoryStorage {
    async fn create_block(&self, new: NewScheduleBlock) -> Result<ScheduleBlock, StorageError> {
        let block = ScheduleBlock {
            id: generate_id(),
            doctor_id: new.doctor_id,
            recurrence: new.recurrence,
            range: new.range,
            reason: new.reason,
            created_at: now_utc(),
        };
        self.blocks.insert(block.id, block.clone());
        Ok(block)
    }

    async fn list_blocks(
        &self,
        doctor_id: Option<Uuid>,
    ) -> Result<Vec<ScheduleBlock>, StorageError> {
        let mut blocks: Vec<ScheduleBlock> = self
            .blocks
            .iter()
            .map(|e| e.value().clone())
            .filter(|b| doctor_id.is_none_or(|d| b.doctor_id == d))
            .collect();
        blocks.sort_by_key(|b| (std::cmp::Reverse(b.created_at), b.id));
        Ok(blocks)
    }

    async fn delete_block(&self, id: Uuid) -> Result<(), StorageError> {
        self.blocks
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| StorageError::not_found("schedule block", id))
    }
}

#[async_trait]
impl PrescriptionStore for InMemoryStorage {
    async fn create_prescription(
        &self,
        new: NewPrescription,
    ) -> Result<PrescriptionWithItems, StorageError> {
        if !self.patients.contains_key(&new.patient_id) {
            return Err(StorageError::not_found("patient", new.patient_id));
        }
        let now = now_utc();
        let prescription_id = generate_id();
        let prescription = Prescription {
            id: prescription_id,
            patient_id: new.patient_id,
            doctor_id: new.doctor_id,
            issued_at: new.issued_at.unwrap_or(now),
            notes: new.notes,
            created_at: now,
        };
        let items: Vec<PrescriptionItem> = new
            .items
            .into_iter()
            .enumerate()
            .map(|(position, item)| PrescriptionItem {
                id: generate_id(),
                prescription_id,
                drug: item.drug,
                dosage: item.dosage,
                frequency: item.frequency,
                duration: item.duration,
                instructions: item.instructions,
                position: position as i32,
            })
            .collect();
        self.prescriptions
            .insert(prescription_id, prescription.clone());
        self.prescription_items
            .insert(prescription_id, items.clone());
        Ok(PrescriptionWithItems {
            prescription,
            items,
        })
    }

    async fn get_prescription(
        &self,
        id: Uuid,
    ) -> Result<Option<PrescriptionWithItems>, StorageError> {
        Ok(self.prescriptions.get(&id).map(|e| PrescriptionWithItems {
            prescription: e.value().clone(),
            items: self
                .prescription_items
                .get(&id)
                .map(|v| v.clone())
                .unwrap_or_default(),
        }))
    }

    async fn list_prescriptions(
        &self,
        patient_id: Option<Uuid>,
        page: Page,
    ) -> Result<Paged<Prescription>, StorageError> {
        let matches: Vec<Prescription> = self
            .prescriptions
            .iter()
            .map(|e| e.value().clone())
            .filter(|p| patient_id.is_none_or(|pid| p.patient_id == pid))
            .collect();
        Ok(paginate(matches, page, |p| (p.created_at, p.id)))
    }

    async fn delete_prescription(&self, id: Uuid) -> Result<(), StorageError> {
        if self.prescriptions.remove(&id).is_none() {
            return Err(StorageError::not_found("prescription", id));
        }
        self.prescription_items.remove(&id);
        Ok(())
    }
}

#[async_trait]
impl CatalogStore for InMemoryStorage {
    async fn create_service(&self, new: NewService) -> Result<Service, StorageError> {
        let service = Service {
            id: generate_id(),
            name: new.name,
            category: new.category,
            price_cents: new.price_cents,
            duration_minutes: new.duration_minutes,
            active: true,
            created_at: now_utc(),
        };
        self.services.insert(service.id, service.clone());
        Ok(service)
    }

    async fn get_service(&self, id: Uuid) -> Result<Option<Service>, StorageError> {
        Ok(self.services.get(&id).map(|e| e.value().clone()))
    }

    async fn list_services(&self) -> Result<Vec<Service>, StorageError> {
        let mut services: Vec<Service> =
            self.services.iter().map(|e| e.value().clone()).collect();
        services.sort_by(|a, b| {
            b.active
                .cmp(&a.active)
                .then_with(|| a.name.cmp(&b.name))
        });
        Ok(services)
    }

    async fn update_service(
        &self,
        id: Uuid,
        update: ServiceUpdate,
    ) -> Result<Service, StorageError> {
        let mut entry = self
            .services
            .get_mut(&id)
            .ok_or_else(|| StorageError::not_found("service", id))?;
        let service = entry.value_mut();
        service.name = update.name;
        service.category = update.category;
        service.price_cents = update.price_cents;
        service.duration_minutes = update.duration_minutes;
        service.active = update.active;
        Ok(service.clone())
    }

    async fn delete_service(&self, id: Uuid) -> Result<(), StorageError> {
        if !self.services.contains_key(&id) {
            return Err(StorageError::not_found("service", id));
        }
        let referenced = self.budget_items.iter().any(|e| {
            e.value().iter().any(|i| i.service_id == Some(id))
        });
        if referenced {
            return Err(StorageError::conflict(
                "service is referenced by budget items and cannot be deleted",
            ));
        }
        self.services.remove(&id);
        Ok(())
    }

    async fn create_location(&self, new: NewLocation) -> Result<Location, StorageError> {
        let location = Location {
            id: generate_id(),
            name: new.name,
            description: new.description,
            created_at: now_utc(),
        };
        self.locations.insert(location.id, location.clone());
        Ok(location)
    }

    async fn get_location(&self, id: Uuid) -> Result<Option<Location>, StorageError> {
        Ok(self.locations.get(&id).map(|e| e.value().clone()))
    }

    async fn list_locations(&self) -> Result<Vec<Location>, StorageError> {
        let mut locations: Vec<Location> =
            self.locations.iter().map(|e| e.value().clone()).collect();
        locations.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(locations)
    }

    async fn delete_location(&self, id: Uuid) -> Result<(), StorageError> {
        if !self.locations.contains_key(&id) {
            return Err(StorageError::not_found("location", id));
        }
        let referenced = self
            .sessions
            .iter()
            .any(|e| e.value().location_id == Some(id));
        if referenced {
            return Err(StorageError::conflict(
                "location is referenced by treatment sessions and cannot be deleted",
            ));
        }
        self.locations.remove(&id);
        Ok(())
    }

    async fn create_doctor(&self, new: NewDoctor) -> Result<Doctor, StorageError> {
        let doctor = Doctor {
            id: generate_id(),
            full_name: new.full_name,
            email: new.email,
            active: true,
            created_at: now_utc(),
        };
        self.doctors.insert(doctor.id, doctor.clone());
        Ok(doctor)
    }

    async fn get_doctor(&self, id: Uuid) -> Result<Option<Doctor>, StorageError> {
        Ok(self.doctors.get(&id).map(|e| e.value().clone()))
    }

    async fn list_doctors(&self) -> Result<Vec<Doctor>, StorageError> {
        let mut doctors: Vec<Doctor> = self.doctors.iter().map(|e| e.value().clone()).collect();
        doctors.sort_by(|a, b| a.full_name.cmp(&b.full_name));
        Ok(doctors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dentora_storage::types::NewBudgetItem;

    async fn seeded() -> (InMemoryStorage, Patient, Doctor) {
        let storage = InMemoryStorage::new();
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
                email: Some("ana@example.com".to_string()),
                phone: None,
                birth_date: None,
                doctor_id: Some(doctor.id),
                notes: None,
            })
            .await
            .unwrap();
        (storage, patient, doctor)
    }

    fn two_items() -> Vec<NewBudgetItem> {
        vec![
            NewBudgetItem {
                service_id: None,
                description: "Cleaning".to_string(),
                quantity: 1,
                unit_price_cents: 4_500,
            },
            NewBudgetItem {
                service_id: None,
                description: "Implant".to_string(),
                quantity: 2,
                unit_price_cents: 90_000,
            },
        ]
    }

    async fn draft_budget(
        storage: &InMemoryStorage,
        patient: &Patient,
        doctor: &Doctor,
    ) -> BudgetWithItems {
        storage
            .create_budget(NewBudget {
                patient_id: patient.id,
                doctor_id: doctor.id,
                title: "Plan".to_string(),
                notes: None,
                items: two_items(),
            })
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_budget_totals_computed_on_create() {
        let (storage, patient, doctor) = seeded().await;
        let budget = draft_budget(&storage, &patient, &doctor).await;
        assert_eq!(budget.budget.total_cents, 184_500);
        assert_eq!(budget.items[0].line_total_cents, 4_500);
        assert_eq!(budget.items[1].line_total_cents, 180_000);
        assert_eq!(budget.items[1].position, 1);
    }

    #[tokio::test]
    async fn test_activate_materialises_sessions() {
        let (storage, patient, doctor) = seeded().await;
        let budget = draft_budget(&storage, &patient, &doctor).await;

        let activated = storage.activate_budget(budget.budget.id).await.unwrap();
        assert_eq!(activated.budget.status, BudgetStatus::Active);
        assert!(activated.budget.activated_at.is_some());

        let sessions = storage
            .list_sessions(
                SessionFilter {
                    budget_id: Some(budget.budget.id),
                    ..Default::default()
                },
                Page::default(),
            )
            .await
            .unwrap();
        assert_eq!(sessions.total, 2);
        assert!(sessions
            .items
            .iter()
            .all(|s| s.status == SessionStatus::Pending && s.budget_item_id.is_some()));
    }

    #[tokio::test]
    async fn test_activate_requires_draft_with_items() {
        let (storage, patient, doctor) = seeded().await;
        let empty = storage
            .create_budget(NewBudget {
                patient_id: patient.id,
                doctor_id: doctor.id,
                title: "Empty".to_string(),
                notes: None,
                items: Vec::new(),
            })
            .await
            .unwrap();
        assert!(matches!(
            storage.activate_budget(empty.budget.id).await,
            Err(StorageError::Conflict { .. })
        ));

        let budget = draft_budget(&storage, &patient, &doctor).await;
        storage.activate_budget(budget.budget.id).await.unwrap();
        assert!(matches!(
            storage.activate_budget(budget.budget.id).await,
            Err(StorageError::Conflict { .. })
        ));
    }

    #[tokio::test]
    async fn test_revert_deletes_pending_sessions() {
        let (storage, patient, doctor) = seeded().await;
        let budget = draft_budget(&storage, &patient, &doctor).await;
        storage.activate_budget(budget.budget.id).await.unwrap();

        let reverted = storage.revert_budget(budget.budget.id).await.unwrap();
        assert_eq!(reverted.budget.status, BudgetStatus::Draft);
        assert!(reverted.budget.activated_at.is_none());

        let sessions = storage
            .list_sessions(
                SessionFilter {
                    budget_id: Some(budget.budget.id),
                    ..Default::default()
                },
                Page::default(),
            )
            .await
            .unwrap();
        assert_eq!(sessions.total, 0);
    }

    #[tokio::test]
    async fn test_revert_blocked_by_completed_session() {
        let (storage, patient, doctor) = seeded().await;
        let budget = draft_budget(&storage, &patient, &doctor).await;
        storage.activate_budget(budget.budget.id).await.unwrap();

        let sessions = storage
            .list_sessions(
                SessionFilter {
                    budget_id: Some(budget.budget.id),
                    ..Default::default()
                },
                Page::default(),
            )
            .await
            .unwrap();
        storage
            .complete_session(sessions.items[0].id, None)
            .await
            .unwrap();

        let err = storage.revert_budget(budget.budget.id).await.unwrap_err();
        assert!(matches!(err, StorageError::Conflict { .. }));
    }

    #[tokio::test]
    async fn test_complete_requires_settled_sessions() {
        let (storage, patient, doctor) = seeded().await;
        let budget = draft_budget(&storage, &patient, &doctor).await;
        storage.activate_budget(budget.budget.id).await.unwrap();

        assert!(matches!(
            storage.complete_budget(budget.budget.id).await,
            Err(StorageError::Conflict { .. })
        ));

        let sessions = storage
            .list_sessions(
                SessionFilter {
                    budget_id: Some(budget.budget.id),
                    ..Default::default()
                },
                Page::default(),
            )
            .await
            .unwrap();
        storage
            .complete_session(sessions.items[0].id, Some(1_000))
            .await
            .unwrap();
        storage.cancel_session(sessions.items[1].id).await.unwrap();

        let completed = storage.complete_budget(budget.budget.id).await.unwrap();
        assert_eq!(completed.budget.status, BudgetStatus::Completed);
        assert!(completed.budget.completed_at.is_some());
    }

    #[tokio::test]
    async fn test_completed_session_charges_item_price() {
        let (storage, patient, doctor) = seeded().await;
        let budget = draft_budget(&storage, &patient, &doctor).await;
        storage.activate_budget(budget.budget.id).await.unwrap();

        let sessions = storage
            .list_sessions(
                SessionFilter {
                    budget_id: Some(budget.budget.id),
                    ..Default::default()
                },
                Page::default(),
            )
            .await
            .unwrap();
        let from_cleaning = sessions
            .items
            .iter()
            .find(|s| {
                s.budget_item_id
                    == budget
                        .items
                        .iter()
                        .find(|i| i.description == "Cleaning")
                        .map(|i| i.id)
            })
            .unwrap();
        let done = storage
            .complete_session(from_cleaning.id, None)
            .await
            .unwrap();
        assert_eq!(done.charged_amount_cents, Some(4_500));
        assert!(done.performed_at.is_some());
    }

    #[tokio::test]
    async fn test_edit_and_delete_guards() {
        let (storage, patient, doctor) = seeded().await;
        let budget = draft_budget(&storage, &patient, &doctor).await;
        storage.activate_budget(budget.budget.id).await.unwrap();

        let err = storage
            .update_budget(
                budget.budget.id,
                BudgetUpdate {
                    title: "New title".to_string(),
                    notes: None,
                    items: two_items(),
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::Conflict { .. }));
        assert!(matches!(
            storage.delete_budget(budget.budget.id).await,
            Err(StorageError::Conflict { .. })
        ));
    }

    #[tokio::test]
    async fn test_patient_delete_blocked_by_active_budget() {
        let (storage, patient, doctor) = seeded().await;
        let budget = draft_budget(&storage, &patient, &doctor).await;
        storage.activate_budget(budget.budget.id).await.unwrap();

        assert!(matches!(
            storage.delete_patient(patient.id).await,
            Err(StorageError::Conflict { .. })
        ));
    }

    #[tokio::test]
    async fn test_patient_soft_delete_hides_record() {
        let (storage, patient, _) = seeded().await;
        storage.delete_patient(patient.id).await.unwrap();
        assert!(storage.get_patient(patient.id).await.unwrap().is_none());
        let listed = storage
            .list_patients(PatientFilter::default(), Page::default())
            .await
            .unwrap();
        assert_eq!(listed.total, 0);
    }

    #[tokio::test]
    async fn test_patient_name_search() {
        let (storage, _, doctor) = seeded().await;
        storage
            .create_patient(NewPatient {
                first_name: "Berta".to_string(),
                last_name: "Núñez".to_string(),
                email: None,
                phone: None,
                birth_date: None,
                doctor_id: Some(doctor.id),
                notes: None,
            })
            .await
            .unwrap();

        let hits = storage
            .list_patients(
                PatientFilter {
                    query: Some("garc".to_string()),
                    doctor_id: None,
                },
                Page::default(),
            )
            .await
            .unwrap();
        assert_eq!(hits.total, 1);
        assert_eq!(hits.items[0].first_name, "Ana");
    }

    #[tokio::test]
    async fn test_revenue_by_month() {
        let (storage, patient, doctor) = seeded().await;
        let session = storage
            .create_session(NewSession {
                patient_id: patient.id,
                doctor_id: doctor.id,
                service_id: None,
                location_id: None,
                scheduled_date: None,
                start_minute: None,
                end_minute: None,
                notes: None,
            })
            .await
            .unwrap();
        storage
            .complete_session(session.id, Some(25_000))
            .await
            .unwrap();

        let today = now_utc().date();
        let buckets = storage.revenue_by_month(today, today).await.unwrap();
        assert_eq!(buckets.len(), 1);
        assert_eq!(buckets[0].total_cents, 25_000);
        assert_eq!(buckets[0].completed_sessions, 1);
        assert_eq!(buckets[0].month, today.month() as u8);

        // Cancelled sessions never contribute revenue
        let other = storage
            .create_session(NewSession {
                patient_id: patient.id,
                doctor_id: doctor.id,
                service_id: None,
                location_id: None,
                scheduled_date: None,
                start_minute: None,
                end_minute: None,
                notes: None,
            })
            .await
            .unwrap();
        storage.cancel_session(other.id).await.unwrap();
        let buckets = storage.revenue_by_month(today, today).await.unwrap();
        assert_eq!(buckets[0].completed_sessions, 1);
    }

    #[tokio::test]
    async fn test_service_delete_guarded_by_references() {
        let (storage, patient, doctor) = seeded().await;
        let service = storage
            .create_service(NewService {
                name: "Whitening".to_string(),
                category: None,
                price_cents: 30_000,
                duration_minutes: Some(45),
            })
            .await
            .unwrap();
        storage
            .create_budget(NewBudget {
                patient_id: patient.id,
                doctor_id: doctor.id,
                title: "Plan".to_string(),
                notes: None,
                items: vec![NewBudgetItem {
                    service_id: Some(service.id),
                    description: "Whitening".to_string(),
                    quantity: 1,
                    unit_price_cents: 30_000,
                }],
            })
            .await
            .unwrap();

        assert!(matches!(
            storage.delete_service(service.id).await,
            Err(StorageError::Conflict { .. })
        ));
    }

    #[tokio::test]
    async fn test_pending_only_session_mutations() {
        let (storage, patient, doctor) = seeded().await;
        let session = storage
            .create_session(NewSession {
                patient_id: patient.id,
                doctor_id: doctor.id,
                service_id: None,
                location_id: None,
                scheduled_date: None,
                start_minute: None,
                end_minute: None,
                notes: None,
            })
            .await
            .unwrap();
        storage.complete_session(session.id, None).await.unwrap();

        assert!(matches!(
            storage.delete_session(session.id).await,
            Err(StorageError::Conflict { .. })
        ));
        assert!(matches!(
            storage.cancel_session(session.id).await,
            Err(StorageError::Conflict { .. })
        ));
    }
}
