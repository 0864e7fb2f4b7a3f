//! Repository traits every storage backend implements.
//!
//! Handlers depend only on these traits, so the server can run against the
//! in-memory backend in tests and PostgreSQL in production. Implementations
//! must be thread-safe (`Send + Sync`).

use async_trait::async_trait;
use time::Date;
use uuid::Uuid;

use dentora_core::{
    Budget, Doctor, Location, Patient, Prescription, ScheduleBlock, Service, TreatmentSession,
};

use crate::error::StorageError;
use crate::types::{
    BudgetFilter, BudgetUpdate, BudgetWithItems, NewBudget, NewDoctor, NewLocation, NewPatient,
    NewPrescription, NewScheduleBlock, NewService, NewSession, Page, Paged, PatientFilter,
    PatientUpdate, PrescriptionWithItems, RevenueBucket, ServiceUpdate, SessionFilter,
    SessionUpdate,
};

/// Patient record operations.
#[async_trait]
pub trait PatientStore: Send + Sync {
    /// Creates a new patient record.
    async fn create_patient(&self, new: NewPatient) -> Result<Patient, StorageError>;

    /// Reads a patient by id. Returns `None` for unknown or soft-deleted ids.
    async fn get_patient(&self, id: Uuid) -> Result<Option<Patient>, StorageError>;

    /// Lists patients matching the filter, newest first.
    async fn list_patients(
        &self,
        filter: PatientFilter,
        page: Page,
    ) -> Result<Paged<Patient>, StorageError>;

    /// Replaces a patient's editable fields.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` for unknown ids.
    async fn update_patient(
        &self,
        id: Uuid,
        update: PatientUpdate,
    ) -> Result<Patient, StorageError>;

    /// Soft-deletes a patient.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Conflict` while the patient has budgets that
    /// have left the draft state; clinical history must not lose its owner.
    async fn delete_patient(&self, id: Uuid) -> Result<(), StorageError>;
}

/// Budget (treatment plan) operations, including the lifecycle transitions.
///
/// Transitions are atomic with their cascades: activating a budget creates
/// one pending session per line item, reverting deletes the pending sessions
/// it created. Backends with transactions run both inside one.
#[async_trait]
pub trait BudgetStore: Send + Sync {
    /// Creates a draft budget with its items. Totals are recomputed
    /// server-side; client-sent totals are ignored.
    async fn create_budget(&self, new: NewBudget) -> Result<BudgetWithItems, StorageError>;

    /// Reads a budget and its items.
    async fn get_budget(&self, id: Uuid) -> Result<Option<BudgetWithItems>, StorageError>;

    /// Lists budgets matching the filter, newest first, without items.
    async fn list_budgets(
        &self,
        filter: BudgetFilter,
        page: Page,
    ) -> Result<Paged<Budget>, StorageError>;

    /// Replaces a draft budget's title, notes, and full item list.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Conflict` unless the budget is a draft.
    async fn update_budget(
        &self,
        id: Uuid,
        update: BudgetUpdate,
    ) -> Result<BudgetWithItems, StorageError>;

    /// Deletes a draft budget and its items.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Conflict` unless the budget is a draft.
    async fn delete_budget(&self, id: Uuid) -> Result<(), StorageError>;

    /// Activates a draft budget, materialising one pending treatment session
    /// per line item.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Conflict` unless the budget is a non-empty
    /// draft.
    async fn activate_budget(&self, id: Uuid) -> Result<BudgetWithItems, StorageError>;

    /// Completes an active budget.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Conflict` unless the budget is active and every
    /// linked session is completed or cancelled.
    async fn complete_budget(&self, id: Uuid) -> Result<BudgetWithItems, StorageError>;

    /// Reverts an active budget to draft, deleting the pending sessions that
    /// activation materialised.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Conflict` unless the budget is active, or when
    /// any linked session has already been completed.
    async fn revert_budget(&self, id: Uuid) -> Result<BudgetWithItems, StorageError>;
}

/// Treatment session operations and revenue aggregation.
#[async_trait]
pub trait TreatmentStore: Send + Sync {
    /// Creates a standalone session (not linked to a budget item).
    async fn create_session(&self, new: NewSession) -> Result<TreatmentSession, StorageError>;

    async fn get_session(&self, id: Uuid) -> Result<Option<TreatmentSession>, StorageError>;

    /// Lists sessions matching the filter, most recently created first.
    async fn list_sessions(
        &self,
        filter: SessionFilter,
        page: Page,
    ) -> Result<Paged<TreatmentSession>, StorageError>;

    /// Reschedules or annotates a pending session.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Conflict` unless the session is pending.
    async fn update_session(
        &self,
        id: Uuid,
        update: SessionUpdate,
    ) -> Result<TreatmentSession, StorageError>;

    /// Deletes a pending session.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Conflict` unless the session is pending.
    async fn delete_session(&self, id: Uuid) -> Result<(), StorageError>;

    /// Completes a pending session, stamping `performed_at` and fixing the
    /// charged amount. When `charged_amount_cents` is `None` the amount
    /// defaults to the linked budget item's unit price, then to the catalog
    /// price of the session's service, then to zero.
    async fn complete_session(
        &self,
        id: Uuid,
        charged_amount_cents: Option<i64>,
    ) -> Result<TreatmentSession, StorageError>;

    /// Cancels a pending session.
    async fn cancel_session(&self, id: Uuid) -> Result<TreatmentSession, StorageError>;

    /// Sums charged amounts of completed sessions per calendar month of
    /// `performed_at`, over the inclusive date range. Months without revenue
    /// are omitted.
    async fn revenue_by_month(
        &self,
        from: Date,
        to: Date,
    ) -> Result<Vec<RevenueBucket>, StorageError>;
}

/// Schedule block operations.
#[async_trait]
pub trait ScheduleStore: Send + Sync {
    async fn create_block(&self, new: NewScheduleBlock) -> Result<ScheduleBlock, StorageError>;

    /// Lists blocks, optionally restricted to one doctor, newest first.
    async fn list_blocks(
        &self,
        doctor_id: Option<Uuid>,
    ) -> Result<Vec<ScheduleBlock>, StorageError>;

    async fn delete_block(&self, id: Uuid) -> Result<(), StorageError>;
}

/// Prescription operations.
#[async_trait]
pub trait PrescriptionStore: Send + Sync {
    /// Creates a prescription with its medication items.
    async fn create_prescription(
        &self,
        new: NewPrescription,
    ) -> Result<PrescriptionWithItems, StorageError>;

    async fn get_prescription(
        &self,
        id: Uuid,
    ) -> Result<Option<PrescriptionWithItems>, StorageError>;

    /// Lists prescriptions, optionally for one patient, newest first.
    async fn list_prescriptions(
        &self,
        patient_id: Option<Uuid>,
        page: Page,
    ) -> Result<Paged<Prescription>, StorageError>;

    async fn delete_prescription(&self, id: Uuid) -> Result<(), StorageError>;
}

/// Catalog operations: services, locations, and practitioners.
#[async_trait]
pub trait CatalogStore: Send + Sync {
    async fn create_service(&self, new: NewService) -> Result<Service, StorageError>;

    async fn get_service(&self, id: Uuid) -> Result<Option<Service>, StorageError>;

    /// Lists services, active first, then by name.
    async fn list_services(&self) -> Result<Vec<Service>, StorageError>;

    async fn update_service(
        &self,
        id: Uuid,
        update: ServiceUpdate,
    ) -> Result<Service, StorageError>;

    /// Deletes a service.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Conflict` while budget items reference it.
    async fn delete_service(&self, id: Uuid) -> Result<(), StorageError>;

    async fn create_location(&self, new: NewLocation) -> Result<Location, StorageError>;

    async fn get_location(&self, id: Uuid) -> Result<Option<Location>, StorageError>;

    async fn list_locations(&self) -> Result<Vec<Location>, StorageError>;

    async fn delete_location(&self, id: Uuid) -> Result<(), StorageError>;

    async fn create_doctor(&self, new: NewDoctor) -> Result<Doctor, StorageError>;

    async fn get_doctor(&self, id: Uuid) -> Result<Option<Doctor>, StorageError>;

    async fn list_doctors(&self) -> Result<Vec<Doctor>, StorageError>;
}

/// The full storage surface the server is built against.
///
/// Blanket-implemented for any type providing every store trait, so backends
/// implement the per-entity traits and get this for free.
pub trait ClinicStorage:
    PatientStore
    + BudgetStore
    + TreatmentStore
    + ScheduleStore
    + PrescriptionStore
    + CatalogStore
{
}

impl<T> ClinicStorage for T where
    T: PatientStore
        + BudgetStore
        + TreatmentStore
        + ScheduleStore
        + PrescriptionStore
        + CatalogStore
{
}
