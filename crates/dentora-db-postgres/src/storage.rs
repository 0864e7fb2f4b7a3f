//! PostgreSQL implementation of the clinic storage traits.

use async_trait::async_trait;
use sqlx_postgres::PgPool;
use time::Date;
use uuid::Uuid;

use dentora_core::{
    Budget, Doctor, Location, Patient, Prescription, ScheduleBlock, Service, TreatmentSession,
};
use dentora_storage::types::{
    BudgetFilter, BudgetUpdate, BudgetWithItems, NewBudget, NewDoctor, NewLocation, NewPatient,
    NewPrescription, NewScheduleBlock, NewService, NewSession, Page, Paged, PatientFilter,
    PatientUpdate, PrescriptionWithItems, RevenueBucket, ServiceUpdate, SessionFilter,
    SessionUpdate,
};
use dentora_storage::{
    BudgetStore, CatalogStore, PatientStore, PrescriptionStore, ScheduleStore, StorageError,
    TreatmentStore,
};

use crate::config::PostgresConfig;
use crate::error::Result;
use crate::{migrations, pool, queries};

/// Clinic storage backed by PostgreSQL.
#[derive(Clone)]
pub struct PostgresStorage {
    pool: PgPool,
}

impl PostgresStorage {
    /// Connects, optionally runs embedded migrations, and verifies the
    /// connection.
    pub async fn connect(config: &PostgresConfig) -> Result<Self> {
        let pool = pool::create_pool(config).await?;
        if config.run_migrations {
            migrations::run(&pool).await?;
        }
        pool::test_connection(&pool).await?;
        Ok(Self { pool })
    }

    /// Wraps an existing pool (tests, shared pools).
    pub fn with_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// The underlying pool, shared with the notification queue.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl PatientStore for PostgresStorage {
    async fn create_patient(&self, new: NewPatient) -> std::result::Result<Patient, StorageError> {
        queries::patients::create(&self.pool, new).await
    }

    async fn get_patient(&self, id: Uuid) -> std::result::Result<Option<Patient>, StorageError> {
        queries::patients::get(&self.pool, id).await
    }

    async fn list_patients(
        &self,
        filter: PatientFilter,
        page: Page,
    ) -> std::result::Result<Paged<Patient>, StorageError> {
        queries::patients::list(&self.pool, filter, page).await
    }

    async fn update_patient(
        &self,
        id: Uuid,
        update: PatientUpdate,
    ) -> std::result::Result<Patient, StorageError> {
        queries::patients::update(&self.pool, id, update).await
    }

    async fn delete_patient(&self, id: Uuid) -> std::result::Result<(), StorageError> {
        queries::patients::soft_delete(&self.pool, id).await
    }
}

#[async_trait]
impl BudgetStore for PostgresStorage {
    async fn create_budget(
        &self,
        new: NewBudget,
    ) -> std::result::Result<BudgetWithItems, StorageError> {
        queries::budgets::create(&self.pool, new).await
    }

    async fn get_budget(
        &self,
        id: Uuid,
    ) -> std::result::Result<Option<BudgetWithItems>, StorageError> {
        queries::budgets::get(&self.pool, id).await
    }

    async fn list_budgets(
        &self,
        filter: BudgetFilter,
        page: Page,
    ) -> std::result::Result<Paged<Budget>, StorageError> {
        queries::budgets::list(&self.pool, filter, page).await
    }

    async fn update_budget(
        &self,
        id: Uuid,
        update: BudgetUpdate,
    ) -> std::result::Result<BudgetWithItems, StorageError> {
        queries::budgets::update(&self.pool, id, update).await
    }

    async fn delete_budget(&self, id: Uuid) -> std::result::Result<(), StorageError> {
        queries::budgets::delete(&self.pool, id).await
    }

    async fn activate_budget(
        &self,
        id: Uuid,
    ) -> std::result::Result<BudgetWithItems, StorageError> {
        queries::budgets::activate(&self.pool, id).await
    }

    async fn complete_budget(
        &self,
        id: Uuid,
    ) -> std::result::Result<BudgetWithItems, StorageError> {
        queries::budgets::complete(&self.pool, id).await
    }

    async fn revert_budget(
        &self,
        id: Uuid,
    ) -> std::result::Result<BudgetWithItems, StorageError> {
        queries::budgets::revert(&self.pool, id).await
    }
}

#[async_trait]
impl TreatmentStore for PostgresStorage {
    async fn create_session(
        &self,
        new: NewSession,
    ) -> std::result::Result<TreatmentSession, StorageError> {
        queries::sessions::create(&self.pool, new).await
    }

    async fn get_session(
        &self,
        id: Uuid,
    ) -> std::result::Result<Option<TreatmentSession>, StorageError> {
        queries::sessions::get(&self.pool, id).await
    }

    async fn list_sessions(
        &self,
        filter: SessionFilter,
        page: Page,
    ) -> std::result::Result<Paged<TreatmentSession>, StorageError> {
        queries::sessions::list(&self.pool, filter, page).await
    }

    async fn update_session(
        &self,
        id: Uuid,
        update: SessionUpdate,
    ) -> std::result::Result<TreatmentSession, StorageError> {
        queries::sessions::update(&self.pool, id, update).await
    }

    async fn delete_session(&self, id: Uuid) -> std::result::Result<(), StorageError> {
        queries::sessions::delete(&self.pool, id).await
    }

    async fn complete_session(
        &self,
        id: Uuid,
        charged_amount_cents: Option<i64>,
    ) -> std::result::Result<TreatmentSession, StorageError> {
        queries::sessions::complete(&self.pool, id, charged_amount_cents).await
    }

    async fn cancel_session(
        &self,
        id: Uuid,
    ) -> std::result::Result<TreatmentSession, StorageError> {
        queries::sessions::cancel(&self.pool, id).await
    }

    async fn revenue_by_month(
        &self,
        from: Date,
        to: Date,
    ) -> std::result::Result<Vec<RevenueBucket>, StorageError> {
        queries::sessions::revenue_by_month(&self.pool, from, to).await
    }
}

#[async_trait]
impl ScheduleStore for PostgresStorage {
    async fn create_block(
        &self,
        new: NewScheduleBlock,
    ) -> std::result::Result<ScheduleBlock, StorageError> {
        queries::schedule::create(&self.pool, new).await
    }

    async fn list_blocks(
        &self,
        doctor_id: Option<Uuid>,
    ) -> std::result::Result<Vec<ScheduleBlock>, StorageError> {
        queries::schedule::list(&self.pool, doctor_id).await
    }

    async fn delete_block(&self, id: Uuid) -> std::result::Result<(), StorageError> {
        queries::schedule::delete(&self.pool, id).await
    }
}

#[async_trait]
impl PrescriptionStore for PostgresStorage {
    async fn create_prescription(
        &self,
        new: NewPrescription,
    ) -> std::result::Result<PrescriptionWithItems, StorageError> {
        queries::prescriptions::create(&self.pool, new).await
    }

    async fn get_prescription(
        &self,
        id: Uuid,
    ) -> std::result::Result<Option<PrescriptionWithItems>, StorageError> {
        queries::prescriptions::get(&self.pool, id).await
    }

    async fn list_prescriptions(
        &self,
        patient_id: Option<Uuid>,
        page: Page,
    ) -> std::result::Result<Paged<Prescription>, StorageError> {
        queries::prescriptions::list(&self.pool, patient_id, page).await
    }

    async fn delete_prescription(&self, id: Uuid) -> std::result::Result<(), StorageError> {
        queries::prescriptions::delete(&self.pool, id).await
    }
}

#[async_trait]
impl CatalogStore for PostgresStorage {
    async fn create_service(
        &self,
        new: NewService,
    ) -> std::result::Result<Service, StorageError> {
        queries::catalog::create_service(&self.pool, new).await
    }

    async fn get_service(&self, id: Uuid) -> std::result::Result<Option<Service>, StorageError> {
        queries::catalog::get_service(&self.pool, id).await
    }

    async fn list_services(&self) -> std::result::Result<Vec<Service>, StorageError> {
        queries::catalog::list_services(&self.pool).await
    }

    async fn update_service(
        &self,
        id: Uuid,
        update: ServiceUpdate,
    ) -> std::result::Result<Service, StorageError> {
        queries::catalog::update_service(&self.pool, id, update).await
    }

    async fn delete_service(&self, id: Uuid) -> std::result::Result<(), StorageError> {
        queries::catalog::delete_service(&self.pool, id).await
    }

    async fn create_location(
        &self,
        new: NewLocation,
    ) -> std::result::Result<Location, StorageError> {
        queries::catalog::create_location(&self.pool, new).await
    }

    async fn get_location(
        &self,
        id: Uuid,
    ) -> std::result::Result<Option<Location>, StorageError> {
        queries::catalog::get_location(&self.pool, id).await
    }

    async fn list_locations(&self) -> std::result::Result<Vec<Location>, StorageError> {
        queries::catalog::list_locations(&self.pool).await
    }

    async fn delete_location(&self, id: Uuid) -> std::result::Result<(), StorageError> {
        queries::catalog::delete_location(&self.pool, id).await
    }

    async fn create_doctor(&self, new: NewDoctor) -> std::result::Result<Doctor, StorageError> {
        queries::catalog::create_doctor(&self.pool, new).await
    }

    async fn get_doctor(&self, id: Uuid) -> std::result::Result<Option<Doctor>, StorageError> {
        queries::catalog::get_doctor(&self.pool, id).await
    }

    async fn list_doctors(&self) -> std::result::Result<Vec<Doctor>, StorageError> {
        queries::catalog::list_doctors(&self.pool).await
    }
}
