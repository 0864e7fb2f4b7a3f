//! Storage abstraction for the Dentora server.
//!
//! Defines the repository traits every backend implements, the page/filter
//! types used by list operations, and the storage error type.

pub mod error;
pub mod traits;
pub mod types;

pub use error::StorageError;
pub use traits::{
    BudgetStore, CatalogStore, ClinicStorage, PatientStore, PrescriptionStore, ScheduleStore,
    TreatmentStore,
};
pub use types::{
    BudgetFilter, BudgetUpdate, BudgetWithItems, NewBudget, NewBudgetItem, NewDoctor, NewLocation,
    NewPatient, NewPrescription, NewPrescriptionItem, NewScheduleBlock, NewService, NewSession,
    Page, Paged, PatientFilter, PatientUpdate, PrescriptionWithItems, RevenueBucket,
    ServiceUpdate, SessionFilter, SessionUpdate,
};
