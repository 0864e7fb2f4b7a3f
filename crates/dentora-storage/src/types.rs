//! Input, filter, and result types used by the storage traits.

use serde::Serialize;
use time::{Date, OffsetDateTime};
use uuid::Uuid;

use dentora_core::{
    Budget, BudgetItem, BudgetStatus, Prescription, PrescriptionItem, SessionStatus,
    schedule::{BlockRecurrence, TimeRange},
};

pub const DEFAULT_PER_PAGE: u32 = 25;
pub const MAX_PER_PAGE: u32 = 100;

/// A 1-based page request. Out-of-range values are clamped on construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    page: u32,
    per_page: u32,
}

impl Page {
    pub fn new(page: u32, per_page: u32) -> Self {
        Self {
            page: page.max(1),
            per_page: per_page.clamp(1, MAX_PER_PAGE),
        }
    }

    pub fn page(&self) -> u32 {
        self.page
    }

    pub fn per_page(&self) -> u32 {
        self.per_page
    }

    pub fn offset(&self) -> u64 {
        u64::from(self.page - 1) * u64::from(self.per_page)
    }

    pub fn limit(&self) -> u32 {
        self.per_page
    }
}

impl Default for Page {
    fn default() -> Self {
        Self::new(1, DEFAULT_PER_PAGE)
    }
}

/// One page of results plus the total match count.
#[derive(Debug, Clone, Serialize)]
pub struct Paged<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub page: u32,
    pub per_page: u32,
}

impl<T> Paged<T> {
    pub fn new(items: Vec<T>, total: u64, page: Page) -> Self {
        Self {
            items,
            total,
            page: page.page(),
            per_page: page.per_page(),
        }
    }
}

// ---- Patients ----

#[derive(Debug, Clone)]
pub struct NewPatient {
    pub first_name: String,
    pub last_name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub birth_date: Option<Date>,
    pub doctor_id: Option<Uuid>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone)]
pub struct PatientUpdate {
    pub first_name: String,
    pub last_name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub birth_date: Option<Date>,
    pub doctor_id: Option<Uuid>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct PatientFilter {
    /// Case-insensitive substring match over first and last name.
    pub query: Option<String>,
    pub doctor_id: Option<Uuid>,
}

// ---- Budgets ----

#[derive(Debug, Clone)]
pub struct NewBudgetItem {
    pub service_id: Option<Uuid>,
    pub description: String,
    pub quantity: u32,
    pub unit_price_cents: i64,
}

#[derive(Debug, Clone)]
pub struct NewBudget {
    pub patient_id: Uuid,
    pub doctor_id: Uuid,
    pub title: String,
    pub notes: Option<String>,
    pub items: Vec<NewBudgetItem>,
}

/// Replaces a draft budget's editable fields and its full item list.
#[derive(Debug, Clone)]
pub struct BudgetUpdate {
    pub title: String,
    pub notes: Option<String>,
    pub items: Vec<NewBudgetItem>,
}

#[derive(Debug, Clone, Default)]
pub struct BudgetFilter {
    pub patient_id: Option<Uuid>,
    pub status: Option<BudgetStatus>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BudgetWithItems {
    #[serde(flatten)]
    pub budget: Budget,
    pub items: Vec<BudgetItem>,
}

// ---- Treatment sessions ----

#[derive(Debug, Clone)]
pub struct NewSession {
    pub patient_id: Uuid,
    pub doctor_id: Uuid,
    pub service_id: Option<Uuid>,
    pub location_id: Option<Uuid>,
    pub scheduled_date: Option<Date>,
    pub start_minute: Option<u16>,
    pub end_minute: Option<u16>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone)]
pub struct SessionUpdate {
    pub scheduled_date: Option<Date>,
    pub start_minute: Option<u16>,
    pub end_minute: Option<u16>,
    pub location_id: Option<Uuid>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct SessionFilter {
    pub patient_id: Option<Uuid>,
    pub doctor_id: Option<Uuid>,
    pub budget_id: Option<Uuid>,
    pub status: Option<SessionStatus>,
    pub from: Option<Date>,
    pub to: Option<Date>,
}

/// Charged revenue of completed sessions in one calendar month.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RevenueBucket {
    pub year: i32,
    pub month: u8,
    pub total_cents: i64,
    pub completed_sessions: u64,
}

// ---- Schedule blocks ----

#[derive(Debug, Clone)]
pub struct NewScheduleBlock {
    pub doctor_id: Uuid,
    pub recurrence: BlockRecurrence,
    pub range: TimeRange,
    pub reason: Option<String>,
}

// ---- Prescriptions ----

#[derive(Debug, Clone)]
pub struct NewPrescriptionItem {
    pub drug: String,
    pub dosage: String,
    pub frequency: Option<String>,
    pub duration: Option<String>,
    pub instructions: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NewPrescription {
    pub patient_id: Uuid,
    pub doctor_id: Uuid,
    pub issued_at: Option<OffsetDateTime>,
    pub notes: Option<String>,
    pub items: Vec<NewPrescriptionItem>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PrescriptionWithItems {
    #[serde(flatten)]
    pub prescription: Prescription,
    pub items: Vec<PrescriptionItem>,
}

// ---- Catalog ----

#[derive(Debug, Clone)]
pub struct NewService {
    pub name: String,
    pub category: Option<String>,
    pub price_cents: i64,
    pub duration_minutes: Option<u16>,
}

#[derive(Debug, Clone)]
pub struct ServiceUpdate {
    pub name: String,
    pub category: Option<String>,
    pub price_cents: i64,
    pub duration_minutes: Option<u16>,
    pub active: bool,
}

#[derive(Debug, Clone)]
pub struct NewLocation {
    pub name: String,
    pub description: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NewDoctor {
    pub full_name: String,
    pub email: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_clamping() {
        let p = Page::new(0, 0);
        assert_eq!(p.page(), 1);
        assert_eq!(p.per_page(), 1);

        let p = Page::new(3, 10_000);
        assert_eq!(p.per_page(), MAX_PER_PAGE);
    }

    #[test]
    fn test_page_offset() {
        assert_eq!(Page::new(1, 25).offset(), 0);
        assert_eq!(Page::new(3, 25).offset(), 50);
        assert_eq!(Page::new(2, 100).limit(), 100);
    }

    #[test]
    fn test_default_page() {
        let p = Page::default();
        assert_eq!(p.page(), 1);
        assert_eq!(p.per_page(), DEFAULT_PER_PAGE);
    }

    #[test]
    fn test_paged_carries_page_info() {
        let paged = Paged::new(vec![1, 2, 3], 42, Page::new(2, 3));
        assert_eq!(paged.total, 42);
        assert_eq!(paged.page, 2);
        assert_eq!(paged.per_page, 3);
    }
}
