pub mod budget;
pub mod catalog;
pub mod error;
pub mod id;
pub mod patient;
pub mod prescription;
pub mod schedule;
pub mod time;
pub mod treatment;

pub use budget::{Budget, BudgetItem, BudgetStatus, recompute_totals};
pub use catalog::{Doctor, Location, Service};
pub use error::{CoreError, Result};
pub use id::generate_id;
pub use patient::Patient;
pub use prescription::{Prescription, PrescriptionItem};
pub use schedule::{
    BlockRecurrence, MINUTES_PER_DAY, ScheduleBlock, TimeRange, WeekdaySet, find_conflicts,
    format_minute, parse_weekday,
};
pub use time::{now_utc, parse_date};
pub use treatment::{SessionStatus, TreatmentSession};
