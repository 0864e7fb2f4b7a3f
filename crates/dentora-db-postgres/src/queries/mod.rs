//! SQL query implementations, one module per entity.
//!
//! Rows travel as tuples through `query_as`; `chrono` types cross the sqlx
//! boundary and are converted to the `time` types the domain uses.

pub mod budgets;
pub mod catalog;
pub mod patients;
pub mod prescriptions;
pub mod schedule;
pub mod sessions;

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use time::{Date, Month, OffsetDateTime};

use dentora_storage::StorageError;

/// Converts chrono DateTime to time OffsetDateTime.
pub(crate) fn chrono_to_time(dt: DateTime<Utc>) -> OffsetDateTime {
    OffsetDateTime::from_unix_timestamp(dt.timestamp()).unwrap_or(OffsetDateTime::UNIX_EPOCH)
        + time::Duration::nanoseconds(i64::from(dt.timestamp_subsec_nanos()))
}

/// Converts time OffsetDateTime to chrono DateTime.
pub(crate) fn time_to_chrono(t: OffsetDateTime) -> DateTime<Utc> {
    DateTime::from_timestamp(t.unix_timestamp(), t.nanosecond()).unwrap_or_default()
}

/// Converts a chrono calendar date to a time date.
pub(crate) fn chrono_to_date(d: NaiveDate) -> Date {
    Month::try_from(d.month() as u8)
        .ok()
        .and_then(|month| Date::from_calendar_date(d.year(), month, d.day() as u8).ok())
        .unwrap_or(Date::MIN)
}

/// Converts a time calendar date to a chrono date.
pub(crate) fn date_to_chrono(d: Date) -> NaiveDate {
    NaiveDate::from_ymd_opt(d.year(), u8::from(d.month()) as u32, d.day() as u32)
        .unwrap_or_default()
}

/// Wraps an infrastructure sqlx error with query context.
pub(crate) fn db_err(context: &str, e: sqlx_core::error::Error) -> StorageError {
    StorageError::internal(format!("{context}: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::{date, datetime};

    #[test]
    fn test_datetime_roundtrip() {
        let original = datetime!(2026-03-16 09:30:15.5 UTC);
        let back = chrono_to_time(time_to_chrono(original));
        assert_eq!(back, original);
    }

    #[test]
    fn test_date_roundtrip() {
        let original = date!(2026 - 02 - 28);
        assert_eq!(chrono_to_date(date_to_chrono(original)), original);
    }
}
