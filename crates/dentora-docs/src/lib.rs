//! Server-generated documents: printable HTML for budgets and prescriptions,
//! and iCalendar files for treatment sessions.

pub mod budget;
pub mod html;
pub mod ics;
pub mod prescription;

pub use budget::budget_document;
pub use ics::session_calendar;
pub use prescription::prescription_document;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DocsError {
    /// The session has no booked date and time to put on a calendar.
    #[error("treatment session is not scheduled")]
    Unscheduled,

    #[error("Invalid document input: {0}")]
    InvalidInput(String),
}

/// Formats a cent amount as a decimal money string (`12345` → `123.45`).
pub fn format_money(cents: i64) -> String {
    let sign = if cents < 0 { "-" } else { "" };
    let cents = cents.abs();
    format!("{sign}{}.{:02}", cents / 100, cents % 100)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_money() {
        assert_eq!(format_money(0), "0.00");
        assert_eq!(format_money(5), "0.05");
        assert_eq!(format_money(4_500), "45.00");
        assert_eq!(format_money(123_456), "1234.56");
        assert_eq!(format_money(-4_505), "-45.05");
    }
}
