//! iCalendar (RFC 5545) files for treatment sessions.
//!
//! Events use floating local time: the clinic books wall-clock slots, so the
//! appointment must read 09:30 regardless of the calendar's timezone.

use dentora_core::{MINUTES_PER_DAY, Patient, TreatmentSession};
use time::OffsetDateTime;

use crate::DocsError;

const CRLF: &str = "\r\n";

/// Escapes TEXT values per RFC 5545 section 3.3.11.
fn escape_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            ';' => out.push_str("\\;"),
            ',' => out.push_str("\\,"),
            '\n' => out.push_str("\\n"),
            '\r' => {}
            other => out.push(other),
        }
    }
    out
}

/// `YYYYMMDDTHHMMSSZ` for DTSTAMP.
fn format_utc(at: OffsetDateTime) -> String {
    format!(
        "{:04}{:02}{:02}T{:02}{:02}{:02}Z",
        at.year(),
        u8::from(at.month()),
        at.day(),
        at.hour(),
        at.minute(),
        at.second()
    )
}

/// `YYYYMMDDTHHMMSS` floating local time for DTSTART/DTEND. A range ending
/// at minute 1440 rolls over to 00:00 of the next day; hour 24 is not a
/// valid iCalendar time.
fn format_local(date: time::Date, minute: u16) -> String {
    let (date, minute) = if minute >= MINUTES_PER_DAY {
        (date.next_day().unwrap_or(date), 0)
    } else {
        (date, minute)
    };
    format!(
        "{:04}{:02}{:02}T{:02}{:02}00",
        date.year(),
        u8::from(date.month()),
        date.day(),
        minute / 60,
        minute % 60
    )
}

/// Renders a booked treatment session as a single-event iCalendar file.
///
/// # Errors
///
/// Returns `DocsError::Unscheduled` when the session has no booked slot.
pub fn session_calendar(
    session: &TreatmentSession,
    patient: &Patient,
) -> Result<String, DocsError> {
    let (date, range) = session.slot().ok_or(DocsError::Unscheduled)?;

    let summary = format!("Treatment session: {}", patient.full_name());
    let mut description = format!("Status: {}", session.status);
    if let Some(notes) = &session.notes {
        description.push('\n');
        description.push_str(notes);
    }

    let mut lines: Vec<String> = vec![
        "BEGIN:VCALENDAR".to_string(),
        "VERSION:2.0".to_string(),
        "PRODID:-//Dentora//Clinic Server//EN".to_string(),
        "CALSCALE:GREGORIAN".to_string(),
        "METHOD:PUBLISH".to_string(),
        "BEGIN:VEVENT".to_string(),
        format!("UID:{}@dentora", session.id),
        format!("DTSTAMP:{}", format_utc(session.updated_at)),
        format!("DTSTART:{}", format_local(date, range.start_minute)),
        format!("DTEND:{}", format_local(date, range.end_minute)),
        format!("SUMMARY:{}", escape_text(&summary)),
        format!("DESCRIPTION:{}", escape_text(&description)),
        "END:VEVENT".to_string(),
        "END:VCALENDAR".to_string(),
    ];
    lines.push(String::new());
    Ok(lines.join(CRLF))
}

#[cfg(test)]
mod tests {
    use super::*;
    use dentora_core::SessionStatus;
    use time::macros::{date, datetime};
    use uuid::Uuid;

    fn session() -> (TreatmentSession, Patient) {
        let patient_id = Uuid::new_v4();
        let session = TreatmentSession {
            id: Uuid::new_v4(),
            patient_id,
            doctor_id: Uuid::new_v4(),
            budget_item_id: None,
            service_id: None,
            location_id: None,
            status: SessionStatus::Pending,
            scheduled_date: Some(date!(2026 - 03 - 16)),
            start_minute: Some(570),
            end_minute: Some(630),
            charged_amount_cents: None,
            performed_at: None,
            notes: Some("Bring x-rays; arrive early".to_string()),
            created_at: datetime!(2026-02-01 10:00:00 UTC),
            updated_at: datetime!(2026-02-01 10:00:00 UTC),
        };
        let patient = Patient {
            id: patient_id,
            first_name: "Ana".to_string(),
            last_name: "García".to_string(),
            email: None,
            phone: None,
            birth_date: None,
            doctor_id: None,
            notes: None,
            created_at: datetime!(2026-01-01 00:00:00 UTC),
            updated_at: datetime!(2026-01-01 00:00:00 UTC),
        };
        (session, patient)
    }

    #[test]
    fn test_calendar_structure() {
        let (session, patient) = session();
        let ics = session_calendar(&session, &patient).unwrap();

        assert!(ics.starts_with("BEGIN:VCALENDAR\r\n"));
        assert!(ics.ends_with("END:VCALENDAR\r\n"));
        assert!(ics.contains("DTSTART:20260316T093000\r\n"));
        assert!(ics.contains("DTEND:20260316T103000\r\n"));
        assert!(ics.contains("DTSTAMP:20260201T100000Z\r\n"));
        assert!(ics.contains(&format!("UID:{}@dentora", session.id)));
        // Every line is CRLF-terminated
        assert!(!ics.replace("\r\n", "").contains('\n'));
    }

    #[test]
    fn test_midnight_end_rolls_to_next_day() {
        let (mut session, patient) = session();
        session.start_minute = Some(1380);
        session.end_minute = Some(1440);
        let ics = session_calendar(&session, &patient).unwrap();

        assert!(ics.contains("DTSTART:20260316T230000\r\n"));
        assert!(ics.contains("DTEND:20260317T000000\r\n"));
        assert!(!ics.contains("T240000"));
    }

    #[test]
    fn test_text_escaping() {
        let (session, patient) = session();
        let ics = session_calendar(&session, &patient).unwrap();
        assert!(ics.contains("Bring x-rays\\; arrive early"));
    }

    #[test]
    fn test_unscheduled_session_rejected() {
        let (mut session, patient) = session();
        session.start_minute = None;
        assert!(matches!(
            session_calendar(&session, &patient),
            Err(DocsError::Unscheduled)
        ));
    }
}
