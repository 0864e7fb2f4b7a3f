//! Treatment sessions: dated clinical encounters, optionally linked to a
//! budget line item.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use time::{Date, OffsetDateTime};
use uuid::Uuid;

use crate::error::{CoreError, Result};
use crate::schedule::TimeRange;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Pending,
    Completed,
    Cancelled,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SessionStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "pending" => Ok(Self::Pending),
            "completed" => Ok(Self::Completed),
            "cancelled" => Ok(Self::Cancelled),
            other => Err(CoreError::validation(
                "status",
                format!("unknown session status '{other}'"),
            )),
        }
    }
}

/// A single clinical encounter.
///
/// Sessions materialised from a budget item start out unscheduled: the date
/// and minute range are filled in later, together, when the visit is booked.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TreatmentSession {
    pub id: Uuid,
    pub patient_id: Uuid,
    pub doctor_id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub budget_item_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location_id: Option<Uuid>,
    pub status: SessionStatus,
    #[serde(with = "crate::time::serde_date::option", default)]
    pub scheduled_date: Option<Date>,
    pub start_minute: Option<u16>,
    pub end_minute: Option<u16>,
    pub charged_amount_cents: Option<i64>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub performed_at: Option<OffsetDateTime>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl TreatmentSession {
    pub fn is_settled(&self) -> bool {
        matches!(self.status, SessionStatus::Completed | SessionStatus::Cancelled)
    }

    /// The booked slot, when the session has been scheduled.
    pub fn slot(&self) -> Option<(Date, TimeRange)> {
        match (self.scheduled_date, self.start_minute, self.end_minute) {
            (Some(date), Some(start), Some(end)) => {
                TimeRange::new(start, end).ok().map(|range| (date, range))
            }
            _ => None,
        }
    }

    pub fn ensure_pending(&self, action: &str) -> Result<()> {
        if self.status != SessionStatus::Pending {
            return Err(CoreError::invalid_transition(
                "treatment session",
                action,
                self.status.as_str(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::id::generate_id;
    use time::macros::{date, datetime};

    fn session(status: SessionStatus) -> TreatmentSession {
        TreatmentSession {
            id: generate_id(),
            patient_id: generate_id(),
            doctor_id: generate_id(),
            budget_item_id: None,
            service_id: None,
            location_id: None,
            status,
            scheduled_date: None,
            start_minute: None,
            end_minute: None,
            charged_amount_cents: None,
            performed_at: None,
            notes: None,
            created_at: datetime!(2026-02-01 10:00:00 UTC),
            updated_at: datetime!(2026-02-01 10:00:00 UTC),
        }
    }

    #[test]
    fn test_is_settled() {
        assert!(!session(SessionStatus::Pending).is_settled());
        assert!(session(SessionStatus::Completed).is_settled());
        assert!(session(SessionStatus::Cancelled).is_settled());
    }

    #[test]
    fn test_slot_requires_all_fields() {
        let mut s = session(SessionStatus::Pending);
        assert_eq!(s.slot(), None);

        s.scheduled_date = Some(date!(2026 - 03 - 16));
        s.start_minute = Some(540);
        assert_eq!(s.slot(), None);

        s.end_minute = Some(600);
        let (date, range) = s.slot().unwrap();
        assert_eq!(date, date!(2026 - 03 - 16));
        assert_eq!(range.duration_minutes(), 60);
    }

    #[test]
    fn test_slot_rejects_inverted_range() {
        let mut s = session(SessionStatus::Pending);
        s.scheduled_date = Some(date!(2026 - 03 - 16));
        s.start_minute = Some(600);
        s.end_minute = Some(540);
        assert_eq!(s.slot(), None);
    }

    #[test]
    fn test_ensure_pending() {
        assert!(session(SessionStatus::Pending).ensure_pending("edited").is_ok());
        let err = session(SessionStatus::Completed)
            .ensure_pending("edited")
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "treatment session cannot be edited while completed"
        );
    }

    #[test]
    fn test_status_parse() {
        assert_eq!("pending".parse::<SessionStatus>().unwrap(), SessionStatus::Pending);
        assert!("done".parse::<SessionStatus>().is_err());
    }
}
