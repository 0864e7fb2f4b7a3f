//! Field validation helpers shared by the request DTOs.

use time::Date;

use dentora_core::{now_utc, parse_date};

use crate::error::ApiError;

/// Requires a non-empty trimmed string.
pub fn require_text(field: &str, value: String) -> Result<String, ApiError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ApiError::invalid_field(field, "must not be empty"));
    }
    Ok(trimmed.to_string())
}

/// Parses an API calendar date (`YYYY-MM-DD`).
pub fn parse_date_field(field: &str, value: &str) -> Result<Date, ApiError> {
    parse_date(value).map_err(|e| ApiError::invalid_field(field, e))
}

/// Parses an optional calendar date.
pub fn parse_optional_date(
    field: &str,
    value: Option<&String>,
) -> Result<Option<Date>, ApiError> {
    value.map(|v| parse_date_field(field, v)).transpose()
}

/// Minimal e-mail shape check; real validation is the mail server's job.
pub fn validate_email(field: &str, value: Option<String>) -> Result<Option<String>, ApiError> {
    match value {
        None => Ok(None),
        Some(raw) => {
            let trimmed = raw.trim().to_string();
            if trimmed.is_empty() {
                return Ok(None);
            }
            let well_formed = trimmed
                .split_once('@')
                .is_some_and(|(local, domain)| !local.is_empty() && domain.contains('.'));
            if !well_formed {
                return Err(ApiError::invalid_field(field, "is not a valid e-mail address"));
            }
            Ok(Some(trimmed))
        }
    }
}

/// Birth dates cannot be in the future.
pub fn validate_birth_date(field: &str, date: Option<Date>) -> Result<Option<Date>, ApiError> {
    if let Some(d) = date
        && d > now_utc().date()
    {
        return Err(ApiError::invalid_field(field, "must not be in the future"));
    }
    Ok(date)
}

/// Requires a non-negative amount of cents.
pub fn require_non_negative(field: &str, value: i64) -> Result<i64, ApiError> {
    if value < 0 {
        return Err(ApiError::invalid_field(field, "must not be negative"));
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::date;

    #[test]
    fn test_require_text() {
        assert_eq!(require_text("name", "  Ana ".to_string()).unwrap(), "Ana");
        assert!(require_text("name", "   ".to_string()).is_err());
        assert!(require_text("name", String::new()).is_err());
    }

    #[test]
    fn test_parse_date_field() {
        assert_eq!(
            parse_date_field("date", "2026-03-16").unwrap(),
            date!(2026 - 03 - 16)
        );
        let err = parse_date_field("scheduled_date", "16/03/2026").unwrap_err();
        assert!(err.message.contains("scheduled_date"));
    }

    #[test]
    fn test_validate_email() {
        assert_eq!(
            validate_email("email", Some("ana@clinic.example".to_string())).unwrap(),
            Some("ana@clinic.example".to_string())
        );
        // Blank collapses to none
        assert_eq!(validate_email("email", Some("  ".to_string())).unwrap(), None);
        assert!(validate_email("email", Some("not-an-address".to_string())).is_err());
        assert!(validate_email("email", Some("a@nodot".to_string())).is_err());
    }

    #[test]
    fn test_validate_birth_date() {
        assert!(validate_birth_date("birth_date", Some(date!(1990 - 05 - 01))).is_ok());
        let future = now_utc().date() + time::Duration::days(30);
        assert!(validate_birth_date("birth_date", Some(future)).is_err());
    }

    #[test]
    fn test_require_non_negative() {
        assert_eq!(require_non_negative("price_cents", 0).unwrap(), 0);
        assert!(require_non_negative("price_cents", -1).is_err());
    }
}
