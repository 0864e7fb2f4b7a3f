use time::format_description::BorrowedFormatItem;
use time::macros::format_description;
use time::{Date, OffsetDateTime};

use crate::error::{CoreError, Result};

/// Calendar date format used across the API (`2026-03-15`).
pub const DATE_FORMAT: &[BorrowedFormatItem<'static>] = format_description!("[year]-[month]-[day]");

pub fn now_utc() -> OffsetDateTime {
    OffsetDateTime::now_utc()
}

/// Parses an API calendar date (`YYYY-MM-DD`).
pub fn parse_date(s: &str) -> Result<Date> {
    Date::parse(s, DATE_FORMAT)
        .map_err(|e| CoreError::invalid_date(format!("Failed to parse date '{s}': {e}")))
}

/// Formats a date back into the API calendar form.
pub fn format_date(date: Date) -> String {
    date.format(DATE_FORMAT)
        .unwrap_or_else(|_| date.to_string())
}

/// Serde adapter for `time::Date` fields using the `YYYY-MM-DD` form.
pub mod serde_date {
    use serde::{Deserialize, Deserializer, Serializer};
    use time::Date;

    use super::DATE_FORMAT;

    pub fn serialize<S>(date: &Date, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let formatted = date.format(DATE_FORMAT).map_err(serde::ser::Error::custom)?;
        serializer.serialize_str(&formatted)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Date, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Date::parse(&s, DATE_FORMAT).map_err(serde::de::Error::custom)
    }

    pub mod option {
        use serde::{Deserialize, Deserializer, Serializer};
        use time::Date;

        use super::DATE_FORMAT;

        pub fn serialize<S>(date: &Option<Date>, serializer: S) -> Result<S::Ok, S::Error>
        where
            S: Serializer,
        {
            match date {
                Some(d) => {
                    let formatted = d.format(DATE_FORMAT).map_err(serde::ser::Error::custom)?;
                    serializer.serialize_some(&formatted)
                }
                None => serializer.serialize_none(),
            }
        }

        pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Date>, D::Error>
        where
            D: Deserializer<'de>,
        {
            let s: Option<String> = Option::deserialize(deserializer)?;
            match s {
                Some(s) => Date::parse(&s, DATE_FORMAT)
                    .map(Some)
                    .map_err(serde::de::Error::custom),
                None => Ok(None),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};
    use time::macros::date;

    #[test]
    fn test_parse_date() {
        assert_eq!(parse_date("2026-03-15").unwrap(), date!(2026 - 03 - 15));
        assert_eq!(parse_date("2024-02-29").unwrap(), date!(2024 - 02 - 29));
    }

    #[test]
    fn test_parse_date_invalid() {
        assert!(parse_date("2026-13-01").is_err());
        assert!(parse_date("2026-02-30").is_err());
        assert!(parse_date("15/03/2026").is_err());
        assert!(parse_date("").is_err());
    }

    #[test]
    fn test_parse_date_error_message() {
        match parse_date("nope") {
            Err(CoreError::InvalidDate(msg)) => assert!(msg.contains("nope")),
            other => panic!("expected InvalidDate, got {other:?}"),
        }
    }

    #[test]
    fn test_format_date() {
        assert_eq!(format_date(date!(2026 - 03 - 05)), "2026-03-05");
    }

    #[derive(Serialize, Deserialize)]
    struct Wrapper {
        #[serde(with = "super::serde_date")]
        date: Date,
        #[serde(with = "super::serde_date::option")]
        maybe: Option<Date>,
    }

    #[test]
    fn test_serde_date_roundtrip() {
        let w = Wrapper {
            date: date!(2026 - 01 - 31),
            maybe: Some(date!(2025 - 12 - 01)),
        };
        let json = serde_json::to_string(&w).unwrap();
        assert!(json.contains("\"2026-01-31\""));
        assert!(json.contains("\"2025-12-01\""));

        let back: Wrapper = serde_json::from_str(&json).unwrap();
        assert_eq!(back.date, w.date);
        assert_eq!(back.maybe, w.maybe);
    }

    #[test]
    fn test_serde_date_option_none() {
        let back: Wrapper =
            serde_json::from_str(r#"{"date":"2026-01-31","maybe":null}"#).unwrap();
        assert_eq!(back.maybe, None);
    }
}
