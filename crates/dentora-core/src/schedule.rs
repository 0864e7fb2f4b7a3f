//! Schedule blocks and overlap detection.
//!
//! A schedule block is a doctor-defined time range during which treatment
//! sessions cannot be booked. Blocks apply to a single date, every day, or a
//! set of weekdays. Ranges are minute offsets from midnight, half-open:
//! a block ending at minute N does not collide with a range starting at N.

use serde::{Deserialize, Serialize};
use time::{Date, OffsetDateTime, Weekday};
use uuid::Uuid;

use crate::error::{CoreError, Result};

pub const MINUTES_PER_DAY: u16 = 1440;

/// A half-open minute range `[start, end)` within a single day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    pub start_minute: u16,
    pub end_minute: u16,
}

impl TimeRange {
    pub fn new(start_minute: u16, end_minute: u16) -> Result<Self> {
        if end_minute > MINUTES_PER_DAY {
            return Err(CoreError::invalid_time_range(format!(
                "end minute {end_minute} is past midnight ({MINUTES_PER_DAY})"
            )));
        }
        if start_minute >= end_minute {
            return Err(CoreError::invalid_time_range(format!(
                "start minute {start_minute} must be before end minute {end_minute}"
            )));
        }
        Ok(Self {
            start_minute,
            end_minute,
        })
    }

    pub fn intersects(&self, other: &TimeRange) -> bool {
        self.start_minute < other.end_minute && other.start_minute < self.end_minute
    }

    pub fn duration_minutes(&self) -> u16 {
        self.end_minute - self.start_minute
    }
}

/// Formats a minute offset as `HH:MM`.
pub fn format_minute(minute: u16) -> String {
    format!("{:02}:{:02}", minute / 60, minute % 60)
}

/// A set of weekdays, stored as a 7-bit mask (bit 0 = Monday).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WeekdaySet(u8);

impl WeekdaySet {
    pub const EMPTY: WeekdaySet = WeekdaySet(0);

    pub fn from_mask(mask: u8) -> Self {
        Self(mask & 0x7f)
    }

    pub fn mask(&self) -> u8 {
        self.0
    }

    #[must_use]
    pub fn with(self, day: Weekday) -> Self {
        Self(self.0 | 1 << day.number_days_from_monday())
    }

    pub fn contains(&self, day: Weekday) -> bool {
        self.0 & (1 << day.number_days_from_monday()) != 0
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub fn len(&self) -> u32 {
        self.0.count_ones()
    }
}

impl FromIterator<Weekday> for WeekdaySet {
    fn from_iter<T: IntoIterator<Item = Weekday>>(iter: T) -> Self {
        iter.into_iter().fold(Self::EMPTY, Self::with)
    }
}

/// Parses a lowercase English weekday name.
pub fn parse_weekday(s: &str) -> Result<Weekday> {
    match s.to_ascii_lowercase().as_str() {
        "monday" => Ok(Weekday::Monday),
        "tuesday" => Ok(Weekday::Tuesday),
        "wednesday" => Ok(Weekday::Wednesday),
        "thursday" => Ok(Weekday::Thursday),
        "friday" => Ok(Weekday::Friday),
        "saturday" => Ok(Weekday::Saturday),
        "sunday" => Ok(Weekday::Sunday),
        other => Err(CoreError::validation(
            "weekdays",
            format!("unknown weekday '{other}'"),
        )),
    }
}

/// Which dates a schedule block applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum BlockRecurrence {
    Single {
        #[serde(with = "crate::time::serde_date")]
        date: Date,
    },
    Daily,
    Weekly {
        days: WeekdaySet,
    },
}

impl BlockRecurrence {
    pub fn applies_on(&self, date: Date) -> bool {
        match self {
            Self::Single { date: block_date } => *block_date == date,
            Self::Daily => true,
            Self::Weekly { days } => days.contains(date.weekday()),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if let Self::Weekly { days } = self
            && days.is_empty()
        {
            return Err(CoreError::validation(
                "weekdays",
                "a weekly block needs at least one weekday",
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleBlock {
    pub id: Uuid,
    pub doctor_id: Uuid,
    #[serde(flatten)]
    pub recurrence: BlockRecurrence,
    pub range: TimeRange,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl ScheduleBlock {
    /// Whether booking `range` on `date` would collide with this block.
    pub fn blocks(&self, date: Date, range: &TimeRange) -> bool {
        self.recurrence.applies_on(date) && self.range.intersects(range)
    }
}

/// Returns every block the candidate range collides with.
pub fn find_conflicts<'a>(
    blocks: &'a [ScheduleBlock],
    date: Date,
    range: &TimeRange,
) -> Vec<&'a ScheduleBlock> {
    blocks.iter().filter(|b| b.blocks(date, range)).collect()
}
