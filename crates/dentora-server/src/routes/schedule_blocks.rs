//! Schedule block endpoints and the conflict probe.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::{Json, response::IntoResponse};
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use dentora_core::schedule::{
    BlockRecurrence, TimeRange, WeekdaySet, find_conflicts, parse_weekday,
};
use dentora_storage::types::NewScheduleBlock;

use crate::error::ApiError;
use crate::state::AppState;
use crate::validation::parse_date_field;

#[derive(Debug, Deserialize)]
pub struct ScheduleBlockPayload {
    pub doctor_id: Uuid,
    /// `single`, `daily` or `weekly`.
    pub kind: String,
    /// Required for `single`, `YYYY-MM-DD`.
    #[serde(default)]
    pub date: Option<String>,
    /// Required non-empty for `weekly`; lowercase English day names.
    #[serde(default)]
    pub weekdays: Option<Vec<String>>,
    pub start_minute: u16,
    pub end_minute: u16,
    #[serde(default)]
    pub reason: Option<String>,
}

impl ScheduleBlockPayload {
    fn validate(self) -> Result<NewScheduleBlock, ApiError> {
        let range = TimeRange::new(self.start_minute, self.end_minute)?;
        let recurrence = match self.kind.as_str() {
            "single" => {
                let date = self
                    .date
                    .as_ref()
                    .ok_or_else(|| ApiError::invalid_field("date", "is required for a single-date block"))?;
                BlockRecurrence::Single {
                    date: parse_date_field("date", date)?,
                }
            }
            "daily" => BlockRecurrence::Daily,
            "weekly" => {
                let names = self.weekdays.unwrap_or_default();
                let days: WeekdaySet = names
                    .iter()
                    .map(|name| parse_weekday(name))
                    .collect::<Result<_, _>>()?;
                BlockRecurrence::Weekly { days }
            }
            other => {
                return Err(ApiError::invalid_field(
                    "kind",
                    format!("must be single, daily or weekly, got '{other}'"),
                ));
            }
        };
        recurrence.validate()?;
        Ok(NewScheduleBlock {
            doctor_id: self.doctor_id,
            recurrence,
            range,
            reason: self.reason,
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct BlockListQuery {
    pub doctor_id: Option<Uuid>,
}

pub async fn list_blocks(
    State(state): State<AppState>,
    Query(query): Query<BlockListQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let blocks = state.storage.list_blocks(query.doctor_id).await?;
    Ok(Json(blocks))
}

pub async fn create_block(
    State(state): State<AppState>,
    Json(payload): Json<ScheduleBlockPayload>,
) -> Result<impl IntoResponse, ApiError> {
    let block = state.storage.create_block(payload.validate()?).await?;
    Ok((StatusCode::CREATED, Json(block)))
}

pub async fn delete_block(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    state.storage.delete_block(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
pub struct ConflictQuery {
    pub doctor_id: Uuid,
    /// `YYYY-MM-DD`.
    pub date: String,
    pub start_minute: u16,
    pub end_minute: u16,
}

/// Probes whether a candidate slot collides with the doctor's blocks, and
/// with which.
pub async fn check_conflicts(
    State(state): State<AppState>,
    Query(query): Query<ConflictQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let date = parse_date_field("date", &query.date)?;
    let range = TimeRange::new(query.start_minute, query.end_minute)?;
    let blocks = state.storage.list_blocks(Some(query.doctor_id)).await?;
    let conflicts = find_conflicts(&blocks, date, &range);
    Ok(Json(json!({
        "conflict": !conflicts.is_empty(),
        "blocks": conflicts,
    })))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload(kind: &str) -> ScheduleBlockPayload {
        ScheduleBlockPayload {
            doctor_id: Uuid::new_v4(),
            kind: kind.to_string(),
            date: Some("2026-03-16".to_string()),
            weekdays: Some(vec!["monday".to_string(), "friday".to_string()]),
            start_minute: 540,
            end_minute: 600,
            reason: None,
        }
    }

    #[test]
    fn test_validate_kinds() {
        assert!(payload("single").validate().is_ok());
        assert!(payload("daily").validate().is_ok());
        assert!(payload("weekly").validate().is_ok());
        assert!(payload("monthly").validate().is_err());
    }

    #[test]
    fn test_single_requires_date() {
        let mut p = payload("single");
        p.date = None;
        assert!(p.validate().is_err());
    }

    #[test]
    fn test_weekly_requires_days() {
        let mut p = payload("weekly");
        p.weekdays = Some(Vec::new());
        assert!(p.validate().is_err());
        let mut p = payload("weekly");
        p.weekdays = Some(vec!["lunes".to_string()]);
        assert!(p.validate().is_err());
    }

    #[test]
    fn test_range_validated() {
        let mut p = payload("daily");
        p.end_minute = p.start_minute;
        assert!(p.validate().is_err());
        let mut p = payload("daily");
        p.end_minute = 2000;
        assert!(p.validate().is_err());
    }
}
