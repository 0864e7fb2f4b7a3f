//! Treatment session endpoints.
//!
//! Booking a slot checks the doctor's schedule blocks; a collision is a 409.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::{Json, response::IntoResponse};
use serde::Deserialize;
use time::Date;
use uuid::Uuid;

use dentora_core::schedule::{TimeRange, find_conflicts};
use dentora_core::SessionStatus;
use dentora_storage::types::{NewSession, Page, SessionFilter, SessionUpdate};

use crate::error::ApiError;
use crate::state::AppState;
use crate::validation::{parse_optional_date, require_non_negative};

/// A booked slot: date plus minute range, all three together or none.
fn validate_slot(
    date: Option<Date>,
    start_minute: Option<u16>,
    end_minute: Option<u16>,
) -> Result<Option<(Date, TimeRange)>, ApiError> {
    match (date, start_minute, end_minute) {
        (None, None, None) => Ok(None),
        (Some(date), Some(start), Some(end)) => {
            let range = TimeRange::new(start, end)?;
            Ok(Some((date, range)))
        }
        _ => Err(ApiError::validation(
            "scheduled_date, start_minute and end_minute must be provided together",
        )),
    }
}

/// 409 when the slot lands inside one of the doctor's schedule blocks.
async fn ensure_slot_free(
    state: &AppState,
    doctor_id: Uuid,
    slot: Option<(Date, TimeRange)>,
) -> Result<(), ApiError> {
    let Some((date, range)) = slot else {
        return Ok(());
    };
    let blocks = state.storage.list_blocks(Some(doctor_id)).await?;
    let conflicts = find_conflicts(&blocks, date, &range);
    if conflicts.is_empty() {
        return Ok(());
    }
    let reasons: Vec<&str> = conflicts
        .iter()
        .filter_map(|b| b.reason.as_deref())
        .collect();
    let mut message = format!(
        "requested time collides with {} schedule block(s) of the doctor",
        conflicts.len()
    );
    if !reasons.is_empty() {
        message.push_str(&format!(" ({})", reasons.join(", ")));
    }
    Err(ApiError::conflict(message))
}

#[derive(Debug, Deserialize)]
pub struct SessionPayload {
    pub patient_id: Uuid,
    pub doctor_id: Uuid,
    #[serde(default)]
    pub service_id: Option<Uuid>,
    #[serde(default)]
    pub location_id: Option<Uuid>,
    /// `YYYY-MM-DD`.
    #[serde(default)]
    pub scheduled_date: Option<String>,
    #[serde(default)]
    pub start_minute: Option<u16>,
    #[serde(default)]
    pub end_minute: Option<u16>,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SessionUpdatePayload {
    #[serde(default)]
    pub scheduled_date: Option<String>,
    #[serde(default)]
    pub start_minute: Option<u16>,
    #[serde(default)]
    pub end_minute: Option<u16>,
    #[serde(default)]
    pub location_id: Option<Uuid>,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct CompletePayload {
    #[serde(default)]
    pub charged_amount_cents: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct SessionListQuery {
    pub patient_id: Option<Uuid>,
    pub doctor_id: Option<Uuid>,
    pub budget_id: Option<Uuid>,
    pub status: Option<String>,
    /// `YYYY-MM-DD`, inclusive.
    pub from: Option<String>,
    pub to: Option<String>,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

pub async fn list_sessions(
    State(state): State<AppState>,
    Query(query): Query<SessionListQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let status = query
        .status
        .as_deref()
        .map(str::parse::<SessionStatus>)
        .transpose()?;
    let filter = SessionFilter {
        patient_id: query.patient_id,
        doctor_id: query.doctor_id,
        budget_id: query.budget_id,
        status,
        from: parse_optional_date("from", query.from.as_ref())?,
        to: parse_optional_date("to", query.to.as_ref())?,
    };
    let page = Page::new(query.page.unwrap_or(1), query.per_page.unwrap_or(25));
    let sessions = state.storage.list_sessions(filter, page).await?;
    Ok(Json(sessions))
}

pub async fn create_session(
    State(state): State<AppState>,
    Json(payload): Json<SessionPayload>,
) -> Result<impl IntoResponse, ApiError> {
    let date = parse_optional_date("scheduled_date", payload.scheduled_date.as_ref())?;
    let slot = validate_slot(date, payload.start_minute, payload.end_minute)?;
    ensure_slot_free(&state, payload.doctor_id, slot).await?;

    let new = NewSession {
        patient_id: payload.patient_id,
        doctor_id: payload.doctor_id,
        service_id: payload.service_id,
        location_id: payload.location_id,
        scheduled_date: slot.map(|(d, _)| d),
        start_minute: slot.map(|(_, r)| r.start_minute),
        end_minute: slot.map(|(_, r)| r.end_minute),
        notes: payload.notes,
    };
    let session = state.storage.create_session(new).await?;
    Ok((StatusCode::CREATED, Json(session)))
}

pub async fn get_session(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let session = state
        .storage
        .get_session(id)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("treatment session not found: {id}")))?;
    Ok(Json(session))
}

pub async fn update_session(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<SessionUpdatePayload>,
) -> Result<impl IntoResponse, ApiError> {
    let existing = state
        .storage
        .get_session(id)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("treatment session not found: {id}")))?;

    let date = parse_optional_date("scheduled_date", payload.scheduled_date.as_ref())?;
    let slot = validate_slot(date, payload.start_minute, payload.end_minute)?;
    ensure_slot_free(&state, existing.doctor_id, slot).await?;

    let update = SessionUpdate {
        scheduled_date: slot.map(|(d, _)| d),
        start_minute: slot.map(|(_, r)| r.start_minute),
        end_minute: slot.map(|(_, r)| r.end_minute),
        location_id: payload.location_id,
        notes: payload.notes,
    };
    let session = state.storage.update_session(id, update).await?;
    Ok(Json(session))
}

pub async fn delete_session(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    state.storage.delete_session(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn complete_session(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<CompletePayload>,
) -> Result<impl IntoResponse, ApiError> {
    let charged = payload
        .charged_amount_cents
        .map(|c| require_non_negative("charged_amount_cents", c))
        .transpose()?;
    let session = state.storage.complete_session(id, charged).await?;
    Ok(Json(session))
}

pub async fn cancel_session(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let session = state.storage.cancel_session(id).await?;
    Ok(Json(session))
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::date;

    #[test]
    fn test_validate_slot_all_or_none() {
        assert!(validate_slot(None, None, None).unwrap().is_none());
        assert!(validate_slot(Some(date!(2026 - 03 - 16)), Some(540), Some(600)).is_ok());
        assert!(validate_slot(Some(date!(2026 - 03 - 16)), None, None).is_err());
        assert!(validate_slot(None, Some(540), Some(600)).is_err());
    }

    #[test]
    fn test_validate_slot_rejects_bad_range() {
        let err = validate_slot(Some(date!(2026 - 03 - 16)), Some(600), Some(540)).unwrap_err();
        assert_eq!(err.status, axum::http::StatusCode::BAD_REQUEST);
    }
}
