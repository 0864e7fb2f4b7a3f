//! Server-generated document endpoints: printable HTML and calendar files.

use axum::extract::{Path, State};
use axum::http::header;
use axum::response::{Html, IntoResponse};
use uuid::Uuid;

use dentora_core::Patient;
use dentora_docs::{budget_document, prescription_document, session_calendar};

use crate::error::ApiError;
use crate::state::AppState;

async fn load_patient(state: &AppState, id: Uuid) -> Result<Patient, ApiError> {
    state
        .storage
        .get_patient(id)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("patient not found: {id}")))
}

pub async fn budget_html(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let budget = state
        .storage
        .get_budget(id)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("budget not found: {id}")))?;
    let patient = load_patient(&state, budget.budget.patient_id).await?;
    let doctor = state.storage.get_doctor(budget.budget.doctor_id).await?;
    Ok(Html(budget_document(&budget, &patient, doctor.as_ref())))
}

pub async fn prescription_html(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let prescription = state
        .storage
        .get_prescription(id)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("prescription not found: {id}")))?;
    let patient = load_patient(&state, prescription.prescription.patient_id).await?;
    let doctor = state
        .storage
        .get_doctor(prescription.prescription.doctor_id)
        .await?;
    Ok(Html(prescription_document(
        &prescription,
        &patient,
        doctor.as_ref(),
    )))
}

pub async fn session_ics(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let session = state
        .storage
        .get_session(id)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("treatment session not found: {id}")))?;
    let patient = load_patient(&state, session.patient_id).await?;
    let calendar = session_calendar(&session, &patient)?;
    Ok((
        [
            (header::CONTENT_TYPE, "text/calendar; charset=utf-8"),
            (
                header::CONTENT_DISPOSITION,
                "attachment; filename=\"appointment.ics\"",
            ),
        ],
        calendar,
    ))
}
