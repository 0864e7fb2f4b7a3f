//! Patient endpoints.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::{Json, response::IntoResponse};
use serde::Deserialize;
use uuid::Uuid;

use dentora_storage::types::{NewPatient, Page, PatientFilter, PatientUpdate};

use crate::error::ApiError;
use crate::state::AppState;
use crate::validation::{
    parse_optional_date, require_text, validate_birth_date, validate_email,
};

#[derive(Debug, Deserialize)]
pub struct PatientPayload {
    pub first_name: String,
    pub last_name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    /// `YYYY-MM-DD`.
    #[serde(default)]
    pub birth_date: Option<String>,
    #[serde(default)]
    pub doctor_id: Option<Uuid>,
    #[serde(default)]
    pub notes: Option<String>,
}

impl PatientPayload {
    fn validate(self) -> Result<NewPatient, ApiError> {
        let birth_date = parse_optional_date("birth_date", self.birth_date.as_ref())?;
        Ok(NewPatient {
            first_name: require_text("first_name", self.first_name)?,
            last_name: require_text("last_name", self.last_name)?,
            email: validate_email("email", self.email)?,
            phone: self.phone,
            birth_date: validate_birth_date("birth_date", birth_date)?,
            doctor_id: self.doctor_id,
            notes: self.notes,
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct PatientListQuery {
    /// Case-insensitive name search.
    pub q: Option<String>,
    pub doctor_id: Option<Uuid>,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

pub async fn list_patients(
    State(state): State<AppState>,
    Query(query): Query<PatientListQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let filter = PatientFilter {
        query: query.q.filter(|q| !q.trim().is_empty()),
        doctor_id: query.doctor_id,
    };
    let page = Page::new(query.page.unwrap_or(1), query.per_page.unwrap_or(25));
    let patients = state.storage.list_patients(filter, page).await?;
    Ok(Json(patients))
}

pub async fn create_patient(
    State(state): State<AppState>,
    Json(payload): Json<PatientPayload>,
) -> Result<impl IntoResponse, ApiError> {
    let patient = state.storage.create_patient(payload.validate()?).await?;
    Ok((StatusCode::CREATED, Json(patient)))
}

pub async fn get_patient(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let patient = state
        .storage
        .get_patient(id)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("patient not found: {id}")))?;
    Ok(Json(patient))
}

pub async fn update_patient(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<PatientPayload>,
) -> Result<impl IntoResponse, ApiError> {
    let new = payload.validate()?;
    let update = PatientUpdate {
        first_name: new.first_name,
        last_name: new.last_name,
        email: new.email,
        phone: new.phone,
        birth_date: new.birth_date,
        doctor_id: new.doctor_id,
        notes: new.notes,
    };
    let patient = state.storage.update_patient(id, update).await?;
    Ok(Json(patient))
}

pub async fn delete_patient(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    state.storage.delete_patient(id).await?;
    Ok(StatusCode::NO_CONTENT)
}
