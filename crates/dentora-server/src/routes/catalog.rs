//! Catalog endpoints: services, locations, doctors.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::{Json, response::IntoResponse};
use serde::Deserialize;
use uuid::Uuid;

use dentora_storage::types::{NewDoctor, NewLocation, NewService, ServiceUpdate};

use crate::error::ApiError;
use crate::state::AppState;
use crate::validation::{require_non_negative, require_text, validate_email};

// ---- Services ----

#[derive(Debug, Deserialize)]
pub struct ServicePayload {
    pub name: String,
    #[serde(default)]
    pub category: Option<String>,
    pub price_cents: i64,
    #[serde(default)]
    pub duration_minutes: Option<u16>,
}

#[derive(Debug, Deserialize)]
pub struct ServiceUpdatePayload {
    pub name: String,
    #[serde(default)]
    pub category: Option<String>,
    pub price_cents: i64,
    #[serde(default)]
    pub duration_minutes: Option<u16>,
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

pub async fn list_services(
    State(state): State<AppState>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.storage.list_services().await?))
}

pub async fn create_service(
    State(state): State<AppState>,
    Json(payload): Json<ServicePayload>,
) -> Result<impl IntoResponse, ApiError> {
    let new = NewService {
        name: require_text("name", payload.name)?,
        category: payload.category,
        price_cents: require_non_negative("price_cents", payload.price_cents)?,
        duration_minutes: payload.duration_minutes,
    };
    let service = state.storage.create_service(new).await?;
    Ok((StatusCode::CREATED, Json(service)))
}

pub async fn get_service(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let service = state
        .storage
        .get_service(id)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("service not found: {id}")))?;
    Ok(Json(service))
}

pub async fn update_service(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<ServiceUpdatePayload>,
) -> Result<impl IntoResponse, ApiError> {
    let update = ServiceUpdate {
        name: require_text("name", payload.name)?,
        category: payload.category,
        price_cents: require_non_negative("price_cents", payload.price_cents)?,
        duration_minutes: payload.duration_minutes,
        active: payload.active,
    };
    let service = state.storage.update_service(id, update).await?;
    Ok(Json(service))
}

pub async fn delete_service(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    state.storage.delete_service(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ---- Locations ----

#[derive(Debug, Deserialize)]
pub struct LocationPayload {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

pub async fn list_locations(
    State(state): State<AppState>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.storage.list_locations().await?))
}

pub async fn create_location(
    State(state): State<AppState>,
    Json(payload): Json<LocationPayload>,
) -> Result<impl IntoResponse, ApiError> {
    let new = NewLocation {
        name: require_text("name", payload.name)?,
        description: payload.description,
    };
    let location = state.storage.create_location(new).await?;
    Ok((StatusCode::CREATED, Json(location)))
}

pub async fn get_location(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let location = state
        .storage
        .get_location(id)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("location not found: {id}")))?;
    Ok(Json(location))
}

pub async fn delete_location(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    state.storage.delete_location(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ---- Doctors ----

#[derive(Debug, Deserialize)]
pub struct DoctorPayload {
    pub full_name: String,
    #[serde(default)]
    pub email: Option<String>,
}

pub async fn list_doctors(
    State(state): State<AppState>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.storage.list_doctors().await?))
}

pub async fn create_doctor(
    State(state): State<AppState>,
    Json(payload): Json<DoctorPayload>,
) -> Result<impl IntoResponse, ApiError> {
    let new = NewDoctor {
        full_name: require_text("full_name", payload.full_name)?,
        email: validate_email("email", payload.email)?,
    };
    let doctor = state.storage.create_doctor(new).await?;
    Ok((StatusCode::CREATED, Json(doctor)))
}

pub async fn get_doctor(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let doctor = state
        .storage
        .get_doctor(id)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("doctor not found: {id}")))?;
    Ok(Json(doctor))
}
