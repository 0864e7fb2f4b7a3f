//! Prescription endpoints.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::{Json, response::IntoResponse};
use serde::Deserialize;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use uuid::Uuid;

use dentora_storage::types::{NewPrescription, NewPrescriptionItem, Page};

use crate::error::ApiError;
use crate::state::AppState;
use crate::validation::require_text;

#[derive(Debug, Deserialize)]
pub struct PrescriptionItemPayload {
    pub drug: String,
    pub dosage: String,
    #[serde(default)]
    pub frequency: Option<String>,
    #[serde(default)]
    pub duration: Option<String>,
    #[serde(default)]
    pub instructions: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct PrescriptionPayload {
    pub patient_id: Uuid,
    pub doctor_id: Uuid,
    /// RFC 3339; defaults to now.
    #[serde(default)]
    pub issued_at: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub items: Vec<PrescriptionItemPayload>,
}

impl PrescriptionPayload {
    fn validate(self) -> Result<NewPrescription, ApiError> {
        if self.items.is_empty() {
            return Err(ApiError::invalid_field(
                "items",
                "a prescription needs at least one medication",
            ));
        }
        let issued_at = self
            .issued_at
            .as_deref()
            .map(|raw| {
                OffsetDateTime::parse(raw, &Rfc3339)
                    .map_err(|e| ApiError::invalid_field("issued_at", e))
            })
            .transpose()?;
        let items = self
            .items
            .into_iter()
            .enumerate()
            .map(|(index, item)| {
                Ok(NewPrescriptionItem {
                    drug: require_text(&format!("items[{index}].drug"), item.drug)?,
                    dosage: require_text(&format!("items[{index}].dosage"), item.dosage)?,
                    frequency: item.frequency,
                    duration: item.duration,
                    instructions: item.instructions,
                })
            })
            .collect::<Result<Vec<_>, ApiError>>()?;
        Ok(NewPrescription {
            patient_id: self.patient_id,
            doctor_id: self.doctor_id,
            issued_at,
            notes: self.notes,
            items,
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct PrescriptionListQuery {
    pub patient_id: Option<Uuid>,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

pub async fn list_prescriptions(
    State(state): State<AppState>,
    Query(query): Query<PrescriptionListQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let page = Page::new(query.page.unwrap_or(1), query.per_page.unwrap_or(25));
    let prescriptions = state
        .storage
        .list_prescriptions(query.patient_id, page)
        .await?;
    Ok(Json(prescriptions))
}

pub async fn create_prescription(
    State(state): State<AppState>,
    Json(payload): Json<PrescriptionPayload>,
) -> Result<impl IntoResponse, ApiError> {
    let prescription = state
        .storage
        .create_prescription(payload.validate()?)
        .await?;
    Ok((StatusCode::CREATED, Json(prescription)))
}

pub async fn get_prescription(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let prescription = state
        .storage
        .get_prescription(id)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("prescription not found: {id}")))?;
    Ok(Json(prescription))
}

pub async fn delete_prescription(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    state.storage.delete_prescription(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload() -> PrescriptionPayload {
        PrescriptionPayload {
            patient_id: Uuid::new_v4(),
            doctor_id: Uuid::new_v4(),
            issued_at: None,
            notes: None,
            items: vec![PrescriptionItemPayload {
                drug: "Amoxicillin 500mg".to_string(),
                dosage: "1 capsule".to_string(),
                frequency: Some("every 8 hours".to_string()),
                duration: None,
                instructions: None,
            }],
        }
    }

    #[test]
    fn test_requires_items() {
        let mut p = payload();
        p.items.clear();
        assert!(p.validate().is_err());
    }

    #[test]
    fn test_requires_drug_and_dosage() {
        let mut p = payload();
        p.items[0].drug = "  ".to_string();
        assert!(p.validate().is_err());
    }

    #[test]
    fn test_issued_at_parsing() {
        let mut p = payload();
        p.issued_at = Some("2026-02-20T10:00:00Z".to_string());
        assert!(p.validate().is_ok());

        let mut p = payload();
        p.issued_at = Some("yesterday".to_string());
        assert!(p.validate().is_err());
    }
}
