//! Budget endpoints, including the lifecycle transitions.

use std::collections::HashMap;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::{Json, response::IntoResponse};
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use dentora_core::BudgetStatus;
use dentora_notifications::{
    EnqueueNotification, Notification, NotificationChannel, NotificationRecipient,
};
use dentora_storage::types::{
    BudgetFilter, BudgetUpdate, BudgetWithItems, NewBudget, NewBudgetItem, Page,
};

use crate::error::ApiError;
use crate::state::AppState;
use crate::validation::{require_non_negative, require_text};

#[derive(Debug, Deserialize)]
pub struct BudgetItemPayload {
    #[serde(default)]
    pub service_id: Option<Uuid>,
    pub description: String,
    pub quantity: u32,
    pub unit_price_cents: i64,
}

impl BudgetItemPayload {
    fn validate(self, index: usize) -> Result<NewBudgetItem, ApiError> {
        if self.quantity == 0 {
            return Err(ApiError::invalid_field(
                &format!("items[{index}].quantity"),
                "must be at least 1",
            ));
        }
        Ok(NewBudgetItem {
            service_id: self.service_id,
            description: require_text(&format!("items[{index}].description"), self.description)?,
            quantity: self.quantity,
            unit_price_cents: require_non_negative(
                &format!("items[{index}].unit_price_cents"),
                self.unit_price_cents,
            )?,
        })
    }
}

fn validate_items(items: Vec<BudgetItemPayload>) -> Result<Vec<NewBudgetItem>, ApiError> {
    items
        .into_iter()
        .enumerate()
        .map(|(index, item)| item.validate(index))
        .collect()
}

#[derive(Debug, Deserialize)]
pub struct BudgetPayload {
    pub patient_id: Uuid,
    pub doctor_id: Uuid,
    pub title: String,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub items: Vec<BudgetItemPayload>,
}

#[derive(Debug, Deserialize)]
pub struct BudgetUpdatePayload {
    pub title: String,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub items: Vec<BudgetItemPayload>,
}

#[derive(Debug, Deserialize)]
pub struct BudgetListQuery {
    pub patient_id: Option<Uuid>,
    pub status: Option<String>,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

pub async fn list_budgets(
    State(state): State<AppState>,
    Query(query): Query<BudgetListQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let status = query
        .status
        .as_deref()
        .map(str::parse::<BudgetStatus>)
        .transpose()?;
    let filter = BudgetFilter {
        patient_id: query.patient_id,
        status,
    };
    let page = Page::new(query.page.unwrap_or(1), query.per_page.unwrap_or(25));
    let budgets = state.storage.list_budgets(filter, page).await?;
    Ok(Json(budgets))
}

pub async fn create_budget(
    State(state): State<AppState>,
    Json(payload): Json<BudgetPayload>,
) -> Result<impl IntoResponse, ApiError> {
    let new = NewBudget {
        patient_id: payload.patient_id,
        doctor_id: payload.doctor_id,
        title: require_text("title", payload.title)?,
        notes: payload.notes,
        items: validate_items(payload.items)?,
    };
    let budget = state.storage.create_budget(new).await?;
    Ok((StatusCode::CREATED, Json(budget)))
}

pub async fn get_budget(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let budget = state
        .storage
        .get_budget(id)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("budget not found: {id}")))?;
    Ok(Json(budget))
}

pub async fn update_budget(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<BudgetUpdatePayload>,
) -> Result<impl IntoResponse, ApiError> {
    let update = BudgetUpdate {
        title: require_text("title", payload.title)?,
        notes: payload.notes,
        items: validate_items(payload.items)?,
    };
    let budget = state.storage.update_budget(id, update).await?;
    Ok(Json(budget))
}

pub async fn delete_budget(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    state.storage.delete_budget(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn activate_budget(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let budget = state.storage.activate_budget(id).await?;
    queue_budget_event(&state, "budget_activated", &budget).await;
    Ok(Json(budget))
}

pub async fn complete_budget(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let budget = state.storage.complete_budget(id).await?;
    queue_budget_event(&state, "budget_completed", &budget).await;
    Ok(Json(budget))
}

pub async fn revert_budget(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let budget = state.storage.revert_budget(id).await?;
    Ok(Json(budget))
}

/// Queues a budget lifecycle e-mail when the patient has an address.
/// Best-effort: a queue failure never fails the transition that caused it.
async fn queue_budget_event(state: &AppState, template_id: &str, budget: &BudgetWithItems) {
    let patient = match state.storage.get_patient(budget.budget.patient_id).await {
        Ok(Some(patient)) => patient,
        Ok(None) => return,
        Err(e) => {
            tracing::warn!(error = %e, "could not load patient for budget notification");
            return;
        }
    };
    let Some(email) = patient.email.clone() else {
        return;
    };

    let template_data: HashMap<String, serde_json::Value> = HashMap::from([
        ("patient_name".to_string(), json!(patient.full_name())),
        ("budget_title".to_string(), json!(budget.budget.title)),
        (
            "total".to_string(),
            json!(dentora_docs::format_money(budget.budget.total_cents)),
        ),
        ("clinic_name".to_string(), json!(state.clinic_name)),
    ]);
    let notification = Notification::from_request(EnqueueNotification {
        channel: NotificationChannel::Email,
        recipient: NotificationRecipient {
            patient_id: Some(patient.id),
            email: Some(email),
            webhook_url: None,
        },
        template_id: template_id.to_string(),
        template_data,
        dedup_key: None,
        scheduled_at: None,
    });
    if let Err(e) = state.queue.enqueue(notification).await {
        tracing::warn!(error = %e, template_id, "could not queue budget notification");
    }
}
