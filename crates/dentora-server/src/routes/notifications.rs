//! Notification queue endpoints: inspection, manual enqueue, cancellation.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::{Json, response::IntoResponse};
use serde::Deserialize;
use uuid::Uuid;

use dentora_notifications::{
    EnqueueNotification, Notification, NotificationChannel, NotificationStatus,
};
use dentora_storage::types::{Page, Paged};

use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct NotificationListQuery {
    pub status: Option<String>,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

pub async fn list_notifications(
    State(state): State<AppState>,
    Query(query): Query<NotificationListQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let status = query
        .status
        .as_deref()
        .map(str::parse::<NotificationStatus>)
        .transpose()?;
    let page = Page::new(query.page.unwrap_or(1), query.per_page.unwrap_or(25));
    let (items, total) = state.queue.list(status, page.limit(), page.offset()).await?;
    Ok(Json(Paged::new(items, total, page)))
}

pub async fn enqueue_notification(
    State(state): State<AppState>,
    Json(payload): Json<EnqueueNotification>,
) -> Result<impl IntoResponse, ApiError> {
    if payload.template_id.trim().is_empty() {
        return Err(ApiError::invalid_field("template_id", "must not be empty"));
    }
    // The webhook channel can fall back to the configured URL; email cannot.
    if payload.channel == NotificationChannel::Email && payload.recipient.email.is_none() {
        return Err(ApiError::invalid_field(
            "recipient.email",
            "is required for the email channel",
        ));
    }
    let notification = state
        .queue
        .enqueue(Notification::from_request(payload))
        .await?;
    Ok((StatusCode::CREATED, Json(notification)))
}

pub async fn cancel_notification(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let notification = state.queue.cancel(id).await?;
    Ok(Json(notification))
}

pub async fn notification_stats(
    State(state): State<AppState>,
) -> Result<impl IntoResponse, ApiError> {
    let stats = state.queue.stats().await?;
    Ok(Json(stats))
}
