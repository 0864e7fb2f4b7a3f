//! Reporting endpoints.

use axum::extract::{Query, State};
use axum::{Json, response::IntoResponse};
use serde::Deserialize;
use serde_json::json;

use crate::error::ApiError;
use crate::state::AppState;
use crate::validation::parse_date_field;

#[derive(Debug, Deserialize)]
pub struct RevenueQuery {
    /// `YYYY-MM-DD`, inclusive.
    pub from: String,
    pub to: String,
}

/// Monthly revenue buckets over completed sessions in the date range.
pub async fn revenue(
    State(state): State<AppState>,
    Query(query): Query<RevenueQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let from = parse_date_field("from", &query.from)?;
    let to = parse_date_field("to", &query.to)?;
    if from > to {
        return Err(ApiError::invalid_field("from", "must not be after to"));
    }
    let months = state.storage.revenue_by_month(from, to).await?;
    let total_cents: i64 = months.iter().map(|b| b.total_cents).sum();
    Ok(Json(json!({
        "from": from.to_string(),
        "to": to.to_string(),
        "total_cents": total_cents,
        "months": months,
    })))
}
