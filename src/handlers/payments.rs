use std::sync::Arc;

use axum::extract::{Path, State};
use axum::Json;
use serde::Deserialize;

use crate::errors::AppError;
use crate::services::reconciliation;
use crate::state::AppState;

// POST /api/bookings/:id/order
#[derive(Deserialize)]
pub struct CreateOrderRequest {
    pub amount_minor: i64,
    pub currency: String,
}

pub async fn create_order(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(body): Json<CreateOrderRequest>,
) -> Result<Json<serde_json::Value>, AppError> {
    let order =
        reconciliation::create_order(&state, &id, body.amount_minor, &body.currency).await?;

    Ok(Json(serde_json::json!({
        "order_id": order.order_id,
        "gateway": state.gateway.name(),
    })))
}

// POST /api/bookings/:id/capture
#[derive(Deserialize)]
pub struct ConfirmCaptureRequest {
    pub order_id: String,
}

pub async fn confirm_capture(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(body): Json<ConfirmCaptureRequest>,
) -> Result<Json<serde_json::Value>, AppError> {
    let outcome = reconciliation::confirm_capture(&state, &id, &body.order_id).await?;

    Ok(Json(serde_json::json!({
        "ok": true,
        "payment_status": outcome.booking.payment_status.as_str(),
        "canceled_competitors": outcome.canceled,
        "replay": outcome.replay,
    })))
}
