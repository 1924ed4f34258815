use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;

use crate::errors::AppError;
use crate::services::reconciliation::{self, WebhookOutcome};
use crate::state::AppState;

// POST /webhook/payment
//
// The gateway posts here asynchronously; deliveries can repeat and arrive in
// any order relative to the synchronous capture path. The raw body is needed
// for signature verification, so this handler takes Bytes rather than a
// typed extractor.
pub async fn payment_webhook(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<serde_json::Value>, AppError> {
    let signature = headers
        .get(state.gateway.signature_header())
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");

    let outcome = reconciliation::handle_webhook(&state, &body, signature).await?;

    let response = match outcome {
        WebhookOutcome::CaptureApplied(o) => serde_json::json!({
            "ok": true,
            "booking_id": o.booking.id,
            "payment_status": o.booking.payment_status.as_str(),
            "canceled_competitors": o.canceled,
            "replay": o.replay,
        }),
        WebhookOutcome::MarkedFailed { booking_id } => serde_json::json!({
            "ok": true,
            "booking_id": booking_id,
            "payment_status": "failed",
        }),
        WebhookOutcome::MarkedRefunded { booking_id } => serde_json::json!({
            "ok": true,
            "booking_id": booking_id,
            "payment_status": "refunded",
        }),
        WebhookOutcome::Ignored { booking_id } => serde_json::json!({
            "ok": true,
            "booking_id": booking_id,
            "ignored": true,
        }),
    };

    Ok(Json(response))
}
