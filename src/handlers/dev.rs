use std::sync::Arc;

use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;
use chrono::NaiveDate;
use serde::Deserialize;

use crate::db::queries;
use crate::errors::AppError;
use crate::models::{Church, ServiceOffering};
use crate::state::AppState;

fn check_auth(headers: &HeaderMap, expected_token: &str) -> Result<(), AppError> {
    let auth = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");

    let token = auth.strip_prefix("Bearer ").unwrap_or("");
    if token != expected_token {
        return Err(AppError::Authorization("invalid admin token".to_string()));
    }
    Ok(())
}

// POST /api/dev/seed: loads catalog rows for local development and tests.
// Church and service CRUD proper lives outside this service.
#[derive(Deserialize)]
pub struct SeedRequest {
    pub church: Church,
    #[serde(default)]
    pub services: Vec<ServiceOffering>,
    #[serde(default)]
    pub closures: Vec<String>,
}

pub async fn seed_catalog(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<SeedRequest>,
) -> Result<Json<serde_json::Value>, AppError> {
    check_auth(&headers, &state.config.admin_token)?;

    let db = state.db.lock().unwrap();
    queries::save_church(&db, &body.church)?;
    for service in &body.services {
        queries::save_service(&db, service)?;
    }
    for closure in &body.closures {
        let date = NaiveDate::parse_from_str(closure, "%Y-%m-%d")
            .map_err(|_| AppError::Validation(format!("invalid closure date: {closure}")))?;
        queries::add_closure(&db, &body.church.id, &date)?;
    }

    Ok(Json(serde_json::json!({
        "ok": true,
        "church": body.church.id,
        "services": body.services.len(),
        "closures": body.closures.len(),
    })))
}
