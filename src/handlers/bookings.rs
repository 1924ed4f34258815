use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::Json;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::db::queries::{self, BookingFilter};
use crate::errors::AppError;
use crate::models::Booking;
use crate::services::lifecycle::{self, NewBookingRequest};
use crate::state::AppState;

#[derive(Serialize)]
pub struct BookingResponse {
    id: String,
    code: String,
    church_id: String,
    service_id: String,
    requester_id: String,
    scheduled_date: String,
    scheduled_time: Option<String>,
    status: String,
    payment_status: String,
    payment_method: Option<String>,
    payment_amount: Option<i64>,
    payment_transaction_id: Option<String>,
    payment_date: Option<String>,
    cancel_reason: Option<String>,
    created_at: String,
    updated_at: String,
}

fn booking_response(b: Booking) -> BookingResponse {
    BookingResponse {
        id: b.id,
        code: b.code,
        church_id: b.church_id,
        service_id: b.service_id,
        requester_id: b.requester_id,
        scheduled_date: b.scheduled_date.format("%Y-%m-%d").to_string(),
        scheduled_time: b.scheduled_time,
        status: b.status.as_str().to_string(),
        payment_status: b.payment_status.as_str().to_string(),
        payment_method: b.payment_method,
        payment_amount: b.payment_amount,
        payment_transaction_id: b.payment_transaction_id,
        payment_date: b
            .payment_date
            .map(|d| d.format("%Y-%m-%d %H:%M:%S").to_string()),
        cancel_reason: b.cancel_reason,
        created_at: b.created_at.format("%Y-%m-%d %H:%M:%S").to_string(),
        updated_at: b.updated_at.format("%Y-%m-%d %H:%M:%S").to_string(),
    }
}

// POST /api/bookings
#[derive(Deserialize)]
pub struct CreateBookingRequest {
    pub church_id: String,
    pub service_id: String,
    pub requester_id: String,
    pub date: String,
    pub time: Option<String>,
}

pub async fn create_booking(
    State(state): State<Arc<AppState>>,
    Json(body): Json<CreateBookingRequest>,
) -> Result<Json<BookingResponse>, AppError> {
    let date = NaiveDate::parse_from_str(&body.date, "%Y-%m-%d")
        .map_err(|_| AppError::Validation(format!("invalid date: {}", body.date)))?;

    let booking = lifecycle::create(
        &state,
        &NewBookingRequest {
            church_id: body.church_id,
            service_id: body.service_id,
            requester_id: body.requester_id,
            date,
            time: body.time,
        },
    )?;

    Ok(Json(booking_response(booking)))
}

// GET /api/bookings
#[derive(Deserialize)]
pub struct BookingsQuery {
    pub status: Option<String>,
    pub church_id: Option<String>,
    pub requester_id: Option<String>,
    pub limit: Option<i64>,
}

pub async fn list_bookings(
    State(state): State<Arc<AppState>>,
    Query(query): Query<BookingsQuery>,
) -> Result<Json<Vec<BookingResponse>>, AppError> {
    let bookings = {
        let db = state.db.lock().unwrap();
        queries::list_bookings(
            &db,
            &BookingFilter {
                status: query.status,
                church_id: query.church_id,
                requester_id: query.requester_id,
                limit: query.limit.unwrap_or(50),
            },
        )?
    };

    Ok(Json(bookings.into_iter().map(booking_response).collect()))
}

// GET /api/bookings/:id
pub async fn get_booking(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<BookingResponse>, AppError> {
    let booking = {
        let db = state.db.lock().unwrap();
        queries::get_booking_by_id(&db, &id)?
    }
    .ok_or_else(|| AppError::NotFound(format!("booking {id}")))?;

    Ok(Json(booking_response(booking)))
}

#[derive(Deserialize)]
pub struct ActorRequest {
    pub actor: String,
}

#[derive(Deserialize)]
pub struct ActorReasonRequest {
    pub actor: String,
    pub reason: String,
}

// POST /api/bookings/:id/review
pub async fn review_booking(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(body): Json<ActorRequest>,
) -> Result<Json<BookingResponse>, AppError> {
    Ok(Json(booking_response(lifecycle::review(
        &state, &id, &body.actor,
    )?)))
}

// POST /api/bookings/:id/approve
pub async fn approve_booking(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(body): Json<ActorRequest>,
) -> Result<Json<BookingResponse>, AppError> {
    Ok(Json(booking_response(lifecycle::approve(
        &state, &id, &body.actor,
    )?)))
}

// POST /api/bookings/:id/complete
pub async fn complete_booking(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(body): Json<ActorRequest>,
) -> Result<Json<BookingResponse>, AppError> {
    Ok(Json(booking_response(lifecycle::complete(
        &state, &id, &body.actor,
    )?)))
}

// POST /api/bookings/:id/decline
pub async fn decline_booking(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(body): Json<ActorReasonRequest>,
) -> Result<Json<BookingResponse>, AppError> {
    Ok(Json(booking_response(lifecycle::decline(
        &state,
        &id,
        &body.actor,
        &body.reason,
    )?)))
}

// POST /api/bookings/:id/cancel
pub async fn cancel_booking(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(body): Json<ActorReasonRequest>,
) -> Result<Json<BookingResponse>, AppError> {
    Ok(Json(booking_response(lifecycle::cancel(
        &state,
        &id,
        &body.actor,
        &body.reason,
    )?)))
}
