use chrono::{Duration, NaiveDate, Utc};
use uuid::Uuid;

use crate::db::queries;
use crate::errors::AppError;
use crate::models::{Booking, BookingLifecycleEvent, BookingStatus, DomainEvent, PaymentStatus};
use crate::services::catalog;
use crate::state::AppState;

/// Actor id stamped on conflict cancellations driven by reconciliation.
pub const SYSTEM_ACTOR: &str = "system";

#[derive(Debug, Clone)]
pub struct NewBookingRequest {
    pub church_id: String,
    pub service_id: String,
    pub requester_id: String,
    pub date: NaiveDate,
    pub time: Option<String>,
}

enum Permission {
    ResourceOwner,
    RequesterOrOwner,
}

pub fn create(state: &AppState, req: &NewBookingRequest) -> Result<Booking, AppError> {
    let db = state.db.lock().unwrap();

    let church = queries::get_church(&db, &req.church_id)?
        .ok_or_else(|| AppError::NotFound(format!("church {}", req.church_id)))?;
    let quote = catalog::expected_price(&db, &req.church_id, &req.service_id)?
        .ok_or_else(|| AppError::NotFound(format!("service {}", req.service_id)))?;

    let today = Utc::now().date_naive();
    if req.date < today {
        return Err(AppError::Validation(
            "requested date is in the past".to_string(),
        ));
    }
    if req.date > today + Duration::days(church.advance_days) {
        return Err(AppError::Validation(format!(
            "requested date is more than {} days ahead",
            church.advance_days
        )));
    }
    if !catalog::is_date_open(&db, &req.church_id, &req.date)? {
        return Err(AppError::Validation(format!(
            "{} is closed on {}",
            church.name,
            req.date.format("%Y-%m-%d")
        )));
    }
    if let Some(time) = &req.time {
        if chrono::NaiveTime::parse_from_str(time, "%H:%M").is_err() {
            return Err(AppError::Validation(format!("invalid time: {time}")));
        }
    }

    let now = Utc::now().naive_utc();
    let booking = Booking {
        id: Uuid::new_v4().to_string(),
        code: queries::next_booking_code(&db)?,
        church_id: req.church_id.clone(),
        service_id: req.service_id.clone(),
        requester_id: req.requester_id.clone(),
        scheduled_date: req.date,
        scheduled_time: req.time.clone(),
        status: BookingStatus::Requested,
        payment_status: PaymentStatus::Pending,
        payment_method: None,
        payment_amount: quote.payment_required.then_some(quote.amount_minor),
        payment_order_id: None,
        payment_transaction_id: None,
        payment_date: None,
        cancel_reason: None,
        created_at: now,
        updated_at: now,
    };
    queries::create_booking(&db, &booking)?;

    tracing::info!(
        booking_id = %booking.id,
        code = %booking.code,
        church_id = %booking.church_id,
        date = %booking.scheduled_date,
        "booking created"
    );

    Ok(booking)
}

pub fn review(state: &AppState, id: &str, actor: &str) -> Result<Booking, AppError> {
    transition(state, id, actor, BookingStatus::Reviewed, None, Permission::ResourceOwner)
}

pub fn approve(state: &AppState, id: &str, actor: &str) -> Result<Booking, AppError> {
    transition(state, id, actor, BookingStatus::Approved, None, Permission::ResourceOwner)
}

pub fn complete(state: &AppState, id: &str, actor: &str) -> Result<Booking, AppError> {
    transition(state, id, actor, BookingStatus::Completed, None, Permission::ResourceOwner)
}

pub fn decline(state: &AppState, id: &str, actor: &str, reason: &str) -> Result<Booking, AppError> {
    require_reason(reason)?;
    transition(
        state,
        id,
        actor,
        BookingStatus::Declined,
        Some(reason.trim().to_string()),
        Permission::ResourceOwner,
    )
}

pub fn cancel(state: &AppState, id: &str, actor: &str, reason: &str) -> Result<Booking, AppError> {
    require_reason(reason)?;
    transition(
        state,
        id,
        actor,
        BookingStatus::Canceled,
        Some(reason.trim().to_string()),
        Permission::RequesterOrOwner,
    )
}

fn require_reason(reason: &str) -> Result<(), AppError> {
    if reason.trim().is_empty() {
        return Err(AppError::Validation("a reason is required".to_string()));
    }
    Ok(())
}

/// Guards, applies and commits one lifecycle transition, then emits the
/// corresponding event. Emission happens only after the row is written.
fn transition(
    state: &AppState,
    id: &str,
    actor: &str,
    target: BookingStatus,
    reason: Option<String>,
    permission: Permission,
) -> Result<Booking, AppError> {
    let (booking, event) = {
        let db = state.db.lock().unwrap();

        let booking = queries::get_booking_by_id(&db, id)?
            .ok_or_else(|| AppError::NotFound(format!("booking {id}")))?;

        let allowed = match permission {
            Permission::ResourceOwner => {
                catalog::is_resource_owner(&db, actor, &booking.church_id)?
            }
            Permission::RequesterOrOwner => {
                actor == booking.requester_id
                    || catalog::is_resource_owner(&db, actor, &booking.church_id)?
            }
        };
        if !allowed {
            return Err(AppError::Authorization(format!(
                "{actor} may not {} booking {}",
                target.as_str(),
                booking.code
            )));
        }

        if !booking.status.can_transition_to(target) {
            return Err(AppError::InvalidTransition {
                from: booking.status.as_str(),
                to: target.as_str(),
            });
        }

        queries::update_status(&db, id, target, reason.as_deref())?;

        let event = BookingLifecycleEvent {
            booking_id: booking.id.clone(),
            code: booking.code.clone(),
            from_status: booking.status.as_str(),
            to_status: target.as_str(),
            actor: actor.to_string(),
            reason: reason.clone(),
        };

        let mut updated = booking;
        updated.status = target;
        if reason.is_some() {
            updated.cancel_reason = reason;
        }
        (updated, event)
    };

    tracing::info!(
        booking_id = %booking.id,
        from = event.from_status,
        to = event.to_status,
        actor = %actor,
        "booking transition"
    );
    let _ = state.events_tx.send(DomainEvent::BookingLifecycle(event));

    Ok(booking)
}
