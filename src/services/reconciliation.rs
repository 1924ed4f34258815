use chrono::Utc;
use rusqlite::TransactionBehavior;

use crate::db::queries;
use crate::errors::AppError;
use crate::models::{
    Booking, BookingLifecycleEvent, CreatedOrder, DomainEvent, GatewayCapture, OrderRequest,
    PaymentConfirmedEvent, PaymentStatus, WebhookKind,
};
use crate::services::{catalog, conflict, lifecycle};
use crate::state::AppState;

/// Captured amount must equal the configured price exactly; any discrepancy
/// in real money movement goes to manual review.
pub const CAPTURE_AMOUNT_TOLERANCE_MINOR: i64 = 0;

#[derive(Debug)]
pub struct ReconciliationOutcome {
    pub booking: Booking,
    pub canceled: usize,
    pub replay: bool,
}

#[derive(Debug)]
pub enum WebhookOutcome {
    CaptureApplied(ReconciliationOutcome),
    MarkedFailed { booking_id: String },
    MarkedRefunded { booking_id: String },
    Ignored { booking_id: String },
}

/// Creates a gateway order for a booking. The gateway call runs with no
/// database lock held; the returned order id is recorded on the booking
/// afterwards so webhooks can find their way back.
pub async fn create_order(
    state: &AppState,
    booking_id: &str,
    amount_minor: i64,
    currency: &str,
) -> Result<CreatedOrder, AppError> {
    let (booking, quote) = {
        let db = state.db.lock().unwrap();
        let booking = queries::get_booking_by_id(&db, booking_id)?
            .ok_or_else(|| AppError::NotFound(format!("booking {booking_id}")))?;

        if !booking.status.is_active() {
            return Err(AppError::Validation(format!(
                "booking {} is no longer active",
                booking.code
            )));
        }
        if booking.payment_status == PaymentStatus::Paid {
            return Err(AppError::Validation(format!(
                "booking {} is already paid",
                booking.code
            )));
        }

        let quote = catalog::expected_price(&db, &booking.church_id, &booking.service_id)?
            .ok_or_else(|| {
                AppError::Validation("no price configured for this service".to_string())
            })?;
        (booking, quote)
    };

    if amount_minor != quote.amount_minor {
        return Err(AppError::Validation(format!(
            "amount {amount_minor} does not match the configured price {}",
            quote.amount_minor
        )));
    }
    if currency != quote.currency {
        return Err(AppError::Validation(format!(
            "currency {currency} does not match the configured currency {}",
            quote.currency
        )));
    }
    let payee_reference = quote.payee_reference.ok_or_else(|| {
        AppError::Validation("church has no payable destination configured".to_string())
    })?;

    let req = OrderRequest {
        amount_minor,
        currency: currency.to_string(),
        payee_reference,
        description: format!("{} on {}", booking.code, booking.scheduled_date.format("%Y-%m-%d")),
    };
    let order = state
        .gateway
        .create_order(&req)
        .await
        .map_err(|e| AppError::Gateway(e.to_string()))?;

    {
        let db = state.db.lock().unwrap();
        queries::set_payment_order(&db, booking_id, &order.order_id, state.gateway.name())?;
    }

    tracing::info!(
        booking_id = %booking_id,
        order_id = %order.order_id,
        gateway = state.gateway.name(),
        "payment order created"
    );

    Ok(order)
}

/// Synchronous confirmation path, invoked after the payer completes
/// authorization. A gateway timeout here is an unknown outcome: nothing is
/// written and the webhook path resolves the payment later.
pub async fn confirm_capture(
    state: &AppState,
    booking_id: &str,
    order_id: &str,
) -> Result<ReconciliationOutcome, AppError> {
    {
        let db = state.db.lock().unwrap();
        let booking = queries::get_booking_by_id(&db, booking_id)?
            .ok_or_else(|| AppError::NotFound(format!("booking {booking_id}")))?;

        match booking.payment_order_id.as_deref() {
            Some(stored) if stored == order_id => {}
            Some(_) => {
                return Err(AppError::Validation(format!(
                    "order {order_id} does not belong to booking {}",
                    booking.code
                )))
            }
            None => {
                return Err(AppError::Validation(format!(
                    "no payment order recorded for booking {}",
                    booking.code
                )))
            }
        }
    }

    let capture = state
        .gateway
        .fetch_capture(order_id)
        .await
        .map_err(|e| AppError::Gateway(e.to_string()))?;

    if !capture.captured {
        let db = state.db.lock().unwrap();
        queries::set_payment_status(&db, booking_id, PaymentStatus::Failed)?;
        tracing::warn!(
            booking_id = %booking_id,
            order_id = %order_id,
            "capture was not completed, payment marked failed"
        );
        return Err(AppError::Gateway(
            "capture was not completed at the gateway".to_string(),
        ));
    }

    apply_capture(state, booking_id, &capture)
}

/// Asynchronous webhook path. Verifies authenticity before trusting a single
/// byte of the payload, then applies the same atomic commit as the
/// synchronous path for successful captures, or a status-only update for
/// failures and refunds.
pub async fn handle_webhook(
    state: &AppState,
    body: &[u8],
    signature: &str,
) -> Result<WebhookOutcome, AppError> {
    if !state.gateway.verify_webhook(body, signature) {
        tracing::warn!(gateway = state.gateway.name(), "invalid webhook signature");
        return Err(AppError::Authorization(
            "invalid webhook signature".to_string(),
        ));
    }

    let event = state
        .gateway
        .parse_webhook(body)
        .map_err(|e| AppError::Validation(e.to_string()))?;

    match event.kind {
        WebhookKind::CaptureSucceeded => {
            let transaction_id = event.transaction_id.ok_or_else(|| {
                AppError::Validation("webhook is missing a transaction id".to_string())
            })?;
            let amount_minor = event
                .amount_minor
                .ok_or_else(|| AppError::Validation("webhook is missing an amount".to_string()))?;

            let booking_id = {
                let db = state.db.lock().unwrap();
                // Replays arrive with a transaction id we already know.
                if let Some(existing) =
                    queries::get_booking_by_transaction_id(&db, &transaction_id)?
                {
                    existing.id
                } else {
                    let order_id = event.order_id.ok_or_else(|| {
                        AppError::Validation("webhook is missing an order id".to_string())
                    })?;
                    queries::get_booking_by_order_id(&db, &order_id)?
                        .ok_or_else(|| {
                            AppError::NotFound(format!("no booking for order {order_id}"))
                        })?
                        .id
                }
            };

            let capture = GatewayCapture {
                transaction_id,
                payer_reference: None,
                amount_minor,
                captured: true,
            };
            Ok(WebhookOutcome::CaptureApplied(apply_capture(
                state,
                &booking_id,
                &capture,
            )?))
        }
        WebhookKind::CaptureFailed => {
            let booking = find_webhook_booking(state, &event.order_id, &event.transaction_id)?;

            // Deliveries can arrive out of order: a stale failed-attempt
            // webhook after the capture already succeeded must not downgrade
            // a paid booking.
            if booking.payment_status == PaymentStatus::Paid {
                tracing::info!(
                    booking_id = %booking.id,
                    "ignoring failed-capture webhook for an already paid booking"
                );
                return Ok(WebhookOutcome::Ignored {
                    booking_id: booking.id,
                });
            }

            {
                let db = state.db.lock().unwrap();
                queries::set_payment_status(&db, &booking.id, PaymentStatus::Failed)?;
            }
            tracing::warn!(booking_id = %booking.id, "gateway reported failed capture");
            Ok(WebhookOutcome::MarkedFailed {
                booking_id: booking.id,
            })
        }
        WebhookKind::Refunded => {
            let booking = find_webhook_booking(state, &event.order_id, &event.transaction_id)?;

            // Only collected money can be refunded.
            if booking.payment_status != PaymentStatus::Paid {
                tracing::warn!(
                    booking_id = %booking.id,
                    payment_status = booking.payment_status.as_str(),
                    "ignoring refund webhook for a booking that was never paid"
                );
                return Ok(WebhookOutcome::Ignored {
                    booking_id: booking.id,
                });
            }

            {
                let db = state.db.lock().unwrap();
                queries::set_payment_status(&db, &booking.id, PaymentStatus::Refunded)?;
            }
            tracing::info!(booking_id = %booking.id, "payment refunded");
            Ok(WebhookOutcome::MarkedRefunded {
                booking_id: booking.id,
            })
        }
    }
}

fn find_webhook_booking(
    state: &AppState,
    order_id: &Option<String>,
    transaction_id: &Option<String>,
) -> Result<Booking, AppError> {
    let db = state.db.lock().unwrap();

    if let Some(txn) = transaction_id {
        if let Some(booking) = queries::get_booking_by_transaction_id(&db, txn)? {
            return Ok(booking);
        }
    }
    if let Some(order) = order_id {
        if let Some(booking) = queries::get_booking_by_order_id(&db, order)? {
            return Ok(booking);
        }
    }
    Err(AppError::NotFound(
        "no booking matches this webhook".to_string(),
    ))
}

/// The atomic commit shared by both confirmation paths, keyed by the external
/// transaction id.
///
/// Replay of an already-recorded capture is a no-op success. Otherwise one
/// IMMEDIATE transaction records the payment fields, snapshots the competing
/// bookings for the (church, date) slot, and applies every cancellation the
/// resolver returns. A directive that fails to apply aborts the whole
/// transaction, payment fields included.
fn apply_capture(
    state: &AppState,
    booking_id: &str,
    capture: &GatewayCapture,
) -> Result<ReconciliationOutcome, AppError> {
    let mut db = state.db.lock().unwrap();

    if let Some(existing) = queries::get_booking_by_transaction_id(&db, &capture.transaction_id)? {
        if existing.payment_status == PaymentStatus::Paid {
            tracing::info!(
                booking_id = %existing.id,
                transaction_id = %capture.transaction_id,
                "capture replay, nothing to do"
            );
            return Ok(ReconciliationOutcome {
                booking: existing,
                canceled: 0,
                replay: true,
            });
        }
        tracing::error!(
            booking_id = %existing.id,
            transaction_id = %capture.transaction_id,
            payment_status = existing.payment_status.as_str(),
            "transaction id recorded without paid status"
        );
        return Err(AppError::Anomaly(format!(
            "transaction {} is recorded on booking {} with status {}",
            capture.transaction_id,
            existing.code,
            existing.payment_status.as_str()
        )));
    }

    let booking = queries::get_booking_by_id(&db, booking_id)?
        .ok_or_else(|| AppError::NotFound(format!("booking {booking_id}")))?;

    if booking.payment_status == PaymentStatus::Paid {
        tracing::error!(
            booking_id = %booking.id,
            transaction_id = %capture.transaction_id,
            "booking already paid under a different transaction id"
        );
        return Err(AppError::Anomaly(format!(
            "booking {} is already paid under a different transaction id",
            booking.code
        )));
    }

    let expected = booking.payment_amount.ok_or_else(|| {
        AppError::Validation(format!("booking {} has no payable amount", booking.code))
    })?;
    if (capture.amount_minor - expected).abs() > CAPTURE_AMOUNT_TOLERANCE_MINOR {
        tracing::error!(
            booking_id = %booking.id,
            expected,
            captured = capture.amount_minor,
            "captured amount does not match expected price"
        );
        return Err(AppError::Anomaly(format!(
            "captured amount {} does not match expected {} for booking {}",
            capture.amount_minor, expected, booking.code
        )));
    }

    let church = queries::get_church(&db, &booking.church_id)?
        .ok_or_else(|| AppError::NotFound(format!("church {}", booking.church_id)))?;

    let paid_at = Utc::now().naive_utc();
    let method = state.gateway.name();

    let tx = db.transaction_with_behavior(TransactionBehavior::Immediate)?;

    queries::record_payment(
        &tx,
        &booking.id,
        method,
        capture.amount_minor,
        &capture.transaction_id,
        &paid_at,
    )?;

    let competitors =
        queries::get_competing_bookings(&tx, &booking.church_id, &booking.scheduled_date, &booking.id)?;
    let directives = conflict::resolve_conflicts(&booking, &church.name, &competitors);

    let mut cancellation_events = Vec::with_capacity(directives.len());
    for directive in &directives {
        if !queries::cancel_competitor(&tx, &directive.booking_id, &directive.reason)? {
            // Dropping the transaction rolls back the payment fields too.
            tracing::error!(
                booking_id = %booking.id,
                competitor = %directive.booking_id,
                "cancellation directive did not apply"
            );
            return Err(AppError::ConflictResolution(format!(
                "could not cancel competing booking {}",
                directive.booking_id
            )));
        }
        if let Some(prior) = competitors.iter().find(|c| c.id == directive.booking_id) {
            cancellation_events.push(BookingLifecycleEvent {
                booking_id: prior.id.clone(),
                code: prior.code.clone(),
                from_status: prior.status.as_str(),
                to_status: "canceled",
                actor: lifecycle::SYSTEM_ACTOR.to_string(),
                reason: Some(directive.reason.clone()),
            });
        }
    }

    tx.commit()?;
    drop(db);

    tracing::info!(
        booking_id = %booking.id,
        transaction_id = %capture.transaction_id,
        amount = capture.amount_minor,
        canceled_competitors = directives.len(),
        "payment reconciled"
    );

    let _ = state
        .events_tx
        .send(DomainEvent::PaymentConfirmed(PaymentConfirmedEvent {
            booking_id: booking.id.clone(),
            code: booking.code.clone(),
            amount_minor: capture.amount_minor,
            transaction_id: capture.transaction_id.clone(),
        }));
    for event in cancellation_events {
        let _ = state.events_tx.send(DomainEvent::BookingLifecycle(event));
    }

    let mut paid = booking;
    paid.payment_status = PaymentStatus::Paid;
    paid.payment_method = Some(method.to_string());
    paid.payment_amount = Some(capture.amount_minor);
    paid.payment_transaction_id = Some(capture.transaction_id.clone());
    paid.payment_date = Some(paid_at);

    Ok(ReconciliationOutcome {
        booking: paid,
        canceled: directives.len(),
        replay: false,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::db;
    use crate::models::{BookingStatus, Church, ServiceOffering};
    use crate::services::gateway::sandbox::SandboxGateway;
    use crate::services::lifecycle::NewBookingRequest;
    use chrono::Duration;
    use std::sync::{Arc, Mutex};
    use tokio::sync::broadcast;

    fn test_state() -> AppState {
        let conn = db::init_db(":memory:").unwrap();
        queries::save_church(
            &conn,
            &Church {
                id: "ch-1".to_string(),
                name: "St. Mary".to_string(),
                owner_id: "owner-1".to_string(),
                payee_reference: Some("acct_1".to_string()),
                currency: "USD".to_string(),
                advance_days: 90,
            },
        )
        .unwrap();
        queries::save_service(
            &conn,
            &ServiceOffering {
                id: "svc-1".to_string(),
                church_id: "ch-1".to_string(),
                name: "Wedding".to_string(),
                price_minor: 25000,
                payment_required: true,
            },
        )
        .unwrap();

        let (events_tx, _) = broadcast::channel(64);
        AppState {
            db: Arc::new(Mutex::new(conn)),
            config: AppConfig {
                port: 0,
                database_url: ":memory:".to_string(),
                admin_token: "test-token".to_string(),
                gateway_provider: "sandbox".to_string(),
                razorpay_key_id: String::new(),
                razorpay_key_secret: String::new(),
                webhook_secret: String::new(),
                gateway_timeout_secs: 5,
            },
            gateway: Box::new(SandboxGateway::new(String::new())),
            events_tx,
        }
    }

    fn make_booking(state: &AppState, requester: &str) -> crate::models::Booking {
        lifecycle::create(
            state,
            &NewBookingRequest {
                church_id: "ch-1".to_string(),
                service_id: "svc-1".to_string(),
                requester_id: requester.to_string(),
                date: Utc::now().date_naive() + Duration::days(14),
                time: None,
            },
        )
        .unwrap()
    }

    fn reload(state: &AppState, id: &str) -> crate::models::Booking {
        let db = state.db.lock().unwrap();
        queries::get_booking_by_id(&db, id).unwrap().unwrap()
    }

    #[tokio::test]
    async fn test_create_order_records_order_id() {
        let state = test_state();
        let booking = make_booking(&state, "user-1");

        let order = create_order(&state, &booking.id, 25000, "USD").await.unwrap();
        let reloaded = reload(&state, &booking.id);
        assert_eq!(reloaded.payment_order_id.as_deref(), Some(order.order_id.as_str()));
        assert_eq!(reloaded.payment_method.as_deref(), Some("sandbox"));
    }

    #[tokio::test]
    async fn test_create_order_rejects_wrong_amount() {
        let state = test_state();
        let booking = make_booking(&state, "user-1");

        let err = create_order(&state, &booking.id, 100, "USD").await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn test_create_order_rejects_missing_payee() {
        let state = test_state();
        {
            let db = state.db.lock().unwrap();
            queries::save_church(
                &db,
                &Church {
                    id: "ch-1".to_string(),
                    name: "St. Mary".to_string(),
                    owner_id: "owner-1".to_string(),
                    payee_reference: None,
                    currency: "USD".to_string(),
                    advance_days: 90,
                },
            )
            .unwrap();
        }
        let booking = make_booking(&state, "user-1");
        let err = create_order(&state, &booking.id, 25000, "USD").await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn test_capture_pays_without_advancing_lifecycle() {
        let state = test_state();
        let booking = make_booking(&state, "user-1");
        let order = create_order(&state, &booking.id, 25000, "USD").await.unwrap();

        let outcome = confirm_capture(&state, &booking.id, &order.order_id)
            .await
            .unwrap();
        assert!(!outcome.replay);

        let reloaded = reload(&state, &booking.id);
        // Payment never advances the lifecycle: the owner still has to review.
        assert_eq!(reloaded.status, BookingStatus::Requested);
        assert_eq!(reloaded.payment_status, PaymentStatus::Paid);
        assert!(reloaded.payment_transaction_id.is_some());
        assert!(reloaded.payment_date.is_some());
    }

    #[tokio::test]
    async fn test_capture_cancels_pending_competitor() {
        let state = test_state();
        let winner = make_booking(&state, "user-1");
        let loser = make_booking(&state, "user-2");
        let order = create_order(&state, &winner.id, 25000, "USD").await.unwrap();

        let outcome = confirm_capture(&state, &winner.id, &order.order_id)
            .await
            .unwrap();
        assert_eq!(outcome.canceled, 1);

        let loser = reload(&state, &loser.id);
        assert_eq!(loser.status, BookingStatus::Canceled);
        let reason = loser.cancel_reason.unwrap();
        assert!(reason.contains("St. Mary"));
        assert!(reason.contains(&winner.scheduled_date.format("%Y-%m-%d").to_string()));
    }

    #[tokio::test]
    async fn test_three_way_conflict_emits_two_cancellations() {
        let state = test_state();
        let a = make_booking(&state, "user-a");
        let b = make_booking(&state, "user-b");
        let c = make_booking(&state, "user-c");
        let order = create_order(&state, &a.id, 25000, "USD").await.unwrap();

        let mut rx = state.events_tx.subscribe();
        let outcome = confirm_capture(&state, &a.id, &order.order_id).await.unwrap();
        assert_eq!(outcome.canceled, 2);

        assert_eq!(reload(&state, &a.id).status, BookingStatus::Requested);
        assert_eq!(reload(&state, &b.id).status, BookingStatus::Canceled);
        assert_eq!(reload(&state, &c.id).status, BookingStatus::Canceled);

        // One confirmation, exactly two cancellation events.
        let mut confirmations = 0;
        let mut cancellations = 0;
        while let Ok(event) = rx.try_recv() {
            match event {
                DomainEvent::PaymentConfirmed(_) => confirmations += 1,
                DomainEvent::BookingLifecycle(e) if e.to_status == "canceled" => {
                    cancellations += 1
                }
                DomainEvent::BookingLifecycle(_) => {}
            }
        }
        assert_eq!(confirmations, 1);
        assert_eq!(cancellations, 2);
    }

    #[tokio::test]
    async fn test_confirm_capture_is_idempotent() {
        let state = test_state();
        let winner = make_booking(&state, "user-1");
        let _loser = make_booking(&state, "user-2");
        let order = create_order(&state, &winner.id, 25000, "USD").await.unwrap();

        let first = confirm_capture(&state, &winner.id, &order.order_id).await.unwrap();
        assert!(!first.replay);
        assert_eq!(first.canceled, 1);

        let mut rx = state.events_tx.subscribe();
        let second = confirm_capture(&state, &winner.id, &order.order_id).await.unwrap();
        assert!(second.replay);
        assert_eq!(second.canceled, 0);
        // Replay emits nothing.
        assert!(rx.try_recv().is_err());

        assert_eq!(
            reload(&state, &winner.id).payment_transaction_id,
            first.booking.payment_transaction_id
        );
    }

    #[tokio::test]
    async fn test_webhook_capture_matches_confirm_path() {
        let state = test_state();
        let winner = make_booking(&state, "user-1");
        let loser = make_booking(&state, "user-2");
        let order = create_order(&state, &winner.id, 25000, "USD").await.unwrap();

        let body = serde_json::json!({
            "event_type": "capture_succeeded",
            "order_id": order.order_id,
            "transaction_id": "pay_webhook",
            "amount_minor": 25000,
        })
        .to_string();

        let outcome = handle_webhook(&state, body.as_bytes(), "").await.unwrap();
        match outcome {
            WebhookOutcome::CaptureApplied(o) => assert_eq!(o.canceled, 1),
            other => panic!("unexpected outcome: {other:?}"),
        }

        assert_eq!(reload(&state, &winner.id).payment_status, PaymentStatus::Paid);
        assert_eq!(reload(&state, &winner.id).status, BookingStatus::Requested);
        assert_eq!(reload(&state, &loser.id).status, BookingStatus::Canceled);
    }

    #[tokio::test]
    async fn test_replayed_webhook_is_a_noop() {
        let state = test_state();
        let winner = make_booking(&state, "user-1");
        let order = create_order(&state, &winner.id, 25000, "USD").await.unwrap();

        let body = serde_json::json!({
            "event_type": "capture_succeeded",
            "order_id": order.order_id,
            "transaction_id": "pay_webhook",
            "amount_minor": 25000,
        })
        .to_string();

        handle_webhook(&state, body.as_bytes(), "").await.unwrap();
        let outcome = handle_webhook(&state, body.as_bytes(), "").await.unwrap();
        match outcome {
            WebhookOutcome::CaptureApplied(o) => {
                assert!(o.replay);
                assert_eq!(o.canceled, 0);
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_webhook_rejects_bad_signature() {
        let mut state = test_state();
        state.gateway = Box::new(SandboxGateway::new("whsec".to_string()));

        let err = handle_webhook(&state, b"{}", "not-a-signature").await.unwrap_err();
        assert!(matches!(err, AppError::Authorization(_)));
    }

    #[tokio::test]
    async fn test_failed_capture_touches_no_competitor() {
        let state = test_state();
        let a = make_booking(&state, "user-1");
        let b = make_booking(&state, "user-2");
        let order = create_order(&state, &a.id, 25000, "USD").await.unwrap();

        let body = serde_json::json!({
            "event_type": "capture_failed",
            "order_id": order.order_id,
            "transaction_id": "pay_failed",
            "amount_minor": 25000,
        })
        .to_string();

        let outcome = handle_webhook(&state, body.as_bytes(), "").await.unwrap();
        assert!(matches!(outcome, WebhookOutcome::MarkedFailed { .. }));

        let a = reload(&state, &a.id);
        assert_eq!(a.status, BookingStatus::Requested);
        assert_eq!(a.payment_status, PaymentStatus::Failed);
        assert_eq!(reload(&state, &b.id).status, BookingStatus::Requested);
    }

    #[tokio::test]
    async fn test_stale_failed_webhook_never_downgrades_paid() {
        let state = test_state();
        let winner = make_booking(&state, "user-1");
        let loser = make_booking(&state, "user-2");
        let order = create_order(&state, &winner.id, 25000, "USD").await.unwrap();
        confirm_capture(&state, &winner.id, &order.order_id).await.unwrap();

        // A failed attempt preceding the successful capture can be delivered
        // late, with its own transaction id but the same order id.
        let body = serde_json::json!({
            "event_type": "capture_failed",
            "order_id": order.order_id,
            "transaction_id": "pay_stale_attempt",
            "amount_minor": 25000,
        })
        .to_string();

        let outcome = handle_webhook(&state, body.as_bytes(), "").await.unwrap();
        assert!(matches!(outcome, WebhookOutcome::Ignored { .. }));

        let reloaded = reload(&state, &winner.id);
        assert_eq!(reloaded.payment_status, PaymentStatus::Paid);
        assert_eq!(reloaded.status, BookingStatus::Requested);
        assert_eq!(reload(&state, &loser.id).status, BookingStatus::Canceled);
    }

    #[tokio::test]
    async fn test_refund_webhook_for_unpaid_booking_is_ignored() {
        let state = test_state();
        let booking = make_booking(&state, "user-1");
        let order = create_order(&state, &booking.id, 25000, "USD").await.unwrap();

        let body = serde_json::json!({
            "event_type": "refunded",
            "order_id": order.order_id,
        })
        .to_string();

        let outcome = handle_webhook(&state, body.as_bytes(), "").await.unwrap();
        assert!(matches!(outcome, WebhookOutcome::Ignored { .. }));
        assert_eq!(reload(&state, &booking.id).payment_status, PaymentStatus::Pending);
    }

    #[tokio::test]
    async fn test_amount_mismatch_is_an_anomaly() {
        let state = test_state();
        let booking = make_booking(&state, "user-1");
        let order = create_order(&state, &booking.id, 25000, "USD").await.unwrap();

        let body = serde_json::json!({
            "event_type": "capture_succeeded",
            "order_id": order.order_id,
            "transaction_id": "pay_short",
            "amount_minor": 24000,
        })
        .to_string();

        let err = handle_webhook(&state, body.as_bytes(), "").await.unwrap_err();
        assert!(matches!(err, AppError::Anomaly(_)));

        let reloaded = reload(&state, &booking.id);
        assert_eq!(reloaded.payment_status, PaymentStatus::Pending);
        assert!(reloaded.payment_transaction_id.is_none());
    }

    #[tokio::test]
    async fn test_paid_booking_survives_owner_flow() {
        let state = test_state();
        let booking = make_booking(&state, "user-1");
        let order = create_order(&state, &booking.id, 25000, "USD").await.unwrap();
        confirm_capture(&state, &booking.id, &order.order_id).await.unwrap();

        lifecycle::review(&state, &booking.id, "owner-1").unwrap();
        lifecycle::approve(&state, &booking.id, "owner-1").unwrap();

        let reloaded = reload(&state, &booking.id);
        assert_eq!(reloaded.status, BookingStatus::Approved);
        assert_eq!(reloaded.payment_status, PaymentStatus::Paid);
    }

    #[tokio::test]
    async fn test_refund_webhook_updates_status_only() {
        let state = test_state();
        let booking = make_booking(&state, "user-1");
        let order = create_order(&state, &booking.id, 25000, "USD").await.unwrap();
        confirm_capture(&state, &booking.id, &order.order_id).await.unwrap();

        let txn = reload(&state, &booking.id).payment_transaction_id.unwrap();
        let body = serde_json::json!({
            "event_type": "refunded",
            "transaction_id": txn,
        })
        .to_string();

        let outcome = handle_webhook(&state, body.as_bytes(), "").await.unwrap();
        assert!(matches!(outcome, WebhookOutcome::MarkedRefunded { .. }));

        let reloaded = reload(&state, &booking.id);
        assert_eq!(reloaded.payment_status, PaymentStatus::Refunded);
        assert_eq!(reloaded.status, BookingStatus::Requested);
    }
}
