use serde::Serialize;

/// Emitted on the broadcast channel after a state change has been durably
/// committed, for the external notification dispatcher to consume.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DomainEvent {
    BookingLifecycle(BookingLifecycleEvent),
    PaymentConfirmed(PaymentConfirmedEvent),
}

#[derive(Debug, Clone, Serialize)]
pub struct BookingLifecycleEvent {
    pub booking_id: String,
    pub code: String,
    pub from_status: &'static str,
    pub to_status: &'static str,
    pub actor: String,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PaymentConfirmedEvent {
    pub booking_id: String,
    pub code: String,
    pub amount_minor: i64,
    pub transaction_id: String,
}
