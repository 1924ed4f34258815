use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Booking {
    pub id: String,
    pub code: String,
    pub church_id: String,
    pub service_id: String,
    pub requester_id: String,
    pub scheduled_date: NaiveDate,
    pub scheduled_time: Option<String>,
    pub status: BookingStatus,
    pub payment_status: PaymentStatus,
    pub payment_method: Option<String>,
    pub payment_amount: Option<i64>,
    pub payment_order_id: Option<String>,
    pub payment_transaction_id: Option<String>,
    pub payment_date: Option<NaiveDateTime>,
    pub cancel_reason: Option<String>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum BookingStatus {
    Requested,
    Reviewed,
    Approved,
    Completed,
    Declined,
    Canceled,
}

impl BookingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Requested => "requested",
            BookingStatus::Reviewed => "reviewed",
            BookingStatus::Approved => "approved",
            BookingStatus::Completed => "completed",
            BookingStatus::Declined => "declined",
            BookingStatus::Canceled => "canceled",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "reviewed" => BookingStatus::Reviewed,
            "approved" => BookingStatus::Approved,
            "completed" => BookingStatus::Completed,
            "declined" => BookingStatus::Declined,
            "canceled" => BookingStatus::Canceled,
            _ => BookingStatus::Requested,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            BookingStatus::Completed | BookingStatus::Declined | BookingStatus::Canceled
        )
    }

    /// Active means the booking still occupies its slot: not yet completed,
    /// declined or canceled.
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            BookingStatus::Requested | BookingStatus::Reviewed | BookingStatus::Approved
        )
    }

    /// The legal lifecycle transitions. Decline and cancel are reachable from
    /// any non-terminal state; the forward path is strictly
    /// requested → reviewed → approved → completed.
    pub fn can_transition_to(&self, next: BookingStatus) -> bool {
        if self.is_terminal() {
            return false;
        }
        match next {
            BookingStatus::Reviewed => *self == BookingStatus::Requested,
            BookingStatus::Approved => *self == BookingStatus::Reviewed,
            BookingStatus::Completed => *self == BookingStatus::Approved,
            BookingStatus::Declined | BookingStatus::Canceled => true,
            BookingStatus::Requested => false,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Pending,
    Paid,
    Failed,
    Canceled,
    Refunded,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Paid => "paid",
            PaymentStatus::Failed => "failed",
            PaymentStatus::Canceled => "canceled",
            PaymentStatus::Refunded => "refunded",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "paid" => PaymentStatus::Paid,
            "failed" => PaymentStatus::Failed,
            "canceled" => PaymentStatus::Canceled,
            "refunded" => PaymentStatus::Refunded,
            _ => PaymentStatus::Pending,
        }
    }
}
