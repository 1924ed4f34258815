use serde::{Deserialize, Serialize};

/// Order creation request sent to the gateway. Amounts are in minor units.
#[derive(Debug, Clone, Serialize)]
pub struct OrderRequest {
    pub amount_minor: i64,
    pub currency: String,
    pub payee_reference: String,
    pub description: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreatedOrder {
    pub order_id: String,
}

/// Final capture details retrieved from the gateway for a completed order.
#[derive(Debug, Clone)]
pub struct GatewayCapture {
    pub transaction_id: String,
    pub payer_reference: Option<String>,
    pub amount_minor: i64,
    pub captured: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WebhookKind {
    CaptureSucceeded,
    CaptureFailed,
    Refunded,
}

/// A gateway webhook, normalized. Only trusted after signature verification.
#[derive(Debug, Clone)]
pub struct WebhookEvent {
    pub kind: WebhookKind,
    pub order_id: Option<String>,
    pub transaction_id: Option<String>,
    pub amount_minor: Option<i64>,
}
