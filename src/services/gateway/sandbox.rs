use std::collections::HashMap;
use std::sync::Mutex;

use anyhow::Context;
use async_trait::async_trait;
use serde::Deserialize;

use super::{verify_hmac_signature, PaymentGateway};
use crate::models::{CreatedOrder, GatewayCapture, OrderRequest, WebhookEvent, WebhookKind};

/// In-process gateway for development and tests. Orders live in memory and
/// every order captures successfully for exactly the requested amount.
pub struct SandboxGateway {
    webhook_secret: String,
    orders: Mutex<HashMap<String, i64>>,
}

impl SandboxGateway {
    pub fn new(webhook_secret: String) -> Self {
        Self {
            webhook_secret,
            orders: Mutex::new(HashMap::new()),
        }
    }
}

#[derive(Deserialize)]
struct SandboxWebhookPayload {
    event_type: String,
    order_id: Option<String>,
    transaction_id: Option<String>,
    amount_minor: Option<i64>,
}

/// The sandbox transaction id is a pure function of the order id, so repeated
/// capture lookups reconcile as replays instead of fresh payments.
fn transaction_id_for(order_id: &str) -> String {
    format!("pay_{}", order_id.trim_start_matches("order_"))
}

#[async_trait]
impl PaymentGateway for SandboxGateway {
    fn name(&self) -> &'static str {
        "sandbox"
    }

    fn signature_header(&self) -> &'static str {
        "x-parishbook-signature"
    }

    async fn create_order(&self, req: &OrderRequest) -> anyhow::Result<CreatedOrder> {
        let order_id = format!("order_{}", uuid::Uuid::new_v4().simple());
        self.orders
            .lock()
            .unwrap()
            .insert(order_id.clone(), req.amount_minor);
        tracing::info!(order_id = %order_id, amount = req.amount_minor, "sandbox order created");
        Ok(CreatedOrder { order_id })
    }

    async fn fetch_capture(&self, order_id: &str) -> anyhow::Result<GatewayCapture> {
        let amount = self
            .orders
            .lock()
            .unwrap()
            .get(order_id)
            .copied()
            .ok_or_else(|| anyhow::anyhow!("unknown sandbox order: {order_id}"))?;

        Ok(GatewayCapture {
            transaction_id: transaction_id_for(order_id),
            payer_reference: Some("sandbox-payer".to_string()),
            amount_minor: amount,
            captured: true,
        })
    }

    fn verify_webhook(&self, body: &[u8], signature: &str) -> bool {
        verify_hmac_signature(&self.webhook_secret, body, signature)
    }

    fn parse_webhook(&self, body: &[u8]) -> anyhow::Result<WebhookEvent> {
        let payload: SandboxWebhookPayload =
            serde_json::from_slice(body).context("invalid sandbox webhook payload")?;

        let kind = match payload.event_type.as_str() {
            "capture_succeeded" => WebhookKind::CaptureSucceeded,
            "capture_failed" => WebhookKind::CaptureFailed,
            "refunded" => WebhookKind::Refunded,
            other => anyhow::bail!("unhandled sandbox webhook event: {other}"),
        };

        Ok(WebhookEvent {
            kind,
            order_id: payload.order_id,
            transaction_id: payload.transaction_id,
            amount_minor: payload.amount_minor,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn order_request(amount_minor: i64) -> OrderRequest {
        OrderRequest {
            amount_minor,
            currency: "USD".to_string(),
            payee_reference: "acct_1".to_string(),
            description: "APPT-0001".to_string(),
        }
    }

    #[tokio::test]
    async fn test_capture_matches_order_amount() {
        let gw = SandboxGateway::new(String::new());
        let order = gw.create_order(&order_request(7500)).await.unwrap();
        let capture = gw.fetch_capture(&order.order_id).await.unwrap();
        assert!(capture.captured);
        assert_eq!(capture.amount_minor, 7500);
    }

    #[tokio::test]
    async fn test_capture_is_deterministic() {
        let gw = SandboxGateway::new(String::new());
        let order = gw.create_order(&order_request(7500)).await.unwrap();
        let first = gw.fetch_capture(&order.order_id).await.unwrap();
        let second = gw.fetch_capture(&order.order_id).await.unwrap();
        assert_eq!(first.transaction_id, second.transaction_id);
    }

    #[tokio::test]
    async fn test_unknown_order_is_an_error() {
        let gw = SandboxGateway::new(String::new());
        assert!(gw.fetch_capture("order_nope").await.is_err());
    }
}
