use anyhow::Context;
use async_trait::async_trait;
use serde_json::json;

use super::{verify_hmac_signature, GatewayConfig, PaymentGateway};
use crate::models::{CreatedOrder, GatewayCapture, OrderRequest, WebhookEvent, WebhookKind};

const API_BASE: &str = "https://api.razorpay.com";

pub struct RazorpayGateway {
    config: GatewayConfig,
    client: reqwest::Client,
}

impl RazorpayGateway {
    pub fn new(config: GatewayConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .context("failed to build Razorpay HTTP client")?;
        Ok(Self { config, client })
    }
}

#[async_trait]
impl PaymentGateway for RazorpayGateway {
    fn name(&self) -> &'static str {
        "razorpay"
    }

    fn signature_header(&self) -> &'static str {
        "x-razorpay-signature"
    }

    async fn create_order(&self, req: &OrderRequest) -> anyhow::Result<CreatedOrder> {
        let body = json!({
            "amount": req.amount_minor,
            "currency": req.currency,
            "receipt": req.description,
            "notes": {
                "payee_reference": req.payee_reference,
            },
        });

        let resp = self
            .client
            .post(format!("{API_BASE}/v1/orders"))
            .basic_auth(&self.config.key_id, Some(&self.config.key_secret))
            .json(&body)
            .send()
            .await
            .context("failed to call Razorpay orders API")?;

        let status = resp.status();
        let data: serde_json::Value = resp
            .json()
            .await
            .context("failed to parse Razorpay order response")?;

        if !status.is_success() {
            anyhow::bail!("Razorpay order creation failed ({}): {}", status, data);
        }

        let order_id = data["id"]
            .as_str()
            .map(|s| s.to_string())
            .ok_or_else(|| anyhow::anyhow!("missing order id in Razorpay response"))?;

        Ok(CreatedOrder { order_id })
    }

    async fn fetch_capture(&self, order_id: &str) -> anyhow::Result<GatewayCapture> {
        let resp = self
            .client
            .get(format!("{API_BASE}/v1/orders/{order_id}/payments"))
            .basic_auth(&self.config.key_id, Some(&self.config.key_secret))
            .send()
            .await
            .context("failed to fetch Razorpay payments for order")?;

        let status = resp.status();
        let data: serde_json::Value = resp
            .json()
            .await
            .context("failed to parse Razorpay payments response")?;

        if !status.is_success() {
            anyhow::bail!("Razorpay payments lookup failed ({}): {}", status, data);
        }

        let items = data["items"]
            .as_array()
            .ok_or_else(|| anyhow::anyhow!("missing items in Razorpay payments response"))?;

        // One order can accumulate failed attempts; a captured one settles it.
        let payment = items
            .iter()
            .find(|p| p["status"].as_str() == Some("captured"))
            .or_else(|| items.last())
            .ok_or_else(|| anyhow::anyhow!("no payment attempts recorded for order {order_id}"))?;

        let transaction_id = payment["id"]
            .as_str()
            .map(|s| s.to_string())
            .ok_or_else(|| anyhow::anyhow!("missing payment id in Razorpay response"))?;

        Ok(GatewayCapture {
            transaction_id,
            payer_reference: payment["email"].as_str().map(|s| s.to_string()),
            amount_minor: payment["amount"].as_i64().unwrap_or(0),
            captured: payment["status"].as_str() == Some("captured"),
        })
    }

    fn verify_webhook(&self, body: &[u8], signature: &str) -> bool {
        verify_hmac_signature(&self.config.webhook_secret, body, signature)
    }

    fn parse_webhook(&self, body: &[u8]) -> anyhow::Result<WebhookEvent> {
        let data: serde_json::Value =
            serde_json::from_slice(body).context("invalid Razorpay webhook payload")?;

        let event = data["event"].as_str().unwrap_or("");
        let payment = &data["payload"]["payment"]["entity"];

        match event {
            "payment.captured" => Ok(WebhookEvent {
                kind: WebhookKind::CaptureSucceeded,
                order_id: payment["order_id"].as_str().map(|s| s.to_string()),
                transaction_id: payment["id"].as_str().map(|s| s.to_string()),
                amount_minor: payment["amount"].as_i64(),
            }),
            "payment.failed" => Ok(WebhookEvent {
                kind: WebhookKind::CaptureFailed,
                order_id: payment["order_id"].as_str().map(|s| s.to_string()),
                transaction_id: payment["id"].as_str().map(|s| s.to_string()),
                amount_minor: payment["amount"].as_i64(),
            }),
            "refund.processed" => {
                let refund = &data["payload"]["refund"]["entity"];
                Ok(WebhookEvent {
                    kind: WebhookKind::Refunded,
                    order_id: None,
                    transaction_id: refund["payment_id"].as_str().map(|s| s.to_string()),
                    amount_minor: refund["amount"].as_i64(),
                })
            }
            other => anyhow::bail!("unhandled Razorpay webhook event: {other}"),
        }
    }
}
