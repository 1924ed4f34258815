pub mod razorpay;
pub mod sandbox;

use std::time::Duration;

use async_trait::async_trait;
use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::models::{CreatedOrder, GatewayCapture, OrderRequest, WebhookEvent};

/// Credentials and limits for a gateway, injected at construction. Nothing is
/// read from ambient state at call time.
#[derive(Clone, Debug)]
pub struct GatewayConfig {
    pub key_id: String,
    pub key_secret: String,
    pub webhook_secret: String,
    pub timeout: Duration,
}

/// One implementing variant per payment gateway, selected by configuration
/// when the application starts.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    fn name(&self) -> &'static str;

    /// Header the gateway puts its webhook signature in.
    fn signature_header(&self) -> &'static str;

    async fn create_order(&self, req: &OrderRequest) -> anyhow::Result<CreatedOrder>;

    /// Retrieves final capture details for an order after the payer has
    /// completed authorization.
    async fn fetch_capture(&self, order_id: &str) -> anyhow::Result<GatewayCapture>;

    /// Checks the webhook body against the shared secret. The payload must
    /// not be trusted unless this returns true.
    fn verify_webhook(&self, body: &[u8], signature: &str) -> bool;

    fn parse_webhook(&self, body: &[u8]) -> anyhow::Result<WebhookEvent>;
}

pub(crate) fn hmac_sha256_hex(secret: &str, body: &[u8]) -> Option<String> {
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes()).ok()?;
    mac.update(body);
    Some(hex::encode(mac.finalize().into_bytes()))
}

/// Shared verification: empty secret skips the check (dev mode).
pub(crate) fn verify_hmac_signature(secret: &str, body: &[u8], signature: &str) -> bool {
    if secret.is_empty() {
        tracing::warn!("webhook secret not configured, skipping signature verification");
        return true;
    }
    match hmac_sha256_hex(secret, body) {
        Some(expected) => expected == signature,
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hmac_signature_roundtrip() {
        let body = br#"{"event_type":"capture_succeeded"}"#;
        let sig = hmac_sha256_hex("secret", body).unwrap();
        assert!(verify_hmac_signature("secret", body, &sig));
        assert!(!verify_hmac_signature("secret", body, "deadbeef"));
        assert!(!verify_hmac_signature("other-secret", body, &sig));
    }

    #[test]
    fn test_empty_secret_skips_verification() {
        assert!(verify_hmac_signature("", b"anything", "whatever"));
    }
}
