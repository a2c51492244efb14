//! services/api/src/adapters/razorpay.rs
//!
//! Payment gateway adapter: creates Razorpay orders over REST and verifies
//! the payment callback signature. The signature check is the sole trust
//! boundary converting an untrusted client payload into a "payment happened"
//! fact, so the comparison is constant-time.

use async_trait::async_trait;
use bookstore_core::ports::{PaymentGatewayService, PortError, PortResult};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use tracing::error;
use uuid::Uuid;

type HmacSha256 = Hmac<Sha256>;

/// Recomputes the gateway's payment signature:
/// hex(HMAC_SHA256(secret, order_id + "|" + payment_id)).
pub fn compute_signature(secret: &str, gateway_order_id: &str, gateway_payment_id: &str) -> String {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts any key length");
    mac.update(gateway_order_id.as_bytes());
    mac.update(b"|");
    mac.update(gateway_payment_id.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

#[derive(Serialize)]
struct CreateOrderBody<'a> {
    amount: i64,
    currency: &'a str,
    receipt: String,
}

#[derive(Deserialize)]
struct CreateOrderResponse {
    id: String,
}

/// A gateway adapter that implements the `PaymentGatewayService` port.
#[derive(Clone)]
pub struct RazorpayAdapter {
    http: reqwest::Client,
    key_id: String,
    key_secret: String,
    base_url: String,
}

impl RazorpayAdapter {
    pub fn new(key_id: String, key_secret: String, base_url: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            key_id,
            key_secret,
            base_url,
        }
    }
}

#[async_trait]
impl PaymentGatewayService for RazorpayAdapter {
    async fn create_gateway_order(&self, amount_minor: i64, currency: &str) -> PortResult<String> {
        if amount_minor <= 0 {
            return Err(PortError::Invalid(
                "Amount must be a positive integer of minor units".to_string(),
            ));
        }

        let body = CreateOrderBody {
            amount: amount_minor,
            currency,
            receipt: format!("rcpt_{}", Uuid::new_v4().simple()),
        };

        let response = self
            .http
            .post(format!("{}/orders", self.base_url))
            .basic_auth(&self.key_id, Some(&self.key_secret))
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                error!("Gateway order creation failed: {e}");
                PortError::Unexpected(format!("Payment gateway unavailable: {e}"))
            })?;

        if !response.status().is_success() {
            let status = response.status();
            error!("Gateway order creation returned {status}");
            return Err(PortError::Unexpected(format!(
                "Payment gateway returned {status}"
            )));
        }

        let created: CreateOrderResponse = response.json().await.map_err(|e| {
            error!("Gateway order response undecodable: {e}");
            PortError::Unexpected(format!("Payment gateway response undecodable: {e}"))
        })?;

        Ok(created.id)
    }

    async fn verify_payment(
        &self,
        gateway_order_id: &str,
        gateway_payment_id: &str,
        signature: &str,
    ) -> PortResult<bool> {
        let expected = compute_signature(&self.key_secret, gateway_order_id, gateway_payment_id);
        Ok(expected.as_bytes().ct_eq(signature.as_bytes()).into())
    }
}
