//! services/api/src/adapters/receipt.rs
//!
//! Short-lived signed payment receipts. `/payments/verify` issues one after a
//! successful signature check; `POST /orders` requires it. This binds the
//! order-creation call to an actual verification by the same user for the
//! same gateway payment, closing the gap where a client could record an
//! order without ever verifying.

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use uuid::Uuid;

type HmacSha256 = Hmac<Sha256>;

fn sign(
    secret: &str,
    user_id: Uuid,
    gateway_order_id: &str,
    gateway_payment_id: &str,
    expires_unix: i64,
) -> String {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts any key length");
    mac.update(user_id.as_bytes());
    mac.update(b"|");
    mac.update(gateway_order_id.as_bytes());
    mac.update(b"|");
    mac.update(gateway_payment_id.as_bytes());
    mac.update(b"|");
    mac.update(expires_unix.to_string().as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

/// Issues a receipt of the form `"{expires_unix}.{hex hmac}"`.
pub fn issue(
    secret: &str,
    user_id: Uuid,
    gateway_order_id: &str,
    gateway_payment_id: &str,
    now: DateTime<Utc>,
    ttl: std::time::Duration,
) -> String {
    let expires_unix = now.timestamp() + ttl.as_secs() as i64;
    let mac = sign(secret, user_id, gateway_order_id, gateway_payment_id, expires_unix);
    format!("{expires_unix}.{mac}")
}

/// Checks a receipt against the caller's identity and the payment it claims
/// to cover. Returns false for malformed, expired, or tampered receipts.
pub fn verify(
    secret: &str,
    receipt: &str,
    user_id: Uuid,
    gateway_order_id: &str,
    gateway_payment_id: &str,
    now: DateTime<Utc>,
) -> bool {
    let Some((expiry_str, mac)) = receipt.split_once('.') else {
        return false;
    };
    let Ok(expires_unix) = expiry_str.parse::<i64>() else {
        return false;
    };
    if now.timestamp() > expires_unix {
        return false;
    }
    let expected = sign(secret, user_id, gateway_order_id, gateway_payment_id, expires_unix);
    expected.as_bytes().ct_eq(mac.as_bytes()).into()
}
