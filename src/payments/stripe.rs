//! Minimal Stripe REST client (hosted checkout sessions) and webhook
//! signature verification.

use bytes::Bytes;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use tracing::instrument;

use crate::errors::ServiceError;

type HmacSha256 = Hmac<Sha256>;

const STRIPE_API_BASE: &str = "https://api.stripe.com/v1";

#[derive(Debug, Clone, Deserialize)]
pub struct CheckoutSession {
    pub id: String,
    pub url: Option<String>,
}

/// The slice of a Stripe event this service consumes.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StripeEvent {
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    pub data: StripeEventData,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StripeEventData {
    pub object: StripeSessionObject,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct StripeSessionObject {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub payment_intent: Option<String>,
    #[serde(default)]
    pub payment_status: Option<String>,
    #[serde(default)]
    pub metadata: Option<StripeMetadata>,
    #[serde(default)]
    pub customer_details: Option<StripeCustomerDetails>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct StripeMetadata {
    #[serde(default)]
    pub order_id: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct StripeCustomerDetails {
    #[serde(default)]
    pub email: Option<String>,
}

pub struct StripeClient {
    client: reqwest::Client,
    secret_key: String,
    api_base: String,
}

impl StripeClient {
    pub fn new(secret_key: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            secret_key,
            api_base: STRIPE_API_BASE.to_string(),
        }
    }

    #[cfg(test)]
    pub fn with_api_base(secret_key: String, api_base: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            secret_key,
            api_base,
        }
    }

    pub fn is_configured(&self) -> bool {
        !self.secret_key.is_empty()
    }

    /// Creates a hosted checkout session that charges the order total as a
    /// single line, with the order id carried in metadata for the webhook.
    #[instrument(skip(self, customer_email))]
    pub async fn create_checkout_session(
        &self,
        order_id: &str,
        public_id: &str,
        total_cents: i64,
        customer_email: Option<&str>,
        public_base_url: &str,
    ) -> Result<CheckoutSession, ServiceError> {
        let base = public_base_url.trim_end_matches('/');
        let success_url = format!(
            "{}/shop/order-success/{}?session_id={{CHECKOUT_SESSION_ID}}",
            base, order_id
        );
        let cancel_url = format!("{}/shop/checkout?canceled=1&orderId={}", base, order_id);
        let amount = total_cents.to_string();
        let item_name = format!("Order {}", public_id);

        let mut form: Vec<(&str, &str)> = vec![
            ("mode", "payment"),
            ("line_items[0][price_data][currency]", "eur"),
            ("line_items[0][price_data][product_data][name]", &item_name),
            ("line_items[0][price_data][unit_amount]", &amount),
            ("line_items[0][quantity]", "1"),
            ("success_url", &success_url),
            ("cancel_url", &cancel_url),
            ("metadata[order_id]", order_id),
        ];
        if let Some(email) = customer_email {
            form.push(("customer_email", email));
        }

        let response = self
            .client
            .post(format!("{}/checkout/sessions", self.api_base))
            .basic_auth(&self.secret_key, None::<&str>)
            .form(&form)
            .send()
            .await
            .map_err(|e| ServiceError::ExternalServiceError(format!("stripe: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ServiceError::ExternalServiceError(format!(
                "stripe returned {}: {}",
                status, body
            )));
        }

        response
            .json::<CheckoutSession>()
            .await
            .map_err(|e| ServiceError::ExternalServiceError(format!("stripe response: {}", e)))
    }
}

/// Verifies a `stripe-signature` header (`t=<ts>,v1=<hex>`) over the raw
/// payload: HMAC-SHA256 of `"{t}.{payload}"` with the endpoint secret,
/// compared in constant time, with the timestamp bounded by `tolerance`.
pub fn verify_stripe_signature(
    header: &str,
    payload: &Bytes,
    secret: &str,
    tolerance_secs: i64,
) -> bool {
    let mut ts = "";
    let mut v1 = "";
    for part in header.split(',') {
        let mut it = part.trim().splitn(2, '=');
        match (it.next(), it.next()) {
            (Some("t"), Some(val)) => ts = val,
            (Some("v1"), Some(val)) => v1 = val,
            _ => {}
        }
    }
    if ts.is_empty() || v1.is_empty() {
        return false;
    }

    let Ok(ts_num) = ts.parse::<i64>() else {
        return false;
    };
    let now = chrono::Utc::now().timestamp();
    if (now - ts_num).abs() > tolerance_secs {
        return false;
    }

    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(ts.as_bytes());
    mac.update(b".");
    mac.update(payload);
    let expected = hex::encode(mac.finalize().into_bytes());
    constant_time_eq(&expected, v1)
}

fn constant_time_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut res = 0u8;
    for (x, y) in a.as_bytes().iter().zip(b.as_bytes()) {
        res |= x ^ y;
    }
    res == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sign(payload: &str, secret: &str, ts: i64) -> String {
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(format!("{}.{}", ts, payload).as_bytes());
        format!("t={},v1={}", ts, hex::encode(mac.finalize().into_bytes()))
    }

    #[test]
    fn valid_signature_passes() {
        let payload = r#"{"id":"evt_1"}"#;
        let ts = chrono::Utc::now().timestamp();
        let header = sign(payload, "whsec_test", ts);
        assert!(verify_stripe_signature(
            &header,
            &Bytes::from(payload),
            "whsec_test",
            300
        ));
    }

    #[test]
    fn wrong_secret_fails() {
        let payload = r#"{"id":"evt_1"}"#;
        let ts = chrono::Utc::now().timestamp();
        let header = sign(payload, "whsec_test", ts);
        assert!(!verify_stripe_signature(
            &header,
            &Bytes::from(payload),
            "whsec_other",
            300
        ));
    }

    #[test]
    fn stale_timestamp_fails() {
        let payload = r#"{"id":"evt_1"}"#;
        let ts = chrono::Utc::now().timestamp() - 3600;
        let header = sign(payload, "whsec_test", ts);
        assert!(!verify_stripe_signature(
            &header,
            &Bytes::from(payload),
            "whsec_test",
            300
        ));
    }

    #[test]
    fn tampered_payload_fails() {
        let ts = chrono::Utc::now().timestamp();
        let header = sign(r#"{"id":"evt_1"}"#, "whsec_test", ts);
        assert!(!verify_stripe_signature(
            &header,
            &Bytes::from(r#"{"id":"evt_2"}"#),
            "whsec_test",
            300
        ));
    }

    #[test]
    fn malformed_header_fails() {
        let payload = Bytes::from("{}");
        assert!(!verify_stripe_signature("", &payload, "s", 300));
        assert!(!verify_stripe_signature("t=abc,v1=", &payload, "s", 300));
        assert!(!verify_stripe_signature("v1=deadbeef", &payload, "s", 300));
    }

    #[test]
    fn event_deserializes_metadata_order_id() {
        let raw = r#"{
            "id": "evt_1",
            "type": "checkout.session.completed",
            "data": { "object": {
                "id": "cs_test_1",
                "payment_intent": "pi_1",
                "payment_status": "paid",
                "metadata": { "order_id": "0193d1c0-0000-7000-8000-000000000000" },
                "customer_details": { "email": "buyer@example.com" }
            }}
        }"#;
        let event: StripeEvent = serde_json::from_str(raw).unwrap();
        assert_eq!(event.event_type, "checkout.session.completed");
        assert_eq!(
            event.data.object.metadata.unwrap().order_id.as_deref(),
            Some("0193d1c0-0000-7000-8000-000000000000")
        );
    }
}
