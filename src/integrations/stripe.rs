use std::collections::HashMap;

use hmac::{Hmac, Mac};
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use sha2::Sha256;
use thiserror::Error;
use tracing::info;

use crate::config::StripeConfig;

use super::{ProviderError, reject};

const PROVIDER: &str = "stripe";
const PAYMENT_INTENTS_URL: &str = "https://api.stripe.com/v1/payment_intents";
pub const SIGNATURE_TOLERANCE_SECS: i64 = 300;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum WebhookError {
    #[error("missing or malformed Stripe-Signature header")]
    MalformedHeader,

    #[error("webhook timestamp outside the tolerance window")]
    TimestampOutOfTolerance,

    #[error("no signature matched the payload")]
    SignatureMismatch,

    #[error("webhook payload is not a valid event: {0}")]
    InvalidPayload(String),
}

#[derive(Debug, Deserialize)]
pub struct PaymentIntent {
    pub id: String,
    pub client_secret: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Event {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub data: EventData,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EventData {
    pub object: Value,
}

#[derive(Debug, Deserialize)]
pub struct PaymentIntentObject {
    pub id: String,
    pub latest_charge: Option<String>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
    pub last_payment_error: Option<PaymentErrorObject>,
}

#[derive(Debug, Deserialize)]
pub struct PaymentErrorObject {
    pub message: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SubscriptionObject {
    pub id: String,
    pub customer: String,
    pub status: String,
    pub current_period_end: Option<i64>,
    pub ended_at: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct InvoiceObject {
    pub id: String,
    pub customer: Option<String>,
}

pub struct NewPaymentIntent<'a> {
    pub amount: i64,
    pub description: Option<&'a str>,
    pub metadata: Vec<(&'static str, String)>,
}

#[derive(Clone)]
pub struct StripeClient {
    http: Client,
    config: Option<StripeConfig>,
}

impl StripeClient {
    pub fn new(http: Client, config: Option<StripeConfig>) -> Self {
        Self { http, config }
    }

    pub fn webhook_secret(&self) -> Option<&str> {
        self.config.as_ref().and_then(|c| c.webhook_secret.as_deref())
    }

    /// AUD intent with automatic payment methods.
    pub async fn create_payment_intent(&self, intent: NewPaymentIntent<'_>) -> Result<PaymentIntent, ProviderError> {
        let config = self
            .config
            .as_ref()
            .ok_or(ProviderError::NotConfigured { provider: PROVIDER })?;

        let mut form: Vec<(String, String)> = vec![
            ("amount".into(), intent.amount.to_string()),
            ("currency".into(), "aud".into()),
            ("automatic_payment_methods[enabled]".into(), "true".into()),
        ];
        if let Some(description) = intent.description {
            form.push(("description".into(), description.to_string()));
        }
        for (key, value) in intent.metadata {
            form.push((format!("metadata[{key}]"), value));
        }

        let res = self
            .http
            .post(PAYMENT_INTENTS_URL)
            .bearer_auth(&config.secret_key)
            .form(&form)
            .send()
            .await
            .map_err(ProviderError::http(PROVIDER))?;

        if !res.status().is_success() {
            return Err(reject(PROVIDER, res).await);
        }

        let created: PaymentIntent = res.json().await.map_err(ProviderError::http(PROVIDER))?;
        info!(payment_intent = %created.id, amount = intent.amount, "payment intent created");
        Ok(created)
    }
}

/// Checks a `Stripe-Signature` header (`t=<unix>,v1=<hex>[,v1=...]`) against the raw body
/// and parses the event.
pub fn verify_webhook(payload: &[u8], header: &str, secret: &str, now: i64) -> Result<Event, WebhookError> {
    let mut timestamp = None;
    let mut signatures = Vec::new();
    for part in header.split(',') {
        match part.trim().split_once('=') {
            Some(("t", value)) => timestamp = value.parse::<i64>().ok(),
            Some(("v1", value)) => {
                if let Ok(bytes) = hex::decode(value) {
                    signatures.push(bytes);
                }
            }
            _ => {}
        }
    }

    let timestamp = timestamp.ok_or(WebhookError::MalformedHeader)?;
    if signatures.is_empty() {
        return Err(WebhookError::MalformedHeader);
    }
    if now.abs_diff(timestamp) > SIGNATURE_TOLERANCE_SECS.unsigned_abs() {
        return Err(WebhookError::TimestampOutOfTolerance);
    }

    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).map_err(|_| WebhookError::SignatureMismatch)?;
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload);

    // verify_slice compares in constant time
    if !signatures.iter().any(|sig| mac.clone().verify_slice(sig).is_ok()) {
        return Err(WebhookError::SignatureMismatch);
    }

    serde_json::from_slice(payload).map_err(|e| WebhookError::InvalidPayload(e.to_string()))
}

#[cfg(test)]
pub(crate) fn sign(payload: &[u8], secret: &str, timestamp: i64) -> String {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
    mac.update(format!("{timestamp}.").as_bytes());
    mac.update(payload);
    format!("t={timestamp},v1={}", hex::encode(mac.finalize().into_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "whsec_test";
    const BODY: &[u8] = br#"{"id":"evt_1","type":"payment_intent.succeeded","data":{"object":{"id":"pi_1","latest_charge":"ch_1","metadata":{"paymentType":"DEPOSIT"}}}}"#;

    #[test]
    fn valid_signature_yields_event() {
        let header = sign(BODY, SECRET, 1_700_000_000);
        let event = verify_webhook(BODY, &header, SECRET, 1_700_000_100).unwrap();
        assert_eq!(event.kind, "payment_intent.succeeded");

        let intent: PaymentIntentObject = serde_json::from_value(event.data.object).unwrap();
        assert_eq!(intent.id, "pi_1");
        assert_eq!(intent.latest_charge.as_deref(), Some("ch_1"));
        assert_eq!(intent.metadata.get("paymentType").map(String::as_str), Some("DEPOSIT"));
    }

    #[test]
    fn any_matching_v1_is_accepted() {
        let good = sign(BODY, SECRET, 1_700_000_000);
        let header = format!("t=1700000000,v1={},{}", "00".repeat(32), good.split(',').nth(1).unwrap());
        assert!(verify_webhook(BODY, &header, SECRET, 1_700_000_000).is_ok());
    }

    #[test]
    fn tampered_body_is_rejected() {
        let header = sign(BODY, SECRET, 1_700_000_000);
        let tampered = String::from_utf8_lossy(BODY).replace("pi_1", "pi_2");
        assert_eq!(
            verify_webhook(tampered.as_bytes(), &header, SECRET, 1_700_000_000).unwrap_err(),
            WebhookError::SignatureMismatch
        );
        assert_eq!(
            verify_webhook(BODY, &header, "whsec_other", 1_700_000_000).unwrap_err(),
            WebhookError::SignatureMismatch
        );
    }

    #[test]
    fn stale_timestamp_is_rejected() {
        let header = sign(BODY, SECRET, 1_700_000_000);
        assert_eq!(
            verify_webhook(BODY, &header, SECRET, 1_700_000_000 + SIGNATURE_TOLERANCE_SECS + 1).unwrap_err(),
            WebhookError::TimestampOutOfTolerance
        );
    }

    #[test]
    fn extreme_timestamps_are_out_of_tolerance() {
        for t in [i64::MIN, i64::MAX] {
            let header = format!("t={t},v1={}", "00".repeat(32));
            assert_eq!(
                verify_webhook(BODY, &header, SECRET, 1_700_000_000).unwrap_err(),
                WebhookError::TimestampOutOfTolerance,
                "t={t}"
            );
        }
        let header = format!("t=1700000000,v1={}", "00".repeat(32));
        assert_eq!(
            verify_webhook(BODY, &header, SECRET, i64::MIN).unwrap_err(),
            WebhookError::TimestampOutOfTolerance
        );
    }

    #[test]
    fn malformed_headers() {
        for header in ["", "t=abc,v1=00", "v1=00", "t=1700000000"] {
            assert_eq!(
                verify_webhook(BODY, header, SECRET, 1_700_000_000).unwrap_err(),
                WebhookError::MalformedHeader,
                "header {header:?}"
            );
        }
    }
}
