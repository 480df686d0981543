use std::time::Duration;

use hmac::{Hmac, Mac};
use reqwest::Client;
use serde::Deserialize;
use sha2::Sha256;
use subtle::ConstantTimeEq;
use thiserror::Error;

use async_trait::async_trait;

use crate::config::StripeSettings;
use crate::error::msg;

use super::{CheckoutProcessor, CheckoutSession, CheckoutSessionRequest, ProcessorError};

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Deserialize)]
struct CreateCheckoutSessionResponse {
    id: String,
    url: String,
}

/// Checkout sessions are built from ad-hoc `price_data` rather than dashboard
/// prices, so the charged amount always comes from the local price table.
#[derive(Debug, Clone)]
pub struct StripeClient {
    client: Client,
    secret_key: String,
    api_base: String,
}

impl StripeClient {
    /// Every request is bounded by `timeout`; hitting it surfaces as
    /// [`ProcessorError::Timeout`].
    pub fn new(settings: &StripeSettings, timeout: Duration) -> Result<Self, ProcessorError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ProcessorError::Unreachable(e.to_string()))?;

        Ok(Self {
            client,
            secret_key: settings.secret_key.clone(),
            api_base: settings.api_base.trim_end_matches('/').to_string(),
        })
    }

    fn session_form(request: &CheckoutSessionRequest) -> Vec<(String, String)> {
        let mut form: Vec<(String, String)> = vec![
            ("mode".into(), "payment".into()),
            ("success_url".into(), request.success_url.clone()),
            ("cancel_url".into(), request.cancel_url.clone()),
            ("client_reference_id".into(), request.metadata.business_id.clone()),
            ("line_items[0][quantity]".into(), "1".into()),
            ("line_items[0][price_data][currency]".into(), request.currency.clone()),
            (
                "line_items[0][price_data][unit_amount]".into(),
                request.amount_cents.to_string(),
            ),
            (
                "line_items[0][price_data][product_data][name]".into(),
                request.description.clone(),
            ),
        ];

        // Metadata goes on the session and on the PaymentIntent, so both
        // checkout.session.completed and charge.succeeded are self-describing.
        for (key, value) in request.metadata.to_pairs() {
            form.push((format!("metadata[{}]", key), value.clone()));
            form.push((format!("payment_intent_data[metadata][{}]", key), value));
        }

        form
    }
}

#[async_trait]
impl CheckoutProcessor for StripeClient {
    async fn create_checkout_session(
        &self,
        request: &CheckoutSessionRequest,
    ) -> Result<CheckoutSession, ProcessorError> {
        let response = self
            .client
            .post(format!("{}/v1/checkout/sessions", self.api_base))
            .basic_auth(&self.secret_key, None::<&str>)
            .form(&Self::session_form(request))
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ProcessorError::Timeout
                } else {
                    ProcessorError::Unreachable(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProcessorError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        let session: CreateCheckoutSessionResponse = response
            .json()
            .await
            .map_err(|e| ProcessorError::InvalidResponse(e.to_string()))?;

        Ok(CheckoutSession {
            id: session.id,
            url: session.url,
        })
    }
}

// ============ Webhook signatures ============

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SignatureError {
    #[error("{}", msg::INVALID_SIGNATURE_FORMAT)]
    Malformed,

    #[error("{}", msg::INVALID_TIMESTAMP_IN_SIGNATURE)]
    InvalidTimestamp,

    #[error("timestamp too old (age={age}s)")]
    TooOld { age: i64 },

    #[error("timestamp in the future (age={age}s)")]
    FromFuture { age: i64 },

    #[error("{}", msg::INVALID_WEBHOOK_SECRET)]
    NotConfigured,

    #[error("signature mismatch")]
    Mismatch,
}

/// Verifies `Stripe-Signature` headers (`t=<unix>,v1=<hex>[,v1=<hex>...]`).
#[derive(Debug, Clone)]
pub struct StripeWebhookVerifier {
    secret: String,
    tolerance_secs: i64,
}

impl StripeWebhookVerifier {
    /// Maximum age of a webhook timestamp before it's rejected (in seconds).
    /// Stripe recommends 300 seconds (5 minutes).
    pub const DEFAULT_TOLERANCE_SECS: i64 = 300;

    /// Allowed clock skew for timestamps ahead of ours.
    pub const MAX_FUTURE_SKEW_SECS: i64 = 60;

    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
            tolerance_secs: Self::DEFAULT_TOLERANCE_SECS,
        }
    }

    /// Check `header` against `payload` as of `now`. Nothing in the payload is
    /// parsed until this returns Ok.
    pub fn verify(&self, payload: &[u8], header: &str, now: i64) -> Result<(), SignatureError> {
        if self.secret.is_empty() {
            return Err(SignatureError::NotConfigured);
        }

        let mut timestamp = None;
        let mut candidates = Vec::new();

        for part in header.split(',') {
            let part = part.trim();
            if let Some(t) = part.strip_prefix("t=") {
                timestamp = Some(t);
            } else if let Some(s) = part.strip_prefix("v1=") {
                candidates.push(s);
            }
        }

        let timestamp_str = timestamp.ok_or(SignatureError::Malformed)?;
        if candidates.is_empty() {
            return Err(SignatureError::Malformed);
        }

        let timestamp: i64 = timestamp_str
            .parse()
            .map_err(|_| SignatureError::InvalidTimestamp)?;

        let age = now
            .checked_sub(timestamp)
            .ok_or(SignatureError::InvalidTimestamp)?;
        if age > self.tolerance_secs {
            return Err(SignatureError::TooOld { age });
        }
        if age < -Self::MAX_FUTURE_SKEW_SECS {
            return Err(SignatureError::FromFuture { age });
        }

        let expected = self.sign(timestamp_str, payload)?;

        // Length is not secret (always 64 hex chars), only the content is.
        let matched = candidates.iter().any(|candidate| {
            let provided = candidate.as_bytes();
            provided.len() == expected.len() && bool::from(expected.as_bytes().ct_eq(provided))
        });

        if matched {
            Ok(())
        } else {
            Err(SignatureError::Mismatch)
        }
    }

    /// Hex HMAC-SHA256 of `"{timestamp}.{payload}"`.
    fn sign(&self, timestamp: &str, payload: &[u8]) -> Result<String, SignatureError> {
        let mut mac = HmacSha256::new_from_slice(self.secret.as_bytes())
            .map_err(|_| SignatureError::NotConfigured)?;
        mac.update(timestamp.as_bytes());
        mac.update(b".");
        mac.update(payload);
        Ok(hex::encode(mac.finalize().into_bytes()))
    }

    /// Build a valid header for `payload`, e.g. to replay a captured event locally.
    pub fn header_for(&self, payload: &[u8], timestamp: i64) -> Result<String, SignatureError> {
        if self.secret.is_empty() {
            return Err(SignatureError::NotConfigured);
        }
        let ts = timestamp.to_string();
        let sig = self.sign(&ts, payload)?;
        Ok(format!("t={},v1={}", ts, sig))
    }
}

// ============ Events ============

/// Generic Stripe webhook event - object is parsed based on event_type
#[derive(Debug, Deserialize)]
pub struct StripeWebhookEvent {
    pub id: Option<String>,
    #[serde(rename = "type")]
    pub event_type: String,
    pub data: StripeEventData,
}

#[derive(Debug, Deserialize)]
pub struct StripeEventData {
    pub object: serde_json::Value,
}

/// Correlation metadata written at checkout. Every value is a string on the wire.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct StripeMetadata {
    pub business_id: Option<String>,
    pub user_id: Option<String>,
    pub duration_months: Option<String>,
    pub coupon_code: Option<String>,
    pub list_price_cents: Option<String>,
    pub discount_cents: Option<String>,
}

// ============ checkout.session.completed ============

#[derive(Debug, Deserialize)]
pub struct StripeCheckoutSession {
    pub id: String,
    pub payment_status: String,
    pub payment_intent: Option<String>,
    pub amount_total: Option<i64>,
    pub currency: Option<String>,
    #[serde(default)]
    pub metadata: StripeMetadata,
}

// ============ charge.succeeded ============

#[derive(Debug, Deserialize)]
pub struct StripeCharge {
    pub id: String,
    #[serde(default)]
    pub paid: bool,
    pub status: String,
    pub payment_intent: Option<String>,
    pub amount: i64,
    pub currency: String,
    #[serde(default)]
    pub metadata: StripeMetadata,
}
