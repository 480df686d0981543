use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
};
use chrono::Utc;

use crate::db::AppState;
use crate::entitlement::ConfirmedPayment;
use crate::models::normalize_coupon_code;
use crate::payments::{StripeCharge, StripeCheckoutSession, StripeMetadata, StripeWebhookEvent};
use crate::pricing::CURRENCY;

use super::common::{process_confirmed_payment, WebhookEvent, WebhookResult};

const SIGNATURE_HEADER: &str = "stripe-signature";

/// `POST /webhook/stripe`
///
/// verify → normalize → activate. Only the first step can fail the request.
pub async fn handle_stripe_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> impl IntoResponse {
    let signature = match headers.get(SIGNATURE_HEADER).map(|v| v.to_str()) {
        Some(Ok(s)) => s,
        Some(Err(_)) => {
            tracing::warn!("Stripe webhook rejected: non-ASCII signature header");
            return (StatusCode::UNAUTHORIZED, "Invalid signature");
        }
        None => {
            tracing::warn!("Stripe webhook rejected: missing signature header");
            return (StatusCode::UNAUTHORIZED, "Missing signature");
        }
    };

    if let Err(e) = state
        .webhook_verifier
        .verify(&body, signature, Utc::now().timestamp())
    {
        tracing::warn!(error = %e, "Stripe webhook rejected: signature verification failed");
        return (StatusCode::UNAUTHORIZED, "Invalid signature");
    }

    match parse_event(&body) {
        Ok(WebhookEvent::PaymentConfirmed(payment)) => process_confirmed_payment(&state, payment),
        Ok(WebhookEvent::Ignored(reason)) => (StatusCode::OK, reason),
        Err(result) => result,
    }
}

/// Parse a verified payload into something the activator understands.
///
/// Errors are already-acknowledged results: a payload we cannot use is dropped
/// with 200, since redelivering the same bytes will not make it usable.
pub fn parse_event(body: &[u8]) -> Result<WebhookEvent, WebhookResult> {
    let event: StripeWebhookEvent = serde_json::from_slice(body).map_err(|e| {
        tracing::warn!("Dropping unparseable Stripe webhook: {}", e);
        (StatusCode::OK, "Invalid payload")
    })?;

    match event.event_type.as_str() {
        "checkout.session.completed" => parse_checkout_completed(&event),
        "charge.succeeded" => parse_charge_succeeded(&event),
        _ => Ok(WebhookEvent::Ignored("Event ignored")),
    }
}

fn parse_checkout_completed(event: &StripeWebhookEvent) -> Result<WebhookEvent, WebhookResult> {
    let session: StripeCheckoutSession = serde_json::from_value(event.data.object.clone())
        .map_err(|e| {
            tracing::warn!("Dropping malformed checkout session (event {:?}): {}", event.id, e);
            (StatusCode::OK, "Invalid checkout session")
        })?;

    if session.payment_status != "paid" {
        tracing::debug!(
            session_id = %session.id,
            payment_status = %session.payment_status,
            "checkout completed without payment"
        );
        return Ok(WebhookEvent::Ignored("Payment not completed"));
    }

    let reference = match session.payment_intent.clone() {
        Some(payment_intent) => payment_intent,
        None => {
            // A charge.succeeded for this purchase is keyed on its PaymentIntent and
            // will not match this reference.
            tracing::warn!(
                session_id = %session.id,
                "checkout session has no payment_intent; keying activation on the session id"
            );
            session.id.clone()
        }
    };
    let currency = session.currency.clone();
    confirmed_payment(
        &session.metadata,
        reference,
        session.amount_total,
        currency,
    )
    .map(WebhookEvent::PaymentConfirmed)
}

fn parse_charge_succeeded(event: &StripeWebhookEvent) -> Result<WebhookEvent, WebhookResult> {
    let charge: StripeCharge = serde_json::from_value(event.data.object.clone()).map_err(|e| {
        tracing::warn!("Dropping malformed charge (event {:?}): {}", event.id, e);
        (StatusCode::OK, "Invalid charge")
    })?;

    if !charge.paid || charge.status != "succeeded" {
        tracing::debug!(charge_id = %charge.id, status = %charge.status, "charge not settled");
        return Ok(WebhookEvent::Ignored("Charge not settled"));
    }

    let reference = charge.payment_intent.clone().unwrap_or_else(|| charge.id.clone());
    confirmed_payment(
        &charge.metadata,
        reference,
        Some(charge.amount),
        Some(charge.currency.clone()),
    )
    .map(WebhookEvent::PaymentConfirmed)
}

/// Rebuild the purchase from the correlation metadata written at checkout.
fn confirmed_payment(
    metadata: &StripeMetadata,
    reference: String,
    amount_cents: Option<i64>,
    currency: Option<String>,
) -> Result<ConfirmedPayment, WebhookResult> {
    let missing = |field: &str| {
        tracing::warn!(
            reference = %reference,
            "Dropping Stripe payment without correlation metadata: missing {}",
            field
        );
        (StatusCode::OK, "Missing correlation metadata")
    };

    let business_id = metadata
        .business_id
        .clone()
        .filter(|s| !s.is_empty())
        .ok_or_else(|| missing("business_id"))?;
    let user_id = metadata
        .user_id
        .clone()
        .filter(|s| !s.is_empty())
        .ok_or_else(|| missing("user_id"))?;
    let duration_months: u32 = metadata
        .duration_months
        .as_deref()
        .and_then(|s| s.parse().ok())
        .filter(|m| *m > 0)
        .ok_or_else(|| missing("duration_months"))?;

    let discount_cents: i64 = metadata
        .discount_cents
        .as_deref()
        .and_then(|s| s.parse().ok())
        .unwrap_or(0);

    // Fall back to what we quoted if the event omits the settled amount.
    let amount_cents = match amount_cents {
        Some(amount) => amount,
        None => {
            let list: i64 = metadata
                .list_price_cents
                .as_deref()
                .and_then(|s| s.parse().ok())
                .ok_or_else(|| missing("list_price_cents"))?;
            list - discount_cents
        }
    };

    let coupon_code = metadata
        .coupon_code
        .as_deref()
        .map(normalize_coupon_code)
        .filter(|c| !c.is_empty());

    Ok(ConfirmedPayment {
        business_id,
        user_id,
        duration_months,
        coupon_code,
        amount_cents,
        currency: currency
            .map(|c| c.to_lowercase())
            .unwrap_or_else(|| CURRENCY.to_string()),
        discount_cents,
        reference,
    })
}
