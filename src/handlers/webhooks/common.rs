//! Provider-independent half of webhook handling: turning a confirmed payment
//! into an entitlement and reporting what could not be turned.

use axum::http::StatusCode;
use chrono::Utc;

use crate::alerts::{spawn_operational_alert, OperationalAlert, Severity};
use crate::db::{queries, AppState};
use crate::entitlement::{
    activate, ActivationOutcome, ActivationRequest, ConfirmedPayment, CouponOutcome,
};
use crate::models::{NewReconciliationNote, ReconciliationKind};

/// Result type for webhook operations.
pub type WebhookResult = (StatusCode, &'static str);

/// What a provider-specific parser produced from a verified payload.
#[derive(Debug)]
pub enum WebhookEvent {
    PaymentConfirmed(ConfirmedPayment),
    /// Not something we act on; the reason is echoed in the acknowledgment.
    Ignored(&'static str),
}

/// Activate a confirmed payment.
///
/// Always acknowledges with 200: the signature was valid, so the processor has
/// delivered what it had. Anything that went wrong on our side is logged with
/// `alert = true`, noted for reconciliation, and pushed to the alert webhook.
pub fn process_confirmed_payment(state: &AppState, payment: ConfirmedPayment) -> WebhookResult {
    let mut conn = match state.db.get() {
        Ok(c) => c,
        Err(e) => {
            report_activation_failure(state, &payment, &format!("db connection: {}", e));
            return (StatusCode::OK, "Acknowledged");
        }
    };

    let now = Utc::now().timestamp();
    let request = ActivationRequest::Paid(payment.clone());

    match activate(&mut conn, &request, now) {
        Ok(ActivationOutcome::Activated { listing, coupon, .. }) => {
            if let CouponOutcome::Skipped {
                code,
                reason,
                note_id,
            } = coupon
            {
                spawn_operational_alert(
                    state.http_client.clone(),
                    state.alert_webhook_url.clone(),
                    OperationalAlert {
                        kind: reason,
                        severity: Severity::Warning,
                        payment_reference: listing.payment_reference.clone(),
                        business_id: listing.business_id.clone(),
                        note_id,
                        details: format!("coupon {} usage not counted", code),
                        timestamp: now,
                    },
                );
            }
            (StatusCode::OK, "OK")
        }
        Ok(ActivationOutcome::AlreadyProcessed { .. }) => (StatusCode::OK, "Already processed"),
        Err(e) => {
            // Release the connection before reporting, which needs one of its own.
            drop(conn);
            report_activation_failure(state, &payment, &e.to_string());
            (StatusCode::OK, "Acknowledged")
        }
    }
}

/// A verified payment produced no entitlement. Someone has to fix this by hand.
fn report_activation_failure(state: &AppState, payment: &ConfirmedPayment, error: &str) {
    tracing::error!(
        alert = true,
        reference = %payment.reference,
        business_id = %payment.business_id,
        user_id = %payment.user_id,
        amount_cents = payment.amount_cents,
        error = %error,
        "verified payment could not be activated"
    );

    let note = NewReconciliationNote {
        kind: ReconciliationKind::ActivationFailed,
        payment_reference: payment.reference.clone(),
        business_id: payment.business_id.clone(),
        featured_listing_id: None,
        coupon_code: payment.coupon_code.clone(),
        details: Some(error.to_string()),
    };

    let note_id = match state
        .db
        .get()
        .map_err(|e| e.to_string())
        .and_then(|conn| {
            queries::create_reconciliation_note(&conn, &note).map_err(|e| e.to_string())
        }) {
        Ok(note) => Some(note.id),
        Err(e) => {
            tracing::error!(
                alert = true,
                reference = %payment.reference,
                "failed to record activation failure note: {}",
                e
            );
            None
        }
    };

    spawn_operational_alert(
        state.http_client.clone(),
        state.alert_webhook_url.clone(),
        OperationalAlert {
            kind: ReconciliationKind::ActivationFailed,
            severity: Severity::Critical,
            payment_reference: payment.reference.clone(),
            business_id: payment.business_id.clone(),
            note_id,
            details: error.to_string(),
            timestamp: Utc::now().timestamp(),
        },
    );
}
