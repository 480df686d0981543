//! POST /webhook/stripe: signature gate, normalization of both event shapes,
//! and acknowledgment semantics.

#[path = "../common/mod.rs"]
mod common;
use common::*;

use std::sync::Arc;

use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use serde_json::{json, Value};
use tokio::sync::Barrier;
use tower::ServiceExt;

fn webhook_request(payload: &[u8], signature: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri("/webhook/stripe")
        .header("content-type", "application/json");
    if let Some(signature) = signature {
        builder = builder.header("stripe-signature", signature);
    }
    builder.body(Body::from(payload.to_vec())).unwrap()
}

async fn deliver(app: &TestApp, event: &Value) -> (StatusCode, String) {
    let payload = serde_json::to_vec(event).unwrap();
    let signature = sign_webhook(&payload);
    let response = app
        .router()
        .oneshot(webhook_request(&payload, Some(&signature)))
        .await
        .unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, String::from_utf8_lossy(&body).to_string())
}

fn listing_count(app: &TestApp, business_id: &str) -> usize {
    queries::list_featured_listings_for_business(&app.conn(), business_id)
        .unwrap()
        .len()
}

// ============ Signature gate ============

#[tokio::test]
async fn test_missing_signature_rejected_before_parsing() {
    let app = TestApp::new();
    let business = create_approved_business(&app.conn());
    let event = checkout_completed_event(
        "cs_nosig",
        "pi_nosig",
        7_500,
        correlation_metadata(&business.id, 3, None),
    );

    let response = app
        .router()
        .oneshot(webhook_request(&serde_json::to_vec(&event).unwrap(), None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(listing_count(&app, &business.id), 0);
}

#[tokio::test]
async fn test_forged_signature_rejected() {
    let app = TestApp::new();
    let business = create_approved_business(&app.conn());
    let payload = serde_json::to_vec(&checkout_completed_event(
        "cs_forged",
        "pi_forged",
        7_500,
        correlation_metadata(&business.id, 3, None),
    ))
    .unwrap();
    let forged = StripeWebhookVerifier::new("whsec_attacker")
        .header_for(&payload, now())
        .unwrap();

    let response = app
        .router()
        .oneshot(webhook_request(&payload, Some(&forged)))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(listing_count(&app, &business.id), 0);
}

#[tokio::test]
async fn test_signature_over_different_body_rejected() {
    let app = TestApp::new();
    let business = create_approved_business(&app.conn());
    let payload = serde_json::to_vec(&checkout_completed_event(
        "cs_swap",
        "pi_swap",
        7_500,
        correlation_metadata(&business.id, 3, None),
    ))
    .unwrap();
    let signature = sign_webhook(b"{\"type\":\"ping\"}");

    let response = app
        .router()
        .oneshot(webhook_request(&payload, Some(&signature)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_replayed_old_signature_rejected() {
    let app = TestApp::new();
    let payload = b"{\"type\":\"charge.succeeded\"}";
    let stale = StripeWebhookVerifier::new(TEST_WEBHOOK_SECRET)
        .header_for(payload, now() - 600)
        .unwrap();

    let response = app
        .router()
        .oneshot(webhook_request(payload, Some(&stale)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_malformed_signature_header_rejected() {
    let app = TestApp::new();
    for header in ["", "garbage", "t=abc,v1=00", "v1=deadbeef"] {
        let response = app
            .router()
            .oneshot(webhook_request(b"{}", Some(header)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED, "header {:?}", header);
    }
}

// ============ Dispatch ============

#[tokio::test]
async fn test_checkout_completed_activates() {
    let app = TestApp::new();
    let business = create_approved_business(&app.conn());

    let (status, body) = deliver(
        &app,
        &checkout_completed_event(
            "cs_ok",
            "pi_ok",
            7_500,
            correlation_metadata(&business.id, 3, None),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "OK");

    let listing = queries::get_featured_listing_by_reference(&app.conn(), "pi_ok")
        .unwrap()
        .expect("listing keyed by PaymentIntent");
    assert_eq!(listing.amount_cents, 7_500);
    assert_eq!(listing.duration_months, 3);
    assert_eq!(listing.user_id, OWNER);

    let stored = queries::get_business_by_id(&app.conn(), &business.id).unwrap().unwrap();
    assert!(stored.featured);
    assert_eq!(stored.featured_until, Some(listing.expires_at));
}

#[tokio::test]
async fn test_charge_succeeded_alone_activates() {
    let app = TestApp::new();
    let business = create_approved_business(&app.conn());

    let (status, _) = deliver(
        &app,
        &charge_succeeded_event(
            "ch_backup",
            "pi_backup",
            3_000,
            correlation_metadata(&business.id, 1, None),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(listing_count(&app, &business.id), 1);
}

#[tokio::test]
async fn test_both_event_shapes_create_one_listing() {
    let app = TestApp::new();
    let business = create_approved_business(&app.conn());
    let meta = correlation_metadata(&business.id, 3, None);

    let (s1, b1) = deliver(
        &app,
        &charge_succeeded_event("ch_dual", "pi_dual", 7_500, meta.clone()),
    )
    .await;
    let (s2, b2) = deliver(
        &app,
        &checkout_completed_event("cs_dual", "pi_dual", 7_500, meta),
    )
    .await;

    assert_eq!((s1, b1.as_str()), (StatusCode::OK, "OK"));
    assert_eq!((s2, b2.as_str()), (StatusCode::OK, "Already processed"));
    assert_eq!(listing_count(&app, &business.id), 1);
}

#[tokio::test]
async fn test_redelivery_acknowledged_without_changes() {
    let app = TestApp::new();
    let business = create_approved_business(&app.conn());
    let event = checkout_completed_event(
        "cs_retry",
        "pi_retry",
        7_500,
        correlation_metadata(&business.id, 3, None),
    );

    deliver(&app, &event).await;
    let first = queries::get_business_by_id(&app.conn(), &business.id).unwrap().unwrap();

    let (status, body) = deliver(&app, &event).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "Already processed");

    let second = queries::get_business_by_id(&app.conn(), &business.id).unwrap().unwrap();
    assert_eq!(first.featured_until, second.featured_until);
    assert_eq!(listing_count(&app, &business.id), 1);
}

#[tokio::test]
async fn test_unpaid_and_unrelated_events_acknowledged() {
    let app = TestApp::new();
    let business = create_approved_business(&app.conn());

    let mut unpaid = checkout_completed_event(
        "cs_unpaid",
        "pi_unpaid",
        7_500,
        correlation_metadata(&business.id, 3, None),
    );
    unpaid["data"]["object"]["payment_status"] = json!("unpaid");

    let mut failed_charge = charge_succeeded_event(
        "ch_failed",
        "pi_failed",
        7_500,
        correlation_metadata(&business.id, 3, None),
    );
    failed_charge["data"]["object"]["paid"] = json!(false);
    failed_charge["data"]["object"]["status"] = json!("failed");

    let unrelated = json!({
        "id": "evt_x",
        "type": "customer.created",
        "data": { "object": { "id": "cus_1" } }
    });

    for event in [unpaid, failed_charge, unrelated] {
        let (status, _) = deliver(&app, &event).await;
        assert_eq!(status, StatusCode::OK);
    }
    assert_eq!(listing_count(&app, &business.id), 0);
}

#[tokio::test]
async fn test_unusable_payloads_dropped_with_ok() {
    let app = TestApp::new();

    // Valid signature over bytes that are not JSON.
    let payload = b"not json at all";
    let signature = sign_webhook(payload);
    let response = app
        .router()
        .oneshot(webhook_request(payload, Some(&signature)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    // A charge from some other integration on the same account.
    let (status, body) = deliver(
        &app,
        &charge_succeeded_event("ch_foreign", "pi_foreign", 999, json!({})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "Missing correlation metadata");
}

#[tokio::test]
async fn test_activation_failure_acknowledged_and_noted() {
    let app = TestApp::new();
    let ghost = "sl_biz_00000000000000000000000000000000";

    let (status, _) = deliver(
        &app,
        &checkout_completed_event(
            "cs_ghost",
            "pi_ghost",
            7_500,
            correlation_metadata(ghost, 3, None),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::OK, "processor must not retry our failures forever");

    let notes = queries::list_reconciliation_notes_for_reference(&app.conn(), "pi_ghost").unwrap();
    assert_eq!(notes.len(), 1);
    assert_eq!(notes[0].kind, ReconciliationKind::ActivationFailed);
    assert_eq!(notes[0].business_id, ghost);
}

#[tokio::test]
async fn test_coupon_at_cap_on_webhook_keeps_entitlement() {
    let app = TestApp::new();
    let business = create_approved_business(&app.conn());
    create_test_coupon(&app.conn(), "LAST1", DiscountKind::Fixed, 500, Some(1));
    queries::try_increment_coupon_usage(&app.conn(), "LAST1", now()).unwrap();

    let (status, _) = deliver(
        &app,
        &charge_succeeded_event(
            "ch_capped",
            "pi_capped",
            7_000,
            correlation_metadata(&business.id, 3, Some("LAST1")),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let listing = queries::get_featured_listing_by_reference(&app.conn(), "pi_capped")
        .unwrap()
        .expect("entitlement granted");
    assert_eq!(listing.coupon_code.as_deref(), Some("LAST1"));

    let notes = queries::list_reconciliation_notes_for_reference(&app.conn(), "pi_capped").unwrap();
    assert_eq!(notes.len(), 1);
    assert_eq!(notes[0].kind, ReconciliationKind::CouponCapReached);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_deliveries_of_both_shapes() {
    let app = TestApp::new();
    let business = create_approved_business(&app.conn());
    let meta = correlation_metadata(&business.id, 3, None);

    let payloads: Vec<Vec<u8>> = (0..6)
        .map(|i| {
            let event = if i % 2 == 0 {
                checkout_completed_event("cs_storm", "pi_storm", 7_500, meta.clone())
            } else {
                charge_succeeded_event("ch_storm", "pi_storm", 7_500, meta.clone())
            };
            serde_json::to_vec(&event).unwrap()
        })
        .collect();

    let barrier = Arc::new(Barrier::new(payloads.len()));
    let handles: Vec<_> = payloads
        .into_iter()
        .map(|payload| {
            let barrier = barrier.clone();
            let router = app.router();
            tokio::spawn(async move {
                let signature = sign_webhook(&payload);
                barrier.wait().await;
                router
                    .oneshot(webhook_request(&payload, Some(&signature)))
                    .await
                    .unwrap()
            })
        })
        .collect();

    for handle in handles {
        let response = handle.await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    assert_eq!(listing_count(&app, &business.id), 1);
    assert!(queries::list_open_reconciliation_notes(&app.conn())
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn test_session_without_payment_intent_keyed_on_session_id() {
    let app = TestApp::new();
    let business = create_approved_business(&app.conn());
    let mut event = checkout_completed_event(
        "cs_no_pi",
        "unused",
        7_500,
        correlation_metadata(&business.id, 3, None),
    );
    event["data"]["object"]["payment_intent"] = Value::Null;

    let (status, body) = deliver(&app, &event).await;
    assert_eq!((status, body.as_str()), (StatusCode::OK, "OK"));

    let listing = queries::get_featured_listing_by_reference(&app.conn(), "cs_no_pi")
        .unwrap()
        .expect("listing keyed by session id");
    assert_eq!(listing.business_id, business.id);

    let (_, body) = deliver(&app, &event).await;
    assert_eq!(body, "Already processed");
}
