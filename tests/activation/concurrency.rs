//! Concurrent activations against a shared file-backed database.

#[path = "../common/mod.rs"]
mod common;
use common::*;

use std::sync::{Arc, Barrier};

const THREADS: usize = 8;

/// Run `make(i)` on `THREADS` threads released at the same instant.
fn race(db: &TestDb, make: impl Fn(usize) -> ActivationRequest) -> Vec<ActivationOutcome> {
    let barrier = Arc::new(Barrier::new(THREADS));
    let now = now();

    let handles: Vec<_> = (0..THREADS)
        .map(|i| {
            let barrier = Arc::clone(&barrier);
            let pool = db.pool.clone();
            let request = make(i);

            std::thread::spawn(move || {
                let mut conn = pool.get().expect("thread failed to get connection");
                barrier.wait();
                activate(&mut conn, &request, now).expect("activation should not error")
            })
        })
        .collect();

    handles.into_iter().map(|h| h.join().unwrap()).collect()
}

#[test]
fn test_concurrent_deliveries_of_one_payment_create_one_listing() {
    let db = TestDb::new();
    let business = create_approved_business(&db.conn());

    let outcomes = race(&db, |_| paid(confirmed_payment(&business.id, "pi_concurrent")));

    let activated = outcomes
        .iter()
        .filter(|o| matches!(o, ActivationOutcome::Activated { .. }))
        .count();
    assert_eq!(activated, 1, "exactly one delivery activates, got {}", activated);
    assert_eq!(
        outcomes
            .iter()
            .filter(|o| matches!(o, ActivationOutcome::AlreadyProcessed { .. }))
            .count(),
        THREADS - 1
    );

    let conn = db.conn();
    assert_eq!(
        queries::list_featured_listings_for_business(&conn, &business.id)
            .unwrap()
            .len(),
        1
    );
    assert!(queries::get_business_by_id(&conn, &business.id).unwrap().unwrap().featured);
}

#[test]
fn test_last_coupon_use_goes_to_exactly_one_purchase() {
    let db = TestDb::new();
    let (business_ids, _coupon) = {
        let conn = db.conn();
        let ids: Vec<String> = (0..THREADS)
            .map(|_| create_approved_business(&conn).id)
            .collect();
        (ids, create_test_coupon(&conn, "ONLYONE", DiscountKind::Percentage, 50, Some(1)))
    };

    let outcomes = race(&db, |i| {
        let mut payment = confirmed_payment(&business_ids[i], &format!("pi_race_{}", i));
        payment.coupon_code = Some("ONLYONE".to_string());
        paid(payment)
    });

    let mut redeemed = 0;
    let mut capped = 0;
    for outcome in &outcomes {
        match outcome {
            ActivationOutcome::Activated { coupon, .. } => match coupon {
                CouponOutcome::Redeemed { .. } => redeemed += 1,
                CouponOutcome::Skipped {
                    reason: ReconciliationKind::CouponCapReached,
                    ..
                } => capped += 1,
                other => panic!("unexpected coupon outcome {:?}", other),
            },
            other => panic!("every purchase is distinct, got {:?}", other),
        }
    }
    assert_eq!(redeemed, 1);
    assert_eq!(capped, THREADS - 1);

    let conn = db.conn();
    let coupon = queries::get_coupon_by_code(&conn, "ONLYONE").unwrap().unwrap();
    assert_eq!(coupon.times_used, 1, "cap held under contention");

    let notes = queries::list_open_reconciliation_notes(&conn).unwrap();
    assert_eq!(notes.len(), THREADS - 1);

    for id in &business_ids {
        let business = queries::get_business_by_id(&conn, id).unwrap().unwrap();
        assert!(business.featured, "every paying customer is featured");
    }
}

#[test]
fn test_reward_and_purchase_race_on_same_business() {
    let db = TestDb::new();
    let business = create_approved_business(&db.conn());

    let outcomes = race(&db, |i| {
        if i % 2 == 0 {
            ActivationRequest::Reward(RewardGrant::backlink(&business.id, OWNER))
        } else {
            paid(confirmed_payment(&business.id, "pi_alongside_reward"))
        }
    });

    let activated = outcomes
        .iter()
        .filter(|o| matches!(o, ActivationOutcome::Activated { .. }))
        .count();
    assert_eq!(activated, 2, "one reward and one purchase");

    let conn = db.conn();
    let listings = queries::list_featured_listings_for_business(&conn, &business.id).unwrap();
    assert_eq!(listings.len(), 2);

    let latest = listings.iter().map(|l| l.expires_at).max();
    let stored = queries::get_business_by_id(&conn, &business.id).unwrap().unwrap();
    assert_eq!(stored.featured_until, latest);
}
