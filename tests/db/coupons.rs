//! Coupon ledger: lookup normalization and the conditional usage increment.

#[path = "../common/mod.rs"]
mod common;
use common::*;

#[test]
fn test_codes_are_stored_upper_case_and_looked_up_case_insensitively() {
    let conn = setup_test_db();
    let coupon = create_test_coupon(&conn, "  spring25 ", DiscountKind::Percentage, 25, None);
    assert_eq!(coupon.code, "SPRING25");

    let found = queries::get_coupon_by_code(&conn, "Spring25")
        .expect("query should succeed")
        .expect("coupon should be found");
    assert_eq!(found.id, coupon.id);
}

#[test]
fn test_duplicate_code_rejected() {
    let conn = setup_test_db();
    create_test_coupon(&conn, "ONCE", DiscountKind::Fixed, 500, None);

    let result = queries::create_coupon(
        &conn,
        &CreateCoupon {
            code: "once".to_string(),
            discount_kind: DiscountKind::Fixed,
            discount_value: 100,
            max_uses: None,
            valid_from: None,
            valid_until: None,
        },
    );
    assert!(result.is_err(), "codes are unique regardless of case");
}

#[test]
fn test_increment_stops_at_cap() {
    let conn = setup_test_db();
    create_test_coupon(&conn, "TWICE", DiscountKind::Fixed, 500, Some(2));
    let now = now();

    assert!(queries::try_increment_coupon_usage(&conn, "TWICE", now).unwrap());
    assert!(queries::try_increment_coupon_usage(&conn, "twice", now).unwrap());
    assert!(
        !queries::try_increment_coupon_usage(&conn, "TWICE", now).unwrap(),
        "third increment must be refused"
    );

    let coupon = queries::get_coupon_by_code(&conn, "TWICE").unwrap().unwrap();
    assert_eq!(coupon.times_used, 2);
    assert!(!coupon.is_usable(now));
}

#[test]
fn test_increment_unlimited_coupon() {
    let conn = setup_test_db();
    create_test_coupon(&conn, "OPEN", DiscountKind::Percentage, 10, None);
    let now = now();

    for _ in 0..5 {
        assert!(queries::try_increment_coupon_usage(&conn, "OPEN", now).unwrap());
    }
    let coupon = queries::get_coupon_by_code(&conn, "OPEN").unwrap().unwrap();
    assert_eq!(coupon.times_used, 5);
}

#[test]
fn test_increment_refused_for_inactive_coupon() {
    let conn = setup_test_db();
    create_test_coupon(&conn, "PAUSED", DiscountKind::Fixed, 500, Some(10));
    assert!(queries::set_coupon_active(&conn, "paused", false).unwrap());

    assert!(!queries::try_increment_coupon_usage(&conn, "PAUSED", now()).unwrap());
    let coupon = queries::get_coupon_by_code(&conn, "PAUSED").unwrap().unwrap();
    assert_eq!(coupon.times_used, 0);
}

#[test]
fn test_increment_respects_validity_window() {
    let conn = setup_test_db();
    let now = now();
    queries::create_coupon(
        &conn,
        &CreateCoupon {
            code: "WINDOW".to_string(),
            discount_kind: DiscountKind::Percentage,
            discount_value: 20,
            max_uses: None,
            valid_from: Some(now - ONE_DAY),
            valid_until: Some(now + ONE_DAY),
        },
    )
    .unwrap();

    assert!(!queries::try_increment_coupon_usage(&conn, "WINDOW", now - 2 * ONE_DAY).unwrap());
    assert!(!queries::try_increment_coupon_usage(&conn, "WINDOW", now + 2 * ONE_DAY).unwrap());

    // Both ends of the window are inclusive.
    assert!(queries::try_increment_coupon_usage(&conn, "WINDOW", now - ONE_DAY).unwrap());
    assert!(queries::try_increment_coupon_usage(&conn, "WINDOW", now + ONE_DAY).unwrap());
}

#[test]
fn test_increment_unknown_code_is_not_an_error() {
    let conn = setup_test_db();
    assert!(!queries::try_increment_coupon_usage(&conn, "NOPE", now()).unwrap());
}

#[test]
fn test_predicate_and_sql_gate_agree() {
    let conn = setup_test_db();
    let now = now();
    create_test_coupon(&conn, "LAST", DiscountKind::Fixed, 500, Some(1));

    let before = queries::get_coupon_by_code(&conn, "LAST").unwrap().unwrap();
    assert!(before.is_usable(now));
    assert!(queries::try_increment_coupon_usage(&conn, "LAST", now).unwrap());

    let after = queries::get_coupon_by_code(&conn, "LAST").unwrap().unwrap();
    assert!(!after.is_usable(now));
    assert!(!queries::try_increment_coupon_usage(&conn, "LAST", now).unwrap());
}
