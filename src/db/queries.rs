use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};

use crate::error::Result;
use crate::id::EntityType;
use crate::models::*;

use super::from_row::{
    query_all, query_one, BUSINESS_COLS, COUPON_COLS, FEATURED_LISTING_COLS,
    RECONCILIATION_NOTE_COLS,
};

fn now() -> i64 {
    Utc::now().timestamp()
}

// ============ Businesses ============

pub fn create_business(conn: &Connection, input: &CreateBusiness) -> Result<Business> {
    let id = EntityType::Business.gen_id();
    let now = now();

    conn.execute(
        "INSERT INTO businesses (id, name, owner_id, status, featured, featured_until, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, 0, NULL, ?5, ?5)",
        params![&id, &input.name, &input.owner_id, input.status.as_str(), now],
    )?;

    Ok(Business {
        id,
        name: input.name.clone(),
        owner_id: input.owner_id.clone(),
        status: input.status,
        featured: false,
        featured_until: None,
        created_at: now,
        updated_at: now,
    })
}

pub fn get_business_by_id(conn: &Connection, id: &str) -> Result<Option<Business>> {
    query_one(
        conn,
        &format!("SELECT {} FROM businesses WHERE id = ?1", BUSINESS_COLS),
        &[&id],
    )
}

/// Rewrite a business's denormalized featured fields from its listings.
///
/// Single statement: the derived values and the write cannot interleave with
/// another writer. Returns None if the business does not exist.
pub fn sync_business_featured(
    conn: &Connection,
    business_id: &str,
    now: i64,
) -> Result<Option<FeaturedState>> {
    let latest: Option<Option<i64>> = conn
        .query_row(
            "UPDATE businesses
             SET featured_until = (
                     SELECT MAX(expires_at) FROM featured_listings
                     WHERE business_id = ?1 AND active = 1 AND expires_at > ?2
                 ),
                 featured = EXISTS (
                     SELECT 1 FROM featured_listings
                     WHERE business_id = ?1 AND active = 1 AND expires_at > ?2
                 ),
                 updated_at = ?2
             WHERE id = ?1
             RETURNING featured_until",
            params![business_id, now],
            |row| row.get(0),
        )
        .optional()?;

    Ok(latest.map(FeaturedState::from_latest_expiry))
}

// ============ Featured Listings ============

/// Latest expiry among active listings that are still running at `now`.
/// Expiry is exclusive: a listing with `expires_at == now` does not count.
pub fn latest_featured_expiry(conn: &Connection, business_id: &str, now: i64) -> Result<Option<i64>> {
    let latest = conn.query_row(
        "SELECT MAX(expires_at) FROM featured_listings
         WHERE business_id = ?1 AND active = 1 AND expires_at > ?2",
        params![business_id, now],
        |row| row.get(0),
    )?;
    Ok(latest)
}

/// Insert a listing unless one already exists for its payment reference.
///
/// The UNIQUE index on `payment_reference` is the claim: of any number of
/// concurrent inserts for one reference, exactly one returns `Some`.
pub fn insert_featured_listing(
    conn: &Connection,
    input: &NewFeaturedListing,
) -> Result<Option<FeaturedListing>> {
    let id = EntityType::FeaturedListing.gen_id();
    let created_at = now();

    let inserted = conn.execute(
        "INSERT INTO featured_listings
            (id, business_id, user_id, payment_reference, amount_cents, currency, duration_months,
             starts_at, expires_at, coupon_code, discount_cents, active, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, 1, ?12)
         ON CONFLICT(payment_reference) DO NOTHING",
        params![
            &id,
            &input.business_id,
            &input.user_id,
            &input.payment_reference,
            input.amount_cents,
            &input.currency,
            input.duration_months,
            input.starts_at,
            input.expires_at,
            &input.coupon_code,
            input.discount_cents,
            created_at,
        ],
    )?;

    if inserted == 0 {
        return Ok(None);
    }

    Ok(Some(FeaturedListing {
        id,
        business_id: input.business_id.clone(),
        user_id: input.user_id.clone(),
        payment_reference: input.payment_reference.clone(),
        amount_cents: input.amount_cents,
        currency: input.currency.clone(),
        duration_months: input.duration_months,
        starts_at: input.starts_at,
        expires_at: input.expires_at,
        coupon_code: input.coupon_code.clone(),
        discount_cents: input.discount_cents,
        active: true,
        created_at,
    }))
}

pub fn get_featured_listing_by_reference(
    conn: &Connection,
    payment_reference: &str,
) -> Result<Option<FeaturedListing>> {
    query_one(
        conn,
        &format!(
            "SELECT {} FROM featured_listings WHERE payment_reference = ?1",
            FEATURED_LISTING_COLS
        ),
        &[&payment_reference],
    )
}

/// All listings for a business, newest first.
pub fn list_featured_listings_for_business(
    conn: &Connection,
    business_id: &str,
) -> Result<Vec<FeaturedListing>> {
    query_all(
        conn,
        &format!(
            "SELECT {} FROM featured_listings WHERE business_id = ?1 ORDER BY starts_at DESC, created_at DESC",
            FEATURED_LISTING_COLS
        ),
        &[&business_id],
    )
}

// ============ Coupons ============

pub fn create_coupon(conn: &Connection, input: &CreateCoupon) -> Result<Coupon> {
    let id = EntityType::Coupon.gen_id();
    let code = normalize_coupon_code(&input.code);
    let now = now();

    conn.execute(
        "INSERT INTO coupons (id, code, discount_kind, discount_value, times_used, max_uses, valid_from, valid_until, active, created_at)
         VALUES (?1, ?2, ?3, ?4, 0, ?5, ?6, ?7, 1, ?8)",
        params![
            &id,
            &code,
            input.discount_kind.as_str(),
            input.discount_value,
            input.max_uses,
            input.valid_from,
            input.valid_until,
            now,
        ],
    )?;

    Ok(Coupon {
        id,
        code,
        discount_kind: input.discount_kind,
        discount_value: input.discount_value,
        times_used: 0,
        max_uses: input.max_uses,
        valid_from: input.valid_from,
        valid_until: input.valid_until,
        active: true,
        created_at: now,
    })
}

pub fn get_coupon_by_code(conn: &Connection, code: &str) -> Result<Option<Coupon>> {
    let code = normalize_coupon_code(code);
    query_one(
        conn,
        &format!("SELECT {} FROM coupons WHERE code = ?1", COUPON_COLS),
        &[&code],
    )
}

pub fn set_coupon_active(conn: &Connection, code: &str, active: bool) -> Result<bool> {
    let affected = conn.execute(
        "UPDATE coupons SET active = ?1 WHERE code = ?2",
        params![active, normalize_coupon_code(code)],
    )?;
    Ok(affected > 0)
}

/// Count one redemption, but only if the coupon is still redeemable at `now`.
///
/// The usability check and the increment are one statement, so two concurrent
/// activations cannot both pass the cap on a stale read. Mirrors
/// [`Coupon::is_usable`].
///
/// Returns:
/// - `Ok(true)` if usage was incremented
/// - `Ok(false)` if the coupon is missing, inactive, out of window, or at its cap
pub fn try_increment_coupon_usage(conn: &Connection, code: &str, now: i64) -> Result<bool> {
    let affected = conn.execute(
        "UPDATE coupons SET times_used = times_used + 1
         WHERE code = ?1
           AND active = 1
           AND (valid_from IS NULL OR valid_from <= ?2)
           AND (valid_until IS NULL OR valid_until >= ?2)
           AND (max_uses IS NULL OR times_used < max_uses)",
        params![normalize_coupon_code(code), now],
    )?;
    Ok(affected > 0)
}

// ============ Reconciliation Notes ============

pub fn create_reconciliation_note(
    conn: &Connection,
    input: &NewReconciliationNote,
) -> Result<ReconciliationNote> {
    let id = EntityType::ReconciliationNote.gen_id();
    let now = now();

    conn.execute(
        "INSERT INTO reconciliation_notes
            (id, kind, payment_reference, business_id, featured_listing_id, coupon_code, details, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            &id,
            input.kind.as_str(),
            &input.payment_reference,
            &input.business_id,
            &input.featured_listing_id,
            &input.coupon_code,
            &input.details,
            now,
        ],
    )?;

    Ok(ReconciliationNote {
        id,
        kind: input.kind,
        payment_reference: input.payment_reference.clone(),
        business_id: input.business_id.clone(),
        featured_listing_id: input.featured_listing_id.clone(),
        coupon_code: input.coupon_code.clone(),
        details: input.details.clone(),
        created_at: now,
        resolved_at: None,
    })
}

pub fn list_open_reconciliation_notes(conn: &Connection) -> Result<Vec<ReconciliationNote>> {
    query_all(
        conn,
        &format!(
            "SELECT {} FROM reconciliation_notes WHERE resolved_at IS NULL ORDER BY created_at",
            RECONCILIATION_NOTE_COLS
        ),
        &[],
    )
}

pub fn list_reconciliation_notes_for_reference(
    conn: &Connection,
    payment_reference: &str,
) -> Result<Vec<ReconciliationNote>> {
    query_all(
        conn,
        &format!(
            "SELECT {} FROM reconciliation_notes WHERE payment_reference = ?1 ORDER BY created_at",
            RECONCILIATION_NOTE_COLS
        ),
        &[&payment_reference],
    )
}

/// Mark a note as handled. Returns false if it does not exist or was already resolved.
pub fn resolve_reconciliation_note(conn: &Connection, id: &str) -> Result<bool> {
    let affected = conn.execute(
        "UPDATE reconciliation_notes SET resolved_at = ?1 WHERE id = ?2 AND resolved_at IS NULL",
        params![now(), id],
    )?;
    Ok(affected > 0)
}
