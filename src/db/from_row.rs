//! Row mapping trait and helpers for reducing boilerplate in queries.

use rusqlite::{Connection, OptionalExtension, Row, ToSql};

use crate::models::*;

/// Parse a string column into an enum type, converting parse errors to rusqlite errors
/// instead of panicking on unexpected values.
fn parse_enum<T: std::str::FromStr>(row: &Row, col: usize, col_name: &str) -> rusqlite::Result<T> {
    row.get::<_, String>(col)?.parse::<T>().map_err(|_| {
        rusqlite::Error::InvalidColumnType(col, col_name.to_string(), rusqlite::types::Type::Text)
    })
}

/// Trait for constructing a type from a database row.
pub trait FromRow: Sized {
    fn from_row(row: &Row) -> rusqlite::Result<Self>;
}

/// Query for a single optional result.
pub fn query_one<T: FromRow>(
    conn: &Connection,
    sql: &str,
    params: &[&dyn ToSql],
) -> crate::error::Result<Option<T>> {
    conn.query_row(sql, params, T::from_row)
        .optional()
        .map_err(Into::into)
}

/// Query for multiple results.
pub fn query_all<T: FromRow>(
    conn: &Connection,
    sql: &str,
    params: &[&dyn ToSql],
) -> crate::error::Result<Vec<T>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt
        .query_map(params, T::from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

// ============ SQL SELECT Constants ============

pub const BUSINESS_COLS: &str =
    "id, name, owner_id, status, featured, featured_until, created_at, updated_at";

pub const FEATURED_LISTING_COLS: &str = "id, business_id, user_id, payment_reference, amount_cents, currency, duration_months, starts_at, expires_at, coupon_code, discount_cents, active, created_at";

pub const COUPON_COLS: &str = "id, code, discount_kind, discount_value, times_used, max_uses, valid_from, valid_until, active, created_at";

pub const RECONCILIATION_NOTE_COLS: &str = "id, kind, payment_reference, business_id, featured_listing_id, coupon_code, details, created_at, resolved_at";

// ============ FromRow Implementations ============

impl FromRow for Business {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Business {
            id: row.get(0)?,
            name: row.get(1)?,
            owner_id: row.get(2)?,
            status: parse_enum(row, 3, "status")?,
            featured: row.get::<_, i32>(4)? != 0,
            featured_until: row.get(5)?,
            created_at: row.get(6)?,
            updated_at: row.get(7)?,
        })
    }
}

impl FromRow for FeaturedListing {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(FeaturedListing {
            id: row.get(0)?,
            business_id: row.get(1)?,
            user_id: row.get(2)?,
            payment_reference: row.get(3)?,
            amount_cents: row.get(4)?,
            currency: row.get(5)?,
            duration_months: row.get(6)?,
            starts_at: row.get(7)?,
            expires_at: row.get(8)?,
            coupon_code: row.get(9)?,
            discount_cents: row.get(10)?,
            active: row.get::<_, i32>(11)? != 0,
            created_at: row.get(12)?,
        })
    }
}

impl FromRow for Coupon {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Coupon {
            id: row.get(0)?,
            code: row.get(1)?,
            discount_kind: parse_enum(row, 2, "discount_kind")?,
            discount_value: row.get(3)?,
            times_used: row.get(4)?,
            max_uses: row.get(5)?,
            valid_from: row.get(6)?,
            valid_until: row.get(7)?,
            active: row.get::<_, i32>(8)? != 0,
            created_at: row.get(9)?,
        })
    }
}

impl FromRow for ReconciliationNote {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(ReconciliationNote {
            id: row.get(0)?,
            kind: parse_enum(row, 1, "kind")?,
            payment_reference: row.get(2)?,
            business_id: row.get(3)?,
            featured_listing_id: row.get(4)?,
            coupon_code: row.get(5)?,
            details: row.get(6)?,
            created_at: row.get(7)?,
            resolved_at: row.get(8)?,
        })
    }
}
