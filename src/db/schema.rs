use rusqlite::Connection;

/// Initialize the database schema. Safe to call on every startup.
pub fn init_db(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        r#"
        -- Businesses (directory listings). Browsing/search live elsewhere; this
        -- table carries only what the featured engine reads and writes.
        -- featured / featured_until are derived from featured_listings.
        CREATE TABLE IF NOT EXISTS businesses (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            owner_id TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'pending' CHECK (status IN ('pending', 'approved', 'rejected')),
            featured INTEGER NOT NULL DEFAULT 0,
            featured_until INTEGER,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_businesses_owner ON businesses(owner_id);
        CREATE INDEX IF NOT EXISTS idx_businesses_featured ON businesses(featured) WHERE featured = 1;

        -- Featured listings (entitlements). One row per paid checkout or reward.
        -- payment_reference is the idempotency key: processor payment id for
        -- purchases, 'reward:<kind>:<business_id>' for rewards.
        CREATE TABLE IF NOT EXISTS featured_listings (
            id TEXT PRIMARY KEY,
            business_id TEXT NOT NULL REFERENCES businesses(id) ON DELETE CASCADE,
            user_id TEXT NOT NULL,
            payment_reference TEXT NOT NULL UNIQUE,
            amount_cents INTEGER NOT NULL CHECK (amount_cents >= 0),
            currency TEXT NOT NULL,
            duration_months INTEGER NOT NULL CHECK (duration_months > 0),
            starts_at INTEGER NOT NULL,
            expires_at INTEGER NOT NULL,
            coupon_code TEXT,
            discount_cents INTEGER NOT NULL DEFAULT 0,
            active INTEGER NOT NULL DEFAULT 1,
            created_at INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_featured_listings_business ON featured_listings(business_id, active, expires_at);

        -- Coupons. times_used is only ever changed by a conditional UPDATE.
        CREATE TABLE IF NOT EXISTS coupons (
            id TEXT PRIMARY KEY,
            code TEXT NOT NULL UNIQUE,
            discount_kind TEXT NOT NULL CHECK (discount_kind IN ('percentage', 'fixed')),
            discount_value INTEGER NOT NULL CHECK (discount_value >= 0),
            times_used INTEGER NOT NULL DEFAULT 0,
            max_uses INTEGER,
            valid_from INTEGER,
            valid_until INTEGER,
            active INTEGER NOT NULL DEFAULT 1,
            created_at INTEGER NOT NULL,
            CHECK (max_uses IS NULL OR times_used <= max_uses)
        );

        -- Items needing manual reconciliation after a payment was accepted.
        CREATE TABLE IF NOT EXISTS reconciliation_notes (
            id TEXT PRIMARY KEY,
            kind TEXT NOT NULL CHECK (kind IN ('coupon_cap_reached', 'coupon_unavailable', 'coupon_increment_failed', 'activation_failed')),
            payment_reference TEXT NOT NULL,
            business_id TEXT NOT NULL,
            featured_listing_id TEXT,
            coupon_code TEXT,
            details TEXT,
            created_at INTEGER NOT NULL,
            resolved_at INTEGER
        );
        CREATE INDEX IF NOT EXISTS idx_reconciliation_open ON reconciliation_notes(created_at) WHERE resolved_at IS NULL;
        "#,
    )
}
