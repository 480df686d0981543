use serde::{Deserialize, Serialize};

/// One time-boxed grant of featured status, created by a paid checkout or a reward.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeaturedListing {
    pub id: String,
    pub business_id: String,
    pub user_id: String,
    /// Processor payment reference, or a namespaced synthetic key for rewards.
    /// Unique across all rows.
    pub payment_reference: String,
    pub amount_cents: i64,
    pub currency: String,
    pub duration_months: u32,
    pub starts_at: i64,
    pub expires_at: i64,
    pub coupon_code: Option<String>,
    pub discount_cents: i64,
    pub active: bool,
    pub created_at: i64,
}

impl FeaturedListing {
    /// Expiry is exclusive: a listing whose `expires_at == now` is already over.
    pub fn is_current(&self, now: i64) -> bool {
        self.active && self.expires_at > now
    }
}

#[derive(Debug, Clone)]
pub struct NewFeaturedListing {
    pub business_id: String,
    pub user_id: String,
    pub payment_reference: String,
    pub amount_cents: i64,
    pub currency: String,
    pub duration_months: u32,
    pub starts_at: i64,
    pub expires_at: i64,
    pub coupon_code: Option<String>,
    pub discount_cents: i64,
}

/// Featured state of a business as derived from its listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FeaturedState {
    pub featured: bool,
    pub featured_until: Option<i64>,
}

impl FeaturedState {
    pub fn from_latest_expiry(latest_expiry: Option<i64>) -> Self {
        Self {
            featured: latest_expiry.is_some(),
            featured_until: latest_expiry,
        }
    }
}
