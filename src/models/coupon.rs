use std::str::FromStr;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiscountKind {
    /// `discount_value` is a whole percentage (1-100)
    Percentage,
    /// `discount_value` is an amount in cents
    Fixed,
}

impl DiscountKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DiscountKind::Percentage => "percentage",
            DiscountKind::Fixed => "fixed",
        }
    }
}

impl FromStr for DiscountKind {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "percentage" => Ok(DiscountKind::Percentage),
            "fixed" => Ok(DiscountKind::Fixed),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Coupon {
    pub id: String,
    /// Stored upper-case; lookups normalize with [`normalize_coupon_code`].
    pub code: String,
    pub discount_kind: DiscountKind,
    pub discount_value: i64,
    pub times_used: i64,
    /// None = unlimited
    pub max_uses: Option<i64>,
    pub valid_from: Option<i64>,
    pub valid_until: Option<i64>,
    pub active: bool,
    pub created_at: i64,
}

impl Coupon {
    /// Whether the coupon may be redeemed at `now`.
    ///
    /// The validity window is closed on both ends. The same rule is expressed in
    /// SQL by `queries::try_increment_coupon_usage`, which is the authoritative gate;
    /// this method only serves as the checkout-time pre-check.
    pub fn is_usable(&self, now: i64) -> bool {
        if !self.active {
            return false;
        }
        if self.valid_from.is_some_and(|from| now < from) {
            return false;
        }
        if self.valid_until.is_some_and(|until| now > until) {
            return false;
        }
        match self.max_uses {
            Some(max) => self.times_used < max,
            None => true,
        }
    }

    /// Discount in cents for a given list price. Never exceeds the price.
    pub fn discount_for(&self, price_cents: i64) -> i64 {
        let discount = match self.discount_kind {
            DiscountKind::Percentage => price_cents * self.discount_value.clamp(0, 100) / 100,
            DiscountKind::Fixed => self.discount_value.max(0),
        };
        discount.min(price_cents)
    }
}

/// Coupon codes are case-insensitive and whitespace-tolerant.
pub fn normalize_coupon_code(code: &str) -> String {
    code.trim().to_uppercase()
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateCoupon {
    pub code: String,
    pub discount_kind: DiscountKind,
    pub discount_value: i64,
    #[serde(default)]
    pub max_uses: Option<i64>,
    #[serde(default)]
    pub valid_from: Option<i64>,
    #[serde(default)]
    pub valid_until: Option<i64>,
}
