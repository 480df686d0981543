//! Static price table for featured listings.
//!
//! The checkout initiator quotes from this table and `GET /featured/pricing`
//! renders the same table, so the amount charged always matches what the
//! buyer was shown.

use serde::Serialize;

pub const CURRENCY: &str = "usd";

/// Smallest amount the processor will charge in USD.
pub const MIN_CHARGE_CENTS: i64 = 50;

/// The purchasable featured durations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(into = "u32")]
pub enum FeaturedDuration {
    OneMonth,
    ThreeMonths,
    SixMonths,
}

pub const ALL_DURATIONS: [FeaturedDuration; 3] = [
    FeaturedDuration::OneMonth,
    FeaturedDuration::ThreeMonths,
    FeaturedDuration::SixMonths,
];

impl FeaturedDuration {
    pub fn from_months(months: u32) -> Option<Self> {
        match months {
            1 => Some(Self::OneMonth),
            3 => Some(Self::ThreeMonths),
            6 => Some(Self::SixMonths),
            _ => None,
        }
    }

    pub fn months(&self) -> u32 {
        match self {
            Self::OneMonth => 1,
            Self::ThreeMonths => 3,
            Self::SixMonths => 6,
        }
    }

    pub fn price_cents(&self) -> i64 {
        match self {
            Self::OneMonth => 3_000,
            Self::ThreeMonths => 7_500,
            Self::SixMonths => 13_500,
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Self::OneMonth => "Featured listing - 1 month",
            Self::ThreeMonths => "Featured listing - 3 months",
            Self::SixMonths => "Featured listing - 6 months",
        }
    }
}

impl From<FeaturedDuration> for u32 {
    fn from(d: FeaturedDuration) -> u32 {
        d.months()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PriceQuote {
    pub duration_months: u32,
    pub price_cents: i64,
    pub currency: &'static str,
    pub description: &'static str,
}

impl From<FeaturedDuration> for PriceQuote {
    fn from(d: FeaturedDuration) -> Self {
        Self {
            duration_months: d.months(),
            price_cents: d.price_cents(),
            currency: CURRENCY,
            description: d.description(),
        }
    }
}

pub fn price_table() -> Vec<PriceQuote> {
    ALL_DURATIONS.iter().copied().map(PriceQuote::from).collect()
}

/// Apply a coupon discount to a list price, returning `(amount, discount)`.
///
/// The discount is reduced so the charge never drops below [`MIN_CHARGE_CENTS`].
pub fn apply_discount(list_price_cents: i64, discount_cents: i64) -> (i64, i64) {
    let max_discount = (list_price_cents - MIN_CHARGE_CENTS).max(0);
    let discount = discount_cents.clamp(0, max_discount);
    (list_price_cents - discount, discount)
}
