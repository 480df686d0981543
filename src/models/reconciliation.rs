use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Why a paid entitlement needs a human to look at it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReconciliationKind {
    /// Coupon hit its cap between checkout and activation; usage not counted.
    CouponCapReached,
    /// Coupon was missing, inactive, or outside its window at activation.
    CouponUnavailable,
    /// Incrementing the coupon counter failed; entitlement was still granted.
    CouponIncrementFailed,
    /// A verified payment could not be turned into an entitlement.
    ActivationFailed,
}

impl ReconciliationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReconciliationKind::CouponCapReached => "coupon_cap_reached",
            ReconciliationKind::CouponUnavailable => "coupon_unavailable",
            ReconciliationKind::CouponIncrementFailed => "coupon_increment_failed",
            ReconciliationKind::ActivationFailed => "activation_failed",
        }
    }
}

impl FromStr for ReconciliationKind {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "coupon_cap_reached" => Ok(ReconciliationKind::CouponCapReached),
            "coupon_unavailable" => Ok(ReconciliationKind::CouponUnavailable),
            "coupon_increment_failed" => Ok(ReconciliationKind::CouponIncrementFailed),
            "activation_failed" => Ok(ReconciliationKind::ActivationFailed),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconciliationNote {
    pub id: String,
    pub kind: ReconciliationKind,
    pub payment_reference: String,
    pub business_id: String,
    pub featured_listing_id: Option<String>,
    pub coupon_code: Option<String>,
    pub details: Option<String>,
    pub created_at: i64,
    pub resolved_at: Option<i64>,
}

#[derive(Debug, Clone)]
pub struct NewReconciliationNote {
    pub kind: ReconciliationKind,
    pub payment_reference: String,
    pub business_id: String,
    pub featured_listing_id: Option<String>,
    pub coupon_code: Option<String>,
    pub details: Option<String>,
}
