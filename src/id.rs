//! Prefixed ID generation.
//!
//! IDs carry an `sl_` brand prefix so they can never be confused with processor
//! identifiers (`cs_`, `pi_`, `ch_`) that share the same columns in logs and notes.
//!
//! Format: `sl_{entity}_{uuid_simple}` (32 hex chars, no hyphens)

use uuid::Uuid;

/// Entity types that have prefixed IDs.
#[derive(Debug, Clone, Copy)]
pub enum EntityType {
    Business,
    FeaturedListing,
    Coupon,
    ReconciliationNote,
}

impl EntityType {
    pub fn prefix(&self) -> &'static str {
        match self {
            Self::Business => "sl_biz",
            Self::FeaturedListing => "sl_feat",
            Self::Coupon => "sl_cpn",
            Self::ReconciliationNote => "sl_rec",
        }
    }

    pub fn gen_id(&self) -> String {
        format!("{}_{}", self.prefix(), Uuid::new_v4().as_simple())
    }

    /// Whether `s` looks like an ID of this entity type.
    pub fn matches(&self, s: &str) -> bool {
        s.strip_prefix(self.prefix())
            .and_then(|rest| rest.strip_prefix('_'))
            .is_some_and(|hex| hex.len() == 32 && hex.chars().all(|c| c.is_ascii_hexdigit()))
    }
}
