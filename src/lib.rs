//! Spotlight - featured-listing entitlements for a business directory
//!
//! Turns payment processor callbacks into time-boxed featured listings, exactly
//! once per payment, and keeps each business's featured flag consistent with
//! its listings. Includes checkout initiation, webhook verification, coupon
//! accounting, and the backlink reward path.

pub mod alerts;
pub mod config;
pub mod db;
pub mod entitlement;
pub mod error;
pub mod extractors;
pub mod handlers;
pub mod id;
pub mod models;
pub mod payments;
pub mod pricing;
pub mod reward;
pub mod util;
