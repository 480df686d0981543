//! Backlink-verification reward.
//!
//! Verifying the backlink itself happens elsewhere; once it has, this grants the
//! same entitlement a one-month purchase would, at no charge, through the
//! shared activator.

use rusqlite::Connection;
use thiserror::Error;

use crate::db::queries;
use crate::entitlement::{activate, ActivationError, ActivationOutcome, ActivationRequest, RewardGrant};
use crate::error::AppError;

#[derive(Debug, Error)]
pub enum RewardError {
    #[error("business {0} not found")]
    BusinessNotFound(String),

    #[error("business {0} is not approved")]
    BusinessNotApproved(String),

    #[error("user does not own business {0}")]
    NotOwner(String),

    #[error(transparent)]
    Activation(#[from] ActivationError),

    #[error(transparent)]
    Store(#[from] AppError),
}

/// Grant the backlink reward to `business_id` on behalf of its owner.
///
/// Idempotent per business: a second call returns
/// [`ActivationOutcome::AlreadyProcessed`]. An already-featured business may
/// still receive it; the new listing simply extends `featured_until` if it
/// runs later.
pub fn grant_backlink_reward(
    conn: &mut Connection,
    business_id: &str,
    user_id: &str,
    now: i64,
) -> Result<ActivationOutcome, RewardError> {
    let business = queries::get_business_by_id(conn, business_id)?
        .ok_or_else(|| RewardError::BusinessNotFound(business_id.to_string()))?;

    if !business.is_approved() {
        return Err(RewardError::BusinessNotApproved(business_id.to_string()));
    }
    if business.owner_id != user_id {
        return Err(RewardError::NotOwner(business_id.to_string()));
    }

    let request = ActivationRequest::Reward(RewardGrant::backlink(business_id, user_id));
    let outcome = activate(conn, &request, now)?;

    if let ActivationOutcome::Activated { listing, .. } = &outcome {
        tracing::info!(
            business_id = %business_id,
            expires_at = listing.expires_at,
            "backlink reward granted"
        );
    }

    Ok(outcome)
}
