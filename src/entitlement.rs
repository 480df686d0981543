//! Entitlement activation.
//!
//! Every path that grants featured status (a confirmed payment from either
//! webhook shape, or a promotional reward) goes through [`activate`]. The
//! payment reference is the idempotency key: the first activation for a
//! reference creates the listing, every later one is a no-op.
//!
//! Activation runs inside one `BEGIN IMMEDIATE` transaction, so concurrent
//! deliveries of the same purchase serialize on the database write lock and
//! the loser observes the winner's row.

use rusqlite::{Connection, Transaction, TransactionBehavior};
use thiserror::Error;

use crate::db::queries;
use crate::error::AppError;
use crate::models::{
    Coupon, FeaturedListing, FeaturedState, NewFeaturedListing, NewReconciliationNote,
    ReconciliationKind,
};
use crate::util::add_months;

/// A payment the processor has confirmed, normalized from whichever event shape delivered it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfirmedPayment {
    pub business_id: String,
    pub user_id: String,
    pub duration_months: u32,
    pub coupon_code: Option<String>,
    pub amount_cents: i64,
    pub currency: String,
    pub discount_cents: i64,
    /// PaymentIntent id when the event carries one, otherwise the session or charge id.
    pub reference: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RewardKind {
    Backlink,
}

impl RewardKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RewardKind::Backlink => "backlink",
        }
    }

    /// Tag stored in the listing's coupon column. Not a ledger coupon.
    pub fn coupon_tag(&self) -> &'static str {
        match self {
            RewardKind::Backlink => "BACKLINK_REWARD",
        }
    }

    pub fn duration_months(&self) -> u32 {
        match self {
            RewardKind::Backlink => 1,
        }
    }
}

/// A zero-amount grant issued outside the payment flow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RewardGrant {
    pub business_id: String,
    pub user_id: String,
    pub kind: RewardKind,
}

impl RewardGrant {
    pub fn backlink(business_id: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self {
            business_id: business_id.into(),
            user_id: user_id.into(),
            kind: RewardKind::Backlink,
        }
    }

    /// One reward of each kind per business, ever.
    pub fn reference(&self) -> String {
        format!("reward:{}:{}", self.kind.as_str(), self.business_id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActivationRequest {
    Paid(ConfirmedPayment),
    Reward(RewardGrant),
}

impl ActivationRequest {
    pub fn reference(&self) -> String {
        match self {
            ActivationRequest::Paid(p) => p.reference.clone(),
            ActivationRequest::Reward(r) => r.reference(),
        }
    }

    pub fn business_id(&self) -> &str {
        match self {
            ActivationRequest::Paid(p) => &p.business_id,
            ActivationRequest::Reward(r) => &r.business_id,
        }
    }

    pub fn duration_months(&self) -> u32 {
        match self {
            ActivationRequest::Paid(p) => p.duration_months,
            ActivationRequest::Reward(r) => r.kind.duration_months(),
        }
    }

    /// Coupon whose usage counter this activation must bump. Reward tags are not ledger coupons.
    fn ledger_coupon(&self) -> Option<&str> {
        match self {
            ActivationRequest::Paid(p) => p.coupon_code.as_deref(),
            ActivationRequest::Reward(_) => None,
        }
    }

    fn new_listing(&self, starts_at: i64, expires_at: i64) -> NewFeaturedListing {
        match self {
            ActivationRequest::Paid(p) => NewFeaturedListing {
                business_id: p.business_id.clone(),
                user_id: p.user_id.clone(),
                payment_reference: p.reference.clone(),
                amount_cents: p.amount_cents,
                currency: p.currency.clone(),
                duration_months: p.duration_months,
                starts_at,
                expires_at,
                coupon_code: p.coupon_code.clone(),
                discount_cents: p.discount_cents,
            },
            ActivationRequest::Reward(r) => NewFeaturedListing {
                business_id: r.business_id.clone(),
                user_id: r.user_id.clone(),
                payment_reference: r.reference(),
                amount_cents: 0,
                currency: crate::pricing::CURRENCY.to_string(),
                duration_months: r.kind.duration_months(),
                starts_at,
                expires_at,
                coupon_code: Some(r.kind.coupon_tag().to_string()),
                discount_cents: 0,
            },
        }
    }
}

/// What happened to the coupon attached to an activation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CouponOutcome {
    /// No ledger coupon was attached.
    NotApplicable,
    /// Usage counted.
    Redeemed { code: String },
    /// Usage not counted; the entitlement stands and a note records why.
    /// `note_id` is None only if writing the note itself failed.
    Skipped {
        code: String,
        reason: ReconciliationKind,
        note_id: Option<String>,
    },
}

#[derive(Debug, Clone)]
pub enum ActivationOutcome {
    Activated {
        listing: FeaturedListing,
        state: FeaturedState,
        coupon: CouponOutcome,
    },
    /// The reference was activated before; nothing changed.
    AlreadyProcessed { reference: String },
}

#[derive(Debug, Error)]
pub enum ActivationError {
    #[error("duration must be positive, got {0}")]
    InvalidDuration(u32),

    #[error("expiry out of range for start {starts_at} + {months} months")]
    ExpiryOutOfRange { starts_at: i64, months: u32 },

    #[error("business {0} not found")]
    BusinessNotFound(String),

    #[error(transparent)]
    Store(#[from] AppError),

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
}

/// Turn a confirmed payment or reward into a featured listing, exactly once.
pub fn activate(
    conn: &mut Connection,
    request: &ActivationRequest,
    now: i64,
) -> Result<ActivationOutcome, ActivationError> {
    let months = request.duration_months();
    if months == 0 {
        return Err(ActivationError::InvalidDuration(months));
    }
    let expires_at = add_months(now, months).ok_or(ActivationError::ExpiryOutOfRange {
        starts_at: now,
        months,
    })?;

    let reference = request.reference();
    let business_id = request.business_id();

    let mut tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    if queries::get_featured_listing_by_reference(&tx, &reference)?.is_some() {
        tracing::debug!(reference = %reference, "activation already processed");
        return Ok(ActivationOutcome::AlreadyProcessed { reference });
    }

    if queries::get_business_by_id(&tx, business_id)?.is_none() {
        return Err(ActivationError::BusinessNotFound(business_id.to_string()));
    }

    let listing = match queries::insert_featured_listing(&tx, &request.new_listing(now, expires_at))? {
        Some(listing) => listing,
        None => return Ok(ActivationOutcome::AlreadyProcessed { reference }),
    };

    let state = queries::sync_business_featured(&tx, business_id, now)?
        .ok_or_else(|| ActivationError::BusinessNotFound(business_id.to_string()))?;

    let coupon = match request.ledger_coupon() {
        Some(code) => redeem_coupon(&mut tx, &listing, code, now)?,
        None => CouponOutcome::NotApplicable,
    };

    tx.commit()?;

    tracing::info!(
        reference = %listing.payment_reference,
        business_id = %listing.business_id,
        listing_id = %listing.id,
        expires_at = listing.expires_at,
        "featured listing activated"
    );

    Ok(ActivationOutcome::Activated {
        listing,
        state,
        coupon,
    })
}

/// Count one coupon use for `listing`, or record why it could not be counted.
///
/// Runs in a savepoint so a failure here never takes the entitlement down with it.
fn redeem_coupon(
    tx: &mut Transaction<'_>,
    listing: &FeaturedListing,
    code: &str,
    now: i64,
) -> Result<CouponOutcome, ActivationError> {
    let attempt = {
        let sp = tx.savepoint()?;
        let incremented = queries::try_increment_coupon_usage(&sp, code, now);
        match incremented {
            Ok(incremented) => {
                sp.commit()?;
                Ok(incremented)
            }
            // Dropping the savepoint rolls it back.
            Err(e) => Err(e),
        }
    };

    let (reason, details) = match attempt {
        Ok(true) => {
            return Ok(CouponOutcome::Redeemed {
                code: code.to_string(),
            })
        }
        Ok(false) => match queries::get_coupon_by_code(tx, code) {
            Ok(coupon) => (
                skip_reason(coupon.as_ref(), now),
                format!("coupon {} not redeemable at activation", code),
            ),
            Err(e) => {
                tracing::warn!(
                    reference = %listing.payment_reference,
                    coupon = %code,
                    error = %e,
                    "coupon lookup failed after refused increment"
                );
                (
                    ReconciliationKind::CouponIncrementFailed,
                    format!("coupon {} not counted; lookup failed: {}", code, e),
                )
            }
        },
        Err(e) => {
            tracing::warn!(
                reference = %listing.payment_reference,
                coupon = %code,
                error = %e,
                "coupon increment failed; keeping entitlement"
            );
            (
                ReconciliationKind::CouponIncrementFailed,
                format!("coupon increment failed: {}", e),
            )
        }
    };

    let note = NewReconciliationNote {
        kind: reason,
        payment_reference: listing.payment_reference.clone(),
        business_id: listing.business_id.clone(),
        featured_listing_id: Some(listing.id.clone()),
        coupon_code: Some(code.to_string()),
        details: Some(details),
    };

    let note_id = match queries::create_reconciliation_note(tx, &note) {
        Ok(note) => Some(note.id),
        Err(e) => {
            tracing::error!(
                alert = true,
                reference = %listing.payment_reference,
                business_id = %listing.business_id,
                error = %e,
                "failed to record coupon reconciliation note"
            );
            None
        }
    };

    tracing::warn!(
        reference = %listing.payment_reference,
        coupon = %code,
        reason = reason.as_str(),
        "coupon usage not counted"
    );

    Ok(CouponOutcome::Skipped {
        code: code.to_string(),
        reason,
        note_id,
    })
}

/// Classify a failed conditional increment.
fn skip_reason(coupon: Option<&Coupon>, now: i64) -> ReconciliationKind {
    match coupon {
        Some(c) if c.active && c.max_uses.is_some_and(|max| c.times_used >= max) => {
            let in_window = c.valid_from.map_or(true, |from| from <= now)
                && c.valid_until.map_or(true, |until| now <= until);
            if in_window {
                ReconciliationKind::CouponCapReached
            } else {
                ReconciliationKind::CouponUnavailable
            }
        }
        _ => ReconciliationKind::CouponUnavailable,
    }
}

/// Whether the business has a running featured listing, read from the listings themselves.
pub fn has_current_listing(conn: &Connection, business_id: &str, now: i64) -> crate::error::Result<bool> {
    Ok(queries::latest_featured_expiry(conn, business_id, now)?.is_some())
}

/// Live featured state for a business, repairing the stored copy if it drifted.
///
/// Expired listings are only noticed here, at read time, so a stale `featured`
/// flag after expiry is expected and gets cleared on the next read.
pub fn current_featured_state(
    conn: &Connection,
    business_id: &str,
    now: i64,
) -> crate::error::Result<Option<FeaturedState>> {
    let Some(business) = queries::get_business_by_id(conn, business_id)? else {
        return Ok(None);
    };

    let live = FeaturedState::from_latest_expiry(queries::latest_featured_expiry(conn, business_id, now)?);
    let stored = FeaturedState {
        featured: business.featured,
        featured_until: business.featured_until,
    };

    if stored != live {
        tracing::info!(
            business_id = %business_id,
            stored_featured = stored.featured,
            live_featured = live.featured,
            "featured state out of date, resyncing"
        );
        if let Some(synced) = queries::sync_business_featured(conn, business_id, now)? {
            return Ok(Some(synced));
        }
    }

    Ok(Some(live))
}
