use axum::{
    extract::State,
    routing::{get, post},
    Router,
};
use chrono::Utc;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};

use crate::db::{queries, AppState};
use crate::entitlement::{current_featured_state, has_current_listing};
use crate::error::{msg, AppError, CheckoutRejection, OptionExt, Result};
use crate::extractors::{ActingUser, Json, Path};
use crate::id::EntityType;
use crate::payments::{CheckoutMetadata, CheckoutSessionRequest, ProcessorError};
use crate::pricing::{self, FeaturedDuration, PriceQuote, CURRENCY};

#[derive(Debug, Deserialize)]
pub struct CheckoutRequest {
    pub business_id: String,
    pub duration_months: u32,
    #[serde(default)]
    pub coupon_code: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CheckoutResponse {
    pub checkout_url: String,
    pub session_id: String,
    /// What the buyer will be charged, after any discount
    pub amount_cents: i64,
    pub currency: &'static str,
    pub duration_months: u32,
    pub list_price_cents: i64,
    pub discount_cents: i64,
}

/// Validate a purchase and price it. Reads only; nothing is written.
fn prepare_checkout(
    conn: &Connection,
    base_url: &str,
    user_id: &str,
    request: &CheckoutRequest,
    now: i64,
) -> Result<CheckoutSessionRequest> {
    let duration = FeaturedDuration::from_months(request.duration_months)
        .ok_or(CheckoutRejection::InvalidDuration)?;

    if !EntityType::Business.matches(&request.business_id) {
        return Err(CheckoutRejection::BusinessNotFound.into());
    }
    let business = queries::get_business_by_id(conn, &request.business_id)?
        .ok_or(CheckoutRejection::BusinessNotFound)?;

    if !business.is_approved() {
        return Err(CheckoutRejection::BusinessNotApproved.into());
    }
    if business.owner_id != user_id {
        return Err(CheckoutRejection::NotOwner.into());
    }
    // Live check against the listings, not the denormalized flag.
    if has_current_listing(conn, &business.id, now)? {
        return Err(CheckoutRejection::AlreadyFeatured.into());
    }

    let list_price = duration.price_cents();
    let (coupon_code, requested_discount) = match request
        .coupon_code
        .as_deref()
        .map(str::trim)
        .filter(|c| !c.is_empty())
    {
        Some(code) => {
            let coupon = queries::get_coupon_by_code(conn, code)?
                .ok_or(CheckoutRejection::CouponNotFound)?;
            if !coupon.is_usable(now) {
                return Err(CheckoutRejection::CouponNotUsable.into());
            }
            let discount = coupon.discount_for(list_price);
            (Some(coupon.code), discount)
        }
        None => (None, 0),
    };

    let (amount_cents, discount_cents) = pricing::apply_discount(list_price, requested_discount);

    Ok(CheckoutSessionRequest {
        amount_cents,
        currency: CURRENCY.to_string(),
        description: duration.description().to_string(),
        success_url: format!(
            "{}/featured/success?business_id={}&session_id={{CHECKOUT_SESSION_ID}}",
            base_url, business.id
        ),
        cancel_url: format!("{}/featured/cancel?business_id={}", base_url, business.id),
        metadata: CheckoutMetadata {
            business_id: business.id,
            user_id: user_id.to_string(),
            duration_months: duration.months(),
            coupon_code,
            list_price_cents: list_price,
            discount_cents,
        },
    })
}

/// `POST /featured/checkout`
///
/// Opens a processor checkout session. No entitlement exists until the
/// processor confirms payment through the webhook.
pub async fn create_checkout(
    State(state): State<AppState>,
    ActingUser(user_id): ActingUser,
    Json(request): Json<CheckoutRequest>,
) -> Result<Json<CheckoutResponse>> {
    let now = Utc::now().timestamp();

    let session_request = {
        let conn = state.db.get()?;
        prepare_checkout(&conn, &state.base_url, &user_id, &request, now)?
    };

    let session = tokio::time::timeout(
        state.checkout_timeout,
        state.processor.create_checkout_session(&session_request),
    )
    .await
    .map_err(|_| ProcessorError::Timeout)?
    .map_err(|e| {
        tracing::warn!(
            business_id = %session_request.metadata.business_id,
            error = %e,
            "checkout session creation failed"
        );
        AppError::from(e)
    })?;

    tracing::info!(
        business_id = %session_request.metadata.business_id,
        session_id = %session.id,
        amount_cents = session_request.amount_cents,
        "checkout session opened"
    );

    let metadata = session_request.metadata;
    Ok(Json(CheckoutResponse {
        checkout_url: session.url,
        session_id: session.id,
        amount_cents: session_request.amount_cents,
        currency: CURRENCY,
        duration_months: metadata.duration_months,
        list_price_cents: metadata.list_price_cents,
        discount_cents: metadata.discount_cents,
    }))
}

#[derive(Debug, Serialize)]
pub struct PricingResponse {
    pub currency: &'static str,
    pub durations: Vec<PriceQuote>,
}

/// `GET /featured/pricing`
pub async fn get_pricing() -> Json<PricingResponse> {
    Json(PricingResponse {
        currency: CURRENCY,
        durations: pricing::price_table(),
    })
}

#[derive(Debug, Serialize)]
pub struct FeaturedStatusResponse {
    pub business_id: String,
    pub featured: bool,
    pub featured_until: Option<i64>,
}

/// `GET /businesses/{id}/featured`
pub async fn get_featured_status(
    State(state): State<AppState>,
    Path(business_id): Path<String>,
) -> Result<Json<FeaturedStatusResponse>> {
    if !EntityType::Business.matches(&business_id) {
        return Err(AppError::NotFound(msg::BUSINESS_NOT_FOUND.into()));
    }

    let conn = state.db.get()?;
    let featured = current_featured_state(&conn, &business_id, Utc::now().timestamp())?
        .or_not_found(msg::BUSINESS_NOT_FOUND)?;

    Ok(Json(FeaturedStatusResponse {
        business_id,
        featured: featured.featured,
        featured_until: featured.featured_until,
    }))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/featured/checkout", post(create_checkout))
        .route("/featured/pricing", get(get_pricing))
        .route("/businesses/{id}/featured", get(get_featured_status))
}
