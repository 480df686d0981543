use axum::{
    extract::rejection::{JsonRejection, PathRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Stable error messages shared between handlers and tests.
pub mod msg {
    pub const BUSINESS_NOT_FOUND: &str = "Business not found";
    pub const BUSINESS_NOT_APPROVED: &str = "Business is not approved";
    pub const NOT_BUSINESS_OWNER: &str = "You do not own this business";
    pub const ALREADY_FEATURED: &str = "Business already has an active featured listing";
    pub const INVALID_DURATION: &str = "Duration must be 1, 3, or 6 months";
    pub const COUPON_NOT_FOUND: &str = "Coupon code not found";
    pub const COUPON_NOT_USABLE: &str = "Coupon code is expired, inactive, or fully redeemed";
    pub const MISSING_USER: &str = "Missing authenticated user";
    pub const INVALID_SIGNATURE_FORMAT: &str = "Invalid signature format";
    pub const INVALID_TIMESTAMP_IN_SIGNATURE: &str = "Invalid timestamp in signature";
    pub const INVALID_WEBHOOK_SECRET: &str = "Invalid webhook secret";
    pub const PROCESSOR_UNAVAILABLE: &str = "Payment processor unavailable, please retry";
}

/// Reasons a checkout request is refused before any processor call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckoutRejection {
    BusinessNotFound,
    BusinessNotApproved,
    NotOwner,
    AlreadyFeatured,
    InvalidDuration,
    CouponNotFound,
    CouponNotUsable,
}

impl CheckoutRejection {
    pub fn code(&self) -> &'static str {
        match self {
            Self::BusinessNotFound => "business_not_found",
            Self::BusinessNotApproved => "business_not_approved",
            Self::NotOwner => "not_owner",
            Self::AlreadyFeatured => "already_featured",
            Self::InvalidDuration => "invalid_duration",
            Self::CouponNotFound => "coupon_not_found",
            Self::CouponNotUsable => "coupon_not_usable",
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            Self::BusinessNotFound => msg::BUSINESS_NOT_FOUND,
            Self::BusinessNotApproved => msg::BUSINESS_NOT_APPROVED,
            Self::NotOwner => msg::NOT_BUSINESS_OWNER,
            Self::AlreadyFeatured => msg::ALREADY_FEATURED,
            Self::InvalidDuration => msg::INVALID_DURATION,
            Self::CouponNotFound => msg::COUPON_NOT_FOUND,
            Self::CouponNotUsable => msg::COUPON_NOT_USABLE,
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::BusinessNotFound => StatusCode::NOT_FOUND,
            Self::NotOwner => StatusCode::FORBIDDEN,
            Self::AlreadyFeatured => StatusCode::CONFLICT,
            Self::BusinessNotApproved
            | Self::InvalidDuration
            | Self::CouponNotFound
            | Self::CouponNotUsable => StatusCode::BAD_REQUEST,
        }
    }
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Checkout rejected: {}", .0.code())]
    Rejected(CheckoutRejection),

    /// Upstream dependency failed in a way a retry may fix.
    #[error("Service unavailable: {0}")]
    Unavailable(String),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Pool error: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<CheckoutRejection> for AppError {
    fn from(rejection: CheckoutRejection) -> Self {
        AppError::Rejected(rejection)
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::BadRequest(rejection.body_text())
    }
}

impl From<PathRejection> for AppError {
    fn from(rejection: PathRejection) -> Self {
        AppError::BadRequest(rejection.body_text())
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    code: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error, code, details) = match &self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "Not found", None, Some(msg.clone())),
            AppError::BadRequest(msg) => {
                (StatusCode::BAD_REQUEST, "Bad request", None, Some(msg.clone()))
            }
            AppError::Unauthorized => (StatusCode::UNAUTHORIZED, "Unauthorized", None, None),
            AppError::Rejected(rejection) => (
                rejection.status(),
                "Checkout rejected",
                Some(rejection.code()),
                Some(rejection.message().to_string()),
            ),
            AppError::Unavailable(msg) => {
                tracing::warn!("Upstream unavailable: {}", msg);
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "Service unavailable",
                    None,
                    Some(msg::PROCESSOR_UNAVAILABLE.to_string()),
                )
            }
            AppError::Database(e) => {
                tracing::error!("Database error: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error", None, None)
            }
            AppError::Pool(e) => {
                tracing::error!("Pool error: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error", None, None)
            }
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error", None, None)
            }
        };

        let body = ErrorResponse {
            error: error.to_string(),
            code,
            details,
        };

        (status, Json(body)).into_response()
    }
}

/// Convert `Option<T>` lookups into `AppError::NotFound`.
pub trait OptionExt<T> {
    fn or_not_found(self, msg: &str) -> Result<T>;
}

impl<T> OptionExt<T> for Option<T> {
    fn or_not_found(self, msg: &str) -> Result<T> {
        self.ok_or_else(|| AppError::NotFound(msg.to_string()))
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
