mod stripe;

pub use stripe::*;

use async_trait::async_trait;
use thiserror::Error;

use crate::error::AppError;

/// Correlation data attached to every checkout session.
///
/// Copied verbatim into the processor's metadata so the completion callback
/// carries everything the activator needs without a local pending-purchase row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutMetadata {
    pub business_id: String,
    pub user_id: String,
    pub duration_months: u32,
    pub coupon_code: Option<String>,
    pub list_price_cents: i64,
    pub discount_cents: i64,
}

impl CheckoutMetadata {
    /// Key/value pairs as stored in processor metadata. Values are strings on the wire.
    pub fn to_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = vec![
            (meta::BUSINESS_ID, self.business_id.clone()),
            (meta::USER_ID, self.user_id.clone()),
            (meta::DURATION_MONTHS, self.duration_months.to_string()),
            (meta::LIST_PRICE_CENTS, self.list_price_cents.to_string()),
            (meta::DISCOUNT_CENTS, self.discount_cents.to_string()),
        ];
        if let Some(code) = &self.coupon_code {
            pairs.push((meta::COUPON_CODE, code.clone()));
        }
        pairs
    }
}

/// Metadata keys shared by session creation and webhook parsing.
pub mod meta {
    pub const BUSINESS_ID: &str = "business_id";
    pub const USER_ID: &str = "user_id";
    pub const DURATION_MONTHS: &str = "duration_months";
    pub const COUPON_CODE: &str = "coupon_code";
    pub const LIST_PRICE_CENTS: &str = "list_price_cents";
    pub const DISCOUNT_CENTS: &str = "discount_cents";
}

#[derive(Debug, Clone)]
pub struct CheckoutSessionRequest {
    pub amount_cents: i64,
    pub currency: String,
    pub description: String,
    pub success_url: String,
    pub cancel_url: String,
    pub metadata: CheckoutMetadata,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutSession {
    pub id: String,
    pub url: String,
}

#[derive(Debug, Error)]
pub enum ProcessorError {
    #[error("processor request timed out")]
    Timeout,

    #[error("processor unreachable: {0}")]
    Unreachable(String),

    #[error("processor returned {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("unexpected processor response: {0}")]
    InvalidResponse(String),
}

impl ProcessorError {
    /// Whether the caller may simply try again.
    pub fn is_transient(&self) -> bool {
        match self {
            ProcessorError::Timeout | ProcessorError::Unreachable(_) => true,
            ProcessorError::Rejected { status, .. } => *status == 429 || *status >= 500,
            ProcessorError::InvalidResponse(_) => false,
        }
    }
}

impl From<ProcessorError> for AppError {
    fn from(err: ProcessorError) -> Self {
        if err.is_transient() {
            AppError::Unavailable(err.to_string())
        } else {
            AppError::Internal(err.to_string())
        }
    }
}

/// Opens hosted checkout sessions with the payment processor.
///
/// Implementations must not touch local state: a failed or timed-out call
/// leaves nothing behind to clean up.
#[async_trait]
pub trait CheckoutProcessor: Send + Sync {
    async fn create_checkout_session(
        &self,
        request: &CheckoutSessionRequest,
    ) -> Result<CheckoutSession, ProcessorError>;
}
