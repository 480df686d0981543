mod from_row;
mod schema;
pub mod queries;

pub use schema::init_db;

use std::sync::Arc;
use std::time::Duration;

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;

use crate::payments::{CheckoutProcessor, StripeWebhookVerifier};

pub type DbPool = Pool<SqliteConnectionManager>;

/// How long a connection waits on a locked database before giving up.
/// Activation transactions are short, so contention clears well within this.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Application state shared by all handlers
#[derive(Clone)]
pub struct AppState {
    pub db: DbPool,
    /// Base URL for checkout return pages (e.g., https://directory.example.com)
    pub base_url: String,
    /// Opens checkout sessions with the payment processor
    pub processor: Arc<dyn CheckoutProcessor>,
    /// Upper bound on a single checkout-session call
    pub checkout_timeout: Duration,
    /// Authenticates inbound payment webhooks
    pub webhook_verifier: StripeWebhookVerifier,
    /// Shared client for outbound alert webhooks
    pub http_client: reqwest::Client,
    pub alert_webhook_url: Option<String>,
}

pub fn create_pool(database_path: &str) -> Result<DbPool, r2d2::Error> {
    let manager = SqliteConnectionManager::file(database_path).with_init(|conn| {
        conn.pragma_update(None, "foreign_keys", true)?;
        conn.busy_timeout(BUSY_TIMEOUT)
    });
    Pool::builder().max_size(10).build(manager)
}
