//! Operational alerts.
//!
//! When `ALERT_WEBHOOK_URL` is set, failures that need a human (a verified
//! payment that could not be activated, a coupon that could not be counted)
//! are POSTed there as JSON. The error log line carrying `alert = true` is
//! always written first; the webhook is a best-effort copy of it.

use std::panic::AssertUnwindSafe;
use std::time::Duration;

use futures::FutureExt;
use reqwest::Client;
use serde::Serialize;

use crate::models::ReconciliationKind;

/// Retry delays in milliseconds. Total worst case: 300ms.
const ALERT_RETRY_DELAYS: &[u64] = &[100, 200];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Warning,
    Critical,
}

#[derive(Debug, Clone, Serialize)]
pub struct OperationalAlert {
    /// Same vocabulary as reconciliation notes
    pub kind: ReconciliationKind,
    pub severity: Severity,
    pub payment_reference: String,
    pub business_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note_id: Option<String>,
    pub details: String,
    /// Unix timestamp
    pub timestamp: i64,
}

/// Spawn a fire-and-forget alert delivery.
///
/// No-op when no alert URL is configured. Panics in the spawned task are
/// logged rather than silently swallowed.
pub fn spawn_operational_alert(client: Client, alert_url: Option<String>, alert: OperationalAlert) {
    if let Some(url) = alert_url {
        let reference = alert.payment_reference.clone();
        tokio::spawn(
            AssertUnwindSafe(async move {
                send_alert(&client, &url, &alert).await;
            })
            .catch_unwind()
            .map(move |result| {
                if let Err(panic) = result {
                    let panic_msg = panic
                        .downcast_ref::<&str>()
                        .map(|s| s.to_string())
                        .or_else(|| panic.downcast_ref::<String>().cloned())
                        .unwrap_or_else(|| "unknown panic".to_string());
                    tracing::error!(
                        "Alert task panicked for reference '{}': {}",
                        reference,
                        panic_msg
                    );
                }
            }),
        );
    }
}

async fn send_alert(client: &Client, url: &str, alert: &OperationalAlert) {
    for (attempt, delay_ms) in std::iter::once(&0u64)
        .chain(ALERT_RETRY_DELAYS.iter())
        .enumerate()
    {
        if attempt > 0 {
            tokio::time::sleep(Duration::from_millis(*delay_ms)).await;
        }

        match client
            .post(url)
            .json(alert)
            .timeout(Duration::from_secs(5))
            .send()
            .await
        {
            Ok(resp) if resp.status().is_success() => return,
            Ok(resp) => {
                tracing::debug!("Alert webhook returned {}", resp.status());
            }
            Err(e) => {
                tracing::debug!("Alert webhook failed: {}", e);
            }
        }
    }

    tracing::warn!(
        reference = %alert.payment_reference,
        "Alert webhook failed after {} attempts",
        ALERT_RETRY_DELAYS.len() + 1
    );
}
