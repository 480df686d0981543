//! Shared helpers.

use chrono::{DateTime, Months, Utc};

/// Add whole calendar months to a unix timestamp.
///
/// Day-of-month is clamped to the target month's length (Jan 31 + 1 month =
/// Feb 28/29). Returns None on overflow or for an unrepresentable timestamp.
pub fn add_months(timestamp: i64, months: u32) -> Option<i64> {
    DateTime::<Utc>::from_timestamp(timestamp, 0)?
        .checked_add_months(Months::new(months))
        .map(|dt| dt.timestamp())
}
