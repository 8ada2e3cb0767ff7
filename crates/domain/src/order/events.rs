//! Append-only order event log entries.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::OrderStatus;

/// One entry in an order's audit trail.
///
/// Every transition appends one, and so does every idempotent no-op and every
/// unmapped carrier status report, so the log is the complete history even
/// when `status` itself did not move.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderEvent {
    /// Order status as of this entry.
    pub status: OrderStatus,
    /// Human-readable note for audit and customer-facing tracking.
    pub note: String,
    /// When the entry was appended.
    pub at: DateTime<Utc>,
}

impl OrderEvent {
    /// Creates an event stamped with the current time.
    pub fn now(status: OrderStatus, note: impl Into<String>) -> Self {
        Self {
            status,
            note: note.into(),
            at: Utc::now(),
        }
    }
}
