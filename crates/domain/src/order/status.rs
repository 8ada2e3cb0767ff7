//! Order status state machine.

use serde::{Deserialize, Serialize};

/// The status of an order in its lifecycle.
///
/// Transitions:
/// ```text
/// Pending ──► Confirmed ──► Processing ──► Shipped ──► Delivered
///    │                          │
///    └──────────────────────────┴──► Cancelled
/// ```
///
/// `Confirmed` and `Processing` may also jump straight to `Shipped` (auto-ship
/// after payment capture). Nothing leaves `Delivered` or `Cancelled`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    /// Created at checkout, awaiting payment.
    #[default]
    Pending,

    /// Payment captured and verified.
    Confirmed,

    /// Being fulfilled; shipment not yet registered.
    Processing,

    /// Handed to the carrier, tracking id assigned.
    Shipped,

    /// Carrier reported delivery (terminal).
    Delivered,

    /// Payment failed or order cancelled (terminal).
    Cancelled,
}

impl OrderStatus {
    /// Returns true if payment confirmation may apply in this status.
    pub fn can_confirm(&self) -> bool {
        matches!(self, OrderStatus::Pending)
    }

    /// Returns true if a payment failure may cancel the order. A late failure
    /// notification must never cancel an order that was already captured.
    pub fn can_cancel_for_payment_failure(&self) -> bool {
        matches!(self, OrderStatus::Pending)
    }

    /// Returns true if the order can be cancelled in this status.
    pub fn can_cancel(&self) -> bool {
        matches!(self, OrderStatus::Pending | OrderStatus::Processing)
    }

    /// Returns true if fulfilment can start in this status.
    pub fn can_start_processing(&self) -> bool {
        matches!(self, OrderStatus::Confirmed)
    }

    /// Returns true if a shipment registration may mark the order shipped.
    pub fn can_mark_shipped(&self) -> bool {
        matches!(self, OrderStatus::Confirmed | OrderStatus::Processing)
    }

    /// Returns true if a carrier delivery report may apply.
    pub fn can_deliver(&self) -> bool {
        matches!(
            self,
            OrderStatus::Confirmed | OrderStatus::Processing | OrderStatus::Shipped
        )
    }

    /// Returns true if this is a terminal status.
    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Delivered | OrderStatus::Cancelled)
    }

    /// Returns the status name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "PENDING",
            OrderStatus::Confirmed => "CONFIRMED",
            OrderStatus::Processing => "PROCESSING",
            OrderStatus::Shipped => "SHIPPED",
            OrderStatus::Delivered => "DELIVERED",
            OrderStatus::Cancelled => "CANCELLED",
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_status_is_pending() {
        assert_eq!(OrderStatus::default(), OrderStatus::Pending);
    }

    #[test]
    fn only_pending_can_confirm() {
        assert!(OrderStatus::Pending.can_confirm());
        assert!(!OrderStatus::Confirmed.can_confirm());
        assert!(!OrderStatus::Processing.can_confirm());
        assert!(!OrderStatus::Shipped.can_confirm());
        assert!(!OrderStatus::Delivered.can_confirm());
        assert!(!OrderStatus::Cancelled.can_confirm());
    }

    #[test]
    fn payment_failure_never_cancels_a_captured_order() {
        assert!(OrderStatus::Pending.can_cancel_for_payment_failure());
        assert!(!OrderStatus::Confirmed.can_cancel_for_payment_failure());
        assert!(!OrderStatus::Shipped.can_cancel_for_payment_failure());
        assert!(!OrderStatus::Delivered.can_cancel_for_payment_failure());
    }

    #[test]
    fn cancel_reachable_from_pending_and_processing_only() {
        assert!(OrderStatus::Pending.can_cancel());
        assert!(OrderStatus::Processing.can_cancel());
        assert!(!OrderStatus::Confirmed.can_cancel());
        assert!(!OrderStatus::Shipped.can_cancel());
        assert!(!OrderStatus::Delivered.can_cancel());
        assert!(!OrderStatus::Cancelled.can_cancel());
    }

    #[test]
    fn mark_shipped_from_confirmed_or_processing() {
        assert!(OrderStatus::Confirmed.can_mark_shipped());
        assert!(OrderStatus::Processing.can_mark_shipped());
        assert!(!OrderStatus::Pending.can_mark_shipped());
        assert!(!OrderStatus::Shipped.can_mark_shipped());
    }

    #[test]
    fn terminal_statuses() {
        assert!(OrderStatus::Delivered.is_terminal());
        assert!(OrderStatus::Cancelled.is_terminal());
        assert!(!OrderStatus::Pending.is_terminal());
        assert!(!OrderStatus::Shipped.is_terminal());
    }

    #[test]
    fn serializes_in_screaming_snake_case() {
        let json = serde_json::to_string(&OrderStatus::Pending).unwrap();
        assert_eq!(json, "\"PENDING\"");
    }

    #[test]
    fn display_matches_wire_form() {
        assert_eq!(OrderStatus::Delivered.to_string(), "DELIVERED");
        assert_eq!(OrderStatus::Cancelled.to_string(), "CANCELLED");
    }
}
