//! Typed sub-records attached to an order.
//!
//! Payment and shipment data are modeled with named, provider-tagged fields
//! rather than opaque serialized blobs; the reconciliation lookup keys
//! (`intent_id`, `tracking_id`) are surfaced by the store as indexed columns.

use common::Money;
use serde::{Deserialize, Serialize};

/// Postal address snapshot referenced by an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Address {
    pub name: String,
    pub line: String,
    pub city: String,
    pub postal_code: String,
    pub phone: String,
}

/// Coupon applied at checkout, frozen thereafter. Re-validating the coupon
/// later must never change a placed order's discount.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CouponUse {
    pub code: String,
    pub discount_total: Money,
}

/// Gateway-side payment state for an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentRecord {
    /// Gateway name, e.g. `"razorpay"`.
    pub gateway: String,
    /// Gateway payment-intent identifier; indexed lookup key for webhooks.
    pub intent_id: String,
    /// Gateway payment identifier, set once the client submits proof.
    pub payment_id: Option<String>,
    /// Verified client signature, kept for audit.
    pub signature: Option<String>,
    /// Last known gateway status, in the gateway's vocabulary.
    pub status: String,
}

impl PaymentRecord {
    /// Creates a record for a freshly created intent.
    pub fn intent(gateway: impl Into<String>, intent_id: impl Into<String>) -> Self {
        Self {
            gateway: gateway.into(),
            intent_id: intent_id.into(),
            payment_id: None,
            signature: None,
            status: "created".to_string(),
        }
    }
}

/// Carrier-side shipment state for an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShipmentRecord {
    /// Carrier name, e.g. `"shiprocket"`.
    pub carrier: String,
    /// Carrier tracking id (AWB); indexed lookup key for webhooks.
    pub tracking_id: String,
    /// Last known carrier status, in the carrier's vocabulary.
    pub carrier_status: String,
}
