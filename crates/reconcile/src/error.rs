//! Reconciliation error types.

use common::{OrderId, ReturnRequestId};
use domain::{OrderError, ReturnError};
use pricing::OfferRejection;
use store::StoreError;
use thiserror::Error;

/// Errors that can occur during reconciliation operations.
#[derive(Debug, Error)]
pub enum ReconcileError {
    /// Order not found.
    #[error("order not found: {0}")]
    OrderNotFound(OrderId),

    /// Return request not found.
    #[error("return request not found: {0}")]
    ReturnNotFound(ReturnRequestId),

    /// Webhook signature did not verify; the payload is treated as forged.
    #[error("webhook signature verification failed")]
    BadSignature,

    /// Order validation error.
    #[error("order error: {0}")]
    Order(#[from] OrderError),

    /// Return validation error.
    #[error("return error: {0}")]
    Return(#[from] ReturnError),

    /// Coupon was rejected at checkout.
    #[error("coupon rejected: {0}")]
    CouponRejected(#[from] OfferRejection),

    /// Store error.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Payment gateway call failed.
    #[error("payment gateway error: {0}")]
    Gateway(String),

    /// Shipping carrier call failed.
    #[error("shipping carrier error: {0}")]
    Carrier(String),

    /// A refund was requested for an order with no captured payment.
    #[error("order {0} has no captured payment to refund against")]
    NoCapturedPayment(OrderId),

    /// Malformed webhook or request payload.
    #[error("malformed payload: {0}")]
    Payload(#[from] serde_json::Error),

    /// Conditional writes kept losing to concurrent writers.
    #[error("gave up after repeated write conflicts on {entity}")]
    WriteContention { entity: &'static str },
}

/// Convenience type alias for reconciliation results.
pub type Result<T> = std::result::Result<T, ReconcileError>;
