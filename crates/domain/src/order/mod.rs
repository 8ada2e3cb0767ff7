//! Order aggregate and related types.

mod aggregate;
mod events;
mod records;
mod status;

pub use aggregate::{CarrierStatusOutcome, CartItem, Order, OrderItem, Transition};
pub use events::OrderEvent;
pub use records::{Address, CouponUse, PaymentRecord, ShipmentRecord};
pub use status::OrderStatus;

use thiserror::Error;

/// Errors that can occur during order operations.
///
/// These are synchronous validation failures; idempotent transition no-ops are
/// not errors (see [`Transition`]).
#[derive(Debug, Error)]
pub enum OrderError {
    /// Order has no items.
    #[error("order has no items")]
    NoItems,

    /// Invalid quantity.
    #[error("invalid quantity: {quantity} (must be greater than 0)")]
    InvalidQuantity { quantity: u32 },

    /// Invalid price.
    #[error("invalid price: {price} cents (must not be negative)")]
    InvalidPrice { price: i64 },

    /// The actor does not own this order.
    #[error("order does not belong to the requesting customer")]
    NotOwner,

    /// The order is not in the state a user-facing action requires.
    #[error("cannot {action} an order in {status} status")]
    InvalidStatus {
        status: OrderStatus,
        action: &'static str,
    },

    /// Pricing result does not line up with the cart it was computed from.
    #[error("pricing result has {priced} lines for a cart of {cart} lines")]
    PricingMismatch { cart: usize, priced: usize },
}
