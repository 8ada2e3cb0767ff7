//! Shared types for the order core.
//!
//! Newtype identifiers keep the many UUID-keyed entities from being mixed up
//! at call sites, and [`Money`] keeps all arithmetic in integer minor units.

mod ids;
mod money;

pub use ids::{CustomerId, OrderId, OrderItemId, OrderNumber, ProductId, ReturnRequestId};
pub use money::Money;
