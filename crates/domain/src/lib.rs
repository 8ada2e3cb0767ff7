//! Domain layer: the order aggregate, its state machine and audit log, and
//! the return-request aggregate attached to it.
//!
//! Aggregates here are plain persisted documents, not event-sourced streams;
//! the append-only [`OrderEvent`] log inside the order is the audit trail the
//! rest of the system (and customers) read. Webhook-driven transitions are
//! guarded methods that degrade to event-appending no-ops when the order is
//! not in the transition's source state, which is what makes duplicate and
//! out-of-order deliveries safe.

pub mod order;
pub mod returns;

pub use order::{
    Address, CarrierStatusOutcome, CartItem, CouponUse, Order, OrderError, OrderEvent, OrderItem,
    OrderStatus, PaymentRecord, ShipmentRecord, Transition,
};
pub use returns::{RefundRecord, ReturnError, ReturnItem, ReturnRequest, ReturnStatus};
