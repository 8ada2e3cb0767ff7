//! Reconciliation services around the order aggregate.
//!
//! Orders are transitioned from two directions at once: synchronous user
//! actions (checkout, payment verification, return requests) and
//! asynchronous, unordered, possibly-duplicated webhook deliveries from the
//! payment gateway and the shipping carrier. Every entry point here is a
//! short-lived unit of work that loads the aggregate, applies a guarded
//! transition, and persists it with a status-predicated conditional write;
//! on a write conflict it reloads and re-applies, which converges because
//! invalid re-applications degrade to event-appending no-ops.

mod carrier;
mod checkout;
mod error;
mod gateway;
mod notifier;
mod payment;
mod returns;
mod shipping;
mod signature;

pub use carrier::{
    CarrierClient, HttpCarrier, HttpCarrierConfig, InMemoryCarrier, ShipmentCreated,
    ShipmentRequest,
};
pub use checkout::{CheckoutRequest, CheckoutService};
pub use error::{ReconcileError, Result};
pub use gateway::{GatewayIntent, GatewayRefund, InMemoryGateway, PaymentGateway};
pub use notifier::{LogNotifier, Notifier, RecordingNotifier};
pub use payment::{
    IntentResponse, PaymentReconciliation, VerifyOutcome, VerifyRequest, WebhookAck,
};
pub use returns::{ReturnDecision, ReturnWorkflow};
pub use shipping::{ShippingReconciliation, ShippingWebhook};
pub use signature::Signer;

/// How many times a conditional write is retried after losing a race before
/// the operation gives up.
pub(crate) const MAX_CAS_ATTEMPTS: u32 = 3;
