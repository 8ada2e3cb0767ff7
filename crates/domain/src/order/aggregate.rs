//! Order aggregate implementation.

use chrono::{DateTime, Utc};
use common::{CustomerId, Money, OrderId, OrderItemId, OrderNumber, ProductId};
use pricing::{CartLine, PricedCart};
use serde::{Deserialize, Serialize};

use super::{
    Address, CouponUse, OrderError, OrderEvent, OrderStatus, PaymentRecord, ShipmentRecord,
};

/// Outcome of a guarded transition.
///
/// A transition requested outside its source status is not an error: the
/// aggregate appends an audit event and reports `NoOp`, so replayed and
/// out-of-order webhook deliveries converge on the same final state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// The status changed.
    Applied,
    /// The status was left untouched; only the event log grew.
    NoOp,
}

impl Transition {
    /// Returns true if the status changed.
    pub fn is_applied(&self) -> bool {
        matches!(self, Transition::Applied)
    }
}

/// Domain meaning of a carrier-reported status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CarrierStatusOutcome {
    /// Mapped to a delivery.
    Delivered,
    /// Mapped to a cancellation.
    Cancelled,
    /// No domain meaning assigned (e.g. in-transit, return-to-origin);
    /// recorded in the event log only.
    Unmapped,
}

/// A line item snapshot frozen at purchase time.
///
/// `unit_price` and `discount_per_unit` are never recomputed after creation;
/// refunds for this item settle against exactly these figures.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderItem {
    pub id: OrderItemId,
    pub product_id: ProductId,
    pub name: String,
    pub quantity: u32,
    pub unit_price: Money,
    pub discount_per_unit: Money,
}

impl OrderItem {
    /// Price of one unit net of its frozen discount share.
    pub fn net_unit_price(&self) -> Money {
        (self.unit_price - self.discount_per_unit).clamp_non_negative()
    }
}

/// Checkout input for one cart line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartItem {
    pub product_id: ProductId,
    pub name: String,
    pub category_id: Option<String>,
    pub quantity: u32,
    pub unit_price: Money,
}

impl CartItem {
    /// Projects this item to the pricing engine's view of a cart line.
    pub fn to_line(&self) -> CartLine {
        CartLine {
            product_id: self.product_id.clone(),
            category_id: self.category_id.clone(),
            quantity: self.quantity,
            unit_price: self.unit_price,
        }
    }
}

/// Order aggregate root.
///
/// Created once at checkout and thereafter mutated only through the guarded
/// transition methods below; `status` moves forward along the allowed graph
/// and never backward. Persisting a mutation is the store's job and must use
/// a status-predicated conditional write (see `store::OrderStore`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    id: OrderId,
    number: OrderNumber,
    customer_id: CustomerId,
    shipping_address: Option<Address>,
    billing_address: Option<Address>,
    subtotal: Money,
    tax: Money,
    shipping_cost: Money,
    discount_total: Money,
    total: Money,
    status: OrderStatus,
    coupon: Option<CouponUse>,
    payment: Option<PaymentRecord>,
    shipment: Option<ShipmentRecord>,
    items: Vec<OrderItem>,
    events: Vec<OrderEvent>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

// Creation
impl Order {
    /// Creates a `PENDING` order from a cart and its pricing result.
    ///
    /// Item prices and per-unit discount shares are snapshotted from `priced`
    /// and frozen; the first audit event is appended.
    #[allow(clippy::too_many_arguments)]
    pub fn create(
        customer_id: CustomerId,
        items: &[CartItem],
        priced: &PricedCart,
        coupon: Option<CouponUse>,
        tax: Money,
        shipping_cost: Money,
        shipping_address: Option<Address>,
        billing_address: Option<Address>,
    ) -> Result<Self, OrderError> {
        if items.is_empty() {
            return Err(OrderError::NoItems);
        }
        if priced.lines.len() != items.len() {
            return Err(OrderError::PricingMismatch {
                cart: items.len(),
                priced: priced.lines.len(),
            });
        }
        for item in items {
            if item.quantity == 0 {
                return Err(OrderError::InvalidQuantity {
                    quantity: item.quantity,
                });
            }
            if item.unit_price.is_negative() {
                return Err(OrderError::InvalidPrice {
                    price: item.unit_price.cents(),
                });
            }
        }

        let order_items: Vec<OrderItem> = items
            .iter()
            .zip(&priced.lines)
            .map(|(item, line)| OrderItem {
                id: OrderItemId::new(),
                product_id: item.product_id.clone(),
                name: item.name.clone(),
                quantity: item.quantity,
                unit_price: item.unit_price,
                discount_per_unit: line.discount_per_unit,
            })
            .collect();

        let total =
            (priced.subtotal + tax + shipping_cost - priced.discount_total).clamp_non_negative();

        let id = OrderId::new();
        let now = Utc::now();
        let mut order = Self {
            id,
            number: OrderNumber::for_order(id),
            customer_id,
            shipping_address,
            billing_address,
            subtotal: priced.subtotal,
            tax,
            shipping_cost,
            discount_total: priced.discount_total,
            total,
            status: OrderStatus::Pending,
            coupon,
            payment: None,
            shipment: None,
            items: order_items,
            events: Vec::new(),
            created_at: now,
            updated_at: now,
        };
        order.append_event("order placed");
        Ok(order)
    }
}

// Query methods
impl Order {
    pub fn id(&self) -> OrderId {
        self.id
    }

    pub fn number(&self) -> &OrderNumber {
        &self.number
    }

    pub fn customer_id(&self) -> CustomerId {
        self.customer_id
    }

    pub fn status(&self) -> OrderStatus {
        self.status
    }

    pub fn subtotal(&self) -> Money {
        self.subtotal
    }

    pub fn tax(&self) -> Money {
        self.tax
    }

    pub fn shipping_cost(&self) -> Money {
        self.shipping_cost
    }

    pub fn discount_total(&self) -> Money {
        self.discount_total
    }

    pub fn total(&self) -> Money {
        self.total
    }

    pub fn coupon(&self) -> Option<&CouponUse> {
        self.coupon.as_ref()
    }

    pub fn payment(&self) -> Option<&PaymentRecord> {
        self.payment.as_ref()
    }

    pub fn shipment(&self) -> Option<&ShipmentRecord> {
        self.shipment.as_ref()
    }

    pub fn items(&self) -> &[OrderItem] {
        &self.items
    }

    /// Looks up a line item by its id.
    pub fn item(&self, id: OrderItemId) -> Option<&OrderItem> {
        self.items.iter().find(|item| item.id == id)
    }

    pub fn events(&self) -> &[OrderEvent] {
        &self.events
    }

    pub fn shipping_address(&self) -> Option<&Address> {
        self.shipping_address.as_ref()
    }

    pub fn billing_address(&self) -> Option<&Address> {
        self.billing_address.as_ref()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Returns true if `customer_id` owns this order.
    pub fn owned_by(&self, customer_id: CustomerId) -> bool {
        self.customer_id == customer_id
    }

    /// Errors unless `customer_id` owns this order.
    pub fn require_owner(&self, customer_id: CustomerId) -> Result<(), OrderError> {
        if self.owned_by(customer_id) {
            Ok(())
        } else {
            Err(OrderError::NotOwner)
        }
    }
}

// Guarded transitions
impl Order {
    /// Attaches the gateway payment intent created for this order.
    ///
    /// Precondition for intent creation (`PENDING`, owner) is checked by the
    /// payment reconciliation service; re-creating an intent replaces the
    /// record while the order is still unpaid.
    pub fn attach_intent(&mut self, record: PaymentRecord) -> Result<(), OrderError> {
        if self.status != OrderStatus::Pending {
            return Err(OrderError::InvalidStatus {
                status: self.status,
                action: "create a payment intent for",
            });
        }
        self.payment = Some(record);
        self.touch();
        Ok(())
    }

    /// `PENDING → CONFIRMED` on verified payment capture.
    ///
    /// A replayed confirmation (webhook racing the client verification call)
    /// lands here with the order already `CONFIRMED` and becomes a no-op.
    pub fn confirm_payment(&mut self, payment_id: &str, signature: &str) -> Transition {
        if !self.status.can_confirm() {
            return self.no_op("payment confirmation ignored");
        }
        if let Some(payment) = self.payment.as_mut() {
            payment.payment_id = Some(payment_id.to_string());
            payment.signature = Some(signature.to_string());
            payment.status = "captured".to_string();
        }
        self.set_status(OrderStatus::Confirmed, "payment captured and verified")
    }

    /// `PENDING → CANCELLED` on a payment-failure notification.
    ///
    /// Never cancels an order that was already captured; a late failure
    /// webhook after a successful capture is recorded as a no-op event.
    pub fn cancel_for_payment_failure(&mut self, reason: &str) -> Transition {
        if !self.status.can_cancel_for_payment_failure() {
            return self.no_op("late payment-failure notification ignored");
        }
        if let Some(payment) = self.payment.as_mut() {
            payment.status = "failed".to_string();
        }
        self.set_status(
            OrderStatus::Cancelled,
            format!("payment failed: {reason}"),
        )
    }

    /// `CONFIRMED → PROCESSING` when fulfilment starts without a registered
    /// shipment (e.g. shipment registration failed and will be retried).
    pub fn start_processing(&mut self, note: &str) -> Transition {
        if !self.status.can_start_processing() {
            return self.no_op("processing request ignored");
        }
        self.set_status(OrderStatus::Processing, note.to_string())
    }

    /// `CONFIRMED/PROCESSING → SHIPPED` once the carrier assigns an AWB.
    pub fn mark_shipped(&mut self, carrier: &str, tracking_id: &str) -> Transition {
        if !self.status.can_mark_shipped() {
            return self.no_op("shipment registration ignored");
        }
        self.shipment = Some(ShipmentRecord {
            carrier: carrier.to_string(),
            tracking_id: tracking_id.to_string(),
            carrier_status: "registered".to_string(),
        });
        self.set_status(
            OrderStatus::Shipped,
            format!("shipment registered with {carrier}, AWB {tracking_id}"),
        )
    }

    /// Applies a carrier-reported status in the carrier's vocabulary.
    ///
    /// Delivery-class statuses advance to `DELIVERED`, cancellation-class
    /// statuses cancel where the graph allows it, and everything else (picked
    /// up, in transit, return-to-origin, ...) is appended to the event log
    /// without touching `status` — ambiguous carrier states are recorded, not
    /// guessed at.
    pub fn apply_carrier_status(&mut self, carrier_status: &str) -> (CarrierStatusOutcome, Transition) {
        if let Some(shipment) = self.shipment.as_mut() {
            shipment.carrier_status = carrier_status.to_string();
        }

        match classify_carrier_status(carrier_status) {
            CarrierStatusOutcome::Delivered => {
                let transition = if self.status.can_deliver() {
                    self.set_status(OrderStatus::Delivered, "delivered by carrier")
                } else {
                    self.no_op("carrier delivery report ignored")
                };
                (CarrierStatusOutcome::Delivered, transition)
            }
            CarrierStatusOutcome::Cancelled => {
                let transition = if self.status.can_cancel() {
                    self.set_status(OrderStatus::Cancelled, "cancelled by carrier")
                } else {
                    self.no_op("carrier cancellation report ignored")
                };
                (CarrierStatusOutcome::Cancelled, transition)
            }
            CarrierStatusOutcome::Unmapped => {
                self.append_event(format!("carrier status update: {carrier_status}"));
                (CarrierStatusOutcome::Unmapped, Transition::NoOp)
            }
        }
    }
}

// Internal helpers
impl Order {
    fn set_status(&mut self, status: OrderStatus, note: impl Into<String>) -> Transition {
        self.status = status;
        self.append_event(note);
        Transition::Applied
    }

    fn no_op(&mut self, what: &str) -> Transition {
        let note = format!("{what} in {} status", self.status);
        tracing::info!(order_id = %self.id, %note, "idempotent no-op transition");
        self.append_event(note);
        Transition::NoOp
    }

    fn append_event(&mut self, note: impl Into<String>) {
        self.events.push(OrderEvent::now(self.status, note));
        self.touch();
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

fn classify_carrier_status(carrier_status: &str) -> CarrierStatusOutcome {
    let normalized = carrier_status.trim().to_ascii_lowercase();
    match normalized.as_str() {
        "delivered" => CarrierStatusOutcome::Delivered,
        "canceled" | "cancelled" => CarrierStatusOutcome::Cancelled,
        _ => CarrierStatusOutcome::Unmapped,
    }
}
