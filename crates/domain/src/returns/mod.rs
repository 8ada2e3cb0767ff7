//! Return requests: a secondary state machine attached to an order.
//!
//! Refund amounts are derived, never re-entered: they reproduce the proration
//! frozen on the order items at creation time, so partial refunds always sum
//! to amounts consistent with the original discount.

use chrono::{DateTime, Utc};
use common::{CustomerId, Money, OrderId, OrderItemId, ReturnRequestId};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::order::{Order, OrderItem, OrderStatus};

/// Status of a return request.
///
/// `Pending → Approved → Refunded`, or `Pending → Rejected`. `Rejected` and
/// `Refunded` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReturnStatus {
    #[default]
    Pending,
    Approved,
    Rejected,
    Refunded,
}

impl ReturnStatus {
    /// Returns true if an operator decision (approve/reject) may apply.
    pub fn can_decide(&self) -> bool {
        matches!(self, ReturnStatus::Pending)
    }

    /// Returns true if a refund may be issued.
    pub fn can_refund(&self) -> bool {
        matches!(self, ReturnStatus::Approved)
    }

    /// Returns true if this is a terminal status.
    pub fn is_terminal(&self) -> bool {
        matches!(self, ReturnStatus::Rejected | ReturnStatus::Refunded)
    }

    /// Returns the status name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            ReturnStatus::Pending => "PENDING",
            ReturnStatus::Approved => "APPROVED",
            ReturnStatus::Rejected => "REJECTED",
            ReturnStatus::Refunded => "REFUNDED",
        }
    }
}

impl std::fmt::Display for ReturnStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One returned line: a reference to an order item and a quantity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReturnItem {
    pub order_item_id: OrderItemId,
    pub quantity: u32,
}

/// Issued refund details, recorded once the gateway accepts the refund.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefundRecord {
    pub amount: Money,
    pub gateway_refund_id: String,
}

/// Errors that can occur during return operations.
#[derive(Debug, Error)]
pub enum ReturnError {
    /// Returns can only be opened against delivered orders.
    #[error("order is {status}, returns require a delivered order")]
    OrderNotDelivered { status: OrderStatus },

    /// The actor does not own the order.
    #[error("order does not belong to the requesting customer")]
    NotOwner,

    /// The request contains no items.
    #[error("return request has no items")]
    NoItems,

    /// Referenced order item does not exist on the order.
    #[error("order item {order_item_id} not found on order")]
    UnknownOrderItem { order_item_id: OrderItemId },

    /// Requested quantity exceeds what is still returnable for the item.
    #[error(
        "requested {requested} of order item {order_item_id}, only {remaining} still returnable"
    )]
    QuantityExceedsReturnable {
        order_item_id: OrderItemId,
        requested: u32,
        remaining: u32,
    },

    /// The request is not in the state the operation requires.
    #[error("cannot {action} a return request in {status} status")]
    InvalidStatus {
        status: ReturnStatus,
        action: &'static str,
    },
}

/// Return request aggregate. One order can carry many of these over time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReturnRequest {
    id: ReturnRequestId,
    order_id: OrderId,
    customer_id: CustomerId,
    items: Vec<ReturnItem>,
    reason: String,
    operator_comment: Option<String>,
    status: ReturnStatus,
    refund: Option<RefundRecord>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl ReturnRequest {
    /// Opens a return request against a delivered order.
    ///
    /// `prior` must be all earlier return requests for the same order; every
    /// requested quantity is checked against the item's remaining returnable
    /// quantity (purchased minus already requested or refunded, rejected
    /// requests excluded).
    pub fn create(
        order: &Order,
        prior: &[ReturnRequest],
        customer_id: CustomerId,
        items: Vec<ReturnItem>,
        reason: impl Into<String>,
    ) -> Result<Self, ReturnError> {
        if order.status() != OrderStatus::Delivered {
            return Err(ReturnError::OrderNotDelivered {
                status: order.status(),
            });
        }
        if !order.owned_by(customer_id) {
            return Err(ReturnError::NotOwner);
        }
        if items.is_empty() {
            return Err(ReturnError::NoItems);
        }

        for item in &items {
            let order_item =
                order
                    .item(item.order_item_id)
                    .ok_or(ReturnError::UnknownOrderItem {
                        order_item_id: item.order_item_id,
                    })?;
            // Count duplicates within this request as well.
            let requested_here: u32 = items
                .iter()
                .filter(|i| i.order_item_id == item.order_item_id)
                .map(|i| i.quantity)
                .sum();
            let remaining = remaining_returnable(order_item, prior);
            if item.quantity == 0 || requested_here > remaining {
                return Err(ReturnError::QuantityExceedsReturnable {
                    order_item_id: item.order_item_id,
                    requested: requested_here,
                    remaining,
                });
            }
        }

        let now = Utc::now();
        Ok(Self {
            id: ReturnRequestId::new(),
            order_id: order.id(),
            customer_id,
            items,
            reason: reason.into(),
            operator_comment: None,
            status: ReturnStatus::Pending,
            refund: None,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn id(&self) -> ReturnRequestId {
        self.id
    }

    pub fn order_id(&self) -> OrderId {
        self.order_id
    }

    pub fn customer_id(&self) -> CustomerId {
        self.customer_id
    }

    pub fn items(&self) -> &[ReturnItem] {
        &self.items
    }

    pub fn reason(&self) -> &str {
        &self.reason
    }

    pub fn operator_comment(&self) -> Option<&str> {
        self.operator_comment.as_deref()
    }

    pub fn status(&self) -> ReturnStatus {
        self.status
    }

    pub fn refund(&self) -> Option<&RefundRecord> {
        self.refund.as_ref()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Quantity of the given order item covered by this request. Rejected
    /// requests hold nothing back.
    pub fn quantity_held(&self, order_item_id: OrderItemId) -> u32 {
        if self.status == ReturnStatus::Rejected {
            return 0;
        }
        self.items
            .iter()
            .filter(|i| i.order_item_id == order_item_id)
            .map(|i| i.quantity)
            .sum()
    }

    /// `PENDING → APPROVED`, operator decision.
    pub fn approve(&mut self, comment: Option<String>) -> Result<(), ReturnError> {
        if !self.status.can_decide() {
            return Err(ReturnError::InvalidStatus {
                status: self.status,
                action: "approve",
            });
        }
        self.status = ReturnStatus::Approved;
        self.operator_comment = comment;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// `PENDING → REJECTED`, operator decision, terminal.
    pub fn reject(&mut self, comment: Option<String>) -> Result<(), ReturnError> {
        if !self.status.can_decide() {
            return Err(ReturnError::InvalidStatus {
                status: self.status,
                action: "reject",
            });
        }
        self.status = ReturnStatus::Rejected;
        self.operator_comment = comment;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Computes the refund owed for this request from the order's frozen
    /// proration: Σ `(unit_price − discount_per_unit) × quantity`.
    pub fn refund_amount(&self, order: &Order) -> Result<Money, ReturnError> {
        let mut amount = Money::zero();
        for item in &self.items {
            let order_item =
                order
                    .item(item.order_item_id)
                    .ok_or(ReturnError::UnknownOrderItem {
                        order_item_id: item.order_item_id,
                    })?;
            amount += order_item.net_unit_price().multiply(item.quantity);
        }
        Ok(amount)
    }

    /// `APPROVED → REFUNDED` once the gateway accepted the refund, terminal.
    pub fn mark_refunded(
        &mut self,
        amount: Money,
        gateway_refund_id: impl Into<String>,
    ) -> Result<(), ReturnError> {
        if !self.status.can_refund() {
            return Err(ReturnError::InvalidStatus {
                status: self.status,
                action: "refund",
            });
        }
        self.status = ReturnStatus::Refunded;
        self.refund = Some(RefundRecord {
            amount,
            gateway_refund_id: gateway_refund_id.into(),
        });
        self.updated_at = Utc::now();
        Ok(())
    }
}

/// How many units of `order_item` can still be requested for return, given
/// all prior return requests for its order.
pub fn remaining_returnable(order_item: &OrderItem, prior: &[ReturnRequest]) -> u32 {
    let held: u32 = prior
        .iter()
        .map(|request| request.quantity_held(order_item.id))
        .sum();
    order_item.quantity.saturating_sub(held)
}
