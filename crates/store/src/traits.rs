//! Store traits.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{OrderId, ReturnRequestId};
use domain::{Order, OrderStatus, ReturnRequest, ReturnStatus};
use pricing::Offer;

use crate::Result;

/// Order persistence.
///
/// `find_by_intent` and `find_by_tracking` are equality lookups over indexed
/// fields; reconciliation never scans serialized documents for substrings.
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Inserts a newly created order.
    async fn insert_order(&self, order: &Order) -> Result<()>;

    /// Loads an order by id.
    async fn get_order(&self, id: OrderId) -> Result<Option<Order>>;

    /// Locates an order by its gateway payment-intent id.
    async fn find_by_intent(&self, intent_id: &str) -> Result<Option<Order>>;

    /// Locates an order by its gateway payment id.
    async fn find_by_payment(&self, payment_id: &str) -> Result<Option<Order>>;

    /// Locates an order by its carrier tracking id (AWB).
    async fn find_by_tracking(&self, tracking_id: &str) -> Result<Option<Order>>;

    /// Persists a mutated order only if the stored status still equals
    /// `expected`. Returns `false` when a concurrent writer moved the status
    /// first; callers reload and re-apply.
    async fn update_order_if_status(&self, order: &Order, expected: OrderStatus) -> Result<bool>;

    /// Orders still `PENDING` that were created before `cutoff`. Read-only
    /// feed for the externally scheduled abandoned-order scan.
    async fn find_stale_pending(&self, cutoff: DateTime<Utc>) -> Result<Vec<Order>>;
}

/// Offer persistence. Offers are read-mostly; the usage counter is the only
/// field mutated after creation, and only through [`OfferStore::increment_usage`].
#[async_trait]
pub trait OfferStore: Send + Sync {
    /// Inserts an offer.
    async fn insert_offer(&self, offer: &Offer) -> Result<()>;

    /// Loads an offer by code.
    async fn get_offer(&self, code: &str) -> Result<Option<Offer>>;

    /// Lists all offers.
    async fn list_offers(&self) -> Result<Vec<Offer>>;

    /// Atomically increments the usage counter, re-checking the limit in the
    /// same update. Returns `false` if the limit was already reached, so
    /// concurrent checkouts can never over-redeem.
    async fn increment_usage(&self, code: &str) -> Result<bool>;
}

/// Return-request persistence.
#[async_trait]
pub trait ReturnStore: Send + Sync {
    /// Inserts a newly created return request.
    async fn insert_return(&self, request: &ReturnRequest) -> Result<()>;

    /// Loads a return request by id.
    async fn get_return(&self, id: ReturnRequestId) -> Result<Option<ReturnRequest>>;

    /// All return requests for an order, oldest first.
    async fn list_returns_for_order(&self, order_id: OrderId) -> Result<Vec<ReturnRequest>>;

    /// Persists a mutated request only if the stored status still equals
    /// `expected`.
    async fn update_return_if_status(
        &self,
        request: &ReturnRequest,
        expected: ReturnStatus,
    ) -> Result<bool>;
}
