//! In-memory store implementation for tests and local development.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{OrderId, ReturnRequestId};
use domain::{Order, OrderStatus, ReturnRequest, ReturnStatus};
use pricing::Offer;
use tokio::sync::RwLock;

use crate::traits::{OfferStore, OrderStore, ReturnStore};
use crate::{Result, StoreError};

/// In-memory implementation of all three store traits.
///
/// Guarded updates are performed under the write lock, giving the same
/// check-and-swap semantics as the Postgres conditional `UPDATE`.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    orders: Arc<RwLock<HashMap<OrderId, Order>>>,
    offers: Arc<RwLock<HashMap<String, Offer>>>,
    returns: Arc<RwLock<HashMap<ReturnRequestId, ReturnRequest>>>,
}

impl InMemoryStore {
    /// Creates a new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of stored orders.
    pub async fn order_count(&self) -> usize {
        self.orders.read().await.len()
    }
}

#[async_trait]
impl OrderStore for InMemoryStore {
    async fn insert_order(&self, order: &Order) -> Result<()> {
        let mut orders = self.orders.write().await;
        if orders.contains_key(&order.id()) {
            return Err(StoreError::DuplicateKey(order.id().to_string()));
        }
        orders.insert(order.id(), order.clone());
        Ok(())
    }

    async fn get_order(&self, id: OrderId) -> Result<Option<Order>> {
        Ok(self.orders.read().await.get(&id).cloned())
    }

    async fn find_by_intent(&self, intent_id: &str) -> Result<Option<Order>> {
        let orders = self.orders.read().await;
        Ok(orders
            .values()
            .find(|o| o.payment().is_some_and(|p| p.intent_id == intent_id))
            .cloned())
    }

    async fn find_by_payment(&self, payment_id: &str) -> Result<Option<Order>> {
        let orders = self.orders.read().await;
        Ok(orders
            .values()
            .find(|o| {
                o.payment()
                    .is_some_and(|p| p.payment_id.as_deref() == Some(payment_id))
            })
            .cloned())
    }

    async fn find_by_tracking(&self, tracking_id: &str) -> Result<Option<Order>> {
        let orders = self.orders.read().await;
        Ok(orders
            .values()
            .find(|o| o.shipment().is_some_and(|s| s.tracking_id == tracking_id))
            .cloned())
    }

    async fn update_order_if_status(&self, order: &Order, expected: OrderStatus) -> Result<bool> {
        let mut orders = self.orders.write().await;
        match orders.get(&order.id()) {
            Some(stored) if stored.status() == expected => {
                orders.insert(order.id(), order.clone());
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn find_stale_pending(&self, cutoff: DateTime<Utc>) -> Result<Vec<Order>> {
        let orders = self.orders.read().await;
        let mut stale: Vec<Order> = orders
            .values()
            .filter(|o| o.status() == OrderStatus::Pending && o.created_at() < cutoff)
            .cloned()
            .collect();
        stale.sort_by_key(Order::created_at);
        Ok(stale)
    }
}

#[async_trait]
impl OfferStore for InMemoryStore {
    async fn insert_offer(&self, offer: &Offer) -> Result<()> {
        let mut offers = self.offers.write().await;
        if offers.contains_key(&offer.code) {
            return Err(StoreError::DuplicateKey(offer.code.clone()));
        }
        offers.insert(offer.code.clone(), offer.clone());
        Ok(())
    }

    async fn get_offer(&self, code: &str) -> Result<Option<Offer>> {
        Ok(self.offers.read().await.get(code).cloned())
    }

    async fn list_offers(&self) -> Result<Vec<Offer>> {
        Ok(self.offers.read().await.values().cloned().collect())
    }

    async fn increment_usage(&self, code: &str) -> Result<bool> {
        let mut offers = self.offers.write().await;
        match offers.get_mut(code) {
            Some(offer) if !offer.usage_exhausted() => {
                offer.usage_count += 1;
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

#[async_trait]
impl ReturnStore for InMemoryStore {
    async fn insert_return(&self, request: &ReturnRequest) -> Result<()> {
        let mut returns = self.returns.write().await;
        if returns.contains_key(&request.id()) {
            return Err(StoreError::DuplicateKey(request.id().to_string()));
        }
        returns.insert(request.id(), request.clone());
        Ok(())
    }

    async fn get_return(&self, id: ReturnRequestId) -> Result<Option<ReturnRequest>> {
        Ok(self.returns.read().await.get(&id).cloned())
    }

    async fn list_returns_for_order(&self, order_id: OrderId) -> Result<Vec<ReturnRequest>> {
        let returns = self.returns.read().await;
        let mut for_order: Vec<ReturnRequest> = returns
            .values()
            .filter(|r| r.order_id() == order_id)
            .cloned()
            .collect();
        for_order.sort_by_key(|r| r.id().to_string());
        Ok(for_order)
    }

    async fn update_return_if_status(
        &self,
        request: &ReturnRequest,
        expected: ReturnStatus,
    ) -> Result<bool> {
        let mut returns = self.returns.write().await;
        match returns.get(&request.id()) {
            Some(stored) if stored.status() == expected => {
                returns.insert(request.id(), request.clone());
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use common::{CustomerId, Money};
    use domain::{CartItem, PaymentRecord};
    use pricing::{OfferKind, price_cart};

    use super::*;

    fn pending_order() -> Order {
        let items = vec![CartItem {
            product_id: "SKU-1".into(),
            name: "Widget".to_string(),
            category_id: None,
            quantity: 1,
            unit_price: Money::from_cents(1000),
        }];
        let lines: Vec<_> = items.iter().map(CartItem::to_line).collect();
        let priced = price_cart(&lines, None);
        Order::create(
            CustomerId::new(),
            &items,
            &priced,
            None,
            Money::zero(),
            Money::zero(),
            None,
            None,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn insert_and_get_order() {
        let store = InMemoryStore::new();
        let order = pending_order();
        store.insert_order(&order).await.unwrap();

        let loaded = store.get_order(order.id()).await.unwrap().unwrap();
        assert_eq!(loaded.id(), order.id());

        assert!(matches!(
            store.insert_order(&order).await,
            Err(StoreError::DuplicateKey(_))
        ));
    }

    #[tokio::test]
    async fn guarded_update_rejects_stale_status() {
        let store = InMemoryStore::new();
        let mut order = pending_order();
        order
            .attach_intent(PaymentRecord::intent("razorpay", "intent_1"))
            .unwrap();
        store.insert_order(&order).await.unwrap();

        // First writer confirms.
        let mut first = store.get_order(order.id()).await.unwrap().unwrap();
        first.confirm_payment("pay_1", "sig");
        assert!(
            store
                .update_order_if_status(&first, OrderStatus::Pending)
                .await
                .unwrap()
        );

        // Second writer raced on the same Pending snapshot and loses.
        let mut second = order.clone();
        second.cancel_for_payment_failure("declined");
        assert!(
            !store
                .update_order_if_status(&second, OrderStatus::Pending)
                .await
                .unwrap()
        );

        let stored = store.get_order(order.id()).await.unwrap().unwrap();
        assert_eq!(stored.status(), OrderStatus::Confirmed);
    }

    #[tokio::test]
    async fn indexed_lookups_by_intent_payment_and_tracking() {
        let store = InMemoryStore::new();
        let mut order = pending_order();
        order
            .attach_intent(PaymentRecord::intent("razorpay", "intent_42"))
            .unwrap();
        order.confirm_payment("pay_42", "sig");
        order.mark_shipped("shiprocket", "AWB-42");
        store.insert_order(&order).await.unwrap();

        let by_intent = store.find_by_intent("intent_42").await.unwrap().unwrap();
        assert_eq!(by_intent.id(), order.id());
        let by_payment = store.find_by_payment("pay_42").await.unwrap().unwrap();
        assert_eq!(by_payment.id(), order.id());
        let by_tracking = store.find_by_tracking("AWB-42").await.unwrap().unwrap();
        assert_eq!(by_tracking.id(), order.id());

        assert!(store.find_by_intent("nope").await.unwrap().is_none());
        assert!(store.find_by_tracking("nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn stale_pending_feed_filters_by_status_and_age() {
        let store = InMemoryStore::new();
        let order = pending_order();
        store.insert_order(&order).await.unwrap();

        let future_cutoff = Utc::now() + chrono::Duration::minutes(5);
        let stale = store.find_stale_pending(future_cutoff).await.unwrap();
        assert_eq!(stale.len(), 1);

        let past_cutoff = Utc::now() - chrono::Duration::minutes(5);
        assert!(store.find_stale_pending(past_cutoff).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn usage_increment_is_guarded_by_the_limit() {
        let store = InMemoryStore::new();
        let offer = Offer::new("SAVE10", OfferKind::Percentage { percent: 10 })
            .with_usage_limit(2);
        store.insert_offer(&offer).await.unwrap();

        assert!(store.increment_usage("SAVE10").await.unwrap());
        assert!(store.increment_usage("SAVE10").await.unwrap());
        // Limit reached: further redemptions are refused.
        assert!(!store.increment_usage("SAVE10").await.unwrap());
        // Unknown code is refused, not an error.
        assert!(!store.increment_usage("NOPE").await.unwrap());

        let stored = store.get_offer("SAVE10").await.unwrap().unwrap();
        assert_eq!(stored.usage_count, 2);
    }
}
