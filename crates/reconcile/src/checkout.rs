//! Checkout: coupon validation, pricing, and order creation.

use std::sync::Arc;

use chrono::{Duration, Utc};
use common::{CustomerId, Money};
use domain::{Address, CartItem, CouponUse, Order};
use pricing::{Offer, OfferRejection, price_cart};
use store::{OfferStore, OrderStore};

use crate::error::{ReconcileError, Result};

/// Everything a checkout needs.
#[derive(Debug, Clone)]
pub struct CheckoutRequest {
    pub customer_id: CustomerId,
    pub items: Vec<CartItem>,
    pub coupon_code: Option<String>,
    pub tax: Money,
    pub shipping_cost: Money,
    pub shipping_address: Option<Address>,
    pub billing_address: Option<Address>,
}

/// Service for placing orders.
pub struct CheckoutService<S> {
    store: Arc<S>,
}

impl<S> CheckoutService<S>
where
    S: OrderStore + OfferStore,
{
    /// Creates a new checkout service.
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Validates the coupon (if any), prices the cart, and persists a
    /// `PENDING` order with frozen line-item snapshots.
    ///
    /// The coupon's usage counter is not touched here; it is incremented at
    /// payment confirmation, so abandoned checkouts never consume a use.
    #[tracing::instrument(skip(self, request), fields(customer_id = %request.customer_id))]
    pub async fn place_order(&self, request: CheckoutRequest) -> Result<Order> {
        let lines: Vec<_> = request.items.iter().map(CartItem::to_line).collect();

        let coupon = match &request.coupon_code {
            Some(code) => {
                let offer = self
                    .store
                    .get_offer(code)
                    .await?
                    .ok_or(ReconcileError::CouponRejected(OfferRejection::NotFound))?;
                let terms = pricing::check(&offer, &lines, Utc::now())?;
                Some((code.clone(), terms))
            }
            None => None,
        };

        let priced = price_cart(&lines, coupon.as_ref().map(|(_, terms)| terms));
        let coupon_use = coupon.map(|(code, _)| CouponUse {
            code,
            discount_total: priced.discount_total,
        });

        let order = Order::create(
            request.customer_id,
            &request.items,
            &priced,
            coupon_use,
            request.tax,
            request.shipping_cost,
            request.shipping_address,
            request.billing_address,
        )?;
        self.store.insert_order(&order).await?;

        metrics::counter!("orders_placed_total").increment(1);
        tracing::info!(order_id = %order.id(), number = %order.number(), total = %order.total(), "order placed");
        Ok(order)
    }

    /// Offers currently applicable to a cart. Read-only, side-effect free.
    pub async fn applicable_offers(&self, items: &[CartItem]) -> Result<Vec<Offer>> {
        let lines: Vec<_> = items.iter().map(CartItem::to_line).collect();
        let offers = self.store.list_offers().await?;
        let now = Utc::now();
        Ok(pricing::find_applicable(&offers, &lines, now)
            .into_iter()
            .cloned()
            .collect())
    }

    /// Orders still `PENDING` after `older_than`. Feed for the externally
    /// scheduled abandoned-cart process; this core does no scheduling.
    pub async fn stale_pending(&self, older_than: Duration) -> Result<Vec<Order>> {
        Ok(self.store.find_stale_pending(Utc::now() - older_than).await?)
    }
}
