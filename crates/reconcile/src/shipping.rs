//! Shipping reconciliation: shipment registration, serviceability, and the
//! carrier webhook.

use std::sync::Arc;

use common::{CustomerId, OrderId};
use domain::CarrierStatusOutcome;
use serde::Deserialize;
use store::OrderStore;

use crate::carrier::{CarrierClient, ShipmentRequest};
use crate::error::{ReconcileError, Result};
use crate::notifier::Notifier;
use crate::payment::WebhookAck;
use crate::MAX_CAS_ATTEMPTS;

/// Carrier webhook payload. The AWB (air waybill number, the carrier's
/// tracking id) is the lookup key; `order_id` is advisory and only logged.
#[derive(Debug, Clone, Deserialize)]
pub struct ShippingWebhook {
    pub awb: String,
    pub current_status: String,
    #[serde(default)]
    pub order_id: Option<String>,
}

/// Shipping-side reconciliation service.
pub struct ShippingReconciliation<S, C, N> {
    store: Arc<S>,
    carrier: Arc<C>,
    notifier: Arc<N>,
}

impl<S, C, N> ShippingReconciliation<S, C, N>
where
    S: OrderStore,
    C: CarrierClient,
    N: Notifier,
{
    /// Creates a new shipping reconciliation service.
    pub fn new(store: Arc<S>, carrier: Arc<C>, notifier: Arc<N>) -> Self {
        Self {
            store,
            carrier,
            notifier,
        }
    }

    /// Registers a shipment for a confirmed order that has none yet. This is
    /// the retry path for orders parked in `PROCESSING` after a failed
    /// registration at payment time.
    #[tracing::instrument(skip(self))]
    pub async fn register_shipment(&self, order_id: OrderId) -> Result<String> {
        let order = self
            .store
            .get_order(order_id)
            .await?
            .ok_or(ReconcileError::OrderNotFound(order_id))?;
        let request = ShipmentRequest::from_order(&order);
        let created = self.carrier.create_shipment(&request).await?;

        for _ in 0..MAX_CAS_ATTEMPTS {
            let mut order = self
                .store
                .get_order(order_id)
                .await?
                .ok_or(ReconcileError::OrderNotFound(order_id))?;
            let expected = order.status();
            let transition = order.mark_shipped(self.carrier.name(), &created.tracking_id);
            if self.store.update_order_if_status(&order, expected).await? {
                if transition.is_applied() {
                    metrics::counter!("shipments_registered_total").increment(1);
                    tracing::info!(order_id = %order_id, awb = %created.tracking_id, "shipment registered");
                }
                return Ok(created.tracking_id);
            }
        }
        Err(ReconcileError::WriteContention { entity: "order" })
    }

    /// Read-only serviceability probe for a delivery postal code.
    pub async fn check_serviceability(&self, postal_code: &str) -> Result<bool> {
        self.carrier.check_serviceability(postal_code).await
    }

    /// Applies a carrier status update. Unmatched AWBs and unmapped statuses
    /// are acknowledged either way; the carrier retries rejected deliveries
    /// forever and there is nothing a retry would fix.
    #[tracing::instrument(skip(self, webhook), fields(awb = %webhook.awb, status = %webhook.current_status))]
    pub async fn handle_webhook(&self, webhook: ShippingWebhook) -> Result<WebhookAck> {
        let Some(order) = self.store.find_by_tracking(&webhook.awb).await? else {
            tracing::warn!(
                awb = %webhook.awb,
                carrier_order_id = webhook.order_id.as_deref().unwrap_or("-"),
                "carrier update for unknown tracking id"
            );
            return Ok(WebhookAck { received: true });
        };

        for _ in 0..MAX_CAS_ATTEMPTS {
            let mut order = self
                .store
                .get_order(order.id())
                .await?
                .ok_or(ReconcileError::OrderNotFound(order.id()))?;
            let expected = order.status();
            let (outcome, transition) = order.apply_carrier_status(&webhook.current_status);
            if !self.store.update_order_if_status(&order, expected).await? {
                continue;
            }

            if transition.is_applied() && outcome == CarrierStatusOutcome::Delivered {
                metrics::counter!("orders_delivered_total").increment(1);
                self.notify(
                    order.customer_id(),
                    "order delivered",
                    &format!("Your order {} was delivered.", order.number()),
                )
                .await;
            }
            return Ok(WebhookAck { received: true });
        }
        Err(ReconcileError::WriteContention { entity: "order" })
    }

    async fn notify(&self, customer_id: CustomerId, subject: &str, body: &str) {
        if let Err(err) = self.notifier.notify(customer_id, subject, body).await {
            tracing::warn!(error = %err, "notification delivery failed");
        }
    }
}
