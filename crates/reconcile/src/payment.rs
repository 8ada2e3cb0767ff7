//! Payment reconciliation: intent creation, client proof verification, and
//! the gateway webhook.
//!
//! Confirmation is driven by the client proof; gateway webhooks are the
//! reconciliation channel for everything the client never reports back
//! (failures, refunds). Both channels may deliver duplicates, so every
//! transition here is a guarded compare-and-set.

use std::sync::Arc;

use common::{CustomerId, Money, OrderId};
use domain::{Order, OrderError, OrderStatus, PaymentRecord, ReturnStatus};
use serde::Deserialize;
use store::{OfferStore, OrderStore, ReturnStore};

use crate::carrier::{CarrierClient, ShipmentRequest};
use crate::error::{ReconcileError, Result};
use crate::gateway::PaymentGateway;
use crate::notifier::Notifier;
use crate::signature::Signer;
use crate::MAX_CAS_ATTEMPTS;

const CURRENCY: &str = "INR";

/// What the storefront needs to open the gateway's payment UI.
#[derive(Debug, Clone, serde::Serialize)]
pub struct IntentResponse {
    pub gateway_order_id: String,
    pub amount_minor_units: i64,
    pub currency: String,
    pub public_key: String,
}

/// Client-submitted proof that a payment went through.
#[derive(Debug, Clone, Deserialize)]
pub struct VerifyRequest {
    pub order_id: OrderId,
    pub customer_id: CustomerId,
    pub gateway_order_id: String,
    pub gateway_payment_id: String,
    pub signature: String,
}

/// Outcome of a proof verification. `Rejected` and `AlreadyConfirmed` leave
/// order money-state untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerifyOutcome {
    /// Proof verified and the order moved to `CONFIRMED`.
    Confirmed,
    /// Proof verified but a previous delivery already confirmed the order.
    AlreadyConfirmed,
    /// Signature mismatch, or the proof references a different intent.
    Rejected,
}

impl VerifyOutcome {
    pub fn is_success(&self) -> bool {
        !matches!(self, VerifyOutcome::Rejected)
    }
}

/// Acknowledgement body for an accepted webhook delivery.
#[derive(Debug, Clone, Copy, serde::Serialize)]
pub struct WebhookAck {
    pub received: bool,
}

impl WebhookAck {
    fn ok() -> Self {
        Self { received: true }
    }
}

#[derive(Debug, Deserialize)]
struct WebhookEnvelope {
    event: String,
    #[serde(default)]
    payload: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct PaymentEventPayload {
    order_id: String,
    #[serde(default)]
    reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RefundEventPayload {
    payment_id: String,
    refund_id: String,
    amount: i64,
}

/// Payment-side reconciliation service.
pub struct PaymentReconciliation<S, G, C, N> {
    store: Arc<S>,
    gateway: Arc<G>,
    carrier: Arc<C>,
    notifier: Arc<N>,
    signer: Signer,
}

impl<S, G, C, N> PaymentReconciliation<S, G, C, N>
where
    S: OrderStore + OfferStore + ReturnStore,
    G: PaymentGateway,
    C: CarrierClient,
    N: Notifier,
{
    /// Creates a new payment reconciliation service.
    pub fn new(
        store: Arc<S>,
        gateway: Arc<G>,
        carrier: Arc<C>,
        notifier: Arc<N>,
        signer: Signer,
    ) -> Self {
        Self {
            store,
            gateway,
            carrier,
            notifier,
            signer,
        }
    }

    /// Creates a gateway payment intent for a `PENDING` order and records it
    /// on the order.
    #[tracing::instrument(skip(self))]
    pub async fn create_intent(
        &self,
        order_id: OrderId,
        customer_id: CustomerId,
    ) -> Result<IntentResponse> {
        let mut order = self
            .store
            .get_order(order_id)
            .await?
            .ok_or(ReconcileError::OrderNotFound(order_id))?;
        order.require_owner(customer_id)?;
        // Checked before the gateway call so a non-pending order never leaves
        // an orphaned remote intent behind.
        if order.status() != OrderStatus::Pending {
            return Err(OrderError::InvalidStatus {
                status: order.status(),
                action: "create a payment intent for",
            }
            .into());
        }

        let intent = self
            .gateway
            .create_intent(order.id(), order.total(), CURRENCY)
            .await?;
        order.attach_intent(PaymentRecord::intent(self.gateway.name(), &intent.intent_id))?;
        if !self
            .store
            .update_order_if_status(&order, OrderStatus::Pending)
            .await?
        {
            return Err(ReconcileError::WriteContention { entity: "order" });
        }

        tracing::info!(order_id = %order.id(), intent_id = %intent.intent_id, "payment intent created");
        Ok(IntentResponse {
            gateway_order_id: intent.intent_id,
            amount_minor_units: order.total().cents(),
            currency: CURRENCY.to_string(),
            public_key: intent.public_key,
        })
    }

    /// Verifies a client payment proof and, on first success, confirms the
    /// order, consumes the coupon use, registers the shipment, and notifies
    /// the customer.
    ///
    /// A signature mismatch is a normal outcome, not an error: the caller
    /// gets `Rejected` and the order is untouched.
    #[tracing::instrument(skip(self, request), fields(order_id = %request.order_id))]
    pub async fn verify_client_proof(&self, request: VerifyRequest) -> Result<VerifyOutcome> {
        let message = Signer::payment_proof_message(
            &request.gateway_order_id,
            &request.gateway_payment_id,
        );
        if !self.signer.verify(&message, &request.signature) {
            metrics::counter!("payments_failed_total").increment(1);
            tracing::warn!(order_id = %request.order_id, "payment proof signature mismatch");
            return Ok(VerifyOutcome::Rejected);
        }

        for _ in 0..MAX_CAS_ATTEMPTS {
            let mut order = self
                .store
                .get_order(request.order_id)
                .await?
                .ok_or(ReconcileError::OrderNotFound(request.order_id))?;
            order.require_owner(request.customer_id)?;

            let intent_matches = order
                .payment()
                .is_some_and(|payment| payment.intent_id == request.gateway_order_id);
            if !intent_matches {
                metrics::counter!("payments_failed_total").increment(1);
                tracing::warn!(order_id = %order.id(), "proof references an unknown intent");
                return Ok(VerifyOutcome::Rejected);
            }

            let expected = order.status();
            let transition =
                order.confirm_payment(&request.gateway_payment_id, &request.signature);
            if !self.store.update_order_if_status(&order, expected).await? {
                continue;
            }

            if !transition.is_applied() {
                return Ok(VerifyOutcome::AlreadyConfirmed);
            }

            metrics::counter!("payments_confirmed_total").increment(1);
            self.consume_coupon_use(&order).await;
            self.auto_ship(order.clone()).await;
            self.notify(
                order.customer_id(),
                "order confirmed",
                &format!("Your order {} is confirmed.", order.number()),
            )
            .await;
            return Ok(VerifyOutcome::Confirmed);
        }
        Err(ReconcileError::WriteContention { entity: "order" })
    }

    /// Handles a gateway webhook delivery. The signature covers the raw body;
    /// a mismatch rejects the whole delivery before any parsing.
    #[tracing::instrument(skip_all)]
    pub async fn handle_webhook(&self, raw_body: &[u8], signature: &str) -> Result<WebhookAck> {
        if !self.signer.verify(raw_body, signature) {
            metrics::counter!("webhook_rejected_total").increment(1);
            return Err(ReconcileError::BadSignature);
        }

        let envelope: WebhookEnvelope = serde_json::from_slice(raw_body)?;
        match envelope.event.as_str() {
            // Capture is reported authoritatively through the client proof;
            // the webhook copy is recorded for the trace only.
            "payment.captured" | "order.paid" => {
                tracing::info!(event = %envelope.event, "capture acknowledged by gateway");
            }
            "payment.failed" => {
                let payload: PaymentEventPayload = serde_json::from_value(envelope.payload)?;
                self.cancel_failed_payment(&payload).await?;
            }
            "refund.processed" => {
                let payload: RefundEventPayload = serde_json::from_value(envelope.payload)?;
                self.settle_refund(&payload).await?;
            }
            "refund.failed" => {
                let payload: RefundEventPayload = serde_json::from_value(envelope.payload)?;
                tracing::warn!(
                    payment_id = %payload.payment_id,
                    refund_id = %payload.refund_id,
                    "gateway reports refund failure; request left for retry"
                );
            }
            other => {
                tracing::info!(event = %other, "ignoring unhandled gateway event");
            }
        }
        Ok(WebhookAck::ok())
    }

    /// Cancels the order a failed payment belongs to, if it is still waiting
    /// for payment. Orders that progressed already converge to a no-op.
    async fn cancel_failed_payment(&self, payload: &PaymentEventPayload) -> Result<()> {
        let Some(order) = self.store.find_by_intent(&payload.order_id).await? else {
            tracing::warn!(intent_id = %payload.order_id, "payment failure for unknown intent");
            return Ok(());
        };

        let reason = payload.reason.as_deref().unwrap_or("payment failed");
        for _ in 0..MAX_CAS_ATTEMPTS {
            let mut order = self
                .store
                .get_order(order.id())
                .await?
                .ok_or(ReconcileError::OrderNotFound(order.id()))?;
            let expected = order.status();
            let transition = order.cancel_for_payment_failure(reason);
            if self.store.update_order_if_status(&order, expected).await? {
                if transition.is_applied() {
                    metrics::counter!("payments_failed_total").increment(1);
                    tracing::info!(order_id = %order.id(), "order cancelled after payment failure");
                }
                return Ok(());
            }
        }
        Err(ReconcileError::WriteContention { entity: "order" })
    }

    /// Marks the matching `APPROVED` return request refunded with the
    /// gateway-reported amount.
    async fn settle_refund(&self, payload: &RefundEventPayload) -> Result<()> {
        let Some(order) = self.store.find_by_payment(&payload.payment_id).await? else {
            tracing::warn!(payment_id = %payload.payment_id, "refund for unknown payment");
            return Ok(());
        };
        let returns = self.store.list_returns_for_order(order.id()).await?;
        if returns.iter().any(|request| {
            request
                .refund()
                .is_some_and(|refund| refund.gateway_refund_id == payload.refund_id)
        }) {
            tracing::info!(refund_id = %payload.refund_id, "refund already settled");
            return Ok(());
        }

        // The gateway payload carries no return-request reference, so the
        // refund amount is the correlation key between concurrently approved
        // requests; a refund matching none of them is logged, not guessed at.
        let Some(approved) = returns.iter().find(|request| {
            request.status() == ReturnStatus::Approved
                && request
                    .refund_amount(&order)
                    .is_ok_and(|amount| amount.cents() == payload.amount)
        }) else {
            tracing::warn!(
                order_id = %order.id(),
                amount = payload.amount,
                "refund matches no approved return request"
            );
            return Ok(());
        };

        let mut request = approved.clone();
        request.mark_refunded(Money::from_cents(payload.amount), &payload.refund_id)?;
        if !self
            .store
            .update_return_if_status(&request, ReturnStatus::Approved)
            .await?
        {
            // A concurrent resolver already settled it.
            tracing::info!(return_id = %request.id(), "refund already settled");
            return Ok(());
        }
        metrics::counter!("refunds_settled_total").increment(1);
        tracing::info!(return_id = %request.id(), amount = %Money::from_cents(payload.amount), "refund settled");
        Ok(())
    }

    /// Consumes one coupon use after a confirmed payment. An exhausted limit
    /// at this point is logged, never unwound; the discount was already
    /// honored at checkout.
    async fn consume_coupon_use(&self, order: &Order) {
        let Some(coupon) = order.coupon() else {
            return;
        };
        match self.store.increment_usage(&coupon.code).await {
            Ok(true) => {}
            Ok(false) => {
                tracing::warn!(code = %coupon.code, order_id = %order.id(), "coupon limit reached after checkout");
            }
            Err(err) => {
                tracing::warn!(code = %coupon.code, error = %err, "coupon usage increment failed");
            }
        }
    }

    /// Registers the shipment for a freshly confirmed order. Carrier failure
    /// is non-fatal: the order parks in `PROCESSING` for the next attempt.
    async fn auto_ship(&self, mut order: Order) {
        let request = ShipmentRequest::from_order(&order);
        let expected = order.status();
        let transition = match self.carrier.create_shipment(&request).await {
            Ok(created) => order.mark_shipped(self.carrier.name(), &created.tracking_id),
            Err(err) => {
                metrics::counter!("shipment_registrations_failed_total").increment(1);
                tracing::error!(order_id = %order.id(), error = %err, "carrier registration failed");
                order.start_processing("carrier registration failed")
            }
        };
        if !transition.is_applied() {
            return;
        }
        match self.store.update_order_if_status(&order, expected).await {
            Ok(true) => {
                if order.shipment().is_some() {
                    metrics::counter!("shipments_registered_total").increment(1);
                }
                tracing::info!(order_id = %order.id(), status = %order.status(), "shipment registration recorded");
            }
            Ok(false) => {
                tracing::warn!(order_id = %order.id(), "lost shipment write race; carrier state will reconcile via webhook");
            }
            Err(err) => {
                tracing::warn!(order_id = %order.id(), error = %err, "failed to persist shipment registration");
            }
        }
    }

    async fn notify(&self, customer_id: CustomerId, subject: &str, body: &str) {
        if let Err(err) = self.notifier.notify(customer_id, subject, body).await {
            tracing::warn!(error = %err, "notification delivery failed");
        }
    }
}
