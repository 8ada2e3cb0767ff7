//! Return and refund workflow.
//!
//! Refunding is money movement, so the ordering is strict: the gateway call
//! happens first and state is persisted only after it succeeds. A refund
//! failure leaves the request `APPROVED` and surfaces the error so the
//! operator can retry.

use std::sync::Arc;

use common::{CustomerId, OrderId, ReturnRequestId};
use domain::{ReturnError, ReturnItem, ReturnRequest, ReturnStatus};
use store::{OrderStore, ReturnStore};

use crate::error::{ReconcileError, Result};
use crate::gateway::PaymentGateway;
use crate::notifier::Notifier;

/// Operator decision on a pending or approved return request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReturnDecision {
    Approve,
    Reject,
    Refund,
}

/// Return/refund workflow service.
pub struct ReturnWorkflow<S, G, N> {
    store: Arc<S>,
    gateway: Arc<G>,
    notifier: Arc<N>,
}

impl<S, G, N> ReturnWorkflow<S, G, N>
where
    S: OrderStore + ReturnStore,
    G: PaymentGateway,
    N: Notifier,
{
    /// Creates a new return workflow service.
    pub fn new(store: Arc<S>, gateway: Arc<G>, notifier: Arc<N>) -> Self {
        Self {
            store,
            gateway,
            notifier,
        }
    }

    /// Opens a return request against a delivered order the customer owns.
    /// Quantities are checked against what earlier requests already hold.
    #[tracing::instrument(skip(self, items, reason))]
    pub async fn create_return_request(
        &self,
        order_id: OrderId,
        customer_id: CustomerId,
        items: Vec<ReturnItem>,
        reason: String,
    ) -> Result<ReturnRequest> {
        let order = self
            .store
            .get_order(order_id)
            .await?
            .ok_or(ReconcileError::OrderNotFound(order_id))?;
        let prior = self.store.list_returns_for_order(order_id).await?;

        let request = ReturnRequest::create(&order, &prior, customer_id, items, reason)?;
        self.store.insert_return(&request).await?;

        metrics::counter!("return_requests_total").increment(1);
        tracing::info!(return_id = %request.id(), order_id = %order_id, "return request opened");
        Ok(request)
    }

    /// Applies an operator decision to a return request.
    ///
    /// `Approve`/`Reject` move a `PENDING` request; `Refund` settles an
    /// `APPROVED` one through the gateway. Each transition persists with a
    /// status-predicated write, so two operators racing on one request
    /// cannot both win.
    #[tracing::instrument(skip(self, comment))]
    pub async fn resolve(
        &self,
        return_id: ReturnRequestId,
        decision: ReturnDecision,
        comment: Option<String>,
    ) -> Result<ReturnRequest> {
        let mut request = self
            .store
            .get_return(return_id)
            .await?
            .ok_or(ReconcileError::ReturnNotFound(return_id))?;
        let expected = request.status();

        match decision {
            ReturnDecision::Approve => {
                request.approve(comment)?;
                self.persist(&request, expected).await?;
                self.notify(&request, "return approved").await;
            }
            ReturnDecision::Reject => {
                request.reject(comment)?;
                self.persist(&request, expected).await?;
                self.notify(&request, "return rejected").await;
            }
            ReturnDecision::Refund => {
                self.refund(&mut request, expected).await?;
                self.notify(&request, "refund issued").await;
            }
        }
        Ok(request)
    }

    /// Issues the gateway refund for an approved request, then marks it
    /// refunded. Amount comes from the order's frozen per-unit proration.
    async fn refund(&self, request: &mut ReturnRequest, expected: ReturnStatus) -> Result<()> {
        if !request.status().can_refund() {
            return Err(ReturnError::InvalidStatus {
                status: request.status(),
                action: "refund",
            }
            .into());
        }
        let order = self
            .store
            .get_order(request.order_id())
            .await?
            .ok_or(ReconcileError::OrderNotFound(request.order_id()))?;
        let payment_id = order
            .payment()
            .and_then(|payment| payment.payment_id.clone())
            .ok_or(ReconcileError::NoCapturedPayment(order.id()))?;
        let amount = request.refund_amount(&order)?;

        // Gateway first; the request only changes state once money moved.
        let refund = self.gateway.refund(&payment_id, amount).await?;
        request.mark_refunded(amount, &refund.refund_id)?;
        self.persist(request, expected).await?;

        metrics::counter!("refunds_settled_total").increment(1);
        tracing::info!(return_id = %request.id(), amount = %amount, refund_id = %refund.refund_id, "refund issued");
        Ok(())
    }

    async fn persist(&self, request: &ReturnRequest, expected: ReturnStatus) -> Result<()> {
        if !self.store.update_return_if_status(request, expected).await? {
            return Err(ReconcileError::WriteContention {
                entity: "return request",
            });
        }
        Ok(())
    }

    async fn notify(&self, request: &ReturnRequest, subject: &str) {
        let body = format!("Update on your return request: {subject}.");
        if let Err(err) = self
            .notifier
            .notify(request.customer_id(), subject, &body)
            .await
        {
            tracing::warn!(error = %err, "notification delivery failed");
        }
    }
}
