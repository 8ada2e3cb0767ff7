//! Payment gateway port and in-memory implementation.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use common::{Money, OrderId};

use crate::error::ReconcileError;

/// A gateway-side payment intent created ahead of the customer paying.
#[derive(Debug, Clone)]
pub struct GatewayIntent {
    /// Gateway identifier for the intent ("gateway order id" on the wire).
    pub intent_id: String,
    /// Public key material the client needs to open the payment UI.
    pub public_key: String,
}

/// A gateway-side refund record.
#[derive(Debug, Clone)]
pub struct GatewayRefund {
    /// Gateway identifier for the refund.
    pub refund_id: String,
}

/// Trait for payment gateway operations.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Gateway name recorded on the order's payment record.
    fn name(&self) -> &str;

    /// Creates a remote payment intent for an order total (minor units).
    async fn create_intent(
        &self,
        order_id: OrderId,
        amount: Money,
        currency: &str,
    ) -> Result<GatewayIntent, ReconcileError>;

    /// Issues a refund against a captured payment.
    async fn refund(
        &self,
        payment_id: &str,
        amount: Money,
    ) -> Result<GatewayRefund, ReconcileError>;
}

#[derive(Debug, Default)]
struct InMemoryGatewayState {
    intents: HashMap<String, (OrderId, Money)>,
    refunds: HashMap<String, (String, Money)>,
    next_id: u32,
    fail_on_refund: bool,
}

/// In-memory payment gateway for testing.
#[derive(Debug, Clone, Default)]
pub struct InMemoryGateway {
    state: Arc<RwLock<InMemoryGatewayState>>,
}

impl InMemoryGateway {
    /// Creates a new in-memory gateway.
    pub fn new() -> Self {
        Self::default()
    }

    /// Configures the gateway to fail refund calls.
    pub fn set_fail_on_refund(&self, fail: bool) {
        self.state.write().unwrap().fail_on_refund = fail;
    }

    /// Returns the number of intents created.
    pub fn intent_count(&self) -> usize {
        self.state.read().unwrap().intents.len()
    }

    /// Returns the number of refunds issued.
    pub fn refund_count(&self) -> usize {
        self.state.read().unwrap().refunds.len()
    }

    /// Returns the refunded amount for a payment, if any.
    pub fn refunded_amount(&self, payment_id: &str) -> Option<Money> {
        self.state
            .read()
            .unwrap()
            .refunds
            .values()
            .find(|(pid, _)| pid == payment_id)
            .map(|(_, amount)| *amount)
    }
}

#[async_trait]
impl PaymentGateway for InMemoryGateway {
    fn name(&self) -> &str {
        "in-memory"
    }

    async fn create_intent(
        &self,
        order_id: OrderId,
        amount: Money,
        _currency: &str,
    ) -> Result<GatewayIntent, ReconcileError> {
        let mut state = self.state.write().unwrap();
        state.next_id += 1;
        let intent_id = format!("intent_{:04}", state.next_id);
        state.intents.insert(intent_id.clone(), (order_id, amount));
        Ok(GatewayIntent {
            intent_id,
            public_key: "pk_test".to_string(),
        })
    }

    async fn refund(
        &self,
        payment_id: &str,
        amount: Money,
    ) -> Result<GatewayRefund, ReconcileError> {
        let mut state = self.state.write().unwrap();
        if state.fail_on_refund {
            return Err(ReconcileError::Gateway(
                "refund temporarily unavailable".to_string(),
            ));
        }
        state.next_id += 1;
        let refund_id = format!("rfnd_{:04}", state.next_id);
        state
            .refunds
            .insert(refund_id.clone(), (payment_id.to_string(), amount));
        Ok(GatewayRefund { refund_id })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn create_intent_and_refund() {
        let gateway = InMemoryGateway::new();
        let intent = gateway
            .create_intent(OrderId::new(), Money::from_cents(5000), "INR")
            .await
            .unwrap();
        assert!(intent.intent_id.starts_with("intent_"));
        assert_eq!(gateway.intent_count(), 1);

        let refund = gateway
            .refund("pay_1", Money::from_cents(1000))
            .await
            .unwrap();
        assert!(refund.refund_id.starts_with("rfnd_"));
        assert_eq!(
            gateway.refunded_amount("pay_1"),
            Some(Money::from_cents(1000))
        );
    }

    #[tokio::test]
    async fn refund_failure_is_surfaced() {
        let gateway = InMemoryGateway::new();
        gateway.set_fail_on_refund(true);
        let result = gateway.refund("pay_1", Money::from_cents(1000)).await;
        assert!(matches!(result, Err(ReconcileError::Gateway(_))));
        assert_eq!(gateway.refund_count(), 0);
    }
}
