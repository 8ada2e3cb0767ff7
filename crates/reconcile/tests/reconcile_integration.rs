//! Integration tests for the full order lifecycle: checkout, payment
//! verification, shipping reconciliation, and returns.

use std::sync::Arc;

use common::{CustomerId, Money};
use domain::{CartItem, OrderStatus, ReturnItem, ReturnStatus};
use pricing::{Offer, OfferKind};
use reconcile::{
    CheckoutRequest, CheckoutService, InMemoryCarrier, InMemoryGateway, PaymentReconciliation,
    ReconcileError, RecordingNotifier, ReturnDecision, ReturnWorkflow, ShippingReconciliation,
    ShippingWebhook, Signer, VerifyOutcome, VerifyRequest,
};
use store::{InMemoryStore, OfferStore, OrderStore, ReturnStore};

const WEBHOOK_SECRET: &str = "whsec_test";

struct TestHarness {
    store: Arc<InMemoryStore>,
    gateway: Arc<InMemoryGateway>,
    carrier: Arc<InMemoryCarrier>,
    notifier: Arc<RecordingNotifier>,
    checkout: CheckoutService<InMemoryStore>,
    payments: PaymentReconciliation<InMemoryStore, InMemoryGateway, InMemoryCarrier, RecordingNotifier>,
    shipping: ShippingReconciliation<InMemoryStore, InMemoryCarrier, RecordingNotifier>,
    returns: ReturnWorkflow<InMemoryStore, InMemoryGateway, RecordingNotifier>,
    signer: Signer,
}

impl TestHarness {
    fn new() -> Self {
        let store = Arc::new(InMemoryStore::new());
        let gateway = Arc::new(InMemoryGateway::new());
        let carrier = Arc::new(InMemoryCarrier::new());
        let notifier = Arc::new(RecordingNotifier::new());
        let signer = Signer::new(WEBHOOK_SECRET);

        let checkout = CheckoutService::new(store.clone());
        let payments = PaymentReconciliation::new(
            store.clone(),
            gateway.clone(),
            carrier.clone(),
            notifier.clone(),
            signer.clone(),
        );
        let shipping =
            ShippingReconciliation::new(store.clone(), carrier.clone(), notifier.clone());
        let returns = ReturnWorkflow::new(store.clone(), gateway.clone(), notifier.clone());

        Self {
            store,
            gateway,
            carrier,
            notifier,
            checkout,
            payments,
            shipping,
            returns,
            signer,
        }
    }

    fn cart() -> Vec<CartItem> {
        vec![
            CartItem {
                product_id: "SKU-001".into(),
                name: "Widget".to_string(),
                category_id: Some("tools".to_string()),
                quantity: 2,
                unit_price: Money::from_cents(10000),
            },
            CartItem {
                product_id: "SKU-002".into(),
                name: "Gadget".to_string(),
                category_id: None,
                quantity: 1,
                unit_price: Money::from_cents(5000),
            },
        ]
    }

    async fn place_order(&self, customer_id: CustomerId, coupon: Option<&str>) -> domain::Order {
        self.checkout
            .place_order(CheckoutRequest {
                customer_id,
                items: Self::cart(),
                coupon_code: coupon.map(String::from),
                tax: Money::zero(),
                shipping_cost: Money::zero(),
                shipping_address: None,
                billing_address: None,
            })
            .await
            .unwrap()
    }

    /// Checkout -> intent -> signed proof -> verified payment.
    async fn paid_order(&self, customer_id: CustomerId, coupon: Option<&str>) -> domain::Order {
        let order = self.place_order(customer_id, coupon).await;
        let intent = self
            .payments
            .create_intent(order.id(), customer_id)
            .await
            .unwrap();
        let outcome = self
            .payments
            .verify_client_proof(self.proof(order.id(), customer_id, &intent.gateway_order_id, "pay_1"))
            .await
            .unwrap();
        assert_eq!(outcome, VerifyOutcome::Confirmed);
        self.store.get_order(order.id()).await.unwrap().unwrap()
    }

    async fn delivered_order(&self, customer_id: CustomerId, coupon: Option<&str>) -> domain::Order {
        let order = self.paid_order(customer_id, coupon).await;
        let awb = order.shipment().unwrap().tracking_id.clone();
        self.shipping
            .handle_webhook(ShippingWebhook {
                awb,
                current_status: "Delivered".to_string(),
                order_id: None,
            })
            .await
            .unwrap();
        self.store.get_order(order.id()).await.unwrap().unwrap()
    }

    fn proof(
        &self,
        order_id: common::OrderId,
        customer_id: CustomerId,
        gateway_order_id: &str,
        payment_id: &str,
    ) -> VerifyRequest {
        let message = Signer::payment_proof_message(gateway_order_id, payment_id);
        VerifyRequest {
            order_id,
            customer_id,
            gateway_order_id: gateway_order_id.to_string(),
            gateway_payment_id: payment_id.to_string(),
            signature: self.signer.sign(&message),
        }
    }

    fn sign_body(&self, body: &[u8]) -> String {
        self.signer.sign(body)
    }
}

#[tokio::test]
async fn verified_payment_confirms_ships_and_notifies() {
    let h = TestHarness::new();
    let customer_id = CustomerId::new();

    let order = h.paid_order(customer_id, None).await;
    // Auto-ship succeeded, so the order went straight to SHIPPED.
    assert_eq!(order.status(), OrderStatus::Shipped);
    assert!(order.payment().unwrap().payment_id.is_some());
    assert!(order.shipment().is_some());
    assert_eq!(h.carrier.shipment_count(), 1);
    assert!(h.notifier.subjects().contains(&"order confirmed".to_string()));
}

#[tokio::test]
async fn verified_payment_consumes_one_coupon_use() {
    let h = TestHarness::new();
    h.store
        .insert_offer(
            &Offer::new("SAVE10", OfferKind::Percentage { percent: 10 }).with_usage_limit(5),
        )
        .await
        .unwrap();

    let order = h.paid_order(CustomerId::new(), Some("SAVE10")).await;
    assert_eq!(order.discount_total().cents(), 2500);

    let offer = h.store.get_offer("SAVE10").await.unwrap().unwrap();
    assert_eq!(offer.usage_count, 1);
}

#[tokio::test]
async fn duplicate_proof_is_idempotent() {
    let h = TestHarness::new();
    let customer_id = CustomerId::new();
    let order = h.place_order(customer_id, None).await;
    let intent = h.payments.create_intent(order.id(), customer_id).await.unwrap();
    let proof = h.proof(order.id(), customer_id, &intent.gateway_order_id, "pay_1");

    let first = h.payments.verify_client_proof(proof.clone()).await.unwrap();
    assert_eq!(first, VerifyOutcome::Confirmed);
    let after_first = h.store.get_order(order.id()).await.unwrap().unwrap();
    let events_after_first = after_first.events().len();

    let second = h.payments.verify_client_proof(proof).await.unwrap();
    assert_eq!(second, VerifyOutcome::AlreadyConfirmed);

    let after_second = h.store.get_order(order.id()).await.unwrap().unwrap();
    // Status and money-state unchanged, but the audit log recorded the retry.
    assert_eq!(after_second.status(), after_first.status());
    assert_eq!(after_second.payment(), after_first.payment());
    assert_eq!(after_second.events().len(), events_after_first + 1);
    // The shipment was registered exactly once.
    assert_eq!(h.carrier.shipment_count(), 1);
}

#[tokio::test]
async fn forged_proof_changes_nothing() {
    let h = TestHarness::new();
    let customer_id = CustomerId::new();
    let order = h.place_order(customer_id, None).await;
    let intent = h.payments.create_intent(order.id(), customer_id).await.unwrap();

    let mut proof = h.proof(order.id(), customer_id, &intent.gateway_order_id, "pay_1");
    proof.signature = Signer::new("attacker-secret").sign(b"whatever");

    let outcome = h.payments.verify_client_proof(proof).await.unwrap();
    assert_eq!(outcome, VerifyOutcome::Rejected);

    let stored = h.store.get_order(order.id()).await.unwrap().unwrap();
    assert_eq!(stored.status(), OrderStatus::Pending);
    assert!(stored.payment().unwrap().payment_id.is_none());
    assert_eq!(h.carrier.shipment_count(), 0);
}

#[tokio::test]
async fn carrier_failure_parks_order_in_processing() {
    let h = TestHarness::new();
    let customer_id = CustomerId::new();
    h.carrier.set_fail_on_create(true);

    let order = h.paid_order(customer_id, None).await;
    assert_eq!(order.status(), OrderStatus::Processing);
    assert!(order.shipment().is_none());

    // Retry path once the carrier recovers.
    h.carrier.set_fail_on_create(false);
    let awb = h.shipping.register_shipment(order.id()).await.unwrap();
    let stored = h.store.get_order(order.id()).await.unwrap().unwrap();
    assert_eq!(stored.status(), OrderStatus::Shipped);
    assert_eq!(stored.shipment().unwrap().tracking_id, awb);
}

#[tokio::test]
async fn payment_failed_webhook_cancels_pending_order() {
    let h = TestHarness::new();
    let customer_id = CustomerId::new();
    let order = h.place_order(customer_id, None).await;
    let intent = h.payments.create_intent(order.id(), customer_id).await.unwrap();

    let body = serde_json::json!({
        "event": "payment.failed",
        "payload": { "order_id": intent.gateway_order_id, "reason": "card declined" },
    })
    .to_string();
    let ack = h
        .payments
        .handle_webhook(body.as_bytes(), &h.sign_body(body.as_bytes()))
        .await
        .unwrap();
    assert!(ack.received);

    let stored = h.store.get_order(order.id()).await.unwrap().unwrap();
    assert_eq!(stored.status(), OrderStatus::Cancelled);
}

#[tokio::test]
async fn payment_failed_after_confirmation_is_a_no_op() {
    let h = TestHarness::new();
    let customer_id = CustomerId::new();
    let order = h.paid_order(customer_id, None).await;
    let intent_id = order.payment().unwrap().intent_id.clone();

    // A stale failure delivery must not claw back a confirmed order.
    let body = serde_json::json!({
        "event": "payment.failed",
        "payload": { "order_id": intent_id },
    })
    .to_string();
    h.payments
        .handle_webhook(body.as_bytes(), &h.sign_body(body.as_bytes()))
        .await
        .unwrap();

    let stored = h.store.get_order(order.id()).await.unwrap().unwrap();
    assert_eq!(stored.status(), OrderStatus::Shipped);
}

#[tokio::test]
async fn webhook_with_bad_signature_is_rejected_before_parsing() {
    let h = TestHarness::new();
    let body = b"{\"event\":\"payment.failed\",\"payload\":{\"order_id\":\"x\"}}";

    let result = h.payments.handle_webhook(body, "deadbeef").await;
    assert!(matches!(result, Err(ReconcileError::BadSignature)));
}

#[tokio::test]
async fn unknown_gateway_event_is_acknowledged() {
    let h = TestHarness::new();
    let body = serde_json::json!({ "event": "invoice.expired", "payload": {} }).to_string();

    let ack = h
        .payments
        .handle_webhook(body.as_bytes(), &h.sign_body(body.as_bytes()))
        .await
        .unwrap();
    assert!(ack.received);
}

#[tokio::test]
async fn delivered_webhook_moves_order_and_duplicates_append_events_only() {
    let h = TestHarness::new();
    let customer_id = CustomerId::new();
    let order = h.paid_order(customer_id, None).await;
    let awb = order.shipment().unwrap().tracking_id.clone();

    let webhook = ShippingWebhook {
        awb,
        current_status: "Delivered".to_string(),
        order_id: None,
    };
    h.shipping.handle_webhook(webhook.clone()).await.unwrap();
    let delivered = h.store.get_order(order.id()).await.unwrap().unwrap();
    assert_eq!(delivered.status(), OrderStatus::Delivered);
    assert!(h.notifier.subjects().contains(&"order delivered".to_string()));

    let events_before = delivered.events().len();
    h.shipping.handle_webhook(webhook).await.unwrap();
    let after = h.store.get_order(order.id()).await.unwrap().unwrap();
    assert_eq!(after.status(), OrderStatus::Delivered);
    assert_eq!(after.events().len(), events_before + 1);
}

#[tokio::test]
async fn unmapped_carrier_status_is_audit_only() {
    let h = TestHarness::new();
    let customer_id = CustomerId::new();
    let order = h.paid_order(customer_id, None).await;
    let awb = order.shipment().unwrap().tracking_id.clone();

    h.shipping
        .handle_webhook(ShippingWebhook {
            awb,
            current_status: "RTO Initiated".to_string(),
            order_id: None,
        })
        .await
        .unwrap();

    let stored = h.store.get_order(order.id()).await.unwrap().unwrap();
    assert_eq!(stored.status(), OrderStatus::Shipped);
    assert_eq!(stored.shipment().unwrap().carrier_status, "RTO Initiated");
}

#[tokio::test]
async fn unknown_tracking_id_is_acknowledged() {
    let h = TestHarness::new();
    let ack = h
        .shipping
        .handle_webhook(ShippingWebhook {
            awb: "AWB-9999".to_string(),
            current_status: "Delivered".to_string(),
            order_id: Some("123".to_string()),
        })
        .await
        .unwrap();
    assert!(ack.received);
}

#[tokio::test]
async fn approved_return_refunds_net_of_frozen_discount() {
    let h = TestHarness::new();
    let customer_id = CustomerId::new();
    h.store
        .insert_offer(&Offer::new("SAVE10", OfferKind::Percentage { percent: 10 }))
        .await
        .unwrap();
    let order = h.delivered_order(customer_id, Some("SAVE10")).await;

    // Return one unit of the first item: 100.00 gross, 10.00 frozen discount.
    let first_item = &order.items()[0];
    let request = h
        .returns
        .create_return_request(
            order.id(),
            customer_id,
            vec![ReturnItem {
                order_item_id: first_item.id,
                quantity: 1,
            }],
            "damaged on arrival".to_string(),
        )
        .await
        .unwrap();

    h.returns
        .resolve(request.id(), ReturnDecision::Approve, None)
        .await
        .unwrap();
    let resolved = h
        .returns
        .resolve(request.id(), ReturnDecision::Refund, None)
        .await
        .unwrap();

    assert_eq!(resolved.status(), ReturnStatus::Refunded);
    let refund = resolved.refund().unwrap();
    assert_eq!(refund.amount.cents(), 9000);
    assert_eq!(h.gateway.refunded_amount("pay_1"), Some(Money::from_cents(9000)));
}

#[tokio::test]
async fn gateway_refund_failure_leaves_request_approved() {
    let h = TestHarness::new();
    let customer_id = CustomerId::new();
    let order = h.delivered_order(customer_id, None).await;

    let request = h
        .returns
        .create_return_request(
            order.id(),
            customer_id,
            vec![ReturnItem {
                order_item_id: order.items()[0].id,
                quantity: 1,
            }],
            "wrong size".to_string(),
        )
        .await
        .unwrap();
    h.returns
        .resolve(request.id(), ReturnDecision::Approve, None)
        .await
        .unwrap();

    h.gateway.set_fail_on_refund(true);
    let result = h
        .returns
        .resolve(request.id(), ReturnDecision::Refund, None)
        .await;
    assert!(matches!(result, Err(ReconcileError::Gateway(_))));

    let stored = h.store.get_return(request.id()).await.unwrap().unwrap();
    assert_eq!(stored.status(), ReturnStatus::Approved);
    assert!(stored.refund().is_none());

    // Retry succeeds once the gateway recovers.
    h.gateway.set_fail_on_refund(false);
    let resolved = h
        .returns
        .resolve(request.id(), ReturnDecision::Refund, None)
        .await
        .unwrap();
    assert_eq!(resolved.status(), ReturnStatus::Refunded);
}

#[tokio::test]
async fn rejected_request_releases_quantity_for_a_new_request() {
    let h = TestHarness::new();
    let customer_id = CustomerId::new();
    let order = h.delivered_order(customer_id, None).await;
    let item_id = order.items()[1].id; // quantity 1

    let first = h
        .returns
        .create_return_request(
            order.id(),
            customer_id,
            vec![ReturnItem {
                order_item_id: item_id,
                quantity: 1,
            }],
            "changed my mind".to_string(),
        )
        .await
        .unwrap();

    // While the first request is open, the unit is held.
    let blocked = h
        .returns
        .create_return_request(
            order.id(),
            customer_id,
            vec![ReturnItem {
                order_item_id: item_id,
                quantity: 1,
            }],
            "changed my mind".to_string(),
        )
        .await;
    assert!(matches!(
        blocked,
        Err(ReconcileError::Return(
            domain::ReturnError::QuantityExceedsReturnable { .. }
        ))
    ));

    h.returns
        .resolve(first.id(), ReturnDecision::Reject, Some("outside policy".to_string()))
        .await
        .unwrap();

    // Rejection released the unit.
    h.returns
        .create_return_request(
            order.id(),
            customer_id,
            vec![ReturnItem {
                order_item_id: item_id,
                quantity: 1,
            }],
            "second attempt".to_string(),
        )
        .await
        .unwrap();
}

#[tokio::test]
async fn refund_processed_webhook_settles_approved_request() {
    let h = TestHarness::new();
    let customer_id = CustomerId::new();
    let order = h.delivered_order(customer_id, None).await;

    let request = h
        .returns
        .create_return_request(
            order.id(),
            customer_id,
            vec![ReturnItem {
                order_item_id: order.items()[0].id,
                quantity: 1,
            }],
            "damaged".to_string(),
        )
        .await
        .unwrap();
    h.returns
        .resolve(request.id(), ReturnDecision::Approve, None)
        .await
        .unwrap();

    let body = serde_json::json!({
        "event": "refund.processed",
        "payload": { "payment_id": "pay_1", "refund_id": "rfnd_gw_1", "amount": 10000 },
    })
    .to_string();
    h.payments
        .handle_webhook(body.as_bytes(), &h.sign_body(body.as_bytes()))
        .await
        .unwrap();

    let stored = h.store.get_return(request.id()).await.unwrap().unwrap();
    assert_eq!(stored.status(), ReturnStatus::Refunded);
    let refund = stored.refund().unwrap();
    assert_eq!(refund.gateway_refund_id, "rfnd_gw_1");
    assert_eq!(refund.amount.cents(), 10000);
}

#[tokio::test]
async fn return_against_undelivered_order_is_rejected() {
    let h = TestHarness::new();
    let customer_id = CustomerId::new();
    let order = h.paid_order(customer_id, None).await;

    let result = h
        .returns
        .create_return_request(
            order.id(),
            customer_id,
            vec![ReturnItem {
                order_item_id: order.items()[0].id,
                quantity: 1,
            }],
            "too early".to_string(),
        )
        .await;
    assert!(matches!(
        result,
        Err(ReconcileError::Return(
            domain::ReturnError::OrderNotDelivered { .. }
        ))
    ));
}

#[tokio::test]
async fn intent_creation_enforces_ownership() {
    let h = TestHarness::new();
    let order = h.place_order(CustomerId::new(), None).await;

    let result = h.payments.create_intent(order.id(), CustomerId::new()).await;
    assert!(matches!(
        result,
        Err(ReconcileError::Order(domain::OrderError::NotOwner))
    ));
}

#[tokio::test]
async fn intent_creation_rejected_after_payment_without_gateway_call() {
    let h = TestHarness::new();
    let customer_id = CustomerId::new();
    let order = h.paid_order(customer_id, None).await;
    let intents_before = h.gateway.intent_count();

    let result = h.payments.create_intent(order.id(), customer_id).await;

    assert!(matches!(
        result,
        Err(ReconcileError::Order(domain::OrderError::InvalidStatus { .. }))
    ));
    assert_eq!(h.gateway.intent_count(), intents_before);
}

#[tokio::test]
async fn refund_webhook_settles_the_request_matching_the_amount() {
    let h = TestHarness::new();
    let customer_id = CustomerId::new();
    let order = h.delivered_order(customer_id, None).await;

    // Two approved requests against the same payment: 10000 for the widget
    // unit, 5000 for the gadget.
    let first = h
        .returns
        .create_return_request(
            order.id(),
            customer_id,
            vec![ReturnItem {
                order_item_id: order.items()[0].id,
                quantity: 1,
            }],
            "damaged".to_string(),
        )
        .await
        .unwrap();
    let second = h
        .returns
        .create_return_request(
            order.id(),
            customer_id,
            vec![ReturnItem {
                order_item_id: order.items()[1].id,
                quantity: 1,
            }],
            "wrong colour".to_string(),
        )
        .await
        .unwrap();
    h.returns
        .resolve(first.id(), ReturnDecision::Approve, None)
        .await
        .unwrap();
    h.returns
        .resolve(second.id(), ReturnDecision::Approve, None)
        .await
        .unwrap();

    let body = serde_json::json!({
        "event": "refund.processed",
        "payload": { "payment_id": "pay_1", "refund_id": "rfnd_gw_2", "amount": 5000 },
    })
    .to_string();
    h.payments
        .handle_webhook(body.as_bytes(), &h.sign_body(body.as_bytes()))
        .await
        .unwrap();

    let settled = h.store.get_return(second.id()).await.unwrap().unwrap();
    assert_eq!(settled.status(), ReturnStatus::Refunded);
    assert_eq!(settled.refund().unwrap().gateway_refund_id, "rfnd_gw_2");
    let untouched = h.store.get_return(first.id()).await.unwrap().unwrap();
    assert_eq!(untouched.status(), ReturnStatus::Approved);

    // A duplicate delivery of the same refund is acknowledged without
    // touching the still-approved request.
    h.payments
        .handle_webhook(body.as_bytes(), &h.sign_body(body.as_bytes()))
        .await
        .unwrap();
    let untouched = h.store.get_return(first.id()).await.unwrap().unwrap();
    assert_eq!(untouched.status(), ReturnStatus::Approved);
}
