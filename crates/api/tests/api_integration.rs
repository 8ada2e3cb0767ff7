//! Integration tests for the API server.

use std::sync::{Arc, OnceLock};

use axum::body::Body;
use axum::http::{Request, StatusCode};
use metrics_exporter_prometheus::PrometheusHandle;
use reconcile::Signer;
use store::{InMemoryStore, OfferStore};
use tower::ServiceExt;

const WEBHOOK_SECRET: &str = "whsec_test";

static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

fn get_metrics_handle() -> PrometheusHandle {
    METRICS_HANDLE
        .get_or_init(|| {
            let builder = metrics_exporter_prometheus::PrometheusBuilder::new();
            builder
                .install_recorder()
                .expect("failed to install Prometheus recorder")
        })
        .clone()
}

fn setup() -> axum::Router {
    let store = Arc::new(InMemoryStore::new());
    let state = api::create_default_state(store, WEBHOOK_SECRET);
    api::create_app(state, get_metrics_handle())
}

async fn send_json(
    app: &axum::Router,
    method: &str,
    uri: &str,
    body: serde_json::Value,
) -> (StatusCode, serde_json::Value) {
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method(method)
                .uri(uri)
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = if bytes.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, json)
}

async fn get_json(app: &axum::Router, uri: &str) -> (StatusCode, serde_json::Value) {
    let response = app
        .clone()
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
    (status, json)
}

fn checkout_body(customer_id: &str) -> serde_json::Value {
    serde_json::json!({
        "customer_id": customer_id,
        "items": [
            {
                "product_id": "SKU-001",
                "name": "Widget",
                "quantity": 2,
                "unit_price_cents": 10000
            },
            {
                "product_id": "SKU-002",
                "name": "Gadget",
                "quantity": 1,
                "unit_price_cents": 5000
            }
        ]
    })
}

fn new_customer_id() -> String {
    common::CustomerId::new().to_string()
}

#[tokio::test]
async fn test_health_check() {
    let app = setup();
    let (status, json) = get_json(&app, "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "ok");
}

#[tokio::test]
async fn test_checkout_creates_order() {
    let app = setup();
    let (status, json) =
        send_json(&app, "POST", "/checkout", checkout_body(&new_customer_id())).await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(json["status"], "PENDING");
    assert_eq!(json["subtotal_cents"], 25000);
    assert_eq!(json["total_cents"], 25000);
    assert!(json["number"].as_str().unwrap().starts_with("ORD-"));
}

#[tokio::test]
async fn test_checkout_with_unknown_coupon_is_rejected() {
    let app = setup();
    let mut body = checkout_body(&new_customer_id());
    body["coupon_code"] = serde_json::json!("NOPE");

    let (status, json) = send_json(&app, "POST", "/checkout", body).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json["error"].as_str().is_some());
}

#[tokio::test]
async fn test_checkout_and_get_order() {
    let app = setup();
    let (_, created) =
        send_json(&app, "POST", "/checkout", checkout_body(&new_customer_id())).await;
    let id = created["id"].as_str().unwrap();

    let (status, json) = get_json(&app, &format!("/orders/{id}")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["id"], created["id"]);
    assert_eq!(json["items"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_get_unknown_order_is_404() {
    let app = setup();
    let (status, _) = get_json(
        &app,
        "/orders/00000000-0000-0000-0000-000000000000",
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_full_payment_flow_over_http() {
    let app = setup();
    let customer_id = new_customer_id();
    let (_, created) = send_json(&app, "POST", "/checkout", checkout_body(&customer_id)).await;
    let order_id = created["id"].as_str().unwrap().to_string();

    // Create the payment intent.
    let (status, intent) = send_json(
        &app,
        "POST",
        &format!("/orders/{order_id}/payment-intent"),
        serde_json::json!({ "customer_id": customer_id }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(intent["amount_minor_units"], 25000);
    let gateway_order_id = intent["gateway_order_id"].as_str().unwrap().to_string();

    // Submit a correctly signed proof.
    let signer = Signer::new(WEBHOOK_SECRET);
    let message = Signer::payment_proof_message(&gateway_order_id, "pay_http_1");
    let (status, verified) = send_json(
        &app,
        "POST",
        "/payments/verify",
        serde_json::json!({
            "order_id": order_id,
            "customer_id": customer_id,
            "gateway_order_id": gateway_order_id,
            "gateway_payment_id": "pay_http_1",
            "signature": signer.sign(&message),
        }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(verified["success"], true);

    // The in-memory carrier accepted the shipment, so the order is SHIPPED.
    let (_, order) = get_json(&app, &format!("/orders/{order_id}")).await;
    assert_eq!(order["status"], "SHIPPED");
    assert!(order["tracking_id"].as_str().is_some());

    // The audit log recorded the whole journey.
    let (status, events) = get_json(&app, &format!("/orders/{order_id}/events")).await;
    assert_eq!(status, StatusCode::OK);
    assert!(events.as_array().unwrap().len() >= 3);
}

#[tokio::test]
async fn test_verify_with_forged_signature_reports_failure() {
    let app = setup();
    let customer_id = new_customer_id();
    let (_, created) = send_json(&app, "POST", "/checkout", checkout_body(&customer_id)).await;
    let order_id = created["id"].as_str().unwrap().to_string();

    let (_, intent) = send_json(
        &app,
        "POST",
        &format!("/orders/{order_id}/payment-intent"),
        serde_json::json!({ "customer_id": customer_id }),
    )
    .await;

    let (status, verified) = send_json(
        &app,
        "POST",
        "/payments/verify",
        serde_json::json!({
            "order_id": order_id,
            "customer_id": customer_id,
            "gateway_order_id": intent["gateway_order_id"],
            "gateway_payment_id": "pay_http_1",
            "signature": "00ff00ff",
        }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(verified["success"], false);

    let (_, order) = get_json(&app, &format!("/orders/{order_id}")).await;
    assert_eq!(order["status"], "PENDING");
}

#[tokio::test]
async fn test_intent_for_foreign_order_is_forbidden() {
    let app = setup();
    let (_, created) =
        send_json(&app, "POST", "/checkout", checkout_body(&new_customer_id())).await;
    let order_id = created["id"].as_str().unwrap();

    let (status, _) = send_json(
        &app,
        "POST",
        &format!("/orders/{order_id}/payment-intent"),
        serde_json::json!({ "customer_id": new_customer_id() }),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_payment_webhook_rejects_bad_signature() {
    let app = setup();
    let body = serde_json::json!({ "event": "payment.failed", "payload": { "order_id": "x" } });

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/webhooks/payment")
                .header("content-type", "application/json")
                .header("x-webhook-signature", "deadbeef")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_payment_webhook_requires_signature_header() {
    let app = setup();
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/webhooks/payment")
                .header("content-type", "application/json")
                .body(Body::from("{}"))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_payment_webhook_accepts_signed_delivery() {
    let app = setup();
    let body = serde_json::json!({ "event": "invoice.expired", "payload": {} }).to_string();
    let signature = Signer::new(WEBHOOK_SECRET).sign(body.as_bytes());

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/webhooks/payment")
                .header("content-type", "application/json")
                .header("x-webhook-signature", signature)
                .body(Body::from(body))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_shipping_webhook_for_unknown_awb_is_acknowledged() {
    let app = setup();
    let (status, json) = send_json(
        &app,
        "POST",
        "/webhooks/shipping",
        serde_json::json!({ "awb": "AWB-9999", "current_status": "Delivered" }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["received"], true);
}

#[tokio::test]
async fn test_serviceability_check() {
    let app = setup();
    let (status, json) = get_json(&app, "/shipping/serviceability/560001").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["serviceable"], true);
    assert_eq!(json["postal_code"], "560001");
}

#[tokio::test]
async fn test_abandoned_orders_listing() {
    let app = setup();
    send_json(&app, "POST", "/checkout", checkout_body(&new_customer_id())).await;

    // A fresh order is not abandoned at the default threshold.
    let (status, json) = get_json(&app, "/orders/abandoned").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json.as_array().unwrap().len(), 0);

    // With a zero-hour threshold it shows up.
    let (_, json) = get_json(&app, "/orders/abandoned?older_than_hours=0").await;
    assert_eq!(json.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_return_against_pending_order_is_conflict() {
    let app = setup();
    let customer_id = new_customer_id();
    let (_, created) = send_json(&app, "POST", "/checkout", checkout_body(&customer_id)).await;
    let order_id = created["id"].as_str().unwrap();
    let item_id = created["items"][0]["id"].as_str().unwrap();

    let (status, _) = send_json(
        &app,
        "POST",
        &format!("/orders/{order_id}/returns"),
        serde_json::json!({
            "customer_id": customer_id,
            "items": [{ "order_item_id": item_id, "quantity": 1 }],
            "reason": "damaged"
        }),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_applicable_offers_for_cart() {
    let store = Arc::new(InMemoryStore::new());
    store
        .insert_offer(&pricing::Offer::new(
            "SAVE10",
            pricing::OfferKind::Percentage { percent: 10 },
        ))
        .await
        .unwrap();
    let state = api::create_default_state(store, WEBHOOK_SECRET);
    let app = api::create_app(state, get_metrics_handle());

    let (status, json) = send_json(
        &app,
        "POST",
        "/offers/applicable",
        serde_json::json!({ "items": checkout_body(&new_customer_id())["items"] }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json.as_array().unwrap().len(), 1);
    assert_eq!(json[0]["code"], "SAVE10");
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let app = setup();
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/metrics")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}
