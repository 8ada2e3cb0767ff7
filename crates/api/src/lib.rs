//! HTTP API server with observability for the order lifecycle core.
//!
//! Exposes REST endpoints for checkout, payment verification, gateway and
//! carrier webhooks, and returns, with structured logging (tracing) and
//! Prometheus metrics.

pub mod config;
pub mod error;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use metrics_exporter_prometheus::PrometheusHandle;
use reconcile::{
    CarrierClient, CheckoutService, InMemoryCarrier, InMemoryGateway, LogNotifier, Notifier,
    PaymentGateway, PaymentReconciliation, ReturnWorkflow, ShippingReconciliation, Signer,
};
use store::{OfferStore, OrderStore, ReturnStore};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use routes::orders::AppState;

/// The full persistence surface the API needs from one store.
pub trait Store: OrderStore + OfferStore + ReturnStore {}

impl<T: OrderStore + OfferStore + ReturnStore> Store for T {}

/// Creates the Axum application router with all routes and shared state.
pub fn create_app<S, G, C, N>(
    state: Arc<AppState<S, G, C, N>>,
    metrics_handle: PrometheusHandle,
) -> Router
where
    S: Store + 'static,
    G: PaymentGateway + 'static,
    C: CarrierClient + 'static,
    N: Notifier + 'static,
{
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check))
        .route("/checkout", post(routes::orders::checkout::<S, G, C, N>))
        .route(
            "/offers/applicable",
            post(routes::orders::applicable_offers::<S, G, C, N>),
        )
        .route("/orders/abandoned", get(routes::orders::abandoned::<S, G, C, N>))
        .route("/orders/{id}", get(routes::orders::get::<S, G, C, N>))
        .route("/orders/{id}/events", get(routes::orders::events::<S, G, C, N>))
        .route(
            "/orders/{id}/payment-intent",
            post(routes::payments::create_intent::<S, G, C, N>),
        )
        .route("/payments/verify", post(routes::payments::verify::<S, G, C, N>))
        .route("/webhooks/payment", post(routes::payments::webhook::<S, G, C, N>))
        .route("/webhooks/shipping", post(routes::shipping::webhook::<S, G, C, N>))
        .route(
            "/shipping/serviceability/{postal_code}",
            get(routes::shipping::serviceability::<S, G, C, N>),
        )
        .route("/orders/{id}/returns", post(routes::returns::create::<S, G, C, N>))
        .route("/returns/{id}/resolve", post(routes::returns::resolve::<S, G, C, N>))
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}

/// Wires the reconciliation services over one store and one set of adapters.
pub fn create_state<S, G, C, N>(
    store: Arc<S>,
    gateway: Arc<G>,
    carrier: Arc<C>,
    notifier: Arc<N>,
    signer: Signer,
) -> Arc<AppState<S, G, C, N>>
where
    S: Store + 'static,
    G: PaymentGateway + 'static,
    C: CarrierClient + 'static,
    N: Notifier + 'static,
{
    Arc::new(AppState {
        checkout: CheckoutService::new(store.clone()),
        payments: PaymentReconciliation::new(
            store.clone(),
            gateway.clone(),
            carrier.clone(),
            notifier.clone(),
            signer,
        ),
        shipping: ShippingReconciliation::new(store.clone(), carrier, notifier.clone()),
        returns: ReturnWorkflow::new(store.clone(), gateway, notifier),
        store,
    })
}

/// Creates application state with in-memory adapters; used in tests and when
/// no external services are configured.
pub fn create_default_state<S>(
    store: Arc<S>,
    webhook_secret: &str,
) -> Arc<AppState<S, InMemoryGateway, InMemoryCarrier, LogNotifier>>
where
    S: Store + 'static,
{
    create_state(
        store,
        Arc::new(InMemoryGateway::new()),
        Arc::new(InMemoryCarrier::new()),
        Arc::new(LogNotifier),
        Signer::new(webhook_secret),
    )
}
