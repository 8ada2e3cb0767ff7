//! Checkout and order read endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use common::{CustomerId, Money, OrderId};
use domain::{Address, CartItem, Order, OrderEvent};
use reconcile::{
    CarrierClient, CheckoutRequest, CheckoutService, Notifier, PaymentGateway,
    PaymentReconciliation, ReturnWorkflow, ShippingReconciliation,
};
use serde::{Deserialize, Serialize};

use crate::Store;
use crate::error::ApiError;

/// Shared application state accessible from all handlers.
pub struct AppState<S, G, C, N> {
    pub store: Arc<S>,
    pub checkout: CheckoutService<S>,
    pub payments: PaymentReconciliation<S, G, C, N>,
    pub shipping: ShippingReconciliation<S, C, N>,
    pub returns: ReturnWorkflow<S, G, N>,
}

// -- Request types --

#[derive(Deserialize)]
pub struct CheckoutBody {
    pub customer_id: CustomerId,
    pub items: Vec<CheckoutItem>,
    pub coupon_code: Option<String>,
    #[serde(default)]
    pub tax_cents: i64,
    #[serde(default)]
    pub shipping_cost_cents: i64,
    pub shipping_address: Option<Address>,
    pub billing_address: Option<Address>,
}

#[derive(Deserialize)]
pub struct CheckoutItem {
    pub product_id: String,
    pub name: String,
    pub category_id: Option<String>,
    pub quantity: u32,
    pub unit_price_cents: i64,
}

#[derive(Deserialize)]
pub struct ApplicableOffersBody {
    pub items: Vec<CheckoutItem>,
}

#[derive(Debug, Deserialize)]
pub struct AbandonedParams {
    /// Age threshold in hours; defaults to 24.
    pub older_than_hours: Option<i64>,
}

// -- Response types --

#[derive(Serialize)]
pub struct OrderResponse {
    pub id: String,
    pub number: String,
    pub customer_id: String,
    pub status: String,
    pub subtotal_cents: i64,
    pub discount_cents: i64,
    pub tax_cents: i64,
    pub shipping_cost_cents: i64,
    pub total_cents: i64,
    pub coupon_code: Option<String>,
    pub tracking_id: Option<String>,
    pub items: Vec<OrderItemResponse>,
}

#[derive(Serialize)]
pub struct OrderItemResponse {
    pub id: String,
    pub product_id: String,
    pub name: String,
    pub quantity: u32,
    pub unit_price_cents: i64,
    pub discount_per_unit_cents: i64,
}

impl OrderResponse {
    pub fn from_order(order: &Order) -> Self {
        Self {
            id: order.id().to_string(),
            number: order.number().to_string(),
            customer_id: order.customer_id().to_string(),
            status: order.status().to_string(),
            subtotal_cents: order.subtotal().cents(),
            discount_cents: order.discount_total().cents(),
            tax_cents: order.tax().cents(),
            shipping_cost_cents: order.shipping_cost().cents(),
            total_cents: order.total().cents(),
            coupon_code: order.coupon().map(|c| c.code.clone()),
            tracking_id: order.shipment().map(|s| s.tracking_id.clone()),
            items: order
                .items()
                .iter()
                .map(|item| OrderItemResponse {
                    id: item.id.to_string(),
                    product_id: item.product_id.to_string(),
                    name: item.name.clone(),
                    quantity: item.quantity,
                    unit_price_cents: item.unit_price.cents(),
                    discount_per_unit_cents: item.discount_per_unit.cents(),
                })
                .collect(),
        }
    }
}

// -- Handlers --

/// POST /checkout — validate, price, and place an order.
#[tracing::instrument(skip(state, body))]
pub async fn checkout<S, G, C, N>(
    State(state): State<Arc<AppState<S, G, C, N>>>,
    Json(body): Json<CheckoutBody>,
) -> Result<(StatusCode, Json<OrderResponse>), ApiError>
where
    S: Store + 'static,
    G: PaymentGateway + 'static,
    C: CarrierClient + 'static,
    N: Notifier + 'static,
{
    let items: Vec<CartItem> = body
        .items
        .into_iter()
        .map(|item| CartItem {
            product_id: item.product_id.into(),
            name: item.name,
            category_id: item.category_id,
            quantity: item.quantity,
            unit_price: Money::from_cents(item.unit_price_cents),
        })
        .collect();

    let order = state
        .checkout
        .place_order(CheckoutRequest {
            customer_id: body.customer_id,
            items,
            coupon_code: body.coupon_code,
            tax: Money::from_cents(body.tax_cents),
            shipping_cost: Money::from_cents(body.shipping_cost_cents),
            shipping_address: body.shipping_address,
            billing_address: body.billing_address,
        })
        .await?;

    Ok((StatusCode::CREATED, Json(OrderResponse::from_order(&order))))
}

/// POST /offers/applicable — offers currently applicable to a cart.
#[tracing::instrument(skip(state, body))]
pub async fn applicable_offers<S, G, C, N>(
    State(state): State<Arc<AppState<S, G, C, N>>>,
    Json(body): Json<ApplicableOffersBody>,
) -> Result<Json<Vec<pricing::Offer>>, ApiError>
where
    S: Store + 'static,
    G: PaymentGateway + 'static,
    C: CarrierClient + 'static,
    N: Notifier + 'static,
{
    let items: Vec<CartItem> = body
        .items
        .into_iter()
        .map(|item| CartItem {
            product_id: item.product_id.into(),
            name: item.name,
            category_id: item.category_id,
            quantity: item.quantity,
            unit_price: Money::from_cents(item.unit_price_cents),
        })
        .collect();
    let offers = state.checkout.applicable_offers(&items).await?;
    Ok(Json(offers))
}

/// GET /orders/:id — load an order by id.
#[tracing::instrument(skip(state))]
pub async fn get<S, G, C, N>(
    State(state): State<Arc<AppState<S, G, C, N>>>,
    Path(id): Path<OrderId>,
) -> Result<Json<OrderResponse>, ApiError>
where
    S: Store + 'static,
    G: PaymentGateway + 'static,
    C: CarrierClient + 'static,
    N: Notifier + 'static,
{
    let order = load_order(state.store.as_ref(), id).await?;
    Ok(Json(OrderResponse::from_order(&order)))
}

/// GET /orders/:id/events — the order's append-only audit log.
#[tracing::instrument(skip(state))]
pub async fn events<S, G, C, N>(
    State(state): State<Arc<AppState<S, G, C, N>>>,
    Path(id): Path<OrderId>,
) -> Result<Json<Vec<OrderEvent>>, ApiError>
where
    S: Store + 'static,
    G: PaymentGateway + 'static,
    C: CarrierClient + 'static,
    N: Notifier + 'static,
{
    let order = load_order(state.store.as_ref(), id).await?;
    Ok(Json(order.events().to_vec()))
}

/// GET /orders/abandoned — orders still pending past the age threshold.
#[tracing::instrument(skip(state))]
pub async fn abandoned<S, G, C, N>(
    State(state): State<Arc<AppState<S, G, C, N>>>,
    Query(params): Query<AbandonedParams>,
) -> Result<Json<Vec<OrderResponse>>, ApiError>
where
    S: Store + 'static,
    G: PaymentGateway + 'static,
    C: CarrierClient + 'static,
    N: Notifier + 'static,
{
    let older_than = chrono::Duration::hours(params.older_than_hours.unwrap_or(24));
    let orders = state.checkout.stale_pending(older_than).await?;
    Ok(Json(orders.iter().map(OrderResponse::from_order).collect()))
}

pub(crate) async fn load_order<S: Store>(store: &S, id: OrderId) -> Result<Order, ApiError> {
    store
        .get_order(id)
        .await
        .map_err(reconcile::ReconcileError::from)?
        .ok_or_else(|| ApiError::NotFound(format!("Order {id} not found")))
}
