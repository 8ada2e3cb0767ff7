//! Carrier webhook and serviceability endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use reconcile::{CarrierClient, Notifier, PaymentGateway, ShippingWebhook, WebhookAck};
use serde::Serialize;

use crate::Store;
use crate::error::ApiError;
use crate::routes::orders::AppState;

#[derive(Serialize)]
pub struct ServiceabilityResponse {
    pub postal_code: String,
    pub serviceable: bool,
}

/// POST /webhooks/shipping — carrier status update, keyed by AWB.
#[tracing::instrument(skip(state, body))]
pub async fn webhook<S, G, C, N>(
    State(state): State<Arc<AppState<S, G, C, N>>>,
    Json(body): Json<ShippingWebhook>,
) -> Result<Json<WebhookAck>, ApiError>
where
    S: Store + 'static,
    G: PaymentGateway + 'static,
    C: CarrierClient + 'static,
    N: Notifier + 'static,
{
    let ack = state.shipping.handle_webhook(body).await?;
    Ok(Json(ack))
}

/// GET /shipping/serviceability/:postal_code — carrier coverage probe.
#[tracing::instrument(skip(state))]
pub async fn serviceability<S, G, C, N>(
    State(state): State<Arc<AppState<S, G, C, N>>>,
    Path(postal_code): Path<String>,
) -> Result<Json<ServiceabilityResponse>, ApiError>
where
    S: Store + 'static,
    G: PaymentGateway + 'static,
    C: CarrierClient + 'static,
    N: Notifier + 'static,
{
    let serviceable = state.shipping.check_serviceability(&postal_code).await?;
    Ok(Json(ServiceabilityResponse {
        postal_code,
        serviceable,
    }))
}
