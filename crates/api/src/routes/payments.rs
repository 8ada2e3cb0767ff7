//! Payment intent, proof verification, and gateway webhook endpoints.

use std::sync::Arc;

use axum::Json;
use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::HeaderMap;
use common::{CustomerId, OrderId};
use reconcile::{
    CarrierClient, IntentResponse, Notifier, PaymentGateway, VerifyRequest, WebhookAck,
};
use serde::{Deserialize, Serialize};

use crate::Store;
use crate::error::ApiError;
use crate::routes::orders::AppState;

pub const SIGNATURE_HEADER: &str = "x-webhook-signature";

#[derive(Deserialize)]
pub struct IntentBody {
    pub customer_id: CustomerId,
}

#[derive(Serialize)]
pub struct VerifyResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<&'static str>,
}

/// POST /orders/:id/payment-intent — create a gateway intent for the order.
#[tracing::instrument(skip(state, body))]
pub async fn create_intent<S, G, C, N>(
    State(state): State<Arc<AppState<S, G, C, N>>>,
    Path(id): Path<OrderId>,
    Json(body): Json<IntentBody>,
) -> Result<Json<IntentResponse>, ApiError>
where
    S: Store + 'static,
    G: PaymentGateway + 'static,
    C: CarrierClient + 'static,
    N: Notifier + 'static,
{
    let intent = state.payments.create_intent(id, body.customer_id).await?;
    Ok(Json(intent))
}

/// POST /payments/verify — verify a client payment proof.
///
/// A failed verification is a 200 with `success: false`; only malformed
/// requests and missing orders are errors.
#[tracing::instrument(skip(state, body))]
pub async fn verify<S, G, C, N>(
    State(state): State<Arc<AppState<S, G, C, N>>>,
    Json(body): Json<VerifyRequest>,
) -> Result<Json<VerifyResponse>, ApiError>
where
    S: Store + 'static,
    G: PaymentGateway + 'static,
    C: CarrierClient + 'static,
    N: Notifier + 'static,
{
    let outcome = state.payments.verify_client_proof(body).await?;
    let success = outcome.is_success();
    Ok(Json(VerifyResponse {
        success,
        reason: (!success).then_some("signature verification failed"),
    }))
}

/// POST /webhooks/payment — gateway webhook, HMAC-signed over the raw body.
#[tracing::instrument(skip_all)]
pub async fn webhook<S, G, C, N>(
    State(state): State<Arc<AppState<S, G, C, N>>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookAck>, ApiError>
where
    S: Store + 'static,
    G: PaymentGateway + 'static,
    C: CarrierClient + 'static,
    N: Notifier + 'static,
{
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok())
        .ok_or(ApiError::Reconcile(reconcile::ReconcileError::BadSignature))?;

    let ack = state.payments.handle_webhook(&body, signature).await?;
    Ok(Json(ack))
}
