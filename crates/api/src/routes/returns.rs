//! Return request and resolution endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use common::{CustomerId, OrderId, ReturnRequestId};
use domain::{ReturnItem, ReturnRequest};
use reconcile::{CarrierClient, Notifier, PaymentGateway, ReturnDecision};
use serde::{Deserialize, Serialize};

use crate::Store;
use crate::error::ApiError;
use crate::routes::orders::AppState;

#[derive(Deserialize)]
pub struct CreateReturnBody {
    pub customer_id: CustomerId,
    pub items: Vec<ReturnItem>,
    pub reason: String,
}

#[derive(Deserialize)]
pub struct ResolveBody {
    pub decision: ReturnDecision,
    pub comment: Option<String>,
}

#[derive(Serialize)]
pub struct ReturnResponse {
    pub id: String,
    pub order_id: String,
    pub status: String,
    pub reason: String,
    pub operator_comment: Option<String>,
    pub refund_amount_cents: Option<i64>,
    pub gateway_refund_id: Option<String>,
}

impl ReturnResponse {
    fn from_request(request: &ReturnRequest) -> Self {
        Self {
            id: request.id().to_string(),
            order_id: request.order_id().to_string(),
            status: request.status().to_string(),
            reason: request.reason().to_string(),
            operator_comment: request.operator_comment().map(String::from),
            refund_amount_cents: request.refund().map(|r| r.amount.cents()),
            gateway_refund_id: request.refund().map(|r| r.gateway_refund_id.clone()),
        }
    }
}

/// POST /orders/:id/returns — open a return request against a delivered order.
#[tracing::instrument(skip(state, body))]
pub async fn create<S, G, C, N>(
    State(state): State<Arc<AppState<S, G, C, N>>>,
    Path(order_id): Path<OrderId>,
    Json(body): Json<CreateReturnBody>,
) -> Result<(StatusCode, Json<ReturnResponse>), ApiError>
where
    S: Store + 'static,
    G: PaymentGateway + 'static,
    C: CarrierClient + 'static,
    N: Notifier + 'static,
{
    let request = state
        .returns
        .create_return_request(order_id, body.customer_id, body.items, body.reason)
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(ReturnResponse::from_request(&request)),
    ))
}

/// POST /returns/:id/resolve — operator decision on a return request.
#[tracing::instrument(skip(state, body))]
pub async fn resolve<S, G, C, N>(
    State(state): State<Arc<AppState<S, G, C, N>>>,
    Path(return_id): Path<ReturnRequestId>,
    Json(body): Json<ResolveBody>,
) -> Result<Json<ReturnResponse>, ApiError>
where
    S: Store + 'static,
    G: PaymentGateway + 'static,
    C: CarrierClient + 'static,
    N: Notifier + 'static,
{
    let request = state
        .returns
        .resolve(return_id, body.decision, body.comment)
        .await?;
    Ok(Json(ReturnResponse::from_request(&request)))
}
