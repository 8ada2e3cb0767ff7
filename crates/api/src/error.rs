//! API error types with HTTP response mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use domain::{OrderError, ReturnError};
use reconcile::ReconcileError;

/// API-level error type that maps to HTTP responses.
#[derive(Debug)]
pub enum ApiError {
    /// Resource not found.
    NotFound(String),
    /// Bad request from the client.
    BadRequest(String),
    /// Reconciliation or domain error.
    Reconcile(ReconcileError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Reconcile(err) => reconcile_error_to_response(err),
        };

        let body = serde_json::json!({ "error": message });
        (status, axum::Json(body)).into_response()
    }
}

fn reconcile_error_to_response(err: ReconcileError) -> (StatusCode, String) {
    let status = match &err {
        ReconcileError::OrderNotFound(_) | ReconcileError::ReturnNotFound(_) => {
            StatusCode::NOT_FOUND
        }
        ReconcileError::BadSignature => {
            tracing::warn!("rejected webhook with bad signature");
            StatusCode::UNAUTHORIZED
        }
        ReconcileError::Order(order_err) => match order_err {
            OrderError::NotOwner => StatusCode::FORBIDDEN,
            OrderError::InvalidStatus { .. } => StatusCode::CONFLICT,
            OrderError::NoItems
            | OrderError::InvalidQuantity { .. }
            | OrderError::InvalidPrice { .. }
            | OrderError::PricingMismatch { .. } => StatusCode::BAD_REQUEST,
        },
        ReconcileError::Return(return_err) => match return_err {
            ReturnError::NotOwner => StatusCode::FORBIDDEN,
            ReturnError::InvalidStatus { .. }
            | ReturnError::OrderNotDelivered { .. }
            | ReturnError::QuantityExceedsReturnable { .. } => StatusCode::CONFLICT,
            ReturnError::NoItems | ReturnError::UnknownOrderItem { .. } => StatusCode::BAD_REQUEST,
        },
        ReconcileError::CouponRejected(_) | ReconcileError::Payload(_) => StatusCode::BAD_REQUEST,
        ReconcileError::Gateway(_) | ReconcileError::Carrier(_) => {
            tracing::error!(error = %err, "upstream service failure");
            StatusCode::BAD_GATEWAY
        }
        ReconcileError::NoCapturedPayment(_) | ReconcileError::WriteContention { .. } => {
            StatusCode::CONFLICT
        }
        ReconcileError::Store(_) => {
            tracing::error!(error = %err, "store failure");
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    (status, err.to_string())
}

impl From<ReconcileError> for ApiError {
    fn from(err: ReconcileError) -> Self {
        ApiError::Reconcile(err)
    }
}
