//! Shipping carrier port, in-memory fake, and HTTP adapter.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use domain::{Address, Order};
use serde::{Deserialize, Serialize};

use crate::error::ReconcileError;

/// One line of a carrier shipment payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShipmentItem {
    pub name: String,
    pub sku: String,
    pub units: u32,
    pub unit_price_cents: i64,
}

/// Carrier-facing payload built from the order snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShipmentRequest {
    pub order_number: String,
    pub shipping_address: Option<Address>,
    pub billing_address: Option<Address>,
    pub items: Vec<ShipmentItem>,
    pub payment_mode: String,
    pub total_cents: i64,
}

impl ShipmentRequest {
    /// Builds the carrier payload from an order's frozen snapshot.
    pub fn from_order(order: &Order) -> Self {
        Self {
            order_number: order.number().to_string(),
            shipping_address: order.shipping_address().cloned(),
            billing_address: order.billing_address().cloned(),
            items: order
                .items()
                .iter()
                .map(|item| ShipmentItem {
                    name: item.name.clone(),
                    sku: item.product_id.to_string(),
                    units: item.quantity,
                    unit_price_cents: item.unit_price.cents(),
                })
                .collect(),
            payment_mode: "Prepaid".to_string(),
            total_cents: order.total().cents(),
        }
    }
}

/// Result of a successful shipment registration.
#[derive(Debug, Clone)]
pub struct ShipmentCreated {
    /// Carrier-assigned tracking id (AWB).
    pub tracking_id: String,
}

/// Trait for shipping carrier operations.
#[async_trait]
pub trait CarrierClient: Send + Sync {
    /// Carrier name recorded on the order's shipment record.
    fn name(&self) -> &str;

    /// Registers a shipment and returns the assigned AWB.
    async fn create_shipment(
        &self,
        request: &ShipmentRequest,
    ) -> Result<ShipmentCreated, ReconcileError>;

    /// Read-only pre-checkout serviceability query for a postal code.
    async fn check_serviceability(&self, postal_code: &str) -> Result<bool, ReconcileError>;
}

#[derive(Debug, Default)]
struct InMemoryCarrierState {
    shipments: HashMap<String, String>,
    unserviceable: Vec<String>,
    next_id: u32,
    fail_on_create: bool,
}

/// In-memory carrier for testing.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCarrier {
    state: Arc<RwLock<InMemoryCarrierState>>,
}

impl InMemoryCarrier {
    /// Creates a new in-memory carrier.
    pub fn new() -> Self {
        Self::default()
    }

    /// Configures the carrier to fail shipment creation.
    pub fn set_fail_on_create(&self, fail: bool) {
        self.state.write().unwrap().fail_on_create = fail;
    }

    /// Marks a postal code as unserviceable.
    pub fn mark_unserviceable(&self, postal_code: &str) {
        self.state
            .write()
            .unwrap()
            .unserviceable
            .push(postal_code.to_string());
    }

    /// Returns the number of registered shipments.
    pub fn shipment_count(&self) -> usize {
        self.state.read().unwrap().shipments.len()
    }
}

#[async_trait]
impl CarrierClient for InMemoryCarrier {
    fn name(&self) -> &str {
        "in-memory"
    }

    async fn create_shipment(
        &self,
        request: &ShipmentRequest,
    ) -> Result<ShipmentCreated, ReconcileError> {
        let mut state = self.state.write().unwrap();
        if state.fail_on_create {
            return Err(ReconcileError::Carrier(
                "carrier unavailable".to_string(),
            ));
        }
        state.next_id += 1;
        let tracking_id = format!("AWB-{:04}", state.next_id);
        state
            .shipments
            .insert(tracking_id.clone(), request.order_number.clone());
        Ok(ShipmentCreated { tracking_id })
    }

    async fn check_serviceability(&self, postal_code: &str) -> Result<bool, ReconcileError> {
        let state = self.state.read().unwrap();
        Ok(!state.unserviceable.iter().any(|p| p == postal_code))
    }
}

/// Configuration for the HTTP carrier adapter.
#[derive(Debug, Clone)]
pub struct HttpCarrierConfig {
    pub base_url: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone)]
struct CachedToken {
    token: String,
    expires_at: DateTime<Utc>,
}

#[derive(Serialize)]
struct AuthRequest<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Deserialize)]
struct AuthResponse {
    token: String,
}

#[derive(Deserialize)]
struct CreateShipmentResponse {
    awb_code: String,
}

#[derive(Deserialize)]
struct ServiceabilityResponse {
    serviceable: bool,
}

/// HTTP carrier adapter with a cached auth token.
///
/// The token is shared behind an async mutex; racing re-authentications are
/// harmless, merely wasteful, so no further coordination is needed. A 401
/// from the carrier invalidates the cache and the call retries once with a
/// fresh token.
pub struct HttpCarrier {
    name: String,
    client: reqwest::Client,
    config: HttpCarrierConfig,
    token: tokio::sync::Mutex<Option<CachedToken>>,
}

impl HttpCarrier {
    /// Carrier tokens are valid for days; refresh comfortably early.
    const TOKEN_TTL_HOURS: i64 = 24 * 9;

    /// Creates a new adapter.
    pub fn new(name: impl Into<String>, config: HttpCarrierConfig) -> Self {
        Self {
            name: name.into(),
            client: reqwest::Client::new(),
            config,
            token: tokio::sync::Mutex::new(None),
        }
    }

    async fn token(&self) -> Result<String, ReconcileError> {
        let mut cached = self.token.lock().await;
        if let Some(token) = cached.as_ref()
            && token.expires_at > Utc::now()
        {
            return Ok(token.token.clone());
        }

        let response = self
            .client
            .post(format!("{}/auth/login", self.config.base_url))
            .json(&AuthRequest {
                email: &self.config.email,
                password: &self.config.password,
            })
            .send()
            .await
            .map_err(|e| ReconcileError::Carrier(format!("auth request failed: {e}")))?;
        if !response.status().is_success() {
            return Err(ReconcileError::Carrier(format!(
                "auth rejected with status {}",
                response.status()
            )));
        }
        let auth: AuthResponse = response
            .json()
            .await
            .map_err(|e| ReconcileError::Carrier(format!("auth response malformed: {e}")))?;

        *cached = Some(CachedToken {
            token: auth.token.clone(),
            expires_at: Utc::now() + Duration::hours(Self::TOKEN_TTL_HOURS),
        });
        Ok(auth.token)
    }

    async fn invalidate_token(&self) {
        *self.token.lock().await = None;
    }

    async fn post_shipment(
        &self,
        token: &str,
        request: &ShipmentRequest,
    ) -> Result<reqwest::Response, ReconcileError> {
        self.client
            .post(format!("{}/orders/create", self.config.base_url))
            .bearer_auth(token)
            .json(request)
            .send()
            .await
            .map_err(|e| ReconcileError::Carrier(format!("create shipment failed: {e}")))
    }
}

#[async_trait]
impl CarrierClient for HttpCarrier {
    fn name(&self) -> &str {
        &self.name
    }

    async fn create_shipment(
        &self,
        request: &ShipmentRequest,
    ) -> Result<ShipmentCreated, ReconcileError> {
        let token = self.token().await?;
        let mut response = self.post_shipment(&token, request).await?;

        if response.status() == reqwest::StatusCode::UNAUTHORIZED {
            // Token expired server-side; re-authenticate and retry once.
            self.invalidate_token().await;
            let token = self.token().await?;
            response = self.post_shipment(&token, request).await?;
        }

        if !response.status().is_success() {
            return Err(ReconcileError::Carrier(format!(
                "create shipment rejected with status {}",
                response.status()
            )));
        }
        let created: CreateShipmentResponse = response
            .json()
            .await
            .map_err(|e| ReconcileError::Carrier(format!("shipment response malformed: {e}")))?;
        Ok(ShipmentCreated {
            tracking_id: created.awb_code,
        })
    }

    async fn check_serviceability(&self, postal_code: &str) -> Result<bool, ReconcileError> {
        let token = self.token().await?;
        let response = self
            .client
            .get(format!("{}/courier/serviceability", self.config.base_url))
            .bearer_auth(token)
            .query(&[("delivery_postcode", postal_code)])
            .send()
            .await
            .map_err(|e| ReconcileError::Carrier(format!("serviceability check failed: {e}")))?;
        if !response.status().is_success() {
            return Err(ReconcileError::Carrier(format!(
                "serviceability check rejected with status {}",
                response.status()
            )));
        }
        let body: ServiceabilityResponse = response
            .json()
            .await
            .map_err(|e| ReconcileError::Carrier(format!("serviceability response malformed: {e}")))?;
        Ok(body.serviceable)
    }
}
