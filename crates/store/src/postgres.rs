//! PostgreSQL-backed store implementation.
//!
//! Aggregates are persisted as JSONB documents next to the columns the
//! reconciliation paths query: `status` for the conditional updates,
//! `intent_id`/`payment_id`/`tracking_id` for indexed webhook lookups.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{OrderId, ReturnRequestId};
use domain::{Order, OrderStatus, ReturnRequest, ReturnStatus};
use pricing::Offer;
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Row};

use crate::traits::{OfferStore, OrderStore, ReturnStore};
use crate::{Result, StoreError};

/// PostgreSQL implementation of all three store traits.
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Creates a new store over an existing connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connects to the database and creates a store over a fresh pool.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await?;
        Ok(Self::new(pool))
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> std::result::Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("../../migrations").run(&self.pool).await
    }

    fn row_to_order(row: PgRow) -> Result<Order> {
        let doc: serde_json::Value = row.try_get("doc")?;
        Ok(serde_json::from_value(doc)?)
    }

    fn row_to_return(row: PgRow) -> Result<ReturnRequest> {
        let doc: serde_json::Value = row.try_get("doc")?;
        Ok(serde_json::from_value(doc)?)
    }
}

fn map_insert_err(key: &str, err: sqlx::Error) -> StoreError {
    if err
        .as_database_error()
        .is_some_and(|db| db.is_unique_violation())
    {
        StoreError::DuplicateKey(key.to_string())
    } else {
        StoreError::Database(err)
    }
}

#[async_trait]
impl OrderStore for PostgresStore {
    async fn insert_order(&self, order: &Order) -> Result<()> {
        let doc = serde_json::to_value(order)?;
        sqlx::query(
            "INSERT INTO orders (id, status, intent_id, payment_id, tracking_id, created_at, doc) \
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(order.id().as_uuid())
        .bind(order.status().as_str())
        .bind(order.payment().map(|p| p.intent_id.clone()))
        .bind(order.payment().and_then(|p| p.payment_id.clone()))
        .bind(order.shipment().map(|s| s.tracking_id.clone()))
        .bind(order.created_at())
        .bind(doc)
        .execute(&self.pool)
        .await
        .map_err(|e| map_insert_err(&order.id().to_string(), e))?;
        Ok(())
    }

    async fn get_order(&self, id: OrderId) -> Result<Option<Order>> {
        let row = sqlx::query("SELECT doc FROM orders WHERE id = $1")
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;
        row.map(Self::row_to_order).transpose()
    }

    async fn find_by_intent(&self, intent_id: &str) -> Result<Option<Order>> {
        let row = sqlx::query("SELECT doc FROM orders WHERE intent_id = $1")
            .bind(intent_id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(Self::row_to_order).transpose()
    }

    async fn find_by_payment(&self, payment_id: &str) -> Result<Option<Order>> {
        let row = sqlx::query("SELECT doc FROM orders WHERE payment_id = $1")
            .bind(payment_id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(Self::row_to_order).transpose()
    }

    async fn find_by_tracking(&self, tracking_id: &str) -> Result<Option<Order>> {
        let row = sqlx::query("SELECT doc FROM orders WHERE tracking_id = $1")
            .bind(tracking_id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(Self::row_to_order).transpose()
    }

    async fn update_order_if_status(&self, order: &Order, expected: OrderStatus) -> Result<bool> {
        let doc = serde_json::to_value(order)?;
        // Single conditional update: the status predicate closes the race
        // between loading the order and writing the transition.
        let result = sqlx::query(
            "UPDATE orders \
             SET status = $1, intent_id = $2, payment_id = $3, tracking_id = $4, doc = $5 \
             WHERE id = $6 AND status = $7",
        )
        .bind(order.status().as_str())
        .bind(order.payment().map(|p| p.intent_id.clone()))
        .bind(order.payment().and_then(|p| p.payment_id.clone()))
        .bind(order.shipment().map(|s| s.tracking_id.clone()))
        .bind(doc)
        .bind(order.id().as_uuid())
        .bind(expected.as_str())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn find_stale_pending(&self, cutoff: DateTime<Utc>) -> Result<Vec<Order>> {
        let rows = sqlx::query(
            "SELECT doc FROM orders WHERE status = $1 AND created_at < $2 ORDER BY created_at",
        )
        .bind(OrderStatus::Pending.as_str())
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(Self::row_to_order).collect()
    }
}

#[async_trait]
impl OfferStore for PostgresStore {
    async fn insert_offer(&self, offer: &Offer) -> Result<()> {
        let doc = serde_json::to_value(offer)?;
        sqlx::query(
            "INSERT INTO offers (code, usage_limit, usage_count, doc) VALUES ($1, $2, $3, $4)",
        )
        .bind(&offer.code)
        .bind(offer.usage_limit.map(|l| l as i32))
        .bind(offer.usage_count as i32)
        .bind(doc)
        .execute(&self.pool)
        .await
        .map_err(|e| map_insert_err(&offer.code, e))?;
        Ok(())
    }

    async fn get_offer(&self, code: &str) -> Result<Option<Offer>> {
        let row = sqlx::query("SELECT doc FROM offers WHERE code = $1")
            .bind(code)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| {
            let doc: serde_json::Value = r.try_get("doc")?;
            Ok(serde_json::from_value(doc)?)
        })
        .transpose()
    }

    async fn list_offers(&self) -> Result<Vec<Offer>> {
        let rows = sqlx::query("SELECT doc FROM offers ORDER BY code")
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter()
            .map(|r| {
                let doc: serde_json::Value = r.try_get("doc")?;
                Ok(serde_json::from_value(doc)?)
            })
            .collect()
    }

    async fn increment_usage(&self, code: &str) -> Result<bool> {
        // Atomic guarded increment: the limit is re-checked inside the same
        // update, so concurrent checkouts cannot over-redeem. The document's
        // counter is kept in step with the column.
        let result = sqlx::query(
            "UPDATE offers \
             SET usage_count = usage_count + 1, \
                 doc = jsonb_set(doc, '{usage_count}', to_jsonb(usage_count + 1)) \
             WHERE code = $1 AND (usage_limit IS NULL OR usage_count < usage_limit)",
        )
        .bind(code)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl ReturnStore for PostgresStore {
    async fn insert_return(&self, request: &ReturnRequest) -> Result<()> {
        let doc = serde_json::to_value(request)?;
        sqlx::query(
            "INSERT INTO return_requests (id, order_id, status, created_at, doc) \
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(request.id().as_uuid())
        .bind(request.order_id().as_uuid())
        .bind(request.status().as_str())
        .bind(request.created_at())
        .bind(doc)
        .execute(&self.pool)
        .await
        .map_err(|e| map_insert_err(&request.id().to_string(), e))?;
        Ok(())
    }

    async fn get_return(&self, id: ReturnRequestId) -> Result<Option<ReturnRequest>> {
        let row = sqlx::query("SELECT doc FROM return_requests WHERE id = $1")
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;
        row.map(Self::row_to_return).transpose()
    }

    async fn list_returns_for_order(&self, order_id: OrderId) -> Result<Vec<ReturnRequest>> {
        let rows = sqlx::query(
            "SELECT doc FROM return_requests WHERE order_id = $1 ORDER BY created_at",
        )
        .bind(order_id.as_uuid())
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(Self::row_to_return).collect()
    }

    async fn update_return_if_status(
        &self,
        request: &ReturnRequest,
        expected: ReturnStatus,
    ) -> Result<bool> {
        let doc = serde_json::to_value(request)?;
        let result = sqlx::query(
            "UPDATE return_requests SET status = $1, doc = $2 WHERE id = $3 AND status = $4",
        )
        .bind(request.status().as_str())
        .bind(doc)
        .bind(request.id().as_uuid())
        .bind(expected.as_str())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }
}
