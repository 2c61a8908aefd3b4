//! Durable record of clients and orders.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::AppError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, sqlx::Type)]
#[sqlx(type_name = "order_status", rename_all = "lowercase")]
pub enum OrderStatus {
    Pending,
    Paid,
    Canceled,
}

#[derive(Clone, Debug, PartialEq, sqlx::FromRow)]
pub struct Order {
    pub id: Uuid,
    pub client_id: Uuid,
    pub amount: Decimal,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
}

/// Insert payload; id, status and timestamp are assigned at the store.
#[derive(Clone, Debug)]
pub struct NewOrder {
    pub client_id: Uuid,
    pub amount: Decimal,
}

#[async_trait]
pub trait OrderStore: Send + Sync {
    async fn client_exists(&self, client_id: Uuid) -> Result<bool, AppError>;

    /// Inserts the order as `pending` and returns the persisted row.
    async fn insert_order(&self, order: NewOrder) -> Result<Order, AppError>;
}

pub struct PgOrderStore {
    pool: PgPool,
}

impl PgOrderStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl OrderStore for PgOrderStore {
    async fn client_exists(&self, client_id: Uuid) -> Result<bool, AppError> {
        let row: Option<(Uuid,)> = sqlx::query_as("SELECT id FROM clients WHERE id = $1")
            .bind(client_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.is_some())
    }

    async fn insert_order(&self, order: NewOrder) -> Result<Order, AppError> {
        let row = sqlx::query_as::<_, Order>(
            "INSERT INTO orders (id, client_id, amount, status, created_at) VALUES ($1, $2, $3, 'pending', NOW()) RETURNING *",
        )
        .bind(Uuid::now_v7())
        .bind(order.client_id)
        .bind(order.amount)
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }
}
