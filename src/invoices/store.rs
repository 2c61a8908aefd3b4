//! Durable record of invoices, keyed by the order that produced them.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::AppError;

#[derive(Clone, Debug, PartialEq, sqlx::FromRow)]
pub struct Invoice {
    pub id: Uuid,
    pub source_order_id: Uuid,
    pub client: String,
    pub amount: Decimal,
    pub created_at: DateTime<Utc>,
}

/// Outcome of recording an invoice for an order.
#[derive(Debug, PartialEq)]
pub enum RecordOutcome {
    /// First delivery for this order; a row was written.
    Created(Invoice),
    /// The order was already invoiced; nothing was written.
    Duplicate,
}

#[async_trait]
pub trait InvoiceStore: Send + Sync {
    /// Writes the invoice for `source_order_id` unless one already
    /// exists. The unique constraint on the source order id is the dedup
    /// ledger: one durable write is both the invoice and the record that
    /// this order was processed.
    async fn record(
        &self,
        source_order_id: Uuid,
        client: &str,
        amount: Decimal,
    ) -> Result<RecordOutcome, AppError>;
}

pub struct PgInvoiceStore {
    pool: PgPool,
}

impl PgInvoiceStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl InvoiceStore for PgInvoiceStore {
    async fn record(
        &self,
        source_order_id: Uuid,
        client: &str,
        amount: Decimal,
    ) -> Result<RecordOutcome, AppError> {
        let row = sqlx::query_as::<_, Invoice>(
            "INSERT INTO invoices (id, source_order_id, client, amount, created_at) VALUES ($1, $2, $3, $4, NOW()) ON CONFLICT (source_order_id) DO NOTHING RETURNING *",
        )
        .bind(Uuid::now_v7())
        .bind(source_order_id)
        .bind(client)
        .bind(amount)
        .fetch_optional(&self.pool)
        .await?;

        Ok(match row {
            Some(invoice) => RecordOutcome::Created(invoice),
            None => RecordOutcome::Duplicate,
        })
    }
}
