//! Wire schema for the order-created topic.
//!
//! The JSON payload `{ "orderId": ..., "amount": ..., "client": { "id": ... } }`
//! is the contract between the two services. Decoding ignores unknown
//! fields so either side can add data without breaking the other; a
//! missing required field is a decode error.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::orders::store::Order;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderCreatedEvent {
    pub order_id: Uuid,
    /// A JSON number on the wire; stores keep the exact decimal.
    #[serde(with = "rust_decimal::serde::float")]
    pub amount: Decimal,
    pub client: ClientRef,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ClientRef {
    pub id: Uuid,
}

impl OrderCreatedEvent {
    /// Projects the persisted row, never the request, so retries and
    /// replays carry the canonical stored amount.
    pub fn from_persisted(order: &Order) -> Self {
        Self {
            order_id: order.id,
            amount: order.amount,
            client: ClientRef {
                id: order.client_id,
            },
        }
    }
}
