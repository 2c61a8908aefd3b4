//! Order creation: validate, check the client, insert, publish.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use rust_decimal::Decimal;
use serde::Deserialize;
use uuid::Uuid;

use crate::error::AppError;
use crate::events::OrderCreatedEvent;
use crate::orders::store::{NewOrder, OrderStore};
use crate::publisher::EventPublisher;

/// Attempts given to the broker before the failure is left to reconciliation.
const PUBLISH_ATTEMPTS: u32 = 3;

/// Ceiling on waiting for a single broker ack.
const PUBLISH_TIMEOUT: Duration = Duration::from_secs(2);

const PUBLISH_BACKOFF: Duration = Duration::from_millis(50);

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn OrderStore>,
    pub publisher: Arc<dyn EventPublisher>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrderRequest {
    pub amount: RawAmount,
    pub client_id: Uuid,
}

/// The amount may arrive as a JSON number or as text.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum RawAmount {
    Number(f64),
    Text(String),
}

/// Coerces the wire amount to a non-negative decimal with exactly two
/// fractional digits, so the stored value is unambiguous regardless of
/// how the caller formatted it.
pub fn normalize_amount(raw: &RawAmount) -> Result<Decimal, AppError> {
    let parsed = match raw {
        RawAmount::Number(n) => {
            Decimal::try_from(*n).map_err(|_| AppError::InvalidAmount(n.to_string()))?
        }
        RawAmount::Text(s) => s
            .trim()
            .parse::<Decimal>()
            .map_err(|_| AppError::InvalidAmount(s.clone()))?,
    };
    if parsed.is_sign_negative() {
        return Err(AppError::InvalidAmount(parsed.to_string()));
    }
    let mut amount = parsed.round_dp(2);
    amount.rescale(2);
    Ok(amount)
}

pub async fn create_order(
    State(state): State<AppState>,
    Json(req): Json<CreateOrderRequest>,
) -> Result<StatusCode, AppError> {
    let amount = normalize_amount(&req.amount)?;

    if !state.store.client_exists(req.client_id).await? {
        return Err(AppError::ClientNotFound);
    }

    let order = state
        .store
        .insert_order(NewOrder {
            client_id: req.client_id,
            amount,
        })
        .await?;

    tracing::info!(order_id = %order.id, amount = %order.amount, "order created");

    // The insert above is the durability boundary: a publish failure must
    // not fail the request or roll the order back.
    let event = OrderCreatedEvent::from_persisted(&order);
    publish_with_retry(state.publisher.as_ref(), &event).await;

    Ok(StatusCode::CREATED)
}

/// Bounded best-effort submission. Returns whether the broker accepted
/// the event; on exhaustion the failure is logged for reconciliation.
pub(crate) async fn publish_with_retry(
    publisher: &dyn EventPublisher,
    event: &OrderCreatedEvent,
) -> bool {
    for attempt in 1..=PUBLISH_ATTEMPTS {
        match tokio::time::timeout(PUBLISH_TIMEOUT, publisher.publish(event)).await {
            Ok(Ok(())) => return true,
            Ok(Err(e)) => {
                tracing::warn!(order_id = %event.order_id, attempt, error = %e, "event submission failed");
            }
            Err(_) => {
                tracing::warn!(order_id = %event.order_id, attempt, "event submission timed out");
            }
        }
        if attempt < PUBLISH_ATTEMPTS {
            tokio::time::sleep(PUBLISH_BACKOFF).await;
        }
    }

    tracing::error!(
        order_id = %event.order_id,
        "order committed but order-created event was not accepted, needs reconciliation"
    );
    false
}
