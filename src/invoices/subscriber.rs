//! Long-lived consumer turning order-created events into invoices.

use std::sync::Arc;

use async_nats::jetstream;
use async_nats::jetstream::consumer::{pull, AckPolicy};
use futures::StreamExt;

use crate::error::AppError;
use crate::events::OrderCreatedEvent;
use crate::invoices::store::{InvoiceStore, RecordOutcome};
use crate::publisher::{order_stream_config, ORDER_CREATED_SUBJECT, ORDER_EVENTS_STREAM};

/// Durable consumer name; the broker tracks delivery state under it, so a
/// restarted subscriber resumes from its unacknowledged messages.
pub const INVOICES_CONSUMER: &str = "invoices";

/// What processing a delivery did to the invoice store.
#[derive(Debug, PartialEq, Eq)]
pub enum Processed {
    Created,
    Duplicate,
}

/// Decodes one delivery and records the invoice.
///
/// An `Err` means the delivery must stay unacknowledged so the broker
/// redelivers it; a `Duplicate` is a recognized outcome of redelivery,
/// not an error.
pub async fn process_delivery(
    store: &dyn InvoiceStore,
    payload: &[u8],
) -> Result<Processed, AppError> {
    let event: OrderCreatedEvent = serde_json::from_slice(payload)?;

    let mut amount = event.amount.round_dp(2);
    amount.rescale(2);

    match store
        .record(event.order_id, &event.client.id.to_string(), amount)
        .await?
    {
        RecordOutcome::Created(invoice) => {
            tracing::info!(order_id = %event.order_id, invoice_id = %invoice.id, "invoice created");
            Ok(Processed::Created)
        }
        RecordOutcome::Duplicate => {
            tracing::debug!(order_id = %event.order_id, "duplicate delivery, invoice already recorded");
            Ok(Processed::Duplicate)
        }
    }
}

/// Runs the subscriber until the message stream ends or the broker
/// connection is lost. Acks strictly after the invoice write is durable.
pub async fn run(client: async_nats::Client, store: Arc<dyn InvoiceStore>) -> anyhow::Result<()> {
    let jetstream = jetstream::new(client);
    let stream = jetstream
        .get_or_create_stream(order_stream_config())
        .await
        .map_err(|e| anyhow::anyhow!("order events stream unavailable: {e}"))?;

    let consumer = stream
        .get_or_create_consumer(
            INVOICES_CONSUMER,
            pull::Config {
                durable_name: Some(INVOICES_CONSUMER.to_string()),
                filter_subject: ORDER_CREATED_SUBJECT.to_string(),
                ack_policy: AckPolicy::Explicit,
                ..Default::default()
            },
        )
        .await
        .map_err(|e| anyhow::anyhow!("invoices consumer unavailable: {e}"))?;

    let mut messages = consumer
        .messages()
        .await
        .map_err(|e| anyhow::anyhow!("message stream unavailable: {e}"))?;

    tracing::info!(
        stream = ORDER_EVENTS_STREAM,
        consumer = INVOICES_CONSUMER,
        "invoice subscriber running"
    );

    while let Some(delivery) = messages.next().await {
        let message = match delivery {
            Ok(message) => message,
            Err(e) => {
                tracing::warn!(error = %e, "delivery error from broker");
                continue;
            }
        };

        match process_delivery(store.as_ref(), &message.payload).await {
            Ok(_) => {
                if let Err(e) = message.ack().await {
                    // Left unacked: the broker redelivers and the store
                    // dedup absorbs the repeat.
                    tracing::warn!(error = %e, "failed to ack processed delivery");
                }
            }
            Err(e) => {
                tracing::error!(error = %e, "processing failed, leaving delivery unacknowledged");
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::ClientRef;
    use crate::invoices::store::Invoice;
    use chrono::Utc;
    use rust_decimal::Decimal;
    use std::sync::Mutex;
    use uuid::Uuid;

    #[derive(Default)]
    struct MemoryInvoiceStore {
        invoices: Mutex<Vec<Invoice>>,
        fail_next: Mutex<bool>,
    }

    #[async_trait::async_trait]
    impl InvoiceStore for MemoryInvoiceStore {
        async fn record(
            &self,
            source_order_id: Uuid,
            client: &str,
            amount: Decimal,
        ) -> Result<RecordOutcome, AppError> {
            {
                let mut fail = self.fail_next.lock().unwrap();
                if *fail {
                    *fail = false;
                    return Err(AppError::Storage("invoice database unavailable".into()));
                }
            }

            let mut invoices = self.invoices.lock().unwrap();
            if invoices.iter().any(|i| i.source_order_id == source_order_id) {
                return Ok(RecordOutcome::Duplicate);
            }
            let invoice = Invoice {
                id: Uuid::now_v7(),
                source_order_id,
                client: client.to_string(),
                amount,
                created_at: Utc::now(),
            };
            invoices.push(invoice.clone());
            Ok(RecordOutcome::Created(invoice))
        }
    }

    fn payload(order_id: Uuid, client_id: Uuid, amount: &str) -> Vec<u8> {
        serde_json::to_vec(&OrderCreatedEvent {
            order_id,
            amount: amount.parse().unwrap(),
            client: ClientRef { id: client_id },
        })
        .unwrap()
    }

    #[tokio::test]
    async fn repeated_delivery_creates_exactly_one_invoice() {
        let store = MemoryInvoiceStore::default();
        let bytes = payload(Uuid::now_v7(), Uuid::now_v7(), "10.5");

        assert_eq!(
            process_delivery(&store, &bytes).await.unwrap(),
            Processed::Created
        );
        for _ in 0..3 {
            assert_eq!(
                process_delivery(&store, &bytes).await.unwrap(),
                Processed::Duplicate
            );
        }

        let invoices = store.invoices.lock().unwrap();
        assert_eq!(invoices.len(), 1);
        assert_eq!(invoices[0].amount.to_string(), "10.50");
    }

    #[tokio::test]
    async fn distinct_orders_never_cross_contaminate() {
        let store = MemoryInvoiceStore::default();
        let (order_a, client_a) = (Uuid::now_v7(), Uuid::now_v7());
        let (order_b, client_b) = (Uuid::now_v7(), Uuid::now_v7());

        process_delivery(&store, &payload(order_a, client_a, "10.50"))
            .await
            .unwrap();
        process_delivery(&store, &payload(order_b, client_b, "99.99"))
            .await
            .unwrap();

        let invoices = store.invoices.lock().unwrap();
        assert_eq!(invoices.len(), 2);

        let for_a = invoices.iter().find(|i| i.source_order_id == order_a).unwrap();
        assert_eq!(for_a.client, client_a.to_string());
        assert_eq!(for_a.amount.to_string(), "10.50");

        let for_b = invoices.iter().find(|i| i.source_order_id == order_b).unwrap();
        assert_eq!(for_b.client, client_b.to_string());
        assert_eq!(for_b.amount.to_string(), "99.99");
    }

    #[tokio::test]
    async fn malformed_payload_is_an_error_and_writes_nothing() {
        let store = MemoryInvoiceStore::default();

        let missing_amount =
            serde_json::json!({ "orderId": Uuid::now_v7(), "client": { "id": Uuid::now_v7() } });
        let err = process_delivery(&store, missing_amount.to_string().as_bytes())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Decode(_)));

        let err = process_delivery(&store, b"not json").await.unwrap_err();
        assert!(matches!(err, AppError::Decode(_)));

        assert!(store.invoices.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn storage_failure_then_redelivery_recovers() {
        let store = MemoryInvoiceStore::default();
        *store.fail_next.lock().unwrap() = true;
        let bytes = payload(Uuid::now_v7(), Uuid::now_v7(), "10.5");

        let err = process_delivery(&store, &bytes).await.unwrap_err();
        assert!(matches!(err, AppError::Storage(_)));
        assert!(store.invoices.lock().unwrap().is_empty());

        // Redelivery after the failure creates the invoice once.
        assert_eq!(
            process_delivery(&store, &bytes).await.unwrap(),
            Processed::Created
        );
        assert_eq!(store.invoices.lock().unwrap().len(), 1);
    }
}
