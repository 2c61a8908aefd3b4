//! Orders and invoices connected by asynchronous messaging.
//!
//! Creating an order durably records it in the orders database, then hands
//! an `order-created` event to the broker for at-least-once delivery. The
//! invoices service consumes the topic and writes exactly one invoice per
//! order. The order insert is the durability boundary: publishing is
//! retried a bounded number of times and escalated to reconciliation
//! rather than failing the request, and the consumer absorbs redeliveries
//! against the invoice table's uniqueness on the source order id.

pub mod error;
pub mod events;
pub mod invoices;
pub mod orders;
pub mod publisher;
