//! Invoices service: broker consumer and the invoices database.

pub mod store;
pub mod subscriber;
