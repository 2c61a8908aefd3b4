//! Invoices service: consumes order-created events into invoices and
//! serves a liveness endpoint.

use std::future::IntoFuture;
use std::sync::Arc;

use anyhow::Result;
use axum::routing::get;
use axum::Router;
use sqlx::postgres::PgPoolOptions;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use orderflow::invoices::store::PgInvoiceStore;
use orderflow::invoices::subscriber;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let db = PgPoolOptions::new()
        .max_connections(10)
        .connect(&std::env::var("DATABASE_URL")?)
        .await?;
    sqlx::migrate!("./migrations/invoices").run(&db).await?;

    let nats = async_nats::connect(&std::env::var("NATS_URL")?).await?;
    let store = Arc::new(PgInvoiceStore::new(db));
    let worker = tokio::spawn(subscriber::run(nats, store));

    let app = Router::new()
        .route("/health", get(|| async { "OK" }))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let port = std::env::var("PORT").unwrap_or_else(|_| "3001".to_string());
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port)).await?;
    tracing::info!("[Invoices] HTTP server listening on 0.0.0.0:{}", port);

    // A dead subscriber takes the process down so the supervisor restarts
    // it; the broker redelivers anything unacknowledged.
    tokio::select! {
        served = axum::serve(listener, app).into_future() => served?,
        joined = worker => joined??,
    }
    Ok(())
}
