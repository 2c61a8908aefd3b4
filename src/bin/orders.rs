//! Orders service: accepts order creation over HTTP, persists the order,
//! then hands the order-created event to the broker.

use std::sync::Arc;

use anyhow::Result;
use axum::routing::{get, post};
use axum::Router;
use sqlx::postgres::PgPoolOptions;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use orderflow::orders::handler::{create_order, AppState};
use orderflow::orders::store::PgOrderStore;
use orderflow::publisher::JetStreamPublisher;

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
    sqlx::migrate!("./migrations/orders").run(&db).await?;

    let nats = async_nats::connect(&std::env::var("NATS_URL")?).await?;
    let publisher = JetStreamPublisher::new(nats).await?;

    let state = AppState {
        store: Arc::new(PgOrderStore::new(db)),
        publisher: Arc::new(publisher),
    };

    let app = Router::new()
        .route("/health", get(|| async { "OK" }))
        .route("/orders", post(create_order))
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let port = std::env::var("PORT").unwrap_or_else(|_| "3000".to_string());
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port)).await?;
    tracing::info!("[Orders] HTTP server listening on 0.0.0.0:{}", port);
    axum::serve(listener, app).await?;
    Ok(())
}
