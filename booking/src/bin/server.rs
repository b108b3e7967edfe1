//! Courtside booking HTTP server.

use anyhow::Context;
use booking::{
    config::{Config, StoreBackend},
    metrics::register_business_metrics,
    payment_gateway::GatewayClient,
    server::{build_router, cors_layer},
    store::{BookingStore, InMemoryBookingStore, PostgresBookingStore},
    BookingApp,
};
use courtside_core::environment::SystemClock;
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,booking=debug,sqlx=warn,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Courtside booking server");

    let config = Config::from_env();
    info!(
        app_env = %config.app_env,
        store = ?config.store.backend,
        gateway_configured = config.gateway_configured(),
        "Configuration loaded"
    );

    let metrics_addr: SocketAddr = format!("{}:{}", config.server.metrics_host, config.server.metrics_port)
        .parse()
        .context("invalid metrics address")?;
    PrometheusBuilder::new()
        .with_http_listener(metrics_addr)
        .install()
        .context("failed to install Prometheus exporter")?;
    register_business_metrics();
    info!(address = %metrics_addr, "Prometheus metrics available at /metrics");

    let gateway = GatewayClient::from_config(&config)?;

    match config.store.backend {
        StoreBackend::Postgres => {
            info!("Connecting to PostgreSQL...");
            let store = PostgresBookingStore::connect(&config.store)
                .await
                .context("failed to connect to PostgreSQL")?;
            serve(Arc::new(store), gateway, &config).await
        }
        StoreBackend::Memory => {
            warn!("Using the in-memory store, data is lost on restart");
            serve(Arc::new(InMemoryBookingStore::new()), gateway, &config).await
        }
    }
}

async fn serve<S: BookingStore>(store: Arc<S>, gateway: GatewayClient, config: &Config) -> anyhow::Result<()> {
    let app = BookingApp::new(store, Arc::new(SystemClock), gateway, config.booking.clone());

    if config.booking.seed_catalog && app.seed_catalog().await? {
        info!("Seeded default courts and timeslots");
    }

    let router = build_router(app).layer(cors_layer(&config.server.frontend_url));

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(address = %addr, "HTTP server listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shut down");
    Ok(())
}

/// Resolves on Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            error!(error = %err, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(err) => {
                error!(error = %err, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("Received Ctrl+C, shutting down gracefully"),
        () = terminate => info!("Received SIGTERM, shutting down gracefully"),
    }
}
