//! API server entry point.

use std::sync::Arc;

use api::Store;
use api::config::Config;
use metrics_exporter_prometheus::PrometheusHandle;
use reconcile::{CarrierClient, HttpCarrier, InMemoryCarrier, InMemoryGateway, LogNotifier, Signer};
use store::{InMemoryStore, PostgresStore};
use tokio::signal;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Waits for a shutdown signal (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install SIGINT handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("received SIGINT, starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("received SIGTERM, starting graceful shutdown");
        }
    }
}

async fn serve<S, C>(
    store: Arc<S>,
    carrier: Arc<C>,
    config: &Config,
    metrics_handle: PrometheusHandle,
) where
    S: Store + 'static,
    C: CarrierClient + 'static,
{
    let state = api::create_state(
        store,
        Arc::new(InMemoryGateway::new()),
        carrier,
        Arc::new(LogNotifier),
        Signer::new(config.webhook_secret.clone()),
    );
    let app = api::create_app(state, metrics_handle);

    let addr = config.addr();
    tracing::info!(%addr, "starting API server");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("failed to bind address");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server error");

    tracing::info!("server shut down gracefully");
}

async fn serve_with_store<S>(store: Arc<S>, config: &Config, metrics_handle: PrometheusHandle)
where
    S: Store + 'static,
{
    match config.carrier.clone() {
        Some(carrier_config) => {
            let carrier = Arc::new(HttpCarrier::new("shiprocket", carrier_config));
            serve(store, carrier, config, metrics_handle).await;
        }
        None => {
            tracing::warn!("no carrier configured, using in-memory carrier");
            serve(store, Arc::new(InMemoryCarrier::new()), config, metrics_handle).await;
        }
    }
}

#[tokio::main]
async fn main() {
    let config = Config::from_env();

    // 1. Initialize tracing
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config.log_level.clone())),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // 2. Install Prometheus metrics recorder
    let prometheus_builder = metrics_exporter_prometheus::PrometheusBuilder::new();
    let metrics_handle = prometheus_builder
        .install_recorder()
        .expect("failed to install Prometheus recorder");

    // 3. Pick the store and run
    match config.database_url.as_deref() {
        Some(url) => {
            let store = PostgresStore::connect(url)
                .await
                .expect("failed to connect to database");
            store.run_migrations().await.expect("migrations failed");
            serve_with_store(Arc::new(store), &config, metrics_handle).await;
        }
        None => {
            tracing::warn!("no DATABASE_URL configured, using in-memory store");
            serve_with_store(Arc::new(InMemoryStore::new()), &config, metrics_handle).await;
        }
    }
}
