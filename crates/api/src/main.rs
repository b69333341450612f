//! API server entry point.

use std::sync::Arc;

use api::config::{Config, LogFormat};
use integrations::{InMemoryFileShare, InMemoryObjectStorage, PostgresQueuePublisher};
use sqlx::postgres::PgPoolOptions;
use table_store::PostgresTableBackend;
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

fn init_tracing(config: &Config) {
    let filter = EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);
    match config.log_format {
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
        LogFormat::Pretty => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}

#[tokio::main]
async fn main() {
    // 1. Load configuration and initialize tracing
    let config = Config::from_env();
    init_tracing(&config);

    // 2. Install Prometheus metrics recorder
    let prometheus_builder = metrics_exporter_prometheus::PrometheusBuilder::new();
    let metrics_handle = prometheus_builder
        .install_recorder()
        .expect("failed to install Prometheus recorder");

    // 3. Create storage and application state
    let app = match &config.database_url {
        Some(url) => {
            let pool = PgPoolOptions::new()
                .max_connections(10)
                .connect(url)
                .await
                .expect("failed to connect to PostgreSQL");
            let backend = PostgresTableBackend::new(pool.clone())
                .with_page_size(config.scan_page_size);
            backend
                .run_migrations()
                .await
                .expect("failed to run migrations");
            let publisher = Arc::new(PostgresQueuePublisher::new(
                pool,
                config.queue_name.as_str(),
            ));
            let storage = Arc::new(InMemoryObjectStorage::new(config.blob_container.as_str()));
            let files = Arc::new(InMemoryFileShare::new(config.contracts_share.as_str()));
            tracing::info!(queue = %config.queue_name, "using PostgreSQL storage");

            let state = api::create_state(
                backend,
                storage,
                files,
                publisher,
                config.relocation_strategy,
            );
            api::create_app(state, metrics_handle)
        }
        None => {
            tracing::warn!("DATABASE_URL not set, using in-memory storage");
            let in_memory = api::create_default_state(
                config.relocation_strategy,
                &config.blob_container,
                &config.contracts_share,
                config.scan_page_size,
            );
            api::create_app(in_memory.state, metrics_handle)
        }
    };

    // 4. Start server
    let addr = config.addr();
    tracing::info!(
        %addr,
        relocation = %config.relocation_strategy,
        "starting API server"
    );

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("failed to bind address");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server error");

    tracing::info!("server shut down gracefully");
}
