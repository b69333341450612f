//! HTTP API server with observability for the retail back office.
//!
//! Provides REST endpoints for customers, products, orders and contract
//! documents, with structured logging (tracing) and Prometheus metrics.

pub mod config;
pub mod error;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::routing::{get, put};
use domain::{ContractService, CustomerService, OrderService, ProductService, RelocationStrategy};
use integrations::{
    EventPublisher, FileShare, InMemoryEventPublisher, InMemoryFileShare, InMemoryObjectStorage,
    ObjectStorage,
};
use metrics_exporter_prometheus::PrometheusHandle;
use table_store::{InMemoryTableBackend, TableBackend};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Largest accepted image or contract upload.
const MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

/// Shared application state accessible from all handlers.
pub struct AppState<B: TableBackend> {
    pub customers: CustomerService<B>,
    pub products: ProductService<B>,
    pub orders: OrderService<B>,
    pub contracts: ContractService,
}

/// Creates the Axum application router with all routes and shared state.
pub fn create_app<B: TableBackend + Clone + 'static>(
    state: Arc<AppState<B>>,
    metrics_handle: PrometheusHandle,
) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check))
        .route(
            "/customers",
            get(routes::customers::list::<B>).post(routes::customers::create::<B>),
        )
        .route(
            "/customers/{pk}/{rk}",
            get(routes::customers::get::<B>)
                .put(routes::customers::update::<B>)
                .delete(routes::customers::delete::<B>),
        )
        .route(
            "/products",
            get(routes::products::list::<B>)
                .post(routes::products::create::<B>)
                .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES)),
        )
        .route(
            "/products/{pk}/{rk}",
            get(routes::products::get::<B>)
                .put(routes::products::update::<B>)
                .delete(routes::products::delete::<B>),
        )
        .route(
            "/products/{pk}/{rk}/image",
            put(routes::products::upload_image::<B>)
                .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES)),
        )
        .route(
            "/orders",
            get(routes::orders::list::<B>).post(routes::orders::create::<B>),
        )
        .route(
            "/orders/{pk}/{rk}",
            get(routes::orders::get::<B>).delete(routes::orders::delete::<B>),
        )
        .route(
            "/orders/{pk}/{rk}/status",
            put(routes::orders::update_status::<B>),
        )
        .route(
            "/contracts",
            get(routes::contracts::list::<B>)
                .post(routes::contracts::upload::<B>)
                .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES)),
        )
        .route(
            "/contracts/{name}",
            get(routes::contracts::download::<B>).delete(routes::contracts::delete::<B>),
        )
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}

/// Creates the application state over `backend`.
pub fn create_state<B: TableBackend + Clone + 'static>(
    backend: B,
    storage: Arc<dyn ObjectStorage>,
    files: Arc<dyn FileShare>,
    publisher: Arc<dyn EventPublisher>,
    relocation: RelocationStrategy,
) -> Arc<AppState<B>> {
    Arc::new(AppState {
        contracts: ContractService::new(files, publisher.clone()),
        customers: CustomerService::new(backend.clone(), publisher.clone())
            .with_relocation_strategy(relocation),
        products: ProductService::new(backend.clone(), storage, publisher.clone())
            .with_relocation_strategy(relocation),
        orders: OrderService::new(backend, publisher),
    })
}

/// In-memory application state plus handles on its collaborators, so
/// callers can inspect what was published and stored.
pub struct InMemoryApp {
    pub state: Arc<AppState<InMemoryTableBackend>>,
    pub publisher: Arc<InMemoryEventPublisher>,
    pub storage: Arc<InMemoryObjectStorage>,
    pub files: Arc<InMemoryFileShare>,
}

/// Creates an in-memory application state.
pub fn create_default_state(
    relocation: RelocationStrategy,
    blob_container: &str,
    contracts_share: &str,
    scan_page_size: usize,
) -> InMemoryApp {
    let backend = InMemoryTableBackend::new().with_page_size(scan_page_size);
    let publisher = Arc::new(InMemoryEventPublisher::new());
    let storage = Arc::new(InMemoryObjectStorage::new(blob_container));
    let files = Arc::new(InMemoryFileShare::new(contracts_share));
    let state = create_state(
        backend,
        storage.clone(),
        files.clone(),
        publisher.clone(),
        relocation,
    );
    InMemoryApp {
        state,
        publisher,
        storage,
        files,
    }
}
