use std::net::SocketAddr;
use std::sync::Arc;

use axum::{Json, Router, http::Method, routing::get};
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use crate::db::EntityStore;
use crate::notifications::TrafficNotifier;
use crate::payments::PaystackClient;
use crate::sync::{PushExecutor, ReconciliationEngine};

pub mod error;
pub mod payment_routes;
pub mod sync_routes;
pub mod websocket_handler;

pub use error::AppError;

#[derive(Clone)]
pub struct AppState {
    pub store: EntityStore,
    pub engine: Arc<ReconciliationEngine>,
    pub executor: Arc<PushExecutor>,
    pub notifier: TrafficNotifier,
    /// `None` when no gateway secret is configured; payment routes then answer 503.
    pub gateway: Option<PaystackClient>,
    pub currency: String,
}

async fn health_handler() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

pub fn create_router(app_state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any);

    let api_router = Router::new()
        .route("/health", get(health_handler))
        .merge(sync_routes::create_sync_router())
        .merge(payment_routes::create_payment_router());

    Router::new()
        .nest("/api", api_router)
        .route("/ws/traffic", get(websocket_handler::traffic_ws_handler))
        .with_state(app_state)
        .layer(cors)
}

pub async fn run_http_server(
    app_state: Arc<AppState>,
    addr: SocketAddr,
    shutdown: CancellationToken,
) -> Result<(), std::io::Error> {
    let app = create_router(app_state);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "HTTP server listening.");
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
}
