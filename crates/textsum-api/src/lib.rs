//! textsum API: train and predict over HTTP
pub mod handlers;
pub mod metrics;
pub mod middleware;

use axum::{
    routing::{get, post},
    Router,
};
use metrics::ApiMetrics;
use std::sync::Arc;
use textsum_config::ConfigurationManager;
use tower_http::trace::TraceLayer;

/// Shared by every handler. Holds configuration only; models are loaded per request.
#[derive(Clone)]
pub struct AppState {
    pub manager: Arc<ConfigurationManager>,
    pub metrics: Arc<ApiMetrics>,
}

impl AppState {
    pub fn new(manager: ConfigurationManager) -> Result<Self, prometheus::Error> {
        Ok(Self {
            manager: Arc::new(manager),
            metrics: Arc::new(ApiMetrics::new()?),
        })
    }
}

pub fn create_app(state: AppState) -> Router {
    Router::new()
        .route("/", get(handlers::index))
        .route("/train", get(handlers::train))
        .route("/predict", post(handlers::predict))
        .route("/health", get(handlers::health))
        .route("/metrics", get(handlers::metrics))
        .route_layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::track_requests,
        ))
        .layer(TraceLayer::new_for_http())
        .layer(middleware::cors())
        .with_state(state)
}

pub async fn run(addr: &str, state: AppState) -> std::io::Result<()> {
    let app = create_app(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    tracing::info!("textsum API listening on {}", addr);
    axum::serve(listener, app).await
}
