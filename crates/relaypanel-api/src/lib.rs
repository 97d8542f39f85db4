//! HTTP surface of the relay panel
//!
//! Agents push usage reports here; everything else is a health probe and
//! the OpenAPI document.

pub mod handlers;
pub mod models;

use axum::{
    routing::{get, post},
    Router,
};
use relaypanel_control::TrafficAggregator;
use sea_orm::DatabaseConnection;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::info;
use utoipa::OpenApi;

/// Application state shared across handlers
pub struct AppState {
    pub db: DatabaseConnection,
    pub aggregator: TrafficAggregator,
}

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Relay Panel API",
        version = "0.1.0",
        description = "Usage report ingestion for relay agents",
        contact(
            name = "Relay Panel Team",
            email = "team@relaypanel.dev"
        )
    ),
    paths(handlers::upload_flow, handlers::health_check),
    components(schemas(relaypanel_proto::UsageReport, models::HealthResponse)),
    tags(
        (name = "traffic", description = "Usage report ingestion"),
        (name = "system", description = "System health and info endpoints")
    )
)]
pub struct ApiDoc;

/// API server configuration
#[derive(Debug, Clone)]
pub struct ApiServerConfig {
    /// Address to bind the API server
    pub bind_addr: SocketAddr,
}

pub struct ApiServer {
    config: ApiServerConfig,
    state: Arc<AppState>,
}

impl ApiServer {
    pub fn new(config: ApiServerConfig, db: DatabaseConnection, aggregator: TrafficAggregator) -> Self {
        Self {
            config,
            state: Arc::new(AppState { db, aggregator }),
        }
    }

    pub fn build_router(&self) -> Router {
        Router::new()
            .route("/api/health", get(handlers::health_check))
            .route("/api/openapi.json", get(handlers::openapi_json))
            .route("/api/flow/upload", post(handlers::upload_flow))
            .with_state(self.state.clone())
            .layer(TraceLayer::new_for_http())
    }

    /// Serve until `shutdown` resolves
    pub async fn start<F>(self, shutdown: F) -> Result<(), anyhow::Error>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let router = self.build_router();

        info!("Starting API server on {}", self.config.bind_addr);
        info!(
            "OpenAPI document: http://{}/api/openapi.json",
            self.config.bind_addr
        );

        let listener = tokio::net::TcpListener::bind(self.config.bind_addr).await?;

        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown)
            .await
            .map_err(|e| anyhow::anyhow!("Server error: {}", e))?;

        Ok(())
    }
}
