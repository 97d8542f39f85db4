//! HTTP request handlers

use axum::{
    body::Bytes,
    extract::{Query, State},
    http::StatusCode,
    Json,
};
use relaypanel_db::node_by_secret;
use std::sync::Arc;
use tracing::{debug, error, warn};
use utoipa::OpenApi;

use crate::models::{HealthResponse, UploadQuery};
use crate::{ApiDoc, AppState};

/// Accept a usage report from an agent
///
/// Always answers `ok` once the report is understood, including reports for
/// rules that no longer exist and reports whose enforcement could not reach
/// an agent.
#[utoipa::path(
    post,
    path = "/api/flow/upload",
    params(UploadQuery),
    request_body = relaypanel_proto::UsageReport,
    responses(
        (status = 200, description = "Report accepted", body = String),
        (status = 400, description = "Missing secret or malformed report", body = String),
        (status = 403, description = "Unknown node secret", body = String),
        (status = 500, description = "Store failure", body = String)
    ),
    tag = "traffic"
)]
pub async fn upload_flow(
    State(state): State<Arc<AppState>>,
    Query(query): Query<UploadQuery>,
    body: Bytes,
) -> (StatusCode, &'static str) {
    let Some(secret) = query.secret.filter(|secret| !secret.is_empty()) else {
        return (StatusCode::BAD_REQUEST, "secret is required");
    };

    let node = match node_by_secret(&state.db, &secret).await {
        Ok(Some(node)) => node,
        Ok(None) => {
            warn!("Usage report with unknown node secret");
            return (StatusCode::FORBIDDEN, "invalid secret");
        }
        Err(e) => {
            error!("Failed to look up node secret: {}", e);
            return (StatusCode::INTERNAL_SERVER_ERROR, "internal error");
        }
    };

    match state.aggregator.process_raw(&body).await {
        Ok(outcome) => {
            debug!(node_id = node.id, ?outcome, "Processed usage report");
            (StatusCode::OK, "ok")
        }
        Err(e) if e.is_client_error() => {
            warn!(node_id = node.id, "Rejected usage report: {}", e);
            (StatusCode::BAD_REQUEST, "invalid usage report")
        }
        Err(e) => {
            error!(node_id = node.id, "Failed to process usage report: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "internal error")
        }
    }
}

/// Health check endpoint
#[utoipa::path(
    get,
    path = "/api/health",
    responses(
        (status = 200, description = "Service is healthy", body = HealthResponse)
    ),
    tag = "system"
)]
pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// OpenAPI document
pub async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}
