use axum::{extract::State, Json};
use serde::Serialize;
use utoipa::ToSchema;

use crate::api::AppState;

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    /// `ok` when the cluster is reachable, `degraded` otherwise
    pub status: String,
    pub version: String,
    pub cluster_connected: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Service and cluster health
#[utoipa::path(
    get,
    path = "/api/health",
    tag = "health",
    responses(
        (status = 200, description = "Health status", body = HealthResponse),
    )
)]
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let cluster = state.cluster.read().await.clone();

    let message = match cluster {
        None => Some("Kubernetes cluster not available".to_string()),
        Some(cluster) => cluster.health_check().await.err().map(|e| e.to_string()),
    };

    Json(HealthResponse {
        status: if message.is_none() { "ok" } else { "degraded" }.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        cluster_connected: message.is_none(),
        message,
    })
}
