//! Health of the shared services deployments depend on

use axum::{extract::State, Json};
use serde::Serialize;
use tracing::debug;
use utoipa::ToSchema;

use crate::api::AppState;
use crate::error::{AppError, AppResult};

/// Namespace holding the shared Redis and backup storage
pub const SYSTEM_NAMESPACE: &str = "n8n-system";

const REDIS_SELECTOR: &str = "app=redis";
const BACKUP_SELECTOR: &str = "app=backup-storage";

#[derive(Debug, Serialize, ToSchema)]
pub struct ServiceHealth {
    pub healthy: bool,
    /// `healthy` or `unavailable`
    pub status: String,
}

impl ServiceHealth {
    fn from_phase(phase: Option<&str>) -> Self {
        let healthy = phase == Some("Running");
        Self {
            healthy,
            status: if healthy { "healthy" } else { "unavailable" }.to_string(),
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct InfrastructureStatus {
    /// Queue broker used by queue-mode deployments
    pub redis: ServiceHealth,
    /// Storage for database snapshots
    pub backup: ServiceHealth,
}

/// Redis and backup storage health
#[utoipa::path(
    get,
    path = "/api/infrastructure/status",
    tag = "cluster",
    responses(
        (status = 200, description = "Shared service health", body = InfrastructureStatus),
        (status = 503, description = "Cluster unavailable"),
    )
)]
pub async fn status(State(state): State<AppState>) -> AppResult<Json<InfrastructureStatus>> {
    let cluster = state.cluster().await?;
    let (redis, backup) = tokio::try_join!(
        cluster.get_pod_phase(SYSTEM_NAMESPACE, REDIS_SELECTOR),
        cluster.get_pod_phase(SYSTEM_NAMESPACE, BACKUP_SELECTOR),
    )
    .map_err(AppError::cluster)?;

    debug!(redis = ?redis, backup = ?backup, "Infrastructure pod phases");

    Ok(Json(InfrastructureStatus {
        redis: ServiceHealth::from_phase(redis.as_deref()),
        backup: ServiceHealth::from_phase(backup.as_deref()),
    }))
}
