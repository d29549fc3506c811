//! Deployed version lifecycle endpoints

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::{error, info};
use utoipa::{IntoParams, ToSchema};

use crate::admission::{oldest_first, parse_mode};
use crate::api::cluster::{admit, capacity};
use crate::api::AppState;
use crate::error::{AppError, AppResult};
use crate::helm::types::is_valid_snapshot_name;
use crate::helm::{DeployRequest, DeployResponse, ReleaseRequest};
use crate::identifier::{
    derive_identifier, identifier_for_namespace, is_release_version, is_valid_namespace,
    version_from_namespace,
};
use crate::k8s::ClusterStateReader;
use crate::models::{DeploymentSummary, Mode, PhaseEvent, PodStatus};
use crate::tracker::calculate_phase;

#[derive(Debug, Serialize, ToSchema)]
pub struct VersionList {
    pub versions: Vec<DeploymentSummary>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct AvailableVersions {
    pub versions: Vec<String>,
}

/// Namespace existence, polled by clients while a removal completes
#[derive(Debug, Serialize, ToSchema)]
pub struct NamespaceStatus {
    pub namespace: String,
    pub exists: bool,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct PodList {
    pub pods: Vec<PodStatus>,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ModeQuery {
    /// `queue` or `regular`; read from the instance config when absent
    pub mode: Option<String>,
}

pub(crate) fn validate_namespace(namespace: &str) -> AppResult<()> {
    if is_valid_namespace(namespace) {
        Ok(())
    } else {
        Err(AppError::BadRequest(format!("Invalid namespace '{}'", namespace)))
    }
}

/// Mode from the query string, else from the running instance, else regular
pub(crate) async fn resolve_mode(
    cluster: &Arc<dyn ClusterStateReader>,
    namespace: &str,
    requested: Option<&str>,
) -> AppResult<Mode> {
    if let Some(raw) = requested.filter(|m| !m.is_empty()) {
        return Ok(parse_mode(raw)?);
    }
    let detected = cluster
        .get_execution_mode(namespace)
        .await
        .map_err(AppError::cluster)?;
    Ok(detected.unwrap_or(Mode::Regular))
}

/// List deployed versions with their current phase
#[utoipa::path(
    get,
    path = "/api/versions",
    tag = "versions",
    responses(
        (status = 200, description = "Deployed versions", body = VersionList),
        (status = 503, description = "Cluster unavailable"),
    )
)]
pub async fn list(State(state): State<AppState>) -> AppResult<Json<VersionList>> {
    let cluster = state.cluster().await?;
    let footprints = cluster
        .get_deployment_footprints()
        .await
        .map_err(AppError::cluster)?;

    let mut versions = Vec::with_capacity(footprints.len());
    for footprint in oldest_first(&footprints) {
        let pods = cluster
            .get_pod_status(&footprint.namespace)
            .await
            .map_err(AppError::cluster)?;
        let phase = calculate_phase(&pods, footprint.mode, state.config.restart_threshold);
        let identifier = identifier_for_namespace(&footprint.namespace);
        let version = version_from_namespace(&footprint.namespace);

        versions.push(DeploymentSummary {
            name: version.is_none().then(|| footprint.namespace.clone()),
            version: version.unwrap_or_else(|| "unknown".to_string()),
            mode: footprint.mode,
            port: Some(identifier.port),
            url: Some(identifier.url()),
            phase: phase.phase,
            pods_ready: phase.pods_ready,
            pods_total: phase.pods_total,
            age_seconds: footprint.age_seconds,
            namespace: footprint.namespace,
        });
    }

    Ok(Json(VersionList { versions }))
}

/// Deploy a version after the admission gate
#[utoipa::path(
    post,
    path = "/api/versions",
    tag = "versions",
    request_body = DeployRequest,
    responses(
        (status = 200, description = "Deployment started", body = DeployResponse),
        (status = 400, description = "Invalid request"),
        (status = 409, description = "Namespace exists or insufficient memory"),
        (status = 503, description = "Cluster unavailable"),
    )
)]
pub async fn deploy(
    State(state): State<AppState>,
    Json(req): Json<DeployRequest>,
) -> AppResult<Json<DeployResponse>> {
    if !is_release_version(&req.version) {
        return Err(AppError::BadRequest(format!(
            "Invalid version '{}': expected X.Y.Z",
            req.version
        )));
    }
    let mode = parse_mode(&req.mode)?;

    let identifier = match req.name.as_deref().filter(|n| !n.is_empty()) {
        Some(name) => derive_identifier(None, Some(name))?,
        None => derive_identifier(Some(&req.version), None)?,
    };

    if let Some(snapshot) = req.snapshot.as_deref() {
        if !is_valid_snapshot_name(snapshot) {
            return Err(AppError::BadRequest(format!(
                "Invalid snapshot name '{}'",
                snapshot
            )));
        }
    }

    let orchestrator = state.orchestrator()?;
    let cluster = state.cluster().await?;

    if cluster
        .namespace_exists(&identifier.namespace)
        .await
        .map_err(AppError::cluster)?
    {
        return Err(AppError::Conflict(format!(
            "Namespace {} already exists",
            identifier.namespace
        )));
    }

    let (snapshot, footprints) = capacity(&state).await?;
    let decision = admit(mode, &snapshot, &footprints);
    if !decision.can_deploy {
        metrics::increment_counter!("deployments_total", "mode" => mode.to_string(), "outcome" => "rejected");
        return Err(AppError::InsufficientMemory(Box::new(decision)));
    }

    let request = ReleaseRequest {
        namespace: identifier.namespace.clone(),
        version: req.version.clone(),
        mode,
        port: identifier.port,
        snapshot: req.snapshot.clone(),
        values: req.helm_values.clone(),
    };

    if let Err(e) = orchestrator.install(&request).await {
        error!(namespace = %request.namespace, error = %e, "Deployment failed");
        metrics::increment_counter!("deployments_total", "mode" => mode.to_string(), "outcome" => "failed");
        return Err(AppError::internal(&format!("Failed to deploy: {:#}", e)));
    }

    metrics::increment_counter!("deployments_total", "mode" => mode.to_string(), "outcome" => "started");
    info!(namespace = %identifier.namespace, port = identifier.port, %mode, "Deployment started");

    Ok(Json(DeployResponse {
        url: identifier.url(),
        namespace: identifier.namespace,
        port: identifier.port,
        message: "Deployment initiated".to_string(),
    }))
}

/// Remove a deployed version and its namespace
#[utoipa::path(
    delete,
    path = "/api/versions/{namespace}",
    tag = "versions",
    params(("namespace" = String, Path, description = "Deployment namespace")),
    responses(
        (status = 200, description = "Deployment removed"),
        (status = 404, description = "No such deployment"),
        (status = 503, description = "Cluster unavailable"),
    )
)]
pub async fn remove(
    State(state): State<AppState>,
    Path(namespace): Path<String>,
) -> AppResult<Json<serde_json::Value>> {
    validate_namespace(&namespace)?;
    let orchestrator = state.orchestrator()?;
    let cluster = state.cluster().await?;

    if !cluster
        .namespace_exists(&namespace)
        .await
        .map_err(AppError::cluster)?
    {
        return Err(AppError::not_found(&format!("Deployment {} not found", namespace)));
    }

    orchestrator
        .uninstall(&namespace)
        .await
        .map_err(|e| AppError::internal(&format!("Failed to remove {}: {:#}", namespace, e)))?;

    info!(%namespace, "Deployment removed");
    Ok(Json(serde_json::json!({
        "message": format!("Deployment {} removed", namespace),
        "namespace": namespace,
    })))
}

/// Whether the namespace still exists
#[utoipa::path(
    get,
    path = "/api/versions/{namespace}/status",
    tag = "versions",
    params(("namespace" = String, Path, description = "Deployment namespace")),
    responses(
        (status = 200, description = "Namespace existence", body = NamespaceStatus),
        (status = 400, description = "Invalid namespace"),
        (status = 503, description = "Cluster unavailable"),
    )
)]
pub async fn status(
    State(state): State<AppState>,
    Path(namespace): Path<String>,
) -> AppResult<Json<NamespaceStatus>> {
    validate_namespace(&namespace)?;
    let cluster = state.cluster().await?;
    let exists = cluster
        .namespace_exists(&namespace)
        .await
        .map_err(AppError::cluster)?;

    Ok(Json(NamespaceStatus { namespace, exists }))
}

/// Per-pod container detail for a deployment
#[utoipa::path(
    get,
    path = "/api/versions/{namespace}/pods",
    tag = "versions",
    params(("namespace" = String, Path, description = "Deployment namespace")),
    responses(
        (status = 200, description = "Pods in the namespace", body = PodList),
        (status = 400, description = "Invalid namespace"),
        (status = 503, description = "Cluster unavailable"),
    )
)]
pub async fn pods(
    State(state): State<AppState>,
    Path(namespace): Path<String>,
) -> AppResult<Json<PodList>> {
    validate_namespace(&namespace)?;
    let cluster = state.cluster().await?;
    let pods = cluster
        .get_pod_status(&namespace)
        .await
        .map_err(AppError::cluster)?;

    Ok(Json(PodList { pods }))
}

/// Current phase, computed from a single observation
#[utoipa::path(
    get,
    path = "/api/versions/{namespace}/phase",
    tag = "versions",
    params(("namespace" = String, Path, description = "Deployment namespace"), ModeQuery),
    responses(
        (status = 200, description = "Current phase", body = PhaseEvent),
        (status = 503, description = "Cluster unavailable"),
    )
)]
pub async fn phase(
    State(state): State<AppState>,
    Path(namespace): Path<String>,
    Query(query): Query<ModeQuery>,
) -> AppResult<Json<PhaseEvent>> {
    validate_namespace(&namespace)?;
    let cluster = state.cluster().await?;
    let mode = resolve_mode(&cluster, &namespace, query.mode.as_deref()).await?;

    let pods = cluster
        .get_pod_status(&namespace)
        .await
        .map_err(AppError::cluster)?;

    Ok(Json(calculate_phase(&pods, mode, state.config.restart_threshold)))
}

/// Released n8n versions available for deployment, newest first
#[utoipa::path(
    get,
    path = "/api/versions/available",
    tag = "versions",
    responses(
        (status = 200, description = "Available versions", body = AvailableVersions),
    )
)]
pub async fn available(State(state): State<AppState>) -> Json<AvailableVersions> {
    Json(AvailableVersions {
        versions: state.catalog.available_versions().await,
    })
}
