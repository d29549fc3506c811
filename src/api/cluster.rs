//! Cluster capacity and identifier endpoints

use axum::{
    extract::{Query, State},
    Json,
};
use serde::Deserialize;
use tracing::info;
use utoipa::{IntoParams, ToSchema};

use crate::admission::{evaluate_admission, oldest_first, parse_mode};
use crate::api::AppState;
use crate::error::{AppError, AppResult};
use crate::identifier::derive_identifier;
use crate::models::{
    AdmissionDecision, CanDeploy, ClusterMemorySnapshot, ClusterResources, DeploymentMemoryFootprint,
    DeploymentProfile, Identifier, Mode,
};

#[derive(Debug, Deserialize, ToSchema)]
pub struct AdmissionRequest {
    /// `queue` or `regular`
    pub mode: String,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct IdentifierQuery {
    pub version: Option<String>,
    pub name: Option<String>,
}

/// Snapshot and footprints read together for one planning decision
pub(crate) async fn capacity(
    state: &AppState,
) -> AppResult<(ClusterMemorySnapshot, Vec<DeploymentMemoryFootprint>)> {
    let cluster = state.cluster().await?;
    tokio::try_join!(
        cluster.get_memory_snapshot(),
        cluster.get_deployment_footprints()
    )
    .map_err(AppError::cluster)
}

/// Run the planner and record the outcome
pub(crate) fn admit(
    mode: Mode,
    snapshot: &ClusterMemorySnapshot,
    footprints: &[DeploymentMemoryFootprint],
) -> AdmissionDecision {
    let decision = evaluate_admission(&DeploymentProfile::new(mode), snapshot, footprints);
    let outcome = if decision.can_deploy { "admitted" } else { "rejected" };
    metrics::increment_counter!(
        "admission_decisions_total",
        "mode" => mode.to_string(),
        "outcome" => outcome
    );
    info!(
        %mode,
        outcome,
        required_mi = decision.required_mi,
        available_mi = snapshot.display_available_mi(),
        "Admission evaluated"
    );
    decision
}

/// Cluster memory, per-mode admission preview and current deployments
#[utoipa::path(
    get,
    path = "/api/cluster/resources",
    tag = "cluster",
    responses(
        (status = 200, description = "Cluster resources", body = ClusterResources),
        (status = 503, description = "Cluster unavailable"),
    )
)]
pub async fn resources(State(state): State<AppState>) -> AppResult<Json<ClusterResources>> {
    let (memory, footprints) = capacity(&state).await?;

    let fits = |mode| evaluate_admission(&DeploymentProfile::new(mode), &memory, &footprints).can_deploy;
    let can_deploy = CanDeploy {
        queue_mode: fits(Mode::Queue),
        regular_mode: fits(Mode::Regular),
    };

    Ok(Json(ClusterResources {
        memory,
        can_deploy,
        deployments: oldest_first(&footprints),
    }))
}

/// Decide whether a deployment of the given mode fits right now
#[utoipa::path(
    post,
    path = "/api/cluster/admission",
    tag = "cluster",
    request_body = AdmissionRequest,
    responses(
        (status = 200, description = "Admission decision", body = AdmissionDecision),
        (status = 400, description = "Unknown mode"),
        (status = 503, description = "Cluster unavailable"),
    )
)]
pub async fn check_admission(
    State(state): State<AppState>,
    Json(req): Json<AdmissionRequest>,
) -> AppResult<Json<AdmissionDecision>> {
    let mode = parse_mode(&req.mode)?;
    let (snapshot, footprints) = capacity(&state).await?;
    Ok(Json(admit(mode, &snapshot, &footprints)))
}

/// Preview the namespace and port for a version or custom name
#[utoipa::path(
    get,
    path = "/api/identifier",
    tag = "cluster",
    params(IdentifierQuery),
    responses(
        (status = 200, description = "Derived identifier", body = Identifier),
        (status = 400, description = "Invalid version or name"),
    )
)]
pub async fn identifier(Query(query): Query<IdentifierQuery>) -> AppResult<Json<Identifier>> {
    let identifier = derive_identifier(query.version.as_deref(), query.name.as_deref())?;
    Ok(Json(identifier))
}
