//! OpenAPI documentation for the version manager API

use utoipa::OpenApi;

use crate::api::cluster::AdmissionRequest;
use crate::api::health::HealthResponse;
use crate::api::infrastructure::{InfrastructureStatus, ServiceHealth};
use crate::api::response::ApiError;
use crate::api::versions::{AvailableVersions, NamespaceStatus, PodList, VersionList};
use crate::helm::{DeployRequest, DeployResponse};
use crate::models::{
    AdmissionDecision, CanDeploy, ClusterMemorySnapshot, ClusterResources, DeploymentMemoryFootprint,
    DeploymentPhase, DeploymentSummary, Identifier, Mode, PhaseEvent, PodStatus,
    ContainerState, ContainerStatus,
};

/// API Documentation
#[derive(OpenApi)]
#[openapi(
    info(
        title = "n8n Version Manager API",
        version = "1.0.0",
        description = "Run several n8n versions side by side on a single-node Kubernetes cluster.\n\n## Features\n- Deterministic namespace and port per version\n- Memory admission check before each deployment\n- Live deployment progress over Server-Sent Events",
        license(name = "MIT")
    ),
    servers(
        (url = "http://localhost:8080", description = "Local development server")
    ),
    tags(
        (name = "health", description = "Service health"),
        (name = "cluster", description = "Cluster capacity and admission"),
        (name = "versions", description = "Deploy, remove and follow n8n versions"),
        (name = "metrics", description = "Prometheus metrics")
    ),
    paths(
        crate::api::health::health_check,
        crate::api::cluster::resources,
        crate::api::cluster::check_admission,
        crate::api::cluster::identifier,
        crate::api::versions::list,
        crate::api::versions::deploy,
        crate::api::versions::remove,
        crate::api::versions::phase,
        crate::api::versions::status,
        crate::api::versions::pods,
        crate::api::versions::available,
        crate::api::events::stream_events,
        crate::api::infrastructure::status,
        crate::api::metrics::metrics_handler,
    ),
    components(schemas(
        HealthResponse,
        ApiError,
        AdmissionRequest,
        AdmissionDecision,
        ClusterMemorySnapshot,
        DeploymentMemoryFootprint,
        ClusterResources,
        CanDeploy,
        Identifier,
        Mode,
        DeploymentPhase,
        PhaseEvent,
        DeploymentSummary,
        VersionList,
        AvailableVersions,
        DeployRequest,
        DeployResponse,
        NamespaceStatus,
        PodList,
        PodStatus,
        ContainerStatus,
        ContainerState,
        InfrastructureStatus,
        ServiceHealth,
    ))
)]
pub struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_openapi_lists_version_routes() {
        let doc = ApiDoc::openapi();
        let json = doc.to_json().unwrap();
        assert!(json.contains("/api/versions/{namespace}/events/stream"));
        assert!(json.contains("/api/cluster/admission"));
        assert!(json.contains("AdmissionDecision"));
        assert!(json.contains("/api/versions/{namespace}/pods"));
        assert!(json.contains("/api/infrastructure/status"));
    }
}
