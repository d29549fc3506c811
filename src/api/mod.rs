pub mod cluster;
pub mod events;
pub mod health;
pub mod infrastructure;
pub mod metrics;
pub mod openapi;
pub mod response;
pub mod versions;

use std::sync::Arc;

use metrics_exporter_prometheus::PrometheusHandle;
use tokio::sync::RwLock;

use crate::catalog::ReleaseCatalog;
use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::helm::ReleaseOrchestrator;
use crate::k8s::ClusterStateReader;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    /// Present while the cluster is reachable; managed by the connection loop
    pub cluster: Arc<RwLock<Option<Arc<dyn ClusterStateReader>>>>,
    pub orchestrator: Option<Arc<dyn ReleaseOrchestrator>>,
    pub catalog: Arc<ReleaseCatalog>,
    pub metrics: Option<PrometheusHandle>,
}

impl AppState {
    pub fn new(config: Config, catalog: ReleaseCatalog) -> Self {
        Self {
            config,
            cluster: Arc::new(RwLock::new(None)),
            orchestrator: None,
            catalog: Arc::new(catalog),
            metrics: None,
        }
    }

    pub async fn set_cluster(&self, cluster: Arc<dyn ClusterStateReader>) {
        let mut guard = self.cluster.write().await;
        *guard = Some(cluster);
    }

    pub async fn clear_cluster(&self) {
        let mut guard = self.cluster.write().await;
        *guard = None;
    }

    pub fn with_orchestrator(mut self, orchestrator: Arc<dyn ReleaseOrchestrator>) -> Self {
        self.orchestrator = Some(orchestrator);
        self
    }

    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }

    /// Current cluster reader, or 503 when the cluster is not connected
    pub async fn cluster(&self) -> AppResult<Arc<dyn ClusterStateReader>> {
        self.cluster
            .read()
            .await
            .clone()
            .ok_or_else(|| AppError::ClusterUnavailable("not connected".to_string()))
    }

    pub fn orchestrator(&self) -> AppResult<Arc<dyn ReleaseOrchestrator>> {
        self.orchestrator
            .clone()
            .ok_or_else(|| AppError::internal("Release orchestrator not configured"))
    }
}
