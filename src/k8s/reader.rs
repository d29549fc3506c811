//! Read-only view of cluster state consumed by the planner and tracker

use anyhow::Result;
use async_trait::async_trait;

use crate::models::{ClusterMemorySnapshot, DeploymentMemoryFootprint, Mode, PodStatus};

/// Source of cluster facts. The planner and tracker never talk to the
/// Kubernetes API directly; they go through this boundary.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ClusterStateReader: Send + Sync {
    /// Allocatable memory and the requests of Running/Pending pods
    async fn get_memory_snapshot(&self) -> Result<ClusterMemorySnapshot>;

    /// One entry per active deployment namespace
    async fn get_deployment_footprints(&self) -> Result<Vec<DeploymentMemoryFootprint>>;

    /// Per-pod phase, readiness and restart counts in `namespace`
    async fn get_pod_status(&self, namespace: &str) -> Result<Vec<PodStatus>>;

    /// Phase of the first pod matching `label_selector`, if any
    async fn get_pod_phase(&self, namespace: &str, label_selector: &str) -> Result<Option<String>>;

    /// Execution mode recorded in the release config, if the release exists
    async fn get_execution_mode(&self, namespace: &str) -> Result<Option<Mode>>;

    async fn namespace_exists(&self, namespace: &str) -> Result<bool>;

    async fn health_check(&self) -> Result<()>;
}
