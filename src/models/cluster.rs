use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::Mode;

/// Point-in-time view of cluster memory accounting.
///
/// `used_mi` sums memory *requests* of Running and Pending pods, so it can
/// exceed `allocatable_mi` on an over-committed node. `available_mi` is then
/// negative and callers clamp before display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ClusterMemorySnapshot {
    pub allocatable_mi: i64,
    pub used_mi: i64,
    pub available_mi: i64,
    pub utilization_percent: i64,
}

impl ClusterMemorySnapshot {
    pub fn new(allocatable_mi: i64, used_mi: i64) -> Self {
        let utilization_percent = if allocatable_mi > 0 {
            ((used_mi as f64 / allocatable_mi as f64) * 100.0).round() as i64
        } else {
            0
        };

        Self {
            allocatable_mi,
            used_mi,
            available_mi: allocatable_mi - used_mi,
            utilization_percent,
        }
    }

    /// Available memory clamped at zero, for display.
    pub fn display_available_mi(&self) -> i64 {
        self.available_mi.max(0)
    }
}

/// Memory held by one active deployment namespace
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentMemoryFootprint {
    pub namespace: String,
    pub memory_mi: i64,
    pub mode: Mode,
    pub age_seconds: i64,
}

/// Observed state of a single container
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ContainerStatus {
    pub name: String,
    pub ready: bool,
    pub state: ContainerState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state_detail: Option<String>,
    pub restart_count: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum ContainerState {
    Running,
    Waiting,
    Terminated,
    Unknown,
}

/// Observed state of a pod, reduced to what phase tracking needs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PodStatus {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phase: Option<String>,
    #[serde(default)]
    pub containers: Vec<ContainerStatus>,
}

impl PodStatus {
    /// Pod is Running and every container reports ready
    pub fn is_ready(&self) -> bool {
        self.phase.as_deref() == Some("Running")
            && !self.containers.is_empty()
            && self.containers.iter().all(|c| c.ready)
    }
}

/// Whether each deployment mode currently fits in available memory
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CanDeploy {
    pub queue_mode: bool,
    pub regular_mode: bool,
}

/// Cluster memory, per-mode admission preview and current deployments
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ClusterResources {
    pub memory: ClusterMemorySnapshot,
    pub can_deploy: CanDeploy,
    pub deployments: Vec<DeploymentMemoryFootprint>,
}
