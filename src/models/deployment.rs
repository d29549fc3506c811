use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use utoipa::ToSchema;

use super::DeploymentMemoryFootprint;

/// Deployment profile mode
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, ToSchema,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Mode {
    /// Separate main, webhook and worker processes coordinated through Redis
    Queue,
    /// Single consolidated process
    Regular,
}

/// Requested deployment shape, input to the admission planner
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct DeploymentProfile {
    pub mode: Mode,
}

impl DeploymentProfile {
    pub fn new(mode: Mode) -> Self {
        Self { mode }
    }
}

/// Outcome of an admission check
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AdmissionDecision {
    pub can_deploy: bool,
    pub required_mi: i64,
    pub available_mi: i64,
    pub deficit_mi: i64,
    /// Existing deployments, oldest first. Empty when `can_deploy` is true.
    pub candidates_for_removal: Vec<DeploymentMemoryFootprint>,
}

/// Namespace and NodePort derived from a version string or custom name
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
pub struct Identifier {
    pub namespace: String,
    pub port: u32,
}

impl Identifier {
    pub fn url(&self) -> String {
        format!("http://localhost:{}", self.port)
    }
}

/// A deployed instance as shown in the version list
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentSummary {
    pub namespace: String,
    pub version: String,
    pub name: Option<String>,
    pub mode: Mode,
    pub port: Option<u32>,
    pub url: Option<String>,
    pub phase: super::DeploymentPhase,
    pub pods_ready: usize,
    pub pods_total: usize,
    pub age_seconds: i64,
}
