use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use utoipa::ToSchema;

/// Coarse startup milestone of a deployment
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Default,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    ToSchema,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum DeploymentPhase {
    DbStarting,
    N8nStarting,
    WorkersStarting,
    Running,
    Failed,
    #[default]
    Unknown,
}

impl DeploymentPhase {
    /// Position in the forward-only progression. `Failed` ranks last.
    pub fn rank(self) -> u8 {
        match self {
            DeploymentPhase::Unknown => 0,
            DeploymentPhase::DbStarting => 1,
            DeploymentPhase::N8nStarting => 2,
            DeploymentPhase::WorkersStarting => 3,
            DeploymentPhase::Running => 4,
            DeploymentPhase::Failed => 5,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, DeploymentPhase::Running | DeploymentPhase::Failed)
    }

    pub fn label(self) -> &'static str {
        match self {
            DeploymentPhase::DbStarting => "DB starting",
            DeploymentPhase::N8nStarting => "n8n starting",
            DeploymentPhase::WorkersStarting => "Workers",
            DeploymentPhase::Running => "Running",
            DeploymentPhase::Failed => "Failed",
            DeploymentPhase::Unknown => "Unknown",
        }
    }
}

/// Progress notification pushed to subscribers
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PhaseEvent {
    pub phase: DeploymentPhase,
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub pods_ready: usize,
    pub pods_total: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failed_pod: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl PhaseEvent {
    pub fn new(phase: DeploymentPhase, pods_ready: usize, pods_total: usize) -> Self {
        Self {
            phase,
            label: phase.label().to_string(),
            message: None,
            pods_ready,
            pods_total,
            failed_pod: None,
            reason: None,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn failed(
        failed_pod: Option<String>,
        reason: impl Into<String>,
        pods_ready: usize,
        pods_total: usize,
    ) -> Self {
        Self {
            failed_pod,
            reason: Some(reason.into()),
            ..Self::new(DeploymentPhase::Failed, pods_ready, pods_total)
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.phase.is_terminal()
    }
}
