//! In-memory fakes shared by the integration tests

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use anyhow::Result;
use async_trait::async_trait;

use n8n_versions_backend::helm::{ReleaseOrchestrator, ReleaseRequest};
use n8n_versions_backend::k8s::ClusterStateReader;
use n8n_versions_backend::models::{
    ClusterMemorySnapshot, ContainerState, ContainerStatus, DeploymentMemoryFootprint, Mode,
    PodStatus,
};

pub fn pod(name: &str, ready: bool) -> PodStatus {
    PodStatus {
        name: name.to_string(),
        phase: Some(if ready { "Running" } else { "Pending" }.to_string()),
        containers: vec![ContainerStatus {
            name: "main".to_string(),
            ready,
            state: if ready {
                ContainerState::Running
            } else {
                ContainerState::Waiting
            },
            state_detail: None,
            restart_count: 0,
        }],
    }
}

/// Pod whose container is stuck in `reason` (e.g. `CrashLoopBackOff`)
pub fn failing_pod(name: &str, reason: &str, restart_count: i32) -> PodStatus {
    PodStatus {
        name: name.to_string(),
        phase: Some("Running".to_string()),
        containers: vec![ContainerStatus {
            name: "main".to_string(),
            ready: false,
            state: ContainerState::Waiting,
            state_detail: Some(reason.to_string()),
            restart_count,
        }],
    }
}

/// Ready pod that has been restarted `restart_count` times
pub fn restarted_pod(name: &str, restart_count: i32) -> PodStatus {
    let mut pod = pod(name, true);
    pod.containers[0].restart_count = restart_count;
    pod
}

pub fn footprint(namespace: &str, memory_mi: i64, mode: Mode, age_seconds: i64) -> DeploymentMemoryFootprint {
    DeploymentMemoryFootprint {
        namespace: namespace.to_string(),
        memory_mi,
        mode,
        age_seconds,
    }
}

/// Cluster with fixed capacity and a scripted sequence of pod polls.
/// The last scripted poll repeats once the script runs out.
pub struct FakeCluster {
    pub snapshot: ClusterMemorySnapshot,
    pub footprints: Vec<DeploymentMemoryFootprint>,
    pub namespaces: Vec<String>,
    pub mode: Option<Mode>,
    /// Pod phase by `namespace/selector`
    pub pod_phases: HashMap<String, String>,
    polls: Mutex<VecDeque<Vec<PodStatus>>>,
}

impl FakeCluster {
    pub fn new(allocatable_mi: i64, used_mi: i64) -> Self {
        Self {
            snapshot: ClusterMemorySnapshot::new(allocatable_mi, used_mi),
            footprints: Vec::new(),
            namespaces: Vec::new(),
            mode: None,
            pod_phases: HashMap::new(),
            polls: Mutex::new(VecDeque::new()),
        }
    }

    pub fn with_footprints(mut self, footprints: Vec<DeploymentMemoryFootprint>) -> Self {
        self.namespaces = footprints.iter().map(|f| f.namespace.clone()).collect();
        self.footprints = footprints;
        self
    }

    pub fn with_polls(self, polls: Vec<Vec<PodStatus>>) -> Self {
        *self.polls.lock().unwrap() = polls.into();
        self
    }

    pub fn with_mode(mut self, mode: Mode) -> Self {
        self.mode = Some(mode);
        self
    }

    pub fn with_pod_phase(mut self, namespace: &str, selector: &str, phase: &str) -> Self {
        self.pod_phases
            .insert(format!("{namespace}/{selector}"), phase.to_string());
        self
    }
}

#[async_trait]
impl ClusterStateReader for FakeCluster {
    async fn get_memory_snapshot(&self) -> Result<ClusterMemorySnapshot> {
        Ok(self.snapshot)
    }

    async fn get_deployment_footprints(&self) -> Result<Vec<DeploymentMemoryFootprint>> {
        Ok(self.footprints.clone())
    }

    async fn get_pod_status(&self, _namespace: &str) -> Result<Vec<PodStatus>> {
        let mut polls = self.polls.lock().unwrap();
        if polls.len() > 1 {
            Ok(polls.pop_front().unwrap_or_default())
        } else {
            Ok(polls.front().cloned().unwrap_or_default())
        }
    }

    async fn get_pod_phase(&self, namespace: &str, label_selector: &str) -> Result<Option<String>> {
        Ok(self
            .pod_phases
            .get(&format!("{namespace}/{label_selector}"))
            .cloned())
    }

    async fn get_execution_mode(&self, _namespace: &str) -> Result<Option<Mode>> {
        Ok(self.mode)
    }

    async fn namespace_exists(&self, namespace: &str) -> Result<bool> {
        Ok(self.namespaces.iter().any(|n| n == namespace))
    }

    async fn health_check(&self) -> Result<()> {
        Ok(())
    }
}

/// Records every call instead of running Helm
#[derive(Default)]
pub struct FakeOrchestrator {
    pub installs: Mutex<Vec<ReleaseRequest>>,
    pub uninstalls: Mutex<Vec<String>>,
}

#[async_trait]
impl ReleaseOrchestrator for FakeOrchestrator {
    async fn install(&self, request: &ReleaseRequest) -> Result<String> {
        self.installs.lock().unwrap().push(request.clone());
        Ok(format!("Release \"{}\" installed", request.namespace))
    }

    async fn uninstall(&self, namespace: &str) -> Result<()> {
        self.uninstalls.lock().unwrap().push(namespace.to_string());
        Ok(())
    }
}
