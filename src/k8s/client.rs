//! Kubernetes client wrapper for the version manager

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use k8s_openapi::api::core::v1::{ConfigMap, Namespace, Node, Pod};
use kube::{
    api::{Api, ListParams},
    Client, Config,
};
use tracing::{debug, info, instrument, warn};

use super::quantity::{bytes_to_mi, parse_memory_quantity};
use super::reader::ClusterStateReader;
use crate::models::{
    ClusterMemorySnapshot, ContainerState, ContainerStatus, DeploymentMemoryFootprint, Mode,
    PodStatus,
};

/// ConfigMap rendered by the instance chart
pub const INSTANCE_CONFIGMAP: &str = "n8n-config";

/// Wrapper around kube::Client with the cluster queries the service needs
#[derive(Clone)]
pub struct K8sClient {
    client: Client,
    deployment_selector: String,
}

impl K8sClient {
    /// Create a new K8sClient using the default kubeconfig or in-cluster config
    #[instrument(skip_all)]
    pub async fn new(deployment_selector: &str) -> Result<Self> {
        let config = Config::infer().await?;
        let client = Client::try_from(config)?;

        info!("Connected to Kubernetes cluster");

        Ok(Self {
            client,
            deployment_selector: deployment_selector.to_string(),
        })
    }

    fn pods_in(&self, namespace: &str) -> Api<Pod> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

#[async_trait]
impl ClusterStateReader for K8sClient {
    #[instrument(skip(self))]
    async fn get_memory_snapshot(&self) -> Result<ClusterMemorySnapshot> {
        let nodes: Api<Node> = Api::all(self.client.clone());
        let node_list = nodes
            .list(&ListParams::default())
            .await
            .context("Failed to list nodes")?;

        let mut allocatable = 0u64;
        for node in &node_list.items {
            let memory = node
                .status
                .as_ref()
                .and_then(|s| s.allocatable.as_ref())
                .and_then(|a| a.get("memory"));
            if let Some(quantity) = memory {
                allocatable += parse_memory_quantity(&quantity.0)?;
            }
        }

        let pods: Api<Pod> = Api::all(self.client.clone());
        let pod_list = pods
            .list(&ListParams::default())
            .await
            .context("Failed to list pods")?;

        let used: u64 = pod_list
            .items
            .iter()
            .filter(|pod| {
                matches!(
                    pod.status.as_ref().and_then(|s| s.phase.as_deref()),
                    Some("Running") | Some("Pending")
                )
            })
            .map(pod_memory_requests)
            .sum();

        let snapshot = ClusterMemorySnapshot::new(bytes_to_mi(allocatable), bytes_to_mi(used));
        debug!(
            allocatable_mi = snapshot.allocatable_mi,
            used_mi = snapshot.used_mi,
            "Memory snapshot"
        );
        Ok(snapshot)
    }

    #[instrument(skip(self))]
    async fn get_deployment_footprints(&self) -> Result<Vec<DeploymentMemoryFootprint>> {
        let namespaces: Api<Namespace> = Api::all(self.client.clone());
        let list = namespaces
            .list(&ListParams::default().labels(&self.deployment_selector))
            .await
            .context("Failed to list deployment namespaces")?;

        let now = Utc::now();
        let mut footprints = Vec::with_capacity(list.items.len());

        for ns in list.items {
            let Some(name) = ns.metadata.name else {
                continue;
            };

            let pods = self
                .pods_in(&name)
                .list(&ListParams::default())
                .await
                .with_context(|| format!("Failed to list pods in {}", name))?;

            let mode = if pods.items.iter().any(|p| {
                let pod_name = p.metadata.name.as_deref().unwrap_or_default();
                pod_name.contains("worker") || pod_name.contains("webhook")
            }) {
                Mode::Queue
            } else {
                Mode::Regular
            };

            let memory: u64 = pods.items.iter().map(pod_memory_requests).sum();
            let age_seconds = ns
                .metadata
                .creation_timestamp
                .map(|t| (now - t.0).num_seconds().max(0))
                .unwrap_or(0);

            footprints.push(DeploymentMemoryFootprint {
                namespace: name,
                memory_mi: bytes_to_mi(memory),
                mode,
                age_seconds,
            });
        }

        Ok(footprints)
    }

    #[instrument(skip(self))]
    async fn get_pod_status(&self, namespace: &str) -> Result<Vec<PodStatus>> {
        let list = self
            .pods_in(namespace)
            .list(&ListParams::default())
            .await
            .with_context(|| format!("Failed to list pods in {}", namespace))?;

        Ok(list.items.iter().map(pod_status_from).collect())
    }

    #[instrument(skip(self))]
    async fn get_pod_phase(&self, namespace: &str, label_selector: &str) -> Result<Option<String>> {
        let list = self
            .pods_in(namespace)
            .list(&ListParams::default().labels(label_selector))
            .await
            .with_context(|| format!("Failed to list pods '{}' in {}", label_selector, namespace))?;

        Ok(list
            .items
            .into_iter()
            .next()
            .and_then(|pod| pod.status?.phase))
    }

    #[instrument(skip(self))]
    async fn get_execution_mode(&self, namespace: &str) -> Result<Option<Mode>> {
        let configmaps: Api<ConfigMap> = Api::namespaced(self.client.clone(), namespace);
        let Some(cm) = configmaps.get_opt(INSTANCE_CONFIGMAP).await? else {
            return Ok(None);
        };

        let queue = cm
            .data
            .as_ref()
            .and_then(|d| d.get("EXECUTIONS_MODE"))
            .map(|m| m == "queue")
            .unwrap_or(false);

        Ok(Some(if queue { Mode::Queue } else { Mode::Regular }))
    }

    async fn namespace_exists(&self, namespace: &str) -> Result<bool> {
        let namespaces: Api<Namespace> = Api::all(self.client.clone());
        Ok(namespaces.get_opt(namespace).await?.is_some())
    }

    /// Check if cluster is reachable
    async fn health_check(&self) -> Result<()> {
        let version = self.client.apiserver_version().await?;
        debug!(version = %version.git_version, "Kubernetes cluster is healthy");
        Ok(())
    }
}

/// Sum of container memory requests in a pod, in bytes
fn pod_memory_requests(pod: &Pod) -> u64 {
    let Some(spec) = &pod.spec else {
        return 0;
    };

    spec.containers
        .iter()
        .filter_map(|c| c.resources.as_ref()?.requests.as_ref()?.get("memory"))
        .filter_map(|q| match parse_memory_quantity(&q.0) {
            Ok(bytes) => Some(bytes),
            Err(e) => {
                warn!(error = %e, "Ignoring unparseable memory request");
                None
            }
        })
        .sum()
}

/// Reduce a Kubernetes Pod to the fields phase tracking reads
pub fn pod_status_from(pod: &Pod) -> PodStatus {
    let status = pod.status.as_ref();

    let containers = status
        .and_then(|s| s.container_statuses.as_ref())
        .map(|statuses| {
            statuses
                .iter()
                .map(|cs| {
                    let (state, state_detail) = match cs.state.as_ref() {
                        Some(s) if s.running.is_some() => (ContainerState::Running, None),
                        Some(s) if s.waiting.is_some() => (
                            ContainerState::Waiting,
                            s.waiting.as_ref().and_then(|w| w.reason.clone()),
                        ),
                        Some(s) if s.terminated.is_some() => (
                            ContainerState::Terminated,
                            s.terminated.as_ref().and_then(|t| t.reason.clone()),
                        ),
                        _ => (ContainerState::Unknown, None),
                    };

                    ContainerStatus {
                        name: cs.name.clone(),
                        ready: cs.ready,
                        state,
                        state_detail,
                        restart_count: cs.restart_count,
                    }
                })
                .collect()
        })
        .unwrap_or_default();

    PodStatus {
        name: pod.metadata.name.clone().unwrap_or_default(),
        phase: status.and_then(|s| s.phase.clone()),
        containers,
    }
}
