//! Per-poll phase calculation from pod status
//!
//! Pod naming follows the instance chart:
//! - `postgres-{namespace}-0`: database StatefulSet
//! - `n8n-main-0`: main StatefulSet
//! - `n8n-worker-*`: worker Deployment (queue mode)
//! - `n8n-webhook-*`: webhook Deployment (queue mode)

use crate::models::{DeploymentPhase, Mode, PhaseEvent, PodStatus};

/// Container waiting/terminated reasons that mean the pod will not recover
/// on its own.
pub const FAILURE_REASONS: &[&str] = &[
    "CrashLoopBackOff",
    "ErrImagePull",
    "ImagePullBackOff",
    "InvalidImageName",
    "CreateContainerConfigError",
    "Error",
];

/// Restarts tolerated before a container counts as failed
pub const DEFAULT_RESTART_THRESHOLD: i32 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Component {
    Database,
    Main,
    Worker,
    Webhook,
}

impl Component {
    pub fn classify(pod_name: &str) -> Option<Self> {
        if pod_name.starts_with("postgres-") {
            Some(Component::Database)
        } else if pod_name.starts_with("n8n-main") {
            Some(Component::Main)
        } else if pod_name.starts_with("n8n-worker") {
            Some(Component::Worker)
        } else if pod_name.starts_with("n8n-webhook") {
            Some(Component::Webhook)
        } else {
            None
        }
    }

    fn expected_in(self, mode: Mode) -> bool {
        match self {
            Component::Database | Component::Main => true,
            Component::Worker | Component::Webhook => mode == Mode::Queue,
        }
    }
}

/// Pods of the release that count for `mode`, with their component
pub fn expected_pods(pods: &[PodStatus], mode: Mode) -> Vec<(&PodStatus, Component)> {
    pods.iter()
        .filter_map(|p| Component::classify(&p.name).map(|c| (p, c)))
        .filter(|(_, c)| c.expected_in(mode))
        .collect()
}

fn failure_reason(pod: &PodStatus, restart_threshold: i32) -> Option<String> {
    for container in &pod.containers {
        if let Some(detail) = container.state_detail.as_deref() {
            if FAILURE_REASONS.contains(&detail) {
                return Some(format!("{}: {}", container.name, detail));
            }
        }
        if container.restart_count > restart_threshold {
            return Some(format!(
                "{}: restarted {} times",
                container.name, container.restart_count
            ));
        }
    }

    if pod.phase.as_deref() == Some("Failed") {
        return Some(
            pod.containers
                .iter()
                .find_map(|c| {
                    c.state_detail
                        .as_deref()
                        .map(|d| format!("{}: {}", c.name, d))
                })
                .unwrap_or_else(|| "Failed".to_string()),
        );
    }

    None
}

fn component_ready(pods: &[(&PodStatus, Component)], component: Component) -> bool {
    let mut matching = pods.iter().filter(|(_, c)| *c == component).peekable();
    matching.peek().is_some() && matching.all(|(p, _)| p.is_ready())
}

fn progress_message(pods: &[(&PodStatus, Component)], component: Component, label: &str) -> String {
    let Some((pod, _)) = pods.iter().find(|(_, c)| *c == component) else {
        return format!("Waiting for {} pod...", label);
    };

    match pod.phase.as_deref() {
        Some("Pending") => {
            for container in &pod.containers {
                match container.state_detail.as_deref() {
                    Some("ContainerCreating") => return "Creating container...".to_string(),
                    Some("PodInitializing") => return "Initializing...".to_string(),
                    _ => {}
                }
            }
            "Pod pending...".to_string()
        }
        Some("Running") => {
            let ready = pod.containers.iter().filter(|c| c.ready).count();
            let total = pod.containers.len();
            if ready < total {
                format!("Containers: {}/{} ready", ready, total)
            } else {
                "Starting...".to_string()
            }
        }
        other => format!("Status: {}", other.unwrap_or("Unknown")),
    }
}

/// Reduce one observation of pod status to a phase event.
///
/// This is stateless: it reports the furthest phase whose prerequisites are
/// ready right now. Monotonicity across polls is enforced by the session.
pub fn calculate_phase(pods: &[PodStatus], mode: Mode, restart_threshold: i32) -> PhaseEvent {
    let expected = expected_pods(pods, mode);
    let pods_total = expected.len();
    let pods_ready = expected.iter().filter(|(p, _)| p.is_ready()).count();

    if let Some((pod, reason)) = expected
        .iter()
        .find_map(|(p, _)| failure_reason(p, restart_threshold).map(|r| (p, r)))
    {
        return PhaseEvent::failed(Some(pod.name.clone()), reason, pods_ready, pods_total);
    }

    if expected.is_empty() {
        return PhaseEvent::new(DeploymentPhase::DbStarting, 0, 0).with_message("Waiting for pods...");
    }

    if !component_ready(&expected, Component::Database) {
        return PhaseEvent::new(DeploymentPhase::DbStarting, pods_ready, pods_total)
            .with_message(progress_message(&expected, Component::Database, "postgres"));
    }

    if !component_ready(&expected, Component::Main) {
        return PhaseEvent::new(DeploymentPhase::N8nStarting, pods_ready, pods_total)
            .with_message(progress_message(&expected, Component::Main, "n8n-main"));
    }

    if mode == Mode::Queue {
        let workers_ready = component_ready(&expected, Component::Worker);
        let webhook_ready = component_ready(&expected, Component::Webhook);

        if !(workers_ready && webhook_ready) {
            let workers: Vec<_> = expected
                .iter()
                .filter(|(_, c)| *c == Component::Worker)
                .collect();
            let ready = workers.iter().filter(|(p, _)| p.is_ready()).count();
            return PhaseEvent::new(DeploymentPhase::WorkersStarting, pods_ready, pods_total)
                .with_message(format!(
                    "Workers: {}/{}, Webhook: {}",
                    ready,
                    workers.len(),
                    if webhook_ready { "ready" } else { "starting" }
                ));
        }
    }

    PhaseEvent::new(DeploymentPhase::Running, pods_ready, pods_total)
}

/// First expected pod that is not ready yet, for timeout reports
pub fn first_unready(pods: &[PodStatus], mode: Mode) -> Option<String> {
    expected_pods(pods, mode)
        .into_iter()
        .find(|(p, _)| !p.is_ready())
        .map(|(p, _)| p.name.clone())
}
