use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::process::Command;
use tracing::{error, info, instrument, warn};

use super::types::ReleaseRequest;

/// Installs and removes releases on the cluster
#[async_trait]
pub trait ReleaseOrchestrator: Send + Sync {
    /// Install or upgrade a release. Returns the orchestrator output.
    async fn install(&self, request: &ReleaseRequest) -> Result<String>;

    /// Remove a release and its namespace
    async fn uninstall(&self, namespace: &str) -> Result<()>;
}

/// Client for the Helm CLI
#[derive(Clone)]
pub struct HelmClient {
    chart_path: PathBuf,
    timeout: Duration,
    namespace_label: String,
}

impl HelmClient {
    pub fn new(chart_path: impl Into<PathBuf>, timeout: Duration, namespace_label: &str) -> Self {
        Self {
            chart_path: chart_path.into(),
            timeout,
            namespace_label: namespace_label.to_string(),
        }
    }

    /// Run a command to completion. On timeout the child is killed, so a
    /// release reported as failed cannot finish later.
    async fn run(&self, program: &str, cmd: &mut Command) -> Result<CommandOutput> {
        let output = tokio::time::timeout(
            self.timeout,
            cmd.stdout(Stdio::piped())
                .stderr(Stdio::piped())
                .kill_on_drop(true)
                .output(),
        )
        .await
        .with_context(|| format!("{} timed out after {}s", program, self.timeout.as_secs()))?
        .with_context(|| format!("Failed to execute {}", program))?;

        Ok(CommandOutput {
            success: output.status.success(),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        })
    }

    /// Label the namespace so footprint listing picks it up
    async fn label_namespace(&self, namespace: &str) -> Result<()> {
        let output = self
            .run(
                "kubectl label",
                Command::new("kubectl")
                    .arg("label")
                    .arg("namespace")
                    .arg(namespace)
                    .arg(&self.namespace_label)
                    .arg("--overwrite"),
            )
            .await?;

        if output.success {
            Ok(())
        } else {
            Err(anyhow::anyhow!("kubectl label failed: {}", output.stderr))
        }
    }
}

struct CommandOutput {
    success: bool,
    stdout: String,
    stderr: String,
}

/// Helm reports this when `--create-namespace` races an existing namespace,
/// even though the release went through.
fn is_namespace_false_positive(stderr: &str) -> bool {
    stderr.contains("already exists") && stderr.contains("namespace")
}

#[async_trait]
impl ReleaseOrchestrator for HelmClient {
    #[instrument(skip(self, request), fields(namespace = %request.namespace, version = %request.version))]
    async fn install(&self, request: &ReleaseRequest) -> Result<String> {
        let values_yaml = serde_yaml::to_string(&request.chart_values())
            .context("Failed to serialize values to YAML")?;

        // Removed when dropped, after helm has read it
        let values_file = tempfile::Builder::new()
            .prefix("helm-values-")
            .suffix(".yaml")
            .tempfile()
            .context("Failed to create values file")?;
        tokio::fs::write(values_file.path(), &values_yaml)
            .await
            .context("Failed to write values file")?;

        info!(chart = %self.chart_path.display(), mode = %request.mode, "Installing release");

        let output = self
            .run(
                "helm upgrade",
                Command::new("helm")
                    .arg("upgrade")
                    .arg("--install")
                    .arg(&request.namespace)
                    .arg(&self.chart_path)
                    .arg("--namespace")
                    .arg(&request.namespace)
                    .arg("--create-namespace")
                    .arg("--values")
                    .arg(values_file.path()),
            )
            .await?;

        info!("Helm install stdout: {}", output.stdout);
        if !output.stderr.is_empty() {
            warn!("Helm install stderr: {}", output.stderr);
        }

        if !output.success {
            if is_namespace_false_positive(&output.stderr) {
                warn!("Ignoring namespace already-exists error from helm");
            } else {
                error!("Helm install failed: {}", output.stderr);
                return Err(anyhow::anyhow!("Helm install failed: {}", output.stderr));
            }
        }

        if let Err(e) = self.label_namespace(&request.namespace).await {
            warn!(error = %e, "Failed to label namespace");
        }

        info!("Release installed");
        Ok(output.stdout)
    }

    #[instrument(skip(self))]
    async fn uninstall(&self, namespace: &str) -> Result<()> {
        info!("Uninstalling release");

        let output = self
            .run(
                "helm uninstall",
                Command::new("helm")
                    .arg("uninstall")
                    .arg(namespace)
                    .arg("--namespace")
                    .arg(namespace),
            )
            .await?;

        if output.success {
            info!("Helm release uninstalled: {}", output.stdout.trim());
        } else {
            // The namespace may hold a partial install without a release
            warn!("Helm uninstall failed, deleting namespace anyway: {}", output.stderr);
        }

        let output = self
            .run(
                "kubectl delete",
                Command::new("kubectl")
                    .arg("delete")
                    .arg("namespace")
                    .arg(namespace)
                    .arg("--wait=true")
                    .arg("--ignore-not-found"),
            )
            .await?;

        if output.success {
            info!("Namespace deleted");
            Ok(())
        } else {
            error!("Namespace deletion failed: {}", output.stderr);
            Err(anyhow::anyhow!("Namespace deletion failed: {}", output.stderr))
        }
    }
}
