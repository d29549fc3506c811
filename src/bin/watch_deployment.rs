//! Follow a deployment's progress from the command line.
//!
//! Usage: watch_deployment <namespace> [queue|regular]
//! The service address comes from `N8N_VERSIONS_URL` (default
//! `http://localhost:8080`).

use std::str::FromStr;

use anyhow::{Context, Result};
use futures::StreamExt;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use n8n_versions_backend::{
    client::VersionManagerClient,
    models::{DeploymentPhase, Mode},
    reconnect::BackoffPolicy,
};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let mut args = std::env::args().skip(1);
    let namespace = args
        .next()
        .context("usage: watch_deployment <namespace> [queue|regular]")?;
    let mode = args
        .next()
        .map(|m| Mode::from_str(&m).with_context(|| format!("unknown mode '{}'", m)))
        .transpose()?;

    let base_url =
        std::env::var("N8N_VERSIONS_URL").unwrap_or_else(|_| "http://localhost:8080".to_string());
    let client = VersionManagerClient::new(&base_url)?;

    let mut events = Box::pin(client.watch(&namespace, mode, BackoffPolicy::default()));
    let mut last = None;

    while let Some(event) = events.next().await {
        let detail = event
            .message
            .as_deref()
            .or(event.reason.as_deref())
            .unwrap_or_default();
        println!(
            "[{}/{}] {:<14} {}",
            event.pods_ready, event.pods_total, event.label, detail
        );
        last = Some(event.phase);
    }

    match last {
        Some(DeploymentPhase::Running) => Ok(()),
        Some(phase) => anyhow::bail!("deployment ended in phase {}", phase),
        None => anyhow::bail!("no progress received for {}", namespace),
    }
}
