use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use serde::Deserialize;

use crate::tracker::{TrackerConfig, MIN_POLL_INTERVAL};

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default = "default_port")]
    pub port: u16,

    /// Local path of the n8n instance chart
    #[serde(default = "default_chart_path")]
    pub chart_path: String,

    #[serde(default = "default_helm_timeout_secs")]
    pub helm_timeout_secs: u64,

    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    #[serde(default = "default_phase_timeout_secs")]
    pub phase_timeout_secs: u64,

    #[serde(default = "default_restart_threshold")]
    pub restart_threshold: i32,

    /// Label selector identifying deployment namespaces
    #[serde(default = "default_deployment_label_selector")]
    pub deployment_label_selector: String,

    #[serde(default = "default_releases_url")]
    pub releases_url: String,

    #[serde(default = "default_catalog_ttl_secs")]
    pub catalog_ttl_secs: u64,

    #[serde(default)]
    pub catalog_cache_file: Option<String>,
}

fn default_port() -> u16 {
    8080
}

fn default_chart_path() -> String {
    "/workspace/charts/n8n-instance".to_string()
}

fn default_helm_timeout_secs() -> u64 {
    120
}

fn default_poll_interval_ms() -> u64 {
    2000
}

fn default_phase_timeout_secs() -> u64 {
    300
}

fn default_restart_threshold() -> i32 {
    crate::tracker::DEFAULT_RESTART_THRESHOLD
}

fn default_deployment_label_selector() -> String {
    "app=n8n".to_string()
}

fn default_releases_url() -> String {
    "https://api.github.com/repos/n8n-io/n8n/releases".to_string()
}

fn default_catalog_ttl_secs() -> u64 {
    6 * 60 * 60
}

impl Config {
    pub fn load() -> Result<Self> {
        // Load .env file if it exists
        dotenvy::dotenv().ok();

        let config = config::Config::builder()
            .add_source(config::Environment::default().try_parsing(true))
            .build()?;

        let mut settings: Config = config.try_deserialize().unwrap_or_else(|e| {
            tracing::warn!(error = %e, "Invalid configuration, using defaults");
            Config::default()
        });

        if settings.poll_interval_ms == 0 {
            tracing::warn!("POLL_INTERVAL_MS must be positive, using default");
            settings.poll_interval_ms = default_poll_interval_ms();
        }

        Ok(settings)
    }

    pub fn tracker(&self) -> TrackerConfig {
        TrackerConfig {
            poll_interval: Duration::from_millis(self.poll_interval_ms).max(MIN_POLL_INTERVAL),
            phase_timeout: Duration::from_secs(self.phase_timeout_secs),
            restart_threshold: self.restart_threshold,
        }
    }

    pub fn helm_timeout(&self) -> Duration {
        Duration::from_secs(self.helm_timeout_secs)
    }

    pub fn catalog_ttl(&self) -> Duration {
        Duration::from_secs(self.catalog_ttl_secs)
    }

    pub fn catalog_cache_path(&self) -> Option<PathBuf> {
        self.catalog_cache_file
            .as_deref()
            .filter(|p| !p.is_empty())
            .map(PathBuf::from)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: default_port(),
            chart_path: default_chart_path(),
            helm_timeout_secs: default_helm_timeout_secs(),
            poll_interval_ms: default_poll_interval_ms(),
            phase_timeout_secs: default_phase_timeout_secs(),
            restart_threshold: default_restart_threshold(),
            deployment_label_selector: default_deployment_label_selector(),
            releases_url: default_releases_url(),
            catalog_ttl_secs: default_catalog_ttl_secs(),
            catalog_cache_file: None,
        }
    }
}
