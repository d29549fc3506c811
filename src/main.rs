use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use metrics_exporter_prometheus::PrometheusBuilder;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, Layer};

use n8n_versions_backend::{
    api::AppState,
    catalog::ReleaseCatalog,
    config::Config,
    create_router,
    helm::HelmClient,
    k8s::{ClusterStateReader, K8sClient},
};

fn init_tracing() {
    let json = std::env::var("LOG_FORMAT")
        .map(|f| f.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let fmt_layer = if json {
        tracing_subscriber::fmt::layer().json().boxed()
    } else {
        tracing_subscriber::fmt::layer().boxed()
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(fmt_layer)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    tracing::info!("Starting n8n Version Manager");

    // Load configuration
    let config = Config::load()?;
    tracing::info!("Configuration loaded");

    let metrics = PrometheusBuilder::new()
        .install_recorder()
        .context("Failed to install Prometheus recorder")?;

    let catalog = ReleaseCatalog::new(
        &config.releases_url,
        config.catalog_ttl(),
        config.catalog_cache_path(),
    )?;

    let helm = HelmClient::new(
        &config.chart_path,
        config.helm_timeout(),
        &config.deployment_label_selector,
    );
    tracing::info!(chart = %config.chart_path, "Helm client initialized");

    let state = AppState::new(config.clone(), catalog)
        .with_orchestrator(Arc::new(helm))
        .with_metrics(metrics);

    // Spawn K8s Connection Manager (Automatic Reconnection)
    let mgr_state = state.clone();
    let selector = config.deployment_label_selector.clone();
    tokio::spawn(async move {
        tracing::info!("K8s connection manager started");

        loop {
            let current = mgr_state.cluster.read().await.clone();

            match current {
                None => match K8sClient::new(&selector).await {
                    Ok(k8s) => match k8s.health_check().await {
                        Ok(()) => {
                            tracing::info!("Connected to Kubernetes cluster");
                            mgr_state.set_cluster(Arc::new(k8s)).await;
                        }
                        Err(e) => {
                            tracing::warn!("K8s client created but unhealthy: {}", e);
                        }
                    },
                    Err(e) => {
                        tracing::debug!("K8s connection attempt failed: {}", e);
                    }
                },
                Some(cluster) => {
                    if let Err(e) = cluster.health_check().await {
                        tracing::error!("Lost K8s connection: {}. Reconnecting...", e);
                        mgr_state.clear_cluster().await;
                    }
                }
            }

            tokio::time::sleep(tokio::time::Duration::from_secs(10)).await;
        }
    });

    // Build router
    let app = create_router(state);

    // Start server
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
