//! Integration tests for the API

mod common;

use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use tower::ServiceExt;

use common::{failing_pod, footprint, pod, FakeCluster, FakeOrchestrator};
use n8n_versions_backend::{
    api::AppState, catalog::ReleaseCatalog, config::Config, create_router, models::Mode,
};

fn test_config() -> Config {
    Config {
        poll_interval_ms: 10,
        phase_timeout_secs: 5,
        ..Config::default()
    }
}

fn base_state() -> AppState {
    let config = test_config();
    let catalog =
        ReleaseCatalog::new("http://127.0.0.1:9/releases", Duration::from_secs(60), None).unwrap();
    AppState::new(config, catalog)
}

async fn setup_app(cluster: Option<FakeCluster>) -> (Router, Arc<FakeOrchestrator>) {
    let orchestrator = Arc::new(FakeOrchestrator::default());
    let state = base_state().with_orchestrator(orchestrator.clone());
    if let Some(cluster) = cluster {
        state.set_cluster(Arc::new(cluster)).await;
    }
    (create_router(state), orchestrator)
}

async fn send(app: Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = serde_json::from_slice(&body).unwrap_or(Value::Null);
    (status, json)
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn post_json(uri: &str, payload: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(payload.to_string()))
        .unwrap()
}

/// The node from the capacity walkthrough: 7736 Mi allocatable, 7488 Mi requested
fn busy_cluster() -> FakeCluster {
    FakeCluster::new(7736, 7488).with_footprints(vec![
        footprint("n8n-v1-85-0", 1792, Mode::Queue, 7200),
        footprint("n8n-v1-86-0", 512, Mode::Regular, 3600),
        footprint("my-test", 512, Mode::Regular, 7200),
    ])
}

#[tokio::test]
async fn test_health_check() {
    let (app, _) = setup_app(Some(FakeCluster::new(8000, 0))).await;
    let (status, json) = send(app, get("/api/health")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "ok");
    assert_eq!(json["clusterConnected"], true);
}

#[tokio::test]
async fn test_health_degraded_without_cluster() {
    let (app, _) = setup_app(None).await;
    let (status, json) = send(app, get("/api/health")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "degraded");
}

#[tokio::test]
async fn test_admission_fails_fast_without_cluster() {
    let (app, _) = setup_app(None).await;
    let (status, json) = send(
        app,
        post_json("/api/cluster/admission", json!({ "mode": "queue" })),
    )
    .await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(json["success"], false);
    assert_eq!(json["error"]["code"], "CLUSTER_UNAVAILABLE");
}

#[tokio::test]
async fn test_admission_rejects_with_candidates_oldest_first() {
    let (app, _) = setup_app(Some(busy_cluster())).await;
    let (status, json) = send(
        app,
        post_json("/api/cluster/admission", json!({ "mode": "queue" })),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["canDeploy"], false);
    assert_eq!(json["requiredMi"], 1792);
    assert_eq!(json["availableMi"], 248);
    assert_eq!(json["deficitMi"], 1544);

    let candidates: Vec<&str> = json["candidatesForRemoval"]
        .as_array()
        .unwrap()
        .iter()
        .map(|c| c["namespace"].as_str().unwrap())
        .collect();
    assert_eq!(candidates, vec!["my-test", "n8n-v1-85-0", "n8n-v1-86-0"]);
}

#[tokio::test]
async fn test_admission_admits_when_memory_fits() {
    let (app, _) = setup_app(Some(FakeCluster::new(8000, 6000))).await;
    let (status, json) = send(
        app,
        post_json("/api/cluster/admission", json!({ "mode": "regular" })),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["canDeploy"], true);
    assert_eq!(json["deficitMi"], 0);
    assert_eq!(json["candidatesForRemoval"], json!([]));
}

#[tokio::test]
async fn test_admission_unknown_mode() {
    let (app, _) = setup_app(Some(FakeCluster::new(8000, 0))).await;
    let (status, json) = send(
        app,
        post_json("/api/cluster/admission", json!({ "mode": "cluster" })),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"]["code"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn test_identifier_endpoint() {
    let (app, _) = setup_app(None).await;
    let (status, json) = send(app, get("/api/identifier?version=1.85.0")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["namespace"], "n8n-v1-85-0");
    assert_eq!(json["port"], 30950);

    let (app, _) = setup_app(None).await;
    let (status, json) = send(app, get("/api/identifier?version=1.85.0&name=my-test")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"]["code"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn test_cluster_resources() {
    let (app, _) = setup_app(Some(busy_cluster())).await;
    let response = app.oneshot(get("/api/cluster/resources")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[header::CACHE_CONTROL],
        "private, max-age=10"
    );

    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["memory"]["availableMi"], 248);
    assert_eq!(json["memory"]["utilizationPercent"], 97);
    assert_eq!(json["canDeploy"]["queueMode"], false);
    assert_eq!(json["canDeploy"]["regularMode"], false);
    assert_eq!(json["deployments"][0]["namespace"], "my-test");
}

#[tokio::test]
async fn test_deploy_starts_release() {
    let (app, orchestrator) = setup_app(Some(FakeCluster::new(8000, 1000))).await;
    let (status, json) = send(
        app,
        post_json(
            "/api/versions",
            json!({ "version": "1.85.0", "mode": "queue", "snapshot": "prod_backup" }),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["namespace"], "n8n-v1-85-0");
    assert_eq!(json["port"], 30950);
    assert_eq!(json["url"], "http://localhost:30950");

    let installs = orchestrator.installs.lock().unwrap();
    assert_eq!(installs.len(), 1);
    assert_eq!(installs[0].mode, Mode::Queue);
    assert_eq!(installs[0].snapshot.as_deref(), Some("prod_backup"));
}

#[tokio::test]
async fn test_deploy_custom_name() {
    let (app, orchestrator) = setup_app(Some(FakeCluster::new(8000, 1000))).await;
    let (status, json) = send(
        app,
        post_json(
            "/api/versions",
            json!({ "version": "1.85.0", "mode": "regular", "name": "hello" }),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["namespace"], "hello");
    assert_eq!(json["port"], 30870);
    assert_eq!(orchestrator.installs.lock().unwrap()[0].version, "1.85.0");
}

#[tokio::test]
async fn test_deploy_rejects_existing_namespace() {
    let cluster = FakeCluster::new(16000, 0).with_footprints(vec![footprint(
        "n8n-v1-85-0",
        512,
        Mode::Regular,
        60,
    )]);
    let (app, orchestrator) = setup_app(Some(cluster)).await;
    let (status, json) = send(
        app,
        post_json("/api/versions", json!({ "version": "1.85.0", "mode": "regular" })),
    )
    .await;

    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(json["error"]["code"], "CONFLICT");
    assert!(orchestrator.installs.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_deploy_gated_by_admission() {
    let (app, orchestrator) = setup_app(Some(busy_cluster())).await;
    let (status, json) = send(
        app,
        post_json("/api/versions", json!({ "version": "1.92.0", "mode": "queue" })),
    )
    .await;

    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(json["error"]["code"], "INSUFFICIENT_MEMORY");
    assert_eq!(json["error"]["details"]["deficitMi"], 1544);
    assert_eq!(
        json["error"]["details"]["candidatesForRemoval"]
            .as_array()
            .unwrap()
            .len(),
        3
    );
    assert!(orchestrator.installs.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_deploy_validation() {
    let (app, _) = setup_app(Some(FakeCluster::new(8000, 0))).await;
    let (status, _) = send(
        app,
        post_json("/api/versions", json!({ "version": "latest", "mode": "queue" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (app, _) = setup_app(Some(FakeCluster::new(8000, 0))).await;
    let (status, _) = send(
        app,
        post_json(
            "/api/versions",
            json!({ "version": "1.85.0", "mode": "queue", "snapshot": "../../etc" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_deploy_rejects_version_without_valid_namespace() {
    let (app, orchestrator) = setup_app(Some(FakeCluster::new(8000, 0))).await;
    let (status, body) = send(
        app,
        post_json("/api/versions", json!({ "version": "1.0.0-beta.", "mode": "regular" })),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
    assert!(orchestrator.installs.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_remove_deployment() {
    let cluster = FakeCluster::new(8000, 0).with_footprints(vec![footprint(
        "n8n-v1-85-0",
        512,
        Mode::Regular,
        60,
    )]);
    let (app, orchestrator) = setup_app(Some(cluster)).await;
    let request = Request::builder()
        .method("DELETE")
        .uri("/api/versions/n8n-v1-85-0")
        .body(Body::empty())
        .unwrap();
    let (status, _) = send(app, request).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        *orchestrator.uninstalls.lock().unwrap(),
        vec!["n8n-v1-85-0".to_string()]
    );
}

#[tokio::test]
async fn test_remove_missing_deployment() {
    let (app, orchestrator) = setup_app(Some(FakeCluster::new(8000, 0))).await;
    let request = Request::builder()
        .method("DELETE")
        .uri("/api/versions/n8n-v9-9-9")
        .body(Body::empty())
        .unwrap();
    let (status, json) = send(app, request).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["error"]["code"], "NOT_FOUND");
    assert!(orchestrator.uninstalls.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_list_versions() {
    let cluster = FakeCluster::new(8000, 0)
        .with_footprints(vec![
            footprint("n8n-v1-85-0", 512, Mode::Regular, 100),
            footprint("hello", 512, Mode::Regular, 200),
        ])
        .with_polls(vec![vec![
            pod("postgres-db-0", true),
            pod("n8n-main-0", true),
        ]]);
    let (app, _) = setup_app(Some(cluster)).await;
    let (status, json) = send(app, get("/api/versions")).await;

    assert_eq!(status, StatusCode::OK);
    let versions = json["versions"].as_array().unwrap();
    assert_eq!(versions.len(), 2);

    assert_eq!(versions[0]["namespace"], "hello");
    assert_eq!(versions[0]["version"], "unknown");
    assert_eq!(versions[0]["name"], "hello");
    assert_eq!(versions[0]["port"], 30870);

    assert_eq!(versions[1]["version"], "1.85.0");
    assert_eq!(versions[1]["name"], Value::Null);
    assert_eq!(versions[1]["phase"], "running");
    assert_eq!(versions[1]["podsReady"], 2);
}

#[tokio::test]
async fn test_phase_uses_detected_mode() {
    let cluster = FakeCluster::new(8000, 0)
        .with_mode(Mode::Queue)
        .with_polls(vec![vec![
            pod("postgres-db-0", true),
            pod("n8n-main-0", true),
        ]]);
    let (app, _) = setup_app(Some(cluster)).await;
    let (status, json) = send(app, get("/api/versions/n8n-v1-85-0/phase")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["phase"], "workers-starting");
    assert_eq!(json["label"], "Workers");
}

#[tokio::test]
async fn test_phase_rejects_invalid_namespace() {
    let (app, _) = setup_app(Some(FakeCluster::new(8000, 0))).await;
    let (status, _) = send(app, get("/api/versions/Bad_Name/phase")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_namespace_status() {
    let (app, _) = setup_app(Some(busy_cluster())).await;
    let (status, json) = send(app.clone(), get("/api/versions/n8n-v1-85-0/status")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["namespace"], "n8n-v1-85-0");
    assert_eq!(json["exists"], true);

    let (status, json) = send(app, get("/api/versions/n8n-v1-99-0/status")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["exists"], false);
}

#[tokio::test]
async fn test_namespace_pods() {
    let cluster = FakeCluster::new(8000, 0).with_polls(vec![vec![
        pod("postgres-db-0", true),
        failing_pod("n8n-main-0", "ImagePullBackOff", 0),
    ]]);
    let (app, _) = setup_app(Some(cluster)).await;
    let (status, json) = send(app, get("/api/versions/n8n-v1-85-0/pods")).await;

    assert_eq!(status, StatusCode::OK);
    let pods = json["pods"].as_array().unwrap();
    assert_eq!(pods.len(), 2);
    assert_eq!(pods[1]["name"], "n8n-main-0");
    assert_eq!(pods[1]["containers"][0]["ready"], false);
}

#[tokio::test]
async fn test_namespace_pods_rejects_invalid_namespace() {
    let (app, _) = setup_app(Some(FakeCluster::new(8000, 0))).await;
    let (status, _) = send(app, get("/api/versions/Bad_Name/pods")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_infrastructure_status() {
    let cluster = FakeCluster::new(8000, 0)
        .with_pod_phase("n8n-system", "app=redis", "Running")
        .with_pod_phase("n8n-system", "app=backup-storage", "Pending");
    let (app, _) = setup_app(Some(cluster)).await;
    let (status, json) = send(app, get("/api/infrastructure/status")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["redis"]["healthy"], true);
    assert_eq!(json["redis"]["status"], "healthy");
    assert_eq!(json["backup"]["healthy"], false);
    assert_eq!(json["backup"]["status"], "unavailable");
}

#[tokio::test]
async fn test_infrastructure_status_without_pods() {
    let (app, _) = setup_app(Some(FakeCluster::new(8000, 0))).await;
    let (status, json) = send(app, get("/api/infrastructure/status")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["redis"]["status"], "unavailable");
    assert_eq!(json["backup"]["status"], "unavailable");
}

#[tokio::test]
async fn test_infrastructure_status_requires_cluster() {
    let (app, _) = setup_app(None).await;
    let (status, _) = send(app, get("/api/infrastructure/status")).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_event_stream_ends_after_terminal_phase() {
    let cluster = FakeCluster::new(8000, 0).with_polls(vec![
        vec![pod("postgres-db-0", false)],
        vec![pod("postgres-db-0", true), pod("n8n-main-0", false)],
        vec![pod("postgres-db-0", true), pod("n8n-main-0", true)],
    ]);
    let (app, _) = setup_app(Some(cluster)).await;

    let response = app
        .oneshot(get("/api/versions/n8n-v1-85-0/events/stream?mode=regular"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[header::CONTENT_TYPE],
        "text/event-stream"
    );

    let body = tokio::time::timeout(
        Duration::from_secs(5),
        axum::body::to_bytes(response.into_body(), usize::MAX),
    )
    .await
    .expect("stream should close after the terminal phase")
    .unwrap();
    let text = String::from_utf8(body.to_vec()).unwrap();

    assert!(text.starts_with("event: connected"));
    assert!(text.contains("event: phase"));
    assert!(text.contains("\"phase\":\"running\""));
    assert!(text.contains("event: complete"));
    assert!(!text.contains("workers-starting"));
}

#[tokio::test]
async fn test_event_stream_reports_crash_loop() {
    let cluster = FakeCluster::new(8000, 0).with_polls(vec![
        vec![pod("postgres-db-0", true), pod("n8n-main-0", false)],
        vec![
            pod("postgres-db-0", true),
            failing_pod("n8n-main-0", "CrashLoopBackOff", 4),
        ],
    ]);
    let (app, _) = setup_app(Some(cluster)).await;

    let response = app
        .oneshot(get("/api/versions/n8n-v1-85-0/events/stream?mode=regular"))
        .await
        .unwrap();
    let body = tokio::time::timeout(
        Duration::from_secs(5),
        axum::body::to_bytes(response.into_body(), usize::MAX),
    )
    .await
    .expect("stream should close after the failure")
    .unwrap();
    let text = String::from_utf8(body.to_vec()).unwrap();

    assert_eq!(text.matches("\"phase\":\"failed\"").count(), 2, "phase and complete frames");
    assert!(text.contains("event: complete"));
    assert!(text.contains("\"failedPod\":\"n8n-main-0\""));
    assert!(text.contains("\"reason\":\"main: CrashLoopBackOff\""));
    assert!(!text.contains("\"phase\":\"running\""));
}

#[tokio::test]
async fn test_event_stream_requires_cluster() {
    let (app, _) = setup_app(None).await;
    let (status, json) = send(app, get("/api/versions/n8n-v1-85-0/events/stream")).await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(json["error"]["code"], "CLUSTER_UNAVAILABLE");
}

#[tokio::test]
async fn test_openapi_served() {
    let (app, _) = setup_app(None).await;
    let (status, json) = send(app, get("/api-docs/openapi.json")).await;

    assert_eq!(status, StatusCode::OK);
    assert!(json["paths"]["/api/cluster/admission"].is_object());
}
