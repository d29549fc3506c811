//! n8n Version Manager Backend Library
//!
//! Runs several n8n versions side by side on one Kubernetes cluster:
//! identifier derivation, memory admission, and live deployment progress.

pub mod admission;
pub mod api;
pub mod catalog;
pub mod client;
pub mod config;
pub mod error;
pub mod helm;
pub mod identifier;
pub mod k8s;
pub mod models;
pub mod reconnect;
pub mod tracker;

use axum::{
    extract::Request,
    http::{header, HeaderValue, Method},
    middleware::{self, Next},
    response::Response,
    routing::{delete, get, post},
    Router,
};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::api::openapi::ApiDoc;
use crate::api::AppState;

/// Create the application router with the given state
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health check
        .route("/api/health", get(api::health::health_check))
        // Cluster capacity
        .route("/api/cluster/resources", get(api::cluster::resources))
        .route("/api/cluster/admission", post(api::cluster::check_admission))
        .route("/api/identifier", get(api::cluster::identifier))
        // Versions
        .route("/api/versions", get(api::versions::list))
        .route("/api/versions", post(api::versions::deploy))
        .route("/api/versions/available", get(api::versions::available))
        .route("/api/versions/:namespace", delete(api::versions::remove))
        .route("/api/versions/:namespace/phase", get(api::versions::phase))
        .route("/api/versions/:namespace/status", get(api::versions::status))
        .route("/api/versions/:namespace/pods", get(api::versions::pods))
        .route(
            "/api/versions/:namespace/events/stream",
            get(api::events::stream_events),
        )
        // Shared services
        .route("/api/infrastructure/status", get(api::infrastructure::status))
        // Metrics (Prometheus)
        .route("/metrics", get(api::metrics::metrics_handler))
        // OpenAPI / Swagger UI
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .with_state(state)
        .layer(middleware::from_fn(cache_control))
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer())
}

/// Cache lifetime for a request path
fn cache_policy(path: &str) -> &'static str {
    match path {
        "/api/versions/available" => "public, max-age=300",
        "/api/cluster/resources" => "private, max-age=10",
        _ => "no-cache",
    }
}

async fn cache_control(request: Request, next: Next) -> Response {
    let policy = (request.method() == Method::GET).then(|| cache_policy(request.uri().path()));
    let mut response = next.run(request).await;

    if let Some(policy) = policy {
        if !response.headers().contains_key(header::CACHE_CONTROL) {
            response
                .headers_mut()
                .insert(header::CACHE_CONTROL, HeaderValue::from_static(policy));
        }
    }
    response
}

/// Create CORS layer with secure configuration
fn cors_layer() -> CorsLayer {
    // Allow origins from environment or default to localhost for development
    let allowed_origins = std::env::var("CORS_ALLOWED_ORIGINS")
        .unwrap_or_else(|_| "http://localhost:3000".to_string());

    let origins: Vec<_> = allowed_origins
        .split(',')
        .filter_map(|s| s.trim().parse().ok())
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT, header::CACHE_CONTROL])
        .allow_credentials(true)
}
