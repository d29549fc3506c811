//! Deployment progress over Server-Sent Events
//!
//! Event sequence on one connection:
//! - `connected` once, with the namespace and resolved mode
//! - `phase` for every phase transition
//! - `complete` after the terminal phase, then the stream closes
//!
//! Keep-alive comments go out every 30s. Closing the connection drops the
//! phase stream, which stops the polling task.

use std::time::Duration;

use axum::{
    extract::{Path, Query, State},
    response::sse::{Event, KeepAlive, Sse},
};
use futures::{stream, Stream, StreamExt};
use serde_json::json;
use tracing::info;

use crate::api::versions::{resolve_mode, validate_namespace, ModeQuery};
use crate::api::AppState;
use crate::error::AppResult;
use crate::models::PhaseEvent;
use crate::tracker::track_deployment;

const KEEP_ALIVE_INTERVAL: Duration = Duration::from_secs(30);

fn phase_frames(event: PhaseEvent) -> Vec<Result<Event, axum::Error>> {
    let mut frames = vec![Event::default().event("phase").json_data(&event)];
    if event.is_terminal() {
        frames.push(Event::default().event("complete").json_data(&event));
    }
    frames
}

/// Stream phase transitions for a deployment
#[utoipa::path(
    get,
    path = "/api/versions/{namespace}/events/stream",
    tag = "versions",
    params(("namespace" = String, Path, description = "Deployment namespace"), ModeQuery),
    responses(
        (status = 200, description = "Server-sent phase events", content_type = "text/event-stream"),
        (status = 503, description = "Cluster unavailable"),
    )
)]
pub async fn stream_events(
    State(state): State<AppState>,
    Path(namespace): Path<String>,
    Query(query): Query<ModeQuery>,
) -> AppResult<Sse<impl Stream<Item = Result<Event, axum::Error>>>> {
    validate_namespace(&namespace)?;
    let cluster = state.cluster().await?;
    let mode = resolve_mode(&cluster, &namespace, query.mode.as_deref()).await?;

    info!(%namespace, %mode, "Progress subscriber connected");

    let connected = Event::default()
        .event("connected")
        .json_data(json!({ "namespace": namespace, "mode": mode }));

    let phases = track_deployment(cluster, namespace, mode, state.config.tracker())
        .flat_map(|event| stream::iter(phase_frames(event)));

    let events = stream::once(async move { connected }).chain(phases);

    Ok(Sse::new(events).keep_alive(KeepAlive::new().interval(KEEP_ALIVE_INTERVAL)))
}
