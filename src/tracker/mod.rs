//! Deployment progress tracker
//!
//! Each tracked namespace gets its own polling task. The task reduces pod
//! status to a forward-only phase and publishes it on a watch channel, so a
//! slow subscriber only ever sees the latest phase. The task stops on a
//! terminal phase, on timeout, or when the last subscriber goes away.

pub mod phase;
pub mod session;

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use futures::Stream;
use tokio::sync::watch;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_stream::wrappers::WatchStream;
use tracing::{debug, info, info_span, warn, Instrument};

use crate::k8s::ClusterStateReader;
use crate::models::{Mode, PhaseEvent};

pub use phase::{calculate_phase, Component, DEFAULT_RESTART_THRESHOLD};
pub use session::{SessionPolicy, TrackingSession, TIMEOUT_REASON};

/// Floor for the pod status poll period
pub const MIN_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Polling cadence and session policy
#[derive(Debug, Clone, Copy)]
pub struct TrackerConfig {
    pub poll_interval: Duration,
    pub phase_timeout: Duration,
    pub restart_threshold: i32,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(2),
            phase_timeout: Duration::from_secs(300),
            restart_threshold: DEFAULT_RESTART_THRESHOLD,
        }
    }
}

impl TrackerConfig {
    /// Configured cadence, raised to [`MIN_POLL_INTERVAL`]. A zero period
    /// would make `tokio::time::interval` panic inside the session task.
    pub fn effective_poll_interval(&self) -> Duration {
        self.poll_interval.max(MIN_POLL_INTERVAL)
    }

    fn session_policy(&self) -> SessionPolicy {
        SessionPolicy {
            phase_timeout: self.phase_timeout,
            restart_threshold: self.restart_threshold,
        }
    }
}

/// Finite stream of phase events for one namespace.
///
/// Ends after the terminal event. Dropping it cancels the polling task.
pub struct PhaseStream {
    inner: WatchStream<PhaseEvent>,
}

impl Stream for PhaseStream {
    type Item = PhaseEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.inner).poll_next(cx)
    }
}

/// Start observing `namespace` and return its event stream.
///
/// Every call starts a fresh session; streams are not restartable.
pub fn track_deployment(
    reader: Arc<dyn ClusterStateReader>,
    namespace: String,
    mode: Mode,
    config: TrackerConfig,
) -> PhaseStream {
    let (tx, rx) = watch::channel(PhaseEvent::default());

    let span = info_span!("track_deployment", namespace = %namespace, mode = %mode);
    tokio::spawn(run_session(reader, namespace, mode, config, tx).instrument(span));

    PhaseStream {
        inner: WatchStream::from_changes(rx),
    }
}

async fn run_session(
    reader: Arc<dyn ClusterStateReader>,
    namespace: String,
    mode: Mode,
    config: TrackerConfig,
    tx: watch::Sender<PhaseEvent>,
) {
    metrics::increment_gauge!("tracker_active_sessions", 1.0);
    info!("Tracking session started");

    let mut session = TrackingSession::new(mode, config.session_policy(), Instant::now());
    let mut ticker = tokio::time::interval(config.effective_poll_interval());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let outcome = loop {
        tokio::select! {
            _ = tx.closed() => break "cancelled",
            _ = ticker.tick() => {}
        }

        let emitted = match reader.get_pod_status(&namespace).await {
            Ok(pods) => session.observe(&pods, Instant::now()),
            Err(e) => {
                warn!(error = %e, "Failed to read pod status, retrying next poll");
                session.check_timeout(Instant::now())
            }
        };

        let Some(event) = emitted else {
            continue;
        };

        info!(phase = %event.phase, pods_ready = event.pods_ready, pods_total = event.pods_total, "Deployment phase changed");
        let terminal = event.is_terminal();
        let phase = event.phase;

        if tx.send(event).is_err() {
            break "cancelled";
        }
        if terminal {
            debug!(%phase, "Terminal phase reached");
            break if phase == crate::models::DeploymentPhase::Running {
                "running"
            } else {
                "failed"
            };
        }
    };

    metrics::decrement_gauge!("tracker_active_sessions", 1.0);
    metrics::increment_counter!("tracker_sessions_total", "outcome" => outcome);
    info!(outcome, "Tracking session ended");
}
