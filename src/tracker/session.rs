//! Monotonic phase state machine for one tracking session

use std::time::Duration;

use tokio::time::Instant;

use super::phase::{calculate_phase, first_unready};
use crate::models::{DeploymentPhase, Mode, PhaseEvent, PodStatus};

/// Reason reported when a phase stalls past the soft timeout
pub const TIMEOUT_REASON: &str = "timeout";

/// Policy knobs for a session
#[derive(Debug, Clone, Copy)]
pub struct SessionPolicy {
    /// Longest stretch without forward progress before giving up
    pub phase_timeout: Duration,
    pub restart_threshold: i32,
}

/// State of one observation loop over a namespace.
///
/// Remembers the highest phase reached and never reports a lower one. Once a
/// terminal event has been produced the session is exhausted.
#[derive(Debug)]
pub struct TrackingSession {
    mode: Mode,
    policy: SessionPolicy,
    highest: DeploymentPhase,
    last_progress: Instant,
    last_pods: (usize, usize),
    finished: bool,
}

impl TrackingSession {
    pub fn new(mode: Mode, policy: SessionPolicy, started: Instant) -> Self {
        Self {
            mode,
            policy,
            highest: DeploymentPhase::Unknown,
            last_progress: started,
            last_pods: (0, 0),
            finished: false,
        }
    }

    pub fn phase(&self) -> DeploymentPhase {
        self.highest
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Feed one poll result. Returns an event only on a phase transition.
    pub fn observe(&mut self, pods: &[PodStatus], now: Instant) -> Option<PhaseEvent> {
        if self.finished {
            return None;
        }

        let event = calculate_phase(pods, self.mode, self.policy.restart_threshold);
        self.last_pods = (event.pods_ready, event.pods_total);

        if event.phase == DeploymentPhase::Failed {
            return Some(self.finish(event));
        }

        if event.phase.rank() > self.highest.rank() {
            self.highest = event.phase;
            self.last_progress = now;
            if event.is_terminal() {
                return Some(self.finish(event));
            }
            return Some(event);
        }

        self.expire(now, first_unready(pods, self.mode))
    }

    /// Timeout check for polls that produced no observation
    pub fn check_timeout(&mut self, now: Instant) -> Option<PhaseEvent> {
        if self.finished {
            return None;
        }
        self.expire(now, None)
    }

    fn expire(&mut self, now: Instant, stuck_pod: Option<String>) -> Option<PhaseEvent> {
        let stalled = now.saturating_duration_since(self.last_progress);
        if stalled < self.policy.phase_timeout {
            return None;
        }

        let (ready, total) = self.last_pods;
        let event = PhaseEvent::failed(stuck_pod, TIMEOUT_REASON, ready, total).with_message(
            format!(
                "No progress past {} for {}s",
                self.highest.label(),
                stalled.as_secs()
            ),
        );
        Some(self.finish(event))
    }

    fn finish(&mut self, event: PhaseEvent) -> PhaseEvent {
        self.finished = true;
        self.highest = event.phase;
        event
    }
}
