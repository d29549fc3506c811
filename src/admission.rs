//! Capacity admission planner
//!
//! Pure decision over a memory snapshot and the current deployment
//! footprints. The same function backs the UI preview and the authoritative
//! server-side gate in front of the orchestrator.

use std::str::FromStr;

use thiserror::Error;

use crate::models::{
    AdmissionDecision, ClusterMemorySnapshot, DeploymentMemoryFootprint, DeploymentProfile, Mode,
};

/// main(512) + webhook(256) + 2 * worker(512)
pub const QUEUE_MODE_MEMORY_MI: i64 = 1792;

/// main only
pub const REGULAR_MODE_MEMORY_MI: i64 = 512;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AdmissionError {
    #[error("unknown deployment mode '{0}': expected \"queue\" or \"regular\"")]
    UnknownMode(String),
}

/// Memory a fresh deployment of `mode` requests. Static policy: the check
/// runs before any pod exists.
pub fn required_memory_mi(mode: Mode) -> i64 {
    match mode {
        Mode::Queue => QUEUE_MODE_MEMORY_MI,
        Mode::Regular => REGULAR_MODE_MEMORY_MI,
    }
}

/// Parse a mode coming from an untyped caller
pub fn parse_mode(raw: &str) -> Result<Mode, AdmissionError> {
    Mode::from_str(raw).map_err(|_| AdmissionError::UnknownMode(raw.to_string()))
}

/// Decide whether a deployment with `profile` fits.
///
/// When it does not, every footprint is returned as a removal candidate,
/// oldest first with ties broken by namespace. Truncation is left to the
/// caller.
pub fn evaluate_admission(
    profile: &DeploymentProfile,
    snapshot: &ClusterMemorySnapshot,
    footprints: &[DeploymentMemoryFootprint],
) -> AdmissionDecision {
    let required_mi = required_memory_mi(profile.mode);
    let deficit_mi = (required_mi - snapshot.available_mi).max(0);
    let can_deploy = deficit_mi == 0;

    let candidates_for_removal = if can_deploy {
        Vec::new()
    } else {
        oldest_first(footprints)
    };

    AdmissionDecision {
        can_deploy,
        required_mi,
        available_mi: snapshot.available_mi,
        deficit_mi,
        candidates_for_removal,
    }
}

/// Sort footprints by age descending, namespace ascending
pub fn oldest_first(footprints: &[DeploymentMemoryFootprint]) -> Vec<DeploymentMemoryFootprint> {
    let mut sorted = footprints.to_vec();
    sorted.sort_by(|a, b| {
        b.age_seconds
            .cmp(&a.age_seconds)
            .then_with(|| a.namespace.cmp(&b.namespace))
    });
    sorted
}
