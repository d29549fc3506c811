//! Kubernetes integration for the version manager
//!
//! This module handles all reads against the single-node cluster:
//! - Memory accounting (allocatable vs. requested)
//! - Per-deployment footprints
//! - Pod status for phase tracking

mod client;
pub mod quantity;
mod reader;

pub use client::{pod_status_from, K8sClient, INSTANCE_CONFIGMAP};
pub use quantity::parse_memory_quantity;
pub use reader::ClusterStateReader;

#[cfg(test)]
pub use reader::MockClusterStateReader;
