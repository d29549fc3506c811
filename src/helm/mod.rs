//! Release orchestration through the Helm CLI

mod client;
pub mod types;

pub use client::{HelmClient, ReleaseOrchestrator};
pub use types::{DeployRequest, DeployResponse, ReleaseRequest};
