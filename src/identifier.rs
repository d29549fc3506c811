//! Deterministic namespace and port derivation
//!
//! Both the server and any client preview must agree on these values for the
//! same input, so the mapping is a pure function with no hidden state.

use lazy_static::lazy_static;
use regex::Regex;
use thiserror::Error;

use crate::models::Identifier;

/// Lowest NodePort handed out to deployments
pub const BASE_PORT: u32 = 30000;

/// Port spread for custom-named deployments
pub const CUSTOM_PORT_RANGE: u32 = 1000;

const VERSION_NAMESPACE_PREFIX: &str = "n8n-v";

lazy_static! {
    /// Kubernetes namespace rules: lowercase alphanumeric and hyphens,
    /// alphanumeric at both ends, at most 63 characters.
    static ref NAMESPACE_PATTERN: Regex =
        Regex::new(r"^[a-z0-9]([a-z0-9-]{0,61}[a-z0-9])?$").expect("valid namespace regex");

    /// `n8n-vX-Y-Z` namespaces created from plain versions
    static ref VERSION_NAMESPACE: Regex =
        Regex::new(r"^n8n-v(\d+)-(\d+)-(\d+)").expect("valid version namespace regex");

    /// Published release versions, optionally with a prerelease tail
    static ref RELEASE_VERSION: Regex =
        Regex::new(r"^\d+\.\d+\.\d+(-[a-zA-Z0-9.-]+)?$").expect("valid release version regex");
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdentifierError {
    #[error("exactly one of version or custom name must be provided")]
    InvalidInput,

    #[error("invalid version '{0}': expected major.minor.patch (e.g. 1.85.0)")]
    InvalidVersion(String),

    #[error("invalid name '{0}': must be lowercase alphanumeric with hyphens, max 63 chars")]
    InvalidName(String),
}

/// Derive the namespace and port for a deployment.
///
/// Exactly one of `version` / `custom_name` must be non-empty.
pub fn derive_identifier(
    version: Option<&str>,
    custom_name: Option<&str>,
) -> Result<Identifier, IdentifierError> {
    let version = version.filter(|v| !v.is_empty());
    let custom_name = custom_name.filter(|n| !n.is_empty());

    match (version, custom_name) {
        (Some(version), None) => from_version(version),
        (None, Some(name)) => from_custom_name(name),
        _ => Err(IdentifierError::InvalidInput),
    }
}

fn from_version(version: &str) -> Result<Identifier, IdentifierError> {
    let invalid = || IdentifierError::InvalidVersion(version.to_string());

    let mut components = version.split('.');

    let major = components
        .next()
        .filter(|c| !c.is_empty() && c.bytes().all(|b| b.is_ascii_digit()))
        .and_then(|c| c.parse::<u32>().ok())
        .ok_or_else(invalid)?;

    // Minor and patch may carry a prerelease tail ("0-beta"); only the
    // leading digits count. Missing components are zero.
    let mut rest = [0u32; 2];
    for slot in rest.iter_mut() {
        if let Some(component) = components.next() {
            *slot = leading_number(component).ok_or_else(invalid)?;
        }
    }
    let [minor, patch] = rest;

    let port = major
        .checked_mul(100)
        .and_then(|p| p.checked_add(minor.checked_mul(10)?))
        .and_then(|p| p.checked_add(patch))
        .and_then(|p| p.checked_add(BASE_PORT))
        .ok_or_else(invalid)?;

    // A trailing separator or an overlong prerelease tail would produce a
    // name Kubernetes rejects.
    let namespace = version_namespace(version);
    if !is_valid_namespace(&namespace) {
        return Err(invalid());
    }

    Ok(Identifier { namespace, port })
}

fn from_custom_name(name: &str) -> Result<Identifier, IdentifierError> {
    if !is_valid_namespace(name) {
        return Err(IdentifierError::InvalidName(name.to_string()));
    }

    Ok(Identifier {
        namespace: name.to_string(),
        port: custom_port(name),
    })
}

/// Port for a custom-named deployment: IEEE CRC-32 of the name, mod 1000.
/// Collisions are expected and left to the orchestrator.
pub fn custom_port(name: &str) -> u32 {
    BASE_PORT + crc32fast::hash(name.as_bytes()) % CUSTOM_PORT_RANGE
}

/// Namespace for a version: dots become hyphens, anything else that is not
/// a lowercase alphanumeric is normalized to a hyphen too.
fn version_namespace(version: &str) -> String {
    let encoded: String = version
        .chars()
        .map(|c| match c.to_ascii_lowercase() {
            c @ ('a'..='z' | '0'..='9') => c,
            _ => '-',
        })
        .collect();
    format!("{VERSION_NAMESPACE_PREFIX}{encoded}")
}

fn leading_number(component: &str) -> Option<u32> {
    let digits: &str = {
        let end = component
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(component.len());
        &component[..end]
    };
    if digits.is_empty() {
        return None;
    }
    digits.parse().ok()
}

/// Validate a Kubernetes namespace name
pub fn is_valid_namespace(name: &str) -> bool {
    NAMESPACE_PATTERN.is_match(name)
}

/// Full `X.Y.Z[-pre]` version as accepted for deployment
pub fn is_release_version(version: &str) -> bool {
    RELEASE_VERSION.is_match(version)
}

/// Recover `X.Y.Z` from a namespace created by the version path
pub fn version_from_namespace(namespace: &str) -> Option<String> {
    VERSION_NAMESPACE
        .captures(namespace)
        .map(|caps| format!("{}.{}.{}", &caps[1], &caps[2], &caps[3]))
}

/// Best-effort identifier for an existing namespace, used for listing.
pub fn identifier_for_namespace(namespace: &str) -> Identifier {
    match version_from_namespace(namespace).and_then(|v| from_version(&v).ok()) {
        Some(Identifier { port, .. }) => Identifier {
            namespace: namespace.to_string(),
            port,
        },
        None => Identifier {
            namespace: namespace.to_string(),
            port: custom_port(namespace),
        },
    }
}
