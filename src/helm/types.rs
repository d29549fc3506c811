use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use utoipa::ToSchema;

use crate::models::Mode;

lazy_static! {
    static ref SNAPSHOT_NAME: Regex =
        Regex::new(r"^[a-zA-Z0-9][a-zA-Z0-9_-]*$").expect("valid snapshot regex");
}

/// Request body for deploying a version
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DeployRequest {
    /// n8n version to run, `X.Y.Z[-pre]`
    pub version: String,
    /// `queue` or `regular`
    pub mode: String,
    /// Custom namespace; defaults to one derived from the version
    pub name: Option<String>,
    /// Database snapshot to restore on first start
    pub snapshot: Option<String>,
    /// Extra chart values, merged over the generated ones
    #[schema(value_type = Option<Object>)]
    pub helm_values: Option<Value>,
}

/// Response after a release has been handed to the orchestrator
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DeployResponse {
    pub namespace: String,
    pub port: u32,
    pub url: String,
    pub message: String,
}

/// Everything the orchestrator needs to install one release
#[derive(Debug, Clone, PartialEq)]
pub struct ReleaseRequest {
    pub namespace: String,
    pub version: String,
    pub mode: Mode,
    pub port: u32,
    pub snapshot: Option<String>,
    pub values: Option<Value>,
}

impl ReleaseRequest {
    /// Chart values for this release, user overrides merged last
    pub fn chart_values(&self) -> Value {
        let mut values = json!({
            "n8nVersion": self.version,
            "queueMode": self.mode == Mode::Queue,
            "service": { "nodePort": self.port },
            "database": {
                "isolated": {
                    "snapshot": {
                        "enabled": self.snapshot.is_some(),
                        "name": self.snapshot.clone().unwrap_or_default(),
                    }
                }
            }
        });

        if let Some(overrides) = &self.values {
            merge_values(&mut values, overrides);
        }
        values
    }
}

pub fn is_valid_snapshot_name(name: &str) -> bool {
    SNAPSHOT_NAME.is_match(name)
}

/// Deep-merge `overlay` into `base`. Objects merge key by key; anything
/// else in the overlay replaces the base value.
pub fn merge_values(base: &mut Value, overlay: &Value) {
    match (base, overlay) {
        (Value::Object(base), Value::Object(overlay)) => {
            for (key, value) in overlay {
                match base.get_mut(key) {
                    Some(existing) => merge_values(existing, value),
                    None => {
                        base.insert(key.clone(), value.clone());
                    }
                }
            }
        }
        (base, overlay) => *base = overlay.clone(),
    }
}
