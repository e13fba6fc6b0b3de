// ── Hub-level information ──

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Subset of the `get_config` result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HubInfo {
    #[serde(default)]
    pub location_name: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub time_zone: String,
    /// `RUNNING`, `NOT_RUNNING`, ... on recent hubs.
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub components: Vec<String>,
    #[serde(default)]
    pub unit_system: BTreeMap<String, Value>,
}

/// `get_services` result: domain → service name → description.
pub type ServiceCatalog = BTreeMap<String, BTreeMap<String, Value>>;
