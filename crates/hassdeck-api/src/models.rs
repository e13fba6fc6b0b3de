// Wire-level payload types for the hub's realtime API.
//
// These mirror the JSON the hub sends, field for field. Timestamps stay as
// strings here; `hassdeck-core` parses them into its domain model.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One entity state object as returned by `get_states` and carried inside
/// `state_changed` events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawState {
    pub entity_id: String,
    pub state: String,
    #[serde(default)]
    pub attributes: Map<String, Value>,
    #[serde(default)]
    pub last_changed: Option<String>,
    #[serde(default)]
    pub last_updated: Option<String>,
    #[serde(default)]
    pub context: Option<Value>,
}

/// The `event` object of an inbound `{"type": "event"}` frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventEnvelope {
    pub event_type: String,
    #[serde(default)]
    pub data: Value,
    #[serde(default)]
    pub origin: Option<String>,
    #[serde(default)]
    pub time_fired: Option<String>,
}

/// `data` payload of a `state_changed` event.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct StateChangedData {
    pub entity_id: String,
    #[serde(default)]
    pub old_state: Option<RawState>,
    #[serde(default)]
    pub new_state: Option<RawState>,
}

/// Error object attached to a failed command result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HubErrorPayload {
    pub code: String,
    #[serde(default)]
    pub message: String,
}

/// Target selector for `call_service`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceTarget {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub entity_id: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub device_id: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub area_id: Vec<String>,
}

impl ServiceTarget {
    pub fn entity(entity_id: impl Into<String>) -> Self {
        Self {
            entity_id: vec![entity_id.into()],
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entity_id.is_empty() && self.device_id.is_empty() && self.area_id.is_empty()
    }
}

// ── Registry entries ────────────────────────────────────────────────

/// Row of `config/area_registry/list`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AreaEntry {
    pub area_id: String,
    pub name: String,
    #[serde(default)]
    pub floor_id: Option<String>,
    #[serde(default)]
    pub icon: Option<String>,
    #[serde(default)]
    pub aliases: Vec<String>,
}

/// Row of `config/device_registry/list`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceEntry {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub name_by_user: Option<String>,
    #[serde(default)]
    pub area_id: Option<String>,
    #[serde(default)]
    pub manufacturer: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub disabled_by: Option<String>,
}

/// Row of `config/entity_registry/list`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityEntry {
    pub entity_id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub original_name: Option<String>,
    #[serde(default)]
    pub device_id: Option<String>,
    #[serde(default)]
    pub area_id: Option<String>,
    #[serde(default)]
    pub platform: Option<String>,
    #[serde(default)]
    pub disabled_by: Option<String>,
    #[serde(default)]
    pub hidden_by: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_state_tolerates_missing_optional_fields() {
        let state: RawState =
            serde_json::from_str(r#"{"entity_id": "sun.sun", "state": "above_horizon"}"#)
                .expect("minimal state");
        assert_eq!(state.entity_id, "sun.sun");
        assert!(state.attributes.is_empty());
        assert!(state.last_changed.is_none());
    }

    #[test]
    fn service_target_skips_empty_lists() {
        let json = serde_json::to_value(ServiceTarget::entity("light.kitchen")).expect("ser");
        assert_eq!(json, serde_json::json!({ "entity_id": ["light.kitchen"] }));
        assert!(ServiceTarget::default().is_empty());
    }

    #[test]
    fn device_entry_keeps_user_name() {
        let entry: DeviceEntry = serde_json::from_value(serde_json::json!({
            "id": "d1",
            "name": "Hue bridge",
            "name_by_user": "Living room bridge",
            "area_id": "living_room",
            "config_entries": ["abc"]
        }))
        .expect("device entry");
        assert_eq!(entry.name_by_user.as_deref(), Some("Living room bridge"));
        assert_eq!(entry.area_id.as_deref(), Some("living_room"));
    }
}
