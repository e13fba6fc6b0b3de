// ── API-to-domain type conversions ──
//
// Bridges raw `hassdeck_api` wire types into canonical `hassdeck_core::model`
// types. Timestamps are parsed, registry names resolved, and state-changed
// payloads decoded while keeping the original event data verbatim.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::Value;

use hassdeck_api::models::{AreaEntry, DeviceEntry, EntityEntry, EventEnvelope, RawState, StateChangedData};

use crate::model::{Area, Device, EntityState, RegistryEntity, StateChangedEvent};

// ── Helpers ────────────────────────────────────────────────────────

/// Parse an RFC 3339 timestamp, silently dropping unparseable values.
fn parse_datetime(raw: Option<&str>) -> Option<DateTime<Utc>> {
    raw.and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc))
}

// ── Entity state ───────────────────────────────────────────────────

impl From<RawState> for EntityState {
    fn from(raw: RawState) -> Self {
        Self {
            last_changed: parse_datetime(raw.last_changed.as_deref()),
            last_updated: parse_datetime(raw.last_updated.as_deref()),
            entity_id: raw.entity_id.into(),
            state: raw.state,
            attributes: raw.attributes,
            optimistic: false,
        }
    }
}

/// Decode a `get_states` result, skipping rows that don't parse.
pub fn states_from_value(value: Value) -> Vec<EntityState> {
    let Value::Array(rows) = value else {
        tracing::debug!("get_states result was not an array");
        return Vec::new();
    };
    rows.into_iter()
        .filter_map(|row| match serde_json::from_value::<RawState>(row) {
            Ok(raw) => Some(EntityState::from(raw)),
            Err(e) => {
                tracing::debug!(error = %e, "skipping malformed state row");
                None
            }
        })
        .collect()
}

// ── Events ─────────────────────────────────────────────────────────

/// Decode a `state_changed` envelope. Returns `None` for other event types
/// or when the payload lacks an `entity_id`.
pub fn state_changed_from_envelope(envelope: EventEnvelope) -> Option<Arc<StateChangedEvent>> {
    if envelope.event_type != hassdeck_api::protocol::STATE_CHANGED {
        return None;
    }
    let parsed: StateChangedData = match serde_json::from_value(envelope.data.clone()) {
        Ok(parsed) => parsed,
        Err(e) => {
            tracing::debug!(error = %e, "dropping malformed state_changed payload");
            return None;
        }
    };
    Some(Arc::new(StateChangedEvent {
        entity_id: parsed.entity_id.into(),
        old_state: parsed.old_state.map(EntityState::from),
        new_state: parsed.new_state.map(EntityState::from),
        time_fired: parse_datetime(envelope.time_fired.as_deref()),
        data: envelope.data,
    }))
}

// ── Registries ─────────────────────────────────────────────────────

impl From<AreaEntry> for Area {
    fn from(raw: AreaEntry) -> Self {
        Self {
            id: raw.area_id,
            name: raw.name,
            floor_id: raw.floor_id,
            icon: raw.icon,
        }
    }
}

impl From<DeviceEntry> for Device {
    fn from(raw: DeviceEntry) -> Self {
        let name = raw
            .name_by_user
            .or(raw.name)
            .unwrap_or_else(|| raw.id.clone());
        Self {
            id: raw.id,
            name,
            area_id: raw.area_id,
            manufacturer: raw.manufacturer,
            model: raw.model,
            disabled: raw.disabled_by.is_some(),
        }
    }
}

impl From<EntityEntry> for RegistryEntity {
    fn from(raw: EntityEntry) -> Self {
        Self {
            entity_id: raw.entity_id.into(),
            name: raw.name.or(raw.original_name),
            device_id: raw.device_id,
            area_id: raw.area_id,
            platform: raw.platform,
            disabled: raw.disabled_by.is_some(),
            hidden: raw.hidden_by.is_some(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn raw_state_timestamps_parse() {
        let raw: RawState = serde_json::from_value(json!({
            "entity_id": "sensor.outdoor",
            "state": "12.5",
            "attributes": { "unit_of_measurement": "°C" },
            "last_changed": "2026-02-10T12:00:00.123456+00:00",
            "last_updated": "not a date"
        }))
        .unwrap();
        let state = EntityState::from(raw);
        assert_eq!(state.entity_id.as_str(), "sensor.outdoor");
        assert_eq!(state.unit(), Some("°C"));
        assert!(state.last_changed.is_some());
        assert!(state.last_updated.is_none());
        assert!(!state.optimistic);
    }

    #[test]
    fn states_skip_bad_rows() {
        let states = states_from_value(json!([
            { "entity_id": "light.a", "state": "on" },
            { "state": "missing id" },
            { "entity_id": "light.b", "state": "off" }
        ]));
        assert_eq!(states.len(), 2);
        assert!(states_from_value(json!({ "not": "an array" })).is_empty());
    }

    #[test]
    fn state_changed_keeps_raw_data() {
        let data = json!({
            "entity_id": "switch.fan",
            "old_state": { "entity_id": "switch.fan", "state": "off" },
            "new_state": { "entity_id": "switch.fan", "state": "on" }
        });
        let event = state_changed_from_envelope(EventEnvelope {
            event_type: "state_changed".into(),
            data: data.clone(),
            origin: Some("LOCAL".into()),
            time_fired: Some("2026-02-10T12:00:00+00:00".into()),
        })
        .unwrap();
        assert_eq!(event.entity_id.as_str(), "switch.fan");
        assert_eq!(event.new_state.as_ref().unwrap().state, "on");
        assert_eq!(event.data, data);
        assert!(event.time_fired.is_some());
    }

    #[test]
    fn other_events_are_ignored() {
        let envelope = EventEnvelope {
            event_type: "call_service".into(),
            data: json!({}),
            origin: None,
            time_fired: None,
        };
        assert!(state_changed_from_envelope(envelope).is_none());
    }

    #[test]
    fn device_name_precedence() {
        let raw: DeviceEntry = serde_json::from_value(json!({
            "id": "abc",
            "name": "Hue bulb",
            "name_by_user": "Desk lamp",
            "disabled_by": "user"
        }))
        .unwrap();
        let device = Device::from(raw);
        assert_eq!(device.name, "Desk lamp");
        assert!(device.disabled);

        let bare: DeviceEntry = serde_json::from_value(json!({ "id": "xyz" })).unwrap();
        assert_eq!(Device::from(bare).name, "xyz");
    }
}
