// ── Entity identity and state ──
//
// `EntityId` and `EntityState` are the foundation of everything the hub
// reports. Entity ids are stable `<domain>.<object_id>` strings.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::CoreError;

// ── EntityId ────────────────────────────────────────────────────────

/// Stable identifier of one hub entity, e.g. `light.kitchen`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(String);

impl EntityId {
    /// The domain part (`light` in `light.kitchen`).
    pub fn domain(&self) -> &str {
        self.0.split_once('.').map_or(self.0.as_str(), |(domain, _)| domain)
    }

    /// The object part (`kitchen` in `light.kitchen`).
    pub fn object_id(&self) -> &str {
        self.0.split_once('.').map_or("", |(_, object)| object)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether this id has the `<domain>.<object_id>` shape.
    pub fn is_well_formed(&self) -> bool {
        !self.domain().is_empty() && !self.object_id().is_empty() && !self.0.contains(' ')
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for EntityId {
    type Err = CoreError;

    /// Strict parse, used for ids typed by a user.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let id = Self(s.trim().to_owned());
        if id.is_well_formed() {
            Ok(id)
        } else {
            Err(CoreError::ValidationFailed {
                message: format!("'{s}' is not an entity id (expected <domain>.<object_id>)"),
            })
        }
    }
}

/// Lenient conversion, used for ids that came from the hub.
impl From<String> for EntityId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for EntityId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

impl AsRef<str> for EntityId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

// ── EntityState ─────────────────────────────────────────────────────

/// Snapshot of one entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityState {
    pub entity_id: EntityId,
    /// Primary state value (`on`, `off`, `21.5`, `unavailable`, ...).
    pub state: String,
    #[serde(default)]
    pub attributes: Map<String, Value>,
    pub last_changed: Option<DateTime<Utc>>,
    pub last_updated: Option<DateTime<Utc>>,
    /// Set when the value was written locally ahead of the hub's
    /// confirmation. Cleared by the next authoritative update.
    #[serde(default)]
    pub optimistic: bool,
}

impl EntityState {
    pub fn domain(&self) -> &str {
        self.entity_id.domain()
    }

    /// `friendly_name` attribute, falling back to the entity id.
    pub fn display_name(&self) -> &str {
        self.attributes
            .get("friendly_name")
            .and_then(Value::as_str)
            .unwrap_or_else(|| self.entity_id.as_str())
    }

    pub fn unit(&self) -> Option<&str> {
        self.attributes
            .get("unit_of_measurement")
            .and_then(Value::as_str)
    }

    pub fn is_on(&self) -> bool {
        matches!(
            self.state.as_str(),
            "on" | "open" | "opening" | "playing" | "home" | "unlocked"
        )
    }

    pub fn is_available(&self) -> bool {
        !matches!(self.state.as_str(), "unavailable" | "unknown")
    }
}
