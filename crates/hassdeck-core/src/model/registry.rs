// ── Hub registries ──
//
// Areas, devices and entity registry rows, as returned by the
// `config/*_registry/list` commands.

use serde::Serialize;

use super::entity::EntityId;

/// A room or zone configured on the hub.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Area {
    pub id: String,
    pub name: String,
    pub floor_id: Option<String>,
    pub icon: Option<String>,
}

/// A physical or logical device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Device {
    pub id: String,
    /// User-assigned name, else the integration's name, else the id.
    pub name: String,
    pub area_id: Option<String>,
    pub manufacturer: Option<String>,
    pub model: Option<String>,
    pub disabled: bool,
}

/// A registered entity and where it lives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RegistryEntity {
    pub entity_id: EntityId,
    pub name: Option<String>,
    pub device_id: Option<String>,
    /// Area set on the entity itself; the device's area applies otherwise.
    pub area_id: Option<String>,
    pub platform: Option<String>,
    pub disabled: bool,
    pub hidden: bool,
}

impl RegistryEntity {
    /// Resolve the entity's area, inheriting from its device.
    pub fn effective_area<'a>(&'a self, devices: &'a [Device]) -> Option<&'a str> {
        self.area_id.as_deref().or_else(|| {
            let device_id = self.device_id.as_deref()?;
            devices
                .iter()
                .find(|d| d.id == device_id)
                .and_then(|d| d.area_id.as_deref())
        })
    }
}
