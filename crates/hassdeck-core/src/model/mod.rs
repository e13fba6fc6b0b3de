// ── Domain model ──
//
// Canonical types consumers work with. Wire types from `hassdeck-api` are
// converted into these in `crate::convert`.

pub mod entity;
pub mod event;
pub mod hub;
pub mod registry;

pub use entity::{EntityId, EntityState};
pub use event::{HubEvent, StateChangedEvent};
pub use hub::{HubInfo, ServiceCatalog};
pub use registry::{Area, Device, RegistryEntity};
