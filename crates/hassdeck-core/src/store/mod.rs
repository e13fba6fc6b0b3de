// ── Entity state storage ──

mod bridge;
mod entity_store;

pub use bridge::spawn_store_bridge;
pub use entity_store::EntityStore;
