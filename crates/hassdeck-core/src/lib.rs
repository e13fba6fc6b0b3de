// hassdeck-core: Realtime hub connection and entity state between hassdeck-api and consumers.

pub mod admin;
pub mod command;
pub mod config;
pub mod connection;
pub mod convert;
pub mod error;
pub mod lifecycle;
pub mod machine;
pub mod model;
pub mod observers;
pub mod pending;
pub mod registry;
pub mod store;
pub mod stream;

// ── Primary re-exports ──────────────────────────────────────────────
pub use admin::admin_client;
pub use command::ServiceCall;
pub use config::{HubConfig, ReconnectPolicy, TlsVerification};
pub use connection::HubConnection;
pub use error::CoreError;
pub use lifecycle::{AppLifecycle, LifecycleWatcher};
pub use machine::ConnectionState;
pub use observers::Subscription;
pub use registry::ConnectionRegistry;
pub use store::{EntityStore, spawn_store_bridge};
pub use stream::EntityStream;

// Re-export model types at the crate root for ergonomics.
pub use model::{
    Area, Device, EntityId, EntityState, HubEvent, HubInfo, RegistryEntity, ServiceCatalog,
    StateChangedEvent,
};

// Wire request type, for callers building their own commands.
pub use hassdeck_api::protocol::Request;
pub use hassdeck_api::{AdminClient, EntityMapping, fetch_or_default};
