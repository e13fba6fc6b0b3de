// hassdeck-api: Async Rust client for the Home Assistant realtime API and the admin backend

pub mod admin;
pub mod camera;
pub mod endpoint;
pub mod error;
pub mod models;
pub mod protocol;
pub mod socket;
pub mod transport;

pub use admin::{AdminClient, EntityMapping, fetch_or_default};
pub use camera::CameraProxy;
pub use endpoint::websocket_url;
pub use error::Error;
pub use protocol::{CommandResult, Inbound, Outbound, Request};
pub use socket::{HubSocket, SocketReader, SocketWriter};
