//! Message shapes of the hub's realtime API.
//!
//! All frames are JSON text. Inbound frames are classified by their `type`
//! tag; a frame with no tag but a numeric `id` is treated as a command
//! result, which is how some proxies relay responses. Outbound commands are
//! a [`Request`] stamped with a per-socket id.
//!
//! Field names are fixed by the hub and must not be renamed.

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Error;
use crate::models::{EventEnvelope, HubErrorPayload, ServiceTarget};

/// Event type the client subscribes to after authentication.
pub const STATE_CHANGED: &str = "state_changed";

// ── Inbound ─────────────────────────────────────────────────────────

/// A frame received from the hub.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Inbound {
    /// First frame on every new socket.
    AuthRequired {
        #[serde(default)]
        ha_version: Option<String>,
    },
    /// Token accepted.
    AuthOk {
        #[serde(default)]
        ha_version: Option<String>,
    },
    /// Token rejected. The hub closes the socket right after.
    AuthInvalid {
        #[serde(default)]
        message: Option<String>,
    },
    /// Event delivered on a subscription.
    Event {
        #[serde(default)]
        id: Option<u64>,
        event: EventEnvelope,
    },
    /// Response to a command.
    Result(CommandResult),
    /// Response to `ping`.
    Pong { id: u64 },
    /// Any tag this client does not understand.
    #[serde(other)]
    Unknown,
}

impl Inbound {
    /// Parse a text frame.
    ///
    /// Tagged frames go through the enum; untagged frames must at least carry
    /// an `id` to be accepted as a command result.
    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        let value: Value = serde_json::from_str(text)?;
        if value.get("type").is_some() {
            serde_json::from_value(value)
        } else {
            serde_json::from_value::<CommandResult>(value).map(Self::Result)
        }
    }

    /// The request id this frame answers, if any.
    pub fn response_id(&self) -> Option<u64> {
        match self {
            Self::Result(result) => Some(result.id),
            Self::Pong { id } => Some(*id),
            _ => None,
        }
    }
}

/// Body of a `{"type": "result"}` frame.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CommandResult {
    pub id: u64,
    #[serde(default = "default_success")]
    pub success: bool,
    #[serde(default)]
    pub result: Value,
    #[serde(default)]
    pub error: Option<HubErrorPayload>,
}

fn default_success() -> bool {
    true
}

impl CommandResult {
    /// Collapse into the payload on success or a [`Error::Hub`] on failure.
    pub fn into_outcome(self) -> Result<Value, Error> {
        if self.success {
            return Ok(self.result);
        }
        let payload = self.error.unwrap_or_else(|| HubErrorPayload {
            code: "unknown_error".into(),
            message: String::new(),
        });
        Err(Error::Hub {
            code: payload.code,
            message: payload.message,
        })
    }
}

// ── Outbound ────────────────────────────────────────────────────────

/// A command the client can issue once authenticated.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Request {
    SubscribeEvents {
        #[serde(skip_serializing_if = "Option::is_none")]
        event_type: Option<String>,
    },
    UnsubscribeEvents {
        subscription: u64,
    },
    CallService {
        domain: String,
        service: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        service_data: Option<Value>,
        #[serde(skip_serializing_if = "Option::is_none")]
        target: Option<ServiceTarget>,
    },
    GetStates,
    GetConfig,
    GetServices,
    #[serde(rename = "config/area_registry/list")]
    AreaRegistryList,
    #[serde(rename = "config/device_registry/list")]
    DeviceRegistryList,
    #[serde(rename = "config/entity_registry/list")]
    EntityRegistryList,
    Ping,
}

impl Request {
    /// `subscribe_events` for `state_changed`.
    pub fn subscribe_state_changes() -> Self {
        Self::SubscribeEvents {
            event_type: Some(STATE_CHANGED.to_owned()),
        }
    }

    /// `call_service` with optional data and no explicit target.
    pub fn call_service(
        domain: impl Into<String>,
        service: impl Into<String>,
        service_data: Option<Value>,
    ) -> Self {
        Self::CallService {
            domain: domain.into(),
            service: service.into(),
            service_data,
            target: None,
        }
    }

    /// The wire `type` tag, for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::SubscribeEvents { .. } => "subscribe_events",
            Self::UnsubscribeEvents { .. } => "unsubscribe_events",
            Self::CallService { .. } => "call_service",
            Self::GetStates => "get_states",
            Self::GetConfig => "get_config",
            Self::GetServices => "get_services",
            Self::AreaRegistryList => "config/area_registry/list",
            Self::DeviceRegistryList => "config/device_registry/list",
            Self::EntityRegistryList => "config/entity_registry/list",
            Self::Ping => "ping",
        }
    }
}

/// A frame ready to be written to the socket.
#[derive(Debug, Clone)]
pub enum Outbound {
    /// Handshake reply carrying the bearer token.
    Auth { access_token: SecretString },
    /// A command stamped with its request id.
    Command { id: u64, request: Request },
}

#[derive(Serialize)]
struct AuthFrame<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    access_token: &'a str,
}

#[derive(Serialize)]
struct CommandFrame<'a> {
    id: u64,
    #[serde(flatten)]
    request: &'a Request,
}

impl Outbound {
    /// Serialize to the JSON text sent on the wire.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        match self {
            Self::Auth { access_token } => serde_json::to_string(&AuthFrame {
                kind: "auth",
                access_token: access_token.expose_secret(),
            }),
            Self::Command { id, request } => serde_json::to_string(&CommandFrame {
                id: *id,
                request,
            }),
        }
    }

    /// Request id, for command frames.
    pub fn id(&self) -> Option<u64> {
        match self {
            Self::Auth { .. } => None,
            Self::Command { id, .. } => Some(*id),
        }
    }
}
