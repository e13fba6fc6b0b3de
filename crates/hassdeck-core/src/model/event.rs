// ── Events delivered to connection observers ──

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::Value;

use super::entity::{EntityId, EntityState};

/// Everything an observer of a `HubConnection` can receive.
#[derive(Debug, Clone, PartialEq)]
pub enum HubEvent {
    /// The socket authenticated and the change subscription was issued.
    /// Delivered exactly once per successful authentication.
    Connected,
    /// One entity changed on the hub.
    StateChanged(Arc<StateChangedEvent>),
    /// The hub refused the access token. The connection will not retry
    /// with the same credential.
    AuthInvalid { message: Option<String> },
    /// The authenticated socket went away (closed, failed, or torn down).
    Disconnected,
}

impl HubEvent {
    /// Short name for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Connected => "connected",
            Self::StateChanged(_) => "state_changed",
            Self::AuthInvalid { .. } => "auth_invalid",
            Self::Disconnected => "disconnected",
        }
    }
}

/// A `state_changed` event.
///
/// `old_state` is `None` for a newly added entity, `new_state` is `None`
/// for a removed one. `data` is the event payload exactly as the hub sent
/// it.
#[derive(Debug, Clone, PartialEq)]
pub struct StateChangedEvent {
    pub entity_id: EntityId,
    pub old_state: Option<EntityState>,
    pub new_state: Option<EntityState>,
    pub time_fired: Option<DateTime<Utc>>,
    pub data: Value,
}

impl StateChangedEvent {
    /// Whether this event removes the entity.
    pub fn is_removal(&self) -> bool {
        self.new_state.is_none()
    }
}
