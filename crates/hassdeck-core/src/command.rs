// ── Service calls ──
//
// A `ServiceCall` is one `call_service` request aimed at one or more
// entities. The common on/off/toggle calls also know what the entity's
// state will look like once the hub applies them, so a store can show the
// result before the confirmation event arrives.

use serde_json::Value;

use hassdeck_api::models::ServiceTarget;
use hassdeck_api::protocol::Request;

use crate::model::{EntityId, EntityState};

/// A prepared `call_service` request.
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceCall {
    pub domain: String,
    pub service: String,
    pub target: ServiceTarget,
    pub data: Option<Value>,
}

impl ServiceCall {
    pub fn new(domain: impl Into<String>, service: impl Into<String>) -> Self {
        Self {
            domain: domain.into(),
            service: service.into(),
            target: ServiceTarget::default(),
            data: None,
        }
    }

    /// `<domain>.turn_on` for `entity`, using the entity's own domain.
    pub fn turn_on(entity: &EntityId) -> Self {
        Self::new(entity.domain(), "turn_on").with_entity(entity)
    }

    pub fn turn_off(entity: &EntityId) -> Self {
        Self::new(entity.domain(), "turn_off").with_entity(entity)
    }

    pub fn toggle(entity: &EntityId) -> Self {
        Self::new(entity.domain(), "toggle").with_entity(entity)
    }

    /// Add `entity` to the target.
    pub fn with_entity(mut self, entity: &EntityId) -> Self {
        self.target.entity_id.push(entity.as_str().to_owned());
        self
    }

    /// Replace the service data.
    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    /// Wire request. An empty target is left out entirely.
    pub fn into_request(self) -> Request {
        Request::CallService {
            domain: self.domain,
            service: self.service,
            service_data: self.data,
            target: (!self.target.is_empty()).then_some(self.target),
        }
    }

    /// Predicted state of `current` once this call succeeds.
    ///
    /// Only on/off/toggle on the call's single target entity are predicted;
    /// anything else returns `None`.
    pub fn optimistic_state(&self, current: &EntityState) -> Option<EntityState> {
        let [target] = self.target.entity_id.as_slice() else {
            return None;
        };
        if target != current.entity_id.as_str() {
            return None;
        }
        let next = match self.service.as_str() {
            "turn_on" => "on",
            "turn_off" => "off",
            "toggle" if current.state == "on" => "off",
            "toggle" if current.state == "off" => "on",
            _ => return None,
        };
        let mut predicted = current.clone();
        predicted.state = next.to_owned();
        predicted.optimistic = true;
        Some(predicted)
    }
}
