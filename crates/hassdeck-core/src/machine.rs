//! Connection state machine.
//!
//! [`HubMachine`] holds every decision the connection makes: when to open a
//! socket, what to send during the handshake, when and how long to wait
//! before reconnecting, and which inbound frames reach observers. It does no
//! I/O. Each [`Input`] yields a list of [`Effect`]s that the driver in
//! `crate::connection` performs in order.
//!
//! "Intent" is whether the owner currently wants a live connection. It is set
//! by `connect()` and cleared by `disconnect()` and by `auth_invalid`;
//! lifecycle changes never touch it.

use std::time::Duration;

use secrecy::SecretString;
use serde_json::Value;
use strum::Display;

use hassdeck_api::protocol::{Inbound, Outbound, Request};

use crate::config::ReconnectPolicy;
use crate::convert::state_changed_from_envelope;
use crate::error::CoreError;
use crate::lifecycle::AppLifecycle;
use crate::model::HubEvent;

// ── States ──────────────────────────────────────────────────────────

/// Observable state of a connection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum ConnectionState {
    /// No socket and no timer. Either never connected, explicitly
    /// disconnected, rejected by the hub, or out of automatic retries.
    #[default]
    Disconnected,
    /// Socket upgrade in progress.
    Connecting,
    /// Socket open, handshake not finished.
    Authenticating,
    /// Authenticated and subscribed.
    Connected,
    /// Waiting `delay` before reconnect attempt number `attempt` (1-based).
    Reconnecting { attempt: u32, delay: Duration },
    /// Wants a connection but the host is in the background.
    Backgrounded,
}

impl ConnectionState {
    /// Whether a physical socket exists (or is being opened).
    pub fn has_socket(self) -> bool {
        matches!(self, Self::Connecting | Self::Authenticating | Self::Connected)
    }

    pub fn is_connected(self) -> bool {
        matches!(self, Self::Connected)
    }
}

// ── Inputs and effects ──────────────────────────────────────────────

/// Something that happened to the connection.
#[derive(Debug, Clone)]
pub enum Input {
    /// Owner asked for a connection.
    Connect,
    /// Owner tore the connection down.
    Disconnect,
    /// The WebSocket upgrade finished.
    SocketOpened,
    /// The WebSocket upgrade failed.
    SocketFailed,
    /// The open socket closed or errored.
    SocketClosed,
    /// A well-formed frame arrived.
    Frame(Inbound),
    /// The reconnect delay elapsed.
    ReconnectTimerFired,
    /// The host moved to the foreground or background.
    Lifecycle(AppLifecycle),
}

/// Side effect requested by the machine.
#[derive(Debug)]
pub enum Effect {
    OpenSocket,
    Send(Outbound),
    CloseSocket,
    ScheduleReconnect(Duration),
    CancelReconnect,
    Notify(HubEvent),
    /// Complete pending request `id`, if it is still pending.
    Resolve {
        id: u64,
        outcome: Result<Value, CoreError>,
    },
    /// Fail every pending request with `ConnectionLost`.
    RejectPending,
}

// ── Machine ─────────────────────────────────────────────────────────

pub struct HubMachine {
    state: ConnectionState,
    token: SecretString,
    policy: ReconnectPolicy,
    lifecycle: AppLifecycle,
    intent: bool,
    /// Consecutive reconnect attempts since the last successful open.
    attempts: u32,
    /// Next request id on the current socket.
    next_id: u64,
    auth_sent: bool,
    subscription_id: Option<u64>,
}

impl HubMachine {
    pub fn new(token: SecretString, policy: ReconnectPolicy, lifecycle: AppLifecycle) -> Self {
        Self {
            state: ConnectionState::Disconnected,
            token,
            policy,
            lifecycle,
            intent: false,
            attempts: 0,
            next_id: 1,
            auth_sent: false,
            subscription_id: None,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn lifecycle(&self) -> AppLifecycle {
        self.lifecycle
    }

    /// Stamp `request` with the next id on the current socket.
    ///
    /// Fails with [`CoreError::NotConnected`] unless authenticated; no id is
    /// consumed in that case.
    pub fn prepare(&mut self, request: Request) -> Result<Outbound, CoreError> {
        if !self.state.is_connected() {
            return Err(CoreError::NotConnected);
        }
        let id = self.allocate_id();
        Ok(Outbound::Command { id, request })
    }

    fn allocate_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    /// Apply one input and return the effects to perform, in order.
    pub fn step(&mut self, input: Input) -> Vec<Effect> {
        match input {
            Input::Connect => self.on_connect(),
            Input::Disconnect => self.on_disconnect(),
            Input::SocketOpened => self.on_opened(),
            Input::SocketFailed | Input::SocketClosed => self.on_closed(),
            Input::Frame(frame) => self.on_frame(frame),
            Input::ReconnectTimerFired => self.on_timer(),
            Input::Lifecycle(lifecycle) => self.on_lifecycle(lifecycle),
        }
    }

    fn open(&mut self) -> Vec<Effect> {
        self.state = ConnectionState::Connecting;
        vec![Effect::OpenSocket]
    }

    fn on_connect(&mut self) -> Vec<Effect> {
        self.intent = true;
        match self.state {
            ConnectionState::Connecting
            | ConnectionState::Authenticating
            | ConnectionState::Connected => Vec::new(),
            _ if !self.lifecycle.is_foreground() => {
                self.state = ConnectionState::Backgrounded;
                Vec::new()
            }
            ConnectionState::Reconnecting { .. } => {
                let mut effects = vec![Effect::CancelReconnect];
                effects.extend(self.open());
                effects
            }
            ConnectionState::Disconnected | ConnectionState::Backgrounded => {
                self.attempts = 0;
                self.open()
            }
        }
    }

    fn on_disconnect(&mut self) -> Vec<Effect> {
        self.intent = false;
        self.attempts = 0;
        self.subscription_id = None;
        let mut effects = Vec::new();
        match self.state {
            ConnectionState::Reconnecting { .. } => effects.push(Effect::CancelReconnect),
            ConnectionState::Connecting | ConnectionState::Authenticating => {
                effects.push(Effect::CloseSocket);
            }
            ConnectionState::Connected => {
                effects.push(Effect::CloseSocket);
                effects.push(Effect::Notify(HubEvent::Disconnected));
            }
            ConnectionState::Disconnected | ConnectionState::Backgrounded => {}
        }
        effects.push(Effect::RejectPending);
        self.state = ConnectionState::Disconnected;
        effects
    }

    fn on_opened(&mut self) -> Vec<Effect> {
        if self.state != ConnectionState::Connecting {
            tracing::debug!(state = %self.state, "ignoring socket open in unexpected state");
            return Vec::new();
        }
        self.state = ConnectionState::Authenticating;
        self.attempts = 0;
        self.next_id = 1;
        self.auth_sent = false;
        Vec::new()
    }

    fn on_closed(&mut self) -> Vec<Effect> {
        if !self.state.has_socket() {
            return Vec::new();
        }
        let mut effects = Vec::new();
        if self.state.is_connected() {
            effects.push(Effect::Notify(HubEvent::Disconnected));
        }
        effects.push(Effect::RejectPending);
        self.subscription_id = None;

        if !self.intent {
            self.state = ConnectionState::Disconnected;
        } else if !self.lifecycle.is_foreground() {
            self.state = ConnectionState::Backgrounded;
        } else if self.policy.allows(self.attempts) {
            let delay = self.policy.delay(self.attempts);
            self.attempts += 1;
            tracing::info!(
                attempt = self.attempts,
                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                "scheduling reconnect"
            );
            self.state = ConnectionState::Reconnecting {
                attempt: self.attempts,
                delay,
            };
            effects.push(Effect::ScheduleReconnect(delay));
        } else {
            tracing::warn!(
                attempts = self.attempts,
                "reconnect attempts exhausted; waiting for foreground"
            );
            self.state = ConnectionState::Disconnected;
        }
        effects
    }

    fn on_timer(&mut self) -> Vec<Effect> {
        if matches!(self.state, ConnectionState::Reconnecting { .. }) {
            self.open()
        } else {
            Vec::new()
        }
    }

    fn on_lifecycle(&mut self, lifecycle: AppLifecycle) -> Vec<Effect> {
        if lifecycle == self.lifecycle {
            return Vec::new();
        }
        self.lifecycle = lifecycle;
        match (lifecycle, self.state) {
            (AppLifecycle::Background, ConnectionState::Reconnecting { .. }) => {
                self.state = ConnectionState::Backgrounded;
                vec![Effect::CancelReconnect]
            }
            (AppLifecycle::Background, ConnectionState::Disconnected) if self.intent => {
                self.state = ConnectionState::Backgrounded;
                Vec::new()
            }
            (
                AppLifecycle::Foreground,
                ConnectionState::Backgrounded | ConnectionState::Disconnected,
            ) if self.intent => {
                self.attempts = 0;
                self.open()
            }
            _ => Vec::new(),
        }
    }

    fn on_frame(&mut self, frame: Inbound) -> Vec<Effect> {
        match (self.state, frame) {
            (ConnectionState::Authenticating, Inbound::AuthRequired { ha_version }) => {
                if self.auth_sent {
                    tracing::debug!("duplicate auth_required ignored");
                    return Vec::new();
                }
                tracing::debug!(ha_version = ?ha_version, "hub requested authentication");
                self.auth_sent = true;
                vec![Effect::Send(Outbound::Auth {
                    access_token: self.token.clone(),
                })]
            }
            (ConnectionState::Authenticating, Inbound::AuthOk { ha_version }) => {
                if !self.auth_sent {
                    tracing::debug!("auth_ok before auth was sent; ignored");
                    return Vec::new();
                }
                tracing::info!(ha_version = ?ha_version, "authenticated with hub");
                self.state = ConnectionState::Connected;
                self.attempts = 0;
                let id = self.allocate_id();
                self.subscription_id = Some(id);
                vec![
                    Effect::Send(Outbound::Command {
                        id,
                        request: Request::subscribe_state_changes(),
                    }),
                    Effect::Notify(HubEvent::Connected),
                ]
            }
            (ConnectionState::Authenticating, Inbound::AuthInvalid { message }) => {
                tracing::warn!(message = ?message, "hub rejected the access token");
                self.intent = false;
                self.state = ConnectionState::Disconnected;
                vec![
                    Effect::Notify(HubEvent::AuthInvalid { message }),
                    Effect::CloseSocket,
                    Effect::RejectPending,
                ]
            }
            (ConnectionState::Connected, Inbound::Event { event, .. }) => {
                state_changed_from_envelope(event)
                    .map(|change| vec![Effect::Notify(HubEvent::StateChanged(change))])
                    .unwrap_or_default()
            }
            (ConnectionState::Connected, Inbound::Result(result)) => {
                if Some(result.id) == self.subscription_id {
                    if !result.success {
                        tracing::warn!(error = ?result.error, "state_changed subscription rejected");
                    }
                    return Vec::new();
                }
                let id = result.id;
                vec![Effect::Resolve {
                    id,
                    outcome: result.into_outcome().map_err(CoreError::from),
                }]
            }
            (ConnectionState::Connected, Inbound::Pong { id }) => vec![Effect::Resolve {
                id,
                outcome: Ok(Value::Null),
            }],
            (state, frame) => {
                tracing::debug!(%state, frame = ?frame, "dropping frame");
                Vec::new()
            }
        }
    }
}
