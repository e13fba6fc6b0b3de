// ── Hub connection ──
//
// `HubConnection` is a cheap, cloneable handle. The real work happens in a
// driver task that owns the socket, the state machine, the pending-request
// table and the reconnect timer. Handles talk to it over an unbounded
// command channel and read its state from a `watch` channel.

use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::Instant;
use url::Url;

use hassdeck_api::protocol::{Inbound, Request};
use hassdeck_api::{HubSocket, SocketReader, SocketWriter};

use crate::command::ServiceCall;
use crate::config::HubConfig;
use crate::convert::states_from_value;
use crate::error::CoreError;
use crate::lifecycle::{AppLifecycle, LifecycleWatcher};
use crate::machine::{ConnectionState, Effect, HubMachine, Input};
use crate::model::{Area, Device, EntityState, HubEvent, HubInfo, RegistryEntity, ServiceCatalog};
use crate::observers::{ObserverSet, Subscription};
use crate::pending::{Outcome, PendingRequests};
use crate::registry::ConnectionRegistry;

enum DriverCommand {
    Connect,
    Send {
        request: Request,
        reply: oneshot::Sender<Outcome>,
    },
    Disconnect {
        done: oneshot::Sender<()>,
    },
}

/// Last reason the connection failed to reach `Connected`.
#[derive(Debug, Clone)]
enum Failure {
    Transport(String),
    AuthRejected(Option<String>),
}

impl std::fmt::Display for Failure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Transport(reason) => f.write_str(reason),
            Self::AuthRejected(Some(message)) => write!(f, "authentication failed: {message}"),
            Self::AuthRejected(None) => f.write_str("authentication failed"),
        }
    }
}

type SharedFailure = Arc<Mutex<Option<Failure>>>;

/// State shared between every handle of one connection.
pub(crate) struct ConnectionInner {
    id: u64,
    url: Url,
    timeout: Duration,
    commands: mpsc::UnboundedSender<DriverCommand>,
    state: watch::Receiver<ConnectionState>,
    observers: ObserverSet,
    last_failure: SharedFailure,
}

// ── HubConnection ────────────────────────────────────────────────────

/// One logical session with the hub.
///
/// Construction spawns the driver task, so it must happen inside a Tokio
/// runtime. Once `disconnect()` has run the connection is finished; create a
/// new one to talk to the hub again.
#[derive(Clone)]
pub struct HubConnection {
    inner: Arc<ConnectionInner>,
}

impl HubConnection {
    /// Create a connection registered with the process-wide registry.
    pub fn new(config: HubConfig, lifecycle: &LifecycleWatcher) -> Result<Self, CoreError> {
        Self::with_registry(config, lifecycle, ConnectionRegistry::global())
    }

    /// Create a connection registered with `registry`.
    pub fn with_registry(
        config: HubConfig,
        lifecycle: &LifecycleWatcher,
        registry: Arc<ConnectionRegistry>,
    ) -> Result<Self, CoreError> {
        let endpoint = hassdeck_api::websocket_url(&config.url)?;
        let id = registry.allocate_id();
        if config.realtime_ignores_tls() {
            tracing::warn!(
                connection = id,
                url = %config.url,
                "custom TLS settings apply to the admin backend only; the realtime socket verifies against web PKI roots"
            );
        }

        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);
        let observers = ObserverSet::new();
        let last_failure: SharedFailure = Arc::new(Mutex::new(None));

        let lifecycle_rx = lifecycle.subscribe();
        let machine = HubMachine::new(
            config.token.clone(),
            config.reconnect,
            *lifecycle_rx.borrow(),
        );

        let inner = Arc::new(ConnectionInner {
            id,
            url: config.url.clone(),
            timeout: config.timeout,
            commands: commands_tx,
            state: state_rx,
            observers: observers.clone(),
            last_failure: Arc::clone(&last_failure),
        });
        registry.register(id, Arc::downgrade(&inner));

        let driver = Driver {
            id,
            endpoint,
            timeout: config.timeout,
            machine,
            pending: PendingRequests::new(),
            observers,
            state: state_tx,
            commands: commands_rx,
            lifecycle: lifecycle_rx,
            lifecycle_open: true,
            registry,
            last_failure,
            writer: None,
            reader: None,
            opening: None,
            reconnect_at: None,
        };
        tokio::spawn(driver.run());

        Ok(Self { inner })
    }

    pub(crate) fn from_inner(inner: Arc<ConnectionInner>) -> Self {
        Self { inner }
    }

    /// Registry id of this connection.
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    /// Hub base URL.
    pub fn url(&self) -> &Url {
        &self.inner.url
    }

    pub fn state(&self) -> ConnectionState {
        *self.inner.state.borrow()
    }

    /// Watch state transitions.
    pub fn state_changes(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state.clone()
    }

    /// Why the last attempt to reach the hub failed, if it did.
    pub fn last_error(&self) -> Option<String> {
        self.inner
            .last_failure
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(ToString::to_string)
    }

    /// Ask for a live connection. Idempotent; does nothing while a socket is
    /// open or opening, and waits for the foreground when backgrounded.
    pub fn connect(&self) {
        if self.inner.commands.send(DriverCommand::Connect).is_err() {
            tracing::debug!(connection = self.inner.id, "connect on a finished connection");
        }
    }

    /// Register an observer for every [`HubEvent`].
    pub fn subscribe<F>(&self, observer: F) -> Subscription
    where
        F: Fn(&HubEvent) + Send + Sync + 'static,
    {
        self.inner.observers.subscribe(Arc::new(observer))
    }

    /// Send `request` and wait for the hub's answer.
    ///
    /// Fails with [`CoreError::NotConnected`] right away, without sending
    /// anything, unless the connection is authenticated.
    pub async fn send_message(&self, request: Request) -> Result<Value, CoreError> {
        if !self.state().is_connected() {
            return Err(CoreError::NotConnected);
        }
        let (reply, response) = oneshot::channel();
        self.inner
            .commands
            .send(DriverCommand::Send { request, reply })
            .map_err(|_| CoreError::NotConnected)?;
        response.await.map_err(|_| CoreError::ConnectionLost)?
    }

    /// Invoke `domain.service` with optional `service_data`.
    pub async fn call_service(
        &self,
        domain: &str,
        service: &str,
        service_data: Option<Value>,
    ) -> Result<Value, CoreError> {
        self.send_message(Request::call_service(domain, service, service_data))
            .await
    }

    /// Invoke a prepared [`ServiceCall`].
    pub async fn execute(&self, call: ServiceCall) -> Result<Value, CoreError> {
        self.send_message(call.into_request()).await
    }

    /// Tear the connection down: cancel any reconnect timer, close the
    /// socket, reject in-flight requests and leave the registry. Resolves
    /// once the driver has finished.
    pub async fn disconnect(&self) {
        let (done, finished) = oneshot::channel();
        if self
            .inner
            .commands
            .send(DriverCommand::Disconnect { done })
            .is_ok()
        {
            let _ = finished.await;
        }
    }

    /// Wait until authenticated.
    ///
    /// Fails early when the hub rejects the token or the connection gives
    /// up, and with [`CoreError::Timeout`] after `timeout`.
    pub async fn wait_connected(&self, timeout: Duration) -> Result<(), CoreError> {
        let mut state = self.state_changes();
        let started = self.state() != ConnectionState::Disconnected;
        with_timeout(timeout, self.settle(&mut state, started)).await
    }

    /// `connect()` followed by waiting for authentication, bounded by the
    /// configured timeout.
    pub async fn connect_and_wait(&self) -> Result<(), CoreError> {
        let mut state = self.state_changes();
        let initial = *state.borrow_and_update();
        self.connect();
        let wait = async {
            if initial == ConnectionState::Disconnected {
                // The driver always leaves Disconnected after a connect.
                state
                    .changed()
                    .await
                    .map_err(|_| CoreError::ConnectionLost)?;
            }
            self.settle(&mut state, true).await
        };
        with_timeout(self.inner.timeout, wait).await
    }

    async fn settle(
        &self,
        state: &mut watch::Receiver<ConnectionState>,
        mut started: bool,
    ) -> Result<(), CoreError> {
        loop {
            let current = *state.borrow_and_update();
            match current {
                ConnectionState::Connected => return Ok(()),
                ConnectionState::Disconnected if started => return Err(self.failure()),
                ConnectionState::Disconnected => {}
                _ => started = true,
            }
            state
                .changed()
                .await
                .map_err(|_| CoreError::ConnectionLost)?;
        }
    }

    /// Why the connection is not connected, as a [`CoreError`].
    ///
    /// Meaningful once the state has settled in `Disconnected`.
    pub fn failure(&self) -> CoreError {
        let failure = self
            .inner
            .last_failure
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        match failure {
            Some(Failure::AuthRejected(message)) => CoreError::AuthenticationFailed {
                message: message.unwrap_or_else(|| "access token rejected".into()),
            },
            Some(Failure::Transport(reason)) => CoreError::ConnectionFailed {
                url: self.inner.url.to_string(),
                reason,
            },
            None => CoreError::ConnectionFailed {
                url: self.inner.url.to_string(),
                reason: "connection closed before authentication".into(),
            },
        }
    }

    // ── Typed RPC helpers ────────────────────────────────────────────

    /// Every entity's current state.
    pub async fn get_states(&self) -> Result<Vec<EntityState>, CoreError> {
        let value = self.send_message(Request::GetStates).await?;
        Ok(states_from_value(value))
    }

    pub async fn get_config(&self) -> Result<HubInfo, CoreError> {
        decode("get_config", self.send_message(Request::GetConfig).await?)
    }

    pub async fn get_services(&self) -> Result<ServiceCatalog, CoreError> {
        decode("get_services", self.send_message(Request::GetServices).await?)
    }

    pub async fn list_areas(&self) -> Result<Vec<Area>, CoreError> {
        let rows: Vec<hassdeck_api::models::AreaEntry> =
            decode("area registry", self.send_message(Request::AreaRegistryList).await?)?;
        Ok(rows.into_iter().map(Area::from).collect())
    }

    pub async fn list_devices(&self) -> Result<Vec<Device>, CoreError> {
        let rows: Vec<hassdeck_api::models::DeviceEntry> = decode(
            "device registry",
            self.send_message(Request::DeviceRegistryList).await?,
        )?;
        Ok(rows.into_iter().map(Device::from).collect())
    }

    pub async fn list_entities(&self) -> Result<Vec<RegistryEntity>, CoreError> {
        let rows: Vec<hassdeck_api::models::EntityEntry> = decode(
            "entity registry",
            self.send_message(Request::EntityRegistryList).await?,
        )?;
        Ok(rows.into_iter().map(RegistryEntity::from).collect())
    }

    /// Round-trip time of a `ping`.
    pub async fn ping(&self) -> Result<Duration, CoreError> {
        let started = Instant::now();
        self.send_message(Request::Ping).await?;
        Ok(started.elapsed())
    }
}

impl std::fmt::Debug for HubConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HubConnection")
            .field("id", &self.inner.id)
            .field("url", &self.inner.url.as_str())
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

async fn with_timeout<F>(timeout: Duration, future: F) -> Result<(), CoreError>
where
    F: Future<Output = Result<(), CoreError>>,
{
    tokio::time::timeout(timeout, future)
        .await
        .map_err(|_| CoreError::Timeout {
            timeout_secs: timeout.as_secs(),
        })?
}

fn decode<T: DeserializeOwned>(what: &str, value: Value) -> Result<T, CoreError> {
    serde_json::from_value(value)
        .map_err(|e| CoreError::Internal(format!("unexpected {what} payload: {e}")))
}

// ── Driver task ──────────────────────────────────────────────────────

type OpenFuture = Pin<Box<dyn Future<Output = Result<HubSocket, hassdeck_api::Error>> + Send>>;

struct Driver {
    id: u64,
    endpoint: Url,
    timeout: Duration,
    machine: HubMachine,
    pending: PendingRequests,
    observers: ObserverSet,
    state: watch::Sender<ConnectionState>,
    commands: mpsc::UnboundedReceiver<DriverCommand>,
    lifecycle: watch::Receiver<AppLifecycle>,
    lifecycle_open: bool,
    registry: Arc<ConnectionRegistry>,
    last_failure: SharedFailure,
    writer: Option<SocketWriter>,
    reader: Option<SocketReader>,
    opening: Option<OpenFuture>,
    reconnect_at: Option<Instant>,
}

impl Driver {
    async fn run(mut self) {
        tracing::debug!(connection = self.id, endpoint = %self.endpoint, "connection driver started");
        loop {
            let input = tokio::select! {
                command = self.commands.recv() => match command {
                    Some(DriverCommand::Connect) => Input::Connect,
                    Some(DriverCommand::Send { request, reply }) => {
                        self.send(request, reply).await;
                        continue;
                    }
                    Some(DriverCommand::Disconnect { done }) => {
                        self.apply(Input::Disconnect).await;
                        self.registry.deregister(self.id);
                        let _ = done.send(());
                        break;
                    }
                    None => {
                        // every handle is gone
                        self.apply(Input::Disconnect).await;
                        self.registry.deregister(self.id);
                        break;
                    }
                },
                opened = finish_open(&mut self.opening) => {
                    self.opening = None;
                    match opened {
                        Ok(socket) => {
                            let (writer, reader) = socket.split();
                            self.writer = Some(writer);
                            self.reader = Some(reader);
                            Input::SocketOpened
                        }
                        Err(e) => {
                            tracing::warn!(connection = self.id, error = %e, "hub connection failed");
                            self.record(Some(Failure::Transport(e.to_string())));
                            Input::SocketFailed
                        }
                    }
                },
                frame = next_frame(&mut self.reader) => match frame {
                    Some(Ok(text)) => match Inbound::parse(&text) {
                        Ok(frame) => Input::Frame(frame),
                        Err(e) => {
                            tracing::debug!(error = %e, "dropping unparseable frame");
                            continue;
                        }
                    },
                    Some(Err(e)) => {
                        tracing::warn!(connection = self.id, error = %e, "hub socket error");
                        self.record(Some(Failure::Transport(e.to_string())));
                        self.drop_socket();
                        Input::SocketClosed
                    }
                    None => {
                        tracing::info!(connection = self.id, "hub socket closed");
                        self.drop_socket();
                        Input::SocketClosed
                    }
                },
                () = sleep_until(self.reconnect_at) => {
                    self.reconnect_at = None;
                    Input::ReconnectTimerFired
                },
                () = sleep_until(self.pending.next_deadline()) => {
                    self.pending.expire(Instant::now());
                    continue;
                },
                changed = self.lifecycle.changed(), if self.lifecycle_open => {
                    if changed.is_err() {
                        self.lifecycle_open = false;
                        continue;
                    }
                    let lifecycle = *self.lifecycle.borrow_and_update();
                    Input::Lifecycle(lifecycle)
                },
            };
            self.apply(input).await;
        }
        tracing::debug!(connection = self.id, "connection driver stopped");
    }

    async fn apply(&mut self, input: Input) {
        let effects = self.machine.step(input);
        // Recorded before the state is published so waiters see the reason.
        for effect in &effects {
            if let Effect::Notify(HubEvent::AuthInvalid { message }) = effect {
                self.record(Some(Failure::AuthRejected(message.clone())));
            }
        }
        if self.machine.state().is_connected() {
            self.record(None);
        }
        self.publish_state();
        for effect in effects {
            self.perform(effect).await;
        }
    }

    fn publish_state(&self) {
        let next = self.machine.state();
        let changed = self.state.send_if_modified(|current| {
            if *current == next {
                false
            } else {
                *current = next;
                true
            }
        });
        if changed {
            tracing::debug!(connection = self.id, state = %next, "connection state changed");
        }
    }

    async fn perform(&mut self, effect: Effect) {
        match effect {
            Effect::OpenSocket => {
                let url = self.endpoint.clone();
                let timeout = self.timeout;
                self.opening = Some(Box::pin(async move { HubSocket::open(&url, timeout).await }));
            }
            Effect::Send(outbound) => {
                let text = match outbound.to_json() {
                    Ok(text) => text,
                    Err(e) => {
                        tracing::warn!(error = %e, "failed to serialize outbound frame");
                        return;
                    }
                };
                if let Some(writer) = self.writer.as_mut() {
                    if let Err(e) = writer.send_text(text).await {
                        tracing::warn!(connection = self.id, error = %e, "failed to send frame");
                    }
                }
            }
            Effect::CloseSocket => self.close_socket().await,
            Effect::ScheduleReconnect(delay) => self.reconnect_at = Some(Instant::now() + delay),
            Effect::CancelReconnect => self.reconnect_at = None,
            Effect::Notify(event) => self.observers.notify(&event),
            Effect::Resolve { id, outcome } => {
                self.pending.resolve(id, outcome);
            }
            Effect::RejectPending => {
                self.pending.reject_all();
            }
        }
    }

    async fn send(&mut self, request: Request, reply: oneshot::Sender<Outcome>) {
        let kind = request.kind();
        let outbound = match self.machine.prepare(request) {
            Ok(outbound) => outbound,
            Err(e) => {
                let _ = reply.send(Err(e));
                return;
            }
        };
        let (Some(id), Some(writer)) = (outbound.id(), self.writer.as_mut()) else {
            let _ = reply.send(Err(CoreError::NotConnected));
            return;
        };
        let text = match outbound.to_json() {
            Ok(text) => text,
            Err(e) => {
                let _ = reply.send(Err(CoreError::Internal(format!(
                    "failed to serialize {kind}: {e}"
                ))));
                return;
            }
        };
        tracing::debug!(connection = self.id, id, kind, "sending request");
        self.pending.insert(id, self.timeout, reply);
        if let Err(e) = writer.send_text(text).await {
            tracing::warn!(connection = self.id, id, error = %e, "failed to send request");
            self.pending.resolve(id, Err(CoreError::ConnectionLost));
        }
    }

    async fn close_socket(&mut self) {
        self.opening = None;
        self.reader = None;
        if let Some(writer) = self.writer.take() {
            if tokio::time::timeout(self.timeout, writer.close()).await.is_err() {
                tracing::debug!(connection = self.id, "timed out closing socket");
            }
        }
    }

    fn drop_socket(&mut self) {
        self.reader = None;
        self.writer = None;
    }

    fn record(&self, failure: Option<Failure>) {
        *self.last_failure.lock().unwrap_or_else(PoisonError::into_inner) = failure;
    }
}

async fn finish_open(opening: &mut Option<OpenFuture>) -> Result<HubSocket, hassdeck_api::Error> {
    match opening {
        Some(future) => future.await,
        None => std::future::pending().await,
    }
}

async fn next_frame(reader: &mut Option<SocketReader>) -> Option<Result<String, hassdeck_api::Error>> {
    match reader {
        Some(reader) => reader.next_text().await,
        None => std::future::pending().await,
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
