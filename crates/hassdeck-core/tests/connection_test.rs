#![allow(clippy::unwrap_used)]
// Integration tests for `HubConnection` against a local WebSocket hub.
//
// The fake hub speaks just enough of the realtime protocol: handshake,
// `subscribe_events`, `get_states`, `get_config`, `call_service` and `ping`.
// `get_services` is deliberately never answered.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use secrecy::SecretString;
use serde_json::{Value, json};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc};
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::Message;
use url::Url;

use tokio_util::sync::CancellationToken;

use hassdeck_core::{
    AppLifecycle, ConnectionRegistry, ConnectionState, CoreError, EntityId, EntityStore,
    HubConfig, HubConnection, HubEvent, LifecycleWatcher, ReconnectPolicy, Request, ServiceCall,
    spawn_store_bridge,
};

// ── Fake hub ────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
enum Control {
    Event(Value),
    CloseAll,
}

struct FakeHub {
    url: Url,
    frames: Arc<Mutex<Vec<Value>>>,
    accepted: Arc<AtomicUsize>,
    open: Arc<AtomicUsize>,
    control: broadcast::Sender<Control>,
}

impl FakeHub {
    async fn start(token: &str) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (control, _) = broadcast::channel(16);

        let hub = Self {
            url: Url::parse(&format!("http://{addr}")).unwrap(),
            frames: Arc::default(),
            accepted: Arc::default(),
            open: Arc::default(),
            control,
        };

        let token = token.to_owned();
        let frames = Arc::clone(&hub.frames);
        let accepted = Arc::clone(&hub.accepted);
        let open = Arc::clone(&hub.open);
        let control = hub.control.clone();
        tokio::spawn(async move {
            while let Ok((tcp, _)) = listener.accept().await {
                accepted.fetch_add(1, Ordering::SeqCst);
                tokio::spawn(serve(
                    tcp,
                    token.clone(),
                    Arc::clone(&frames),
                    Arc::clone(&open),
                    control.subscribe(),
                ));
            }
        });
        hub
    }

    fn frames(&self) -> Vec<Value> {
        self.frames.lock().unwrap().clone()
    }

    fn frames_of_type(&self, kind: &str) -> Vec<Value> {
        self.frames()
            .into_iter()
            .filter(|f| f["type"] == kind)
            .collect()
    }

    fn accepted(&self) -> usize {
        self.accepted.load(Ordering::SeqCst)
    }

    fn open(&self) -> usize {
        self.open.load(Ordering::SeqCst)
    }

    fn push_state(&self, entity_id: &str, state: &str) {
        let _ = self.control.send(Control::Event(json!({
            "entity_id": entity_id,
            "old_state": null,
            "new_state": { "entity_id": entity_id, "state": state, "attributes": {} }
        })));
    }

    fn drop_connections(&self) {
        let _ = self.control.send(Control::CloseAll);
    }
}

async fn send(ws: &mut WebSocketStream<TcpStream>, frame: Value) {
    let _ = ws.send(Message::text(frame.to_string())).await;
}

async fn serve(
    tcp: TcpStream,
    token: String,
    frames: Arc<Mutex<Vec<Value>>>,
    open: Arc<AtomicUsize>,
    mut control: broadcast::Receiver<Control>,
) {
    let Ok(mut ws) = tokio_tungstenite::accept_async(tcp).await else {
        return;
    };
    open.fetch_add(1, Ordering::SeqCst);
    send(&mut ws, json!({ "type": "auth_required", "ha_version": "2026.10.0" })).await;

    loop {
        tokio::select! {
            message = ws.next() => {
                let Some(Ok(Message::Text(text))) = message else { break };
                let frame: Value = serde_json::from_str(text.as_str()).unwrap();
                frames.lock().unwrap().push(frame.clone());
                let id = frame["id"].clone();
                match frame["type"].as_str().unwrap_or_default() {
                    "auth" if frame["access_token"] == token.as_str() => {
                        send(&mut ws, json!({ "type": "auth_ok", "ha_version": "2026.10.0" })).await;
                    }
                    "auth" => {
                        send(&mut ws, json!({ "type": "auth_invalid", "message": "Invalid access token" })).await;
                        let _ = ws.close(None).await;
                        break;
                    }
                    "subscribe_events" => {
                        send(&mut ws, json!({ "id": id, "type": "result", "success": true, "result": null })).await;
                    }
                    "get_states" => {
                        send(&mut ws, json!({
                            "id": id, "type": "result", "success": true,
                            "result": [
                                { "entity_id": "light.kitchen", "state": "off", "attributes": { "friendly_name": "Kitchen" } },
                                { "entity_id": "sensor.outdoor", "state": "12.5", "attributes": {} }
                            ]
                        })).await;
                    }
                    "get_config" => {
                        send(&mut ws, json!({
                            "id": id, "type": "result", "success": true,
                            "result": { "location_name": "Home", "version": "2026.10.0", "time_zone": "Europe/Oslo" }
                        })).await;
                    }
                    "call_service" if frame["domain"] == "light" => {
                        send(&mut ws, json!({
                            "id": id, "type": "result", "success": true,
                            "result": { "context": { "id": "ctx-1" } }
                        })).await;
                    }
                    "call_service" => {
                        send(&mut ws, json!({
                            "id": id, "type": "result", "success": false,
                            "error": { "code": "not_found", "message": "Service not found." }
                        })).await;
                    }
                    "ping" => send(&mut ws, json!({ "id": id, "type": "pong" })).await,
                    _ => {}
                }
            }
            ctrl = control.recv() => match ctrl {
                Ok(Control::Event(data)) => {
                    send(&mut ws, json!({
                        "id": 1,
                        "type": "event",
                        "event": {
                            "event_type": "state_changed",
                            "data": data,
                            "origin": "LOCAL",
                            "time_fired": "2026-10-18T12:00:00+00:00"
                        }
                    })).await;
                }
                Ok(Control::CloseAll) | Err(_) => {
                    let _ = ws.close(None).await;
                    break;
                }
            }
        }
    }
    open.fetch_sub(1, Ordering::SeqCst);
}

// ── Helpers ─────────────────────────────────────────────────────────

const TOKEN: &str = "long-lived-token";

fn config(hub: &FakeHub, token: &str) -> HubConfig {
    let mut config = HubConfig::new(hub.url.clone(), SecretString::from(token.to_owned()));
    config.timeout = Duration::from_secs(2);
    config.reconnect = ReconnectPolicy {
        initial_delay: Duration::from_millis(50),
        max_delay: Duration::from_millis(200),
        max_attempts: 5,
    };
    config
}

fn connection(hub: &FakeHub, registry: &Arc<ConnectionRegistry>) -> HubConnection {
    HubConnection::with_registry(
        config(hub, TOKEN),
        &LifecycleWatcher::default(),
        Arc::clone(registry),
    )
    .unwrap()
}

async fn eventually(what: &str, check: impl Fn() -> bool) {
    for _ in 0..150 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("timed out waiting for {what}");
}

fn counter(conn: &HubConnection, kind: &'static str) -> (Arc<AtomicUsize>, hassdeck_core::Subscription) {
    let count = Arc::new(AtomicUsize::new(0));
    let seen = Arc::clone(&count);
    let sub = conn.subscribe(move |event| {
        if event.kind() == kind {
            seen.fetch_add(1, Ordering::SeqCst);
        }
    });
    (count, sub)
}

// ── Handshake ───────────────────────────────────────────────────────

#[tokio::test]
async fn handshake_sends_one_auth_then_subscribes() {
    let hub = FakeHub::start(TOKEN).await;
    let registry = ConnectionRegistry::new();
    let conn = connection(&hub, &registry);
    let (connected, _sub) = counter(&conn, "connected");

    conn.connect_and_wait().await.unwrap();
    assert_eq!(conn.state(), ConnectionState::Connected);
    eventually("subscribe frame", || hub.frames().len() >= 2).await;

    let frames = hub.frames();
    assert_eq!(frames[0], json!({ "type": "auth", "access_token": TOKEN }));
    assert_eq!(
        frames[1],
        json!({ "id": 1, "type": "subscribe_events", "event_type": "state_changed" })
    );
    assert_eq!(hub.frames_of_type("auth").len(), 1);
    assert_eq!(hub.frames_of_type("subscribe_events").len(), 1);
    assert_eq!(connected.load(Ordering::SeqCst), 1);

    // connect() on a live connection does nothing.
    conn.connect();
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(hub.accepted(), 1);

    conn.disconnect().await;
}

#[tokio::test]
async fn invalid_token_is_not_retried() {
    let hub = FakeHub::start(TOKEN).await;
    let registry = ConnectionRegistry::new();
    let conn = HubConnection::with_registry(
        config(&hub, "wrong-token"),
        &LifecycleWatcher::default(),
        Arc::clone(&registry),
    )
    .unwrap();
    let (rejected, _sub) = counter(&conn, "auth_invalid");

    let err = conn.connect_and_wait().await.unwrap_err();
    assert!(
        matches!(err, CoreError::AuthenticationFailed { ref message } if message.contains("Invalid access token")),
        "unexpected error: {err:?}"
    );
    eventually("auth_invalid event", || rejected.load(Ordering::SeqCst) == 1).await;

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(hub.accepted(), 1);
    assert_eq!(conn.state(), ConnectionState::Disconnected);
    conn.disconnect().await;
}

// ── Requests ────────────────────────────────────────────────────────

#[tokio::test]
async fn send_without_socket_fails_immediately() {
    let hub = FakeHub::start(TOKEN).await;
    let registry = ConnectionRegistry::new();
    let conn = connection(&hub, &registry);

    let err = conn.send_message(Request::GetStates).await.unwrap_err();
    assert!(matches!(err, CoreError::NotConnected));
    assert_eq!(hub.accepted(), 0);
    conn.disconnect().await;
}

#[tokio::test]
async fn rpc_helpers_round_trip() {
    let hub = FakeHub::start(TOKEN).await;
    let registry = ConnectionRegistry::new();
    let conn = connection(&hub, &registry);
    conn.connect_and_wait().await.unwrap();

    let states = conn.get_states().await.unwrap();
    assert_eq!(states.len(), 2);
    assert_eq!(states[0].display_name(), "Kitchen");

    let info = conn.get_config().await.unwrap();
    assert_eq!(info.location_name, "Home");

    let result = conn
        .call_service("light", "turn_on", Some(json!({ "entity_id": "light.kitchen" })))
        .await
        .unwrap();
    assert_eq!(result["context"]["id"], "ctx-1");

    let err = conn.call_service("rocket", "launch", None).await.unwrap_err();
    assert!(matches!(err, CoreError::Rejected { ref code, .. } if code == "not_found"));

    conn.ping().await.unwrap();

    // Ids after the subscription are consecutive on this socket.
    let ids: Vec<u64> = hub
        .frames()
        .iter()
        .filter_map(|f| f["id"].as_u64())
        .collect();
    assert_eq!(ids, vec![1, 2, 3, 4, 5, 6]);

    let call = &hub.frames_of_type("call_service")[0];
    assert_eq!(call["service_data"], json!({ "entity_id": "light.kitchen" }));
    conn.disconnect().await;
}

#[tokio::test]
async fn unanswered_request_times_out() {
    let hub = FakeHub::start(TOKEN).await;
    let registry = ConnectionRegistry::new();
    let mut cfg = config(&hub, TOKEN);
    cfg.timeout = Duration::from_millis(300);
    let conn =
        HubConnection::with_registry(cfg, &LifecycleWatcher::default(), Arc::clone(&registry))
            .unwrap();
    conn.connect_and_wait().await.unwrap();

    let err = conn.get_services().await.unwrap_err();
    assert!(matches!(err, CoreError::RequestTimeout { .. }), "got {err:?}");
    // The connection itself is unaffected.
    assert_eq!(conn.state(), ConnectionState::Connected);
    conn.disconnect().await;
}

#[tokio::test]
async fn in_flight_requests_fail_when_socket_drops() {
    let hub = FakeHub::start(TOKEN).await;
    let registry = ConnectionRegistry::new();
    let conn = connection(&hub, &registry);
    conn.connect_and_wait().await.unwrap();

    let waiting = {
        let conn = conn.clone();
        tokio::spawn(async move { conn.get_services().await })
    };
    eventually("get_services frame", || {
        !hub.frames_of_type("get_services").is_empty()
    })
    .await;
    hub.drop_connections();

    let err = waiting.await.unwrap().unwrap_err();
    assert!(matches!(err, CoreError::ConnectionLost), "got {err:?}");
    conn.disconnect().await;
}

// ── Events ──────────────────────────────────────────────────────────

#[tokio::test]
async fn state_changes_reach_every_observer() {
    let hub = FakeHub::start(TOKEN).await;
    let registry = ConnectionRegistry::new();
    let conn = connection(&hub, &registry);

    let (tx, mut rx) = mpsc::unbounded_channel();
    let tx_a = tx.clone();
    let _a = conn.subscribe(move |event| {
        if let HubEvent::StateChanged(change) = event {
            let _ = tx_a.send(("a", change.entity_id.to_string(), change.data.clone()));
        }
    });
    let _b = conn.subscribe(move |event| {
        if let HubEvent::StateChanged(change) = event {
            let _ = tx.send(("b", change.entity_id.to_string(), change.data.clone()));
        }
    });

    conn.connect_and_wait().await.unwrap();
    hub.push_state("light.kitchen", "on");

    let mut seen = Vec::new();
    for _ in 0..2 {
        let (who, entity, data) = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(entity, "light.kitchen");
        assert_eq!(data["new_state"]["state"], "on");
        seen.push(who);
    }
    seen.sort_unstable();
    assert_eq!(seen, vec!["a", "b"]);
    conn.disconnect().await;
}

#[tokio::test]
async fn unsubscribed_observer_stops_receiving() {
    let hub = FakeHub::start(TOKEN).await;
    let registry = ConnectionRegistry::new();
    let conn = connection(&hub, &registry);
    let (changes, sub) = counter(&conn, "state_changed");
    let (kept, _kept_sub) = counter(&conn, "state_changed");

    conn.connect_and_wait().await.unwrap();
    hub.push_state("switch.fan", "on");
    eventually("first event", || kept.load(Ordering::SeqCst) == 1).await;

    sub.unsubscribe();
    hub.push_state("switch.fan", "off");
    eventually("second event", || kept.load(Ordering::SeqCst) == 2).await;
    assert_eq!(changes.load(Ordering::SeqCst), 1);
    conn.disconnect().await;
}

// ── Reconnection and lifecycle ──────────────────────────────────────

#[tokio::test]
async fn reconnects_after_unexpected_close() {
    let hub = FakeHub::start(TOKEN).await;
    let registry = ConnectionRegistry::new();
    let conn = connection(&hub, &registry);
    let (connected, _c) = counter(&conn, "connected");
    let (disconnected, _d) = counter(&conn, "disconnected");

    conn.connect_and_wait().await.unwrap();
    hub.drop_connections();

    eventually("second connection", || connected.load(Ordering::SeqCst) == 2).await;
    assert_eq!(disconnected.load(Ordering::SeqCst), 1);
    assert_eq!(hub.accepted(), 2);
    // Fresh socket: one more auth and one more subscription.
    assert_eq!(hub.frames_of_type("auth").len(), 2);
    assert_eq!(hub.frames_of_type("subscribe_events").len(), 2);
    conn.disconnect().await;
}

#[tokio::test]
async fn backgrounded_connection_waits_for_foreground() {
    let hub = FakeHub::start(TOKEN).await;
    let registry = ConnectionRegistry::new();
    let lifecycle = LifecycleWatcher::new(AppLifecycle::Background);
    let conn =
        HubConnection::with_registry(config(&hub, TOKEN), &lifecycle, Arc::clone(&registry))
            .unwrap();

    conn.connect();
    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(hub.accepted(), 0);
    assert_eq!(conn.state(), ConnectionState::Backgrounded);

    lifecycle.set(AppLifecycle::Foreground);
    conn.wait_connected(Duration::from_secs(2)).await.unwrap();
    assert_eq!(hub.accepted(), 1);
    conn.disconnect().await;
}

#[tokio::test]
async fn close_while_backgrounded_waits_for_foreground() {
    let hub = FakeHub::start(TOKEN).await;
    let registry = ConnectionRegistry::new();
    let lifecycle = LifecycleWatcher::default();
    let conn =
        HubConnection::with_registry(config(&hub, TOKEN), &lifecycle, Arc::clone(&registry))
            .unwrap();
    conn.connect_and_wait().await.unwrap();

    lifecycle.set(AppLifecycle::Background);
    tokio::time::sleep(Duration::from_millis(50)).await;
    hub.drop_connections();
    eventually("backgrounded", || conn.state() == ConnectionState::Backgrounded).await;
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(hub.accepted(), 1);

    lifecycle.set(AppLifecycle::Foreground);
    conn.wait_connected(Duration::from_secs(2)).await.unwrap();
    assert_eq!(hub.accepted(), 2);
    conn.disconnect().await;
}

// ── Entity store ────────────────────────────────────────────────────

fn state_of(store: &EntityStore, entity_id: &str) -> Option<(String, bool)> {
    store
        .get(&EntityId::from(entity_id))
        .map(|s| (s.state.clone(), s.optimistic))
}

#[tokio::test]
async fn store_bridge_follows_connection() {
    let hub = FakeHub::start(TOKEN).await;
    let registry = ConnectionRegistry::new();
    let conn = connection(&hub, &registry);
    let store = Arc::new(EntityStore::new());
    let cancel = CancellationToken::new();
    let bridge = spawn_store_bridge(&conn, Arc::clone(&store), cancel.clone());

    conn.connect_and_wait().await.unwrap();
    eventually("initial snapshot", || store.len() == 2).await;
    assert_eq!(state_of(&store, "light.kitchen"), Some(("off".into(), false)));

    hub.push_state("light.kitchen", "on");
    eventually("change applied", || {
        state_of(&store, "light.kitchen").is_some_and(|(s, _)| s == "on")
    })
    .await;

    // New socket, new snapshot: the hub's list still says "off".
    hub.drop_connections();
    eventually("second get_states", || {
        hub.frames_of_type("get_states").len() == 2
    })
    .await;
    eventually("snapshot reapplied", || {
        state_of(&store, "light.kitchen").is_some_and(|(s, _)| s == "off")
    })
    .await;
    assert_eq!(store.len(), 2);

    cancel.cancel();
    bridge.await.unwrap();
    conn.disconnect().await;
}

#[tokio::test]
async fn optimistic_call_yields_to_hub_state() {
    let hub = FakeHub::start(TOKEN).await;
    let registry = ConnectionRegistry::new();
    let conn = connection(&hub, &registry);
    let store = Arc::new(EntityStore::new());
    let cancel = CancellationToken::new();
    let _bridge = spawn_store_bridge(&conn, Arc::clone(&store), cancel.clone());

    conn.connect_and_wait().await.unwrap();
    eventually("initial snapshot", || store.len() == 2).await;

    let kitchen: EntityId = "light.kitchen".into();
    let result = store
        .execute_optimistic(&conn, ServiceCall::turn_on(&kitchen))
        .await
        .unwrap();
    assert_eq!(result["context"]["id"], "ctx-1");
    assert_eq!(state_of(&store, "light.kitchen"), Some(("on".into(), true)));

    // The hub's event is authoritative, even when it disagrees.
    hub.push_state("light.kitchen", "off");
    eventually("authoritative state", || {
        state_of(&store, "light.kitchen").is_some_and(|(_, optimistic)| !optimistic)
    })
    .await;
    assert_eq!(state_of(&store, "light.kitchen"), Some(("off".into(), false)));

    cancel.cancel();
    conn.disconnect().await;
}

#[tokio::test]
async fn rejected_optimistic_call_restores_previous_state() {
    let hub = FakeHub::start(TOKEN).await;
    let registry = ConnectionRegistry::new();
    let conn = connection(&hub, &registry);
    let store = Arc::new(EntityStore::new());
    let cancel = CancellationToken::new();
    let _bridge = spawn_store_bridge(&conn, Arc::clone(&store), cancel.clone());

    conn.connect_and_wait().await.unwrap();
    eventually("initial snapshot", || store.len() == 2).await;

    // The hub only accepts light services.
    let err = store
        .execute_optimistic(&conn, ServiceCall::turn_on(&"sensor.outdoor".into()))
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::Rejected { ref code, .. } if code == "not_found"));
    assert_eq!(state_of(&store, "sensor.outdoor"), Some(("12.5".into(), false)));

    cancel.cancel();
    conn.disconnect().await;
}

// ── Teardown ────────────────────────────────────────────────────────

#[tokio::test]
async fn disconnect_all_closes_every_connection() {
    let hub = FakeHub::start(TOKEN).await;
    let registry = ConnectionRegistry::new();
    let conns: Vec<HubConnection> = (0..3).map(|_| connection(&hub, &registry)).collect();
    for conn in &conns {
        conn.connect_and_wait().await.unwrap();
    }
    assert_eq!(registry.len(), 3);
    eventually("three open sockets", || hub.open() == 3).await;

    assert_eq!(registry.disconnect_all().await, 3);
    assert!(registry.is_empty());
    for conn in &conns {
        assert_eq!(conn.state(), ConnectionState::Disconnected);
    }
    eventually("sockets closed", || hub.open() == 0).await;

    // Longer than the reconnect delay: nobody comes back.
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(hub.accepted(), 3);
    assert!(matches!(
        conns[0].send_message(Request::Ping).await,
        Err(CoreError::NotConnected)
    ));
}

#[tokio::test]
async fn disconnect_deregisters_and_is_idempotent() {
    let hub = FakeHub::start(TOKEN).await;
    let registry = ConnectionRegistry::new();
    let conn = connection(&hub, &registry);
    assert_eq!(registry.len(), 1);

    conn.connect_and_wait().await.unwrap();
    conn.disconnect().await;
    assert!(registry.is_empty());

    // A finished connection ignores further calls.
    conn.disconnect().await;
    conn.connect();
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(hub.accepted(), 1);
}
