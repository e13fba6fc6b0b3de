//! Integration tests for the `hassdeck` binary.
//!
//! Argument parsing, help output, completions, profile management against a
//! temporary config directory, and a few hub commands against a local
//! WebSocket hub running on a background thread.
#![allow(clippy::unwrap_used)]

use std::net::SocketAddr;
use std::path::Path;

use assert_cmd::cargo::cargo_bin_cmd;
use futures_util::{SinkExt, StreamExt};
use predicates::prelude::*;
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite::Message;

// ── Helpers ─────────────────────────────────────────────────────────

/// Build a [`Command`] for the `hassdeck` binary with env isolation.
///
/// Clears all `HASSDECK_*` env vars and points config directories at a
/// nonexistent path so tests never touch the user's real configuration.
fn hassdeck_cmd() -> assert_cmd::Command {
    isolated_cmd(Path::new("/tmp/hassdeck-cli-test-nonexistent"))
}

fn isolated_cmd(home: &Path) -> assert_cmd::Command {
    let mut cmd = cargo_bin_cmd!("hassdeck");
    cmd.env("HOME", home)
        .env("XDG_CONFIG_HOME", home.join(".config"))
        .env_remove("HASSDECK_PROFILE")
        .env_remove("HASSDECK_HUB")
        .env_remove("HASSDECK_TOKEN")
        .env_remove("HASSDECK_OUTPUT")
        .env_remove("HASSDECK_INSECURE")
        .env_remove("HASSDECK_TIMEOUT")
        .env_remove("HASSDECK_ACTIVE_PROFILE")
        .env_remove("RUST_LOG");
    cmd
}

/// Concatenate stdout + stderr from a command output for flexible matching.
fn combined_output(output: &std::process::Output) -> String {
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    format!("{stdout}{stderr}")
}

/// Write `contents` where the binary looks for its config on Linux.
#[cfg(target_os = "linux")]
fn write_config(home: &Path, contents: &str) -> std::path::PathBuf {
    let dir = home.join(".config").join("hassdeck");
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join("config.toml");
    std::fs::write(&path, contents).unwrap();
    path
}

// ── Fake hub ────────────────────────────────────────────────────────

const TOKEN: &str = "good-token";

/// Start a hub on a background thread and return its base URL.
fn start_hub() -> String {
    let (addr_tx, addr_rx) = std::sync::mpsc::channel::<SocketAddr>();
    std::thread::spawn(move || {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        runtime.block_on(async move {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            addr_tx.send(listener.local_addr().unwrap()).unwrap();
            while let Ok((tcp, _)) = listener.accept().await {
                tokio::spawn(serve(tcp));
            }
        });
    });
    let addr = addr_rx.recv().unwrap();
    format!("http://{addr}")
}

fn result(id: &Value, payload: Value) -> Value {
    json!({ "id": id, "type": "result", "success": true, "result": payload })
}

async fn serve(tcp: tokio::net::TcpStream) {
    let Ok(mut ws) = tokio_tungstenite::accept_async(tcp).await else {
        return;
    };
    let hello = json!({ "type": "auth_required", "ha_version": "2026.10.0" });
    let _ = ws.send(Message::text(hello.to_string())).await;

    while let Some(Ok(Message::Text(text))) = ws.next().await {
        let frame: Value = serde_json::from_str(text.as_str()).unwrap();
        let id = frame["id"].clone();
        let reply = match frame["type"].as_str().unwrap_or_default() {
            "auth" if frame["access_token"] == TOKEN => {
                json!({ "type": "auth_ok", "ha_version": "2026.10.0" })
            }
            "auth" => {
                let invalid = json!({ "type": "auth_invalid", "message": "Invalid access token" });
                let _ = ws.send(Message::text(invalid.to_string())).await;
                let _ = ws.close(None).await;
                return;
            }
            "subscribe_events" => result(&id, Value::Null),
            "get_states" => result(
                &id,
                json!([
                    {
                        "entity_id": "switch.kettle",
                        "state": "off",
                        "attributes": { "friendly_name": "Kettle" },
                        "last_changed": "2026-10-18T07:00:00+00:00",
                        "last_updated": "2026-10-18T07:00:00+00:00"
                    },
                    {
                        "entity_id": "light.porch",
                        "state": "on",
                        "attributes": { "friendly_name": "Porch" },
                        "last_changed": "2026-10-18T06:30:00+00:00",
                        "last_updated": "2026-10-18T06:30:00+00:00"
                    }
                ]),
            ),
            "get_config" => result(
                &id,
                json!({
                    "location_name": "Test Home",
                    "version": "2026.10.0",
                    "time_zone": "Europe/Berlin",
                    "components": ["light", "switch"]
                }),
            ),
            "call_service" if frame["domain"] == "light" => {
                result(&id, json!({ "context": { "id": "ctx1" } }))
            }
            "call_service" => json!({
                "id": id,
                "type": "result",
                "success": false,
                "error": { "code": "not_found", "message": "Service not found." }
            }),
            "ping" => json!({ "id": id, "type": "pong" }),
            other => json!({
                "id": id,
                "type": "result",
                "success": false,
                "error": { "code": "unknown_command", "message": other }
            }),
        };
        if ws.send(Message::text(reply.to_string())).await.is_err() {
            return;
        }
    }
}

// ── Basic invocation ────────────────────────────────────────────────

#[test]
fn test_no_args_shows_help() {
    let output = hassdeck_cmd().output().unwrap();
    assert_eq!(output.status.code(), Some(2), "Expected exit code 2");
    let text = combined_output(&output);
    assert!(text.contains("Usage"), "Expected 'Usage' in output:\n{text}");
}

#[test]
fn test_help_flag() {
    hassdeck_cmd().arg("--help").assert().success().stdout(
        predicate::str::contains("Home Assistant")
            .and(predicate::str::contains("states"))
            .and(predicate::str::contains("call"))
            .and(predicate::str::contains("watch")),
    );
}

#[test]
fn test_version_flag() {
    hassdeck_cmd()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("hassdeck"));
}

// ── Shell completions ───────────────────────────────────────────────

#[test]
fn test_completions_bash() {
    hassdeck_cmd()
        .args(["completions", "bash"])
        .assert()
        .success()
        .stdout(predicate::str::is_empty().not());
}

#[test]
fn test_completions_zsh() {
    hassdeck_cmd()
        .args(["completions", "zsh"])
        .assert()
        .success()
        .stdout(predicate::str::contains("#compdef"));
}

// ── Error cases ─────────────────────────────────────────────────────

#[test]
fn test_invalid_subcommand() {
    let output = hassdeck_cmd().arg("foobar").output().unwrap();
    assert!(!output.status.success());
    let text = combined_output(&output);
    assert!(
        text.contains("unrecognized") || text.contains("foobar"),
        "Expected error mentioning invalid subcommand:\n{text}"
    );
}

#[test]
fn test_states_without_config_points_at_init() {
    hassdeck_cmd()
        .arg("states")
        .assert()
        .failure()
        .stderr(predicate::str::contains("config init"));
}

#[test]
fn test_hub_without_token_is_an_auth_error() {
    hassdeck_cmd()
        .args(["--hub", "http://127.0.0.1:9", "states"])
        .assert()
        .code(3)
        .stderr(predicate::str::contains("token"));
}

#[test]
fn test_invalid_output_format() {
    let output = hassdeck_cmd()
        .args(["--output", "invalid", "states"])
        .output()
        .unwrap();
    assert!(!output.status.success());
    let text = combined_output(&output);
    assert!(
        text.contains("invalid") || text.contains("possible values"),
        "Expected error about valid output formats:\n{text}"
    );
}

#[test]
fn test_unreachable_hub_is_a_connection_error() {
    // Port 9 (discard) is closed on loopback; retries are cut short by the
    // timeout.
    let output = hassdeck_cmd()
        .args([
            "--hub",
            "http://127.0.0.1:9",
            "--token",
            TOKEN,
            "--timeout",
            "1",
            "states",
        ])
        .output()
        .unwrap();
    let code = output.status.code();
    assert!(
        code == Some(7) || code == Some(8),
        "Expected connection or timeout exit code, got {code:?}:\n{}",
        combined_output(&output)
    );
}

// ── Subcommand help discovery ───────────────────────────────────────

#[test]
fn test_config_subcommands_exist() {
    hassdeck_cmd()
        .args(["config", "--help"])
        .assert()
        .success()
        .stdout(
            predicate::str::contains("init")
                .and(predicate::str::contains("list"))
                .and(predicate::str::contains("use"))
                .and(predicate::str::contains("remove"))
                .and(predicate::str::contains("set-token")),
        );
}

#[test]
fn test_config_show_no_config() {
    hassdeck_cmd().args(["config", "show"]).assert().success();
}

// ── Profiles ────────────────────────────────────────────────────────

#[cfg(target_os = "linux")]
#[test]
fn test_config_list_marks_active_profile() {
    let home = tempfile::tempdir().unwrap();
    write_config(
        home.path(),
        r#"
active_profile = "cabin"

[profiles.home]
name = "Home"
hub_url = "http://homeassistant.local:8123"

[profiles.cabin]
name = "Cabin"
hub_url = "https://cabin.example.com"
"#,
    );

    let output = isolated_cmd(home.path())
        .args(["config", "list", "--output", "json"])
        .output()
        .unwrap();
    assert!(output.status.success(), "{}", combined_output(&output));
    let profiles: Vec<Value> = serde_json::from_slice(&output.stdout).unwrap();
    let active: Vec<_> = profiles
        .iter()
        .filter(|p| p["active"] == true)
        .map(|p| p["id"].as_str().unwrap())
        .collect();
    assert_eq!(active, ["cabin"]);
}

#[cfg(target_os = "linux")]
#[test]
fn test_config_use_switches_and_persists() {
    let home = tempfile::tempdir().unwrap();
    let path = write_config(
        home.path(),
        r#"
active_profile = "home"

[profiles.home]
name = "Home"
hub_url = "http://homeassistant.local:8123"

[profiles.cabin]
name = "Cabin"
hub_url = "https://cabin.example.com"
"#,
    );

    isolated_cmd(home.path())
        .args(["config", "use", "cabin"])
        .assert()
        .success();
    let written: toml::Table = std::fs::read_to_string(&path).unwrap().parse().unwrap();
    assert_eq!(written["active_profile"].as_str(), Some("cabin"));

    isolated_cmd(home.path())
        .args(["config", "use", "office"])
        .assert()
        .code(4)
        .stderr(predicate::str::contains("cabin, home"));
}

#[cfg(target_os = "linux")]
#[test]
fn test_legacy_keys_migrate_on_first_run() {
    let home = tempfile::tempdir().unwrap();
    let path = write_config(
        home.path(),
        r#"
hub_url = "http://192.168.1.20:8123"
token = "legacy-token"
"#,
    );

    isolated_cmd(home.path())
        .args(["config", "list", "--output", "plain"])
        .assert()
        .success()
        .stdout(predicate::str::contains("default"));

    let written: toml::Table = std::fs::read_to_string(&path).unwrap().parse().unwrap();
    assert!(!written.contains_key("hub_url"));
    assert_eq!(written["active_profile"].as_str(), Some("default"));
}

#[cfg(target_os = "linux")]
#[test]
fn test_remove_requires_confirmation_when_not_interactive() {
    let home = tempfile::tempdir().unwrap();
    write_config(
        home.path(),
        r#"
[profiles.home]
name = "Home"
hub_url = "http://homeassistant.local:8123"
"#,
    );

    isolated_cmd(home.path())
        .args(["config", "remove", "home"])
        .write_stdin("")
        .assert()
        .code(2);
}

// ── Against a hub ───────────────────────────────────────────────────

#[test]
fn test_states_json_from_hub() {
    let hub = start_hub();
    let output = hassdeck_cmd()
        .args(["--hub", &hub, "--token", TOKEN, "-o", "json", "states"])
        .output()
        .unwrap();
    assert!(output.status.success(), "{}", combined_output(&output));

    let states: Vec<Value> = serde_json::from_slice(&output.stdout).unwrap();
    let ids: Vec<_> = states
        .iter()
        .map(|s| s["entity_id"].as_str().unwrap())
        .collect();
    assert_eq!(ids, ["light.porch", "switch.kettle"]);
}

#[test]
fn test_states_plain_filtered_by_domain() {
    let hub = start_hub();
    hassdeck_cmd()
        .args([
            "--hub", &hub, "--token", TOKEN, "-o", "plain", "states", "--domain", "switch",
        ])
        .assert()
        .success()
        .stdout(predicate::str::diff("switch.kettle\n"));
}

#[test]
fn test_state_of_unknown_entity_is_not_found() {
    let hub = start_hub();
    hassdeck_cmd()
        .args(["--hub", &hub, "--token", TOKEN, "state", "light.attic"])
        .assert()
        .code(4)
        .stderr(predicate::str::contains("light.attic"));
}

#[test]
fn test_rejected_token_exits_with_auth_code() {
    let hub = start_hub();
    hassdeck_cmd()
        .args(["--hub", &hub, "--token", "wrong", "states"])
        .assert()
        .code(3)
        .stderr(predicate::str::contains("Authentication failed"));
}

#[test]
fn test_call_service() {
    let hub = start_hub();
    hassdeck_cmd()
        .args([
            "--hub", &hub, "--token", TOKEN, "call", "light", "turn_on", "-e", "light.porch",
            "--data", r#"{"brightness": 200}"#,
        ])
        .assert()
        .success()
        .stderr(predicate::str::contains("Called light.turn_on (light.porch → on)"));

    hassdeck_cmd()
        .args(["--hub", &hub, "--token", TOKEN, "call", "switch", "explode"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("not_found"));
}

#[cfg(target_os = "linux")]
#[test]
fn test_broken_admin_tls_only_affects_admin_commands() {
    let hub = start_hub();
    let home = tempfile::tempdir().unwrap();
    write_config(
        home.path(),
        &format!(
            r#"
[profiles.home]
name = "Home"
hub_url = "{hub}"
admin_url = "http://127.0.0.1:9"
ca_cert = "/nonexistent/hassdeck-ca.pem"
"#
        ),
    );

    isolated_cmd(home.path())
        .args(["--token", TOKEN, "-o", "plain", "states", "--domain", "light"])
        .assert()
        .success()
        .stdout(predicate::str::diff("light.porch\n"));

    isolated_cmd(home.path())
        .args(["--token", TOKEN, "admin", "stats"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("TLS error"));
}

#[test]
fn test_call_rejects_non_object_data() {
    let hub = start_hub();
    hassdeck_cmd()
        .args([
            "--hub", &hub, "--token", TOKEN, "call", "light", "turn_on", "--data", "[1]",
        ])
        .assert()
        .code(2);
}

#[test]
fn test_info_plain_prints_version() {
    let hub = start_hub();
    hassdeck_cmd()
        .args(["--hub", &hub, "--token", TOKEN, "-o", "plain", "info"])
        .assert()
        .success()
        .stdout(predicate::str::diff("2026.10.0\n"));
}

#[test]
fn test_admin_without_backend() {
    let hub = start_hub();
    hassdeck_cmd()
        .args(["--hub", &hub, "--token", TOKEN, "admin", "stats"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("admin backend"));
}

// ── Admin backend ───────────────────────────────────────────────────

#[cfg(target_os = "linux")]
#[tokio::test(flavor = "multi_thread")]
async fn test_admin_mappings_from_backend() {
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/mappings"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "entity_id": "light.porch", "room": "Entrance" },
            { "entity_id": "switch.kettle", "room": "Kitchen", "label": "Tea" }
        ])))
        .expect(1)
        .mount(&server)
        .await;

    let home = tempfile::tempdir().unwrap();
    write_config(
        home.path(),
        &format!(
            r#"
[profiles.home]
name = "Home"
hub_url = "http://127.0.0.1:9"
admin_url = "{}"
"#,
            server.uri()
        ),
    );

    let home_path = home.path().to_owned();
    let output = tokio::task::spawn_blocking(move || {
        isolated_cmd(&home_path)
            .args(["--token", TOKEN, "-o", "plain", "admin", "mappings"])
            .output()
            .unwrap()
    })
    .await
    .unwrap();

    assert!(output.status.success(), "{}", combined_output(&output));
    assert_eq!(
        String::from_utf8_lossy(&output.stdout),
        "light.porch\nswitch.kettle\n"
    );
}
