//! Profile storage for hassdeck.
//!
//! TOML profiles, credential resolution (env + keyring + plaintext), the
//! one-time migration of the old single-hub keys, and translation to
//! `hassdeck_core::HubConfig`. Switching the active profile always tears
//! down every live hub connection first.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use hassdeck_core::{ConnectionRegistry, HubConfig, ReconnectPolicy, TlsVerification};

/// Keyring service name.
pub const KEYRING_SERVICE: &str = "hassdeck";

/// Profile id the legacy single-hub keys migrate into.
pub const LEGACY_PROFILE: &str = "default";

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("no token configured for profile '{profile}'")]
    NoCredentials { profile: String },

    #[error("unknown profile '{profile}'")]
    UnknownProfile { profile: String },

    #[error("keyring error: {0}")]
    Keyring(String),

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level TOML configuration.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct Config {
    /// Id of the profile used when none is given.
    pub active_profile: Option<String>,

    /// Global defaults.
    #[serde(default)]
    pub defaults: Defaults,

    /// Hub profiles keyed by id.
    #[serde(default)]
    pub profiles: BTreeMap<String, Profile>,

    // Pre-profile keys. Read once, moved into a profile, never written.
    #[serde(default, skip_serializing)]
    pub hub_url: Option<String>,
    #[serde(default, skip_serializing)]
    pub token: Option<String>,
    #[serde(default, skip_serializing)]
    pub admin_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Defaults {
    #[serde(default = "default_output")]
    pub output: String,

    #[serde(default = "default_color")]
    pub color: String,

    #[serde(default)]
    pub insecure: bool,

    /// Socket open timeout and per-request deadline, in seconds.
    #[serde(default = "default_timeout")]
    pub timeout: u64,

    /// First reconnect delay, in seconds.
    #[serde(default = "default_reconnect_delay")]
    pub reconnect_delay: u64,

    /// Reconnect delay cap, in seconds.
    #[serde(default = "default_reconnect_max_delay")]
    pub reconnect_max_delay: u64,

    #[serde(default = "default_reconnect_attempts")]
    pub reconnect_attempts: u32,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            output: default_output(),
            color: default_color(),
            insecure: false,
            timeout: default_timeout(),
            reconnect_delay: default_reconnect_delay(),
            reconnect_max_delay: default_reconnect_max_delay(),
            reconnect_attempts: default_reconnect_attempts(),
        }
    }
}

fn default_output() -> String {
    "table".into()
}
fn default_color() -> String {
    "auto".into()
}
fn default_timeout() -> u64 {
    30
}
fn default_reconnect_delay() -> u64 {
    5
}
fn default_reconnect_max_delay() -> u64 {
    60
}
fn default_reconnect_attempts() -> u32 {
    5
}

/// A named hub profile.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Profile {
    /// Display name.
    pub name: String,

    /// Hub base URL (e.g., "http://homeassistant.local:8123").
    pub hub_url: String,

    /// Long-lived access token (plaintext; prefer keyring or env var).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,

    /// Environment variable holding the token.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_env: Option<String>,

    /// Admin backend base URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub admin_url: Option<String>,

    /// Path to custom CA certificate for the admin backend.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ca_cert: Option<PathBuf>,

    /// Accept invalid certificates from the admin backend. The hub's
    /// realtime socket always verifies its certificate.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub insecure: Option<bool>,

    /// Override timeout.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,
}

impl Profile {
    pub fn new(name: impl Into<String>, hub_url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            hub_url: hub_url.into(),
            token: None,
            token_env: None,
            admin_url: None,
            ca_cert: None,
            insecure: None,
            timeout: None,
        }
    }
}

impl Config {
    /// The active profile, if one is set and exists.
    pub fn active(&self) -> Option<(&str, &Profile)> {
        let id = self.active_profile.as_deref()?;
        self.profiles.get_key_value(id).map(|(k, p)| (k.as_str(), p))
    }

    pub fn profile(&self, id: &str) -> Result<&Profile, ConfigError> {
        self.profiles
            .get(id)
            .ok_or_else(|| ConfigError::UnknownProfile { profile: id.into() })
    }

    /// Add or replace a profile. The first profile becomes active.
    pub fn upsert_profile(&mut self, id: impl Into<String>, profile: Profile) {
        let id = id.into();
        if self.active_profile.is_none() {
            self.active_profile = Some(id.clone());
        }
        self.profiles.insert(id, profile);
    }

    /// Remove a profile. If it was active, the first remaining profile (by
    /// id) becomes active.
    pub fn remove_profile(&mut self, id: &str) -> Result<Profile, ConfigError> {
        let removed = self
            .profiles
            .remove(id)
            .ok_or_else(|| ConfigError::UnknownProfile { profile: id.into() })?;
        if self.active_profile.as_deref() == Some(id) {
            self.active_profile = self.profiles.keys().next().cloned();
        }
        Ok(removed)
    }

    /// Move the pre-profile `hub_url` / `token` / `admin_url` keys into a
    /// profile named [`LEGACY_PROFILE`]. Returns `true` if anything changed.
    ///
    /// An existing profile with that id is never overwritten; the legacy keys
    /// are dropped either way.
    pub fn migrate_legacy(&mut self) -> bool {
        let had_legacy = self.hub_url.is_some() || self.token.is_some() || self.admin_url.is_some();
        let token = self.token.take();
        let admin_url = self.admin_url.take();
        let Some(hub_url) = self.hub_url.take() else {
            return had_legacy;
        };
        if self.profiles.contains_key(LEGACY_PROFILE) {
            tracing::warn!("legacy hub keys ignored: profile 'default' already exists");
            return true;
        }

        tracing::info!(hub_url = %hub_url, "migrating legacy hub settings into profile 'default'");
        let mut profile = Profile::new("Default", hub_url);
        profile.token = token;
        profile.admin_url = admin_url;
        self.upsert_profile(LEGACY_PROFILE, profile);
        true
    }
}

// ── Config file path ────────────────────────────────────────────────

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    ProjectDirs::from("io", "hassdeck", "hassdeck").map_or_else(
        || {
            let mut p = dirs_fallback();
            p.push("config.toml");
            p
        },
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

fn dirs_fallback() -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.push(".config");
    p.push("hassdeck");
    p
}

// ── Config loading ──────────────────────────────────────────────────

/// Load the full Config from the canonical file + environment.
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from(&config_path())
}

/// Load from `path` + `HASSDECK_` environment overrides.
///
/// Only `HASSDECK_ACTIVE_PROFILE` and `HASSDECK_DEFAULTS__<KEY>` are read
/// from the environment; the other `HASSDECK_*` variables belong to the CLI.
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    let figment = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(
            Env::prefixed("HASSDECK_")
                .filter(|key| {
                    let key = key.as_str().to_ascii_lowercase();
                    key == "active_profile" || key.starts_with("defaults__")
                })
                .split("__"),
        );

    let config: Config = figment.extract()?;
    Ok(config)
}

/// Load config, returning a default if it can't be read.
pub fn load_config_or_default() -> Config {
    load_config().unwrap_or_default()
}

/// Load, migrate legacy keys, and write the result back if they moved.
pub fn load_and_migrate(path: &Path) -> Result<Config, ConfigError> {
    let mut config = load_config_from(path)?;
    if config.migrate_legacy() {
        save_config_to(path, &config)?;
    }
    Ok(config)
}

// ── Config saving ───────────────────────────────────────────────────

/// Serialize config to TOML and write to the canonical config path.
pub fn save_config(cfg: &Config) -> Result<(), ConfigError> {
    save_config_to(&config_path(), cfg)
}

pub fn save_config_to(path: &Path, cfg: &Config) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let toml_str = toml::to_string_pretty(cfg)?;
    std::fs::write(path, toml_str)?;
    Ok(())
}

// ── Credentials ─────────────────────────────────────────────────────

fn keyring_user(profile_id: &str) -> String {
    format!("{profile_id}/token")
}

fn keyring_token(profile_id: &str) -> Option<String> {
    keyring::Entry::new(KEYRING_SERVICE, &keyring_user(profile_id))
        .ok()?
        .get_password()
        .ok()
}

/// Resolve a profile's token: `token_env` → system keyring → plaintext.
pub fn resolve_token(profile: &Profile, profile_id: &str) -> Result<SecretString, ConfigError> {
    pick_token(
        profile,
        profile_id,
        |name| std::env::var(name).ok(),
        || keyring_token(profile_id),
    )
}

fn pick_token(
    profile: &Profile,
    profile_id: &str,
    env: impl Fn(&str) -> Option<String>,
    keyring: impl FnOnce() -> Option<String>,
) -> Result<SecretString, ConfigError> {
    // 1. Profile's token_env → env var lookup
    if let Some(value) = profile.token_env.as_deref().and_then(env) {
        return Ok(SecretString::from(value));
    }

    // 2. System keyring
    if let Some(secret) = keyring() {
        return Ok(SecretString::from(secret));
    }

    // 3. Plaintext in config
    if let Some(ref token) = profile.token {
        return Ok(SecretString::from(token.clone()));
    }

    Err(ConfigError::NoCredentials {
        profile: profile_id.into(),
    })
}

/// Store a profile's token in the system keyring.
pub fn store_token(profile_id: &str, token: &str) -> Result<(), ConfigError> {
    keyring::Entry::new(KEYRING_SERVICE, &keyring_user(profile_id))
        .and_then(|entry| entry.set_password(token))
        .map_err(|e| ConfigError::Keyring(e.to_string()))
}

/// Remove a profile's token from the system keyring. Missing entries are
/// not an error.
pub fn delete_token(profile_id: &str) -> Result<(), ConfigError> {
    let entry = keyring::Entry::new(KEYRING_SERVICE, &keyring_user(profile_id))
        .map_err(|e| ConfigError::Keyring(e.to_string()))?;
    match entry.delete_credential() {
        Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
        Err(e) => Err(ConfigError::Keyring(e.to_string())),
    }
}

// ── Translation to core config ──────────────────────────────────────

fn parse_url(field: &str, raw: &str) -> Result<url::Url, ConfigError> {
    raw.parse().map_err(|_| ConfigError::Validation {
        field: field.into(),
        reason: format!("invalid URL: {raw}"),
    })
}

/// Build a `HubConfig` from a profile with an already-resolved token.
pub fn hub_config_with_token(
    profile: &Profile,
    defaults: &Defaults,
    token: SecretString,
) -> Result<HubConfig, ConfigError> {
    let url = parse_url("hub_url", &profile.hub_url)?;
    let admin_url = profile
        .admin_url
        .as_deref()
        .map(|raw| parse_url("admin_url", raw))
        .transpose()?;

    let tls = if profile.insecure.unwrap_or(defaults.insecure) {
        TlsVerification::DangerAcceptInvalid
    } else if let Some(ref ca_path) = profile.ca_cert {
        TlsVerification::CustomCa(ca_path.clone())
    } else {
        TlsVerification::SystemDefaults
    };

    let mut config = HubConfig::new(url, token);
    config.admin_url = admin_url;
    config.tls = tls;
    config.timeout = Duration::from_secs(profile.timeout.unwrap_or(defaults.timeout));
    config.reconnect = ReconnectPolicy {
        initial_delay: Duration::from_secs(defaults.reconnect_delay),
        max_delay: Duration::from_secs(defaults.reconnect_max_delay),
        max_attempts: defaults.reconnect_attempts,
    };
    Ok(config)
}

/// Build a `HubConfig` from a profile, resolving its token.
pub fn profile_to_hub_config(
    profile: &Profile,
    profile_id: &str,
    defaults: &Defaults,
) -> Result<HubConfig, ConfigError> {
    let token = resolve_token(profile, profile_id)?;
    hub_config_with_token(profile, defaults, token)
}

// ── Profile switching ───────────────────────────────────────────────

/// Make `profile_id` the active profile.
///
/// Every connection in `registry` is disconnected first, so nothing opened
/// with the previous credentials outlives the switch. Returns the number of
/// connections that were closed. The caller persists `config`.
pub async fn switch_active_profile(
    config: &mut Config,
    profile_id: &str,
    registry: &ConnectionRegistry,
) -> Result<usize, ConfigError> {
    config.profile(profile_id)?;
    let closed = registry.disconnect_all().await;
    config.active_profile = Some(profile_id.to_owned());
    tracing::info!(profile = profile_id, closed, "active profile switched");
    Ok(closed)
}
