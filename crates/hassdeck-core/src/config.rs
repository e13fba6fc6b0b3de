// ── Runtime connection configuration ──
//
// These types describe *how* to reach a hub. They carry the credential and
// connection tuning, but never touch disk. The CLI (or any other host)
// builds a `HubConfig` from a profile and hands it in.

use std::time::Duration;

use secrecy::SecretString;
use url::Url;

/// TLS verification strategy for HTTP calls to the admin backend.
///
/// The realtime socket does not use it: `wss://` hubs are always verified
/// against the bundled web PKI roots.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum TlsVerification {
    /// System CA store (strict).
    #[default]
    SystemDefaults,
    /// Custom CA certificate file.
    CustomCa(std::path::PathBuf),
    /// Skip verification (self-signed certs on the LAN).
    DangerAcceptInvalid,
}

/// Automatic reconnection policy.
///
/// `delay(attempt) = min(initial_delay * 2^attempt, max_delay)`; after
/// `max_attempts` consecutive failures the connection stops retrying until
/// the host application comes back to the foreground.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// Delay before the first reconnection attempt. Default: 5s.
    pub initial_delay: Duration,
    /// Upper bound on the delay. Default: 60s.
    pub max_delay: Duration,
    /// Attempts before giving up until the next foreground. Default: 5.
    pub max_attempts: u32,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(5),
            max_delay: Duration::from_secs(60),
            max_attempts: 5,
        }
    }
}

impl ReconnectPolicy {
    /// Delay before reconnect attempt number `attempt` (0-based).
    pub fn delay(&self, attempt: u32) -> Duration {
        // 2^31 already exceeds any sane cap; clamp the shift to avoid overflow.
        let factor = 1u32.checked_shl(attempt.min(31)).unwrap_or(u32::MAX);
        self.initial_delay
            .checked_mul(factor)
            .map_or(self.max_delay, |d| d.min(self.max_delay))
    }

    /// Whether another automatic attempt is allowed after `attempts` failures.
    pub fn allows(&self, attempts: u32) -> bool {
        attempts < self.max_attempts
    }
}

/// Configuration for one hub connection.
///
/// Built by the host, passed to `HubConnection` -- core never reads
/// config files.
#[derive(Debug, Clone)]
pub struct HubConfig {
    /// Hub base URL (e.g., `http://homeassistant.local:8123`).
    pub url: Url,
    /// Long-lived access token.
    pub token: SecretString,
    /// Optional admin backend base URL.
    pub admin_url: Option<Url>,
    /// TLS verification for admin backend calls.
    pub tls: TlsVerification,
    /// Socket open timeout and per-request deadline.
    pub timeout: Duration,
    /// Reconnection tuning.
    pub reconnect: ReconnectPolicy,
}

impl HubConfig {
    /// Config with default tuning for `url` and `token`.
    pub fn new(url: Url, token: SecretString) -> Self {
        Self {
            url,
            token,
            admin_url: None,
            tls: TlsVerification::default(),
            timeout: Duration::from_secs(30),
            reconnect: ReconnectPolicy::default(),
        }
    }

    /// Whether `tls` relaxes or replaces verification on an `https://` hub,
    /// where the realtime socket would still verify strictly.
    pub fn realtime_ignores_tls(&self) -> bool {
        self.url.scheme() == "https" && self.tls != TlsVerification::SystemDefaults
    }
}
