use thiserror::Error;

/// Top-level error type for the `hassdeck-api` crate.
///
/// Covers every failure mode across both API surfaces: the hub's realtime
/// WebSocket endpoint and the admin backend's JSON-over-HTTP endpoints.
/// `hassdeck-core` maps these into user-facing diagnostics.
#[derive(Debug, Error)]
pub enum Error {
    // ── Authentication ──────────────────────────────────────────────
    /// The hub answered the handshake with `auth_invalid`.
    #[error("Authentication failed: {message}")]
    Authentication { message: String },

    // ── Transport ───────────────────────────────────────────────────
    /// HTTP transport error (connection refused, DNS failure, etc.)
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// URL parsing error.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// The hub URL uses a scheme that has no WebSocket equivalent.
    #[error("Unsupported URL scheme '{scheme}' (expected http, https, ws or wss)")]
    UnsupportedScheme { scheme: String },

    /// Request timed out.
    #[error("Request timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    /// TLS handshake or certificate error.
    #[error("TLS error: {0}")]
    Tls(String),

    /// Non-success HTTP status from the admin backend.
    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    /// The caller cancelled the request before it finished.
    #[error("Request aborted")]
    Aborted,

    // ── WebSocket ───────────────────────────────────────────────────
    /// WebSocket connection failed.
    #[error("WebSocket connection failed: {0}")]
    WebSocketConnect(String),

    /// WebSocket closed unexpectedly.
    #[error("WebSocket closed (code {code}): {reason}")]
    WebSocketClosed { code: u16, reason: String },

    /// Writing a frame to the socket failed.
    #[error("WebSocket send failed: {0}")]
    WebSocketSend(String),

    // ── Hub protocol ────────────────────────────────────────────────
    /// The hub rejected a command (`"success": false`).
    #[error("Hub error ({code}): {message}")]
    Hub { code: String, message: String },

    // ── Data ────────────────────────────────────────────────────────
    /// JSON deserialization failed, with the raw body for debugging.
    #[error("Deserialization error: {message}")]
    Deserialization { message: String, body: String },
}

impl Error {
    /// Returns `true` if the hub refused the access token.
    pub fn is_auth_failure(&self) -> bool {
        matches!(self, Self::Authentication { .. })
    }

    /// Returns `true` if this is a transient error worth retrying.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport(e) => e.is_timeout() || e.is_connect(),
            Self::Timeout { .. } | Self::WebSocketConnect(_) | Self::WebSocketClosed { .. } => {
                true
            }
            Self::Http { status, .. } => *status >= 500,
            _ => false,
        }
    }

    /// Returns `true` when the request was cancelled by its caller.
    ///
    /// Aborted fetches are expected during teardown and should not be
    /// reported as failures.
    pub fn is_aborted(&self) -> bool {
        matches!(self, Self::Aborted)
    }

    /// Returns `true` if this is a "not found" error.
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::Transport(e) => e.status() == Some(reqwest::StatusCode::NOT_FOUND),
            Self::Http { status: 404, .. } => true,
            Self::Hub { code, .. } => code == "not_found",
            _ => false,
        }
    }

    /// Extract the hub's error code, if available.
    pub fn hub_error_code(&self) -> Option<&str> {
        match self {
            Self::Hub { code, .. } => Some(code),
            _ => None,
        }
    }
}
