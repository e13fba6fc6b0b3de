// ── Core error types ──
//
// User-facing errors from hassdeck-core. These are NOT transport-specific --
// consumers never see tungstenite or reqwest errors directly. The
// `From<hassdeck_api::Error>` impl translates them into domain variants.

use thiserror::Error;

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Connection errors ────────────────────────────────────────────
    #[error("Cannot connect to hub at {url}: {reason}")]
    ConnectionFailed { url: String, reason: String },

    #[error("Authentication failed: {message}")]
    AuthenticationFailed { message: String },

    /// A command was issued while no authenticated socket was open.
    #[error("Not connected to the hub")]
    NotConnected,

    /// The socket closed (or the connection was torn down) before the
    /// hub answered.
    #[error("Connection to the hub was lost before a response arrived")]
    ConnectionLost,

    #[error("Hub did not answer request {id} within {timeout_secs}s")]
    RequestTimeout { id: u64, timeout_secs: u64 },

    #[error("Hub connection timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    // ── Data errors ──────────────────────────────────────────────────
    #[error("Entity not found: {entity_id}")]
    EntityNotFound { entity_id: String },

    // ── Operation errors ─────────────────────────────────────────────
    #[error("Hub rejected the command ({code}): {message}")]
    Rejected { code: String, message: String },

    #[error("Validation failed: {message}")]
    ValidationFailed { message: String },

    // ── API errors (wrapped, not exposed raw) ────────────────────────
    #[error("API error: {message}")]
    Api {
        message: String,
        /// HTTP status code (if applicable).
        status: Option<u16>,
    },

    /// An admin backend fetch was aborted by its caller.
    #[error("Request aborted")]
    Aborted,

    // ── Configuration errors ─────────────────────────────────────────
    #[error("Configuration error: {message}")]
    Config { message: String },

    // ── Internal errors ──────────────────────────────────────────────
    #[error("Internal error: {0}")]
    Internal(String),
}

impl CoreError {
    /// Whether retrying the same operation later could succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::NotConnected
                | Self::ConnectionLost
                | Self::RequestTimeout { .. }
                | Self::Timeout { .. }
                | Self::ConnectionFailed { .. }
        )
    }
}

// ── Conversion from transport-layer errors ───────────────────────────

impl From<hassdeck_api::Error> for CoreError {
    fn from(err: hassdeck_api::Error) -> Self {
        use hassdeck_api::Error as Api;

        match err {
            Api::Authentication { message } => CoreError::AuthenticationFailed { message },
            Api::Transport(ref e) => {
                if e.is_timeout() {
                    CoreError::Timeout { timeout_secs: 0 }
                } else if e.is_connect() {
                    CoreError::ConnectionFailed {
                        url: e.url().map_or_else(|| "<unknown>".into(), ToString::to_string),
                        reason: e.to_string(),
                    }
                } else {
                    CoreError::Api {
                        message: e.to_string(),
                        status: e.status().map(|s| s.as_u16()),
                    }
                }
            }
            Api::InvalidUrl(e) => CoreError::Config {
                message: format!("Invalid URL: {e}"),
            },
            Api::UnsupportedScheme { scheme } => CoreError::Config {
                message: format!("Unsupported hub URL scheme: {scheme}"),
            },
            Api::Timeout { timeout_secs } => CoreError::Timeout { timeout_secs },
            Api::Tls(msg) => CoreError::ConnectionFailed {
                url: String::new(),
                reason: format!("TLS error: {msg}"),
            },
            Api::Http { status, body } => CoreError::Api {
                message: body,
                status: Some(status),
            },
            Api::Aborted => CoreError::Aborted,
            Api::WebSocketConnect(reason) => CoreError::ConnectionFailed {
                url: String::new(),
                reason: format!("WebSocket connection failed: {reason}"),
            },
            Api::WebSocketClosed { code, reason } => CoreError::ConnectionFailed {
                url: String::new(),
                reason: format!("WebSocket closed (code {code}): {reason}"),
            },
            Api::WebSocketSend(_) => CoreError::ConnectionLost,
            Api::Hub { code, message } => CoreError::Rejected { code, message },
            Api::Deserialization { message, body: _ } => {
                CoreError::Internal(format!("Deserialization error: {message}"))
            }
        }
    }
}
