//! CLI error types with miette diagnostics.
//!
//! Maps `CoreError` and `ConfigError` into user-facing errors with
//! actionable help text and stable exit codes.

use miette::Diagnostic;
use thiserror::Error;

use hassdeck_config::ConfigError;
use hassdeck_core::CoreError;

pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const AUTH: i32 = 3;
    pub const NOT_FOUND: i32 = 4;
    pub const CONNECTION: i32 = 7;
    pub const TIMEOUT: i32 = 8;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Connection ───────────────────────────────────────────────────
    #[error("Could not connect to hub at {url}")]
    #[diagnostic(
        code(hassdeck::connection_failed),
        help(
            "Check that the hub is running and reachable.\n\
             Reason: {reason}"
        )
    )]
    ConnectionFailed { url: String, reason: String },

    #[error("Connection to the hub was lost")]
    #[diagnostic(
        code(hassdeck::connection_lost),
        help("The hub closed the connection before answering. Try again.")
    )]
    ConnectionLost,

    // ── Authentication ───────────────────────────────────────────────
    #[error("Authentication failed: {message}")]
    #[diagnostic(
        code(hassdeck::auth_failed),
        help(
            "Create a new long-lived access token in your Home Assistant profile.\n\
             Then run: hassdeck config set-token"
        )
    )]
    AuthFailed { message: String },

    #[error("No access token configured for profile '{profile}'")]
    #[diagnostic(
        code(hassdeck::no_credentials),
        help(
            "Store one with: hassdeck config set-token --profile {profile}\n\
             Or set the HASSDECK_TOKEN environment variable."
        )
    )]
    NoCredentials { profile: String },

    // ── Resources ────────────────────────────────────────────────────
    #[error("{resource_type} '{identifier}' not found")]
    #[diagnostic(
        code(hassdeck::not_found),
        help("Run: hassdeck {list_command} to see what is available")
    )]
    NotFound {
        resource_type: String,
        identifier: String,
        list_command: String,
    },

    // ── Hub / API ────────────────────────────────────────────────────
    #[error("Hub error ({code}): {message}")]
    #[diagnostic(code(hassdeck::api_error))]
    ApiError { code: String, message: String },

    #[error("No admin backend configured for profile '{profile}'")]
    #[diagnostic(
        code(hassdeck::no_admin_backend),
        help("Add `admin_url` to the profile in your config file.")
    )]
    NoAdminBackend { profile: String },

    // ── Validation ───────────────────────────────────────────────────
    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(hassdeck::validation))]
    Validation { field: String, reason: String },

    // ── Configuration ────────────────────────────────────────────────
    #[error("Profile '{name}' not found in configuration")]
    #[diagnostic(
        code(hassdeck::profile_not_found),
        help(
            "Available profiles: {available}\n\
             Create one with: hassdeck config init"
        )
    )]
    ProfileNotFound { name: String, available: String },

    #[error("No hub configured")]
    #[diagnostic(
        code(hassdeck::no_config),
        help(
            "Create a profile with: hassdeck config init\n\
             Or pass --hub and --token.\n\
             Expected config at: {path}"
        )
    )]
    NoConfig { path: String },

    #[error(transparent)]
    #[diagnostic(code(hassdeck::config))]
    Config(Box<ConfigError>),

    // ── Interactive ──────────────────────────────────────────────────
    #[error("Destructive operation '{action}' requires confirmation")]
    #[diagnostic(
        code(hassdeck::confirmation_required),
        help("Use --yes (-y) to skip confirmation in non-interactive contexts.")
    )]
    NonInteractiveRequiresYes { action: String },

    // ── Timeout ──────────────────────────────────────────────────────
    #[error("Timed out after {seconds}s")]
    #[diagnostic(
        code(hassdeck::timeout),
        help("Increase the limit with --timeout or check that the hub is responsive.")
    )]
    Timeout { seconds: u64 },

    // ── IO / Serialization ───────────────────────────────────────────
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Invalid JSON: {0}")]
    #[diagnostic(code(hassdeck::json))]
    Json(#[from] serde_json::Error),

    #[error("YAML output failed: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("TOML output failed: {0}")]
    Toml(#[from] toml::ser::Error),
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::ConnectionFailed { .. } | Self::ConnectionLost => exit_code::CONNECTION,
            Self::AuthFailed { .. } | Self::NoCredentials { .. } => exit_code::AUTH,
            Self::NotFound { .. } | Self::ProfileNotFound { .. } => exit_code::NOT_FOUND,
            Self::Timeout { .. } => exit_code::TIMEOUT,
            Self::Validation { .. } | Self::NonInteractiveRequiresYes { .. } => exit_code::USAGE,
            _ => exit_code::GENERAL,
        }
    }
}

// ── ConfigError → CliError mapping ───────────────────────────────────

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::NoCredentials { profile } => CliError::NoCredentials { profile },
            ConfigError::UnknownProfile { profile } => CliError::ProfileNotFound {
                name: profile,
                available: "(see: hassdeck config list)".into(),
            },
            ConfigError::Validation { field, reason } => CliError::Validation { field, reason },
            other => CliError::Config(Box::new(other)),
        }
    }
}

// ── CoreError → CliError mapping ─────────────────────────────────────

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::ConnectionFailed { url, reason } => CliError::ConnectionFailed { url, reason },

            CoreError::AuthenticationFailed { message } => CliError::AuthFailed { message },

            CoreError::NotConnected | CoreError::ConnectionLost => CliError::ConnectionLost,

            CoreError::Timeout { timeout_secs }
            | CoreError::RequestTimeout { timeout_secs, .. } => CliError::Timeout {
                seconds: timeout_secs,
            },

            CoreError::EntityNotFound { entity_id } => CliError::NotFound {
                resource_type: "entity".into(),
                identifier: entity_id,
                list_command: "states".into(),
            },

            CoreError::Rejected { code, message } => CliError::ApiError { code, message },

            CoreError::ValidationFailed { message } => CliError::Validation {
                field: "input".into(),
                reason: message,
            },

            CoreError::Api { message, status } => CliError::ApiError {
                code: status.map_or_else(|| "http".into(), |s| s.to_string()),
                message,
            },

            CoreError::Aborted => CliError::ApiError {
                code: "aborted".into(),
                message: "request aborted".into(),
            },

            CoreError::Config { message } => CliError::Validation {
                field: "config".into(),
                reason: message,
            },

            CoreError::Internal(message) => CliError::ApiError {
                code: "internal".into(),
                message,
            },
        }
    }
}

impl From<hassdeck_api::Error> for CliError {
    fn from(err: hassdeck_api::Error) -> Self {
        CoreError::from(err).into()
    }
}
