//! Shared helpers for command handlers.

use std::io::IsTerminal;
use std::time::Duration;

use indicatif::ProgressBar;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use hassdeck_core::{EntityId, HubConfig, HubConnection, LifecycleWatcher};

use crate::cli::GlobalOpts;
use crate::error::CliError;

/// Open a connection and wait for authentication.
///
/// A spinner runs on stderr while waiting when stderr is a terminal. On
/// failure the connection is torn down before the error is returned.
pub async fn connect(
    config: HubConfig,
    lifecycle: &LifecycleWatcher,
    global: &GlobalOpts,
) -> Result<HubConnection, CliError> {
    let url = config.url.to_string();
    let connection = HubConnection::new(config, lifecycle)?;

    let spinner = if global.quiet || !std::io::stderr().is_terminal() {
        ProgressBar::hidden()
    } else {
        ProgressBar::new_spinner()
    };
    spinner.set_message(format!("Connecting to {url}"));
    spinner.enable_steady_tick(Duration::from_millis(100));

    let outcome = connection.connect_and_wait().await;
    spinner.finish_and_clear();

    match outcome {
        Ok(()) => {
            tracing::debug!(url, "connected");
            Ok(connection)
        }
        Err(e) => {
            connection.disconnect().await;
            Err(e.into())
        }
    }
}

/// Token cancelled on Ctrl-C, for aborting admin fetches.
pub fn cancel_on_ctrl_c() -> CancellationToken {
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            trigger.cancel();
        }
    });
    cancel
}

/// Parse a user-typed entity id.
pub fn parse_entity_id(raw: &str) -> Result<EntityId, CliError> {
    raw.parse::<EntityId>().map_err(|e| CliError::Validation {
        field: "entity_id".into(),
        reason: e.to_string(),
    })
}

/// Parse a JSON object given on the command line.
pub fn parse_json_object(field: &str, raw: &str) -> Result<Value, CliError> {
    let value: Value = serde_json::from_str(raw).map_err(|e| CliError::Validation {
        field: field.into(),
        reason: format!("invalid JSON: {e}"),
    })?;
    if !value.is_object() {
        return Err(CliError::Validation {
            field: field.into(),
            reason: "expected a JSON object".into(),
        });
    }
    Ok(value)
}

/// Prompt for confirmation, auto-approving if `--yes` was passed.
pub fn confirm(message: &str, yes_flag: bool) -> Result<bool, CliError> {
    if yes_flag {
        return Ok(true);
    }
    if !std::io::stdin().is_terminal() {
        return Err(CliError::NonInteractiveRequiresYes {
            action: message.to_owned(),
        });
    }
    dialoguer::Confirm::new()
        .with_prompt(message)
        .default(false)
        .interact()
        .map_err(prompt_err)
}

/// Map a dialoguer / interactive I/O failure into CliError.
pub fn prompt_err(e: impl std::fmt::Display) -> CliError {
    CliError::Validation {
        field: "interactive".into(),
        reason: format!("prompt failed: {e}"),
    }
}

/// Local time for table output.
pub fn local_time(ts: Option<chrono::DateTime<chrono::Utc>>) -> String {
    ts.map_or_else(
        || "-".into(),
        |t| {
            t.with_timezone(&chrono::Local)
                .format("%Y-%m-%d %H:%M:%S")
                .to_string()
        },
    )
}
