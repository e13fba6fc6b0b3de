//! Command dispatch: bridges CLI args -> hub requests -> output formatting.

pub mod admin;
pub mod config_cmd;
pub mod hub;
pub mod registry;
pub mod states;
pub mod util;
pub mod watch;

use hassdeck_core::{AdminClient, HubConfig, LifecycleWatcher, admin_client};

use crate::cli::{Command, GlobalOpts};
use crate::error::CliError;

/// Dispatch a hub-bound command to the appropriate handler.
///
/// Admin commands only talk HTTP; everything else opens one realtime
/// connection, runs, and closes it again whatever the outcome.
pub async fn dispatch(
    cmd: Command,
    profile_id: &str,
    hub_config: HubConfig,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    if let Command::Admin(args) = cmd {
        let admin = admin_client(&hub_config)?.ok_or_else(|| CliError::NoAdminBackend {
            profile: profile_id.to_owned(),
        })?;
        return admin::handle(&admin, args, global).await;
    }

    // Only `entities` reads the admin backend, and only for room labels.
    let admin = match cmd {
        Command::Entities(_) => optional_admin(&hub_config),
        _ => None,
    };

    let lifecycle = LifecycleWatcher::default();
    let connection = util::connect(hub_config, &lifecycle, global).await?;

    let result = match cmd {
        Command::States(args) => states::list(&connection, args, global).await,
        Command::State { entity_id } => states::show(&connection, &entity_id, global).await,
        Command::Call(args) => states::call(&connection, args, global).await,
        Command::Watch(args) => watch::handle(&connection, args, global).await,
        Command::Areas => registry::areas(&connection, global).await,
        Command::Devices => registry::devices(&connection, global).await,
        Command::Entities(args) => {
            registry::entities(&connection, admin.as_ref(), args, global).await
        }
        Command::Services(args) => hub::services(&connection, args, global).await,
        Command::Info => hub::info(&connection, global).await,
        Command::Ping => hub::ping(&connection, global).await,
        // Handled before a connection is opened
        Command::Admin(_) | Command::Config(_) | Command::Completions(_) => unreachable!(),
    };

    connection.disconnect().await;
    result
}

/// Admin client for commands that merely decorate hub data with it. A
/// backend that cannot be set up is logged and skipped.
fn optional_admin(hub_config: &HubConfig) -> Option<AdminClient> {
    admin_client(hub_config).unwrap_or_else(|e| {
        tracing::warn!(error = %e, "admin backend unavailable, skipping room mappings");
        None
    })
}
