//! Resolve the hub to talk to from the config file and CLI overrides.
//!
//! The profile store lives in `hassdeck-config`; this module only layers
//! the global flags (`--profile`, `--hub`, `--token`, `--insecure`,
//! `--timeout`) on top and produces a `HubConfig`.

use secrecy::SecretString;

use hassdeck_config::{Config, Profile};
use hassdeck_core::HubConfig;

use crate::cli::GlobalOpts;
use crate::error::CliError;

pub use hassdeck_config::config_path;

/// Load the config file, migrating legacy keys. An unreadable file is
/// reported and treated as empty.
pub fn load() -> Config {
    match hassdeck_config::load_and_migrate(&config_path()) {
        Ok(config) => config,
        Err(e) => {
            tracing::warn!(error = %e, "ignoring unreadable config file");
            Config::default()
        }
    }
}

/// Load the config file for editing. Unlike [`load`], a broken file is an
/// error so it never gets overwritten with defaults.
pub fn load_for_edit() -> Result<Config, CliError> {
    Ok(hassdeck_config::load_and_migrate(&config_path())?)
}

/// Profile id selected by `--profile`, falling back to the active profile.
pub fn selected_profile_id(global: &GlobalOpts, config: &Config) -> Option<String> {
    global
        .profile
        .clone()
        .or_else(|| config.active_profile.clone())
}

/// Comma-separated profile ids for error help text.
pub fn available_profiles(config: &Config) -> String {
    if config.profiles.is_empty() {
        "(none)".into()
    } else {
        config.profiles.keys().cloned().collect::<Vec<_>>().join(", ")
    }
}

/// Build the `HubConfig` for this invocation.
pub fn resolve_hub_config(global: &GlobalOpts) -> Result<(String, HubConfig), CliError> {
    let config = load();
    resolve_with(global, &config)
}

/// Returns the profile id (or `"cli"` for a flag-only hub) with the config.
pub fn resolve_with(global: &GlobalOpts, config: &Config) -> Result<(String, HubConfig), CliError> {
    let selected = selected_profile_id(global, config);

    let (profile_id, mut profile) = match selected {
        Some(id) => match config.profiles.get(&id) {
            Some(profile) => (id, profile.clone()),
            None if global.profile.is_some() => {
                return Err(CliError::ProfileNotFound {
                    name: id,
                    available: available_profiles(config),
                });
            }
            None => flag_only_profile(global)?,
        },
        None => flag_only_profile(global)?,
    };

    // Flags override the profile.
    if let Some(ref hub) = global.hub {
        profile.hub_url.clone_from(hub);
    }
    if global.insecure {
        profile.insecure = Some(true);
    }
    if global.timeout.is_some() {
        profile.timeout = global.timeout;
    }

    let hub_config = match global.token {
        Some(ref token) => hassdeck_config::hub_config_with_token(
            &profile,
            &config.defaults,
            SecretString::from(token.clone()),
        )?,
        None => hassdeck_config::profile_to_hub_config(&profile, &profile_id, &config.defaults)?,
    };
    Ok((profile_id, hub_config))
}

fn flag_only_profile(global: &GlobalOpts) -> Result<(String, Profile), CliError> {
    let hub = global.hub.as_deref().ok_or_else(|| CliError::NoConfig {
        path: config_path().display().to_string(),
    })?;
    if global.token.is_none() {
        return Err(CliError::NoCredentials {
            profile: "cli".into(),
        });
    }
    Ok(("cli".into(), Profile::new("Command line", hub)))
}
