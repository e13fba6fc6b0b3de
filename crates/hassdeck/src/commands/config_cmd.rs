//! Config subcommand handlers.

use dialoguer::{Input, Select};
use serde::Serialize;
use tabled::Tabled;

use hassdeck_config::{Config, Profile};
use hassdeck_core::ConnectionRegistry;

use crate::cli::{ConfigArgs, ConfigCommand, GlobalOpts, OutputFormat};
use crate::config;
use crate::error::CliError;
use crate::output;

use super::util::{self, prompt_err};

// ── Helpers ─────────────────────────────────────────────────────────

fn save(cfg: &Config) -> Result<(), CliError> {
    hassdeck_config::save_config_to(&config::config_path(), cfg)?;
    Ok(())
}

fn require_profile<'a>(cfg: &'a Config, id: &str) -> Result<&'a Profile, CliError> {
    cfg.profiles
        .get(id)
        .ok_or_else(|| CliError::ProfileNotFound {
            name: id.to_owned(),
            available: config::available_profiles(cfg),
        })
}

fn prompt_token() -> Result<String, CliError> {
    let token = rpassword::prompt_password("Long-lived access token: ").map_err(prompt_err)?;
    if token.trim().is_empty() {
        return Err(CliError::Validation {
            field: "token".into(),
            reason: "token cannot be empty".into(),
        });
    }
    Ok(token.trim().to_owned())
}

#[derive(Debug, Serialize)]
struct ProfileListing<'a> {
    id: &'a str,
    active: bool,
    #[serde(flatten)]
    profile: &'a Profile,
}

#[derive(Tabled)]
struct ProfileRow {
    #[tabled(rename = "")]
    active: &'static str,
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Hub")]
    hub_url: String,
    #[tabled(rename = "Admin")]
    admin_url: String,
}

/// Copy of `cfg` with plaintext tokens masked.
fn redacted(cfg: &Config) -> Config {
    let mut cfg = cfg.clone();
    for profile in cfg.profiles.values_mut() {
        if profile.token.is_some() {
            profile.token = Some("********".into());
        }
    }
    cfg
}

// ── Handler ─────────────────────────────────────────────────────────

pub async fn handle(args: ConfigArgs, global: &GlobalOpts) -> Result<(), CliError> {
    match args.command {
        // ── Init: interactive wizard ────────────────────────────────
        ConfigCommand::Init => {
            let config_path = config::config_path();
            eprintln!("hassdeck configuration wizard");
            eprintln!("   Config path: {}\n", config_path.display());

            let mut cfg = config::load_for_edit()?;

            let profile_id: String = Input::new()
                .with_prompt("Profile id")
                .default(if cfg.profiles.is_empty() {
                    "home".into()
                } else {
                    format!("hub{}", cfg.profiles.len() + 1)
                })
                .interact_text()
                .map_err(prompt_err)?;

            let name: String = Input::new()
                .with_prompt("Display name")
                .default(profile_id.clone())
                .interact_text()
                .map_err(prompt_err)?;

            let hub_url: String = Input::new()
                .with_prompt("Hub URL")
                .default("http://homeassistant.local:8123".into())
                .validate_with(|input: &String| -> Result<(), String> {
                    let url: url::Url = input.parse().map_err(|e| format!("invalid URL: {e}"))?;
                    hassdeck_api::websocket_url(&url)
                        .map(drop)
                        .map_err(|e| e.to_string())
                })
                .interact_text()
                .map_err(prompt_err)?;

            let admin_url: String = Input::new()
                .with_prompt("Admin backend URL (empty for none)")
                .allow_empty(true)
                .interact_text()
                .map_err(prompt_err)?;

            let token = prompt_token()?;

            let store_choices = &[
                "Store in system keyring (recommended)",
                "Save to config file (plaintext)",
            ];
            let store_selection = Select::new()
                .with_prompt("Where to store the token?")
                .items(store_choices)
                .default(0)
                .interact()
                .map_err(prompt_err)?;

            let mut profile = Profile::new(name, hub_url);
            if !admin_url.trim().is_empty() {
                profile.admin_url = Some(admin_url.trim().to_owned());
            }
            if store_selection == 0 {
                hassdeck_config::store_token(&profile_id, &token)?;
                eprintln!("   ✓ Token stored in system keyring");
            } else {
                profile.token = Some(token);
            }

            cfg.upsert_profile(profile_id.clone(), profile);
            let registry = ConnectionRegistry::global();
            let closed =
                hassdeck_config::switch_active_profile(&mut cfg, &profile_id, &registry).await?;
            tracing::debug!(closed, "connections closed by profile switch");
            save(&cfg)?;

            eprintln!("\n✓ Configuration written to {}", config_path.display());
            eprintln!("  Active profile: {profile_id}");
            eprintln!("\n  Test it: hassdeck info");
            Ok(())
        }

        // ── List ────────────────────────────────────────────────────
        ConfigCommand::List => {
            let cfg = redacted(&config::load());
            if cfg.profiles.is_empty() && global.output == OutputFormat::Table {
                if !global.quiet {
                    eprintln!("No profiles configured. Run: hassdeck config init");
                }
                return Ok(());
            }
            let active = cfg.active_profile.as_deref();
            let listings: Vec<ProfileListing<'_>> = cfg
                .profiles
                .iter()
                .map(|(id, profile)| ProfileListing {
                    id,
                    active: Some(id.as_str()) == active,
                    profile,
                })
                .collect();
            let out = output::render_list(
                global.output,
                &listings,
                |l| ProfileRow {
                    active: if l.active { "*" } else { "" },
                    id: l.id.to_owned(),
                    name: l.profile.name.clone(),
                    hub_url: l.profile.hub_url.clone(),
                    admin_url: l.profile.admin_url.clone().unwrap_or_default(),
                },
                |l| l.id.to_owned(),
            )?;
            output::print_output(&out, global.quiet);
            Ok(())
        }

        // ── Use <name> ──────────────────────────────────────────────
        ConfigCommand::Use { name } => {
            let mut cfg = config::load_for_edit()?;
            require_profile(&cfg, &name)?;
            let registry = ConnectionRegistry::global();
            hassdeck_config::switch_active_profile(&mut cfg, &name, &registry).await?;
            save(&cfg)?;
            if !global.quiet {
                eprintln!("✓ Active profile set to '{name}'");
            }
            Ok(())
        }

        // ── Remove <name> ───────────────────────────────────────────
        ConfigCommand::Remove { name } => {
            let mut cfg = config::load_for_edit()?;
            require_profile(&cfg, &name)?;
            if !util::confirm(&format!("Remove profile '{name}'?"), global.yes)? {
                return Ok(());
            }
            cfg.remove_profile(&name)?;
            if let Err(e) = hassdeck_config::delete_token(&name) {
                tracing::warn!(error = %e, profile = %name, "could not remove keyring entry");
            }
            save(&cfg)?;
            if !global.quiet {
                eprintln!("✓ Removed profile '{name}'");
                if let Some(ref active) = cfg.active_profile {
                    eprintln!("  Active profile: {active}");
                }
            }
            Ok(())
        }

        // ── SetToken ────────────────────────────────────────────────
        ConfigCommand::SetToken { profile } => {
            let cfg = config::load();
            let profile_id = profile
                .or_else(|| config::selected_profile_id(global, &cfg))
                .ok_or_else(|| CliError::NoConfig {
                    path: config::config_path().display().to_string(),
                })?;
            require_profile(&cfg, &profile_id)?;

            let token = prompt_token()?;
            hassdeck_config::store_token(&profile_id, &token)?;
            if !global.quiet {
                eprintln!("✓ Token stored in system keyring for profile '{profile_id}'");
            }
            Ok(())
        }

        // ── Show ────────────────────────────────────────────────────
        ConfigCommand::Show => {
            let cfg = redacted(&config::load());
            let out = output::render_single(
                global.output,
                &cfg,
                |c| toml::to_string_pretty(c).unwrap_or_default(),
                |c| c.active_profile.clone().unwrap_or_default(),
            )?;
            output::print_output(&out, global.quiet);
            Ok(())
        }
    }
}
