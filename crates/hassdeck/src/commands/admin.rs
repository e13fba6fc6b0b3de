//! Admin backend command handlers.

use tabled::Tabled;

use hassdeck_core::{AdminClient, EntityMapping};

use crate::cli::{AdminArgs, AdminCommand, GlobalOpts};
use crate::error::CliError;
use crate::output;

use super::util;

#[derive(Tabled)]
struct MappingRow {
    #[tabled(rename = "Entity")]
    entity_id: String,
    #[tabled(rename = "Room")]
    room: String,
    #[tabled(rename = "Label")]
    label: String,
}

impl From<&EntityMapping> for MappingRow {
    fn from(m: &EntityMapping) -> Self {
        Self {
            entity_id: m.entity_id.clone(),
            room: m.room.clone().unwrap_or_default(),
            label: m.label.clone().unwrap_or_default(),
        }
    }
}

fn pretty(value: &impl serde::Serialize) -> String {
    serde_json::to_string_pretty(value).unwrap_or_default()
}

pub async fn handle(
    admin: &AdminClient,
    args: AdminArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let cancel = util::cancel_on_ctrl_c();

    let out = match args.command {
        AdminCommand::Mappings => {
            let mappings = admin.mappings(&cancel).await?;
            output::render_list(
                global.output,
                &mappings,
                |m| MappingRow::from(m),
                |m| m.entity_id.clone(),
            )?
        }

        AdminCommand::Preferences => {
            let preferences = admin.preferences(&cancel).await?;
            output::render_single(global.output, &preferences, pretty, |p| {
                p.keys().cloned().collect::<Vec<_>>().join("\n")
            })?
        }

        AdminCommand::Stats => {
            let stats = admin.stats(&cancel).await?;
            output::render_single(global.output, &stats, pretty, pretty)?
        }

        AdminCommand::Camera { name: None, .. } => {
            let config = admin.camera_config(&cancel).await?;
            output::render_single(global.output, &config, pretty, pretty)?
        }

        AdminCommand::Camera {
            name: Some(name),
            events,
        } => {
            let camera = admin.camera();
            let urls = serde_json::json!({
                "camera": name,
                "live": camera.live_stream_url(&name)?.as_str(),
                "events": camera.events_url(&name, Some(events))?.as_str(),
            });
            output::render_single(
                global.output,
                &urls,
                |u| {
                    format!(
                        "Live:    {}\nEvents:  {}",
                        u["live"].as_str().unwrap_or_default(),
                        u["events"].as_str().unwrap_or_default()
                    )
                },
                |u| u["live"].as_str().unwrap_or_default().to_owned(),
            )?
        }
    };

    output::print_output(&out, global.quiet);
    Ok(())
}
