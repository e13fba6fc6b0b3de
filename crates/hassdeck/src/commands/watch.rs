//! `watch`: print state changes as they arrive, until Ctrl-C.

use std::io::Write;

use serde_json::json;
use tokio::sync::mpsc;

use hassdeck_core::{
    ConnectionState, EntityId, EntityState, HubConnection, HubEvent, StateChangedEvent,
};

use crate::cli::{GlobalOpts, OutputFormat, WatchArgs};
use crate::error::CliError;
use crate::output;

use super::util;

struct Filter {
    domain: Option<String>,
    entities: Vec<EntityId>,
}

impl Filter {
    fn from_args(args: &WatchArgs) -> Result<Self, CliError> {
        let entities = args
            .entity
            .iter()
            .map(|raw| util::parse_entity_id(raw))
            .collect::<Result<_, _>>()?;
        Ok(Self {
            domain: args.domain.clone(),
            entities,
        })
    }

    fn matches(&self, change: &StateChangedEvent) -> bool {
        if let Some(ref domain) = self.domain {
            if change.entity_id.domain() != domain {
                return false;
            }
        }
        self.entities.is_empty() || self.entities.contains(&change.entity_id)
    }
}

fn state_of(state: Option<&EntityState>) -> &str {
    state.map_or("(removed)", |s| s.state.as_str())
}

/// One line (or document) for `change` in the chosen format.
fn format_change(
    change: &StateChangedEvent,
    format: OutputFormat,
    color: bool,
) -> Result<String, CliError> {
    let old = state_of(change.old_state.as_ref());
    let new = state_of(change.new_state.as_ref());
    let out = match format {
        OutputFormat::Table => format!(
            "{}  {:<40} {} → {}",
            util::local_time(change.time_fired),
            change.entity_id.as_str(),
            output::paint_state(old, color),
            output::paint_state(new, color),
        ),
        OutputFormat::Plain => format!("{} {new}", change.entity_id),
        // One JSON document per line
        OutputFormat::Json | OutputFormat::JsonCompact | OutputFormat::Yaml => {
            let doc = json!({
                "entity_id": change.entity_id,
                "old_state": change.old_state,
                "new_state": change.new_state,
                "time_fired": change.time_fired,
            });
            if format == OutputFormat::Yaml {
                format!("---\n{}", serde_yaml::to_string(&doc)?)
            } else {
                output::render_json(&doc, true)?
            }
        }
    };
    Ok(out)
}

pub async fn handle(
    connection: &HubConnection,
    args: WatchArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let filter = Filter::from_args(&args)?;
    let color = output::should_color(global.color);

    let (event_tx, mut events) = mpsc::unbounded_channel();
    let _subscription = connection.subscribe(move |event| {
        let _ = event_tx.send(event.clone());
    });
    let mut state = connection.state_changes();

    if !global.quiet {
        eprintln!("Watching state changes (Ctrl-C to stop)");
    }

    let mut stdout = std::io::stdout();
    loop {
        tokio::select! {
            biased;

            _ = tokio::signal::ctrl_c() => break,

            event = events.recv() => match event {
                Some(HubEvent::StateChanged(change)) if filter.matches(&change) => {
                    let line = format_change(&change, global.output, color)?;
                    writeln!(stdout, "{line}")?;
                    stdout.flush()?;
                }
                Some(HubEvent::Disconnected) if !global.quiet => {
                    eprintln!("Connection lost, reconnecting...");
                }
                Some(HubEvent::Connected) if !global.quiet => eprintln!("Reconnected"),
                Some(_) => {}
                None => break,
            },

            changed = state.changed() => {
                if changed.is_err() {
                    break;
                }
                // Settled in Disconnected means the hub refused us or the
                // retries ran out.
                if *state.borrow_and_update() == ConnectionState::Disconnected {
                    return Err(connection.failure().into());
                }
            }
        }
    }
    Ok(())
}
