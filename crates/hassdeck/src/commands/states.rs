//! Entity state and service call handlers.

use tabled::Tabled;

use hassdeck_core::{CoreError, EntityState, EntityStore, HubConnection, ServiceCall};

use crate::cli::{CallArgs, GlobalOpts, OutputFormat, StatesArgs};
use crate::error::CliError;
use crate::output;

use super::util;

// ── Table row ───────────────────────────────────────────────────────

#[derive(Tabled)]
struct StateRow {
    #[tabled(rename = "Entity")]
    entity_id: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "State")]
    state: String,
    #[tabled(rename = "Last changed")]
    changed: String,
}

impl From<&EntityState> for StateRow {
    fn from(s: &EntityState) -> Self {
        Self {
            entity_id: s.entity_id.to_string(),
            name: s.display_name().to_owned(),
            state: with_unit(s),
            changed: util::local_time(s.last_changed),
        }
    }
}

fn with_unit(s: &EntityState) -> String {
    match s.unit() {
        Some(unit) => format!("{} {unit}", s.state),
        None => s.state.clone(),
    }
}

fn detail(s: &EntityState) -> String {
    let mut lines = vec![
        format!("Entity:   {}", s.entity_id),
        format!("Name:     {}", s.display_name()),
        format!("State:    {}", with_unit(s)),
        format!("Changed:  {}", util::local_time(s.last_changed)),
        format!("Updated:  {}", util::local_time(s.last_updated)),
    ];
    if !s.attributes.is_empty() {
        lines.push("Attributes:".into());
        for (key, value) in &s.attributes {
            let value = value
                .as_str()
                .map_or_else(|| value.to_string(), ToOwned::to_owned);
            lines.push(format!("  {key}: {value}"));
        }
    }
    lines.join("\n")
}

// ── Handlers ────────────────────────────────────────────────────────

pub async fn list(
    connection: &HubConnection,
    args: StatesArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let mut states = connection.get_states().await?;
    if let Some(ref domain) = args.domain {
        states.retain(|s| s.domain() == domain);
    }
    states.sort_by(|a, b| a.entity_id.cmp(&b.entity_id));

    let out = output::render_list(
        global.output,
        &states,
        |s| StateRow::from(s),
        |s| s.entity_id.to_string(),
    )?;
    output::print_output(&out, global.quiet);
    Ok(())
}

pub async fn show(
    connection: &HubConnection,
    entity_id: &str,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let id = util::parse_entity_id(entity_id)?;
    let state = connection
        .get_states()
        .await?
        .into_iter()
        .find(|s| s.entity_id == id)
        .ok_or_else(|| CoreError::EntityNotFound {
            entity_id: id.to_string(),
        })?;

    let out = output::render_single(global.output, &state, detail, |s| s.state.clone())?;
    output::print_output(&out, global.quiet);
    Ok(())
}

pub async fn call(
    connection: &HubConnection,
    args: CallArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let mut service_call = ServiceCall::new(&args.domain, &args.service);
    for raw in &args.entity {
        service_call = service_call.with_entity(&util::parse_entity_id(raw)?);
    }
    if let Some(ref raw) = args.data {
        service_call = service_call.with_data(util::parse_json_object("data", raw)?);
    }

    // A single target gets its expected state reported alongside the result.
    let store = EntityStore::new();
    if let [entity_id] = service_call.target.entity_id.as_slice() {
        let entity_id = entity_id.clone();
        store.apply_snapshot(
            connection
                .get_states()
                .await?
                .into_iter()
                .filter(|s| s.entity_id.as_str() == entity_id)
                .collect(),
        );
    }
    let result = store.execute_optimistic(connection, service_call).await?;

    if global.output == OutputFormat::Table {
        if !global.quiet {
            match store.snapshot().first().filter(|s| s.optimistic) {
                Some(expected) => eprintln!(
                    "✓ Called {}.{} ({} → {})",
                    args.domain, args.service, expected.entity_id, expected.state
                ),
                None => eprintln!("✓ Called {}.{}", args.domain, args.service),
            }
        }
    } else {
        let out = output::render_single(global.output, &result, |_| String::new(), |_| {
            format!("{}.{}", args.domain, args.service)
        })?;
        output::print_output(&out, global.quiet);
    }
    Ok(())
}
