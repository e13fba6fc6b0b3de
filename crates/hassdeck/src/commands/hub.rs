//! Hub-level commands: info, services, ping.

use serde::Serialize;
use serde_json::Value;
use tabled::Tabled;

use hassdeck_core::{HubConnection, HubInfo, ServiceCatalog};

use crate::cli::{GlobalOpts, ServicesArgs};
use crate::error::CliError;
use crate::output;

fn info_detail(info: &HubInfo) -> String {
    let mut lines = vec![
        format!("Location:   {}", info.location_name),
        format!("Version:    {}", info.version),
        format!("Time zone:  {}", info.time_zone),
        format!("State:      {}", info.state.as_deref().unwrap_or("-")),
        format!("Components: {}", info.components.len()),
    ];
    if !info.unit_system.is_empty() {
        let units: Vec<String> = info
            .unit_system
            .iter()
            .map(|(k, v)| format!("{k}={}", v.as_str().unwrap_or("?")))
            .collect();
        lines.push(format!("Units:      {}", units.join(", ")));
    }
    lines.join("\n")
}

pub async fn info(connection: &HubConnection, global: &GlobalOpts) -> Result<(), CliError> {
    let info = connection.get_config().await?;
    let out = output::render_single(global.output, &info, info_detail, |i| i.version.clone())?;
    output::print_output(&out, global.quiet);
    Ok(())
}

// ── Services ────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct ServiceListing {
    domain: String,
    service: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<String>,
}

#[derive(Tabled)]
struct ServiceRow {
    #[tabled(rename = "Service")]
    service: String,
    #[tabled(rename = "Description")]
    description: String,
}

fn flatten(catalog: ServiceCatalog, domain: Option<&str>) -> Vec<ServiceListing> {
    catalog
        .into_iter()
        .filter(|(d, _)| domain.is_none_or(|wanted| d == wanted))
        .flat_map(|(domain, services)| {
            services.into_iter().map(move |(service, spec)| ServiceListing {
                domain: domain.clone(),
                service,
                description: spec
                    .get("description")
                    .or_else(|| spec.get("name"))
                    .and_then(Value::as_str)
                    .map(ToOwned::to_owned),
            })
        })
        .collect()
}

pub async fn services(
    connection: &HubConnection,
    args: ServicesArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let catalog = connection.get_services().await?;
    let listings = flatten(catalog, args.domain.as_deref());
    let out = output::render_list(
        global.output,
        &listings,
        |l| ServiceRow {
            service: format!("{}.{}", l.domain, l.service),
            description: l.description.clone().unwrap_or_default(),
        },
        |l| format!("{}.{}", l.domain, l.service),
    )?;
    output::print_output(&out, global.quiet);
    Ok(())
}

// ── Ping ────────────────────────────────────────────────────────────

pub async fn ping(connection: &HubConnection, global: &GlobalOpts) -> Result<(), CliError> {
    let rtt = connection.ping().await?;
    let millis = rtt.as_secs_f64() * 1000.0;
    let out = output::render_single(
        global.output,
        &serde_json::json!({ "url": connection.url().as_str(), "rtt_ms": millis }),
        |_| format!("pong from {} in {millis:.1} ms", connection.url()),
        |_| format!("{millis:.1}"),
    )?;
    output::print_output(&out, global.quiet);
    Ok(())
}
