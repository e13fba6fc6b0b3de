//! Area, device, and entity registry listings.

use std::collections::HashMap;

use serde::Serialize;
use tabled::Tabled;

use hassdeck_core::{
    AdminClient, Area, Device, EntityMapping, HubConnection, RegistryEntity, fetch_or_default,
};

use crate::cli::{EntitiesArgs, GlobalOpts};
use crate::error::CliError;
use crate::output;

use super::util;

// ── Table rows ──────────────────────────────────────────────────────

#[derive(Tabled)]
struct AreaRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Floor")]
    floor: String,
}

impl From<&Area> for AreaRow {
    fn from(a: &Area) -> Self {
        Self {
            id: a.id.clone(),
            name: a.name.clone(),
            floor: a.floor_id.clone().unwrap_or_default(),
        }
    }
}

#[derive(Tabled)]
struct DeviceRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Area")]
    area: String,
    #[tabled(rename = "Manufacturer")]
    manufacturer: String,
    #[tabled(rename = "Model")]
    model: String,
}

impl From<&Device> for DeviceRow {
    fn from(d: &Device) -> Self {
        Self {
            id: d.id.clone(),
            name: d.name.clone(),
            area: d.area_id.clone().unwrap_or_default(),
            manufacturer: d.manufacturer.clone().unwrap_or_default(),
            model: d.model.clone().unwrap_or_default(),
        }
    }
}

/// Registry entity joined with its effective area and admin room mapping.
#[derive(Debug, Serialize)]
struct EntityListing {
    #[serde(flatten)]
    entity: RegistryEntity,
    area: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    room: Option<String>,
}

#[derive(Tabled)]
struct EntityRow {
    #[tabled(rename = "Entity")]
    entity_id: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Area")]
    area: String,
    #[tabled(rename = "Room")]
    room: String,
    #[tabled(rename = "Platform")]
    platform: String,
    #[tabled(rename = "Status")]
    status: String,
}

impl From<&EntityListing> for EntityRow {
    fn from(l: &EntityListing) -> Self {
        let status = match (l.entity.disabled, l.entity.hidden) {
            (true, _) => "disabled",
            (false, true) => "hidden",
            (false, false) => "",
        };
        Self {
            entity_id: l.entity.entity_id.to_string(),
            name: l.entity.name.clone().unwrap_or_default(),
            area: l.area.clone().unwrap_or_default(),
            room: l.room.clone().unwrap_or_default(),
            platform: l.entity.platform.clone().unwrap_or_default(),
            status: status.into(),
        }
    }
}

// ── Handlers ────────────────────────────────────────────────────────

pub async fn areas(connection: &HubConnection, global: &GlobalOpts) -> Result<(), CliError> {
    let mut areas = connection.list_areas().await?;
    areas.sort_by(|a, b| a.name.cmp(&b.name));
    let out = output::render_list(
        global.output,
        &areas,
        |a| AreaRow::from(a),
        |a| a.id.clone(),
    )?;
    output::print_output(&out, global.quiet);
    Ok(())
}

pub async fn devices(connection: &HubConnection, global: &GlobalOpts) -> Result<(), CliError> {
    let mut devices = connection.list_devices().await?;
    devices.sort_by(|a, b| a.name.cmp(&b.name));
    let out = output::render_list(
        global.output,
        &devices,
        |d| DeviceRow::from(d),
        |d| d.id.clone(),
    )?;
    output::print_output(&out, global.quiet);
    Ok(())
}

pub async fn entities(
    connection: &HubConnection,
    admin: Option<&AdminClient>,
    args: EntitiesArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let entities = connection.list_entities().await?;
    let devices = connection.list_devices().await?;

    // Room mappings are decoration; a missing backend just leaves the
    // column empty.
    let mappings: Vec<EntityMapping> = match admin {
        Some(admin) => {
            let cancel = util::cancel_on_ctrl_c();
            fetch_or_default("mappings", admin.mappings(&cancel)).await
        }
        None => Vec::new(),
    };

    let listings = join(entities, &devices, &mappings, &args);
    let out = output::render_list(
        global.output,
        &listings,
        |l| EntityRow::from(l),
        |l| l.entity.entity_id.to_string(),
    )?;
    output::print_output(&out, global.quiet);
    Ok(())
}

fn join(
    entities: Vec<RegistryEntity>,
    devices: &[Device],
    mappings: &[EntityMapping],
    args: &EntitiesArgs,
) -> Vec<EntityListing> {
    let rooms: HashMap<&str, &str> = mappings
        .iter()
        .filter_map(|m| Some((m.entity_id.as_str(), m.room.as_deref()?)))
        .collect();

    let mut listings: Vec<EntityListing> = entities
        .into_iter()
        .filter(|e| args.all || !e.disabled)
        .filter(|e| {
            args.domain
                .as_deref()
                .is_none_or(|domain| e.entity_id.domain() == domain)
        })
        .map(|entity| {
            let area = entity.effective_area(devices).map(ToOwned::to_owned);
            let room = rooms
                .get(entity.entity_id.as_str())
                .map(|room| (*room).to_owned());
            EntityListing { entity, area, room }
        })
        .filter(|l| {
            args.area
                .as_deref()
                .is_none_or(|area| l.area.as_deref() == Some(area))
        })
        .collect();
    listings.sort_by(|a, b| a.entity.entity_id.cmp(&b.entity.entity_id));
    listings
}
