use crate::error::{Error, Result};
use crate::filter::{ensure_supported_pagination, parse_page, Filters};
use crate::model::{Discrete, DiscreteSnapshot};
use crate::web::jsonapi::{self, Document};
use crate::web::{params_from, AppState};
use axum::extract::{Path, Query, State};
use axum::Json;
use serde_json::Value;

const KIND: &str = "discretes";
const INCLUDES: &[&str] = &["nics", "disks", "psus", "fans"];

fn discrete_resource(discrete: &Discrete) -> Value {
    jsonapi::resource(
        KIND,
        &discrete.serial,
        "serial",
        discrete,
        jsonapi::relationships(vec![]),
    )
}

fn snapshot_resource(snapshot: &DiscreteSnapshot, include: &[String]) -> (Value, Vec<Value>) {
    let mut parts = Vec::new();
    let mut included = Vec::new();
    let wants = |name: &str| include.iter().any(|r| r == name);

    if wants("nics") {
        let macs: Vec<String> = snapshot.nics.iter().map(|n| n.mac_address.clone()).collect();
        parts.push(jsonapi::to_many("nics", "nics", &macs));
        included.extend(snapshot.nics.iter().map(super::nic::nic_resource));
    }
    if wants("disks") {
        let serials: Vec<String> = snapshot.disks.iter().map(|d| d.serial.clone()).collect();
        parts.push(jsonapi::to_many("disks", "disks", &serials));
        included.extend(snapshot.disks.iter().map(super::disk::disk_resource));
    }
    if wants("psus") {
        let serials: Vec<String> = snapshot.psus.iter().map(|p| p.serial.clone()).collect();
        parts.push(jsonapi::to_many("psus", "psus", &serials));
        included.extend(snapshot.psus.iter().map(super::psu::psu_resource));
    }
    if wants("fans") {
        let serials: Vec<String> = snapshot.fans.iter().map(|f| f.serial.clone()).collect();
        parts.push(jsonapi::to_many("fans", "fans", &serials));
        included.extend(snapshot.fans.iter().map(super::fan::fan_resource));
    }

    let resource = jsonapi::resource(
        KIND,
        &snapshot.discrete.serial,
        "serial",
        &snapshot.discrete,
        jsonapi::relationships(parts),
    );
    (resource, included)
}

pub async fn list(
    State(state): State<AppState>,
    pairs: Query<Vec<(String, String)>>,
) -> Result<Json<Document>> {
    let params = params_from(pairs);
    ensure_supported_pagination(&params)?;
    let page = parse_page(&params)?;
    let (filters, has_filters) = Filters::from_params(&params);

    let include: Vec<String> = params.get("include").map(<[String]>::to_vec).unwrap_or_default();
    for relation in &include {
        if !INCLUDES.contains(&relation.as_str()) {
            return Err(Error::InvalidInclude(relation.clone()));
        }
    }
    let has_include = !include.is_empty();

    let mut count = 0_i64;
    let mut rows: Vec<Discrete> = Vec::new();
    let mut snapshots: Vec<DiscreteSnapshot> = Vec::new();

    if has_filters {
        (count, rows) = state.discretes.get_all_by_filters(page, &filters).await?;
    }

    if has_include {
        if rows.is_empty() && !has_filters {
            (count, snapshots) = state
                .discretes
                .get_all_with_associations(page, &include)
                .await?;
        } else {
            for row in &rows {
                snapshots.push(state.discretes.get_one(&row.serial).await?);
            }
        }
    }

    let mut has_selector = false;
    if let Some(macs) = params.get("nicsID") {
        (count, rows) = state.discretes.get_all_by_nics_id(page, macs).await?;
        has_selector = true;
    }
    if let Some(serials) = params.get("disksID") {
        (count, rows) = state.discretes.get_all_by_disks_id(page, serials).await?;
        has_selector = true;
    }

    if !has_filters && !has_include && !has_selector {
        (count, rows) = state.discretes.get_all(page).await?;
    }

    if has_include && !has_selector {
        let mut resources = Vec::with_capacity(snapshots.len());
        let mut included = Vec::new();
        for snapshot in &snapshots {
            let (resource, children) = snapshot_resource(snapshot, &include);
            resources.push(resource);
            included.extend(children);
        }
        return Ok(Json(Document::many(resources, count).with_included(included)));
    }

    let resources = rows.iter().map(discrete_resource).collect();
    Ok(Json(Document::many(resources, count)))
}

pub async fn get_one(
    State(state): State<AppState>,
    Path(serial): Path<String>,
) -> Result<Json<Document>> {
    let snapshot = state.discretes.get_one(&serial).await?;
    let include: Vec<String> = INCLUDES.iter().map(|s| s.to_string()).collect();
    let (resource, included) = snapshot_resource(&snapshot, &include);
    Ok(Json(Document::one(resource).with_included(included)))
}
