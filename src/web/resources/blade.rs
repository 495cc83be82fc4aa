use crate::error::{Error, Result};
use crate::filter::{ensure_supported_pagination, parse_page, Filters};
use crate::model::{Blade, BladeSnapshot};
use crate::web::jsonapi::{self, Document};
use crate::web::{params_from, AppState};
use axum::extract::{Path, Query, State};
use axum::Json;
use serde_json::Value;

const KIND: &str = "blades";
const INCLUDES: &[&str] = &["nics", "disks"];

pub(crate) fn blade_resource(blade: &Blade) -> Value {
    jsonapi::resource(
        KIND,
        &blade.serial,
        "serial",
        blade,
        jsonapi::relationships(vec![jsonapi::to_one(
            "chassis",
            "chassis",
            blade.chassis_serial.as_deref(),
        )]),
    )
}

fn snapshot_resource(snapshot: &BladeSnapshot, include: &[String]) -> (Value, Vec<Value>) {
    let mut parts = vec![jsonapi::to_one(
        "chassis",
        "chassis",
        snapshot.blade.chassis_serial.as_deref(),
    )];
    let mut included = Vec::new();

    if include.iter().any(|r| r == "nics") {
        let macs: Vec<String> = snapshot.nics.iter().map(|n| n.mac_address.clone()).collect();
        parts.push(jsonapi::to_many("nics", "nics", &macs));
        included.extend(snapshot.nics.iter().map(super::nic::nic_resource));
    }
    if include.iter().any(|r| r == "disks") {
        let serials: Vec<String> = snapshot.disks.iter().map(|d| d.serial.clone()).collect();
        parts.push(jsonapi::to_many("disks", "disks", &serials));
        included.extend(snapshot.disks.iter().map(super::disk::disk_resource));
    }

    let resource = jsonapi::resource(
        KIND,
        &snapshot.blade.serial,
        "serial",
        &snapshot.blade,
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
    let mut rows: Vec<Blade> = Vec::new();
    let mut snapshots: Vec<BladeSnapshot> = Vec::new();

    if has_filters {
        (count, rows) = state.blades.get_all_by_filters(page, &filters).await?;
    }

    if has_include {
        if rows.is_empty() && !has_filters {
            (count, snapshots) = state.blades.get_all_with_associations(page, &include).await?;
        } else {
            for row in &rows {
                snapshots.push(state.blades.get_one(&row.serial).await?);
            }
        }
    }

    let mut has_selector = false;
    if let Some(serials) = params.get("chassisID") {
        (count, rows) = state.blades.get_all_by_chassis_id(page, serials).await?;
        has_selector = true;
    }
    if let Some(macs) = params.get("nicsID") {
        (count, rows) = state.blades.get_all_by_nics_id(page, macs).await?;
        has_selector = true;
    }
    if let Some(serials) = params.get("disksID") {
        (count, rows) = state.blades.get_all_by_disks_id(page, serials).await?;
        has_selector = true;
    }
    if let Some(serials) = params.get("storage_bladesID") {
        (count, rows) = state
            .blades
            .get_all_by_storage_blades_id(page, serials)
            .await?;
        has_selector = true;
    }

    if !has_filters && !has_include && !has_selector {
        (count, rows) = state.blades.get_all(page).await?;
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

    let resources = rows.iter().map(blade_resource).collect();
    Ok(Json(Document::many(resources, count)))
}

pub async fn get_one(
    State(state): State<AppState>,
    Path(serial): Path<String>,
) -> Result<Json<Document>> {
    let snapshot = state.blades.get_one(&serial).await?;
    let include = [String::from("nics"), String::from("disks")];
    let (resource, included) = snapshot_resource(&snapshot, &include);
    Ok(Json(Document::one(resource).with_included(included)))
}
