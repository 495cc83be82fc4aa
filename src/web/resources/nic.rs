use crate::error::{Error, Result};
use crate::filter::{ensure_supported_pagination, parse_page, Filters};
use crate::model::Nic;
use crate::web::jsonapi::{self, Document};
use crate::web::{params_from, AppState};
use axum::extract::{Path, Query, State};
use axum::Json;
use serde_json::Value;

const KIND: &str = "nics";

pub(crate) fn nic_resource(nic: &Nic) -> Value {
    jsonapi::resource(
        KIND,
        &nic.mac_address,
        "mac_address",
        nic,
        jsonapi::relationships(vec![
            jsonapi::to_one("blades", "blades", nic.blade_serial.as_deref()),
            jsonapi::to_one("chassis", "chassis", nic.chassis_serial.as_deref()),
            jsonapi::to_one("discretes", "discretes", nic.discrete_serial.as_deref()),
        ]),
    )
}

pub async fn list(
    State(state): State<AppState>,
    pairs: Query<Vec<(String, String)>>,
) -> Result<Json<Document>> {
    let params = params_from(pairs);
    ensure_supported_pagination(&params)?;
    let page = parse_page(&params)?;
    let (filters, has_filters) = Filters::from_params(&params);
    if let Some(relation) = params.get("include").and_then(|v| v.first()) {
        return Err(Error::InvalidInclude(relation.clone()));
    }

    let mut count = 0_i64;
    let mut rows: Vec<Nic> = Vec::new();
    let mut handled = false;

    if has_filters {
        (count, rows) = state.nics.get_all_by_filters(page, &filters).await?;
        handled = true;
    }
    if let Some(serials) = params.get("bladesID") {
        (count, rows) = state.nics.get_all_by_blade_id(page, serials).await?;
        handled = true;
    }
    if let Some(serials) = params.get("chassisID") {
        (count, rows) = state.nics.get_all_by_chassis_id(page, serials).await?;
        handled = true;
    }
    if let Some(serials) = params.get("discretesID") {
        (count, rows) = state.nics.get_all_by_discrete_id(page, serials).await?;
        handled = true;
    }
    if !handled {
        (count, rows) = state.nics.get_all(page).await?;
    }

    Ok(Json(Document::many(
        rows.iter().map(nic_resource).collect(),
        count,
    )))
}

pub async fn get_one(
    State(state): State<AppState>,
    Path(mac_address): Path<String>,
) -> Result<Json<Document>> {
    let nic = state.nics.get_one(&mac_address).await?;
    Ok(Json(Document::one(nic_resource(&nic))))
}
