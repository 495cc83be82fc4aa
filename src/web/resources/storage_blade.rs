use crate::error::{Error, Result};
use crate::filter::{ensure_supported_pagination, parse_page, Filters};
use crate::model::StorageBlade;
use crate::web::jsonapi::{self, Document};
use crate::web::{params_from, AppState};
use axum::extract::{Path, Query, State};
use axum::Json;
use serde_json::Value;

const KIND: &str = "storage_blades";

pub(crate) fn storage_blade_resource(storage_blade: &StorageBlade) -> Value {
    jsonapi::resource(
        KIND,
        &storage_blade.serial,
        "serial",
        storage_blade,
        jsonapi::relationships(vec![
            jsonapi::to_one("chassis", "chassis", storage_blade.chassis_serial.as_deref()),
            jsonapi::to_one("blades", "blades", storage_blade.blade_serial.as_deref()),
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
    let mut rows: Vec<StorageBlade> = Vec::new();
    let mut handled = false;

    if has_filters {
        (count, rows) = state
            .storage_blades
            .get_all_by_filters(page, &filters)
            .await?;
        handled = true;
    }
    if let Some(serials) = params.get("chassisID") {
        (count, rows) = state
            .storage_blades
            .get_all_by_chassis_id(page, serials)
            .await?;
        handled = true;
    }
    if !handled {
        (count, rows) = state.storage_blades.get_all(page).await?;
    }

    Ok(Json(Document::many(
        rows.iter().map(storage_blade_resource).collect(),
        count,
    )))
}

pub async fn get_one(
    State(state): State<AppState>,
    Path(serial): Path<String>,
) -> Result<Json<Document>> {
    let storage_blade = state.storage_blades.get_one(&serial).await?;
    Ok(Json(Document::one(storage_blade_resource(&storage_blade))))
}
