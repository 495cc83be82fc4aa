use crate::error::{Error, Result};
use crate::filter::{ensure_supported_pagination, parse_page, Filters};
use crate::model::Psu;
use crate::web::jsonapi::{self, Document};
use crate::web::{params_from, AppState};
use axum::extract::{Path, Query, State};
use axum::Json;
use serde_json::Value;

const KIND: &str = "psus";

pub(crate) fn psu_resource(psu: &Psu) -> Value {
    jsonapi::resource(
        KIND,
        &psu.serial,
        "serial",
        psu,
        jsonapi::relationships(vec![
            jsonapi::to_one("chassis", "chassis", psu.chassis_serial.as_deref()),
            jsonapi::to_one("discretes", "discretes", psu.discrete_serial.as_deref()),
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
    let mut rows: Vec<Psu> = Vec::new();
    let mut handled = false;

    if has_filters {
        (count, rows) = state.psus.get_all_by_filters(page, &filters).await?;
        handled = true;
    }
    if let Some(serials) = params.get("chassisID") {
        (count, rows) = state.psus.get_all_by_chassis_id(page, serials).await?;
        handled = true;
    }
    if let Some(serials) = params.get("discretesID") {
        (count, rows) = state.psus.get_all_by_discrete_id(page, serials).await?;
        handled = true;
    }
    if !handled {
        (count, rows) = state.psus.get_all(page).await?;
    }

    Ok(Json(Document::many(
        rows.iter().map(psu_resource).collect(),
        count,
    )))
}

pub async fn get_one(
    State(state): State<AppState>,
    Path(serial): Path<String>,
) -> Result<Json<Document>> {
    let psu = state.psus.get_one(&serial).await?;
    Ok(Json(Document::one(psu_resource(&psu))))
}
