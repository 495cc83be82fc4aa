use crate::error::{Error, Result};
use crate::filter::{ensure_supported_pagination, parse_page, Filters};
use crate::model::ScannedPort;
use crate::web::jsonapi::{self, Document};
use crate::web::{params_from, AppState};
use axum::extract::{Path, Query, State};
use axum::Json;
use serde_json::Value;

const KIND: &str = "scanned_ports";

fn scanned_port_resource(port: &ScannedPort) -> Value {
    jsonapi::resource(KIND, &port.id(), "id", port, jsonapi::relationships(vec![]))
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

    let (count, rows) = if has_filters {
        state
            .scanned_ports
            .get_all_by_filters(page, &filters)
            .await?
    } else {
        state.scanned_ports.get_all(page).await?
    };

    Ok(Json(Document::many(
        rows.iter().map(scanned_port_resource).collect(),
        count,
    )))
}

pub async fn get_one(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Document>> {
    let port = state.scanned_ports.get_one(&id).await?;
    Ok(Json(Document::one(scanned_port_resource(&port))))
}
