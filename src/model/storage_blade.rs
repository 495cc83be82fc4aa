use super::{field, FieldDef, FieldKind};
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};

/// A storage expansion blade. Lives in a chassis slot; `blade_serial`
/// points at the compute blade it extends, when the chassis exposes that.
#[derive(
    Debug,
    Clone,
    PartialEq,
    Queryable,
    Selectable,
    Identifiable,
    Insertable,
    AsChangeset,
    Serialize,
    Deserialize,
)]
#[diesel(table_name = crate::schema::storage_blade, primary_key(serial))]
#[diesel(treat_none_as_null = true)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct StorageBlade {
    pub serial: String,
    pub name: String,
    pub model: String,
    pub vendor: String,
    pub fw_version: String,
    pub status: String,
    pub power_kw: f64,
    pub temp_c: i32,
    pub blade_position: i32,
    #[serde(skip_serializing)]
    pub blade_serial: Option<String>,
    #[serde(skip_serializing)]
    pub chassis_serial: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl Default for StorageBlade {
    fn default() -> Self {
        StorageBlade {
            serial: String::new(),
            name: String::new(),
            model: String::new(),
            vendor: String::new(),
            fw_version: String::new(),
            status: String::new(),
            power_kw: 0.0,
            temp_c: 0,
            blade_position: 0,
            blade_serial: None,
            chassis_serial: None,
            updated_at: DateTime::UNIX_EPOCH,
        }
    }
}

impl StorageBlade {
    pub const FILTERABLE: &'static [FieldDef] = &[
        field("serial", FieldKind::Text),
        field("name", FieldKind::Text),
        field("model", FieldKind::Text),
        field("vendor", FieldKind::Text),
        field("fw_version", FieldKind::Text),
        field("status", FieldKind::Text),
        field("power_kw", FieldKind::Float),
        field("temp_c", FieldKind::Int),
        field("blade_position", FieldKind::Int),
    ];

    pub fn diff(&self, other: &StorageBlade) -> Vec<&'static str> {
        diff_fields!(
            self,
            other,
            [
                serial,
                name,
                model,
                vendor,
                fw_version,
                status,
                power_kw,
                temp_c,
                blade_position,
                blade_serial,
                chassis_serial,
            ]
        )
    }
}
