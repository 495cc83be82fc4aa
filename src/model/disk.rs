use super::{field, FieldDef, FieldKind};
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};

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
#[diesel(table_name = crate::schema::disk, primary_key(serial))]
#[diesel(treat_none_as_null = true)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct Disk {
    pub serial: String,
    pub disk_type: String,
    pub size: String,
    pub status: String,
    pub model: String,
    pub fw_version: String,
    pub location: String,
    #[serde(skip_serializing)]
    pub blade_serial: Option<String>,
    #[serde(skip_serializing)]
    pub discrete_serial: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl Default for Disk {
    fn default() -> Self {
        Disk {
            serial: String::new(),
            disk_type: String::new(),
            size: String::new(),
            status: String::new(),
            model: String::new(),
            fw_version: String::new(),
            location: String::new(),
            blade_serial: None,
            discrete_serial: None,
            updated_at: DateTime::UNIX_EPOCH,
        }
    }
}

impl Disk {
    pub const FILTERABLE: &'static [FieldDef] = &[
        field("serial", FieldKind::Text),
        field("disk_type", FieldKind::Text),
        field("size", FieldKind::Text),
        field("status", FieldKind::Text),
        field("model", FieldKind::Text),
        field("fw_version", FieldKind::Text),
        field("location", FieldKind::Text),
    ];

    pub fn diff(&self, other: &Disk) -> Vec<&'static str> {
        diff_fields!(
            self,
            other,
            [
                serial,
                disk_type,
                size,
                status,
                model,
                fw_version,
                location,
                blade_serial,
                discrete_serial,
            ]
        )
    }
}
