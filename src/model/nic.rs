use super::{field, FieldDef, FieldKind};
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};

/// A network card. Belongs to exactly one of blade, chassis or discrete;
/// whichever owner serial is non-null discriminates.
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
#[diesel(table_name = crate::schema::nic, primary_key(mac_address))]
#[diesel(treat_none_as_null = true)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct Nic {
    pub mac_address: String,
    pub name: String,
    pub speed: String,
    pub up: bool,
    #[serde(skip_serializing)]
    pub blade_serial: Option<String>,
    #[serde(skip_serializing)]
    pub chassis_serial: Option<String>,
    #[serde(skip_serializing)]
    pub discrete_serial: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl Default for Nic {
    fn default() -> Self {
        Nic {
            mac_address: String::new(),
            name: String::new(),
            speed: String::new(),
            up: false,
            blade_serial: None,
            chassis_serial: None,
            discrete_serial: None,
            updated_at: DateTime::UNIX_EPOCH,
        }
    }
}

impl Nic {
    pub const FILTERABLE: &'static [FieldDef] = &[
        field("mac_address", FieldKind::Text),
        field("name", FieldKind::Text),
        field("speed", FieldKind::Text),
        field("up", FieldKind::Bool),
    ];

    pub fn diff(&self, other: &Nic) -> Vec<&'static str> {
        diff_fields!(
            self,
            other,
            [
                mac_address,
                name,
                speed,
                up,
                blade_serial,
                chassis_serial,
                discrete_serial,
            ]
        )
    }
}
