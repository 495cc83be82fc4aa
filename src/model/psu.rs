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
#[diesel(table_name = crate::schema::psu, primary_key(serial))]
#[diesel(treat_none_as_null = true)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct Psu {
    pub serial: String,
    pub capacity_kw: f64,
    pub power_kw: f64,
    pub status: String,
    pub part_number: String,
    #[serde(skip_serializing)]
    pub chassis_serial: Option<String>,
    #[serde(skip_serializing)]
    pub discrete_serial: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl Default for Psu {
    fn default() -> Self {
        Psu {
            serial: String::new(),
            capacity_kw: 0.0,
            power_kw: 0.0,
            status: String::new(),
            part_number: String::new(),
            chassis_serial: None,
            discrete_serial: None,
            updated_at: DateTime::UNIX_EPOCH,
        }
    }
}

impl Psu {
    pub const FILTERABLE: &'static [FieldDef] = &[
        field("serial", FieldKind::Text),
        field("capacity_kw", FieldKind::Float),
        field("power_kw", FieldKind::Float),
        field("status", FieldKind::Text),
        field("part_number", FieldKind::Text),
    ];

    pub fn diff(&self, other: &Psu) -> Vec<&'static str> {
        diff_fields!(
            self,
            other,
            [
                serial,
                capacity_kw,
                power_kw,
                status,
                part_number,
                chassis_serial,
                discrete_serial,
            ]
        )
    }
}
