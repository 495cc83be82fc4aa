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
#[diesel(table_name = crate::schema::fan, primary_key(serial))]
#[diesel(treat_none_as_null = true)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct Fan {
    pub serial: String,
    pub status: String,
    pub position: i32,
    pub model: String,
    #[serde(skip_serializing)]
    pub chassis_serial: Option<String>,
    #[serde(skip_serializing)]
    pub discrete_serial: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl Default for Fan {
    fn default() -> Self {
        Fan {
            serial: String::new(),
            status: String::new(),
            position: 0,
            model: String::new(),
            chassis_serial: None,
            discrete_serial: None,
            updated_at: DateTime::UNIX_EPOCH,
        }
    }
}

impl Fan {
    pub const FILTERABLE: &'static [FieldDef] = &[
        field("serial", FieldKind::Text),
        field("status", FieldKind::Text),
        field("position", FieldKind::Int),
        field("model", FieldKind::Text),
    ];

    pub fn diff(&self, other: &Fan) -> Vec<&'static str> {
        diff_fields!(
            self,
            other,
            [serial, status, position, model, chassis_serial, discrete_serial]
        )
    }
}
