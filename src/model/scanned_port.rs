use super::{field, FieldDef, FieldKind};
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};

/// One row of the port-scan table. Produced by an external scanner; the
/// collector only ever reads it.
#[derive(
    Debug,
    Clone,
    PartialEq,
    Queryable,
    Selectable,
    Identifiable,
    Insertable,
    Serialize,
    Deserialize,
)]
#[diesel(table_name = crate::schema::scanned_port, primary_key(ip, port, protocol))]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct ScannedPort {
    pub ip: String,
    pub port: i32,
    pub protocol: String,
    pub state: String,
    pub scanned_by: String,
    pub updated_at: DateTime<Utc>,
}

impl Default for ScannedPort {
    fn default() -> Self {
        ScannedPort {
            ip: String::new(),
            port: 0,
            protocol: String::new(),
            state: String::new(),
            scanned_by: String::new(),
            updated_at: DateTime::UNIX_EPOCH,
        }
    }
}

impl ScannedPort {
    pub const FILTERABLE: &'static [FieldDef] = &[
        field("ip", FieldKind::Text),
        field("port", FieldKind::Int),
        field("protocol", FieldKind::Text),
        field("state", FieldKind::Text),
        field("scanned_by", FieldKind::Text),
    ];

    /// The JSON:API id of a scanned port is the composite key.
    pub fn id(&self) -> String {
        format!("{}-{}-{}", self.ip, self.port, self.protocol)
    }
}
