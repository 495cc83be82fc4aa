use super::{field, Fan, FieldDef, FieldKind, Nic, Psu, StorageBlade};
use crate::model::BladeSnapshot;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};

/// A rack enclosure with a shared management controller.
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
#[diesel(table_name = crate::schema::chassis, primary_key(serial))]
#[diesel(treat_none_as_null = true)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct Chassis {
    pub serial: String,
    pub name: String,
    pub model: String,
    pub vendor: String,
    pub fw_version: String,
    pub status: String,
    pub power_kw: f64,
    pub temp_c: i32,
    pub power_supply_count: i32,
    pub pass_thru: String,
    pub bmc_auth: bool,
    pub bmc_web_reachable: bool,
    pub bmc_ssh_reachable: bool,
    pub updated_at: DateTime<Utc>,
}

impl Default for Chassis {
    fn default() -> Self {
        Chassis {
            serial: String::new(),
            name: String::new(),
            model: String::new(),
            vendor: String::new(),
            fw_version: String::new(),
            status: String::new(),
            power_kw: 0.0,
            temp_c: 0,
            power_supply_count: 0,
            pass_thru: String::new(),
            bmc_auth: false,
            bmc_web_reachable: false,
            bmc_ssh_reachable: false,
            updated_at: DateTime::UNIX_EPOCH,
        }
    }
}

impl Chassis {
    pub const FILTERABLE: &'static [FieldDef] = &[
        field("serial", FieldKind::Text),
        field("name", FieldKind::Text),
        field("model", FieldKind::Text),
        field("vendor", FieldKind::Text),
        field("fw_version", FieldKind::Text),
        field("status", FieldKind::Text),
        field("power_kw", FieldKind::Float),
        field("temp_c", FieldKind::Int),
        field("power_supply_count", FieldKind::Int),
        field("pass_thru", FieldKind::Text),
        field("bmc_auth", FieldKind::Bool),
        field("bmc_web_reachable", FieldKind::Bool),
        field("bmc_ssh_reachable", FieldKind::Bool),
    ];

    pub fn diff(&self, other: &Chassis) -> Vec<&'static str> {
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
                power_supply_count,
                pass_thru,
                bmc_auth,
                bmc_web_reachable,
                bmc_ssh_reachable,
            ]
        )
    }
}

/// One collection cycle's view of a chassis and everything it hosts.
#[derive(Debug, Clone, Default)]
pub struct ChassisSnapshot {
    pub chassis: Chassis,
    pub blades: Vec<BladeSnapshot>,
    pub storage_blades: Vec<StorageBlade>,
    pub nics: Vec<Nic>,
    pub psus: Vec<Psu>,
    pub fans: Vec<Fan>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn diff_reports_changed_fields_only() {
        let mut a = Chassis {
            serial: "cz1234".into(),
            status: "OK".into(),
            ..Chassis::default()
        };
        let b = a.clone();
        assert!(a.diff(&b).is_empty());

        a.status = "Degraded".into();
        a.power_kw = 3.2;
        assert_eq!(a.diff(&b), vec!["status", "power_kw"]);
    }

    #[test]
    fn diff_ignores_updated_at() {
        let a = Chassis::default();
        let mut b = a.clone();
        b.updated_at = Utc::now();
        assert!(a.diff(&b).is_empty());
    }
}
