use super::{field, Disk, FieldDef, FieldKind, Nic};
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};

/// A compute module in a chassis slot. `chassis_serial` is empty only in
/// pre-enumeration states, before any chassis walk claimed the blade.
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
#[diesel(table_name = crate::schema::blade, primary_key(serial))]
#[diesel(treat_none_as_null = true)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct Blade {
    pub serial: String,
    pub name: String,
    pub model: String,
    pub vendor: String,
    pub bios_version: String,
    pub bmc_type: String,
    pub bmc_address: String,
    pub bmc_version: String,
    pub bmc_license_type: String,
    pub bmc_license_status: String,
    pub processor: String,
    pub processor_count: i32,
    pub processor_core_count: i32,
    pub processor_thread_count: i32,
    pub memory_gb: i32,
    pub status: String,
    pub power_kw: f64,
    pub temp_c: i32,
    pub blade_position: i32,
    #[serde(skip_serializing)]
    pub chassis_serial: Option<String>,
    pub bmc_auth: bool,
    pub bmc_web_reachable: bool,
    pub bmc_ssh_reachable: bool,
    pub bmc_ipmi_reachable: bool,
    pub updated_at: DateTime<Utc>,
}

impl Default for Blade {
    fn default() -> Self {
        Blade {
            serial: String::new(),
            name: String::new(),
            model: String::new(),
            vendor: String::new(),
            bios_version: String::new(),
            bmc_type: String::new(),
            bmc_address: String::new(),
            bmc_version: String::new(),
            bmc_license_type: String::new(),
            bmc_license_status: String::new(),
            processor: String::new(),
            processor_count: 0,
            processor_core_count: 0,
            processor_thread_count: 0,
            memory_gb: 0,
            status: String::new(),
            power_kw: 0.0,
            temp_c: 0,
            blade_position: 0,
            chassis_serial: None,
            bmc_auth: false,
            bmc_web_reachable: false,
            bmc_ssh_reachable: false,
            bmc_ipmi_reachable: false,
            updated_at: DateTime::UNIX_EPOCH,
        }
    }
}

impl Blade {
    pub const FILTERABLE: &'static [FieldDef] = &[
        field("serial", FieldKind::Text),
        field("name", FieldKind::Text),
        field("model", FieldKind::Text),
        field("vendor", FieldKind::Text),
        field("bios_version", FieldKind::Text),
        field("bmc_type", FieldKind::Text),
        field("bmc_address", FieldKind::Text),
        field("bmc_version", FieldKind::Text),
        field("bmc_license_type", FieldKind::Text),
        field("bmc_license_status", FieldKind::Text),
        field("processor", FieldKind::Text),
        field("processor_count", FieldKind::Int),
        field("processor_core_count", FieldKind::Int),
        field("processor_thread_count", FieldKind::Int),
        field("memory_gb", FieldKind::Int),
        field("status", FieldKind::Text),
        field("power_kw", FieldKind::Float),
        field("temp_c", FieldKind::Int),
        field("blade_position", FieldKind::Int),
        field("bmc_auth", FieldKind::Bool),
        field("bmc_web_reachable", FieldKind::Bool),
        field("bmc_ssh_reachable", FieldKind::Bool),
        field("bmc_ipmi_reachable", FieldKind::Bool),
    ];

    pub fn diff(&self, other: &Blade) -> Vec<&'static str> {
        diff_fields!(
            self,
            other,
            [
                serial,
                name,
                model,
                vendor,
                bios_version,
                bmc_type,
                bmc_address,
                bmc_version,
                bmc_license_type,
                bmc_license_status,
                processor,
                processor_count,
                processor_core_count,
                processor_thread_count,
                memory_gb,
                status,
                power_kw,
                temp_c,
                blade_position,
                chassis_serial,
                bmc_auth,
                bmc_web_reachable,
                bmc_ssh_reachable,
                bmc_ipmi_reachable,
            ]
        )
    }

    /// Zero-valued enrichment fields mean "no evidence", not "gone": when a
    /// chassis walk could not reach the blade's own BMC, the fields only
    /// that session provides must not wipe what an earlier run persisted.
    pub fn merge_enrichment(&mut self, existing: &Blade) {
        if self.bmc_type.is_empty() {
            self.bmc_type = existing.bmc_type.clone();
        }
        if self.bmc_version.is_empty() {
            self.bmc_version = existing.bmc_version.clone();
        }
        if self.bmc_license_type.is_empty() {
            self.bmc_license_type = existing.bmc_license_type.clone();
        }
        if self.bmc_license_status.is_empty() {
            self.bmc_license_status = existing.bmc_license_status.clone();
        }
        if self.bios_version.is_empty() {
            self.bios_version = existing.bios_version.clone();
        }
        if self.processor.is_empty() {
            self.processor = existing.processor.clone();
        }
        if self.processor_count == 0 {
            self.processor_count = existing.processor_count;
        }
        if self.processor_core_count == 0 {
            self.processor_core_count = existing.processor_core_count;
        }
        if self.processor_thread_count == 0 {
            self.processor_thread_count = existing.processor_thread_count;
        }
        if self.memory_gb == 0 {
            self.memory_gb = existing.memory_gb;
        }
        if self.chassis_serial.is_none() {
            self.chassis_serial = existing.chassis_serial.clone();
        }
    }
}

/// A blade plus the children only its own BMC can enumerate.
#[derive(Debug, Clone, Default)]
pub struct BladeSnapshot {
    pub blade: Blade,
    pub nics: Vec<Nic>,
    pub disks: Vec<Disk>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_keeps_persisted_evidence() {
        let existing = Blade {
            serial: "alpha".into(),
            bmc_type: "iLO4".into(),
            memory_gb: 256,
            processor_count: 2,
            chassis_serial: Some("cz1".into()),
            ..Blade::default()
        };
        let mut fresh = Blade {
            serial: "alpha".into(),
            power_kw: 0.4,
            ..Blade::default()
        };
        fresh.merge_enrichment(&existing);
        assert_eq!(fresh.bmc_type, "iLO4");
        assert_eq!(fresh.memory_gb, 256);
        assert_eq!(fresh.processor_count, 2);
        assert_eq!(fresh.chassis_serial.as_deref(), Some("cz1"));
        // measured fields are never merged
        assert_eq!(fresh.power_kw, 0.4);
    }

    #[test]
    fn merge_prefers_fresh_evidence() {
        let existing = Blade {
            memory_gb: 128,
            ..Blade::default()
        };
        let mut fresh = Blade {
            memory_gb: 256,
            ..Blade::default()
        };
        fresh.merge_enrichment(&existing);
        assert_eq!(fresh.memory_gb, 256);
    }
}
