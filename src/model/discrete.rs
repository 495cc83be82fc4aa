use super::{field, Disk, Fan, FieldDef, FieldKind, Nic, Psu};
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};

/// A stand-alone rackable server: same shape as a chassis-resident blade
/// but with no parent and its own PSUs and fans.
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
#[diesel(table_name = crate::schema::discrete, primary_key(serial))]
#[diesel(treat_none_as_null = true)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct Discrete {
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
    pub bmc_auth: bool,
    pub bmc_web_reachable: bool,
    pub bmc_ssh_reachable: bool,
    pub bmc_ipmi_reachable: bool,
    pub updated_at: DateTime<Utc>,
}

impl Default for Discrete {
    fn default() -> Self {
        Discrete {
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
            bmc_auth: false,
            bmc_web_reachable: false,
            bmc_ssh_reachable: false,
            bmc_ipmi_reachable: false,
            updated_at: DateTime::UNIX_EPOCH,
        }
    }
}

impl Discrete {
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
        field("bmc_auth", FieldKind::Bool),
        field("bmc_web_reachable", FieldKind::Bool),
        field("bmc_ssh_reachable", FieldKind::Bool),
        field("bmc_ipmi_reachable", FieldKind::Bool),
    ];

    pub fn diff(&self, other: &Discrete) -> Vec<&'static str> {
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
                bmc_auth,
                bmc_web_reachable,
                bmc_ssh_reachable,
                bmc_ipmi_reachable,
            ]
        )
    }

    pub fn merge_enrichment(&mut self, existing: &Discrete) {
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
    }
}

/// A discrete plus all the children its BMC enumerates.
#[derive(Debug, Clone, Default)]
pub struct DiscreteSnapshot {
    pub discrete: Discrete,
    pub nics: Vec<Nic>,
    pub disks: Vec<Disk>,
    pub psus: Vec<Psu>,
    pub fans: Vec<Fan>,
}
