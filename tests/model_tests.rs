//! Tests for the entity model: diff semantics, serial hygiene and the
//! enrichment merge used during chassis walks.

use chrono::Utc;
use dora::model::{normalize_serial, Blade, Chassis, Discrete, Nic, StorageBlade};

#[test]
fn every_sentinel_serial_is_rejected() {
    for raw in ["", "[unknown]", "0000000000", "_", "  ", "[Unknown]"] {
        assert!(normalize_serial(raw).is_err(), "{raw:?} must be rejected");
    }
}

#[test]
fn serials_are_normalized_before_use() {
    assert_eq!(normalize_serial("CHAS001").unwrap(), "chas001");
    assert_eq!(normalize_serial("  alpha12  ").unwrap(), "alpha12");
}

#[test]
fn identical_records_have_an_empty_diff() {
    let blade = Blade {
        serial: "alpha".into(),
        status: "OK".into(),
        memory_gb: 256,
        updated_at: Utc::now(),
        ..Blade::default()
    };
    let mut other = blade.clone();
    // only the timestamp moves between two stable snapshots
    other.updated_at = Utc::now();
    assert!(blade.diff(&other).is_empty());
}

#[test]
fn diff_names_exactly_the_changed_fields() {
    let before = Chassis {
        serial: "chas001".into(),
        status: "OK".into(),
        power_kw: 4.2,
        ..Chassis::default()
    };
    let mut after = before.clone();
    after.status = "Degraded".into();
    after.temp_c = 30;
    assert_eq!(after.diff(&before), vec!["status", "temp_c"]);
}

#[test]
fn diff_against_a_default_record_flags_a_new_arrival() {
    let storage_blade = StorageBlade {
        serial: "gamma".into(),
        status: "OK".into(),
        ..StorageBlade::default()
    };
    assert!(!storage_blade.diff(&StorageBlade::default()).is_empty());
}

#[test]
fn nic_ownership_changes_show_in_the_diff() {
    let before = Nic {
        mac_address: "aa:bb:cc:dd:ee:ff".into(),
        blade_serial: Some("alpha".into()),
        ..Nic::default()
    };
    let mut after = before.clone();
    after.blade_serial = None;
    after.chassis_serial = Some("chas001".into());
    assert_eq!(after.diff(&before), vec!["blade_serial", "chassis_serial"]);
}

#[test]
fn enrichment_merge_never_erases_evidence_with_zeroes() {
    let persisted = Discrete {
        serial: "mx1".into(),
        processor: "Intel Xeon".into(),
        processor_count: 2,
        memory_gb: 128,
        bios_version: "P89".into(),
        ..Discrete::default()
    };
    let mut fresh = Discrete {
        serial: "mx1".into(),
        power_kw: 0.3,
        temp_c: 21,
        ..Discrete::default()
    };
    fresh.merge_enrichment(&persisted);

    assert_eq!(fresh.processor, "Intel Xeon");
    assert_eq!(fresh.processor_count, 2);
    assert_eq!(fresh.memory_gb, 128);
    assert_eq!(fresh.bios_version, "P89");
    // measurements stay fresh
    assert_eq!(fresh.power_kw, 0.3);
    assert_eq!(fresh.temp_c, 21);
}

#[test]
fn blade_keeps_its_chassis_when_a_direct_collection_lacks_one() {
    let persisted = Blade {
        serial: "alpha".into(),
        chassis_serial: Some("chas001".into()),
        ..Blade::default()
    };
    let mut fresh = Blade {
        serial: "alpha".into(),
        ..Blade::default()
    };
    fresh.merge_enrichment(&persisted);
    assert_eq!(fresh.chassis_serial.as_deref(), Some("chas001"));
}
