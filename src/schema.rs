//! Diesel schema. Natural keys only: serials and MAC addresses are the
//! primary keys, and children reference their owner by serial, never by a
//! surrogate id.

diesel::table! {
    chassis (serial) {
        serial -> Text,
        name -> Text,
        model -> Text,
        vendor -> Text,
        fw_version -> Text,
        status -> Text,
        power_kw -> Float8,
        temp_c -> Int4,
        power_supply_count -> Int4,
        pass_thru -> Text,
        bmc_auth -> Bool,
        bmc_web_reachable -> Bool,
        bmc_ssh_reachable -> Bool,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    blade (serial) {
        serial -> Text,
        name -> Text,
        model -> Text,
        vendor -> Text,
        bios_version -> Text,
        bmc_type -> Text,
        bmc_address -> Text,
        bmc_version -> Text,
        bmc_license_type -> Text,
        bmc_license_status -> Text,
        processor -> Text,
        processor_count -> Int4,
        processor_core_count -> Int4,
        processor_thread_count -> Int4,
        memory_gb -> Int4,
        status -> Text,
        power_kw -> Float8,
        temp_c -> Int4,
        blade_position -> Int4,
        chassis_serial -> Nullable<Text>,
        bmc_auth -> Bool,
        bmc_web_reachable -> Bool,
        bmc_ssh_reachable -> Bool,
        bmc_ipmi_reachable -> Bool,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    discrete (serial) {
        serial -> Text,
        name -> Text,
        model -> Text,
        vendor -> Text,
        bios_version -> Text,
        bmc_type -> Text,
        bmc_address -> Text,
        bmc_version -> Text,
        bmc_license_type -> Text,
        bmc_license_status -> Text,
        processor -> Text,
        processor_count -> Int4,
        processor_core_count -> Int4,
        processor_thread_count -> Int4,
        memory_gb -> Int4,
        status -> Text,
        power_kw -> Float8,
        temp_c -> Int4,
        bmc_auth -> Bool,
        bmc_web_reachable -> Bool,
        bmc_ssh_reachable -> Bool,
        bmc_ipmi_reachable -> Bool,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    nic (mac_address) {
        mac_address -> Text,
        name -> Text,
        speed -> Text,
        up -> Bool,
        blade_serial -> Nullable<Text>,
        chassis_serial -> Nullable<Text>,
        discrete_serial -> Nullable<Text>,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    disk (serial) {
        serial -> Text,
        disk_type -> Text,
        size -> Text,
        status -> Text,
        model -> Text,
        fw_version -> Text,
        location -> Text,
        blade_serial -> Nullable<Text>,
        discrete_serial -> Nullable<Text>,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    psu (serial) {
        serial -> Text,
        capacity_kw -> Float8,
        power_kw -> Float8,
        status -> Text,
        part_number -> Text,
        chassis_serial -> Nullable<Text>,
        discrete_serial -> Nullable<Text>,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    fan (serial) {
        serial -> Text,
        status -> Text,
        position -> Int4,
        model -> Text,
        chassis_serial -> Nullable<Text>,
        discrete_serial -> Nullable<Text>,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    storage_blade (serial) {
        serial -> Text,
        name -> Text,
        model -> Text,
        vendor -> Text,
        fw_version -> Text,
        status -> Text,
        power_kw -> Float8,
        temp_c -> Int4,
        blade_position -> Int4,
        blade_serial -> Nullable<Text>,
        chassis_serial -> Nullable<Text>,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    scanned_port (ip, port, protocol) {
        ip -> Text,
        port -> Int4,
        protocol -> Text,
        state -> Text,
        scanned_by -> Text,
        updated_at -> Timestamptz,
    }
}

diesel::allow_tables_to_appear_in_same_query!(
    chassis,
    blade,
    discrete,
    nic,
    disk,
    psu,
    fan,
    storage_blade,
    scanned_port,
);
