use crate::constant::{
    CAPABILITIES_ALWAYS_DISABLED, CAPABILITIES_ALWAYS_ENABLED, CAPABILITIES_CONFIGURABLE,
    CAPABILITIES_REQUIRED, CapabilityFlags, ColumnType,
};

#[test]
fn test_capability_flags_classification() {
    const ALL_FLAGS: u32 = 0xFFFFFFFF;

    let always_enabled = CAPABILITIES_ALWAYS_ENABLED;
    let configurable = CAPABILITIES_CONFIGURABLE;
    let always_disabled = CAPABILITIES_ALWAYS_DISABLED;

    assert!(
        always_enabled.intersection(configurable).is_empty(),
        "ALWAYS_ENABLED and CONFIGURABLE must not overlap"
    );
    assert!(
        always_enabled.intersection(always_disabled).is_empty(),
        "ALWAYS_ENABLED and ALWAYS_DISABLED must not overlap"
    );
    assert!(
        configurable.intersection(always_disabled).is_empty(),
        "CONFIGURABLE and ALWAYS_DISABLED must not overlap"
    );

    let union = always_enabled | configurable | always_disabled;
    assert_eq!(
        union.bits(),
        ALL_FLAGS,
        "Missing flags: 0x{:08X}",
        ALL_FLAGS & !union.bits()
    );
}

#[test]
fn test_required_capabilities_are_always_requested() {
    assert!(CAPABILITIES_ALWAYS_ENABLED.contains(CAPABILITIES_REQUIRED));
    assert!(CAPABILITIES_REQUIRED.contains(CapabilityFlags::CLIENT_PROTOCOL_41));
    assert!(CAPABILITIES_REQUIRED.contains(CapabilityFlags::CLIENT_SECURE_CONNECTION));
    assert!(CAPABILITIES_ALWAYS_DISABLED.contains(CapabilityFlags::CLIENT_COMPRESS));
    assert!(CAPABILITIES_ALWAYS_DISABLED.contains(CapabilityFlags::CLIENT_LOCAL_FILES));
}

#[test]
fn test_column_type_from_u8() {
    assert_eq!(
        ColumnType::from_u8(0xf6),
        Some(ColumnType::MYSQL_TYPE_NEWDECIMAL)
    );
    assert_eq!(ColumnType::from_u8(0x08), Some(ColumnType::MYSQL_TYPE_LONGLONG));
    assert_eq!(ColumnType::from_u8(0x20), None);
}
