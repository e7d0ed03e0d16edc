// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::emulation_loop::EmulationLoop;
use yare::parameterized;

fn test_base() -> TileBase {
    let emulation = EmulationLoop::new();
    TileBase::new(11, "emudmo", emulation.handle())
}

fn reply_bytes(outcome: Result<RpcOutcome, RpcError>) -> Vec<u8> {
    match outcome {
        Ok(RpcOutcome::Reply(bytes)) => bytes,
        other => panic!("expected a reply, got {:?}", other),
    }
}

#[parameterized(
    u8_scalar = { "uint8_t", 1 },
    u16_scalar = { "uint16_t", 2 },
    u32_scalar = { "uint32_t", 4 },
    u8_array = { "uint8_t[16]", 16 },
    u32_array = { "uint32_t[4]", 16 },
)]
fn type_names_size_correctly(type_name: &str, total: u16) {
    let descriptor = ConfigDescriptor::new(0x8000, "v", type_name, None).unwrap();
    assert_eq!(descriptor.flags() & 0x7FFF, total);
}

#[test]
fn array_flag_lives_in_the_high_bit() {
    let scalar = ConfigDescriptor::new(0x8000, "v", "uint32_t", None).unwrap();
    assert_eq!(scalar.flags() & 0x8000, 0);

    let array = ConfigDescriptor::new(0x8000, "v", "uint8_t[8]", None).unwrap();
    assert_eq!(array.flags() & 0x8000, 0x8000);
}

#[test]
fn unknown_type_names_are_rejected() {
    assert!(ConfigDescriptor::new(0x8000, "v", "float", None).is_err());
    assert!(ConfigDescriptor::new(0x8000, "v", "uint8_t[", None).is_err());
}

#[test]
fn update_and_latch_scalar() {
    let mut descriptor = ConfigDescriptor::new(0x8000, "v", "uint32_t", None).unwrap();

    assert_eq!(descriptor.update_value(0, &0xCAFEBABEu32.to_le_bytes()), 0);
    assert_eq!(descriptor.latch().unwrap(), ConfigValue::Int(0xCAFEBABE));
}

#[test]
fn latch_sign_extends_signed_types() {
    let mut descriptor = ConfigDescriptor::new(0x8000, "v", "int16_t", None).unwrap();
    descriptor.update_value(0, &(-5i16).to_le_bytes());

    assert_eq!(descriptor.latch().unwrap(), ConfigValue::Int(-5));
}

#[test]
fn latch_byte_arrays_keeps_raw_bytes() {
    let mut descriptor = ConfigDescriptor::new(0x8001, "v", "uint8_t[4]", None).unwrap();
    descriptor.update_value(0, &[1, 2, 3]);

    // Partial trailing data is zero-padded to the unit boundary
    assert_eq!(descriptor.latch().unwrap(), ConfigValue::Bytes(vec![1, 2, 3]));
}

#[test]
fn overflow_writes_are_rejected() {
    let mut descriptor = ConfigDescriptor::new(0x8000, "v", "uint32_t", None).unwrap();
    assert_ne!(descriptor.update_value(2, &[0; 4]), 0);
}

#[test]
fn low_offset_write_truncates() {
    let mut descriptor = ConfigDescriptor::new(0x8001, "v", "uint8_t[8]", None).unwrap();
    descriptor.update_value(0, &[1, 2, 3, 4, 5, 6]);
    descriptor.update_value(2, &[9]);

    assert_eq!(descriptor.latch().unwrap(), ConfigValue::Bytes(vec![1, 2, 9]));
}

#[test]
fn defaults_apply_on_clear() {
    let mut descriptor = ConfigDescriptor::new(0x8000, "v", "uint32_t", Some(7)).unwrap();
    descriptor.update_value(0, &100u32.to_le_bytes());
    descriptor.clear();

    assert_eq!(descriptor.latch().unwrap(), ConfigValue::Int(7));
}

#[test]
fn list_config_variables_pages_by_nine() {
    let mut base = test_base();
    for id in 0..12u16 {
        base.declare_config_variable(&format!("v{}", id), 0x8000 + id, "uint8_t", None)
            .unwrap();
    }

    let payload = Packer::new().u16(0).into_vec();
    let reply = reply_bytes(base.handle_common_rpc(10, &payload).unwrap());
    let mut fields = Unpacker::new(&reply);
    assert_eq!(fields.u16().unwrap(), 9);
    assert_eq!(fields.u16().unwrap(), 0x8000);

    let payload = Packer::new().u16(9).into_vec();
    let reply = reply_bytes(base.handle_common_rpc(10, &payload).unwrap());
    let mut fields = Unpacker::new(&reply);
    assert_eq!(fields.u16().unwrap(), 3);
    assert_eq!(fields.u16().unwrap(), 0x8009);
}

#[test]
fn set_config_variable_is_rejected_after_app_start() {
    let mut base = test_base();
    base.declare_config_variable("v", 0x8000, "uint32_t", None)
        .unwrap();
    base.app_started = true;

    let payload = Packer::new().u16(0x8000).u16(0).u32(1).into_vec();
    let reply = reply_bytes(base.handle_common_rpc(12, &payload).unwrap());
    let mut fields = Unpacker::new(&reply);
    assert_eq!(
        fields.u16().unwrap(),
        ErrorCode::StateChangeAtInvalidTime.code()
    );
}

#[test]
fn set_then_get_round_trips_chunks() {
    let mut base = test_base();
    base.declare_config_variable("v", 0x8001, "uint8_t[16]", None)
        .unwrap();

    let data = [0xAB; 16];
    let payload = Packer::new().u16(0x8001).u16(0).bytes(&data).into_vec();
    let reply = reply_bytes(base.handle_common_rpc(12, &payload).unwrap());
    assert_eq!(reply, vec![0, 0]);

    let payload = Packer::new().u16(0x8001).u16(0).into_vec();
    let reply = reply_bytes(base.handle_common_rpc(13, &payload).unwrap());
    assert_eq!(reply, data.to_vec());
}

#[test]
fn describe_unknown_variable_reports_invalid_key() {
    let mut base = test_base();

    let payload = Packer::new().u16(0x9999).into_vec();
    let reply = reply_bytes(base.handle_common_rpc(11, &payload).unwrap());
    let mut fields = Unpacker::new(&reply);
    assert_eq!(fields.u16().unwrap(), ErrorCode::InvalidArrayKey.code());
}

#[test]
fn latch_config_variables_skips_unset_entries() {
    let mut base = test_base();
    base.declare_config_variable("set", 0x8000, "uint32_t", None)
        .unwrap();
    base.declare_config_variable("unset", 0x8001, "uint32_t", None)
        .unwrap();

    let payload = Packer::new().u16(0x8000).u16(0).u32(5).into_vec();
    base.handle_common_rpc(12, &payload).unwrap().unwrap();

    let values = base.latch_config_variables();
    assert_eq!(values.get("set"), Some(&ConfigValue::Int(5)));
    assert!(!values.contains_key("unset"));
}

#[test]
fn registration_payload_layout() {
    let base = test_base();
    let payload = PeripheralTile::registration_payload(&base);

    assert_eq!(payload.len(), 20);
    // slot = address - 10
    assert_eq!(payload[15], 1);
    // 6-byte name at offset 3
    assert_eq!(&payload[3..9], b"emudmo");
}

#[test]
fn process_registration_records_run_level() {
    let mut peripheral = PeripheralTile::new();
    let response = Packer::new().u16(11).u16(1).u16(1).into_vec();
    peripheral.process_registration(&response).unwrap();

    assert_eq!(peripheral.run_level, Some(RunLevel::SafeMode));
    assert!(peripheral.debug_mode);
}

#[test]
fn base_snapshot_round_trips() {
    let mut base = test_base();
    base.declare_config_variable("v", 0x8000, "uint32_t", None)
        .unwrap();
    let payload = Packer::new().u16(0x8000).u16(0).u32(33).into_vec();
    base.handle_common_rpc(12, &payload).unwrap().unwrap();
    base.app_started = true;

    let state = base.snapshot();

    let mut fresh = test_base();
    fresh
        .declare_config_variable("v", 0x8000, "uint32_t", None)
        .unwrap();
    fresh.restore(&state).unwrap();

    assert!(fresh.app_started);
    let values = fresh.latch_config_variables();
    assert_eq!(values.get("v"), Some(&ConfigValue::Int(33)));
}
