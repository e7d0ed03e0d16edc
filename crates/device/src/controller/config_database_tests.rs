// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use tb_core::ErrorCode;

fn slot_target(slot: u8) -> ConfigTarget {
    ConfigTarget::Slot(SlotId::Slot(slot))
}

#[test]
fn add_direct_then_stream_matching() {
    let mut db = ConfigDatabase::new(4096, 4096);

    let code = db.add_direct(slot_target(1), 0x8000, &0xCAFEBABEu32.to_le_bytes());
    assert_eq!(code, ErrorCode::NoError.code());

    let calls = db.stream_matching(11, b"emudmo");
    assert_eq!(calls.len(), 1);

    let (address, rpc_id, payload) = &calls[0];
    assert_eq!(*address, 11);
    assert_eq!(*rpc_id, rpcs::SET_CONFIG_VARIABLE.rpc_id);

    // payload = var_id, offset, data
    assert_eq!(&payload[0..2], &0x8000u16.to_le_bytes());
    assert_eq!(&payload[2..4], &0u16.to_le_bytes());
    assert_eq!(&payload[4..], &0xCAFEBABEu32.to_le_bytes());
}

#[test]
fn long_values_are_chunked_to_sixteen_bytes() {
    let mut db = ConfigDatabase::new(4096, 4096);
    let data = [0x55u8; 40];
    db.add_direct(slot_target(1), 0x8001, &data);

    let calls = db.stream_matching(11, b"emudmo");
    assert_eq!(calls.len(), 3);

    let offsets: Vec<u16> = calls
        .iter()
        .map(|(_, _, payload)| u16::from_le_bytes([payload[2], payload[3]]))
        .collect();
    assert_eq!(offsets, vec![0, 16, 32]);
    assert_eq!(calls[2].2.len() - 4, 8, "final chunk carries the tail");
}

#[test]
fn entries_match_by_slot_or_name() {
    let mut db = ConfigDatabase::new(4096, 4096);
    db.add_direct(slot_target(1), 0x8000, &[1]);
    db.add_direct(ConfigTarget::Name(*b"emudmo"), 0x8001, &[2]);
    db.add_direct(slot_target(2), 0x8002, &[3]);

    let calls = db.stream_matching(11, b"emudmo");
    let var_ids: Vec<u16> = calls
        .iter()
        .map(|(_, _, payload)| u16::from_le_bytes([payload[0], payload[1]]))
        .collect();

    assert_eq!(var_ids, vec![0x8000, 0x8001]);
}

#[test]
fn later_entries_invalidate_earlier_ones() {
    let mut db = ConfigDatabase::new(4096, 4096);
    db.add_direct(slot_target(1), 0x8000, &[1]);
    db.add_direct(slot_target(1), 0x8000, &[2]);

    assert_eq!(db.entry_count(), 2);

    let calls = db.stream_matching(11, b"emudmo");
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].2[4], 2, "only the newest value streams");
}

#[test]
fn compact_reclaims_invalid_entries() {
    let mut db = ConfigDatabase::new(4096, 4096);
    db.add_direct(slot_target(1), 0x8000, &[1, 1, 1, 1]);
    db.add_direct(slot_target(1), 0x8000, &[2]);

    let used_before = db.used_data_space();
    db.compact();

    assert_eq!(db.entry_count(), 1);
    assert!(db.used_data_space() < used_before);

    // The surviving entry still streams
    assert_eq!(db.stream_matching(11, b"emudmo").len(), 1);
}

#[test]
fn entry_flow_rejects_empty_commits() {
    let mut db = ConfigDatabase::new(4096, 4096);

    assert_eq!(db.start_entry(slot_target(1), 0x8000), 0);
    assert_eq!(db.end_entry(), ErrorCode::InputBufferWrongSize.code());
}

#[test]
fn data_space_is_bounded() {
    let mut db = ConfigDatabase::new(4096, 8);

    assert_eq!(db.start_entry(slot_target(1), 0x8000), 0);
    assert_eq!(db.add_data(&[0; 4]), 0);
    assert_eq!(
        db.add_data(&[0; 8]),
        ErrorCode::DestinationBufferTooSmall.code()
    );
}

#[test]
fn control_space_bounds_entry_count() {
    // Room for exactly one committed entry
    let mut db = ConfigDatabase::new(32, 4096);
    assert_eq!(db.add_direct(slot_target(1), 0x8000, &[1]), 0);
    assert_eq!(
        db.start_entry(slot_target(1), 0x8001),
        ErrorCode::DestinationBufferTooSmall.code()
    );
}

#[test]
fn invalidate_by_index() {
    let mut db = ConfigDatabase::new(4096, 4096);
    db.add_direct(slot_target(1), 0x8000, &[1]);

    assert_eq!(db.invalidate(0), 0);
    assert!(db.stream_matching(11, b"emudmo").is_empty());
    assert_eq!(db.invalidate(5), ErrorCode::InvalidArrayKey.code());
}

#[test]
fn clear_empties_everything() {
    let mut db = ConfigDatabase::new(4096, 4096);
    db.add_direct(slot_target(1), 0x8000, &[1]);
    db.clear();

    assert_eq!(db.entry_count(), 0);
    assert_eq!(db.used_data_space(), 0);
}

#[test]
fn target_strings_round_trip() {
    for target in ["controller", "slot 3", "name emudmo"] {
        let parsed: ConfigTarget = target.parse().unwrap();
        assert_eq!(parsed.to_string(), target);
    }
}
