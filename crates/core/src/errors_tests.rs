// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use proptest::prelude::*;

#[test]
fn global_errors_pack_with_zero_subsystem() {
    assert_eq!(pack_error(Subsystem::Global, ErrorCode::TimeoutError.code()), 10);
    assert_eq!(pack_error(Subsystem::Global, ErrorCode::NoError.code()), NO_ERROR);
}

#[test]
fn subsystem_errors_pack_into_high_half() {
    let packed = pack_error(Subsystem::SensorLog, sensor_log::RING_BUFFER_FULL);
    assert_eq!(packed, 0x8002_8006);

    let unpacked = unpack_error(packed);
    assert_eq!(unpacked.subsystem, Subsystem::SensorLog as u16);
    assert_eq!(unpacked.code, sensor_log::RING_BUFFER_FULL);
}

#[test]
fn tile_private_codes_start_at_0x8000() {
    assert!(sensor_log::NO_MORE_READINGS >= 0x8000);
    assert!(sensor_graph::NO_NODE_SPACE_AVAILABLE >= 0x8000);
    assert!(config_database::OBSOLETE_ENTRY >= 0x8000);
}

#[test]
fn subsystem_ids_round_trip() {
    for subsystem in [
        Subsystem::Global,
        Subsystem::TileManager,
        Subsystem::SensorLog,
        Subsystem::SensorGraph,
        Subsystem::RemoteBridge,
    ] {
        assert_eq!(Subsystem::from_id(subsystem as u16), Some(subsystem));
    }

    assert_eq!(Subsystem::from_id(0x7fff), None);
}

proptest! {
    #[test]
    fn pack_unpack_round_trips(packed in any::<u32>()) {
        prop_assert_eq!(unpack_error(packed).packed(), packed);
    }
}
