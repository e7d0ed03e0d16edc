//! Scenario: snapshot round trips.
//!
//! A snapshot captures per-tile config values, controller subsystem
//! state and sensor storage; restoring it reproduces the captured
//! behavior.

use crate::prelude::*;
use tb_core::Packer;
use tempfile::tempdir;

#[test]
fn snapshot_restores_counter_and_storage() {
    init_logging();
    let mut device = started_demo_device(1);

    // Counter at 2, five readings stored
    for _ in 0..2 {
        device.rpc(DEMO, 0x8002, &[], RPC_TIMEOUT).unwrap();
    }

    let stream: tb_core::DataStream = "buffered 1".parse().unwrap();
    let payload = Packer::new()
        .i32(9)
        .u32(5)
        .u16(stream.encode())
        .into_vec();
    device.rpc(CONTROLLER, 0x2001, &payload, RPC_TIMEOUT).unwrap();
    device.wait_idle(IDLE_TIMEOUT).unwrap();

    let snapshot = device.snapshot().unwrap();

    // Disturb both pieces of state
    device.rpc(DEMO, 0x8002, &[], RPC_TIMEOUT).unwrap();
    device.rpc(CONTROLLER, 0x2003, &[], RPC_TIMEOUT).unwrap(); // RSL_CLEAR_READINGS
    device.wait_idle(IDLE_TIMEOUT).unwrap();

    device.restore(&snapshot).unwrap();

    // Counter resumes from the captured value
    let reply = device.rpc(DEMO, 0x8002, &[], RPC_TIMEOUT).unwrap();
    assert_eq!(u32_reply(&reply), 2);

    // Stored readings are back
    let reply = device.rpc(CONTROLLER, 0x2002, &[], RPC_TIMEOUT).unwrap();
    assert_eq!(u32_reply(&reply[4..8]), 5);

    device.stop().unwrap();
}

#[test]
fn snapshot_survives_a_disk_round_trip() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("demo.snapshot");

    let mut device = started_demo_device(1);
    device.rpc(DEMO, 0x8002, &[], RPC_TIMEOUT).unwrap();
    device.wait_idle(IDLE_TIMEOUT).unwrap();

    device.save_snapshot(&path).unwrap();

    device.rpc(DEMO, 0x8002, &[], RPC_TIMEOUT).unwrap();
    device.wait_idle(IDLE_TIMEOUT).unwrap();

    device.load_snapshot(&path).unwrap();

    let reply = device.rpc(DEMO, 0x8002, &[], RPC_TIMEOUT).unwrap();
    assert_eq!(u32_reply(&reply), 1);

    device.stop().unwrap();
}

#[test]
fn next_id_is_not_reset_by_restore() {
    let mut device = started_demo_device(1);

    let stream: tb_core::DataStream = "buffered 1".parse().unwrap();
    let payload = Packer::new()
        .i32(1)
        .u32(3)
        .u16(stream.encode())
        .into_vec();
    device.rpc(CONTROLLER, 0x2001, &payload, RPC_TIMEOUT).unwrap();
    device.wait_idle(IDLE_TIMEOUT).unwrap();

    let snapshot = device.snapshot().unwrap();
    device.restore(&snapshot).unwrap();

    let reply = device.rpc(CONTROLLER, 0x2007, &[], RPC_TIMEOUT).unwrap(); // RSL_HIGHEST_READING_ID
    assert_eq!(u32_reply(&reply[4..8]), 3);

    device.stop().unwrap();
}
