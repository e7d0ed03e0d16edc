//! Scenario: tile reset lifecycle.
//!
//! Resetting a peripheral cancels its tasks, re-registers it with the
//! controller, re-streams its config variables and restarts its
//! application.

use crate::prelude::*;
use tb_core::{Packer, SlotId};
use tb_device::controller::config_database::ConfigTarget;
use tb_device::DemoDevice;

#[test]
fn peripheral_reset_reregisters_and_restarts() {
    init_logging();
    let mut device = DemoDevice::build(1).unwrap();
    device.set_clock_interval(None);

    {
        let shared = device.controller();
        shared.state.lock().config_db.add_direct(
            ConfigTarget::Slot(SlotId::Slot(1)),
            0x8000,
            &0x11223344u32.to_le_bytes(),
        );
    }

    device.start(IDLE_TIMEOUT).unwrap();

    device.reset_tile(DEMO).unwrap();
    device.wait_idle(IDLE_TIMEOUT).unwrap();

    let state = device.tile_snapshot(DEMO).unwrap();
    assert_eq!(state["app_started"], serde_json::json!(true));

    let reply = device
        .rpc(
            DEMO,
            13,
            &Packer::new().u16(0x8000).u16(0).into_vec(),
            RPC_TIMEOUT,
        )
        .unwrap();
    assert_eq!(reply, 0x11223344u32.to_le_bytes().to_vec());

    device.stop().unwrap();
}

#[test]
fn controller_reset_resets_peripherals_too() {
    let mut device = started_demo_device(1);

    device.reset_tile(CONTROLLER).unwrap();
    device.wait_idle(IDLE_TIMEOUT).unwrap();

    // The peripheral re-registered and restarted behind the controller
    let reply = device
        .rpc(CONTROLLER, 0x2a01, &[], RPC_TIMEOUT) // COUNT_TILES
        .unwrap();
    assert_eq!(u16::from_le_bytes([reply[0], reply[1]]), 2);

    let state = device.tile_snapshot(DEMO).unwrap();
    assert_eq!(state["app_started"], serde_json::json!(true));

    device.stop().unwrap();
}

#[test]
fn async_echo_still_works_after_reset() {
    let mut device = started_demo_device(1);

    device.reset_tile(DEMO).unwrap();
    device.wait_idle(IDLE_TIMEOUT).unwrap();

    let reply = device
        .rpc(DEMO, 0x8000, &u32_payload(5), RPC_TIMEOUT)
        .unwrap();
    assert_eq!(u32_reply(&reply), 5);

    device.stop().unwrap();
}
