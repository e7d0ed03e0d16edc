//! Scenario: config streaming on boot.
//!
//! A config entry recorded for slot 1 reaches the peripheral's latched
//! variables by the time `START_APPLICATION` is received.

use crate::prelude::*;
use tb_core::{Packer, SlotId};
use tb_device::controller::config_database::ConfigTarget;
use tb_device::DemoDevice;

#[test]
fn recorded_entry_is_latched_at_start_application() {
    init_logging();
    let mut device = DemoDevice::build(1).unwrap();
    device.set_clock_interval(None);

    {
        let shared = device.controller();
        let code = shared.state.lock().config_db.add_direct(
            ConfigTarget::Slot(SlotId::Slot(1)),
            0x8000,
            &0xCAFEBABEu32.to_le_bytes(),
        );
        assert_eq!(code, 0);
    }

    device.start(IDLE_TIMEOUT).unwrap();

    // The tile saw START_APPLICATION with the variable already set
    let state = device.tile_snapshot(DEMO).unwrap();
    assert_eq!(state["app_started"], serde_json::json!(true));

    let reply = device
        .rpc(
            DEMO,
            13, // GET_CONFIG_VARIABLE
            &Packer::new().u16(0x8000).u16(0).into_vec(),
            RPC_TIMEOUT,
        )
        .unwrap();
    assert_eq!(reply, 0xCAFEBABEu32.to_le_bytes().to_vec());

    device.stop().unwrap();
}

#[test]
fn set_config_after_start_is_rejected() {
    let mut device = started_demo_device(1);

    let payload = Packer::new().u16(0x8000).u16(0).u32(1).into_vec();
    let reply = device.rpc(DEMO, 12, &payload, RPC_TIMEOUT).unwrap();

    // STATE_CHANGE_AT_INVALID_TIME
    assert_eq!(u16::from_le_bytes([reply[0], reply[1]]), 9);

    device.stop().unwrap();
}
