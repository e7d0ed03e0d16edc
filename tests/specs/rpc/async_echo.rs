//! Scenario: asynchronous RPC echo.
//!
//! Rpc 0x8000 defers its response; a background worker completes it via
//! the deferred-RPC path.  While the response is pending, a second RPC
//! to the same tile fails with Busy.

use crate::prelude::*;
use std::time::Duration;
use tb_device::{DemoDevice, DemoTile, RpcError};

#[test]
fn async_echo_completes_through_the_worker() {
    init_logging();
    let mut device = started_demo_device(1);

    let reply = device
        .rpc(DEMO, 0x8000, &u32_payload(7), RPC_TIMEOUT)
        .unwrap();
    assert_eq!(u32_reply(&reply), 7);

    device.wait_idle(IDLE_TIMEOUT).unwrap();
    device.stop().unwrap();
}

#[test]
fn pending_async_rpc_makes_the_tile_busy() {
    let mut device = DemoDevice::build(1).unwrap();
    device.set_clock_interval(None);

    // Grab the gate before the tile is boxed into the device
    let tile = DemoTile::new(12, device.handle()).unwrap();
    let gate = tile.echo_gate();
    device.add_tile(Box::new(tile)).unwrap();
    device.start(IDLE_TIMEOUT).unwrap();

    // Hold the worker so the deferred response stays pending
    gate.clear();

    let handle = device.handle();
    let pending = std::thread::spawn({
        let handle = handle.clone();
        move || handle.call_rpc_external(12, 0x8000, &7u32.to_le_bytes(), Duration::from_secs(5))
    });

    while !handle.is_tile_busy(12) {
        std::thread::yield_now();
    }

    // A second rpc to the same tile is rejected without being handled
    let result = device.rpc(12, 0x8001, &u32_payload(1), RPC_TIMEOUT);
    assert!(matches!(result, Err(RpcError::Busy(12))));

    // Other tiles are unaffected
    let reply = device
        .rpc(DEMO, 0x8001, &u32_payload(3), RPC_TIMEOUT)
        .unwrap();
    assert_eq!(u32_reply(&reply), 3);

    // Release the worker; the original caller receives its echo
    gate.set();
    let reply = pending.join().unwrap().unwrap();
    assert_eq!(u32_reply(&reply), 7);

    device.wait_idle(IDLE_TIMEOUT).unwrap();
    device.stop().unwrap();
}
