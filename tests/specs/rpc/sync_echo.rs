//! Scenario: synchronous RPC echo.
//!
//! A demo tile at address 11 answers rpc 0x8001 by echoing its 32-bit
//! argument; the device is immediately idle afterwards.

use crate::prelude::*;
use std::time::Duration;

#[test]
fn sync_echo_returns_the_argument() {
    init_logging();
    let mut device = started_demo_device(1);

    let reply = device
        .rpc(DEMO, 0x8001, &u32_payload(42), RPC_TIMEOUT)
        .unwrap();
    assert_eq!(u32_reply(&reply), 42);

    // Nothing is left in flight
    device.wait_idle(Duration::from_millis(500)).unwrap();

    device.stop().unwrap();
}

#[test]
fn sync_echo_is_fifo_per_tile() {
    let mut device = started_demo_device(1);

    for value in [1u32, 2, 3, 4, 5] {
        let reply = device
            .rpc(DEMO, 0x8001, &u32_payload(value), RPC_TIMEOUT)
            .unwrap();
        assert_eq!(u32_reply(&reply), value);
    }

    device.stop().unwrap();
}
