//! Test helpers for behavioral specifications.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic, dead_code)]

use std::time::Duration;
use tb_core::DeviceModel;
use tb_device::{DemoDevice, Device};

pub const RPC_TIMEOUT: Duration = Duration::from_secs(5);
pub const IDLE_TIMEOUT: Duration = Duration::from_secs(5);

/// Demo tile address (slot 1).
pub const DEMO: u8 = 11;
pub const CONTROLLER: u8 = 8;

/// Build and start a demo device with the free-running clock disabled
/// so tests control simulated time explicitly.
pub fn started_demo_device(iotile_id: u32) -> Device {
    let mut device = DemoDevice::build(iotile_id).unwrap();
    device.set_clock_interval(None);
    device.start(IDLE_TIMEOUT).unwrap();
    device
}

/// Same, with a small storage model for rollover tests.
pub fn started_demo_device_with_model(iotile_id: u32, model: DeviceModel) -> Device {
    let mut device = DemoDevice::build_with_model(iotile_id, model).unwrap();
    device.set_clock_interval(None);
    device.start(IDLE_TIMEOUT).unwrap();
    device
}

pub fn u32_payload(value: u32) -> Vec<u8> {
    value.to_le_bytes().to_vec()
}

pub fn u32_reply(reply: &[u8]) -> u32 {
    u32::from_le_bytes([reply[0], reply[1], reply[2], reply[3]])
}

/// Initialize tracing for a test run when TB_SPEC_LOG is set.
pub fn init_logging() {
    if std::env::var("TB_SPEC_LOG").is_err() {
        return;
    }

    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("debug")),
        )
        .try_init();
}
