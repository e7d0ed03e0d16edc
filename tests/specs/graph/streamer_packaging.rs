//! Scenario: streamer packaging.
//!
//! A hashed-list streamer on `output 1` drains buffered readings into
//! one report carrying the reading count and the highest reading id.

use crate::prelude::*;
use tb_core::{Packer, SlotId};
use tb_engine::{ReportFormat, StreamerSpec};

fn hashed_list_streamer() -> StreamerSpec {
    StreamerSpec {
        selector: "output 1".parse().unwrap(),
        dest: SlotId::Controller,
        format: ReportFormat::HashedList,
        automatic: true,
        with_other: None,
    }
}

fn push_readings(device: &tb_device::Device, count: u32, value: i32) {
    let stream: tb_core::DataStream = "output 1".parse().unwrap();
    let payload = Packer::new()
        .i32(value)
        .u32(count)
        .u16(stream.encode())
        .into_vec();

    let reply = device
        .rpc(CONTROLLER, 0x2001, &payload, RPC_TIMEOUT) // RSL_PUSH_MANY_READINGS
        .unwrap();
    assert_eq!(u32_reply(&reply[0..4]), 0);
    assert_eq!(u32_reply(&reply[4..8]), count);
}

#[test]
fn hashed_list_report_drains_the_streamer() {
    init_logging();
    let mut device = started_demo_device(1);

    let index = device.add_sg_streamer(hashed_list_streamer()).unwrap();
    assert_eq!(index, 0);

    push_readings(&device, 20, 0x55);

    // Kick a streamer check pass
    let payload = Packer::new().u16(0).into_vec();
    device.rpc(CONTROLLER, 0x2012, &payload, RPC_TIMEOUT).unwrap();
    device.wait_idle(IDLE_TIMEOUT).unwrap();

    let reports = device.take_reports();
    assert_eq!(reports.len(), 1);

    let report = &reports[0];
    assert_eq!(report.streamer, 0);
    assert_eq!(report.num_readings, 20);
    assert_eq!(report.highest_id, 20, "ids count from 1");
    assert_eq!(report.format, ReportFormat::HashedList);

    // The walker is empty afterwards: a second pass builds nothing
    device.acknowledge_streamer(0);
    device.rpc(CONTROLLER, 0x2012, &payload, RPC_TIMEOUT).unwrap();
    device.wait_idle(IDLE_TIMEOUT).unwrap();
    assert!(device.take_reports().is_empty());

    device.stop().unwrap();
}

#[test]
fn unacknowledged_streamers_do_not_rebuild() {
    let mut device = started_demo_device(1);
    device.add_sg_streamer(hashed_list_streamer()).unwrap();

    push_readings(&device, 5, 1);

    let payload = Packer::new().u16(0).into_vec();
    device.rpc(CONTROLLER, 0x2012, &payload, RPC_TIMEOUT).unwrap();
    device.wait_idle(IDLE_TIMEOUT).unwrap();
    assert_eq!(device.take_reports().len(), 1);

    // More data arrives, but the streamer is still in progress
    push_readings(&device, 5, 2);
    device.rpc(CONTROLLER, 0x2012, &payload, RPC_TIMEOUT).unwrap();
    device.wait_idle(IDLE_TIMEOUT).unwrap();
    assert!(device.take_reports().is_empty());

    // After acknowledgement the remaining readings flow
    device.acknowledge_streamer(0);
    device.rpc(CONTROLLER, 0x2012, &payload, RPC_TIMEOUT).unwrap();
    device.wait_idle(IDLE_TIMEOUT).unwrap();

    let reports = device.take_reports();
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].num_readings, 5);

    device.stop().unwrap();
}
