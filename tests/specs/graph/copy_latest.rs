//! Scenario: a copy-latest node re-evaluated per push.
//!
//! Node `(input 1 when count == 1) => unbuffered 1 using copy_latest_a`.
//! Each arriving reading triggers one evaluation that drains the input
//! and emits the arriving value.

use crate::prelude::*;
use tb_core::Packer;
use tb_engine::{CompareOp, InputTrigger, NodeSpec};

fn copy_latest_spec(output: &str) -> NodeSpec {
    NodeSpec::new(
        vec![(
            "input 1".parse().unwrap(),
            InputTrigger::count(CompareOp::Eq, 1),
        )],
        output.parse().unwrap(),
        "copy_latest_a",
    )
}

#[test]
fn each_push_is_reevaluated_and_latched() {
    init_logging();
    let mut device = started_demo_device(1);

    device.add_sg_node(copy_latest_spec("unbuffered 1")).unwrap();

    // A quiet downstream reader keeps a walker allocated on the output
    // stream so it can be inspected like an embedded device would
    let observer = NodeSpec::new(
        vec![("unbuffered 1".parse().unwrap(), InputTrigger::Never)],
        "unbuffered 2".parse().unwrap(),
        "copy_latest_a",
    );
    device.add_sg_node(observer).unwrap();
    device.set_sg_online(true).unwrap();

    for value in [10, 20, 30] {
        device
            .push_sg_input("input 1".parse().unwrap(), value)
            .unwrap();
    }

    // The unbuffered output holds the last arriving value
    let payload = Packer::new()
        .u16("unbuffered 1".parse::<tb_core::DataStream>().unwrap().encode())
        .into_vec();
    let reply = device
        .rpc(CONTROLLER, 0x2006, &payload, RPC_TIMEOUT) // RSL_INSPECT_VIRTUAL_STREAM
        .unwrap();
    assert_eq!(u32_reply(&reply[0..4]), 0, "no error");
    assert_eq!(
        i32::from_le_bytes([reply[4], reply[5], reply[6], reply[7]]),
        30
    );

    device.stop().unwrap();
}

#[test]
fn each_evaluation_emits_one_reading() {
    let mut device = started_demo_device(1);

    // Route the node's output into the streaming buffer so the emission
    // count is observable
    device.add_sg_node(copy_latest_spec("output 1")).unwrap();
    device.set_sg_online(true).unwrap();

    for value in [10, 20, 30] {
        device
            .push_sg_input("input 1".parse().unwrap(), value)
            .unwrap();
    }

    let reply = device
        .rpc(CONTROLLER, 0x2002, &[], RPC_TIMEOUT) // RSL_COUNT_READINGS
        .unwrap();
    assert_eq!(u32_reply(&reply[0..4]), 0);
    let storage = u32_reply(&reply[4..8]);
    let streaming = u32_reply(&reply[8..12]);

    assert_eq!(storage, 0);
    assert_eq!(streaming, 3, "three evaluations, one emission each");

    device.stop().unwrap();
}

#[test]
fn untriggered_inputs_do_not_evaluate() {
    let mut device = started_demo_device(1);

    let spec = NodeSpec::new(
        vec![(
            "input 1".parse().unwrap(),
            InputTrigger::count(CompareOp::Ge, 100),
        )],
        "output 1".parse().unwrap(),
        "copy_latest_a",
    );
    device.add_sg_node(spec).unwrap();
    device.set_sg_online(true).unwrap();

    device
        .push_sg_input("input 1".parse().unwrap(), 1)
        .unwrap();

    let reply = device.rpc(CONTROLLER, 0x2002, &[], RPC_TIMEOUT).unwrap();
    assert_eq!(u32_reply(&reply[8..12]), 0);

    device.stop().unwrap();
}
