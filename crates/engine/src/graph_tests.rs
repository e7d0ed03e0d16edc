// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::rpc_executor::NullRpcExecutor;
use crate::streamer::ReportFormat;
use crate::trigger::CompareOp;
use parking_lot::Mutex;
use std::sync::Arc;
use tb_core::SlotId;
use tb_storage::SensorLog;

fn shared_log() -> SharedLog {
    Arc::new(Mutex::new(SensorLog::new(DeviceModel::with_buffers(
        64, 64, 4,
    ))))
}

fn graph() -> (SensorGraph, ProcessorRegistry) {
    (
        SensorGraph::new(shared_log(), DeviceModel::with_buffers(64, 64, 4)),
        ProcessorRegistry::new(),
    )
}

fn stream(s: &str) -> DataStream {
    s.parse().unwrap()
}

fn selector(s: &str) -> DataStreamSelector {
    s.parse().unwrap()
}

fn copy_latest_node(input: &str, output: &str) -> NodeSpec {
    NodeSpec::new(
        vec![(
            selector(input),
            InputTrigger::count(CompareOp::Eq, 1),
        )],
        stream(output),
        "copy_latest_a",
    )
}

fn push_input(graph: &mut SensorGraph, s: &str, value: i32) {
    let stream = stream(s);
    let reading = Reading::new(stream.encode(), 100, value);
    let mut rpc = NullRpcExecutor;
    graph.process_input(&stream, reading, &mut rpc).unwrap();
}

#[test]
fn copy_latest_node_tracks_input_stream() {
    let (mut graph, registry) = graph();
    graph
        .add_node(copy_latest_node("input 1", "unbuffered 1"), &registry)
        .unwrap();

    for value in [10, 20, 30] {
        push_input(&mut graph, "input 1", value);
    }

    let last = graph
        .log()
        .lock()
        .inspect_last(&stream("unbuffered 1"), false)
        .unwrap();
    assert_eq!(last.value, 30);
    // Results are stamped with the input's timestamp
    assert_eq!(last.raw_time, 100);
}

#[test]
fn untriggered_node_produces_nothing() {
    let (mut graph, registry) = graph();
    let spec = NodeSpec::new(
        vec![(selector("input 1"), InputTrigger::count(CompareOp::Ge, 3))],
        stream("unbuffered 1"),
        "copy_latest_a",
    );
    graph.add_node(spec, &registry).unwrap();

    push_input(&mut graph, "input 1", 1);

    assert!(graph
        .log()
        .lock()
        .inspect_last(&stream("unbuffered 1"), false)
        .is_err());
}

#[test]
fn downstream_nodes_fire_only_after_output() {
    let (mut graph, registry) = graph();

    graph
        .add_node(copy_latest_node("input 1", "unbuffered 1"), &registry)
        .unwrap();
    graph
        .add_node(copy_latest_node("unbuffered 1", "unbuffered 2"), &registry)
        .unwrap();

    push_input(&mut graph, "input 1", 7);

    let last = graph
        .log()
        .lock()
        .inspect_last(&stream("unbuffered 2"), false)
        .unwrap();
    assert_eq!(last.value, 7);
}

#[test]
fn buffered_input_requires_a_producer() {
    let (mut graph, registry) = graph();

    let err = graph
        .add_node(copy_latest_node("buffered 1", "unbuffered 1"), &registry)
        .unwrap_err();
    assert!(matches!(err, EngineError::StreamNotInUse(_)));
}

#[test]
fn unknown_processor_is_rejected() {
    let (mut graph, registry) = graph();
    let spec = NodeSpec::new(
        vec![(selector("input 1"), InputTrigger::Always)],
        stream("unbuffered 1"),
        "not_a_processor",
    );

    assert!(matches!(
        graph.add_node(spec, &registry),
        Err(EngineError::UnknownProcessor(_))
    ));
}

#[test]
fn node_limit_is_enforced() {
    let log = shared_log();
    let model = DeviceModel {
        max_nodes: 1,
        ..DeviceModel::with_buffers(64, 64, 4)
    };
    let mut graph = SensorGraph::new(log, model);
    let registry = ProcessorRegistry::new();

    graph
        .add_node(copy_latest_node("input 1", "unbuffered 1"), &registry)
        .unwrap();
    assert!(matches!(
        graph.add_node(copy_latest_node("input 1", "unbuffered 2"), &registry),
        Err(EngineError::NoNodeSpace(1))
    ));
}

#[test]
fn without_limits_ignores_the_node_cap() {
    let log = shared_log();
    let model = DeviceModel {
        max_nodes: 1,
        ..DeviceModel::with_buffers(64, 64, 4)
    };
    let mut graph = SensorGraph::new(log, model).without_limits();
    let registry = ProcessorRegistry::new();

    graph
        .add_node(copy_latest_node("input 1", "unbuffered 1"), &registry)
        .unwrap();
    graph
        .add_node(copy_latest_node("input 1", "unbuffered 2"), &registry)
        .unwrap();
    assert_eq!(graph.node_count(), 2);
}

#[test]
fn fan_out_splits_at_output_degree_limit() {
    let (mut graph, registry) = graph();

    graph
        .add_node(copy_latest_node("input 1", "unbuffered 1"), &registry)
        .unwrap();

    // Three consumers attach directly; the fourth forces a split
    for i in 2..=5 {
        graph
            .add_node(
                copy_latest_node("unbuffered 1", &format!("unbuffered {}", i)),
                &registry,
            )
            .unwrap();
    }

    // producer + 4 consumers + 1 splitter
    assert_eq!(graph.node_count(), 6);

    let splitter = graph
        .nodes()
        .iter()
        .find(|node| node.func_name == "copy_all_a")
        .expect("splitter inserted");
    assert_eq!(splitter.stream.stream_number, 0x400);

    // The producer's outputs are at the bound
    assert_eq!(graph.nodes()[0].num_outputs(), 4);

    // Data still reaches the consumer behind the splitter
    push_input(&mut graph, "input 1", 9);
    let last = graph
        .log()
        .lock()
        .inspect_last(&stream("unbuffered 5"), false)
        .unwrap();
    assert_eq!(last.value, 9);
}

#[test]
fn splitting_a_constant_stream_propagates_its_value() {
    let (mut graph, registry) = graph();
    let model_outputs = DeviceModel::default().max_node_outputs;

    graph.add_constant(stream("constant 1"), 77).unwrap();

    // Constant streams have no producer node; consumers attach freely.
    // Force a producer by writing the constant from a node, then split.
    let producer = NodeSpec::new(
        vec![(selector("input 1"), InputTrigger::Always)],
        stream("constant 1"),
        "copy_latest_a",
    );
    graph.add_node(producer, &registry).unwrap();

    for i in 1..=model_outputs {
        let spec = NodeSpec::new(
            vec![(selector("constant 1"), InputTrigger::Always)],
            stream(&format!("unbuffered {}", i)),
            "copy_latest_a",
        );
        graph.add_node(spec, &registry).unwrap();
    }

    let split_constant = stream("constant 0x400");
    let propagated = graph
        .constants()
        .find(|(s, _)| **s == split_constant)
        .map(|(_, v)| *v);
    assert_eq!(propagated, Some(77));
}

#[test]
fn initialize_remaining_constants_returns_new_streams() {
    let (mut graph, registry) = graph();

    let spec = NodeSpec::new(
        vec![
            (selector("input 1"), InputTrigger::Always),
            (selector("constant 5"), InputTrigger::Always),
        ],
        stream("unbuffered 1"),
        "copy_latest_a",
    );
    graph.add_node(spec, &registry).unwrap();
    graph.add_constant(stream("constant 7"), 1).unwrap();

    let initialized = graph.initialize_remaining_constants(0).unwrap();
    assert_eq!(initialized, vec![stream("constant 5")]);

    // A second pass has nothing left to do
    assert!(graph.initialize_remaining_constants(0).unwrap().is_empty());
}

#[test]
fn load_constants_pushes_values_to_walkers() {
    let (mut graph, registry) = graph();

    let spec = NodeSpec::new(
        vec![
            (selector("input 1"), InputTrigger::count(CompareOp::Eq, 1)),
            (selector("constant 1"), InputTrigger::Always),
        ],
        stream("unbuffered 1"),
        "subtract_a_from_b",
    );
    graph.add_node(spec, &registry).unwrap();
    graph.add_constant(stream("constant 1"), 50).unwrap();
    graph.load_constants().unwrap();

    // B.pop() - A.peek() where B is the constant
    push_input(&mut graph, "input 1", 20);

    let last = graph
        .log()
        .lock()
        .inspect_last(&stream("unbuffered 1"), false)
        .unwrap();
    assert_eq!(last.value, 30);
}

#[test]
fn duplicate_constants_are_rejected() {
    let (mut graph, _registry) = graph();
    graph.add_constant(stream("constant 1"), 1).unwrap();
    assert!(matches!(
        graph.add_constant(stream("constant 1"), 2),
        Err(EngineError::DuplicateConstant(_))
    ));
}

fn output_streamer(sel: &str, automatic: bool, with_other: Option<usize>) -> StreamerSpec {
    StreamerSpec {
        selector: selector(sel),
        dest: SlotId::Controller,
        format: ReportFormat::HashedList,
        automatic,
        with_other,
    }
}

#[test]
fn automatic_streamers_trigger_on_data() {
    let (mut graph, _registry) = graph();
    graph.add_streamer(output_streamer("output 1", true, None)).unwrap();

    assert!(graph.check_streamers(&HashSet::new()).is_empty());

    let s = stream("output 1");
    graph
        .log()
        .lock()
        .push(&s, Reading::new(s.encode(), 0, 1))
        .unwrap();

    assert_eq!(graph.check_streamers(&HashSet::new()), vec![0]);
}

#[test]
fn manual_marks_drain_exactly_once() {
    let (mut graph, _registry) = graph();
    graph.add_streamer(output_streamer("output 1", false, None)).unwrap();

    let s = stream("output 1");
    graph
        .log()
        .lock()
        .push(&s, Reading::new(s.encode(), 0, 1))
        .unwrap();

    // Not automatic: no trigger without a mark
    assert!(graph.check_streamers(&HashSet::new()).is_empty());

    graph.mark_streamer(0).unwrap();
    assert_eq!(graph.check_streamers(&HashSet::new()), vec![0]);

    // The mark was consumed by the previous pass
    assert!(graph.check_streamers(&HashSet::new()).is_empty());
}

#[test]
fn with_other_couples_to_earlier_streamer() {
    let (mut graph, _registry) = graph();
    graph.add_streamer(output_streamer("output 1", true, None)).unwrap();
    graph.add_streamer(output_streamer("output 2", false, Some(0))).unwrap();

    let one = stream("output 1");
    let two = stream("output 2");
    {
        let mut log = graph.log().lock();
        log.push(&one, Reading::new(one.encode(), 0, 1)).unwrap();
        log.push(&two, Reading::new(two.encode(), 0, 2)).unwrap();
    }

    assert_eq!(graph.check_streamers(&HashSet::new()), vec![0, 1]);
}

#[test]
fn with_other_needs_data_of_its_own() {
    let (mut graph, _registry) = graph();
    graph.add_streamer(output_streamer("output 1", true, None)).unwrap();
    graph.add_streamer(output_streamer("output 2", false, Some(0))).unwrap();

    let one = stream("output 1");
    graph
        .log()
        .lock()
        .push(&one, Reading::new(one.encode(), 0, 1))
        .unwrap();

    assert_eq!(graph.check_streamers(&HashSet::new()), vec![0]);
}

#[test]
fn blacklisted_streamers_are_skipped() {
    let (mut graph, _registry) = graph();
    graph.add_streamer(output_streamer("output 1", true, None)).unwrap();

    let s = stream("output 1");
    graph
        .log()
        .lock()
        .push(&s, Reading::new(s.encode(), 0, 1))
        .unwrap();

    let blacklist: HashSet<usize> = [0].into_iter().collect();
    assert!(graph.check_streamers(&blacklist).is_empty());
}

#[test]
fn invalid_streamer_marks_are_rejected() {
    let (mut graph, _registry) = graph();
    assert!(matches!(
        graph.mark_streamer(3),
        Err(EngineError::InvalidStreamerIndex(3))
    ));
}

#[test]
fn sort_nodes_places_producers_first() {
    let (mut graph, registry) = graph();

    // Insert the consumer chain out of dependency order is not possible
    // through add_node, so build in order and verify sorting is stable.
    graph
        .add_node(copy_latest_node("input 1", "unbuffered 1"), &registry)
        .unwrap();
    graph
        .add_node(copy_latest_node("unbuffered 1", "unbuffered 2"), &registry)
        .unwrap();
    graph
        .add_node(copy_latest_node("input 1", "unbuffered 3"), &registry)
        .unwrap();

    graph.sort_nodes().unwrap();

    let order: Vec<String> = graph
        .nodes()
        .iter()
        .map(|node| node.stream.to_string())
        .collect();
    assert_eq!(order, vec!["unbuffered 1", "unbuffered 2", "unbuffered 3"]);

    // Evaluation still works after the index remap
    push_input(&mut graph, "input 1", 4);
    let last = graph
        .log()
        .lock()
        .inspect_last(&stream("unbuffered 2"), false)
        .unwrap();
    assert_eq!(last.value, 4);
}

#[test]
fn dump_restore_rebuilds_equivalent_graph() {
    let (mut graph, registry) = graph();

    graph
        .add_node(copy_latest_node("input 1", "unbuffered 1"), &registry)
        .unwrap();
    graph.add_streamer(output_streamer("output 1", true, None)).unwrap();
    graph.add_constant(stream("constant 1"), 5).unwrap();

    let state = graph.dump();
    let json = serde_json::to_string(&state).unwrap();
    let state: GraphState = serde_json::from_str(&json).unwrap();

    let mut restored = SensorGraph::new(shared_log(), DeviceModel::with_buffers(64, 64, 4));
    restored.restore(&state, &registry).unwrap();

    assert_eq!(restored.node_count(), 1);
    assert_eq!(restored.streamers().len(), 1);

    push_input(&mut restored, "input 1", 3);
    let last = restored
        .log()
        .lock()
        .inspect_last(&stream("unbuffered 1"), false)
        .unwrap();
    assert_eq!(last.value, 3);
}
