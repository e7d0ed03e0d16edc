// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! The sensor graph: a DAG of processing nodes fed by streams.
//!
//! Nodes live in a flat arena; downstream links and root membership are
//! arena indices.  Input arrival walks the graph breadth first, evaluating
//! triggers and running processing functions.  The graph also owns the
//! streamers and the constant database.

use crate::node::{NodeInput, NodeSpec, SgNode};
use crate::processors::{ProcessContext, ProcessorRegistry};
use crate::rpc_executor::RpcExecutor;
use crate::streamer::{DataStreamer, StreamerSpec};
use crate::trigger::InputTrigger;
use crate::EngineError;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::{HashSet, VecDeque};
use tb_core::{DataStream, DataStreamSelector, DeviceModel, Reading, StreamType};
use tb_storage::SharedLog;
use tracing::{debug, error};

/// First stream number handed out when the graph splits a stream to
/// respect the output-degree bound.
const AUTO_STREAM_START: u16 = 0x400;

/// Serialized graph structure: the pieces needed to rebuild an identical
/// graph against a fresh sensor log.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GraphState {
    pub nodes: Vec<NodeSpec>,
    pub streamers: Vec<StreamerSpec>,
    pub constants: Vec<(DataStream, i32)>,
}

/// A graph based data processing engine.
pub struct SensorGraph {
    log: SharedLog,
    model: DeviceModel,
    nodes: Vec<SgNode>,
    roots: Vec<usize>,
    streamers: Vec<DataStreamer>,
    constants: IndexMap<DataStream, i32>,
    manually_triggered: HashSet<usize>,
    /// Streams that were split for fan-out, mapped to their current tail.
    split_redirects: IndexMap<DataStream, DataStream>,
    next_auto_stream: u16,
    enforce_limits: bool,
}

impl SensorGraph {
    pub fn new(log: SharedLog, model: DeviceModel) -> Self {
        SensorGraph {
            log,
            model,
            nodes: Vec::new(),
            roots: Vec::new(),
            streamers: Vec::new(),
            constants: IndexMap::new(),
            manually_triggered: HashSet::new(),
            split_redirects: IndexMap::new(),
            next_auto_stream: AUTO_STREAM_START,
            enforce_limits: true,
        }
    }

    /// Disable device-model resource limits, for graphs that will never be
    /// programmed into a device.
    pub fn without_limits(mut self) -> Self {
        self.enforce_limits = false;
        self
    }

    pub fn log(&self) -> &SharedLog {
        &self.log
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn nodes(&self) -> &[SgNode] {
        &self.nodes
    }

    pub fn streamers(&self) -> &[DataStreamer] {
        &self.streamers
    }

    pub fn streamer(&self, index: usize) -> Option<&DataStreamer> {
        self.streamers.get(index)
    }

    pub fn streamer_mut(&mut self, index: usize) -> Option<&mut DataStreamer> {
        self.streamers.get_mut(index)
    }

    /// Remove every node, streamer and constant.  Stored readings in the
    /// sensor log are untouched.
    pub fn clear(&mut self) {
        self.nodes.clear();
        self.roots.clear();
        self.streamers.clear();
        self.constants.clear();
        self.manually_triggered.clear();
        self.split_redirects.clear();
        self.next_auto_stream = AUTO_STREAM_START;
    }

    /// Add a node to the graph.
    ///
    /// Inputs reading streams produced by existing nodes are linked
    /// downstream of those producers.  When a producer's output degree
    /// would exceed the device model bound, a `copy_all_a` splitter node is
    /// inserted on a freshly allocated stream and the new input reads the
    /// split stream instead.
    pub fn add_node(
        &mut self,
        spec: NodeSpec,
        registry: &ProcessorRegistry,
    ) -> Result<usize, EngineError> {
        if self.enforce_limits && self.nodes.len() >= self.model.max_nodes {
            return Err(EngineError::NoNodeSpace(self.model.max_nodes));
        }

        if spec.inputs.len() > self.model.max_node_inputs {
            return Err(EngineError::TooManyInputs {
                stream: spec.output,
                count: spec.inputs.len(),
                max: self.model.max_node_inputs,
            });
        }

        let func = registry
            .lookup(&spec.processor)
            .ok_or_else(|| EngineError::UnknownProcessor(spec.processor.clone()))?;

        let mut node = SgNode::new(
            spec.output,
            spec.processor.clone(),
            func,
            spec.combiner,
            self.model.max_node_outputs,
        );

        let mut is_root = false;
        // Producers that must link to this node.  Links are deferred until
        // the node's final arena index is known, because attaching may
        // insert splitter nodes first.
        let mut upstream: Vec<usize> = Vec::new();

        for (selector, trigger) in &spec.inputs {
            let mut selector = self.resolve_split(*selector);

            if selector.input() {
                is_root = true;
            } else if let Some(producer) = self.find_producer(&selector) {
                // Reroute through a splitter when the producer is out of
                // output slots
                let (rewritten, link) = self.attach_point(producer, selector, registry)?;
                selector = rewritten;
                upstream.push(link);
            } else if selector.buffered() {
                return Err(EngineError::StreamNotInUse(selector));
            }

            let walker = self.log.lock().create_walker(selector, true)?;

            // Constant walkers begin life initialized so they always read
            if selector.inexhaustible() {
                let stream = selector.as_stream()?;
                walker
                    .lock()
                    .push(&stream, Reading::new(stream.encode(), u32::MAX, 0))?;
            }

            node.inputs.push(NodeInput {
                selector,
                walker,
                trigger: *trigger,
            });
        }

        // Existing nodes may read the stream we are about to produce
        let mut downstream = Vec::new();
        for (other_index, other) in self.nodes.iter().enumerate() {
            for input in &other.inputs {
                if input.selector.matches(&node.stream) {
                    downstream.push(other_index);
                }
            }
        }
        for other_index in downstream {
            node.connect_output(other_index)?;
        }

        let new_index = self.nodes.len();
        self.nodes.push(node);

        if is_root {
            self.roots.push(new_index);
        }
        for producer in upstream {
            self.nodes[producer].connect_output(new_index)?;
        }

        Ok(new_index)
    }

    /// Find the node producing a stream matched by the selector.
    fn find_producer(&self, selector: &DataStreamSelector) -> Option<usize> {
        self.nodes
            .iter()
            .position(|node| selector.matches(&node.stream))
    }

    /// Follow split redirects so new consumers attach to the current tail
    /// of a previously split stream.
    fn resolve_split(&self, selector: DataStreamSelector) -> DataStreamSelector {
        let Ok(mut stream) = selector.as_stream() else {
            return selector;
        };

        let mut redirected = false;
        while let Some(next) = self.split_redirects.get(&stream) {
            stream = *next;
            redirected = true;
        }

        if redirected {
            DataStreamSelector::from_stream(&stream)
        } else {
            selector
        }
    }

    /// Pick the node a new consumer of `selector` should link under,
    /// splitting the producer's stream with a `copy_all_a` node when its
    /// output slots are at the reserve limit.  Returns the selector the
    /// consumer should read and the producer to link to.
    fn attach_point(
        &mut self,
        producer: usize,
        selector: DataStreamSelector,
        registry: &ProcessorRegistry,
    ) -> Result<(DataStreamSelector, usize), EngineError> {
        // The last slot is reserved for the splitter itself
        if self.nodes[producer].free_outputs() > 1 {
            return Ok((selector, producer));
        }

        let src_stream = self.nodes[producer].stream;
        let fresh = self.insert_splitter(producer, registry)?;
        self.split_redirects.insert(src_stream, fresh);

        let splitter_index = self.nodes.len() - 1;
        Ok((DataStreamSelector::from_stream(&fresh), splitter_index))
    }

    /// Insert a `(src always) => fresh using copy_all_a` node directly
    /// downstream of `producer`, taking its reserved last output slot.
    fn insert_splitter(
        &mut self,
        producer: usize,
        registry: &ProcessorRegistry,
    ) -> Result<DataStream, EngineError> {
        let src_stream = self.nodes[producer].stream;
        let fresh = self.allocate_stream(src_stream.stream_type)?;

        debug!(src = %src_stream, split = %fresh, "splitting stream at output-degree limit");

        let func = registry
            .lookup("copy_all_a")
            .ok_or_else(|| EngineError::UnknownProcessor("copy_all_a".to_string()))?;

        let selector = DataStreamSelector::from_stream(&src_stream);
        let walker = self.log.lock().create_walker(selector, true)?;

        let mut splitter = SgNode::new(
            fresh,
            "copy_all_a".to_string(),
            func,
            crate::node::TriggerCombiner::Or,
            self.model.max_node_outputs,
        );
        splitter.inputs.push(NodeInput {
            selector,
            walker,
            trigger: InputTrigger::Always,
        });

        // Splitting a constant stream carries its value to the new stream
        if src_stream.stream_type == StreamType::Constant {
            if let Some(value) = self.constants.get(&src_stream).copied() {
                self.add_constant(fresh, value)?;
            }
        }

        let splitter_index = self.nodes.len();
        self.nodes.push(splitter);
        self.nodes[producer].connect_output(splitter_index)?;

        Ok(fresh)
    }

    /// Allocate a stream id from the auto-managed range.
    fn allocate_stream(&mut self, stream_type: StreamType) -> Result<DataStream, EngineError> {
        let number = self.next_auto_stream;
        self.next_auto_stream += 1;

        Ok(DataStream::new(stream_type, number, false)?)
    }

    /// Store a constant value to be loaded into its stream walker.
    pub fn add_constant(&mut self, stream: DataStream, value: i32) -> Result<(), EngineError> {
        if self.constants.contains_key(&stream) {
            return Err(EngineError::DuplicateConstant(stream));
        }

        self.constants.insert(stream, value);
        Ok(())
    }

    /// Ensure every constant stream referenced by a node has a value,
    /// initializing missing ones to `default`.  Returns the streams that
    /// were newly initialized.
    pub fn initialize_remaining_constants(
        &mut self,
        default: i32,
    ) -> Result<Vec<DataStream>, EngineError> {
        let mut remaining = Vec::new();

        let mut referenced = Vec::new();
        for node in &self.nodes {
            for input in &node.inputs {
                if input.selector.inexhaustible() && input.selector.singular() {
                    referenced.push(input.selector.as_stream()?);
                }
            }
            if node.stream.stream_type == StreamType::Constant {
                referenced.push(node.stream);
            }
        }

        for stream in referenced {
            if !self.constants.contains_key(&stream) {
                self.constants.insert(stream, default);
                remaining.push(stream);
            }
        }

        Ok(remaining)
    }

    /// Push every stored constant into its stream walkers.
    pub fn load_constants(&mut self) -> Result<(), EngineError> {
        let mut log = self.log.lock();
        for (stream, value) in &self.constants {
            log.push(stream, Reading::new(stream.encode(), 0, *value))?;
        }

        Ok(())
    }

    pub fn constants(&self) -> impl Iterator<Item = (&DataStream, &i32)> {
        self.constants.iter()
    }

    /// Register a streamer, linking it to the sensor log and assigning its
    /// index.  Returns the index.
    pub fn add_streamer(&mut self, spec: StreamerSpec) -> Result<usize, EngineError> {
        if self.enforce_limits && self.streamers.len() >= self.model.max_streamers {
            return Err(EngineError::NoStreamerSpace(self.model.max_streamers));
        }

        let index = self.streamers.len();
        let mut streamer = DataStreamer::from_spec(spec, index);
        streamer.link_to_storage(&mut self.log.lock())?;
        self.streamers.push(streamer);

        Ok(index)
    }

    /// Process an input reading through the graph.
    ///
    /// The reading is stored first, then every root whose triggers pass is
    /// evaluated and the walk continues breadth-first through nodes that
    /// produced output.  Results are stamped with the input's `raw_time`.
    pub fn process_input(
        &mut self,
        stream: &DataStream,
        reading: Reading,
        rpc: &mut dyn RpcExecutor,
    ) -> Result<(), EngineError> {
        self.log.lock().push(stream, reading)?;

        let mut to_check: VecDeque<usize> = self.roots.iter().copied().collect();

        while let Some(index) = to_check.pop_front() {
            if !self.nodes[index].triggered() {
                continue;
            }

            let node = &self.nodes[index];
            let mut ctx = ProcessContext::new(&node.inputs, &mut *rpc);

            let results = match (node.func)(&mut ctx) {
                Ok(results) => results,
                Err(err) => {
                    // A failing node produces nothing this cycle and its
                    // downstream nodes are not visited
                    error!(node = %node.spec(), error = %err, "processing function failed");
                    continue;
                }
            };

            let marks = ctx.take_marks();
            let output_stream = node.stream;
            let downstream: Vec<usize> = node.outputs.clone();

            for mark in marks {
                if let Err(err) = self.mark_streamer(mark) {
                    error!(index = mark, error = %err, "ignoring invalid streamer mark");
                }
            }

            let produced = !results.is_empty();
            {
                let mut log = self.log.lock();
                for mut result in results {
                    result.raw_time = reading.raw_time;
                    log.push(&output_stream, result)?;
                }
            }

            if produced {
                to_check.extend(downstream);
            }
        }

        Ok(())
    }

    /// Manually mark a streamer to trigger at the next check pass.
    pub fn mark_streamer(&mut self, index: usize) -> Result<(), EngineError> {
        if index >= self.streamers.len() {
            return Err(EngineError::InvalidStreamerIndex(index));
        }

        debug!(index, "marking streamer manually");
        self.manually_triggered.insert(index);
        Ok(())
    }

    /// Check which streamers are ready to produce a report, in index order.
    ///
    /// Manual marks are drained by this call: a marked streamer that does
    /// not fire now must be marked again.  A streamer with `with_other = i`
    /// fires alongside streamer `i` when `i` fires in this pass; the
    /// coupling only looks forward, so it must reference an earlier index.
    pub fn check_streamers(&mut self, blacklist: &HashSet<usize>) -> Vec<usize> {
        let mut ready = Vec::new();
        let mut selected = HashSet::new();

        for i in 0..self.streamers.len() {
            if blacklist.contains(&i) || selected.contains(&i) {
                continue;
            }

            let marked = self.manually_triggered.remove(&i);
            if !self.streamers[i].triggered(marked) {
                continue;
            }

            debug!(index = i, manual = marked, "streamer triggered");
            ready.push(i);
            selected.insert(i);

            for j in i + 1..self.streamers.len() {
                if self.streamers[j].with_other == Some(i)
                    && !selected.contains(&j)
                    && !blacklist.contains(&j)
                    && self.streamers[j].triggered(true)
                {
                    debug!(index = j, with = i, "streamer triggered by coupling");
                    ready.push(j);
                    selected.insert(j);
                }
            }
        }

        ready.sort_unstable();
        ready
    }

    /// Topologically sort the node arena in place, remapping indices.
    ///
    /// Nodes that feed other nodes come first; ties keep insertion order.
    pub fn sort_nodes(&mut self) -> Result<(), EngineError> {
        let n = self.nodes.len();

        // indegree[i] counts producers feeding node i
        let mut indegree = vec![0usize; n];
        for node in &self.nodes {
            for &out in &node.outputs {
                indegree[out] += 1;
            }
        }

        let mut order = Vec::with_capacity(n);
        let mut remaining: Vec<bool> = vec![true; n];

        while order.len() < n {
            // Lowest-index ready node keeps ties deterministic
            let next = (0..n).find(|&i| remaining[i] && indegree[i] == 0);
            let Some(next) = next else {
                return Err(EngineError::GraphCycle);
            };

            remaining[next] = false;
            order.push(next);
            for &out in &self.nodes[next].outputs {
                indegree[out] -= 1;
            }
        }

        // position[old] = new index
        let mut position = vec![0usize; n];
        for (new_index, &old_index) in order.iter().enumerate() {
            position[old_index] = new_index;
        }

        let mut slots: Vec<Option<SgNode>> = std::mem::take(&mut self.nodes)
            .into_iter()
            .map(Some)
            .collect();
        let mut sorted: Vec<SgNode> = Vec::with_capacity(n);
        for &old_index in &order {
            if let Some(node) = slots[old_index].take() {
                sorted.push(node);
            }
        }

        for node in &mut sorted {
            for out in &mut node.outputs {
                *out = position[*out];
            }
        }
        for root in &mut self.roots {
            *root = position[*root];
        }

        self.nodes = sorted;
        Ok(())
    }

    /// Serialize the graph structure for persistence.
    pub fn dump(&self) -> GraphState {
        GraphState {
            nodes: self.nodes.iter().map(|node| node.spec()).collect(),
            streamers: self.streamers.iter().map(|s| s.spec()).collect(),
            constants: self
                .constants
                .iter()
                .map(|(stream, value)| (*stream, *value))
                .collect(),
        }
    }

    /// Rebuild the graph from a dumped structure.
    ///
    /// Splitter nodes inserted by previous fan-out handling are part of
    /// the dump, so producers are re-linked without re-splitting.
    pub fn restore(
        &mut self,
        state: &GraphState,
        registry: &ProcessorRegistry,
    ) -> Result<(), EngineError> {
        self.clear();

        for spec in &state.nodes {
            self.add_node(spec.clone(), registry)?;
        }

        for spec in &state.streamers {
            self.add_streamer(spec.clone())?;
        }

        for (stream, value) in &state.constants {
            // Ignore duplicates introduced by splitter propagation
            let _ = self.add_constant(*stream, *value);
        }

        self.load_constants()
    }
}

#[cfg(test)]
#[path = "graph_tests.rs"]
mod tests;
