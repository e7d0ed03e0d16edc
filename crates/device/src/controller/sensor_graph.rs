// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! The sensor-graph subsystem: the controller's face over the dataflow
//! engine.
//!
//! There is a distinction between the graph currently loaded and running
//! and the graph saved to persistent storage: a reset clears the running
//! graph and reloads the persisted one, re-enabling processing if a
//! persisted graph exists.

use tb_core::{errors, pack_error, streams, DataStream, Reading, Subsystem, NO_ERROR};
use tb_engine::{
    EngineError, GraphState, NodeSpec, ProcessorRegistry, RpcExecutor, SensorGraph, StreamerSpec,
};
use tracing::{debug, warn};

fn sg_error(code: u16) -> u32 {
    pack_error(Subsystem::SensorGraph, code)
}

/// Controller subsystem owning the sensor graph.
pub struct SensorGraphSubsystem {
    pub graph: SensorGraph,
    pub registry: ProcessorRegistry,
    pub enabled: bool,
    pub persisted: Option<GraphState>,
}

impl SensorGraphSubsystem {
    pub fn new(graph: SensorGraph) -> Self {
        SensorGraphSubsystem {
            graph,
            registry: ProcessorRegistry::new(),
            enabled: false,
            persisted: None,
        }
    }

    /// Add a node from its descriptor.  Returns a packed status.
    pub fn add_node(&mut self, spec: NodeSpec) -> u32 {
        match self.graph.add_node(spec, &self.registry) {
            Ok(_) => NO_ERROR,
            Err(EngineError::NoNodeSpace(_)) => {
                sg_error(errors::sensor_graph::NO_NODE_SPACE_AVAILABLE)
            }
            Err(EngineError::UnknownProcessor(_)) => {
                sg_error(errors::sensor_graph::INVALID_PROCESSING_FUNCTION)
            }
            Err(EngineError::StreamNotInUse(_)) => {
                sg_error(errors::sensor_graph::STREAM_NOT_IN_USE)
            }
            Err(_) => sg_error(errors::sensor_graph::INVALID_NODE_STREAM),
        }
    }

    /// Register a streamer.  Returns a packed status and the index.
    pub fn add_streamer(&mut self, spec: StreamerSpec) -> (u32, u16) {
        match self.graph.add_streamer(spec) {
            Ok(index) => (NO_ERROR, index as u16),
            Err(_) => (
                sg_error(errors::sensor_graph::NO_STREAMER_SPACE_AVAILABLE),
                0,
            ),
        }
    }

    /// Manually mark a streamer to fire at the next check pass.
    pub fn trigger_streamer(&mut self, index: usize) -> u32 {
        match self.graph.mark_streamer(index) {
            Ok(()) => NO_ERROR,
            Err(_) => sg_error(errors::sensor_graph::STREAMER_NOT_ALLOCATED),
        }
    }

    /// Enable or disable graph processing.
    pub fn set_online(&mut self, online: bool) -> u32 {
        debug!(online, "sensor graph online state changed");
        self.enabled = online;
        NO_ERROR
    }

    /// Save the current graph structure to persistent storage.
    pub fn persist(&mut self) -> u32 {
        self.persisted = Some(self.graph.dump());
        NO_ERROR
    }

    /// Clear the graph from RAM and persistent storage.
    pub fn reset_graph(&mut self) -> u32 {
        self.persisted = None;
        self.enabled = false;
        self.graph.clear();
        NO_ERROR
    }

    /// Feed one input into the running graph.  Disabled graphs store the
    /// reading without evaluating nodes.
    pub fn process_input(
        &mut self,
        stream: &DataStream,
        reading: Reading,
        rpc: &mut dyn RpcExecutor,
    ) {
        if !self.enabled {
            if let Err(err) = self.graph.log().lock().push(stream, reading) {
                warn!(stream = %stream, error = %err, "failed to store input while offline");
            }
            return;
        }

        if let Err(err) = self.graph.process_input(stream, reading, rpc) {
            warn!(stream = %stream, error = %err, "graph input processing failed");
        }
    }

    /// Restore the post-reset state: reload the persisted graph, push
    /// the reboot marker and re-enable processing.
    pub fn clear_to_reset(&mut self, reset_cause: i32) {
        self.graph.clear();
        self.enabled = false;

        let Some(persisted) = self.persisted.clone() else {
            return;
        };

        if let Err(err) = self.graph.restore(&persisted, &self.registry) {
            warn!(error = %err, "failed to reload persisted sensor graph");
            return;
        }

        self.enabled = true;

        // Record the reboot in the well-known reset stream
        let reset = streams::stream(streams::SYSTEM_RESET);
        if let Err(err) = self
            .graph
            .log()
            .lock()
            .push(&reset, Reading::new(streams::SYSTEM_RESET, 0, reset_cause))
        {
            warn!(error = %err, "failed to log reset reading");
        }
    }
}
