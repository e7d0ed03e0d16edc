// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Device model constraints.
//!
//! The device model captures the resource limits of the hardware a sensor
//! graph is meant to run on.  The graph builder and the sensor log consult
//! it so that an emulated graph could actually fit on the modeled device.

use serde::{Deserialize, Serialize};

/// Resource constraints of the emulated device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceModel {
    /// Maximum number of inputs a graph node may have.
    pub max_node_inputs: usize,
    /// Maximum number of downstream links from one node's output.
    pub max_node_outputs: usize,
    pub max_root_nodes: usize,
    pub max_streamers: usize,
    pub max_nodes: usize,
    /// Capacity of the storage ring buffer, in readings.
    pub max_storage_buffer: usize,
    /// Capacity of the streaming ring buffer, in readings.
    pub max_streaming_buffer: usize,
    /// Number of readings erased from the head of a full buffer on rollover.
    pub buffer_erase_size: usize,
}

impl Default for DeviceModel {
    fn default() -> Self {
        DeviceModel {
            max_node_inputs: 2,
            max_node_outputs: 4,
            max_root_nodes: 8,
            max_streamers: 8,
            max_nodes: 32,
            max_storage_buffer: 16128,
            max_streaming_buffer: 48896,
            buffer_erase_size: 256,
        }
    }
}

impl DeviceModel {
    /// A small model for tests that want to exercise rollover quickly.
    pub fn with_buffers(storage: usize, streaming: usize, erase_size: usize) -> Self {
        DeviceModel {
            max_storage_buffer: storage,
            max_streaming_buffer: streaming,
            buffer_erase_size: erase_size,
            ..Default::default()
        }
    }
}
