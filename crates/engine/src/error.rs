// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Error types for the sensor-graph engine

use tb_core::{DataStream, DataStreamSelector};
use thiserror::Error;

/// Errors that can occur while building or running a sensor graph
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("storage error: {0}")]
    Storage(#[from] tb_storage::StorageError),
    #[error("stream error: {0}")]
    Stream(#[from] tb_core::StreamError),
    #[error("maximum number of nodes exceeded: {0}")]
    NoNodeSpace(usize),
    #[error("maximum number of streamers exceeded: {0}")]
    NoStreamerSpace(usize),
    #[error("node {stream} has too many inputs: {count} > {max}")]
    TooManyInputs {
        stream: DataStream,
        count: usize,
        max: usize,
    },
    #[error("too many nodes connected to the output of {0}")]
    TooManyOutputs(DataStream),
    #[error("unknown processing function: {0}")]
    UnknownProcessor(String),
    #[error("node input {0} refers to a stream no existing node produces")]
    StreamNotInUse(DataStreamSelector),
    #[error("sensor graph contains a cycle")]
    GraphCycle,
    #[error("invalid streamer index: {0}")]
    InvalidStreamerIndex(usize),
    #[error("constant {0} was already assigned")]
    DuplicateConstant(DataStream),
    #[error("processing function read missing input {0}")]
    MissingInput(usize),
    #[error("max_size too small to hold a single reading: {0} bytes")]
    ReportTooSmall(usize),
    #[error("streamer is not linked to a sensor log")]
    StreamerNotLinked,
    #[error("report format requires a report id")]
    MissingReportId,
    #[error("rpc failed with status {0:#010x}")]
    RpcRuntime(u32),
    #[error("signing failed: {0}")]
    SigningFailed(String),
}
