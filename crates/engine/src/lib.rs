// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! tb-engine: The sensor-graph dataflow engine
//!
//! A sensor graph is a DAG of processing nodes fed by named streams.
//! Readings arriving on input streams trigger a breadth-first walk of the
//! graph; triggered nodes run a named processing function over their input
//! walkers and publish results to their output stream.  Streamers watch
//! selected streams and package accumulated readings into reports.

mod error;
mod graph;
mod node;
mod processors;
mod report;
mod rpc_executor;
mod streamer;
mod trigger;

pub use error::EngineError;
pub use graph::{GraphState, SensorGraph};
pub use node::{NodeInput, NodeSpec, SgNode, TriggerCombiner};
pub use processors::{ProcessContext, ProcessingFn, ProcessorRegistry};
pub use report::{
    HashOnlySigner, IndividualReport, ListReport, ReportSigner, SignatureKind, INDIVIDUAL_REPORT_LEN,
    LIST_REPORT_FOOTER_LEN, LIST_REPORT_HEADER_LEN, LIST_REPORT_READING_LEN,
};
pub use rpc_executor::{MockRpcExecutor, NullRpcExecutor, RpcExecutor};
pub use streamer::{DataStreamer, ReportFormat, StreamerReport, StreamerSpec};
pub use trigger::{CompareOp, InputTrigger, TriggerSource};
