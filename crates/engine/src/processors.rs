// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Named processing functions.
//!
//! Processing functions are plain function pointers resolved by name from a
//! registry when a node is added.  They read the node's input walkers
//! through a [`ProcessContext`] and return the readings to publish on the
//! node's output stream.

use crate::rpc_executor::RpcExecutor;
use crate::node::NodeInput;
use crate::EngineError;
use std::collections::HashMap;
use tb_core::Reading;

/// Signature of every processing function.
pub type ProcessingFn = fn(&mut ProcessContext<'_>) -> Result<Vec<Reading>, EngineError>;

/// Read access to a node's inputs during one evaluation.
pub struct ProcessContext<'a> {
    inputs: &'a [NodeInput],
    rpc: &'a mut dyn RpcExecutor,
    marked_streamers: Vec<usize>,
}

impl<'a> ProcessContext<'a> {
    pub fn new(inputs: &'a [NodeInput], rpc: &'a mut dyn RpcExecutor) -> Self {
        ProcessContext {
            inputs,
            rpc,
            marked_streamers: Vec::new(),
        }
    }

    pub fn input_count(&self) -> usize {
        self.inputs.len()
    }

    fn input(&self, index: usize) -> Result<&NodeInput, EngineError> {
        self.inputs.get(index).ok_or(EngineError::MissingInput(index))
    }

    /// Number of readings available on input `index`.
    pub fn count(&self, index: usize) -> Result<u32, EngineError> {
        Ok(self.input(index)?.walker.lock().count())
    }

    /// Whether input `index` reads a constant stream.
    pub fn is_constant(&self, index: usize) -> Result<bool, EngineError> {
        Ok(self.input(index)?.walker.lock().is_constant())
    }

    pub fn peek(&self, index: usize) -> Result<Reading, EngineError> {
        Ok(self.input(index)?.walker.lock().peek()?)
    }

    pub fn pop(&mut self, index: usize) -> Result<Reading, EngineError> {
        Ok(self.input(index)?.walker.lock().pop()?)
    }

    pub fn skip_all(&mut self, index: usize) -> Result<(), EngineError> {
        self.input(index)?.walker.lock().skip_all();
        Ok(())
    }

    /// Invoke an RPC through the embedder's executor.
    pub fn rpc(&mut self, address: u8, rpc_id: u16) -> Result<u32, EngineError> {
        self.rpc.rpc(address, rpc_id)
    }

    /// Mark a streamer for triggering at the next check pass.
    pub fn mark_streamer(&mut self, index: usize) {
        self.marked_streamers.push(index);
    }

    /// The streamer marks recorded during this evaluation.
    pub(crate) fn take_marks(&mut self) -> Vec<usize> {
        std::mem::take(&mut self.marked_streamers)
    }
}

/// Name -> function registry, pre-loaded with the built-in processors.
pub struct ProcessorRegistry {
    map: HashMap<String, ProcessingFn>,
}

impl Default for ProcessorRegistry {
    fn default() -> Self {
        let mut registry = ProcessorRegistry {
            map: HashMap::new(),
        };

        registry.register("copy_latest_a", copy_latest_a);
        registry.register("copy_all_a", copy_all_a);
        registry.register("copy_count_a", copy_count_a);
        registry.register("call_rpc", call_rpc);
        registry.register("trigger_streamer", trigger_streamer);
        registry.register("subtract_a_from_b", subtract_a_from_b);
        registry.register("average_a", average_a);

        registry
    }
}

impl ProcessorRegistry {
    pub fn new() -> Self {
        ProcessorRegistry::default()
    }

    /// Register or replace a processing function by name.
    pub fn register(&mut self, name: impl Into<String>, func: ProcessingFn) {
        self.map.insert(name.into(), func);
    }

    pub fn lookup(&self, name: &str) -> Option<ProcessingFn> {
        self.map.get(name).copied()
    }
}

/// Drain input A and emit one reading equal to the latest value.
fn copy_latest_a(ctx: &mut ProcessContext<'_>) -> Result<Vec<Reading>, EngineError> {
    // Constant streams cannot be drained; read the latched value
    if ctx.is_constant(0)? {
        return Ok(vec![ctx.peek(0)?]);
    }

    let mut latest = None;
    while ctx.count(0)? > 0 {
        latest = Some(ctx.pop(0)?);
    }

    Ok(latest.into_iter().collect())
}

/// Pop everything from input A and emit each reading.
fn copy_all_a(ctx: &mut ProcessContext<'_>) -> Result<Vec<Reading>, EngineError> {
    if ctx.is_constant(0)? {
        return Ok(vec![ctx.peek(0)?]);
    }

    let mut results = Vec::new();
    while ctx.count(0)? > 0 {
        results.push(ctx.pop(0)?);
    }

    Ok(results)
}

/// Emit one reading whose value is A's available count, then skip A.
fn copy_count_a(ctx: &mut ProcessContext<'_>) -> Result<Vec<Reading>, EngineError> {
    let count = ctx.count(0)?;
    ctx.skip_all(0)?;

    Ok(vec![Reading::new(0, 0, count as i32)])
}

/// Invoke the RPC encoded in constant input B as `(address << 16) | rpc_id`
/// and emit one reading with the 32-bit result.
fn call_rpc(ctx: &mut ProcessContext<'_>) -> Result<Vec<Reading>, EngineError> {
    let encoded = ctx.peek(1)?.value as u32;
    let address = (encoded >> 16) as u8;
    let rpc_id = (encoded & 0xFFFF) as u16;

    let value = ctx.rpc(address, rpc_id)?;
    Ok(vec![Reading::new(0, 0, value as i32)])
}

/// Mark the streamer whose index is stored in constant input B.
fn trigger_streamer(ctx: &mut ProcessContext<'_>) -> Result<Vec<Reading>, EngineError> {
    let index = usize::try_from(ctx.peek(1)?.value)
        .map_err(|_| EngineError::InvalidStreamerIndex(usize::MAX))?;

    ctx.mark_streamer(index);
    Ok(Vec::new())
}

/// Emit `B.pop() - A.peek()`.
fn subtract_a_from_b(ctx: &mut ProcessContext<'_>) -> Result<Vec<Reading>, EngineError> {
    let b = ctx.pop(1)?;
    let a = ctx.peek(0)?;

    Ok(vec![Reading::new(0, b.raw_time, b.value.wrapping_sub(a.value))])
}

/// Emit the integer mean over all available readings on A.
fn average_a(ctx: &mut ProcessContext<'_>) -> Result<Vec<Reading>, EngineError> {
    if ctx.is_constant(0)? {
        return Ok(vec![ctx.peek(0)?]);
    }

    let mut sum: i64 = 0;
    let mut count: i64 = 0;
    while ctx.count(0)? > 0 {
        sum += ctx.pop(0)?.value as i64;
        count += 1;
    }

    if count == 0 {
        return Ok(Vec::new());
    }

    Ok(vec![Reading::new(0, 0, (sum / count) as i32)])
}

#[cfg(test)]
#[path = "processors_tests.rs"]
mod tests;
