// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! RPC execution on behalf of processing functions.
//!
//! The `call_rpc` processing function needs a way to invoke RPCs on other
//! tiles.  The engine only holds this trait; the embedder decides whether
//! calls go nowhere, to a recorded table, or to a live device.

use crate::EngineError;
use std::collections::HashMap;

/// Executes an RPC and returns its 32-bit result.
pub trait RpcExecutor: Send {
    fn rpc(&mut self, address: u8, rpc_id: u16) -> Result<u32, EngineError>;
}

/// Executor that ignores every call and returns 0.
#[derive(Debug, Default, Clone)]
pub struct NullRpcExecutor;

impl RpcExecutor for NullRpcExecutor {
    fn rpc(&mut self, _address: u8, _rpc_id: u16) -> Result<u32, EngineError> {
        Ok(0)
    }
}

/// Executor backed by a recorded `(address, rpc_id) -> value` table.
///
/// Unrecorded calls return 0.  Every call is logged for inspection.
#[derive(Debug, Default)]
pub struct MockRpcExecutor {
    responses: HashMap<(u8, u16), u32>,
    pub calls: Vec<(u8, u16)>,
}

impl MockRpcExecutor {
    pub fn new() -> Self {
        MockRpcExecutor::default()
    }

    pub fn record(&mut self, address: u8, rpc_id: u16, value: u32) {
        self.responses.insert((address, rpc_id), value);
    }
}

impl RpcExecutor for MockRpcExecutor {
    fn rpc(&mut self, address: u8, rpc_id: u16) -> Result<u32, EngineError> {
        self.calls.push((address, rpc_id));
        Ok(self.responses.get(&(address, rpc_id)).copied().unwrap_or(0))
    }
}
