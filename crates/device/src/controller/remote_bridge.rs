// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! The remote bridge: staged reception of update scripts.
//!
//! A state machine driven by four RPCs: `begin_script` opens reception,
//! `end_script` seals it, `trigger_script` processes the received bytes,
//! and `reset_script` abandons everything.  Illegal transitions return a
//! status code without mutating state.

use serde::{Deserialize, Serialize};
use tracing::debug;

/// Status code returned by an RPC attempted in the wrong state.
pub const BRIDGE_WRONG_STATE: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u32)]
pub enum BridgeStatus {
    Idle = 0,
    Waiting = 1,
    Receiving = 2,
    Received = 3,
    Validated = 4,
    Executing = 5,
}

/// Remote bridge state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteBridge {
    pub status: BridgeStatus,
    pub error: u32,
    /// Script bytes accumulated between begin and end.
    pub script: Vec<u8>,
}

impl RemoteBridge {
    pub fn new() -> Self {
        RemoteBridge {
            status: BridgeStatus::Idle,
            error: 0,
            script: Vec::new(),
        }
    }

    /// `begin_script`: open reception unless a script is mid-flight.
    pub fn begin_script(&mut self) -> u32 {
        if matches!(
            self.status,
            BridgeStatus::Received | BridgeStatus::Validated | BridgeStatus::Executing
        ) {
            return BRIDGE_WRONG_STATE;
        }

        self.status = BridgeStatus::Waiting;
        self.error = 0;
        self.script.clear();
        0
    }

    /// `push_script_chunk`: append received bytes.
    pub fn push_chunk(&mut self, data: &[u8]) -> u32 {
        if !matches!(self.status, BridgeStatus::Waiting | BridgeStatus::Receiving) {
            return BRIDGE_WRONG_STATE;
        }

        self.status = BridgeStatus::Receiving;
        self.script.extend_from_slice(data);
        0
    }

    /// `end_script`: seal the received bytes.
    pub fn end_script(&mut self) -> u32 {
        if !matches!(
            self.status,
            BridgeStatus::Waiting | BridgeStatus::Receiving | BridgeStatus::Received
        ) {
            return BRIDGE_WRONG_STATE;
        }

        self.status = BridgeStatus::Received;
        0
    }

    /// `trigger_script`: process a sealed script and return to idle.
    pub fn trigger_script(&mut self) -> u32 {
        if self.status != BridgeStatus::Received {
            return BRIDGE_WRONG_STATE;
        }

        debug!(len = self.script.len(), "processing received script");

        if self.script.is_empty() {
            // Nothing arrived between begin and end
            self.error = 1;
        } else {
            self.error = 0;
        }

        self.status = BridgeStatus::Idle;
        0
    }

    /// `query_status`: current status and last error.
    pub fn query_status(&self) -> (u32, u32) {
        (self.status as u32, self.error)
    }

    /// `reset_script`: abandon any partially received script.
    pub fn reset_script(&mut self) -> u32 {
        self.status = BridgeStatus::Idle;
        self.error = 0;
        self.script.clear();
        0
    }

    pub fn clear_to_reset(&mut self) {
        self.status = BridgeStatus::Idle;
        self.error = 0;
    }
}

impl Default for RemoteBridge {
    fn default() -> Self {
        RemoteBridge::new()
    }
}

#[cfg(test)]
#[path = "remote_bridge_tests.rs"]
mod tests;
