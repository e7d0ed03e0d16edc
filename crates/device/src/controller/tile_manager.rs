// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! The tile manager: the controller's table of registered tiles.
//!
//! Peripheral tiles check in with `REGISTER_TILE` on boot.  The manager
//! assigns their bus address, records their identity, and queues the
//! config variables they should receive followed by `START_APPLICATION`.
//! In safe mode, tiles are parked without configuration.

use serde::{Deserialize, Serialize};

/// Lifecycle state of a registered tile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TileState {
    Invalid,
    JustRegistered,
    BeingConfigured,
    Running,
    SafeMode,
}

/// Cached registration info for one tile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TileInfo {
    pub hw_type: u8,
    pub name: [u8; 6],
    pub api: (u8, u8),
    pub firmware: (u8, u8, u8),
    pub executive: (u8, u8, u8),
    pub slot: u8,
    pub unique_id: u32,
    pub state: TileState,
    pub address: Option<u8>,
}

impl TileInfo {
    /// The controller's own entry, present from boot.
    pub fn controller(name: [u8; 6]) -> Self {
        TileInfo {
            hw_type: 0,
            name,
            api: (3, 0),
            firmware: (1, 0, 0),
            executive: (1, 0, 0),
            slot: 0,
            unique_id: 0,
            state: TileState::Running,
            address: Some(8),
        }
    }

    /// Placeholder returned when an out-of-range index is described.
    pub fn invalid() -> Self {
        TileInfo {
            hw_type: 0,
            name: [0; 6],
            api: (0, 0),
            firmware: (0, 0, 0),
            executive: (0, 0, 0),
            slot: 0,
            unique_id: 0,
            state: TileState::Invalid,
            address: None,
        }
    }
}

/// Table of registered tiles keyed by slot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TileManager {
    pub registered: Vec<TileInfo>,
    pub safe_mode: bool,
    pub debug_mode: bool,
}

impl TileManager {
    pub fn new(controller_name: [u8; 6]) -> Self {
        TileManager {
            registered: vec![TileInfo::controller(controller_name)],
            safe_mode: false,
            debug_mode: false,
        }
    }

    /// Add or replace the entry for a tile's slot.
    pub fn insert_tile(&mut self, info: TileInfo) {
        for existing in &mut self.registered {
            if existing.slot == info.slot {
                *existing = info;
                return;
            }
        }

        self.registered.push(info);
    }

    pub fn count(&self) -> usize {
        self.registered.len()
    }

    pub fn describe(&self, index: usize) -> TileInfo {
        self.registered
            .get(index)
            .cloned()
            .unwrap_or_else(TileInfo::invalid)
    }

    pub fn find_by_address(&self, address: u8) -> Option<&TileInfo> {
        self.registered
            .iter()
            .find(|info| info.address == Some(address))
    }

    pub fn mark_state(&mut self, address: u8, state: TileState) {
        for info in &mut self.registered {
            if info.address == Some(address) {
                info.state = state;
            }
        }
    }

    /// Forget every peripheral; only the controller's own entry survives
    /// a reset.
    pub fn clear_to_reset(&mut self) {
        self.registered.truncate(1);
        self.safe_mode = false;
        self.debug_mode = false;
    }
}

#[cfg(test)]
#[path = "tile_manager_tests.rs"]
mod tests;
