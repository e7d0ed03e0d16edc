// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! The config database: persistent config variables streamed to tiles.
//!
//! An append-only log of `(target, var_id, data)` entries with bounded
//! control and data space.  Committing an entry invalidates earlier
//! entries for the same `(target, var_id)`; invalid entries waste space
//! until `compact` removes them.  On tile registration the database
//! produces the `SET_CONFIG_VARIABLE` calls for every matching entry,
//! chunked to 16 bytes.

use crate::tile::CONFIG_CHUNK_SIZE;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tb_core::{rpcs, ErrorCode, Packer, SlotId};

/// Control-table bytes consumed by one entry.
const ENTRY_CONTROL_SIZE: usize = 16;

/// Bytes of data-space overhead per entry (the stored var id).
const ENTRY_DATA_OVERHEAD: usize = 2;

/// What a config entry targets: a slot position or a tile name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfigTarget {
    Slot(SlotId),
    Name([u8; 6]),
}

impl ConfigTarget {
    /// Whether this target selects the tile at `address` with `name`.
    pub fn matches(&self, address: u8, name: &[u8; 6]) -> bool {
        match self {
            ConfigTarget::Slot(slot) => slot.matches_address(address),
            ConfigTarget::Name(target) => target == name,
        }
    }
}

impl fmt::Display for ConfigTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigTarget::Slot(slot) => write!(f, "{}", slot),
            ConfigTarget::Name(name) => {
                write!(f, "name {}", String::from_utf8_lossy(name).trim_end())
            }
        }
    }
}

impl FromStr for ConfigTarget {
    type Err = tb_core::slot::SlotError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Some(rest) = s.strip_prefix("name ") {
            let mut name = [b' '; 6];
            for (slot, byte) in name.iter_mut().zip(rest.bytes()) {
                *slot = byte;
            }
            return Ok(ConfigTarget::Name(name));
        }

        Ok(ConfigTarget::Slot(s.parse()?))
    }
}

/// One config variable assignment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigEntry {
    pub target: ConfigTarget,
    pub var_id: u16,
    pub data: Vec<u8>,
    pub valid: bool,
}

impl ConfigEntry {
    fn data_space(&self) -> usize {
        self.data.len() + ENTRY_DATA_OVERHEAD
    }

    /// The `SET_CONFIG_VARIABLE` calls that stream this entry to a tile,
    /// as `(address, rpc_id, payload)` tuples.
    pub fn generate_rpcs(&self, address: u8) -> Vec<(u8, u16, Vec<u8>)> {
        let mut calls = Vec::new();

        for (chunk_index, chunk) in self.data.chunks(CONFIG_CHUNK_SIZE).enumerate() {
            let payload = Packer::new()
                .u16(self.var_id)
                .u16((chunk_index * CONFIG_CHUNK_SIZE) as u16)
                .bytes(chunk)
                .into_vec();
            calls.push((address, rpcs::SET_CONFIG_VARIABLE.rpc_id, payload));
        }

        calls
    }
}

/// Append-only config entry log with space accounting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigDatabase {
    control_size: usize,
    data_size: usize,
    pub entries: Vec<ConfigEntry>,
    #[serde(skip)]
    in_progress: Option<ConfigEntry>,
    data_index: usize,
}

impl ConfigDatabase {
    pub fn new(control_size: usize, data_size: usize) -> Self {
        ConfigDatabase {
            control_size,
            data_size,
            entries: Vec::new(),
            in_progress: None,
            data_index: 0,
        }
    }

    /// Maximum number of committed entries the control space can hold.
    pub fn max_entries(&self) -> usize {
        self.control_size / ENTRY_CONTROL_SIZE - 1
    }

    pub fn entry_count(&self) -> usize {
        self.entries.len()
    }

    pub fn used_data_space(&self) -> usize {
        self.data_index
    }

    pub fn data_size(&self) -> usize {
        self.data_size
    }

    /// Begin a new entry.  An unfinished previous entry is abandoned but
    /// its committed data space stays consumed.
    pub fn start_entry(&mut self, target: ConfigTarget, var_id: u16) -> u16 {
        let entry = ConfigEntry {
            target,
            var_id,
            data: Vec::new(),
            valid: true,
        };

        if self.entries.len() >= self.max_entries() {
            return ErrorCode::DestinationBufferTooSmall.code();
        }

        if self.data_size - self.data_index < ENTRY_DATA_OVERHEAD {
            return ErrorCode::DestinationBufferTooSmall.code();
        }

        self.data_index += ENTRY_DATA_OVERHEAD;
        self.in_progress = Some(entry);

        ErrorCode::NoError.code()
    }

    /// Append data to the in-progress entry.
    pub fn add_data(&mut self, data: &[u8]) -> u16 {
        if self.data_size - self.data_index < data.len() {
            return ErrorCode::DestinationBufferTooSmall.code();
        }

        if let Some(entry) = self.in_progress.as_mut() {
            entry.data.extend_from_slice(data);
            self.data_index += data.len();
        }

        ErrorCode::NoError.code()
    }

    /// Commit the in-progress entry, invalidating earlier entries for
    /// the same `(target, var_id)`.
    pub fn end_entry(&mut self) -> u16 {
        let Some(entry) = self.in_progress.take() else {
            return ErrorCode::NoError.code();
        };

        if entry.data.is_empty() {
            return ErrorCode::InputBufferWrongSize.code();
        }

        for existing in &mut self.entries {
            if existing.target == entry.target && existing.var_id == entry.var_id {
                existing.valid = false;
            }
        }

        self.entries.push(entry);
        ErrorCode::NoError.code()
    }

    /// Remove invalidated entries, reclaiming their data space.
    pub fn compact(&mut self) {
        let mut reclaimed = 0;
        self.entries.retain(|entry| {
            if entry.valid {
                true
            } else {
                reclaimed += entry.data_space();
                false
            }
        });

        self.data_index -= reclaimed;
    }

    /// Mark one entry invalid by index.
    pub fn invalidate(&mut self, index: usize) -> u16 {
        match self.entries.get_mut(index) {
            Some(entry) => {
                entry.valid = false;
                ErrorCode::NoError.code()
            }
            None => ErrorCode::InvalidArrayKey.code(),
        }
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.in_progress = None;
        self.data_index = 0;
    }

    /// Directly add an entry, for scenarios and tests.
    pub fn add_direct(&mut self, target: ConfigTarget, var_id: u16, data: &[u8]) -> u16 {
        let code = self.start_entry(target, var_id);
        if code != ErrorCode::NoError.code() {
            return code;
        }

        let code = self.add_data(data);
        if code != ErrorCode::NoError.code() {
            return code;
        }

        self.end_entry()
    }

    /// The ordered `SET_CONFIG_VARIABLE` calls for every valid entry
    /// matching the given tile.
    pub fn stream_matching(&self, address: u8, name: &[u8; 6]) -> Vec<(u8, u16, Vec<u8>)> {
        let mut calls = Vec::new();

        for entry in &self.entries {
            if entry.valid && entry.target.matches(address, name) {
                calls.extend(entry.generate_rpcs(address));
            }
        }

        calls
    }
}

#[cfg(test)]
#[path = "config_database_tests.rs"]
mod tests;
