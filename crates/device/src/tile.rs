// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Tiles: addressable units on the emulated bus.
//!
//! Every tile carries a config variable store and answers the universal
//! config RPCs.  Peripheral tiles additionally register with the
//! controller on boot, receive streamed config variables, and latch them
//! when `START_APPLICATION` arrives.

use crate::emulation_loop::LoopHandle;
use crate::error::{DeviceError, RpcError};
use crate::idle::LoopEvent;
use crate::rpc_queue::RpcOutcome;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::BTreeMap;
use tb_core::{rpcs, ErrorCode, Packer, Unpacker};
use tracing::debug;

/// Config variables are streamed in chunks of this many bytes.
pub const CONFIG_CHUNK_SIZE: usize = 16;

/// Run level assigned to a tile at registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u16)]
pub enum RunLevel {
    StartOnCommand = 0,
    SafeMode = 1,
}

impl RunLevel {
    pub fn from_code(code: u16) -> Self {
        if code == RunLevel::SafeMode as u16 {
            RunLevel::SafeMode
        } else {
            RunLevel::StartOnCommand
        }
    }
}

/// A latched, typed config variable value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ConfigValue {
    Int(i64),
    Array(Vec<i64>),
    Bytes(Vec<u8>),
}

impl ConfigValue {
    pub fn as_bool(&self) -> bool {
        matches!(self, ConfigValue::Int(v) if *v != 0)
    }

    pub fn as_u32(&self) -> Option<u32> {
        match self {
            ConfigValue::Int(v) => u32::try_from(*v).ok(),
            _ => None,
        }
    }
}

/// The latched config variables of one tile, keyed by declared name.
pub type ConfigValues = BTreeMap<String, ConfigValue>;

/// One declared config variable and its current binary value.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigDescriptor {
    pub config_id: u16,
    pub name: String,
    pub type_name: String,
    total_size: usize,
    unit_size: usize,
    signed: bool,
    variable: bool,
    default: Option<Vec<u8>>,
    current: Vec<u8>,
}

impl ConfigDescriptor {
    /// Declare a config variable from a C-style type name such as
    /// `uint32_t` or `uint8_t[16]`.
    pub fn new(
        config_id: u16,
        name: impl Into<String>,
        type_name: &str,
        default: Option<i64>,
    ) -> Result<Self, RpcError> {
        let (unit_size, signed, count) = parse_type_name(type_name)?;
        let variable = count.is_some();
        let total_size = unit_size * count.unwrap_or(1);

        let default = default.map(|value| encode_scalar(value, unit_size));

        let mut descriptor = ConfigDescriptor {
            config_id,
            name: name.into(),
            type_name: type_name.to_string(),
            total_size,
            unit_size,
            signed,
            variable,
            default,
            current: Vec::new(),
        };
        descriptor.clear();

        Ok(descriptor)
    }

    /// Reset the stored value to its declared default.
    pub fn clear(&mut self) {
        self.current = self.default.clone().unwrap_or_default();
    }

    /// Overwrite part of the stored value.  Returns an RPC error code.
    ///
    /// Writing at an offset below the current length truncates, matching
    /// the stream-from-low-offsets contract of `SET_CONFIG_VARIABLE`.
    pub fn update_value(&mut self, offset: usize, data: &[u8]) -> u16 {
        if offset + data.len() > self.total_size {
            return ErrorCode::InputBufferTooLong.code();
        }

        if self.current.len() < offset {
            self.current.resize(offset, 0);
        }
        self.current.truncate(offset);
        self.current.extend_from_slice(data);

        ErrorCode::NoError.code()
    }

    /// A chunk of the stored value for `GET_CONFIG_VARIABLE`.
    pub fn read_chunk(&self, offset: usize) -> &[u8] {
        if offset >= self.current.len() {
            return &[];
        }

        let end = (offset + CONFIG_CHUNK_SIZE).min(self.current.len());
        &self.current[offset..end]
    }

    pub fn has_data(&self) -> bool {
        !self.current.is_empty()
    }

    /// Encoded size-and-flags field for `DESCRIBE_CONFIG_VARIABLE`.
    pub fn flags(&self) -> u16 {
        let size = (self.total_size as u16) & 0x7FFF;
        size | ((self.variable as u16) << 15)
    }

    /// Convert the current binary value to a typed value.
    pub fn latch(&self) -> Result<ConfigValue, RpcError> {
        if self.current.is_empty() {
            return Err(RpcError::InvalidState(format!(
                "config variable {} has no data to latch",
                self.name
            )));
        }

        // Zero-pad a partial trailing unit, as the C runtime would
        let mut data = self.current.clone();
        let remainder = data.len() % self.unit_size;
        if remainder != 0 {
            data.resize(data.len() + self.unit_size - remainder, 0);
        }

        if self.variable && self.unit_size == 1 && !self.signed {
            return Ok(ConfigValue::Bytes(data));
        }

        let mut units = Vec::with_capacity(data.len() / self.unit_size);
        for chunk in data.chunks(self.unit_size) {
            units.push(decode_scalar(chunk, self.signed));
        }

        if self.variable {
            Ok(ConfigValue::Array(units))
        } else {
            Ok(ConfigValue::Int(units[0]))
        }
    }
}

fn parse_type_name(type_name: &str) -> Result<(usize, bool, Option<usize>), RpcError> {
    let (base, count) = match type_name.split_once('[') {
        Some((base, rest)) => {
            let digits = rest.strip_suffix(']').ok_or_else(|| {
                RpcError::InvalidArgument(format!("malformed config type: {}", type_name))
            })?;
            let count: usize = digits.parse().map_err(|_| {
                RpcError::InvalidArgument(format!("malformed config type: {}", type_name))
            })?;
            (base, Some(count))
        }
        None => (type_name, None),
    };

    let (unit_size, signed) = match base {
        "uint8_t" => (1, false),
        "int8_t" => (1, true),
        "uint16_t" => (2, false),
        "int16_t" => (2, true),
        "uint32_t" => (4, false),
        "int32_t" => (4, true),
        other => {
            return Err(RpcError::InvalidArgument(format!(
                "unknown config type: {}",
                other
            )))
        }
    };

    Ok((unit_size, signed, count))
}

fn encode_scalar(value: i64, unit_size: usize) -> Vec<u8> {
    value.to_le_bytes()[..unit_size].to_vec()
}

fn decode_scalar(bytes: &[u8], signed: bool) -> i64 {
    let mut raw = [0u8; 8];
    raw[..bytes.len()].copy_from_slice(bytes);

    if signed && bytes.last().map(|b| b & 0x80 != 0).unwrap_or(false) {
        for byte in raw.iter_mut().skip(bytes.len()) {
            *byte = 0xFF;
        }
    }

    i64::from_le_bytes(raw)
}

/// State shared by every tile: address, name, config store, lifecycle
/// events.
pub struct TileBase {
    pub address: u8,
    pub name: [u8; 6],
    pub hardware_string: [u8; 10],
    pub firmware_version: (u8, u8, u8),
    pub executive_version: (u8, u8, u8),
    pub api_version: (u8, u8),
    pub hardware_type: u8,
    pub app_started: bool,
    pub initialized: LoopEvent,
    pub handle: LoopHandle,
    config: BTreeMap<u16, ConfigDescriptor>,
}

impl TileBase {
    pub fn new(address: u8, name: &str, handle: LoopHandle) -> Self {
        let mut padded = [b' '; 6];
        for (slot, byte) in padded.iter_mut().zip(name.bytes()) {
            *slot = byte;
        }

        let initialized = handle.create_event(true);

        TileBase {
            address,
            name: padded,
            hardware_string: *b"tb-rs-tile",
            firmware_version: (1, 0, 0),
            executive_version: (1, 0, 0),
            api_version: (3, 0),
            hardware_type: 0,
            app_started: false,
            initialized,
            handle,
            config: BTreeMap::new(),
        }
    }

    /// Declare a config variable this tile accepts.
    pub fn declare_config_variable(
        &mut self,
        name: &str,
        config_id: u16,
        type_name: &str,
        default: Option<i64>,
    ) -> Result<(), RpcError> {
        let descriptor = ConfigDescriptor::new(config_id, name, type_name, default)?;
        self.config.insert(config_id, descriptor);
        Ok(())
    }

    /// Reset every config variable to its default.
    pub fn reset_config_variables(&mut self) {
        for descriptor in self.config.values_mut() {
            descriptor.clear();
        }
    }

    /// Snapshot of all current typed values, skipping unset variables.
    pub fn latch_config_variables(&self) -> ConfigValues {
        let mut values = ConfigValues::new();
        for descriptor in self.config.values() {
            if !descriptor.has_data() {
                continue;
            }
            if let Ok(value) = descriptor.latch() {
                values.insert(descriptor.name.clone(), value);
            }
        }

        values
    }

    pub fn config_descriptor(&self, config_id: u16) -> Option<&ConfigDescriptor> {
        self.config.get(&config_id)
    }

    /// Handle the universal RPCs every tile answers.  Returns `None` for
    /// ids this layer does not implement.
    pub fn handle_common_rpc(
        &mut self,
        rpc_id: u16,
        payload: &[u8],
    ) -> Option<Result<RpcOutcome, RpcError>> {
        match rpc_id {
            id if id == rpcs::LIST_CONFIG_VARIABLES.rpc_id => {
                Some(self.list_config_variables(payload))
            }
            id if id == rpcs::DESCRIBE_CONFIG_VARIABLE.rpc_id => {
                Some(self.describe_config_variable(payload))
            }
            id if id == rpcs::SET_CONFIG_VARIABLE.rpc_id => Some(self.set_config_variable(payload)),
            id if id == rpcs::GET_CONFIG_VARIABLE.rpc_id => Some(self.get_config_variable(payload)),
            id if id == rpcs::TILE_STATUS.rpc_id => Some(self.tile_status()),
            id if id == rpcs::HARDWARE_VERSION.rpc_id => Some(Ok(RpcOutcome::Reply(
                self.hardware_string.to_vec(),
            ))),
            _ => None,
        }
    }

    fn list_config_variables(&self, payload: &[u8]) -> Result<RpcOutcome, RpcError> {
        let mut args = Unpacker::new(payload);
        let offset = args.u16()? as usize;
        args.done()?;

        let ids: Vec<u16> = self.config.keys().copied().skip(offset).take(9).collect();

        let mut reply = Packer::new().u16(ids.len() as u16);
        for index in 0..9 {
            reply = reply.u16(ids.get(index).copied().unwrap_or(0));
        }

        Ok(RpcOutcome::Reply(reply.into_vec()))
    }

    fn describe_config_variable(&self, payload: &[u8]) -> Result<RpcOutcome, RpcError> {
        let mut args = Unpacker::new(payload);
        let config_id = args.u16()?;
        args.done()?;

        let reply = match self.config.get(&config_id) {
            Some(descriptor) => Packer::new()
                .u16(ErrorCode::NoError.code())
                .u16(0)
                .u32(0)
                .u16(config_id)
                .u16(descriptor.flags()),
            None => Packer::new()
                .u16(ErrorCode::InvalidArrayKey.code())
                .u16(0)
                .u32(0)
                .u16(0)
                .u16(0),
        };

        Ok(RpcOutcome::Reply(reply.into_vec()))
    }

    fn set_config_variable(&mut self, payload: &[u8]) -> Result<RpcOutcome, RpcError> {
        let mut args = Unpacker::new(payload);
        let config_id = args.u16()?;
        let offset = args.u16()? as usize;
        let data = args.tail();

        let code = if self.app_started {
            ErrorCode::StateChangeAtInvalidTime.code()
        } else {
            match self.config.get_mut(&config_id) {
                Some(descriptor) => {
                    debug!(
                        address = self.address,
                        config_id,
                        offset,
                        len = data.len(),
                        "set config variable"
                    );
                    descriptor.update_value(offset, data)
                }
                None => ErrorCode::InvalidArrayKey.code(),
            }
        };

        Ok(RpcOutcome::Reply(Packer::new().u16(code).into_vec()))
    }

    fn get_config_variable(&self, payload: &[u8]) -> Result<RpcOutcome, RpcError> {
        let mut args = Unpacker::new(payload);
        let config_id = args.u16()?;
        let offset = args.u16()? as usize;
        args.done()?;

        let chunk = self
            .config
            .get(&config_id)
            .map(|descriptor| descriptor.read_chunk(offset).to_vec())
            .unwrap_or_default();

        Ok(RpcOutcome::Reply(chunk))
    }

    fn tile_status(&self) -> Result<RpcOutcome, RpcError> {
        let flags: u16 = if self.app_started { 1 } else { 0 };

        let reply = Packer::new()
            .u16(flags)
            .bytes(&self.name)
            .u8(self.firmware_version.0)
            .u8(self.firmware_version.1)
            .u8(self.firmware_version.2)
            .u8(0);

        Ok(RpcOutcome::Reply(reply.into_vec()))
    }

    /// Serialize the config store and lifecycle flags.
    pub fn snapshot(&self) -> serde_json::Value {
        json!({
            "address": self.address,
            "app_started": self.app_started,
            "config": self.config,
        })
    }

    pub fn restore(&mut self, state: &serde_json::Value) -> Result<(), DeviceError> {
        if let Some(config) = state.get("config") {
            self.config = serde_json::from_value(config.clone())?;
        }
        self.app_started = state
            .get("app_started")
            .and_then(|v| v.as_bool())
            .unwrap_or(false);

        Ok(())
    }
}

/// A tile on the emulated bus.
pub trait Tile: Send {
    fn base(&self) -> &TileBase;
    fn base_mut(&mut self) -> &mut TileBase;

    /// Handle one RPC.  Implementations handle their private ids and
    /// delegate everything else to [`TileBase::handle_common_rpc`].
    fn handle_rpc(&mut self, rpc_id: u16, payload: &[u8]) -> Result<RpcOutcome, RpcError>;

    /// Clear volatile state back to the post-reset condition.
    fn clear_to_reset(&mut self) {
        let base = self.base_mut();
        base.reset_config_variables();
        base.app_started = false;
        base.initialized.clear();
    }

    /// Spawn this tile's background tasks.  Called once when the device
    /// starts and again after the tile is reset.
    fn start_tasks(&mut self) -> Result<(), RpcError> {
        Ok(())
    }

    /// The `REGISTER_TILE` argument payload, or `None` for tiles that do
    /// not register (the controller).
    fn registration_payload(&self) -> Option<Vec<u8>> {
        None
    }

    /// Record the controller's registration response.
    fn process_registration(&mut self, _response: &[u8]) -> Result<(), RpcError> {
        Ok(())
    }

    fn snapshot(&self) -> serde_json::Value {
        self.base().snapshot()
    }

    fn restore(&mut self, state: &serde_json::Value) -> Result<(), DeviceError> {
        self.base_mut().restore(state)
    }
}

/// Peripheral-specific state: registration results and the run level.
pub struct PeripheralTile {
    pub run_level: Option<RunLevel>,
    pub debug_mode: bool,
}

impl PeripheralTile {
    pub fn new() -> Self {
        PeripheralTile {
            run_level: None,
            debug_mode: false,
        }
    }

    /// The argument payload for `REGISTER_TILE`.
    pub fn registration_payload(base: &TileBase) -> Vec<u8> {
        Packer::new()
            .u8(base.hardware_type)
            .u8(base.api_version.0)
            .u8(base.api_version.1)
            .bytes(&base.name)
            .u8(base.firmware_version.0)
            .u8(base.firmware_version.1)
            .u8(base.firmware_version.2)
            .u8(base.executive_version.0)
            .u8(base.executive_version.1)
            .u8(base.executive_version.2)
            .u8(base.address - 10)
            .u32(0)
            .into_vec()
    }

    /// Record the controller's `REGISTER_TILE` response.
    pub fn process_registration(&mut self, response: &[u8]) -> Result<(), RpcError> {
        let mut fields = Unpacker::new(response);
        let _address = fields.u16()?;
        let run_level = fields.u16()?;
        let debug = fields.u16()?;
        fields.done()?;

        self.run_level = Some(RunLevel::from_code(run_level));
        self.debug_mode = debug != 0;
        Ok(())
    }

    /// Handle `START_APPLICATION`: latch config and start the app.
    pub fn start_application(&mut self, base: &mut TileBase) -> RpcOutcome {
        base.app_started = true;
        debug!(address = base.address, "application started");
        RpcOutcome::Reply(Vec::new())
    }
}

impl Default for PeripheralTile {
    fn default() -> Self {
        PeripheralTile::new()
    }
}

#[cfg(test)]
#[path = "tile_tests.rs"]
mod tests;
