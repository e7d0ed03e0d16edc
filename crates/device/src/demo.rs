// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! A demo peripheral tile exercising every handler shape.
//!
//! The demo tile answers a synchronous echo, an asynchronous echo whose
//! response is produced by a background worker through the deferred-RPC
//! path, and a counter.  It also declares two config variables so config
//! streaming can be observed end to end.

use crate::device::Device;
use crate::emulation_loop::LoopHandle;
use crate::error::RpcError;
use crate::idle::{LoopEvent, WorkQueue};
use crate::rpc_queue::RpcOutcome;
use crate::tile::{PeripheralTile, Tile, TileBase};
use serde_json::json;
use std::sync::Arc;
use tb_core::{rpcs, DeviceModel, Packer, Unpacker};
use tracing::error;

/// Default bus address of the demo tile (slot 1).
pub const DEMO_TILE_ADDRESS: u8 = 11;

/// Asynchronously echo the 32-bit argument.
pub const RPC_ASYNC_ECHO: u16 = 0x8000;
/// Synchronously echo the 32-bit argument.
pub const RPC_SYNC_ECHO: u16 = 0x8001;
/// Return a counter that increments on every call.
pub const RPC_COUNTER: u16 = 0x8002;

struct EchoWork {
    rpc_id: u16,
    value: u32,
}

/// A basic peripheral tile with sync, async and counter RPCs.
pub struct DemoTile {
    base: TileBase,
    peripheral: PeripheralTile,
    counter: u32,
    work: Arc<WorkQueue<EchoWork>>,
    /// Gate the worker waits on before completing async echoes.  Set by
    /// default; tests clear it to hold a deferred RPC open.
    echo_gate: LoopEvent,
}

impl DemoTile {
    pub fn new(address: u8, handle: LoopHandle) -> Result<Self, RpcError> {
        let mut base = TileBase::new(address, "emudmo", handle.clone());
        base.declare_config_variable("test 1", 0x8000, "uint32_t", None)?;
        base.declare_config_variable("test 2", 0x8001, "uint8_t[16]", None)?;

        let echo_gate = handle.create_event(false);
        echo_gate.set();

        Ok(DemoTile {
            base,
            peripheral: PeripheralTile::new(),
            counter: 0,
            work: handle.create_queue(false),
            echo_gate,
        })
    }

    /// Handle used by tests to hold async echoes open.
    pub fn echo_gate(&self) -> LoopEvent {
        self.echo_gate.clone()
    }

    /// The tile's current counter value, for test assertions.
    pub fn counter(&self) -> u32 {
        self.counter
    }

    /// Preload the counter, used by the `loaded_counter` scenario.
    pub fn load_counter(&mut self, counter: u32) {
        self.counter = counter;
    }

    /// The latched value of a config variable, decoded as u32.
    pub fn config_u32(&self, config_id: u16) -> Option<u32> {
        let descriptor = self.base.config_descriptor(config_id)?;
        descriptor.latch().ok()?.as_u32()
    }
}

impl Tile for DemoTile {
    fn base(&self) -> &TileBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut TileBase {
        &mut self.base
    }

    fn handle_rpc(&mut self, rpc_id: u16, payload: &[u8]) -> Result<RpcOutcome, RpcError> {
        match rpc_id {
            RPC_ASYNC_ECHO => {
                let mut args = Unpacker::new(payload);
                let value = args.u32()?;
                args.done()?;

                // The dispatcher knows which rpc is running; record it so
                // the worker can finish the right one
                let (_, current_rpc) = self
                    .base
                    .handle
                    .current_rpc()
                    .unwrap_or((self.base.address, rpc_id));

                self.work.push(EchoWork {
                    rpc_id: current_rpc,
                    value,
                });
                Ok(RpcOutcome::Deferred)
            }
            RPC_SYNC_ECHO => {
                let mut args = Unpacker::new(payload);
                let value = args.u32()?;
                args.done()?;

                Ok(RpcOutcome::Reply(Packer::new().u32(value).into_vec()))
            }
            RPC_COUNTER => {
                let value = self.counter;
                self.counter += 1;
                Ok(RpcOutcome::Reply(Packer::new().u32(value).into_vec()))
            }
            id if id == rpcs::START_APPLICATION.rpc_id => {
                Ok(self.peripheral.start_application(&mut self.base))
            }
            _ => self
                .base
                .handle_common_rpc(rpc_id, payload)
                .unwrap_or(Err(RpcError::UnsupportedRpc {
                    address: self.base.address,
                    rpc_id,
                })),
        }
    }

    fn start_tasks(&mut self) -> Result<(), RpcError> {
        let handle = self.base.handle.clone();
        let work = self.work.clone();
        let gate = self.echo_gate.clone();
        let address = self.base.address;

        self.base.handle.add_task(Some(address), async move {
            loop {
                let item = work.recv().await;
                gate.wait().await;

                let reply = Packer::new().u32(item.value).into_vec();
                if let Err(err) = handle.finish_async_rpc(address, item.rpc_id, Ok(reply)) {
                    error!(address, error = %err, "failed to finish async echo");
                }

                work.task_done();
            }
        })
    }

    fn registration_payload(&self) -> Option<Vec<u8>> {
        Some(PeripheralTile::registration_payload(&self.base))
    }

    fn process_registration(&mut self, response: &[u8]) -> Result<(), RpcError> {
        self.peripheral.process_registration(response)
    }

    fn snapshot(&self) -> serde_json::Value {
        let mut state = self.base.snapshot();
        state["counter"] = json!(self.counter);
        state
    }

    fn restore(&mut self, state: &serde_json::Value) -> Result<(), crate::error::DeviceError> {
        self.base.restore(state)?;
        self.counter = state.get("counter").and_then(|v| v.as_u64()).unwrap_or(0) as u32;
        Ok(())
    }
}

/// A reference device with one demo tile in slot 1.
pub struct DemoDevice;

impl DemoDevice {
    /// Build a device with the reference controller and a demo tile at
    /// address 11.
    pub fn build(iotile_id: u32) -> Result<Device, crate::error::DeviceError> {
        Self::build_with_model(iotile_id, DeviceModel::default())
    }

    pub fn build_with_model(
        iotile_id: u32,
        model: DeviceModel,
    ) -> Result<Device, crate::error::DeviceError> {
        let mut device = Device::new(iotile_id, model)?;
        let tile = DemoTile::new(DEMO_TILE_ADDRESS, device.handle())?;
        device.add_tile(Box::new(tile))?;

        Ok(device)
    }
}

#[cfg(test)]
#[path = "demo_tests.rs"]
mod tests;
