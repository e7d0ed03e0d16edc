// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! The emulated device: a controller plus peripheral tiles on one bus.
//!
//! The device owns the emulation loop and the tile table.  `start` runs
//! the loop, spawns the controller's reset vector and every peripheral's
//! initialization task, and returns once the device is idle: every
//! peripheral registered, received its config variables and was told to
//! start its application.

use crate::controller::streaming::BuiltReport;
use crate::controller::{self, ControllerShared, GraphInput, ReferenceController};
use crate::emulation_loop::{EmulationLoop, LoopHandle};
use crate::error::{DeviceError, RpcError};
use crate::rpc_queue::{RpcHandler, RpcOutcome};
use crate::tile::Tile;
use parking_lot::Mutex;
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tb_core::{rpcs, DataStream, DeviceModel, Reading};
use tb_engine::{NodeSpec, StreamerSpec};
use tb_storage::Snapshot;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Default timeout for externally injected RPCs.
pub const DEFAULT_RPC_TIMEOUT: Duration = Duration::from_secs(10);

/// Default timeout for `start` and `wait_idle`.
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(5);

/// A named test fixture applied to the device before or between runs.
pub type ScenarioFn =
    Arc<dyn Fn(&mut TileRegistry, serde_json::Value) -> Result<(), DeviceError> + Send + Sync>;

/// The table of tiles on the bus, and the RPC dispatch target.
pub struct TileRegistry {
    tiles: BTreeMap<u8, Box<dyn Tile>>,
}

impl TileRegistry {
    fn new() -> Self {
        TileRegistry {
            tiles: BTreeMap::new(),
        }
    }

    pub fn tile(&self, address: u8) -> Option<&dyn Tile> {
        self.tiles.get(&address).map(|tile| tile.as_ref())
    }

    pub fn tile_mut(&mut self, address: u8) -> Option<&mut dyn Tile> {
        self.tiles
            .get_mut(&address)
            .map(|tile| tile.as_mut() as &mut dyn Tile)
    }

    /// Addresses of every tile that registers with the controller.
    pub fn peripheral_addresses(&self) -> Vec<u8> {
        self.tiles
            .iter()
            .filter(|(_, tile)| tile.registration_payload().is_some())
            .map(|(address, _)| *address)
            .collect()
    }

    /// Dispatch an RPC without the queue's reset choreography.  Used by
    /// the graph's `call_rpc` executor.
    pub(crate) fn dispatch_direct(
        &mut self,
        address: u8,
        rpc_id: u16,
        payload: &[u8],
    ) -> Result<RpcOutcome, RpcError> {
        let tile = self
            .tiles
            .get_mut(&address)
            .ok_or(RpcError::TileNotFound(address))?;
        tile.handle_rpc(rpc_id, payload)
    }
}

/// Dispatcher state shared with the loop: the registry plus the reset
/// choreography that cannot live inside a single tile.
pub(crate) struct Dispatcher {
    registry: Arc<Mutex<TileRegistry>>,
    handle: LoopHandle,
    shared: ControllerShared,
    clock_interval: Option<Duration>,
}

impl RpcHandler for Dispatcher {
    fn dispatch(
        &mut self,
        address: u8,
        rpc_id: u16,
        payload: &[u8],
    ) -> Result<RpcOutcome, RpcError> {
        if rpc_id == rpcs::RESET.rpc_id {
            return self.handle_reset(address);
        }

        self.registry.lock().dispatch_direct(address, rpc_id, payload)
    }
}

impl Dispatcher {
    /// Reset a tile: clear its state, cancel its tasks, and spawn its
    /// initialization again.  The RPC itself returns immediately; the
    /// restart happens behind it on the loop.
    fn handle_reset(&mut self, address: u8) -> Result<RpcOutcome, RpcError> {
        {
            let mut registry = self.registry.lock();
            let tile = registry
                .tile_mut(address)
                .ok_or(RpcError::TileNotFound(address))?;
            tile.clear_to_reset();
        }

        info!(address, "tile reset");

        let handle = self.handle.clone();
        let registry = Arc::downgrade(&self.registry);
        let shared = self.shared.clone();
        let clock_interval = self.clock_interval;

        self.handle.add_task(None, async move {
            if let Err(err) = handle.stop_tasks(address).await {
                warn!(address, error = %err, "failed to stop tile tasks");
            }

            let spawned = if address == 8 {
                spawn_controller_tasks(&handle, &registry, &shared, true, clock_interval)
            } else {
                // The tile's own background tasks went down with it
                if let Some(registry) = registry.upgrade() {
                    let mut guard = registry.lock();
                    if let Some(tile) = guard.tile_mut(address) {
                        if let Err(err) = tile.start_tasks() {
                            warn!(address, error = %err, "failed to restart tile tasks");
                        }
                    }
                }

                spawn_peripheral_init(&handle, &registry, address)
            };

            if let Err(err) = spawned {
                warn!(address, error = %err, "failed to respawn tile tasks");
            }
        })?;

        Ok(RpcOutcome::Reply(Vec::new()))
    }
}

/// An emulated device.
pub struct Device {
    iotile_id: u32,
    boot_id: Uuid,
    emulation: EmulationLoop,
    handle: LoopHandle,
    registry: Arc<Mutex<TileRegistry>>,
    shared: ControllerShared,
    scenarios: BTreeMap<String, ScenarioFn>,
    clock_interval: Option<Duration>,
    started: bool,
}

/// A snapshot of complete device state.
pub type DeviceSnapshot = serde_json::Value;

impl Device {
    /// Create a device with a reference controller and no peripherals.
    pub fn new(iotile_id: u32, model: DeviceModel) -> Result<Self, DeviceError> {
        let emulation = EmulationLoop::new();
        let handle = emulation.handle();

        let (controller, shared) = ReferenceController::new(handle.clone(), iotile_id, model)?;

        let registry = Arc::new(Mutex::new(TileRegistry::new()));
        registry.lock().tiles.insert(8, Box::new(controller));

        let mut device = Device {
            iotile_id,
            boot_id: Uuid::new_v4(),
            emulation,
            handle,
            registry,
            shared,
            scenarios: BTreeMap::new(),
            clock_interval: Some(Duration::from_secs(1)),
            started: false,
        };

        device.register_builtin_scenarios();
        Ok(device)
    }

    pub fn iotile_id(&self) -> u32 {
        self.iotile_id
    }

    pub fn handle(&self) -> LoopHandle {
        self.handle.clone()
    }

    pub fn controller(&self) -> ControllerShared {
        self.shared.clone()
    }

    /// Set how much real time one simulated second takes, or `None` to
    /// disable the free-running clock entirely (tests then drive time
    /// with [`advance_clock`]).
    ///
    /// [`advance_clock`]: Device::advance_clock
    pub fn set_clock_interval(&mut self, interval: Option<Duration>) {
        self.clock_interval = interval;
    }

    /// Add a peripheral tile.  Must be called before `start`.
    pub fn add_tile(&mut self, tile: Box<dyn Tile>) -> Result<(), DeviceError> {
        if self.started {
            return Err(DeviceError::AlreadyStarted);
        }

        let address = tile.base().address;
        self.registry.lock().tiles.insert(address, tile);
        Ok(())
    }

    /// Start the emulation: run the loop, bring up the controller, and
    /// register every peripheral.  Returns once the device is idle.
    pub fn start(&mut self, timeout: Duration) -> Result<(), DeviceError> {
        if self.started {
            return Err(DeviceError::AlreadyStarted);
        }

        info!(iotile_id = self.iotile_id, boot_id = %self.boot_id, "starting device");

        let dispatcher = Dispatcher {
            registry: self.registry.clone(),
            handle: self.handle.clone(),
            shared: self.shared.clone(),
            clock_interval: self.clock_interval,
        };
        self.emulation.start(Arc::new(Mutex::new(dispatcher)))?;

        let registry_weak = Arc::downgrade(&self.registry);
        spawn_controller_tasks(
            &self.handle,
            &registry_weak,
            &self.shared,
            false,
            self.clock_interval,
        )?;

        // Per-tile background tasks, then registration
        {
            let mut registry = self.registry.lock();
            let addresses: Vec<u8> = registry.tiles.keys().copied().collect();
            for address in addresses {
                if let Some(tile) = registry.tile_mut(address) {
                    tile.start_tasks()?;
                }
            }
        }

        for address in self.registry.lock().peripheral_addresses() {
            spawn_peripheral_init(&self.handle, &registry_weak, address)?;
        }

        self.started = true;
        self.wait_idle(timeout)?;

        info!("device started");
        Ok(())
    }

    /// Stop the emulation: cancel all tasks and drain the RPC queue.
    pub fn stop(&mut self) -> Result<(), DeviceError> {
        self.emulation.stop()?;
        self.started = false;
        Ok(())
    }

    /// Call an RPC from outside the emulation, blocking for the reply.
    pub fn rpc(
        &self,
        address: u8,
        rpc_id: u16,
        payload: &[u8],
        timeout: Duration,
    ) -> Result<Vec<u8>, RpcError> {
        self.handle.call_rpc_external(address, rpc_id, payload, timeout)
    }

    /// Block until the device is idle.
    pub fn wait_idle(&self, timeout: Duration) -> Result<(), DeviceError> {
        self.handle
            .wait_idle(timeout)
            .map_err(|_| DeviceError::IdleTimeout)
    }

    /// Reset a tile through the bus.
    pub fn reset_tile(&self, address: u8) -> Result<(), DeviceError> {
        self.rpc(address, rpcs::RESET.rpc_id, &[], DEFAULT_RPC_TIMEOUT)?;
        Ok(())
    }

    /// Advance the simulated clock by whole seconds.
    pub fn advance_clock(&self, seconds: u32) -> Result<(), DeviceError> {
        let shared = self.shared.clone();
        self.handle.call_external(
            move || {
                for _ in 0..seconds {
                    shared.clock_tick();
                }
                Ok(Vec::new())
            },
            DEFAULT_RPC_TIMEOUT,
        )?;

        Ok(())
    }

    /// Add a sensor-graph node from its descriptor.
    pub fn add_sg_node(&self, spec: NodeSpec) -> Result<(), DeviceError> {
        let shared = self.shared.clone();
        self.handle.call_external(
            move || {
                let code = shared.graph.lock().add_node(spec);
                if code != tb_core::NO_ERROR {
                    return Err(RpcError::RpcRuntime(code));
                }
                Ok(Vec::new())
            },
            DEFAULT_RPC_TIMEOUT,
        )?;

        Ok(())
    }

    /// Register a streamer.  Returns its assigned index.
    pub fn add_sg_streamer(&self, spec: StreamerSpec) -> Result<usize, DeviceError> {
        let shared = self.shared.clone();
        let reply = self.handle.call_external(
            move || {
                let (code, index) = shared.graph.lock().add_streamer(spec);
                if code != tb_core::NO_ERROR {
                    return Err(RpcError::RpcRuntime(code));
                }
                Ok(index.to_le_bytes().to_vec())
            },
            DEFAULT_RPC_TIMEOUT,
        )?;

        Ok(u16::from_le_bytes([reply[0], reply[1]]) as usize)
    }

    /// Enable or disable sensor-graph processing.
    pub fn set_sg_online(&self, online: bool) -> Result<(), DeviceError> {
        let shared = self.shared.clone();
        self.handle.call_external(
            move || {
                shared.graph.lock().set_online(online);
                Ok(Vec::new())
            },
            DEFAULT_RPC_TIMEOUT,
        )?;

        Ok(())
    }

    /// Feed a reading into a sensor-graph input stream and wait for the
    /// ripples to settle.
    pub fn push_sg_input(&self, stream: DataStream, value: i32) -> Result<(), DeviceError> {
        let shared = self.shared.clone();
        self.handle.call_external(
            move || {
                let uptime = shared.state.lock().clock.uptime;
                shared.inputs.push(GraphInput::Reading(
                    stream,
                    Reading::new(stream.encode(), uptime, value),
                ));
                Ok(Vec::new())
            },
            DEFAULT_RPC_TIMEOUT,
        )?;

        self.wait_idle(DEFAULT_IDLE_TIMEOUT)
    }

    /// Drain every report built by the streaming subsystem.
    pub fn take_reports(&self) -> Vec<BuiltReport> {
        self.shared.streaming.lock().take_reports()
    }

    /// Acknowledge a streamer's report so it may fire again.
    pub fn acknowledge_streamer(&self, index: usize) {
        self.shared.streaming.lock().acknowledge(index);
    }

    // -- snapshots --

    /// Serialize complete device state.
    ///
    /// The walk runs on the emulation thread, serialized with RPC
    /// dispatch, so the captured state is a consistent cut.
    pub fn snapshot(&self) -> Result<DeviceSnapshot, DeviceError> {
        let registry = self.registry.clone();
        let iotile_id = self.iotile_id;
        let boot_id = self.boot_id.to_string();

        let bytes = self.handle.call_external(
            move || {
                let guard = registry.lock();

                let mut tiles = serde_json::Map::new();
                for (address, tile) in &guard.tiles {
                    tiles.insert(address.to_string(), tile.snapshot());
                }

                let snapshot = json!({
                    "iotile_id": iotile_id,
                    "boot_id": boot_id,
                    "tiles": tiles,
                });
                serde_json::to_vec(&snapshot).map_err(|e| RpcError::Internal(e.to_string()))
            },
            DEFAULT_RPC_TIMEOUT,
        )?;

        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Restore a previously captured snapshot.
    ///
    /// Tiles present in the snapshot but missing from this device fail
    /// the restore; tiles missing from the snapshot are left untouched.
    pub fn restore(&mut self, snapshot: &DeviceSnapshot) -> Result<(), DeviceError> {
        let snapshot_id = snapshot.get("iotile_id").and_then(|v| v.as_u64());
        if snapshot_id != Some(self.iotile_id as u64) {
            return Err(DeviceError::SnapshotMismatch(format!(
                "snapshot is for device {:?}, this is device {}",
                snapshot_id, self.iotile_id
            )));
        }

        let tiles = snapshot
            .get("tiles")
            .and_then(|v| v.as_object())
            .cloned()
            .ok_or_else(|| DeviceError::SnapshotMismatch("snapshot has no tiles".to_string()))?;

        let registry = self.registry.clone();
        self.handle.call_external(
            move || {
                let mut registry = registry.lock();
                for (key, state) in &tiles {
                    let address: u8 = key.parse().map_err(|_| {
                        RpcError::InvalidArgument(format!("invalid tile address: {}", key))
                    })?;

                    let tile = registry
                        .tile_mut(address)
                        .ok_or(RpcError::TileNotFound(address))?;
                    tile.restore(state)
                        .map_err(|e| RpcError::Internal(e.to_string()))?;
                }

                Ok(Vec::new())
            },
            DEFAULT_RPC_TIMEOUT,
        )?;

        debug!("device state restored from snapshot");
        Ok(())
    }

    /// Save a snapshot to disk.
    pub fn save_snapshot(&self, path: &std::path::Path) -> Result<(), DeviceError> {
        Snapshot::new(self.snapshot()?).save(path)?;
        Ok(())
    }

    /// Restore device state from a snapshot file.
    pub fn load_snapshot(&mut self, path: &std::path::Path) -> Result<(), DeviceError> {
        let snapshot = Snapshot::load(path)?.ok_or_else(|| {
            DeviceError::SnapshotMismatch(format!("no snapshot at {}", path.display()))
        })?;

        self.restore(&snapshot.state)
    }

    // -- scenarios --

    /// Register a named test fixture.
    pub fn register_scenario(&mut self, name: impl Into<String>, scenario: ScenarioFn) {
        self.scenarios.insert(name.into(), scenario);
    }

    /// Apply a named test fixture with its arguments.  The fixture runs
    /// on the emulation thread when the device is running, and directly
    /// otherwise.
    pub fn load_scenario(
        &mut self,
        name: &str,
        args: serde_json::Value,
    ) -> Result<(), DeviceError> {
        let scenario = self
            .scenarios
            .get(name)
            .cloned()
            .ok_or_else(|| DeviceError::UnknownScenario(name.to_string()))?;

        if !self.started {
            return scenario(&mut self.registry.lock(), args);
        }

        let registry = self.registry.clone();
        self.handle.call_external(
            move || {
                scenario(&mut registry.lock(), args)
                    .map_err(|e| RpcError::Internal(e.to_string()))?;
                Ok(Vec::new())
            },
            DEFAULT_RPC_TIMEOUT,
        )?;

        Ok(())
    }

    fn register_builtin_scenarios(&mut self) {
        // Preload the demo tile's counter
        self.register_scenario(
            "loaded_counter",
            Arc::new(|registry: &mut TileRegistry, args: serde_json::Value| {
                let address = args.get("address").and_then(|v| v.as_u64()).unwrap_or(11) as u8;
                let counter = args
                    .get("counter")
                    .and_then(|v| v.as_u64())
                    .ok_or_else(|| DeviceError::Internal("missing counter".to_string()))?
                    as u32;

                let tile = registry
                    .tile_mut(address)
                    .ok_or(DeviceError::Rpc(RpcError::TileNotFound(address)))?;

                let mut state = tile.snapshot();
                state["counter"] = json!(counter);
                tile.restore(&state)
            }),
        );

        // Preload readings into the sensor log
        let shared = self.shared.clone();
        self.register_scenario(
            "preloaded_readings",
            Arc::new(move |_registry: &mut TileRegistry, args: serde_json::Value| {
                let stream_id = args
                    .get("stream")
                    .and_then(|v| v.as_u64())
                    .ok_or_else(|| DeviceError::Internal("missing stream".to_string()))?
                    as u16;
                let values = args
                    .get("values")
                    .and_then(|v| v.as_array())
                    .ok_or_else(|| DeviceError::Internal("missing values".to_string()))?;

                let stream = DataStream::decode(stream_id)
                    .map_err(|e| DeviceError::Internal(e.to_string()))?;

                let mut log = shared.log.lock();
                for value in values {
                    let value = value.as_i64().unwrap_or(0) as i32;
                    log.push(&stream, Reading::new(stream_id, 0, value))?;
                }

                Ok(())
            }),
        );
    }

    /// Snapshot one tile's state for test assertions.
    pub fn tile_snapshot(&self, address: u8) -> Result<serde_json::Value, DeviceError> {
        let registry = self.registry.clone();

        let bytes = self.handle.call_external(
            move || {
                let guard = registry.lock();
                let tile = guard.tile(address).ok_or(RpcError::TileNotFound(address))?;
                serde_json::to_vec(&tile.snapshot()).map_err(|e| RpcError::Internal(e.to_string()))
            },
            DEFAULT_RPC_TIMEOUT,
        )?;

        Ok(serde_json::from_slice(&bytes)?)
    }
}

/// Spawn the controller's background structure: reset vector and graph
/// worker.
fn spawn_controller_tasks(
    handle: &LoopHandle,
    registry: &Weak<Mutex<TileRegistry>>,
    shared: &ControllerShared,
    reset_peripherals: bool,
    clock_interval: Option<Duration>,
) -> Result<(), RpcError> {
    handle.add_task(
        Some(8),
        controller::graph_worker(registry.clone(), shared.clone()),
    )?;

    if let Some(interval) = clock_interval {
        handle.add_task(Some(8), controller::clock_task(shared.clone(), interval))?;
    }

    handle.add_task(
        Some(8),
        controller::reset_vector(
            handle.clone(),
            registry.clone(),
            shared.clone(),
            reset_peripherals,
        ),
    )
}

/// Spawn a peripheral's initialization task: register with the
/// controller and record the response.
fn spawn_peripheral_init(
    handle: &LoopHandle,
    registry: &Weak<Mutex<TileRegistry>>,
    address: u8,
) -> Result<(), RpcError> {
    let handle_clone = handle.clone();
    let registry = registry.clone();

    handle.add_task(Some(address), async move {
        let payload = match registry.upgrade() {
            Some(registry) => {
                let guard = registry.lock();
                guard.tile(address).and_then(|tile| tile.registration_payload())
            }
            None => None,
        };

        let Some(payload) = payload else {
            return;
        };

        match handle_clone
            .await_rpc(8, rpcs::REGISTER_TILE.rpc_id, payload)
            .await
        {
            Ok(response) => {
                if let Some(registry) = registry.upgrade() {
                    let mut guard = registry.lock();
                    if let Some(tile) = guard.tile_mut(address) {
                        if let Err(err) = tile.process_registration(&response) {
                            warn!(address, error = %err, "bad registration response");
                        }
                        tile.base().initialized.set();
                    }
                }
            }
            Err(err) => {
                warn!(address, error = %err, "tile registration failed");
            }
        }
    })
}

#[cfg(test)]
#[path = "device_tests.rs"]
mod tests;
