// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! The reference controller tile.
//!
//! The controller owns the sensor log, the sensor graph, the streamers,
//! and the tile-facing subsystems: tile manager, config database, remote
//! bridge and clock manager.  Its reset vector streams recorded config
//! variables to itself through the RPC queue, latches them, clears every
//! subsystem to its reset state in registration order, then resets
//! peripheral tiles in descending address order.

pub mod clock_manager;
pub mod config_database;
pub mod remote_bridge;
pub mod sensor_graph;
pub mod sensor_log;
pub mod streaming;
pub mod tile_manager;

use crate::device::TileRegistry;
use crate::emulation_loop::LoopHandle;
use crate::error::{DeviceError, RpcError};
use crate::idle::{LoopEvent, WorkQueue};
use crate::rpc_queue::RpcOutcome;
use crate::tile::{ConfigValues, Tile, TileBase};
use clock_manager::ClockManager;
use config_database::{ConfigDatabase, ConfigTarget};
use parking_lot::Mutex;
use remote_bridge::RemoteBridge;
use sensor_graph::SensorGraphSubsystem;
use sensor_log::SensorLogSubsystem;
use serde_json::json;
use std::sync::{Arc, Weak};
use std::time::Duration;
use streaming::StreamManager;
use tb_core::{rpcs, DataStream, DeviceModel, ErrorCode, Packer, Reading, SlotId, Unpacker};
use tb_engine::{EngineError, RpcExecutor, SensorGraph};
use tb_storage::{SensorLog, SharedLog};
use tile_manager::{TileInfo, TileManager, TileState};
use tracing::{debug, info, warn};

/// Control and data space reserved for the config database.
const CONFIG_CONTROL_SIZE: usize = 4096;
const CONFIG_DATA_SIZE: usize = 4096;

/// Timeout for each subsystem's reset vector to come up.
const SUBSYSTEM_INIT_TIMEOUT: Duration = Duration::from_secs(2);

/// Work for the graph worker task.
pub enum GraphInput {
    /// A reading to feed through the graph.
    Reading(DataStream, Reading),
    /// Re-check streamers without processing an input, after a manual
    /// trigger mark.
    CheckStreamers,
}

/// Config RPCs queued for a freshly registered tile.
pub struct PendingConfig {
    pub address: u8,
    pub calls: Vec<(u8, u16, Vec<u8>)>,
}

/// Controller state mutated only under one lock: the tile-facing
/// subsystems without their own task structure.
pub struct ControllerState {
    pub tile_manager: TileManager,
    pub config_db: ConfigDatabase,
    pub bridge: RemoteBridge,
    pub clock: ClockManager,
}

/// Shared handles to every controller subsystem, cloned into the
/// controller's background tasks.
#[derive(Clone)]
pub struct ControllerShared {
    pub iotile_id: u32,
    pub log: SharedLog,
    pub state: Arc<Mutex<ControllerState>>,
    pub graph: Arc<Mutex<SensorGraphSubsystem>>,
    pub streaming: Arc<Mutex<StreamManager>>,
    pub inputs: Arc<WorkQueue<GraphInput>>,
    pub config_queue: Arc<WorkQueue<PendingConfig>>,
}

impl ControllerShared {
    /// Feed one simulated second through the clock manager, queueing any
    /// tick inputs for the graph worker.
    pub fn clock_tick(&self) {
        let (inputs, uptime) = {
            let mut state = self.state.lock();
            let inputs = state.clock.tick();
            (inputs, state.clock.uptime)
        };

        for (stream_id, value) in inputs {
            if let Ok(stream) = DataStream::decode(stream_id) {
                self.inputs.push(GraphInput::Reading(
                    stream,
                    Reading::new(stream_id, uptime, value),
                ));
            }
        }
    }
}

/// The controller tile.
pub struct ReferenceController {
    base: TileBase,
    shared: ControllerShared,
}

impl ReferenceController {
    pub fn new(
        handle: LoopHandle,
        iotile_id: u32,
        model: DeviceModel,
    ) -> Result<(Self, ControllerShared), RpcError> {
        let mut base = TileBase::new(8, "refcon", handle.clone());
        base.declare_config_variable("user_tick_secs", rpcs::CONFIG_USER_TICK_SECS, "uint32_t", Some(0))?;
        base.declare_config_variable("storage_fillstop", rpcs::CONFIG_STORAGE_FILLSTOP, "uint8_t", Some(0))?;
        base.declare_config_variable("streaming_fillstop", rpcs::CONFIG_STREAMING_FILLSTOP, "uint8_t", Some(0))?;

        let log: SharedLog = Arc::new(Mutex::new(SensorLog::new(model.clone())));
        let graph = SensorGraph::new(log.clone(), model);

        let shared = ControllerShared {
            iotile_id,
            log: log.clone(),
            state: Arc::new(Mutex::new(ControllerState {
                tile_manager: TileManager::new(base.name),
                config_db: ConfigDatabase::new(CONFIG_CONTROL_SIZE, CONFIG_DATA_SIZE),
                bridge: RemoteBridge::new(),
                clock: ClockManager::new(),
            })),
            graph: Arc::new(Mutex::new(SensorGraphSubsystem::new(graph))),
            streaming: Arc::new(Mutex::new(StreamManager::new())),
            inputs: handle.create_queue(true),
            config_queue: handle.create_queue(true),
        };

        let controller = ReferenceController {
            base,
            shared: shared.clone(),
        };

        Ok((controller, shared))
    }

    pub fn shared(&self) -> ControllerShared {
        self.shared.clone()
    }

    fn sensor_log(&self) -> SensorLogSubsystem {
        SensorLogSubsystem::new(self.shared.log.clone())
    }

    fn uptime(&self) -> u32 {
        self.shared.state.lock().clock.uptime
    }

    // -- tile manager rpcs --

    fn register_tile(&mut self, payload: &[u8]) -> Result<RpcOutcome, RpcError> {
        let mut args = Unpacker::new(payload);
        let hw_type = args.u8()?;
        let api = (args.u8()?, args.u8()?);
        let mut name = [0u8; 6];
        name.copy_from_slice(args.bytes(6)?);
        let firmware = (args.u8()?, args.u8()?, args.u8()?);
        let executive = (args.u8()?, args.u8()?, args.u8()?);
        let slot = args.u8()?;
        let unique_id = args.u32()?;
        args.done()?;

        let address = 10 + slot;
        let mut state = self.shared.state.lock();

        let (run_level, tile_state, calls) = if state.tile_manager.safe_mode {
            (crate::tile::RunLevel::SafeMode, TileState::SafeMode, Vec::new())
        } else {
            (
                crate::tile::RunLevel::StartOnCommand,
                TileState::BeingConfigured,
                state.config_db.stream_matching(address, &name),
            )
        };

        let info = TileInfo {
            hw_type,
            name,
            api,
            firmware,
            executive,
            slot,
            unique_id,
            state: tile_state,
            address: Some(address),
        };

        debug!(address, slot, "tile registered");
        state.tile_manager.insert_tile(info);
        let debug_mode = state.tile_manager.debug_mode;
        drop(state);

        self.shared.config_queue.push(PendingConfig { address, calls });

        let reply = Packer::new()
            .u16(address as u16)
            .u16(run_level as u16)
            .u16(debug_mode as u16)
            .into_vec();
        Ok(RpcOutcome::Reply(reply))
    }

    fn describe_tile(&self, payload: &[u8]) -> Result<RpcOutcome, RpcError> {
        let mut args = Unpacker::new(payload);
        let index = args.u16()? as usize;
        args.done()?;

        let info = self.shared.state.lock().tile_manager.describe(index);

        let reply = Packer::new()
            .u8(info.hw_type)
            .u8(info.api.0)
            .u8(info.api.1)
            .bytes(&info.name)
            .u8(info.firmware.0)
            .u8(info.firmware.1)
            .u8(info.firmware.2)
            .u8(info.executive.0)
            .u8(info.executive.1)
            .u8(info.executive.2)
            .u8(info.slot)
            .u32(info.unique_id)
            .into_vec();
        Ok(RpcOutcome::Reply(reply))
    }

    // -- config database rpcs --

    fn start_config_entry(&mut self, payload: &[u8]) -> Result<RpcOutcome, RpcError> {
        let mut args = Unpacker::new(payload);
        let kind = args.u8()?;
        let slot = args.u8()?;
        let mut name = [0u8; 6];
        name.copy_from_slice(args.bytes(6)?);
        let var_id = args.u16()?;
        args.done()?;

        let target = match kind {
            0 if slot == 0 => ConfigTarget::Slot(SlotId::Controller),
            0 => ConfigTarget::Slot(
                SlotId::slot(slot).map_err(|e| RpcError::InvalidArgument(e.to_string()))?,
            ),
            1 => ConfigTarget::Name(name),
            other => {
                return Err(RpcError::InvalidArgument(format!(
                    "unknown config target kind: {}",
                    other
                )))
            }
        };

        let code = self.shared.state.lock().config_db.start_entry(target, var_id);
        Ok(RpcOutcome::Reply(Packer::new().u16(code).into_vec()))
    }

    fn continue_config_entry(&mut self, payload: &[u8]) -> Result<RpcOutcome, RpcError> {
        let code = self.shared.state.lock().config_db.add_data(payload);
        Ok(RpcOutcome::Reply(Packer::new().u16(code).into_vec()))
    }

    fn config_database_info(&self) -> Result<RpcOutcome, RpcError> {
        let state = self.shared.state.lock();
        let reply = Packer::new()
            .u16(state.config_db.max_entries() as u16)
            .u16(state.config_db.entry_count() as u16)
            .u32(state.config_db.used_data_space() as u32)
            .u32(state.config_db.data_size() as u32)
            .into_vec();
        Ok(RpcOutcome::Reply(reply))
    }

    // -- sensor graph rpcs --

    fn graph_input(&mut self, payload: &[u8]) -> Result<RpcOutcome, RpcError> {
        let mut args = Unpacker::new(payload);
        let value = args.i32()?;
        let stream_id = args.u16()?;
        args.done()?;

        let stream = DataStream::decode(stream_id)
            .map_err(|e| RpcError::InvalidArgument(e.to_string()))?;
        let uptime = self.uptime();

        self.shared.inputs.push(GraphInput::Reading(
            stream,
            Reading::new(stream_id, uptime, value),
        ));

        Ok(RpcOutcome::Reply(Packer::new().u32(tb_core::NO_ERROR).into_vec()))
    }
}

impl Tile for ReferenceController {
    fn base(&self) -> &TileBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut TileBase {
        &mut self.base
    }

    fn handle_rpc(&mut self, rpc_id: u16, payload: &[u8]) -> Result<RpcOutcome, RpcError> {
        match rpc_id {
            // tile manager
            id if id == rpcs::REGISTER_TILE.rpc_id => self.register_tile(payload),
            id if id == rpcs::COUNT_TILES.rpc_id => {
                let count = self.shared.state.lock().tile_manager.count() as u16;
                Ok(RpcOutcome::Reply(Packer::new().u16(count).into_vec()))
            }
            id if id == rpcs::DESCRIBE_TILE.rpc_id => self.describe_tile(payload),

            // config database
            id if id == rpcs::START_CONFIG_VAR_ENTRY.rpc_id => self.start_config_entry(payload),
            id if id == rpcs::CONTINUE_CONFIG_VAR_ENTRY.rpc_id => {
                self.continue_config_entry(payload)
            }
            id if id == rpcs::END_CONFIG_VAR_ENTRY.rpc_id => {
                let code = self.shared.state.lock().config_db.end_entry();
                Ok(RpcOutcome::Reply(Packer::new().u16(code).into_vec()))
            }
            id if id == rpcs::GET_CONFIG_DATABASE_INFO.rpc_id => self.config_database_info(),
            id if id == rpcs::COUNT_CONFIG_VAR_ENTRIES.rpc_id => {
                let count = self.shared.state.lock().config_db.entry_count() as u16;
                Ok(RpcOutcome::Reply(Packer::new().u16(count).into_vec()))
            }
            id if id == rpcs::INVALIDATE_CONFIG_VAR_ENTRY.rpc_id => {
                let mut args = Unpacker::new(payload);
                let index = args.u16()? as usize;
                args.done()?;
                let code = self.shared.state.lock().config_db.invalidate(index);
                Ok(RpcOutcome::Reply(Packer::new().u16(code).into_vec()))
            }
            id if id == rpcs::COMPACT_CONFIG_DATABASE.rpc_id => {
                self.shared.state.lock().config_db.compact();
                Ok(RpcOutcome::Reply(
                    Packer::new().u16(ErrorCode::NoError.code()).into_vec(),
                ))
            }
            id if id == rpcs::CLEAR_CONFIG_VAR_ENTRIES.rpc_id => {
                self.shared.state.lock().config_db.clear();
                Ok(RpcOutcome::Reply(
                    Packer::new().u16(ErrorCode::NoError.code()).into_vec(),
                ))
            }

            // remote bridge
            id if id == rpcs::BEGIN_SCRIPT.rpc_id => {
                let code = self.shared.state.lock().bridge.begin_script();
                Ok(RpcOutcome::Reply(Packer::new().u32(code).into_vec()))
            }
            id if id == rpcs::PUSH_SCRIPT_CHUNK.rpc_id => {
                let code = self.shared.state.lock().bridge.push_chunk(payload);
                Ok(RpcOutcome::Reply(Packer::new().u32(code).into_vec()))
            }
            id if id == rpcs::END_SCRIPT.rpc_id => {
                let code = self.shared.state.lock().bridge.end_script();
                Ok(RpcOutcome::Reply(Packer::new().u32(code).into_vec()))
            }
            id if id == rpcs::TRIGGER_SCRIPT.rpc_id => {
                let code = self.shared.state.lock().bridge.trigger_script();
                Ok(RpcOutcome::Reply(Packer::new().u32(code).into_vec()))
            }
            id if id == rpcs::QUERY_SCRIPT_STATUS.rpc_id => {
                let (status, error) = self.shared.state.lock().bridge.query_status();
                Ok(RpcOutcome::Reply(
                    Packer::new().u32(status).u32(error).into_vec(),
                ))
            }
            id if id == rpcs::RESET_SCRIPT.rpc_id => {
                let code = self.shared.state.lock().bridge.reset_script();
                Ok(RpcOutcome::Reply(Packer::new().u32(code).into_vec()))
            }

            // clock manager
            id if id == rpcs::GET_CURRENT_TIME.rpc_id => {
                let mut args = Unpacker::new(payload);
                let prefer_utc = args.u8()? != 0;
                args.done()?;
                let time = self.shared.state.lock().clock.get_time(prefer_utc);
                Ok(RpcOutcome::Reply(Packer::new().u32(time).into_vec()))
            }
            id if id == rpcs::SET_CURRENT_TIME.rpc_id => {
                let mut args = Unpacker::new(payload);
                let utc = args.u32()?;
                args.done()?;
                self.shared.state.lock().clock.set_utc_time(utc);
                Ok(RpcOutcome::Reply(Packer::new().u32(tb_core::NO_ERROR).into_vec()))
            }
            id if id == rpcs::CONTROLLER_INFO.rpc_id => Ok(RpcOutcome::Reply(
                Packer::new().u32(self.shared.iotile_id).u32(0).u32(0).into_vec(),
            )),

            // sensor log
            id if id == rpcs::RSL_PUSH_READING.rpc_id => {
                let mut args = Unpacker::new(payload);
                let value = args.i32()?;
                let stream_id = args.u16()?;
                args.done()?;
                let uptime = self.uptime();
                let code = self.sensor_log().push(stream_id, uptime, value);
                Ok(RpcOutcome::Reply(Packer::new().u32(code).into_vec()))
            }
            id if id == rpcs::RSL_PUSH_MANY_READINGS.rpc_id => {
                let mut args = Unpacker::new(payload);
                let value = args.i32()?;
                let count = args.u32()?;
                let stream_id = args.u16()?;
                args.done()?;
                let uptime = self.uptime();
                let (code, pushed) = self.sensor_log().push_many(stream_id, uptime, value, count);
                Ok(RpcOutcome::Reply(
                    Packer::new().u32(code).u32(pushed).into_vec(),
                ))
            }
            id if id == rpcs::RSL_COUNT_READINGS.rpc_id => {
                let (storage, streaming) = self.sensor_log().count();
                Ok(RpcOutcome::Reply(
                    Packer::new()
                        .u32(tb_core::NO_ERROR)
                        .u32(storage as u32)
                        .u32(streaming as u32)
                        .into_vec(),
                ))
            }
            id if id == rpcs::RSL_CLEAR_READINGS.rpc_id => {
                let uptime = self.uptime();
                let code = self.sensor_log().clear(uptime);
                Ok(RpcOutcome::Reply(Packer::new().u32(code).into_vec()))
            }
            id if id == rpcs::RSL_INSPECT_VIRTUAL_STREAM.rpc_id => {
                let mut args = Unpacker::new(payload);
                let stream_id = args.u16()?;
                args.done()?;
                let (code, value) = self.sensor_log().inspect_virtual(stream_id);
                Ok(RpcOutcome::Reply(
                    Packer::new().u32(code).i32(value).into_vec(),
                ))
            }
            id if id == rpcs::RSL_HIGHEST_READING_ID.rpc_id => {
                let highest = self.sensor_log().highest_allocated_id();
                Ok(RpcOutcome::Reply(
                    Packer::new().u32(tb_core::NO_ERROR).u32(highest).into_vec(),
                ))
            }

            // sensor graph
            id if id == rpcs::SG_SET_ONLINE.rpc_id => {
                let mut args = Unpacker::new(payload);
                let online = args.u8()? != 0;
                args.done()?;
                let code = self.shared.graph.lock().set_online(online);
                Ok(RpcOutcome::Reply(Packer::new().u32(code).into_vec()))
            }
            id if id == rpcs::SG_TRIGGER_STREAMER.rpc_id => {
                let mut args = Unpacker::new(payload);
                let index = args.u16()? as usize;
                args.done()?;
                let code = self.shared.graph.lock().trigger_streamer(index);
                // Marking alone produces no input; nudge the worker so the
                // mark is checked promptly
                self.shared.inputs.push(GraphInput::CheckStreamers);
                Ok(RpcOutcome::Reply(Packer::new().u32(code).into_vec()))
            }
            id if id == rpcs::SG_GRAPH_INPUT.rpc_id => self.graph_input(payload),
            id if id == rpcs::SG_PERSIST_GRAPH.rpc_id => {
                let code = self.shared.graph.lock().persist();
                Ok(RpcOutcome::Reply(Packer::new().u32(code).into_vec()))
            }
            id if id == rpcs::SG_RESET_GRAPH.rpc_id => {
                let code = self.shared.graph.lock().reset_graph();
                Ok(RpcOutcome::Reply(Packer::new().u32(code).into_vec()))
            }
            id if id == rpcs::SG_COUNT_NODES.rpc_id => {
                let count = self.shared.graph.lock().graph.node_count() as u16;
                Ok(RpcOutcome::Reply(
                    Packer::new().u32(tb_core::NO_ERROR).u16(count).into_vec(),
                ))
            }

            _ => self
                .base
                .handle_common_rpc(rpc_id, payload)
                .unwrap_or(Err(RpcError::UnsupportedRpc { address: 8, rpc_id })),
        }
    }

    fn clear_to_reset(&mut self) {
        self.base.reset_config_variables();
        self.base.initialized.clear();
    }

    fn snapshot(&self) -> serde_json::Value {
        // Locks are taken one at a time; holding several at once would
        // invert the graph worker's lock order
        let (tile_manager, config_db, bridge, clock) = {
            let state = self.shared.state.lock();
            (
                state.tile_manager.clone(),
                state.config_db.clone(),
                state.bridge.clone(),
                state.clock.clone(),
            )
        };

        let sensor_log = self.shared.log.lock().dump();

        let (graph_dump, graph_enabled, persisted_graph) = {
            let graph = self.shared.graph.lock();
            (graph.graph.dump(), graph.enabled, graph.persisted.clone())
        };

        json!({
            "base": self.base.snapshot(),
            "tile_manager": tile_manager,
            "config_db": config_db,
            "bridge": bridge,
            "clock": clock,
            "sensor_log": sensor_log,
            "graph": graph_dump,
            "graph_enabled": graph_enabled,
            "persisted_graph": persisted_graph,
        })
    }

    fn restore(&mut self, state: &serde_json::Value) -> Result<(), DeviceError> {
        if let Some(base) = state.get("base") {
            self.base.restore(base)?;
        }

        {
            let mut controller = self.shared.state.lock();
            if let Some(value) = state.get("tile_manager") {
                controller.tile_manager = serde_json::from_value(value.clone())?;
            }
            if let Some(value) = state.get("config_db") {
                controller.config_db = serde_json::from_value(value.clone())?;
            }
            if let Some(value) = state.get("bridge") {
                controller.bridge = serde_json::from_value(value.clone())?;
            }
            if let Some(value) = state.get("clock") {
                controller.clock = serde_json::from_value(value.clone())?;
            }
        }

        // The graph rebuild below recreates every walker; drop the old set
        // first so stale cursors do not accumulate in the log
        self.shared.log.lock().destroy_all_walkers();

        {
            let mut graph = self.shared.graph.lock();
            if let Some(value) = state.get("persisted_graph") {
                graph.persisted = serde_json::from_value(value.clone())?;
            }
            if let Some(value) = state.get("graph") {
                let structure: tb_engine::GraphState = serde_json::from_value(value.clone())?;
                let registry = std::mem::take(&mut graph.registry);
                let result = graph.graph.restore(&structure, &registry);
                graph.registry = registry;
                result?;
            }
            graph.enabled = state
                .get("graph_enabled")
                .and_then(|v| v.as_bool())
                .unwrap_or(false);
        }

        // Walker cursors restore after the graph has recreated them
        if let Some(value) = state.get("sensor_log") {
            let log_state: tb_storage::SensorLogState = serde_json::from_value(value.clone())?;
            self.shared.log.lock().restore(&log_state, true)?;
        }

        Ok(())
    }
}

/// Executes `call_rpc` processing-function RPCs by dispatching directly
/// against the tile registry.  Only valid while the registry lock is not
/// held, which is the case for the graph worker task.
pub(crate) struct DirectRpcExecutor {
    pub registry: Weak<Mutex<TileRegistry>>,
}

impl RpcExecutor for DirectRpcExecutor {
    fn rpc(&mut self, address: u8, rpc_id: u16) -> Result<u32, EngineError> {
        let registry = self
            .registry
            .upgrade()
            .ok_or(EngineError::RpcRuntime(ErrorCode::UnknownError.code() as u32))?;

        let outcome = registry.lock().dispatch_direct(address, rpc_id, &[]);
        match outcome {
            Ok(RpcOutcome::Reply(bytes)) => {
                let mut fields = Unpacker::new(&bytes);
                Ok(fields.u32().unwrap_or(0))
            }
            // Deferred responses cannot be awaited from a processing
            // function
            Ok(RpcOutcome::Deferred) => {
                Err(EngineError::RpcRuntime(ErrorCode::TimeoutError.code() as u32))
            }
            Err(_) => Err(EngineError::RpcRuntime(ErrorCode::UnknownError.code() as u32)),
        }
    }
}

/// The controller's reset vector.
///
/// Streams recorded config variables to the controller itself, latches
/// them, clears each subsystem to reset in registration order awaiting
/// its initialized event, then (on a true reset) resets peripherals in
/// descending address order.
pub(crate) async fn reset_vector(
    handle: LoopHandle,
    registry: Weak<Mutex<TileRegistry>>,
    shared: ControllerShared,
    reset_peripherals: bool,
) {
    info!(reset_peripherals, "controller reset vector running");

    // Stream our own config variables through the rpc queue
    let (name, calls) = {
        let state = shared.state.lock();
        let name = state.tile_manager.describe(0).name;
        (name, state.config_db.stream_matching(8, &name))
    };

    for (address, rpc_id, payload) in calls {
        if let Err(err) = handle.await_rpc(address, rpc_id, payload).await {
            warn!(error = %err, "failed to stream config variable to controller");
        }
    }

    let config = match registry.upgrade() {
        Some(registry) => {
            let registry = registry.lock();
            registry
                .tile(8)
                .map(|tile| tile.base().latch_config_variables())
                .unwrap_or_default()
        }
        None => ConfigValues::default(),
    };
    debug!(count = config.len(), "latched controller config variables");

    // Clear each subsystem in registration order, awaiting its
    // initialized event
    run_subsystem_resets(&handle, &shared, &config).await;

    // Reset peripheral tiles in descending slot order
    if reset_peripherals {
        let addresses: Vec<u8> = match registry.upgrade() {
            Some(registry) => {
                let mut addresses = registry.lock().peripheral_addresses();
                addresses.sort_unstable_by(|a, b| b.cmp(a));
                addresses
            }
            None => Vec::new(),
        };

        for address in addresses {
            debug!(address, "resetting peripheral tile");
            if let Err(err) = handle
                .await_rpc(address, rpcs::RESET.rpc_id, Vec::new())
                .await
            {
                warn!(address, error = %err, "error resetting peripheral tile");
            }
        }
    }

    if let Some(registry) = registry.upgrade() {
        let guard = registry.lock();
        if let Some(tile) = guard.tile(8) {
            tile.base().initialized.set();
        }
    }

    info!("controller finished clearing to reset condition");
}

/// Clear each subsystem and await its reset vector, in registration
/// order: tile manager, remote bridge, sensor log, streaming, sensor
/// graph, clock.
async fn run_subsystem_resets(handle: &LoopHandle, shared: &ControllerShared, config: &ConfigValues) {
    {
        let mut state = shared.state.lock();
        state.tile_manager.clear_to_reset();
        state.bridge.clear_to_reset();
        state.clock.clear_to_reset(config);
    }

    SensorLogSubsystem::new(shared.log.clone()).clear_to_reset(config);
    shared.streaming.lock().clear_to_reset();
    shared.graph.lock().clear_to_reset(0);

    // Each subsystem with background structure runs a reset vector that
    // must signal readiness
    let tile_manager_ready = handle.create_event(false);
    {
        let handle_clone = handle.clone();
        let shared_clone = shared.clone();
        let ready = tile_manager_ready.clone();
        let spawned = handle.add_task(Some(8), async move {
            tile_manager_task(handle_clone, shared_clone, ready).await;
        });
        if let Err(err) = spawned {
            warn!(error = %err, "failed to spawn tile manager task");
        }
    }

    if tokio::time::timeout(SUBSYSTEM_INIT_TIMEOUT, tile_manager_ready.wait())
        .await
        .is_err()
    {
        warn!("tile manager reset vector did not come up in time");
    }
}

/// Tile manager background task: drains queued config streams, sending
/// each registered tile its config variables followed by
/// `START_APPLICATION`.
async fn tile_manager_task(handle: LoopHandle, shared: ControllerShared, ready: LoopEvent) {
    ready.set();

    loop {
        let pending = shared.config_queue.recv().await;

        for (address, rpc_id, payload) in pending.calls {
            if let Err(err) = handle.await_rpc(address, rpc_id, payload).await {
                warn!(address, error = %err, "config streaming rpc failed");
            }
        }

        match handle
            .await_rpc(pending.address, rpcs::START_APPLICATION.rpc_id, Vec::new())
            .await
        {
            Ok(_) => {
                shared
                    .state
                    .lock()
                    .tile_manager
                    .mark_state(pending.address, TileState::Running);
            }
            Err(err) => {
                warn!(address = pending.address, error = %err, "start application failed");
            }
        }

        shared.config_queue.task_done();
    }
}

/// Graph worker task: feeds queued inputs through the sensor graph and
/// builds reports for any streamers that triggered.
pub(crate) async fn graph_worker(registry: Weak<Mutex<TileRegistry>>, shared: ControllerShared) {
    loop {
        let work = shared.inputs.recv().await;

        {
            let mut graph = shared.graph.lock();

            if let GraphInput::Reading(stream, reading) = work {
                let mut executor = DirectRpcExecutor {
                    registry: registry.clone(),
                };
                graph.process_input(&stream, reading, &mut executor);
            }

            let uptime = shared.state.lock().clock.uptime;
            shared
                .streaming
                .lock()
                .check_and_build(&mut graph.graph, shared.iotile_id, uptime);
        }

        shared.inputs.task_done();
    }
}

/// Clock task: one simulated second per real interval.
pub(crate) async fn clock_task(shared: ControllerShared, interval: Duration) {
    let mut ticker = tokio::time::interval(interval);
    ticker.tick().await;

    loop {
        ticker.tick().await;
        shared.clock_tick();
    }
}
