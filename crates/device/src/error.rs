// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Error types for the emulation layer

use thiserror::Error;

/// Errors surfaced to RPC callers.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RpcError {
    #[error("no tile at address {0}")]
    TileNotFound(u8),
    #[error("tile {address} does not implement rpc {rpc_id:#06x}")]
    UnsupportedRpc { address: u8, rpc_id: u16 },
    #[error("tile {0} already has an rpc in flight")]
    Busy(u8),
    #[error("rpc timed out")]
    Timeout,
    #[error("called from the wrong thread: {0}")]
    WrongThread(&'static str),
    #[error("invalid rpc payload: {0}")]
    InvalidPayload(#[from] tb_core::WireError),
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("operation attempted in the wrong state: {0}")]
    InvalidState(String),
    #[error("rpc returned application error {0:#010x}")]
    RpcRuntime(u32),
    #[error("emulation loop is not running")]
    NotRunning,
    #[error("internal error: {0}")]
    Internal(String),
}

/// Errors from device lifecycle and snapshot handling.
#[derive(Debug, Error)]
pub enum DeviceError {
    #[error("rpc error: {0}")]
    Rpc(#[from] RpcError),
    #[error("storage error: {0}")]
    Storage(#[from] tb_storage::StorageError),
    #[error("engine error: {0}")]
    Engine(#[from] tb_engine::EngineError),
    #[error("snapshot error: {0}")]
    Snapshot(#[from] tb_storage::SnapshotError),
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("unknown scenario: {0}")]
    UnknownScenario(String),
    #[error("snapshot does not match this device: {0}")]
    SnapshotMismatch(String),
    #[error("device is already running")]
    AlreadyStarted,
    #[error("timed out waiting for the device to become idle")]
    IdleTimeout,
    #[error("internal error: {0}")]
    Internal(String),
}
