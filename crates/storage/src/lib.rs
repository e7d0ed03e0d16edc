// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! tb-storage: Ring-buffered reading storage and stream walkers

mod engine;
mod log;
mod snapshot;
mod walker;

pub use engine::{BufferKind, EngineState, SharedEngine, StorageEngine};
pub use log::{SensorLog, SensorLogState, StreamMonitor};
pub use snapshot::{Snapshot, SnapshotError};
pub use walker::{SharedWalker, StreamWalker, WalkerState};

use parking_lot::Mutex;
use std::sync::Arc;
use tb_core::DataStreamSelector;
use thiserror::Error;

/// Shared handle to a sensor log, used by every subsystem that stores or
/// reads stream data.
pub type SharedLog = Arc<Mutex<SensorLog>>;

/// Errors from the storage layer
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("ring buffer full")]
    RingBufferFull,
    #[error("stream empty: {0}")]
    StreamEmpty(DataStreamSelector),
    #[error("operation not supported on an invalid stream walker: {0}")]
    InvalidWalker(DataStreamSelector),
    #[error("cannot create a virtual walker from a wildcard selector: {0}")]
    WildcardVirtualStream(DataStreamSelector),
    #[error("stream has never been written: {0}")]
    UnresolvedStream(String),
    #[error("walker {0} exists now but was not present in the restored state")]
    SnapshotMismatch(DataStreamSelector),
    #[error("invalid stream id: {0}")]
    InvalidStream(#[from] tb_core::StreamError),
    #[error("walker out of sync with storage engine: {0}")]
    Internal(String),
}
