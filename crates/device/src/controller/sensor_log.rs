// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! The raw sensor log subsystem: the controller's RPC face over the
//! shared [`SensorLog`].
//!
//! [`SensorLog`]: tb_storage::SensorLog

use crate::tile::ConfigValues;
use tb_core::{errors, pack_error, DataStream, Subsystem, NO_ERROR};
use tb_storage::{BufferKind, SharedLog, StorageError};
use tracing::debug;

/// Controller subsystem wrapping the shared sensor log.
pub struct SensorLogSubsystem {
    pub log: SharedLog,
}

impl SensorLogSubsystem {
    pub fn new(log: SharedLog) -> Self {
        SensorLogSubsystem { log }
    }

    /// Push a value to a stream.  Returns a packed 32-bit status.
    pub fn push(&self, stream_id: u16, timestamp: u32, value: i32) -> u32 {
        let stream = match DataStream::decode(stream_id) {
            Ok(stream) => stream,
            Err(_) => {
                return pack_error(
                    Subsystem::SensorLog,
                    errors::sensor_log::VIRTUAL_STREAM_NOT_FOUND,
                )
            }
        };

        let reading = tb_core::Reading::new(stream_id, timestamp, value);
        match self.log.lock().push(&stream, reading) {
            Ok(()) => NO_ERROR,
            Err(StorageError::RingBufferFull) => {
                pack_error(Subsystem::SensorLog, errors::sensor_log::RING_BUFFER_FULL)
            }
            Err(_) => pack_error(
                Subsystem::SensorLog,
                errors::sensor_log::STREAM_WALKER_NOT_FOUND,
            ),
        }
    }

    /// Push `count` copies of a value.  Returns a packed status and how
    /// many pushes succeeded.
    pub fn push_many(&self, stream_id: u16, timestamp: u32, value: i32, count: u32) -> (u32, u32) {
        for i in 1..=count {
            let err = self.push(stream_id, timestamp, value);
            if err != NO_ERROR {
                return (err, i);
            }
        }

        (NO_ERROR, count)
    }

    /// `(storage, streaming)` reading counts.
    pub fn count(&self) -> (usize, usize) {
        self.log.lock().count()
    }

    /// Clear all stored readings, logging the `DATA_CLEARED` marker.
    pub fn clear(&self, timestamp: u32) -> u32 {
        debug!(timestamp, "clearing sensor log");
        match self.log.lock().clear(timestamp) {
            Ok(()) => NO_ERROR,
            Err(_) => pack_error(Subsystem::SensorLog, errors::sensor_log::RING_BUFFER_FULL),
        }
    }

    /// Inspect the last value written to a virtual stream.  Returns a
    /// packed status and the value.
    pub fn inspect_virtual(&self, stream_id: u16) -> (u32, i32) {
        let stream = match DataStream::decode(stream_id) {
            Ok(stream) => stream,
            Err(_) => {
                return (
                    pack_error(
                        Subsystem::SensorLog,
                        errors::sensor_log::VIRTUAL_STREAM_NOT_FOUND,
                    ),
                    0,
                )
            }
        };

        if stream.buffered() {
            return (
                pack_error(
                    Subsystem::SensorLog,
                    errors::sensor_log::VIRTUAL_STREAM_NOT_FOUND,
                ),
                0,
            );
        }

        match self.log.lock().inspect_last(&stream, true) {
            Ok(reading) => (NO_ERROR, reading.value),
            Err(StorageError::StreamEmpty(_)) => (NO_ERROR, 0),
            Err(_) => (
                pack_error(
                    Subsystem::SensorLog,
                    errors::sensor_log::VIRTUAL_STREAM_NOT_FOUND,
                ),
                0,
            ),
        }
    }

    /// The highest reading id allocated so far.
    pub fn highest_allocated_id(&self) -> u32 {
        self.log.lock().highest_allocated_id()
    }

    /// Apply reset-time configuration: fill-stop flags and walker
    /// teardown (walkers are recreated when the graph reloads).
    pub fn clear_to_reset(&self, config: &ConfigValues) {
        let mut log = self.log.lock();
        log.destroy_all_walkers();

        let storage_fillstop = config
            .get("storage_fillstop")
            .map(|value| value.as_bool())
            .unwrap_or(false);
        let streaming_fillstop = config
            .get("streaming_fillstop")
            .map(|value| value.as_bool())
            .unwrap_or(false);

        log.set_rollover(BufferKind::Storage, !storage_fillstop);
        log.set_rollover(BufferKind::Streaming, !streaming_fillstop);
    }
}
