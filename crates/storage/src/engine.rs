// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! In-memory ring-buffer storage for persistent readings.
//!
//! The engine holds two independent bounded buffers: `storage` for buffered
//! streams and `streaming` for output streams.  Offsets handed to [`get`]
//! are absolute positions counted from the first reading ever stored, so
//! they stay stable while the head of a full buffer is erased; the engine
//! tracks how many readings each buffer has dropped.
//!
//! [`get`]: StorageEngine::get

use crate::StorageError;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Arc;
use tb_core::{DataStream, DeviceModel, Reading};

/// Which of the two ring buffers a reading lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BufferKind {
    Storage,
    Streaming,
}

impl BufferKind {
    /// The buffer a stream's readings are routed to.
    pub fn for_stream(stream: &DataStream) -> Self {
        if stream.output() {
            BufferKind::Streaming
        } else {
            BufferKind::Storage
        }
    }

    pub fn is_output(&self) -> bool {
        matches!(self, BufferKind::Streaming)
    }
}

/// One bounded ring buffer plus its erase accounting.
#[derive(Debug, Clone)]
struct RingBuffer {
    readings: VecDeque<Reading>,
    capacity: usize,
    /// Total readings ever erased from the head.
    erased: u64,
}

impl RingBuffer {
    fn new(capacity: usize) -> Self {
        RingBuffer {
            readings: VecDeque::new(),
            capacity,
            erased: 0,
        }
    }

    fn push(&mut self, reading: Reading) -> Result<(), StorageError> {
        if self.readings.len() >= self.capacity {
            return Err(StorageError::RingBufferFull);
        }

        self.readings.push_back(reading);
        Ok(())
    }

    fn get(&self, offset: u64) -> Option<Reading> {
        let index = offset.checked_sub(self.erased)?;
        self.readings.get(index as usize).copied()
    }

    fn popn(&mut self, count: usize) -> Vec<Reading> {
        let count = count.min(self.readings.len());
        let erased: Vec<Reading> = self.readings.drain(..count).collect();
        self.erased += erased.len() as u64;
        erased
    }

    /// Absolute offset one past the newest stored reading.
    fn tail(&self) -> u64 {
        self.erased + self.readings.len() as u64
    }
}

/// Storage engine with independent storage and streaming ring buffers.
#[derive(Debug)]
pub struct StorageEngine {
    storage: RingBuffer,
    streaming: RingBuffer,
}

/// Shared handle used by buffered walkers.
pub type SharedEngine = Arc<Mutex<StorageEngine>>;

/// Serialized engine contents.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineState {
    pub storage: Vec<Reading>,
    pub streaming: Vec<Reading>,
    #[serde(default)]
    pub storage_erased: u64,
    #[serde(default)]
    pub streaming_erased: u64,
}

impl StorageEngine {
    pub fn new(model: &DeviceModel) -> Self {
        StorageEngine {
            storage: RingBuffer::new(model.max_storage_buffer),
            streaming: RingBuffer::new(model.max_streaming_buffer),
        }
    }

    pub fn shared(model: &DeviceModel) -> SharedEngine {
        Arc::new(Mutex::new(StorageEngine::new(model)))
    }

    fn buffer(&self, kind: BufferKind) -> &RingBuffer {
        match kind {
            BufferKind::Storage => &self.storage,
            BufferKind::Streaming => &self.streaming,
        }
    }

    fn buffer_mut(&mut self, kind: BufferKind) -> &mut RingBuffer {
        match kind {
            BufferKind::Storage => &mut self.storage,
            BufferKind::Streaming => &mut self.streaming,
        }
    }

    /// Append a reading, routed by its stream.  Fails with
    /// [`StorageError::RingBufferFull`] when the target buffer is at
    /// capacity; the caller decides whether to erase and retry.
    pub fn push(&mut self, stream: &DataStream, reading: Reading) -> Result<(), StorageError> {
        self.buffer_mut(BufferKind::for_stream(stream)).push(reading)
    }

    /// Fetch the reading at an absolute offset, or `None` when the offset
    /// has been erased or not yet written.
    pub fn get(&self, kind: BufferKind, offset: u64) -> Option<Reading> {
        self.buffer(kind).get(offset)
    }

    /// Erase up to `count` readings from the head of a buffer, returning
    /// them oldest first.
    pub fn popn(&mut self, kind: BufferKind, count: usize) -> Vec<Reading> {
        self.buffer_mut(kind).popn(count)
    }

    /// Number of readings currently stored as `(storage, streaming)`.
    pub fn count(&self) -> (usize, usize) {
        (self.storage.readings.len(), self.streaming.readings.len())
    }

    /// Total readings ever erased from the head of a buffer.
    pub fn erased(&self, kind: BufferKind) -> u64 {
        self.buffer(kind).erased
    }

    /// Absolute offset of the tail (one past the newest reading).
    pub fn tail(&self, kind: BufferKind) -> u64 {
        self.buffer(kind).tail()
    }

    /// Count readings currently stored in a buffer that satisfy `pred`.
    pub fn count_matching(&self, kind: BufferKind, mut pred: impl FnMut(&Reading) -> bool) -> usize {
        self.buffer(kind).readings.iter().filter(|r| pred(r)).count()
    }

    /// Visit every stored reading in both buffers.
    pub fn scan(&self, mut visit: impl FnMut(&Reading)) {
        for reading in self.storage.readings.iter().chain(self.streaming.readings.iter()) {
            visit(reading);
        }
    }

    /// The highest reading id currently stored in either buffer.
    pub fn highest_stored_id(&self) -> u32 {
        let mut highest = 0;
        self.scan(|reading| {
            if let Some(id) = reading.reading_id {
                if id > highest {
                    highest = id;
                }
            }
        });

        highest
    }

    /// Empty both buffers and reset erase accounting.
    pub fn clear(&mut self) {
        self.storage.readings.clear();
        self.storage.erased = 0;
        self.streaming.readings.clear();
        self.streaming.erased = 0;
    }

    pub fn dump(&self) -> EngineState {
        EngineState {
            storage: self.storage.readings.iter().copied().collect(),
            streaming: self.streaming.readings.iter().copied().collect(),
            storage_erased: self.storage.erased,
            streaming_erased: self.streaming.erased,
        }
    }

    /// Replace the buffer contents from a dumped state.  Capacities are
    /// not part of the dump; they stay as configured.
    pub fn restore(&mut self, state: &EngineState) {
        self.storage.readings = state.storage.iter().copied().collect();
        self.storage.erased = state.storage_erased;
        self.streaming.readings = state.streaming.iter().copied().collect();
        self.streaming.erased = state.streaming_erased;
    }
}

#[cfg(test)]
#[path = "engine_tests.rs"]
mod tests;
