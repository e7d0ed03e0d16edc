// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! The sensor log: centralized storage for every named stream.
//!
//! The log owns the storage engine and every walker created against it,
//! keeping walkers current as readings are pushed and buffers roll over.
//! Readings committed to a buffered or output stream receive a reading id
//! that is strictly monotonic for the lifetime of the log and is never
//! reused, even across rollover or a clear.

use crate::engine::{BufferKind, EngineState, SharedEngine, StorageEngine};
use crate::walker::{self, SharedWalker, StreamWalker, WalkerState};
use crate::StorageError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tb_core::{streams, DataStream, DataStreamSelector, DeviceModel, Reading, StreamType};
use tokio::sync::mpsc;
use tracing::debug;

/// Channel receiving `(stream, reading)` pairs for a watched selector.
pub type StreamMonitor = mpsc::UnboundedReceiver<(DataStream, Reading)>;

/// A storage engine holding multiple named FIFOs.
pub struct SensorLog {
    engine: SharedEngine,
    model: DeviceModel,
    queue_walkers: Vec<SharedWalker>,
    virtual_walkers: Vec<SharedWalker>,
    monitors: Vec<(Option<DataStreamSelector>, mpsc::UnboundedSender<(DataStream, Reading)>)>,
    last_values: HashMap<DataStream, Reading>,
    rollover_storage: bool,
    rollover_streaming: bool,
    next_id: u32,
}

/// Serialized sensor log state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SensorLogState {
    pub engine: EngineState,
    pub rollover_storage: bool,
    pub rollover_streaming: bool,
    pub last_values: HashMap<DataStream, Reading>,
    pub walkers: HashMap<String, WalkerState>,
    pub next_id: u32,
}

impl SensorLog {
    pub fn new(model: DeviceModel) -> Self {
        let engine = StorageEngine::shared(&model);

        SensorLog {
            engine,
            model,
            queue_walkers: Vec::new(),
            virtual_walkers: Vec::new(),
            monitors: Vec::new(),
            last_values: HashMap::new(),
            rollover_storage: true,
            rollover_streaming: true,
            next_id: 1,
        }
    }

    pub fn model(&self) -> &DeviceModel {
        &self.model
    }

    /// Configure rollover vs fill-stop for one buffer area.
    pub fn set_rollover(&mut self, area: BufferKind, enabled: bool) {
        match area {
            BufferKind::Storage => self.rollover_storage = enabled,
            BufferKind::Streaming => self.rollover_streaming = enabled,
        }
    }

    /// Create a walker for the given selector and keep it current.
    ///
    /// Buffered selectors produce a cursor into the matching ring buffer;
    /// counter and virtual selectors produce latch walkers.  `skip_all`
    /// only affects buffered walkers: when false the walker starts at the
    /// buffer head and adopts the current fill count.
    pub fn create_walker(
        &mut self,
        selector: DataStreamSelector,
        skip_all: bool,
    ) -> Result<SharedWalker, StorageError> {
        if selector.buffered() {
            let walker = walker::shared(StreamWalker::buffered(
                selector,
                self.engine.clone(),
                skip_all,
            ));
            self.queue_walkers.push(walker.clone());
            return Ok(walker);
        }

        let walker = if selector.match_type == StreamType::Counter {
            StreamWalker::counter(selector)?
        } else {
            StreamWalker::virtual_stream(selector)?
        };

        let walker = walker::shared(walker);
        self.virtual_walkers.push(walker.clone());
        Ok(walker)
    }

    /// Remove a walker from the update lists.
    pub fn destroy_walker(&mut self, walker: &SharedWalker) {
        self.queue_walkers.retain(|w| !std::sync::Arc::ptr_eq(w, walker));
        self.virtual_walkers.retain(|w| !std::sync::Arc::ptr_eq(w, walker));
    }

    /// Drop every walker.  Used when a snapshot restore or reset rebuilds
    /// the set of walkers from scratch.
    pub fn destroy_all_walkers(&mut self) {
        self.queue_walkers.clear();
        self.virtual_walkers.clear();
    }

    /// Watch a selector, receiving every matching pushed reading.  A
    /// `None` selector matches every stream.
    pub fn watch(&mut self, selector: Option<DataStreamSelector>) -> StreamMonitor {
        let (tx, rx) = mpsc::unbounded_channel();
        self.monitors.push((selector, tx));
        rx
    }

    /// Number of readings persisted as `(storage, streaming)`.
    pub fn count(&self) -> (usize, usize) {
        self.engine.lock().count()
    }

    /// The highest reading id allocated so far, 0 when none have been.
    pub fn highest_allocated_id(&self) -> u32 {
        self.next_id - 1
    }

    fn allocate_id(&mut self) -> u32 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    /// Push a reading into a stream, updating every associated walker.
    ///
    /// Buffered and output readings are persisted and assigned a fresh
    /// reading id.  When the target buffer is full the oldest erase block
    /// is dropped first, unless that area is configured fill-stop, in
    /// which case the push fails with [`StorageError::RingBufferFull`].
    pub fn push(&mut self, stream: &DataStream, reading: Reading) -> Result<(), StorageError> {
        let mut reading = reading;
        reading.stream = stream.encode();

        if stream.buffered() {
            reading.reading_id = Some(self.allocate_id());

            let push_result = self.engine.lock().push(stream, reading);
            match push_result {
                Err(StorageError::RingBufferFull) => {
                    let rollover = if stream.output() {
                        self.rollover_streaming
                    } else {
                        self.rollover_storage
                    };

                    if !rollover {
                        return Err(StorageError::RingBufferFull);
                    }

                    self.erase_block(BufferKind::for_stream(stream))?;
                    self.engine.lock().push(stream, reading)?;
                }
                other => other?,
            }

            // Only walkers on the same buffer see the append
            for walker in &self.queue_walkers {
                let mut guard = walker.lock();
                if guard.buffer() == Some(BufferKind::for_stream(stream)) {
                    guard.notify_added(stream);
                }
            }
        }

        // Monitors see every push, persistent or virtual.  Senders whose
        // receiver has gone away are dropped from the list.
        self.monitors.retain(|(selector, tx)| {
            let interested = selector.as_ref().map(|s| s.matches(stream)).unwrap_or(true);
            if !interested {
                return true;
            }
            tx.send((*stream, reading)).is_ok()
        });

        // Virtual streams live only in their walkers
        for walker in &self.virtual_walkers {
            let mut guard = walker.lock();
            if guard.matches(stream) {
                guard.push(stream, reading)?;
            }
        }

        self.last_values.insert(*stream, reading);
        Ok(())
    }

    /// Erase one block from the head of a full buffer, notifying walkers
    /// so their cursors and counts stay consistent.
    fn erase_block(&mut self, buffer: BufferKind) -> Result<(), StorageError> {
        let erase_size = self.model.buffer_erase_size.max(1);

        let (erased, erased_before) = {
            let mut guard = self.engine.lock();
            let before = guard.erased(buffer);
            (guard.popn(buffer, erase_size), before)
        };

        debug!(buffer = ?buffer, count = erased.len(), "erased block for rollover");

        for (i, old) in erased.iter().enumerate() {
            let stream = DataStream::decode(old.stream)?;
            let boundary = erased_before + i as u64 + 1;

            for walker in &self.queue_walkers {
                let mut guard = walker.lock();
                if guard.buffer() == Some(buffer) {
                    guard.notify_rollover(&stream, boundary)?;
                }
            }
        }

        Ok(())
    }

    /// Return the last value pushed into a stream.
    ///
    /// With `only_allocated` the stream must have a virtual walker
    /// allocated, mimicking a device without a last-values array.
    pub fn inspect_last(
        &self,
        stream: &DataStream,
        only_allocated: bool,
    ) -> Result<Reading, StorageError> {
        if only_allocated {
            let found = self
                .virtual_walkers
                .iter()
                .any(|walker| walker.lock().matches(stream));

            if !found {
                return Err(StorageError::UnresolvedStream(stream.to_string()));
            }
        }

        self.last_values
            .get(stream)
            .copied()
            .ok_or_else(|| StorageError::StreamEmpty(DataStreamSelector::from_stream(stream)))
    }

    /// Dump `(stream, reading)` pairs for all constant streams.
    pub fn dump_constants(&self) -> Vec<(DataStream, Reading)> {
        let mut constants = Vec::new();

        for walker in &self.virtual_walkers {
            let guard = walker.lock();
            if !guard.is_constant() {
                continue;
            }

            if let (Ok(stream), Ok(reading)) = (guard.selector().as_stream(), guard.peek()) {
                constants.push((stream, reading));
            }
        }

        constants
    }

    /// Clear all stored data, skipping every walker, then log a single
    /// reading to `DATA_CLEARED`.  The fresh reading receives the next
    /// reading id, which records the highest id allocated before the
    /// clear; `next_id` itself is never reset.
    pub fn clear(&mut self, timestamp: u32) -> Result<(), StorageError> {
        for walker in &self.virtual_walkers {
            walker.lock().skip_all();
        }

        self.engine.lock().clear();

        for walker in &self.queue_walkers {
            walker.lock().skip_all();
        }

        self.last_values.clear();

        let cleared = streams::stream(streams::DATA_CLEARED);
        self.push(&cleared, Reading::new(streams::DATA_CLEARED, timestamp, 1))
    }

    /// Serialize the log including every walker cursor, keyed by the
    /// walker's canonical selector string.
    pub fn dump(&self) -> SensorLogState {
        let mut walkers = HashMap::new();
        for walker in self.queue_walkers.iter().chain(self.virtual_walkers.iter()) {
            let guard = walker.lock();
            walkers.insert(guard.selector().to_string(), guard.dump());
        }

        SensorLogState {
            engine: self.engine.lock().dump(),
            rollover_storage: self.rollover_storage,
            rollover_streaming: self.rollover_streaming,
            last_values: self.last_values.clone(),
            walkers,
            next_id: self.next_id,
        }
    }

    /// Restore a previously dumped state onto the current set of walkers.
    ///
    /// Walkers present now but missing from the dump fail the restore
    /// unless `permissive` is set, in which case they are left alone.
    pub fn restore(&mut self, state: &SensorLogState, permissive: bool) -> Result<(), StorageError> {
        self.engine.lock().restore(&state.engine);
        self.rollover_storage = state.rollover_storage;
        self.rollover_streaming = state.rollover_streaming;
        self.last_values = state.last_values.clone();
        self.next_id = state.next_id;

        for walker in self.queue_walkers.iter().chain(self.virtual_walkers.iter()) {
            let mut guard = walker.lock();
            let key = guard.selector().to_string();

            match state.walkers.get(&key) {
                Some(saved) => guard.restore(saved)?,
                None if permissive => {}
                None => return Err(StorageError::SnapshotMismatch(*guard.selector())),
            }
        }

        Ok(())
    }
}

#[cfg(test)]
#[path = "log_tests.rs"]
mod tests;
