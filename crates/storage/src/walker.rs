// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Stream walkers: stateful cursors over stream contents.
//!
//! A walker is created from a selector and stays current through push and
//! rollover notifications issued by the sensor log.  Buffered walkers hold
//! an absolute offset into one of the engine's ring buffers; virtual,
//! counter and invalid walkers carry their state inline.

use crate::engine::{BufferKind, SharedEngine};
use crate::StorageError;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tb_core::{DataStream, DataStreamSelector, Reading, StreamType};

/// Shared handle to a walker.  The sensor log and every node input that
/// reads the same selector observe one shared cursor.
pub type SharedWalker = Arc<Mutex<StreamWalker>>;

/// Count reported by constant walkers, which can never be exhausted.
const INEXHAUSTIBLE: u32 = u32::MAX;

#[derive(Debug)]
enum WalkerKind {
    Buffered {
        engine: SharedEngine,
        buffer: BufferKind,
        offset: u64,
        available: u32,
    },
    Virtual {
        reading: Option<Reading>,
    },
    Counter {
        reading: Option<Reading>,
        count: u32,
    },
    Invalid,
}

/// A cursor that reads from the stream(s) matched by a selector.
#[derive(Debug)]
pub struct StreamWalker {
    selector: DataStreamSelector,
    kind: WalkerKind,
}

/// Serialized walker cursor, keyed by selector in snapshots.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum WalkerState {
    Buffered {
        offset: u64,
        available: u32,
    },
    Virtual {
        reading: Option<Reading>,
    },
    Counter {
        reading: Option<Reading>,
        count: u32,
    },
}

impl StreamWalker {
    /// Create a buffered walker.  With `skip_all` the cursor starts at the
    /// buffer tail with nothing available; otherwise it starts at the head
    /// and adopts the current count of matching readings.
    pub fn buffered(selector: DataStreamSelector, engine: SharedEngine, skip_all: bool) -> Self {
        let buffer = if selector.output() {
            BufferKind::Streaming
        } else {
            BufferKind::Storage
        };

        let (offset, available) = {
            let guard = engine.lock();
            if skip_all {
                (guard.tail(buffer), 0)
            } else {
                let matching = guard.count_matching(buffer, |reading| {
                    DataStream::decode(reading.stream)
                        .map(|s| selector.matches(&s))
                        .unwrap_or(false)
                });
                (guard.erased(buffer), matching as u32)
            }
        };

        StreamWalker {
            selector,
            kind: WalkerKind::Buffered {
                engine,
                buffer,
                offset,
                available,
            },
        }
    }

    /// Create a virtual walker for an unbuffered, input or constant stream.
    pub fn virtual_stream(selector: DataStreamSelector) -> Result<Self, StorageError> {
        if !selector.singular() {
            return Err(StorageError::WildcardVirtualStream(selector));
        }

        Ok(StreamWalker {
            selector,
            kind: WalkerKind::Virtual { reading: None },
        })
    }

    /// Create a counter walker.
    pub fn counter(selector: DataStreamSelector) -> Result<Self, StorageError> {
        if !selector.singular() {
            return Err(StorageError::WildcardVirtualStream(selector));
        }

        Ok(StreamWalker {
            selector,
            kind: WalkerKind::Counter {
                reading: None,
                count: 0,
            },
        })
    }

    /// Create an invalid walker for an unconnected node input.
    pub fn invalid(selector: DataStreamSelector) -> Self {
        StreamWalker {
            selector,
            kind: WalkerKind::Invalid,
        }
    }

    pub fn selector(&self) -> &DataStreamSelector {
        &self.selector
    }

    /// Whether this walker responds to readings in the given stream.
    /// Invalid walkers match nothing.
    pub fn matches(&self, stream: &DataStream) -> bool {
        match self.kind {
            WalkerKind::Invalid => false,
            _ => self.selector.matches(stream),
        }
    }

    pub fn is_buffered(&self) -> bool {
        matches!(self.kind, WalkerKind::Buffered { .. })
    }

    pub fn is_constant(&self) -> bool {
        matches!(self.kind, WalkerKind::Virtual { .. })
            && self.selector.match_type == StreamType::Constant
    }

    /// Which ring buffer this walker reads, if buffered.
    pub fn buffer(&self) -> Option<BufferKind> {
        match self.kind {
            WalkerKind::Buffered { buffer, .. } => Some(buffer),
            _ => None,
        }
    }

    /// Number of readings available to pop.
    pub fn count(&self) -> u32 {
        match &self.kind {
            WalkerKind::Buffered { available, .. } => *available,
            WalkerKind::Virtual { reading } => {
                if self.is_constant() {
                    INEXHAUSTIBLE
                } else if reading.is_some() {
                    1
                } else {
                    0
                }
            }
            WalkerKind::Counter { count, .. } => *count,
            WalkerKind::Invalid => 0,
        }
    }

    /// Pop the oldest available reading.
    pub fn pop(&mut self) -> Result<Reading, StorageError> {
        let selector = self.selector;

        match &mut self.kind {
            WalkerKind::Buffered {
                engine,
                buffer,
                offset,
                available,
            } => {
                if *available == 0 {
                    return Err(StorageError::StreamEmpty(selector));
                }

                let guard = engine.lock();
                loop {
                    let reading = guard.get(*buffer, *offset).ok_or_else(|| {
                        StorageError::Internal(format!(
                            "walker {} ran past the buffer tail with {} still available",
                            selector, available
                        ))
                    })?;
                    *offset += 1;

                    let stream = DataStream::decode(reading.stream)?;
                    if selector.matches(&stream) {
                        *available -= 1;
                        return Ok(reading);
                    }
                }
            }
            WalkerKind::Virtual { reading } => {
                let value = (*reading).ok_or(StorageError::StreamEmpty(selector))?;

                // Constant streams are never exhausted by popping
                if selector.match_type != StreamType::Constant {
                    *reading = None;
                }

                Ok(value)
            }
            WalkerKind::Counter { reading, count } => {
                if *count == 0 {
                    return Err(StorageError::StreamEmpty(selector));
                }

                let value = (*reading).ok_or(StorageError::StreamEmpty(selector))?;
                *count -= 1;
                Ok(value)
            }
            WalkerKind::Invalid => Err(StorageError::StreamEmpty(selector)),
        }
    }

    /// Look at the oldest available reading without consuming it.
    pub fn peek(&self) -> Result<Reading, StorageError> {
        match &self.kind {
            WalkerKind::Buffered {
                engine,
                buffer,
                offset,
                available,
            } => {
                if *available == 0 {
                    return Err(StorageError::StreamEmpty(self.selector));
                }

                let guard = engine.lock();
                let mut cursor = *offset;
                loop {
                    let reading = guard.get(*buffer, cursor).ok_or_else(|| {
                        StorageError::Internal(format!(
                            "walker {} ran past the buffer tail while peeking",
                            self.selector
                        ))
                    })?;
                    cursor += 1;

                    let stream = DataStream::decode(reading.stream)?;
                    if self.selector.matches(&stream) {
                        return Ok(reading);
                    }
                }
            }
            WalkerKind::Virtual { reading } | WalkerKind::Counter { reading, .. } => {
                (*reading).ok_or(StorageError::StreamEmpty(self.selector))
            }
            WalkerKind::Invalid => Err(StorageError::StreamEmpty(self.selector)),
        }
    }

    /// Latch a new reading into a virtual or counter walker.
    pub fn push(&mut self, stream: &DataStream, reading: Reading) -> Result<(), StorageError> {
        if !self.selector.matches(stream) {
            return Err(StorageError::InvalidWalker(self.selector));
        }

        match &mut self.kind {
            WalkerKind::Virtual { reading: slot } => {
                *slot = Some(reading);
                Ok(())
            }
            WalkerKind::Counter {
                reading: slot,
                count,
            } => {
                *slot = Some(reading);
                *count += 1;
                Ok(())
            }
            WalkerKind::Buffered { .. } | WalkerKind::Invalid => {
                Err(StorageError::InvalidWalker(self.selector))
            }
        }
    }

    /// Discard everything available.  Constant streams cannot be skipped.
    pub fn skip_all(&mut self) {
        let constant = self.is_constant();

        match &mut self.kind {
            WalkerKind::Buffered {
                engine,
                buffer,
                offset,
                available,
            } => {
                let guard = engine.lock();
                *offset = guard.tail(*buffer);
                *available = 0;
            }
            WalkerKind::Virtual { reading } => {
                if !constant {
                    *reading = None;
                }
            }
            WalkerKind::Counter { count, .. } => {
                *count = 0;
            }
            WalkerKind::Invalid => {}
        }
    }

    /// Notify that a reading was appended to this walker's buffer.
    pub fn notify_added(&mut self, stream: &DataStream) {
        if !self.selector.matches(stream) {
            return;
        }

        if let WalkerKind::Buffered { available, .. } = &mut self.kind {
            *available += 1;
        }
    }

    /// Notify that a reading was erased from the head of this walker's
    /// buffer.  `boundary` is the erase boundary: the absolute offset one
    /// past the erased reading.  Cursors behind the boundary snap forward
    /// to it; matching readings reduce the available count.
    pub fn notify_rollover(
        &mut self,
        stream: &DataStream,
        boundary: u64,
    ) -> Result<(), StorageError> {
        let matched = self.selector.matches(stream);

        if let WalkerKind::Buffered {
            offset, available, ..
        } = &mut self.kind
        {
            if *offset < boundary {
                *offset = boundary;
            }

            if matched {
                if *available == 0 {
                    return Err(StorageError::Internal(format!(
                        "rollover on walker {} with no readings available",
                        self.selector
                    )));
                }
                *available -= 1;
            }
        }

        Ok(())
    }

    pub fn dump(&self) -> WalkerState {
        match &self.kind {
            WalkerKind::Buffered {
                offset, available, ..
            } => WalkerState::Buffered {
                offset: *offset,
                available: *available,
            },
            WalkerKind::Virtual { reading } => WalkerState::Virtual { reading: *reading },
            WalkerKind::Counter { reading, count } => WalkerState::Counter {
                reading: *reading,
                count: *count,
            },
            WalkerKind::Invalid => WalkerState::Virtual { reading: None },
        }
    }

    /// Restore a previously dumped cursor.  The state must come from a
    /// walker of the same shape.
    pub fn restore(&mut self, state: &WalkerState) -> Result<(), StorageError> {
        match (&mut self.kind, state) {
            (
                WalkerKind::Buffered {
                    offset, available, ..
                },
                WalkerState::Buffered {
                    offset: saved_offset,
                    available: saved_available,
                },
            ) => {
                *offset = *saved_offset;
                *available = *saved_available;
                Ok(())
            }
            (WalkerKind::Virtual { reading }, WalkerState::Virtual { reading: saved }) => {
                *reading = *saved;
                Ok(())
            }
            (
                WalkerKind::Counter { reading, count },
                WalkerState::Counter {
                    reading: saved,
                    count: saved_count,
                },
            ) => {
                *reading = *saved;
                *count = *saved_count;
                Ok(())
            }
            _ => Err(StorageError::Internal(format!(
                "walker state shape mismatch for {}",
                self.selector
            ))),
        }
    }
}

/// Wrap a walker in its shared handle.
pub fn shared(walker: StreamWalker) -> SharedWalker {
    Arc::new(Mutex::new(walker))
}

#[cfg(test)]
#[path = "walker_tests.rs"]
mod tests;
