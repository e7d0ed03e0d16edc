// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! The reading value type.

use serde::{Deserialize, Serialize};

/// A single timestamped value in a stream.
///
/// Readings pushed to a buffered or output stream are assigned a
/// `reading_id` by the sensor log; readings in virtual streams carry
/// `None`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reading {
    /// Encoded stream id this reading belongs to.
    pub stream: u16,
    /// Device-relative timestamp in seconds.
    pub raw_time: u32,
    pub value: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reading_id: Option<u32>,
}

impl Reading {
    pub fn new(stream: u16, raw_time: u32, value: i32) -> Self {
        Reading {
            stream,
            raw_time,
            value,
            reading_id: None,
        }
    }

    pub fn with_id(stream: u16, raw_time: u32, value: i32, reading_id: u32) -> Self {
        Reading {
            stream,
            raw_time,
            value,
            reading_id: Some(reading_id),
        }
    }

    /// The reading id, or 0 for readings that never received one.
    pub fn id_or_zero(&self) -> u32 {
        self.reading_id.unwrap_or(0)
    }
}
