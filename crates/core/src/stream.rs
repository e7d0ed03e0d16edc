// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Data stream identifiers.
//!
//! Streams are named FIFOs identified by a packed 16-bit tag: a 4-bit stream
//! type, a 1-bit system flag and an 11-bit stream number.  Only `Buffered`
//! and `Output` streams are persisted to the ring buffers; the remaining
//! types live inside stream walkers.

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Stream ids reserved for break streams.
///
/// Break streams are system streams that are included by default in
/// wildcard matching that would otherwise exclude system streams.
pub const KNOWN_BREAK_STREAMS: &[u16] = &[1024];

/// Highest stream number representable in the 11-bit field.
pub const MAX_STREAM_NUMBER: u16 = (1 << 11) - 1;

/// Errors from parsing or decoding stream identifiers and selectors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StreamError {
    #[error("invalid stream type: {0}")]
    InvalidType(String),
    #[error("invalid encoded stream type: {0}")]
    InvalidEncodedType(u16),
    #[error("malformed stream designator: {0}")]
    Malformed(String),
    #[error("stream number out of range: {0}")]
    NumberOutOfRange(u32),
    #[error("invalid match specifier: {0}")]
    InvalidSpecifier(String),
    #[error("invalid encoded match specifier: {0:#06x}")]
    InvalidEncodedSpecifier(u16),
    #[error("selector matches multiple streams: {0}")]
    NotSingular(String),
}

/// The six stream types supported by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamType {
    Buffered = 0,
    Unbuffered = 1,
    Constant = 2,
    Input = 3,
    Counter = 4,
    Output = 5,
}

impl StreamType {
    /// Decode a stream type from its 4-bit wire value.
    pub fn from_encoded(value: u16) -> Result<Self, StreamError> {
        match value {
            0 => Ok(StreamType::Buffered),
            1 => Ok(StreamType::Unbuffered),
            2 => Ok(StreamType::Constant),
            3 => Ok(StreamType::Input),
            4 => Ok(StreamType::Counter),
            5 => Ok(StreamType::Output),
            other => Err(StreamError::InvalidEncodedType(other)),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            StreamType::Buffered => "buffered",
            StreamType::Unbuffered => "unbuffered",
            StreamType::Constant => "constant",
            StreamType::Input => "input",
            StreamType::Counter => "counter",
            StreamType::Output => "output",
        }
    }
}

impl FromStr for StreamType {
    type Err = StreamError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "buffered" => Ok(StreamType::Buffered),
            "unbuffered" => Ok(StreamType::Unbuffered),
            "constant" => Ok(StreamType::Constant),
            "input" => Ok(StreamType::Input),
            "counter" => Ok(StreamType::Counter),
            "output" => Ok(StreamType::Output),
            other => Err(StreamError::InvalidType(other.to_string())),
        }
    }
}

impl fmt::Display for StreamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An immutable specifier of a single data stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DataStream {
    pub stream_type: StreamType,
    pub stream_number: u16,
    pub system: bool,
}

impl DataStream {
    /// Create a stream id.  Stream numbers beyond the 11-bit field are
    /// rejected.
    pub fn new(stream_type: StreamType, stream_number: u16, system: bool) -> Result<Self, StreamError> {
        if stream_number > MAX_STREAM_NUMBER {
            return Err(StreamError::NumberOutOfRange(stream_number as u32));
        }

        Ok(DataStream {
            stream_type,
            stream_number,
            system,
        })
    }

    /// Pack this stream id into its 16-bit wire form.
    pub fn encode(&self) -> u16 {
        ((self.stream_type as u16) << 12) | ((self.system as u16) << 11) | self.stream_number
    }

    /// Decode a stream id from its 16-bit wire form.
    pub fn decode(encoded: u16) -> Result<Self, StreamError> {
        let stream_type = StreamType::from_encoded((encoded >> 12) & 0b1111)?;
        let system = encoded & (1 << 11) != 0;
        let stream_number = encoded & MAX_STREAM_NUMBER;

        Ok(DataStream {
            stream_type,
            stream_number,
            system,
        })
    }

    /// Whether readings in this stream are persisted to a ring buffer.
    pub fn buffered(&self) -> bool {
        matches!(self.stream_type, StreamType::Buffered | StreamType::Output)
    }

    /// Whether this stream is stored in the streaming ring buffer.
    pub fn output(&self) -> bool {
        self.stream_type == StreamType::Output
    }

    /// Whether this stream is a break stream that wildcard selectors
    /// include even when they exclude system streams.
    pub fn is_break(&self) -> bool {
        self.system && KNOWN_BREAK_STREAMS.contains(&self.stream_number)
    }
}

impl fmt::Display for DataStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.system {
            write!(f, "system {} {}", self.stream_type, self.stream_number)
        } else {
            write!(f, "{} {}", self.stream_type, self.stream_number)
        }
    }
}

impl FromStr for DataStream {
    type Err = StreamError;

    /// Parse the `[system] <type> <number>` string form.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split_whitespace().collect();

        let (system, type_str, number_str) = match parts.as_slice() {
            ["system", type_str, number] => (true, *type_str, *number),
            [type_str, number] => (false, *type_str, *number),
            _ => return Err(StreamError::Malformed(s.to_string())),
        };

        let stream_type = type_str.parse::<StreamType>()?;
        let number = parse_int(number_str).ok_or_else(|| StreamError::Malformed(s.to_string()))?;
        if number > MAX_STREAM_NUMBER as u32 {
            return Err(StreamError::NumberOutOfRange(number));
        }

        DataStream::new(stream_type, number as u16, system)
    }
}

// Streams serialize as their canonical string form so they can be used
// directly as snapshot map keys.
impl Serialize for DataStream {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for DataStream {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(D::Error::custom)
    }
}

/// Parse a decimal or `0x`-prefixed hex integer.
pub(crate) fn parse_int(s: &str) -> Option<u32> {
    if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        u32::from_str_radix(hex, 16).ok()
    } else {
        s.parse().ok()
    }
}

#[cfg(test)]
#[path = "stream_tests.rs"]
mod tests;
