// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Stream selectors.
//!
//! A selector matches either one concrete stream or a class of streams of a
//! single type.  Wildcard selectors carry a match specifier that controls
//! whether user streams, system streams or both are matched.  Wildcards
//! never match break streams unless the specifier explicitly includes them.

use crate::stream::{DataStream, StreamError, StreamType, MAX_STREAM_NUMBER};
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Encoded wildcard marker in the 11-bit id field.
const MATCH_ALL_CODE: u16 = MAX_STREAM_NUMBER;

/// Controls which of the user/system stream populations a wildcard matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchSpec {
    SystemOnly,
    Combined,
    UserOnly,
    UserAndBreaks,
}

impl MatchSpec {
    /// The bit pattern for this specifier in an encoded selector.
    fn encoding(&self) -> u16 {
        match self {
            MatchSpec::SystemOnly => 1 << 11,
            MatchSpec::UserOnly => 0,
            MatchSpec::UserAndBreaks => 1 << 15,
            MatchSpec::Combined => (1 << 11) | (1 << 15),
        }
    }

    fn from_encoding(bits: u16) -> Result<Self, StreamError> {
        match bits {
            0 => Ok(MatchSpec::UserOnly),
            x if x == 1 << 11 => Ok(MatchSpec::SystemOnly),
            x if x == 1 << 15 => Ok(MatchSpec::UserAndBreaks),
            x if x == (1 << 11) | (1 << 15) => Ok(MatchSpec::Combined),
            other => Err(StreamError::InvalidEncodedSpecifier(other)),
        }
    }

    /// The string form used in `all <spec> <type>s` selectors.  The
    /// user-and-breaks specifier is the unadorned default.
    fn as_str(&self) -> &'static str {
        match self {
            MatchSpec::SystemOnly => "system",
            MatchSpec::Combined => "combined",
            MatchSpec::UserOnly => "user",
            MatchSpec::UserAndBreaks => "",
        }
    }

    fn from_spec_str(s: &str) -> Result<Self, StreamError> {
        match s {
            "system" => Ok(MatchSpec::SystemOnly),
            "combined" => Ok(MatchSpec::Combined),
            "user" => Ok(MatchSpec::UserOnly),
            "" => Ok(MatchSpec::UserAndBreaks),
            other => Err(StreamError::InvalidSpecifier(other.to_string())),
        }
    }
}

/// A pattern matching one stream or a class of streams.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DataStreamSelector {
    pub match_type: StreamType,
    pub match_id: Option<u16>,
    pub match_spec: MatchSpec,
}

impl DataStreamSelector {
    pub fn new(match_type: StreamType, match_id: Option<u16>, match_spec: MatchSpec) -> Self {
        DataStreamSelector {
            match_type,
            match_id,
            match_spec,
        }
    }

    /// Build a singular selector matching exactly the given stream.
    pub fn from_stream(stream: &DataStream) -> Self {
        let match_spec = if stream.system {
            MatchSpec::SystemOnly
        } else {
            MatchSpec::UserOnly
        };

        DataStreamSelector {
            match_type: stream.stream_type,
            match_id: Some(stream.stream_number),
            match_spec,
        }
    }

    /// Whether this selector matches exactly one stream.
    pub fn singular(&self) -> bool {
        self.match_id.is_some()
    }

    /// Whether this selects a root input stream.
    pub fn input(&self) -> bool {
        self.match_type == StreamType::Input
    }

    /// Whether this selects a constant stream, which can never be exhausted.
    pub fn inexhaustible(&self) -> bool {
        self.match_type == StreamType::Constant
    }

    /// Whether matched streams are persisted to a ring buffer.
    pub fn buffered(&self) -> bool {
        matches!(self.match_type, StreamType::Buffered | StreamType::Output)
    }

    pub fn output(&self) -> bool {
        self.match_type == StreamType::Output
    }

    /// Convert a singular selector into the concrete stream it matches.
    pub fn as_stream(&self) -> Result<DataStream, StreamError> {
        let number = self
            .match_id
            .ok_or_else(|| StreamError::NotSingular(self.to_string()))?;

        DataStream::new(
            self.match_type,
            number,
            self.match_spec == MatchSpec::SystemOnly,
        )
    }

    /// Check if this selector matches the given stream.
    pub fn matches(&self, stream: &DataStream) -> bool {
        if self.match_type != stream.stream_type {
            return false;
        }

        if let Some(id) = self.match_id {
            return id == stream.stream_number;
        }

        match self.match_spec {
            MatchSpec::UserOnly => !stream.system,
            MatchSpec::SystemOnly => stream.system,
            MatchSpec::UserAndBreaks => !stream.system || stream.is_break(),
            MatchSpec::Combined => true,
        }
    }

    /// Pack this selector into its 16-bit wire form.
    pub fn encode(&self) -> u16 {
        let id = self.match_id.unwrap_or(MATCH_ALL_CODE);
        ((self.match_type as u16) << 12) | self.match_spec.encoding() | id
    }

    /// Decode a selector from its 16-bit wire form.
    pub fn decode(encoded: u16) -> Result<Self, StreamError> {
        let match_spec = MatchSpec::from_encoding(encoded & ((1 << 11) | (1 << 15)))?;
        let match_type = StreamType::from_encoded((encoded >> 12) & 0b111)?;
        let id = encoded & MAX_STREAM_NUMBER;

        let match_id = if id == MATCH_ALL_CODE { None } else { Some(id) };

        Ok(DataStreamSelector {
            match_type,
            match_id,
            match_spec,
        })
    }
}

impl fmt::Display for DataStreamSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.match_id {
            Some(id) => {
                if self.match_spec == MatchSpec::SystemOnly {
                    write!(f, "system {} {}", self.match_type, id)
                } else {
                    write!(f, "{} {}", self.match_type, id)
                }
            }
            None => {
                let spec = self.match_spec.as_str();
                let space = if spec.is_empty() { "" } else { " " };

                // `buffered` is not pluralized in the wildcard form
                if self.match_type == StreamType::Buffered {
                    write!(f, "all {}{}{}", spec, space, self.match_type)
                } else {
                    write!(f, "all {}{}{}s", spec, space, self.match_type)
                }
            }
        }
    }
}

impl FromStr for DataStreamSelector {
    type Err = StreamError;

    /// Parse either `all [spec] <type>s` or a concrete stream designator.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split_whitespace().collect();

        if parts.first() == Some(&"all") {
            let (spec_str, type_str) = match parts.as_slice() {
                ["all", type_str] => ("", *type_str),
                ["all", spec, type_str] => (*spec, *type_str),
                _ => return Err(StreamError::Malformed(s.to_string())),
            };

            let type_str = type_str.strip_suffix('s').unwrap_or(type_str);
            let match_type = type_str.parse::<StreamType>()?;
            let match_spec = MatchSpec::from_spec_str(spec_str)?;

            return Ok(DataStreamSelector::new(match_type, None, match_spec));
        }

        let stream = s.parse::<DataStream>()?;
        Ok(DataStreamSelector::from_stream(&stream))
    }
}

impl Serialize for DataStreamSelector {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for DataStreamSelector {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(D::Error::custom)
    }
}

#[cfg(test)]
#[path = "selector_tests.rs"]
mod tests;
