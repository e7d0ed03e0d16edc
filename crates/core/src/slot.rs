// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Slot identifiers for addressing tiles on the bus.
//!
//! The controller occupies address 8; peripheral tiles occupy
//! `10 + slot` for slots 1 through 31.

use crate::stream::parse_int;
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Address of the controller tile on the bus.
pub const CONTROLLER_ADDRESS: u8 = 8;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SlotError {
    #[error("illegal slot identifier: {0}")]
    Malformed(String),
    #[error("slot number out of range: {0}")]
    OutOfRange(u32),
    #[error("address does not correspond to a slot: {0}")]
    UnknownAddress(u8),
}

/// A physical tile location: the controller or one of 31 peripheral slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SlotId {
    Controller,
    Slot(u8),
}

impl SlotId {
    pub fn slot(number: u8) -> Result<Self, SlotError> {
        if number < 1 || number > 31 {
            return Err(SlotError::OutOfRange(number as u32));
        }

        Ok(SlotId::Slot(number))
    }

    /// The bus address for this slot.
    pub fn address(&self) -> u8 {
        match self {
            SlotId::Controller => CONTROLLER_ADDRESS,
            SlotId::Slot(n) => 10 + n,
        }
    }

    /// Recover the slot from a bus address.
    pub fn from_address(address: u8) -> Result<Self, SlotError> {
        match address {
            CONTROLLER_ADDRESS => Ok(SlotId::Controller),
            11..=41 => Ok(SlotId::Slot(address - 10)),
            other => Err(SlotError::UnknownAddress(other)),
        }
    }

    pub fn is_controller(&self) -> bool {
        matches!(self, SlotId::Controller)
    }

    /// Whether a config entry targeting this slot applies to the tile at
    /// the given address.
    pub fn matches_address(&self, address: u8) -> bool {
        self.address() == address
    }
}

impl fmt::Display for SlotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SlotId::Controller => f.write_str("controller"),
            SlotId::Slot(n) => write!(f, "slot {}", n),
        }
    }
}

impl FromStr for SlotId {
    type Err = SlotError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "controller" {
            return Ok(SlotId::Controller);
        }

        let parts: Vec<&str> = s.split_whitespace().collect();
        match parts.as_slice() {
            ["slot", number] => {
                let n = parse_int(number).ok_or_else(|| SlotError::Malformed(s.to_string()))?;
                if n < 1 || n > 31 {
                    return Err(SlotError::OutOfRange(n));
                }
                Ok(SlotId::Slot(n as u8))
            }
            _ => Err(SlotError::Malformed(s.to_string())),
        }
    }
}

impl Serialize for SlotId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for SlotId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(D::Error::custom)
    }
}

#[cfg(test)]
#[path = "slot_tests.rs"]
mod tests;
