// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! The clock manager: simulated seconds and tick generation.
//!
//! The clock ticks once per simulated second.  Every tenth second it
//! emits the system tick into the sensor graph; a user-configurable tick
//! (period >= 1 s, 0 disables) is emitted on its own schedule.

use crate::tile::ConfigValues;
use serde::{Deserialize, Serialize};
use tb_core::streams;

/// Period of the built-in system tick, in seconds.
pub const SYSTEM_TICK_SECS: u32 = 10;

/// Clock manager state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClockManager {
    /// Seconds since the device booted.
    pub uptime: u32,
    /// Offset applied to uptime when reporting UTC time, if set.
    pub utc_offset: Option<i64>,
    /// User tick period in seconds; 0 disables the user tick.
    pub user_tick_secs: u32,
}

impl ClockManager {
    pub fn new() -> Self {
        ClockManager {
            uptime: 0,
            utc_offset: None,
            user_tick_secs: 0,
        }
    }

    /// Advance one simulated second.  Returns the `(stream, value)`
    /// inputs to feed into the sensor graph for this second.
    pub fn tick(&mut self) -> Vec<(u16, i32)> {
        self.uptime += 1;
        let mut inputs = Vec::new();

        if self.uptime % SYSTEM_TICK_SECS == 0 {
            inputs.push((streams::SYSTEM_TICK, self.uptime as i32));
        }

        if self.user_tick_secs > 0 && self.uptime % self.user_tick_secs == 0 {
            inputs.push((streams::USER_TICK, self.uptime as i32));
        }

        inputs
    }

    /// The current device time: UTC seconds when an offset has been set,
    /// uptime otherwise.
    pub fn get_time(&self, prefer_utc: bool) -> u32 {
        match (prefer_utc, self.utc_offset) {
            (true, Some(offset)) => (self.uptime as i64 + offset) as u32,
            _ => self.uptime,
        }
    }

    pub fn set_utc_time(&mut self, utc_seconds: u32) {
        self.utc_offset = Some(utc_seconds as i64 - self.uptime as i64);
    }

    /// Latch tick configuration from the controller's config variables.
    pub fn clear_to_reset(&mut self, config: &ConfigValues) {
        self.user_tick_secs = config
            .get("user_tick_secs")
            .and_then(|value| value.as_u32())
            .unwrap_or(0);
    }
}

impl Default for ClockManager {
    fn default() -> Self {
        ClockManager::new()
    }
}

#[cfg(test)]
#[path = "clock_manager_tests.rs"]
mod tests;
