// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! tb-device: The cooperative device emulator
//!
//! A device is a controller tile plus zero or more peripheral tiles on a
//! shared bus.  All device state is owned by one emulation thread running
//! a cooperative event loop; external callers inject RPCs through a
//! thread-safe boundary and wait for the device to become idle.

pub mod controller;
mod demo;
mod device;
mod emulation_loop;
mod error;
mod idle;
mod response;
mod rpc_queue;
mod tile;

pub use demo::{DemoDevice, DemoTile};
pub use device::{Device, DeviceSnapshot, ScenarioFn, TileRegistry};
pub use emulation_loop::{EmulationLoop, LoopHandle};
pub use error::{DeviceError, RpcError};
pub use idle::{LoopEvent, WorkQueue};
pub use rpc_queue::{RpcHandler, RpcOutcome};
pub use tile::{ConfigDescriptor, ConfigValue, ConfigValues, PeripheralTile, RunLevel, Tile, TileBase};
