//! Behavioral specifications for the tilebus emulator.
//!
//! These tests are black-box: they build a device, drive it through the
//! thread-safe external boundary (`rpc` / `wait_idle`) and verify the
//! observable results.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

#[path = "specs/prelude.rs"]
mod prelude;

// rpc/
#[path = "specs/rpc/async_echo.rs"]
mod rpc_async_echo;
#[path = "specs/rpc/sync_echo.rs"]
mod rpc_sync_echo;

// device/
#[path = "specs/device/config_boot.rs"]
mod device_config_boot;
#[path = "specs/device/reset.rs"]
mod device_reset;
#[path = "specs/device/snapshot.rs"]
mod device_snapshot;

// graph/
#[path = "specs/graph/copy_latest.rs"]
mod graph_copy_latest;
#[path = "specs/graph/streamer_packaging.rs"]
mod graph_streamer_packaging;

// storage/
#[path = "specs/storage/rollover.rs"]
mod storage_rollover;
