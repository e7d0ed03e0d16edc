// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! tb-core: Core types for the TileBus device emulator

pub mod errors;
pub mod model;
pub mod reading;
pub mod rpcs;
pub mod selector;
pub mod slot;
pub mod stream;
pub mod streams;
pub mod wire;

pub use errors::{pack_error, unpack_error, ErrorCode, PackedError, Subsystem, NO_ERROR};
pub use model::DeviceModel;
pub use reading::Reading;
pub use rpcs::RpcDeclaration;
pub use selector::{DataStreamSelector, MatchSpec};
pub use slot::SlotId;
pub use stream::{DataStream, StreamError, StreamType};
pub use wire::{Packer, Unpacker, WireError, MAX_RPC_PAYLOAD};
