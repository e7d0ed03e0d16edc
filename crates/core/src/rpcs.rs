// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Well-known RPC identifiers.
//!
//! Every RPC on the bus is identified by a 16-bit id scoped to the tile
//! address it is sent to.  The declarations here cover the tile lifecycle,
//! config variables, and the controller subsystem surfaces.  Ids at or
//! above 0x8000 are private to individual tiles.

/// A declared RPC: its 16-bit identifier.
///
/// Argument and response payloads are packed explicitly at the call sites
/// with [`crate::wire`] helpers, so the declaration only carries the id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RpcDeclaration {
    pub rpc_id: u16,
}

const fn rpc(rpc_id: u16) -> RpcDeclaration {
    RpcDeclaration { rpc_id }
}

// -- tile lifecycle --

/// Immediately reset the tile.  Never completes normally; callers should
/// expect an atypical response while the tile reboots.
pub const RESET: RpcDeclaration = rpc(1);

/// Get the 10-byte hardware identification string.
pub const HARDWARE_VERSION: RpcDeclaration = rpc(2);

/// Get the tile's 6-byte name and run state flags.
pub const TILE_STATUS: RpcDeclaration = rpc(4);

/// Pass control to application firmware after configuration is complete.
pub const START_APPLICATION: RpcDeclaration = rpc(6);

// -- config variables --

/// List declared config variable ids, 9 at a time from an offset.
pub const LIST_CONFIG_VARIABLES: RpcDeclaration = rpc(10);

/// Describe the type, size and flags of one config variable.
pub const DESCRIBE_CONFIG_VARIABLE: RpcDeclaration = rpc(11);

/// Stream up to 16 bytes into a config variable at an offset.
pub const SET_CONFIG_VARIABLE: RpcDeclaration = rpc(12);

/// Read back a chunk of a config variable.
pub const GET_CONFIG_VARIABLE: RpcDeclaration = rpc(13);

// -- tile manager (controller only) --

/// Peripheral tile check-in, called on boot.  Args: hardware type, api
/// (major, minor), 6-byte name, firmware (major, minor, patch), executive
/// (major, minor, patch), slot, unique id.  Response: assigned address,
/// run level, debug flag.
pub const REGISTER_TILE: RpcDeclaration = rpc(0x2a00);

pub const COUNT_TILES: RpcDeclaration = rpc(0x2a01);
pub const DESCRIBE_TILE: RpcDeclaration = rpc(0x2a02);

// -- config database (controller only) --

pub const START_CONFIG_VAR_ENTRY: RpcDeclaration = rpc(0x2a07);
pub const CONTINUE_CONFIG_VAR_ENTRY: RpcDeclaration = rpc(0x2a08);
pub const END_CONFIG_VAR_ENTRY: RpcDeclaration = rpc(0x2a09);
pub const GET_CONFIG_DATABASE_INFO: RpcDeclaration = rpc(0x2a0a);
pub const COUNT_CONFIG_VAR_ENTRIES: RpcDeclaration = rpc(0x2a0b);
pub const INVALIDATE_CONFIG_VAR_ENTRY: RpcDeclaration = rpc(0x2a0d);
pub const COMPACT_CONFIG_DATABASE: RpcDeclaration = rpc(0x2a0e);
pub const CLEAR_CONFIG_VAR_ENTRIES: RpcDeclaration = rpc(0x2a0f);

// -- clock manager (controller only) --

/// Get the current device time.  Arg: 1 to prefer UTC, 0 for uptime.
pub const GET_CURRENT_TIME: RpcDeclaration = rpc(0x1001);

/// Set the device's UTC time offset.
pub const SET_CURRENT_TIME: RpcDeclaration = rpc(0x1002);

/// Get the controller UUID and os/app tags.
pub const CONTROLLER_INFO: RpcDeclaration = rpc(0x1008);

// -- sensor log (controller only) --

pub const RSL_PUSH_READING: RpcDeclaration = rpc(0x2000);
pub const RSL_PUSH_MANY_READINGS: RpcDeclaration = rpc(0x2001);
pub const RSL_COUNT_READINGS: RpcDeclaration = rpc(0x2002);
pub const RSL_CLEAR_READINGS: RpcDeclaration = rpc(0x2003);
pub const RSL_INSPECT_VIRTUAL_STREAM: RpcDeclaration = rpc(0x2006);
pub const RSL_HIGHEST_READING_ID: RpcDeclaration = rpc(0x2007);

// -- sensor graph (controller only) --
//
// Nodes and streamers are larger than one RPC payload; they are loaded
// through the host-side device surface rather than the bus.

pub const SG_TRIGGER_STREAMER: RpcDeclaration = rpc(0x2012);
pub const SG_SET_ONLINE: RpcDeclaration = rpc(0x2013);
pub const SG_GRAPH_INPUT: RpcDeclaration = rpc(0x2014);
pub const SG_PERSIST_GRAPH: RpcDeclaration = rpc(0x2015);
pub const SG_RESET_GRAPH: RpcDeclaration = rpc(0x2016);
pub const SG_COUNT_NODES: RpcDeclaration = rpc(0x2017);

// -- remote bridge (controller only) --

pub const BEGIN_SCRIPT: RpcDeclaration = rpc(0x2100);
pub const PUSH_SCRIPT_CHUNK: RpcDeclaration = rpc(0x2101);
pub const END_SCRIPT: RpcDeclaration = rpc(0x2102);
pub const TRIGGER_SCRIPT: RpcDeclaration = rpc(0x2103);
pub const QUERY_SCRIPT_STATUS: RpcDeclaration = rpc(0x2104);
pub const RESET_SCRIPT: RpcDeclaration = rpc(0x2105);

// -- controller config variable ids --

/// Period of the user tick in seconds; 0 disables it.
pub const CONFIG_USER_TICK_SECS: u16 = 0x2000;

/// Fill-stop flag for the storage ring buffer.
pub const CONFIG_STORAGE_FILLSTOP: u16 = 0x2004;

/// Fill-stop flag for the streaming ring buffer.
pub const CONFIG_STREAMING_FILLSTOP: u16 = 0x2005;
