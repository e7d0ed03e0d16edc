// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use yare::parameterized;

#[parameterized(
    system_tick = { SYSTEM_TICK, "system input 2" },
    user_tick = { USER_TICK, "system input 3" },
    user_connected = { USER_CONNECTED, "system input 1025" },
    user_disconnected = { USER_DISCONNECTED, "system input 1026" },
    system_reset = { SYSTEM_RESET, "system output 1024" },
    data_cleared = { DATA_CLEARED, "system output 1027" },
)]
fn well_known_ids_match_their_designators(encoded: u16, designator: &str) {
    let expected: DataStream = designator.parse().unwrap();
    assert_eq!(encoded, expected.encode());
    assert_eq!(stream(encoded), expected);
}
