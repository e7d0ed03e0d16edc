// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use yare::parameterized;

#[parameterized(
    controller = { "controller", SlotId::Controller, 8 },
    slot_one = { "slot 1", SlotId::Slot(1), 11 },
    slot_hex = { "slot 0x1f", SlotId::Slot(31), 41 },
)]
fn parses_and_addresses(input: &str, expected: SlotId, address: u8) {
    let slot: SlotId = input.parse().unwrap();
    assert_eq!(slot, expected);
    assert_eq!(slot.address(), address);
}

#[parameterized(
    empty = { "" },
    zero = { "slot 0" },
    too_big = { "slot 32" },
    garbage = { "slot x" },
    extra = { "slot 1 2" },
)]
fn rejects_bad_slots(input: &str) {
    assert!(input.parse::<SlotId>().is_err());
}

#[test]
fn address_round_trips() {
    for slot in [SlotId::Controller, SlotId::Slot(1), SlotId::Slot(31)] {
        assert_eq!(SlotId::from_address(slot.address()).unwrap(), slot);
    }
}

#[test]
fn unknown_addresses_are_rejected() {
    assert!(SlotId::from_address(0).is_err());
    assert!(SlotId::from_address(9).is_err());
    assert!(SlotId::from_address(10).is_err());
    assert!(SlotId::from_address(42).is_err());
}

#[test]
fn display_round_trips() {
    for slot in [SlotId::Controller, SlotId::Slot(7)] {
        assert_eq!(slot.to_string().parse::<SlotId>().unwrap(), slot);
    }
}

#[test]
fn matches_address_compares_bus_position() {
    assert!(SlotId::Controller.matches_address(8));
    assert!(SlotId::Slot(1).matches_address(11));
    assert!(!SlotId::Slot(1).matches_address(12));
}
