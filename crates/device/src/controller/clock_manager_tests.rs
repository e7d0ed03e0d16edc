// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::tile::ConfigValue;
use tb_core::streams;

#[test]
fn system_tick_fires_every_ten_seconds() {
    let mut clock = ClockManager::new();

    let mut ticks = Vec::new();
    for _ in 0..25 {
        ticks.extend(clock.tick());
    }

    let system: Vec<i32> = ticks
        .iter()
        .filter(|(stream, _)| *stream == streams::SYSTEM_TICK)
        .map(|(_, value)| *value)
        .collect();
    assert_eq!(system, vec![10, 20]);
}

#[test]
fn user_tick_follows_configuration() {
    let mut clock = ClockManager::new();

    let mut config = ConfigValues::new();
    config.insert("user_tick_secs".to_string(), ConfigValue::Int(3));
    clock.clear_to_reset(&config);

    let mut user = 0;
    for _ in 0..9 {
        user += clock
            .tick()
            .iter()
            .filter(|(stream, _)| *stream == streams::USER_TICK)
            .count();
    }

    assert_eq!(user, 3);
}

#[test]
fn user_tick_disabled_by_default() {
    let mut clock = ClockManager::new();

    for _ in 0..30 {
        assert!(clock
            .tick()
            .iter()
            .all(|(stream, _)| *stream != streams::USER_TICK));
    }
}

#[test]
fn utc_time_applies_an_offset() {
    let mut clock = ClockManager::new();
    for _ in 0..5 {
        clock.tick();
    }

    assert_eq!(clock.get_time(true), 5, "no offset set yet");

    clock.set_utc_time(1_000_000);
    assert_eq!(clock.get_time(true), 1_000_000);
    assert_eq!(clock.get_time(false), 5);

    clock.tick();
    assert_eq!(clock.get_time(true), 1_000_001);
}
