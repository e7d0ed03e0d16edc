// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use serde_json::json;
use std::fs;

#[test]
fn save_load_round_trips() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("state.snapshot");

    let snapshot = Snapshot::new(json!({"next_id": 7, "tiles": {"11": {"counter": 3}}}));
    snapshot.save(&path).unwrap();

    let loaded = Snapshot::load(&path).unwrap().unwrap();
    assert_eq!(loaded.state, snapshot.state);
    assert_eq!(loaded.created_at, snapshot.created_at);
}

#[test]
fn save_is_atomic() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("state.snapshot");

    Snapshot::new(json!({"v": 1})).save(&path).unwrap();
    Snapshot::new(json!({"v": 2})).save(&path).unwrap();

    assert!(!path.with_extension("tmp").exists());
    let loaded = Snapshot::load(&path).unwrap().unwrap();
    assert_eq!(loaded.state, json!({"v": 2}));
}

#[test]
fn missing_file_loads_as_none() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nope.snapshot");
    assert!(Snapshot::load(&path).unwrap().is_none());
}

#[test]
fn corrupt_file_is_moved_to_bak() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("state.snapshot");

    fs::write(&path, b"not zstd at all").unwrap();

    assert!(Snapshot::load(&path).unwrap().is_none());
    assert!(!path.exists());
    assert!(path.with_extension("bak").exists());
}

#[test]
fn file_contents_are_compressed() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("state.snapshot");

    Snapshot::new(json!({"v": 1})).save(&path).unwrap();

    let raw = fs::read(&path).unwrap();
    // zstd magic number
    assert_eq!(&raw[..4], &[0x28, 0xB5, 0x2F, 0xFD]);
}
