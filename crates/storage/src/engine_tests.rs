// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use tb_core::DataStream;

fn model(storage: usize, streaming: usize, erase: usize) -> DeviceModel {
    DeviceModel::with_buffers(storage, streaming, erase)
}

fn buffered(n: u16) -> DataStream {
    format!("buffered {}", n).parse().unwrap()
}

fn output(n: u16) -> DataStream {
    format!("output {}", n).parse().unwrap()
}

fn reading(stream: &DataStream, value: i32) -> Reading {
    Reading::new(stream.encode(), 0, value)
}

#[test]
fn push_routes_by_stream_type() {
    let mut engine = StorageEngine::new(&model(4, 4, 1));

    engine.push(&buffered(1), reading(&buffered(1), 1)).unwrap();
    engine.push(&output(1), reading(&output(1), 2)).unwrap();
    engine.push(&output(1), reading(&output(1), 3)).unwrap();

    assert_eq!(engine.count(), (1, 2));
}

#[test]
fn full_buffer_rejects_push() {
    let mut engine = StorageEngine::new(&model(2, 2, 1));
    let stream = buffered(1);

    engine.push(&stream, reading(&stream, 1)).unwrap();
    engine.push(&stream, reading(&stream, 2)).unwrap();

    assert!(matches!(
        engine.push(&stream, reading(&stream, 3)),
        Err(StorageError::RingBufferFull)
    ));

    // The other buffer is unaffected
    engine.push(&output(1), reading(&output(1), 4)).unwrap();
}

#[test]
fn offsets_are_absolute_across_erases() {
    let mut engine = StorageEngine::new(&model(4, 4, 2));
    let stream = buffered(1);

    for value in 1..=4 {
        engine.push(&stream, reading(&stream, value)).unwrap();
    }

    let erased = engine.popn(BufferKind::Storage, 2);
    assert_eq!(erased.len(), 2);
    assert_eq!(erased[0].value, 1);
    assert_eq!(engine.erased(BufferKind::Storage), 2);

    // Offsets 0 and 1 are gone; offset 2 still addresses the same reading
    assert!(engine.get(BufferKind::Storage, 0).is_none());
    assert_eq!(engine.get(BufferKind::Storage, 2).map(|r| r.value), Some(3));
    assert_eq!(engine.tail(BufferKind::Storage), 4);
}

#[test]
fn popn_is_clamped_to_contents() {
    let mut engine = StorageEngine::new(&model(4, 4, 8));
    let stream = buffered(1);
    engine.push(&stream, reading(&stream, 1)).unwrap();

    assert_eq!(engine.popn(BufferKind::Storage, 8).len(), 1);
    assert_eq!(engine.count(), (0, 0));
}

#[test]
fn highest_stored_id_scans_both_buffers() {
    let mut engine = StorageEngine::new(&model(4, 4, 1));

    let mut r1 = reading(&buffered(1), 1);
    r1.reading_id = Some(5);
    let mut r2 = reading(&output(1), 2);
    r2.reading_id = Some(9);

    engine.push(&buffered(1), r1).unwrap();
    engine.push(&output(1), r2).unwrap();

    assert_eq!(engine.highest_stored_id(), 9);
}

#[test]
fn clear_resets_contents_and_erase_accounting() {
    let mut engine = StorageEngine::new(&model(2, 2, 1));
    let stream = buffered(1);

    engine.push(&stream, reading(&stream, 1)).unwrap();
    engine.push(&stream, reading(&stream, 2)).unwrap();
    engine.popn(BufferKind::Storage, 1);
    engine.clear();

    assert_eq!(engine.count(), (0, 0));
    assert_eq!(engine.erased(BufferKind::Storage), 0);
    assert_eq!(engine.tail(BufferKind::Storage), 0);
}

#[test]
fn dump_restore_round_trips() {
    let mut engine = StorageEngine::new(&model(4, 4, 2));
    let stream = buffered(1);

    for value in 1..=4 {
        engine.push(&stream, reading(&stream, value)).unwrap();
    }
    engine.popn(BufferKind::Storage, 2);

    let state = engine.dump();

    let mut restored = StorageEngine::new(&model(4, 4, 2));
    restored.restore(&state);

    assert_eq!(restored.count(), (2, 0));
    assert_eq!(restored.erased(BufferKind::Storage), 2);
    assert_eq!(restored.get(BufferKind::Storage, 2).map(|r| r.value), Some(3));
}
