//! Scenario: rollover notification.
//!
//! Storage capacity 8, erase block 4.  Two walkers on the same selector
//! whose cursors sit at offsets 0 and 2 when twelve readings arrive:
//! the erase block pulls both cursors to the erase boundary and adjusts
//! their available counts, and the first walker's next pop is reading 5.

use tb_core::{DataStream, DataStreamSelector, DeviceModel, Reading};
use tb_storage::SensorLog;

fn push(log: &mut SensorLog, stream: &DataStream, value: i32) {
    log.push(stream, Reading::new(stream.encode(), 0, value))
        .unwrap();
}

#[test]
fn rollover_adjusts_both_walkers() {
    let mut log = SensorLog::new(DeviceModel::with_buffers(8, 8, 4));
    let stream: DataStream = "buffered 1".parse().unwrap();
    let selector: DataStreamSelector = "buffered 1".parse().unwrap();

    let walker_a = log.create_walker(selector, true).unwrap();

    push(&mut log, &stream, 1);
    push(&mut log, &stream, 2);

    // Walker B joins at the tail: its cursor is at offset 2
    let walker_b = log.create_walker(selector, true).unwrap();

    for value in 3..=12 {
        push(&mut log, &stream, value);
    }

    assert_eq!(walker_a.lock().count(), 8);
    assert_eq!(walker_b.lock().count(), 6);

    // Readings 1-4 were erased; the next pop on A is reading 5
    assert_eq!(walker_a.lock().pop().unwrap().value, 5);

    // Reading ids survived the rollover untouched
    assert_eq!(walker_a.lock().pop().unwrap().reading_id, Some(6));
}

#[test]
fn fill_stop_mode_rejects_the_thirteenth_reading() {
    let mut log = SensorLog::new(DeviceModel::with_buffers(8, 8, 4));
    log.set_rollover(tb_storage::BufferKind::Storage, false);
    let stream: DataStream = "buffered 1".parse().unwrap();

    for value in 1..=8 {
        push(&mut log, &stream, value);
    }

    let result = log.push(&stream, Reading::new(stream.encode(), 0, 9));
    assert!(matches!(result, Err(tb_storage::StorageError::RingBufferFull)));
}

#[test]
fn reading_ids_stay_monotonic_across_rollover_and_clear() {
    let mut log = SensorLog::new(DeviceModel::with_buffers(4, 4, 2));
    let storage: DataStream = "buffered 1".parse().unwrap();
    let output: DataStream = "output 1".parse().unwrap();

    let mut last_id = 0;
    for value in 0..10 {
        let target = if value % 2 == 0 { &storage } else { &output };
        push(&mut log, target, value);

        let id = log.highest_allocated_id();
        assert!(id > last_id, "ids must increase across both buffers");
        last_id = id;
    }

    log.clear(77).unwrap();
    push(&mut log, &storage, 0);
    assert!(log.highest_allocated_id() > last_id, "clear never reuses ids");
}
