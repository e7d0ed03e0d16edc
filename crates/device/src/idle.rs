// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Idleness tracking.
//!
//! The loop is idle when the RPC queue is empty, every registered work
//! queue is empty, and every registered event is set.  Queues and events
//! created without the register flag do not affect idleness.
//!
//! External threads block on a condvar that is poked after every change
//! to an idleness source.

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex as StdMutex, Weak};
use std::time::{Duration, Instant};
use tokio::sync::Notify;

/// One source that must be quiet for the loop to be idle.
enum IdleSource {
    /// Idle when the counter reads zero.
    Counter(Weak<AtomicUsize>),
    /// Idle when the flag is set.
    Flag(Weak<AtomicBool>),
}

/// Tracks every registered idleness source.
pub struct IdleTracker {
    sources: Mutex<Vec<IdleSource>>,
    gate: StdMutex<()>,
    cond: Condvar,
}

impl IdleTracker {
    pub fn new() -> Arc<Self> {
        Arc::new(IdleTracker {
            sources: Mutex::new(Vec::new()),
            gate: StdMutex::new(()),
            cond: Condvar::new(),
        })
    }

    pub fn register_counter(&self, counter: &Arc<AtomicUsize>) {
        self.sources
            .lock()
            .push(IdleSource::Counter(Arc::downgrade(counter)));
    }

    pub fn register_flag(&self, flag: &Arc<AtomicBool>) {
        self.sources
            .lock()
            .push(IdleSource::Flag(Arc::downgrade(flag)));
    }

    /// Wake any thread blocked in [`wait_idle`] to re-check.
    ///
    /// [`wait_idle`]: IdleTracker::wait_idle
    pub fn poke(&self) {
        let _gate = self.gate.lock();
        self.cond.notify_all();
    }

    /// Whether every live source is quiet.  Dropped sources are pruned.
    pub fn is_idle(&self) -> bool {
        let mut sources = self.sources.lock();
        let mut idle = true;

        sources.retain(|source| match source {
            IdleSource::Counter(weak) => match weak.upgrade() {
                Some(counter) => {
                    if counter.load(Ordering::SeqCst) != 0 {
                        idle = false;
                    }
                    true
                }
                None => false,
            },
            IdleSource::Flag(weak) => match weak.upgrade() {
                Some(flag) => {
                    if !flag.load(Ordering::SeqCst) {
                        idle = false;
                    }
                    true
                }
                None => false,
            },
        });

        idle
    }

    /// Block until every source is quiet or the timeout expires.
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;

        let mut gate = match self.gate.lock() {
            Ok(gate) => gate,
            Err(poisoned) => poisoned.into_inner(),
        };

        loop {
            if self.is_idle() {
                return true;
            }

            let now = Instant::now();
            if now >= deadline {
                return false;
            }

            let (next, result) = match self.cond.wait_timeout(gate, deadline - now) {
                Ok(pair) => pair,
                Err(poisoned) => {
                    let pair = poisoned.into_inner();
                    (pair.0, pair.1)
                }
            };
            gate = next;

            if result.timed_out() && !self.is_idle() {
                return false;
            }
        }
    }
}

/// An event owned by the emulation loop.
///
/// Registered events hold the loop non-idle until they are set.
#[derive(Clone)]
pub struct LoopEvent {
    flag: Arc<AtomicBool>,
    notify: Arc<Notify>,
    tracker: Arc<IdleTracker>,
}

impl LoopEvent {
    pub(crate) fn new(tracker: Arc<IdleTracker>, register: bool) -> Self {
        let flag = Arc::new(AtomicBool::new(false));
        if register {
            tracker.register_flag(&flag);
        }

        LoopEvent {
            flag,
            notify: Arc::new(Notify::new()),
            tracker,
        }
    }

    pub fn set(&self) {
        self.flag.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
        self.tracker.poke();
    }

    pub fn clear(&self) {
        self.flag.store(false, Ordering::SeqCst);
        self.tracker.poke();
    }

    pub fn is_set(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Wait until the event is set.  Returns immediately if already set.
    pub async fn wait(&self) {
        loop {
            if self.is_set() {
                return;
            }

            let notified = self.notify.notified();
            if self.is_set() {
                return;
            }
            notified.await;
        }
    }
}

/// A work queue owned by the emulation loop.
///
/// Consumers must call [`task_done`] once per received item; registered
/// queues hold the loop non-idle while items are queued or being worked.
///
/// [`task_done`]: WorkQueue::task_done
pub struct WorkQueue<T> {
    items: Mutex<VecDeque<T>>,
    depth: Arc<AtomicUsize>,
    notify: Notify,
    tracker: Arc<IdleTracker>,
}

impl<T> WorkQueue<T> {
    pub(crate) fn new(tracker: Arc<IdleTracker>, register: bool) -> Arc<Self> {
        let depth = Arc::new(AtomicUsize::new(0));
        if register {
            tracker.register_counter(&depth);
        }

        Arc::new(WorkQueue {
            items: Mutex::new(VecDeque::new()),
            depth,
            notify: Notify::new(),
            tracker,
        })
    }

    /// Queue an item.  Never blocks.
    pub fn push(&self, item: T) {
        self.depth.fetch_add(1, Ordering::SeqCst);
        self.items.lock().push_back(item);
        self.notify.notify_one();
        self.tracker.poke();
    }

    /// Receive the next item, waiting if the queue is empty.
    pub async fn recv(&self) -> T {
        loop {
            if let Some(item) = self.items.lock().pop_front() {
                return item;
            }

            let notified = self.notify.notified();
            if !self.items.lock().is_empty() {
                continue;
            }
            notified.await;
        }
    }

    /// Mark one previously received item as fully processed.
    pub fn task_done(&self) {
        self.depth.fetch_sub(1, Ordering::SeqCst);
        self.tracker.poke();
    }
}

#[cfg(test)]
#[path = "idle_tests.rs"]
mod tests;
