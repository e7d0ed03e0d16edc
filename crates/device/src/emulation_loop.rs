// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! The emulation loop: one thread that owns all device state.
//!
//! Every mutation of tile or engine state happens on the emulation
//! thread, inside a current-thread tokio runtime.  External callers
//! interact through two primitives: `call_rpc_external`, which marshals
//! an RPC onto the loop and blocks for its response, and `wait_idle`,
//! which blocks until every registered work source is quiet.
//!
//! Background tasks are registered under a tile address so a tile reset
//! can cancel exactly its own work; device-wide tasks use `None` and are
//! cancelled first at shutdown, followed by per-tile tasks in descending
//! address order.

use crate::error::RpcError;
use crate::idle::{IdleTracker, LoopEvent, WorkQueue};
use crate::response::{Responder, RpcResult};
use crate::rpc_queue::{dispatch_task, RpcHandler, RpcQueueState, WorkItem};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use std::thread::{self, ThreadId};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info};

/// Default timeout for RPCs sent from inside the loop.
pub const INTERNAL_RPC_TIMEOUT: Duration = Duration::from_secs(1);

struct LoopInner {
    rpc_tx: mpsc::UnboundedSender<WorkItem>,
    queue_state: Arc<RpcQueueState>,
    tracker: Arc<IdleTracker>,
    tasks: Mutex<HashMap<Option<u8>, Vec<tokio::task::JoinHandle<()>>>>,
    thread_id: OnceLock<ThreadId>,
    runtime: OnceLock<tokio::runtime::Handle>,
    running: AtomicBool,
}

/// Cheap cloneable handle to the emulation loop, held by every tile and
/// subsystem that needs to send RPCs or spawn tasks.
#[derive(Clone)]
pub struct LoopHandle {
    inner: Arc<LoopInner>,
}

impl LoopHandle {
    /// Whether the current thread is the emulation thread.
    pub fn on_emulation_thread(&self) -> bool {
        self.inner.thread_id.get() == Some(&thread::current().id())
    }

    fn verify_thread(&self, should_be_loop: bool, what: &'static str) -> Result<(), RpcError> {
        if self.on_emulation_thread() == should_be_loop {
            return Ok(());
        }

        Err(RpcError::WrongThread(what))
    }

    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::SeqCst)
    }

    /// Create an event; registered events must be set for the loop to be
    /// considered idle.
    pub fn create_event(&self, register: bool) -> LoopEvent {
        LoopEvent::new(self.inner.tracker.clone(), register)
    }

    /// Create a work queue; registered queues must drain for the loop to
    /// be considered idle.
    pub fn create_queue<T>(&self, register: bool) -> Arc<WorkQueue<T>> {
        WorkQueue::new(self.inner.tracker.clone(), register)
    }

    /// Register a background task under a tile address, or `None` for a
    /// device-wide task.
    pub fn add_task(
        &self,
        address: Option<u8>,
        future: impl Future<Output = ()> + Send + 'static,
    ) -> Result<(), RpcError> {
        let runtime = self.inner.runtime.get().ok_or(RpcError::NotRunning)?;
        let handle = runtime.spawn(future);
        self.inner.tasks.lock().entry(address).or_default().push(handle);
        Ok(())
    }

    /// Cancel all tasks registered to a tile and wait for them to stop.
    ///
    /// Must be called from inside the loop.
    pub async fn stop_tasks(&self, address: u8) -> Result<(), RpcError> {
        self.verify_thread(true, "stop_tasks must run on the emulation thread")?;

        let handles = self
            .inner
            .tasks
            .lock()
            .remove(&Some(address))
            .unwrap_or_default();

        for handle in &handles {
            handle.abort();
        }
        for handle in handles {
            let _ = handle.await;
        }

        Ok(())
    }

    /// Call an RPC from outside the loop, blocking until it finishes.
    pub fn call_rpc_external(
        &self,
        address: u8,
        rpc_id: u16,
        payload: &[u8],
        timeout: Duration,
    ) -> Result<Vec<u8>, RpcError> {
        self.verify_thread(false, "call_rpc_external is for use outside the loop")?;
        if !self.is_running() {
            return Err(RpcError::NotRunning);
        }

        let (tx, rx) = std::sync::mpsc::sync_channel(1);
        self.enqueue(WorkItem::Rpc {
            address,
            rpc_id,
            payload: payload.to_vec(),
            responder: Responder::External(tx),
        })?;

        match rx.recv_timeout(timeout) {
            Ok(result) => result,
            Err(std::sync::mpsc::RecvTimeoutError::Timeout) => Err(RpcError::Timeout),
            Err(std::sync::mpsc::RecvTimeoutError::Disconnected) => Err(RpcError::NotRunning),
        }
    }

    /// Run a closure on the loop in dispatch order, blocking for its
    /// result.  Used by external test and scenario surfaces that need to
    /// mutate device state without a corresponding RPC.
    pub fn call_external(
        &self,
        func: impl FnOnce() -> RpcResult + Send + 'static,
        timeout: Duration,
    ) -> Result<Vec<u8>, RpcError> {
        self.verify_thread(false, "call_external is for use outside the loop")?;
        if !self.is_running() {
            return Err(RpcError::NotRunning);
        }

        let (tx, rx) = std::sync::mpsc::sync_channel(1);
        self.enqueue(WorkItem::Call {
            func: Box::new(func),
            responder: Responder::External(tx),
        })?;

        match rx.recv_timeout(timeout) {
            Ok(result) => result,
            Err(std::sync::mpsc::RecvTimeoutError::Timeout) => Err(RpcError::Timeout),
            Err(std::sync::mpsc::RecvTimeoutError::Disconnected) => Err(RpcError::NotRunning),
        }
    }

    /// Send an RPC from a task inside the loop and await its response.
    pub async fn await_rpc(
        &self,
        address: u8,
        rpc_id: u16,
        payload: Vec<u8>,
    ) -> Result<Vec<u8>, RpcError> {
        self.verify_thread(true, "await_rpc must be called from inside the loop")?;

        let (tx, rx) = oneshot::channel();
        self.enqueue(WorkItem::Rpc {
            address,
            rpc_id,
            payload,
            responder: Responder::Internal(tx),
        })?;

        match tokio::time::timeout(INTERNAL_RPC_TIMEOUT, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(RpcError::NotRunning),
            Err(_) => Err(RpcError::Timeout),
        }
    }

    /// Complete a previously deferred RPC.  Only callable from inside
    /// the loop.
    pub fn finish_async_rpc(
        &self,
        address: u8,
        rpc_id: u16,
        result: RpcResult,
    ) -> Result<(), RpcError> {
        self.verify_thread(true, "async rpcs must be finished from inside the loop")?;
        self.inner.queue_state.finish_async(address, rpc_id, result)
    }

    /// The `(address, rpc_id)` currently being dispatched, for handlers
    /// that want to defer their response.
    pub fn current_rpc(&self) -> Option<(u8, u16)> {
        self.inner.queue_state.current_rpc()
    }

    /// Whether a deferred RPC is pending on the given tile.
    pub fn is_tile_busy(&self, address: u8) -> bool {
        self.inner.queue_state.is_pending(address)
    }

    /// Block until the loop is idle: RPC queue empty, registered queues
    /// drained, registered events set.
    pub fn wait_idle(&self, timeout: Duration) -> Result<(), RpcError> {
        self.verify_thread(false, "wait_idle would deadlock the emulation thread")?;

        if self.inner.tracker.wait_idle(timeout) {
            Ok(())
        } else {
            Err(RpcError::Timeout)
        }
    }

    fn enqueue(&self, item: WorkItem) -> Result<(), RpcError> {
        self.inner.queue_state.enqueued();
        self.inner.rpc_tx.send(item).map_err(|_| {
            self.inner.queue_state.abandon();
            RpcError::NotRunning
        })
    }
}

/// The emulation loop itself: owns the background thread.
pub struct EmulationLoop {
    handle: LoopHandle,
    rpc_rx: Option<mpsc::UnboundedReceiver<WorkItem>>,
    shutdown_tx: Option<oneshot::Sender<()>>,
    thread: Option<thread::JoinHandle<()>>,
}

impl EmulationLoop {
    pub fn new() -> Self {
        let (rpc_tx, rpc_rx) = mpsc::unbounded_channel();
        let tracker = IdleTracker::new();
        let queue_state = RpcQueueState::new(tracker.clone());

        let inner = LoopInner {
            rpc_tx,
            queue_state,
            tracker,
            tasks: Mutex::new(HashMap::new()),
            thread_id: OnceLock::new(),
            runtime: OnceLock::new(),
            running: AtomicBool::new(false),
        };

        EmulationLoop {
            handle: LoopHandle {
                inner: Arc::new(inner),
            },
            rpc_rx: Some(rpc_rx),
            shutdown_tx: None,
            thread: None,
        }
    }

    pub fn handle(&self) -> LoopHandle {
        self.handle.clone()
    }

    /// Start the emulation thread with the given RPC dispatch target.
    pub fn start(&mut self, handler: Arc<Mutex<dyn RpcHandler>>) -> Result<(), RpcError> {
        let rpc_rx = self.rpc_rx.take().ok_or_else(|| {
            RpcError::InvalidState("emulation loop started twice".to_string())
        })?;

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let (ready_tx, ready_rx) = std::sync::mpsc::sync_channel::<Result<(), String>>(1);

        let inner = self.handle.inner.clone();
        let thread = thread::Builder::new()
            .name("emulation-loop".to_string())
            .spawn(move || run_loop(inner, rpc_rx, shutdown_rx, handler, ready_tx))
            .map_err(|e| RpcError::Internal(format!("failed to spawn emulation thread: {}", e)))?;

        match ready_rx.recv_timeout(Duration::from_secs(5)) {
            Ok(Ok(())) => {}
            Ok(Err(message)) => return Err(RpcError::Internal(message)),
            Err(_) => return Err(RpcError::Internal("emulation thread did not start".to_string())),
        }

        self.handle.inner.running.store(true, Ordering::SeqCst);
        self.shutdown_tx = Some(shutdown_tx);
        self.thread = Some(thread);

        info!("emulation loop started");
        Ok(())
    }

    /// Stop the loop: cancel all tasks and drain the RPC queue.
    pub fn stop(&mut self) -> Result<(), RpcError> {
        self.handle
            .verify_thread(false, "cannot stop the loop from inside itself")?;

        let Some(shutdown_tx) = self.shutdown_tx.take() else {
            return Ok(());
        };

        self.handle.inner.running.store(false, Ordering::SeqCst);
        let _ = shutdown_tx.send(());

        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                error!("emulation thread panicked during shutdown");
            }
        }

        info!("emulation loop stopped");
        Ok(())
    }
}

impl Default for EmulationLoop {
    fn default() -> Self {
        EmulationLoop::new()
    }
}

impl Drop for EmulationLoop {
    fn drop(&mut self) {
        if self.thread.is_some() && !self.handle.on_emulation_thread() {
            let _ = self.stop();
        }
    }
}

fn run_loop(
    inner: Arc<LoopInner>,
    rpc_rx: mpsc::UnboundedReceiver<WorkItem>,
    shutdown_rx: oneshot::Receiver<()>,
    handler: Arc<Mutex<dyn RpcHandler>>,
    ready_tx: std::sync::mpsc::SyncSender<Result<(), String>>,
) {
    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            let _ = ready_tx.send(Err(format!("failed to build runtime: {}", e)));
            return;
        }
    };

    let _ = inner.thread_id.set(thread::current().id());
    let _ = inner.runtime.set(runtime.handle().clone());
    let _ = ready_tx.send(Ok(()));

    let queue_state = inner.queue_state.clone();
    runtime.block_on(async move {
        let dispatcher = tokio::spawn(dispatch_task(rpc_rx, queue_state, handler));

        let _ = shutdown_rx.await;
        debug!("emulation loop shutting down");

        shutdown_tasks(&inner).await;

        dispatcher.abort();
        let _ = dispatcher.await;

        inner.queue_state.drain_pending();
    });
}

/// Cancel device-wide tasks first, then per-tile tasks in descending
/// address order so dependent subsystems tear down before their bases.
async fn shutdown_tasks(inner: &LoopInner) {
    let mut groups: Vec<(Option<u8>, Vec<tokio::task::JoinHandle<()>>)> =
        inner.tasks.lock().drain().collect();

    groups.sort_by_key(|(group, _)| match group {
        None => (0, 0),
        Some(address) => (1, u8::MAX - address),
    });

    for (group, handles) in groups {
        debug!(group = ?group, count = handles.len(), "cancelling tasks");
        for handle in &handles {
            handle.abort();
        }
        for handle in handles {
            let _ = handle.await;
        }
    }
}

#[cfg(test)]
#[path = "emulation_loop_tests.rs"]
mod tests;
