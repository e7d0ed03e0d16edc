// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! The RPC queue and its dispatcher.
//!
//! A single dispatcher task drains the queue one item at a time, so RPCs
//! to the same tile complete in submission order.  A handler may defer
//! its response: the responder parks in a pending table keyed by
//! `(address, rpc_id)` and the queue advances, which is the only way RPCs
//! on different tiles interleave.

use crate::error::RpcError;
use crate::idle::IdleTracker;
use crate::response::{Responder, RpcResult};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// What a tile's RPC handler produced.
#[derive(Debug)]
pub enum RpcOutcome {
    /// Synchronous success: the response payload.
    Reply(Vec<u8>),
    /// The response will arrive later via `finish_async_rpc`.
    Deferred,
}

/// Dispatch target for queued RPCs, implemented by the device over its
/// tile table.
pub trait RpcHandler: Send {
    fn dispatch(
        &mut self,
        address: u8,
        rpc_id: u16,
        payload: &[u8],
    ) -> Result<RpcOutcome, RpcError>;
}

/// One queued unit of work.
pub enum WorkItem {
    Rpc {
        address: u8,
        rpc_id: u16,
        payload: Vec<u8>,
        responder: Responder,
    },
    /// An arbitrary closure run in dispatch order, serialized with RPCs.
    Call {
        func: Box<dyn FnOnce() -> RpcResult + Send>,
        responder: Responder,
    },
}

/// Shared bookkeeping between the dispatcher task and the loop handle.
pub(crate) struct RpcQueueState {
    /// Responders for RPCs that chose to answer asynchronously.
    pending: Mutex<HashMap<u8, HashMap<u16, Responder>>>,
    /// The `(address, rpc_id)` currently being dispatched.
    current: Mutex<Option<(u8, u16)>>,
    /// Queued plus in-flight work, including parked async RPCs.
    depth: Arc<AtomicUsize>,
    tracker: Arc<IdleTracker>,
}

impl RpcQueueState {
    pub fn new(tracker: Arc<IdleTracker>) -> Arc<Self> {
        let depth = Arc::new(AtomicUsize::new(0));
        tracker.register_counter(&depth);

        Arc::new(RpcQueueState {
            pending: Mutex::new(HashMap::new()),
            current: Mutex::new(None),
            depth,
            tracker,
        })
    }

    /// Record one queued work item.
    pub fn enqueued(&self) {
        self.depth.fetch_add(1, Ordering::SeqCst);
        self.tracker.poke();
    }

    /// Record one fully completed work item.
    fn task_done(&self) {
        self.depth.fetch_sub(1, Ordering::SeqCst);
        self.tracker.poke();
    }

    /// Undo [`enqueued`] for an item that never reached the queue.
    ///
    /// [`enqueued`]: RpcQueueState::enqueued
    pub fn abandon(&self) {
        self.task_done();
    }

    /// Whether any async RPC is pending on the given tile.
    pub fn is_pending(&self, address: u8) -> bool {
        self.pending
            .lock()
            .get(&address)
            .map(|table| !table.is_empty())
            .unwrap_or(false)
    }

    /// The RPC currently being dispatched, for handlers that defer.
    pub fn current_rpc(&self) -> Option<(u8, u16)> {
        *self.current.lock()
    }

    fn park(&self, address: u8, rpc_id: u16, responder: Responder) {
        debug!(address, rpc_id, "parking async rpc");
        self.pending
            .lock()
            .entry(address)
            .or_default()
            .insert(rpc_id, responder);
    }

    /// Complete a previously parked async RPC.
    pub fn finish_async(
        &self,
        address: u8,
        rpc_id: u16,
        result: RpcResult,
    ) -> Result<(), RpcError> {
        let responder = {
            let mut pending = self.pending.lock();
            let table = pending.get_mut(&address).ok_or_else(|| {
                RpcError::InvalidArgument(format!("no async rpc in progress on tile {}", address))
            })?;
            table.remove(&rpc_id).ok_or_else(|| {
                RpcError::InvalidArgument(format!(
                    "rpc {:#06x} is not running asynchronously on tile {}",
                    rpc_id, address
                ))
            })?
        };

        responder.complete(result);
        self.task_done();
        Ok(())
    }

    /// Drop every parked responder, failing their callers.
    pub fn drain_pending(&self) {
        let mut pending = self.pending.lock();
        for (_, table) in pending.drain() {
            for (_, responder) in table {
                responder.complete(Err(RpcError::NotRunning));
                self.task_done();
            }
        }
    }
}

/// Drain the queue until the channel closes.
pub(crate) async fn dispatch_task(
    mut rx: mpsc::UnboundedReceiver<WorkItem>,
    state: Arc<RpcQueueState>,
    handler: Arc<Mutex<dyn RpcHandler>>,
) {
    debug!("rpc dispatch task starting");

    while let Some(item) = rx.recv().await {
        match item {
            WorkItem::Call { func, responder } => {
                responder.complete(func());
                state.task_done();
            }
            WorkItem::Rpc {
                address,
                rpc_id,
                payload,
                responder,
            } => {
                if state.is_pending(address) {
                    responder.complete(Err(RpcError::Busy(address)));
                    state.task_done();
                    continue;
                }

                *state.current.lock() = Some((address, rpc_id));
                let result = handler.lock().dispatch(address, rpc_id, &payload);
                *state.current.lock() = None;

                match result {
                    Ok(RpcOutcome::Reply(bytes)) => {
                        responder.complete(Ok(bytes));
                        state.task_done();
                    }
                    Ok(RpcOutcome::Deferred) => {
                        state.park(address, rpc_id, responder);
                    }
                    Err(err) => {
                        warn!(
                            address,
                            rpc_id,
                            error = %err,
                            "rpc failed"
                        );
                        responder.complete(Err(err));
                        state.task_done();
                    }
                }
            }
        }

        // Yield so background tasks woken by this rpc run before the next
        // queue item is dispatched
        tokio::task::yield_now().await;
    }

    debug!("rpc dispatch task exiting");
}
