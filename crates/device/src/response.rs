// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Responders carry an RPC result back to its caller.
//!
//! External callers block on a bounded std channel; callers inside the
//! loop await a oneshot.  Either way the dispatcher completes the
//! responder exactly once, and a responder whose caller has gone away
//! (timed out) absorbs the result silently.

use crate::error::RpcError;
use tokio::sync::oneshot;
use tracing::debug;

pub type RpcResult = Result<Vec<u8>, RpcError>;

/// Completion handle for one queued RPC.
#[derive(Debug)]
pub enum Responder {
    /// Completes a blocking external caller.
    External(std::sync::mpsc::SyncSender<RpcResult>),
    /// Completes an awaiting task inside the loop.
    Internal(oneshot::Sender<RpcResult>),
    /// Fire-and-forget work item.
    Discard,
}

impl Responder {
    /// Deliver the result.  Detached callers are ignored.
    pub fn complete(self, result: RpcResult) {
        match self {
            Responder::External(tx) => {
                if tx.try_send(result).is_err() {
                    debug!("external rpc caller went away before completion");
                }
            }
            Responder::Internal(tx) => {
                if tx.send(result).is_err() {
                    debug!("internal rpc caller went away before completion");
                }
            }
            Responder::Discard => {}
        }
    }
}
