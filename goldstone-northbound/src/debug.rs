//
// Copyright (c) The Goldstone Core Contributors
//
// SPDX-License-Identifier: MIT
//

use goldstone_yang::{Change, DataPath};
use tracing::{debug, debug_span, trace, trace_span};

// Change-handling server debug messages.
#[derive(Debug)]
pub enum Debug<'a> {
    ChangeEventRx(&'a str, u64, usize),
    DoneEventRx(&'a str, u64),
    AbortEventRx(&'a str, u64),
    HandlerCall(&'a str, &'a Change),
    ChangeSkipped(&'a Change),
    Reconcile(&'a str),
    OperDataRequestRx(&'a DataPath, f64),
    RpcRequestRx(&'a DataPath),
}

// ===== impl Debug =====

impl Debug<'_> {
    pub fn log(&self) {
        match self {
            Debug::ChangeEventRx(module, req_id, changes) => {
                debug_span!("northbound").in_scope(|| {
                    debug!(%module, %req_id, %changes, "{}", self);
                });
            }
            Debug::DoneEventRx(module, req_id)
            | Debug::AbortEventRx(module, req_id) => {
                debug_span!("northbound").in_scope(|| {
                    debug!(%module, %req_id, "{}", self);
                });
            }
            Debug::HandlerCall(phase, change) => {
                trace_span!("northbound").in_scope(|| {
                    trace!(%phase, %change, "{}", self);
                });
            }
            Debug::ChangeSkipped(change) => {
                trace_span!("northbound").in_scope(|| {
                    trace!(%change, "{}", self);
                });
            }
            Debug::Reconcile(module) => {
                debug_span!("northbound").in_scope(|| {
                    debug!(%module, "{}", self);
                });
            }
            Debug::OperDataRequestRx(path, elapsed) => {
                debug_span!("northbound").in_scope(|| {
                    debug!(%path, "{}: {}sec", self, elapsed);
                });
            }
            Debug::RpcRequestRx(path) => {
                trace_span!("northbound")
                    .in_scope(|| trace!(%path, "{}", self));
            }
        }
    }
}

impl std::fmt::Display for Debug<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Debug::ChangeEventRx(..) => {
                write!(f, "received change event")
            }
            Debug::DoneEventRx(..) => {
                write!(f, "received done event")
            }
            Debug::AbortEventRx(..) => {
                write!(f, "received abort event")
            }
            Debug::HandlerCall(..) => {
                write!(f, "handler callback")
            }
            Debug::ChangeSkipped(..) => {
                write!(f, "change skipped")
            }
            Debug::Reconcile(..) => {
                write!(f, "reconciling running configuration")
            }
            Debug::OperDataRequestRx(..) => {
                write!(f, "operational data request")
            }
            Debug::RpcRequestRx(..) => {
                write!(f, "rpc request")
            }
        }
    }
}
