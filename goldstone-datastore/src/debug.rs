//
// Copyright (c) The Goldstone Core Contributors
//
// SPDX-License-Identifier: MIT
//

use goldstone_yang::DataPath;
use tracing::{debug, debug_span, trace, trace_span};

use crate::api::View;

// Datastore debug messages.
#[derive(Debug)]
pub enum Debug<'a> {
    SessionApply(View, usize),
    ChangeEventTx(&'a str, u64, usize),
    DoneEventTx(&'a str, u64),
    AbortEventTx(&'a str, u64),
    OperDataRequestTx(&'a str, &'a DataPath),
    RpcRequestTx(&'a DataPath),
    NotificationTx(&'a DataPath),
    StartupStored,
}

// ===== impl Debug =====

impl Debug<'_> {
    pub fn log(&self) {
        match self {
            Debug::SessionApply(view, edits) => {
                debug_span!("datastore").in_scope(|| {
                    debug!(%view, %edits, "{}", self);
                });
            }
            Debug::ChangeEventTx(module, req_id, changes) => {
                debug_span!("datastore").in_scope(|| {
                    debug!(%module, %req_id, %changes, "{}", self);
                });
            }
            Debug::DoneEventTx(module, req_id)
            | Debug::AbortEventTx(module, req_id) => {
                debug_span!("datastore").in_scope(|| {
                    debug!(%module, %req_id, "{}", self);
                });
            }
            Debug::OperDataRequestTx(module, path) => {
                trace_span!("datastore").in_scope(|| {
                    trace!(%module, %path, "{}", self);
                });
            }
            Debug::RpcRequestTx(path) | Debug::NotificationTx(path) => {
                trace_span!("datastore").in_scope(|| {
                    trace!(%path, "{}", self);
                });
            }
            Debug::StartupStored => {
                debug_span!("datastore").in_scope(|| {
                    debug!("{}", self);
                });
            }
        }
    }
}

impl std::fmt::Display for Debug<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Debug::SessionApply(..) => {
                write!(f, "applying session changes")
            }
            Debug::ChangeEventTx(..) => {
                write!(f, "sending change event")
            }
            Debug::DoneEventTx(..) => {
                write!(f, "sending done event")
            }
            Debug::AbortEventTx(..) => {
                write!(f, "sending abort event")
            }
            Debug::OperDataRequestTx(..) => {
                write!(f, "requesting operational data")
            }
            Debug::RpcRequestTx(..) => {
                write!(f, "sending rpc request")
            }
            Debug::NotificationTx(..) => {
                write!(f, "sending notification")
            }
            Debug::StartupStored => {
                write!(f, "startup configuration stored")
            }
        }
    }
}
