//
// Copyright (c) The Goldstone Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::sync::Arc;

use derive_new::new;
use enum_as_inner::EnumAsInner;
use goldstone_utils::Responder;
use goldstone_yang::{Change, DataPath, DataTree};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;

/// Logical datastore views.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
#[derive(Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum View {
    Running,
    Operational,
    Startup,
}

/// Options of [`crate::Connector::get`].
#[derive(Clone, Debug, Default)]
pub struct GetOptions {
    // Returned instead of a not-found error.
    pub default: Option<Value>,
    pub include_implicit_defaults: bool,
    // Return the value at the path instead of the enclosing tree.
    pub strip: bool,
    // Require exactly one match.
    pub one: bool,
}

/// Events delivered to module change subscribers.
#[derive(Debug, EnumAsInner)]
pub enum ModuleChangeEvent {
    Change(ChangeRequest),
    Done(PhaseRequest),
    Abort(PhaseRequest),
}

/// Phase one of a commit: the subscriber must accept or reject the
/// changes of its module.
#[derive(Debug, new)]
pub struct ChangeRequest {
    pub req_id: u64,
    pub changes: Arc<Vec<Change>>,
    // Candidate configuration, with defaults.
    pub config: Arc<DataTree>,
    pub responder: Responder<Result<()>>,
}

/// Phase two of a commit.
#[derive(Debug, new)]
pub struct PhaseRequest {
    pub req_id: u64,
    pub responder: Responder<()>,
}

/// Pull request for operational data under a subscribed root.
#[derive(Debug, new)]
pub struct OperDataRequest {
    pub path: DataPath,
    pub responder: Responder<Result<Option<DataTree>>>,
}

#[derive(Debug, new)]
pub struct RpcRequest {
    pub path: DataPath,
    pub input: Value,
    pub responder: Responder<Result<Value>>,
}

#[derive(Clone, Debug, new)]
#[derive(Deserialize, Serialize)]
pub struct Notification {
    pub path: DataPath,
    pub body: Value,
}

/// Paths whose value changed in the last commit of a view.
#[derive(Clone, Debug, new)]
pub struct DataChange {
    pub view: View,
    pub paths: Vec<DataPath>,
}

// ===== impl View =====

impl std::fmt::Display for View {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            View::Running => write!(f, "running"),
            View::Operational => write!(f, "operational"),
            View::Startup => write!(f, "startup"),
        }
    }
}

// ===== impl ModuleChangeEvent =====

impl ModuleChangeEvent {
    pub fn req_id(&self) -> u64 {
        match self {
            ModuleChangeEvent::Change(request) => request.req_id,
            ModuleChangeEvent::Done(request)
            | ModuleChangeEvent::Abort(request) => request.req_id,
        }
    }
}
