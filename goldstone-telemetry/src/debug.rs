//
// Copyright (c) The Goldstone Core Contributors
//
// SPDX-License-Identifier: MIT
//

use tracing::{debug, debug_span, trace, trace_span};

use crate::queue::Event;
use crate::request::RequestMode;
use crate::store::Ids;

// Telemetry debug messages.
#[derive(Debug)]
pub enum Debug<'a> {
    RequestStart(u64, RequestMode, usize),
    RequestStop(u64),
    Snapshot(u64),
    PollRx(u64),
    Sample(Ids, bool),
    EventTx(&'a Event),
    EventDropped(&'a Event),
    QueueClosed(u64),
}

// ===== impl Debug =====

impl Debug<'_> {
    pub fn log(&self) {
        match self {
            Debug::RequestStart(id, mode, subscriptions) => {
                debug_span!("telemetry").in_scope(|| {
                    debug!(%id, %mode, %subscriptions, "{}", self);
                });
            }
            Debug::RequestStop(id)
            | Debug::Snapshot(id)
            | Debug::PollRx(id) => {
                debug_span!("telemetry").in_scope(|| {
                    debug!(%id, "{}", self);
                });
            }
            Debug::Sample(ids, force) => {
                trace_span!("telemetry").in_scope(|| {
                    trace!(%ids, %force, "{}", self);
                });
            }
            Debug::EventTx(event) => {
                trace_span!("telemetry").in_scope(|| {
                    trace!(
                        request = %event.request,
                        r#type = %event.event_type,
                        path = ?event.path,
                        "{}", self
                    );
                });
            }
            Debug::EventDropped(event) => {
                debug_span!("telemetry").in_scope(|| {
                    debug!(
                        request = %event.request,
                        path = ?event.path,
                        "{}", self
                    );
                });
            }
            Debug::QueueClosed(id) => {
                debug_span!("telemetry").in_scope(|| {
                    debug!(%id, "{}", self);
                });
            }
        }
    }
}

impl std::fmt::Display for Debug<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Debug::RequestStart(..) => {
                write!(f, "starting subscribe-request")
            }
            Debug::RequestStop(..) => {
                write!(f, "stopping subscribe-request")
            }
            Debug::Snapshot(..) => {
                write!(f, "collecting snapshot")
            }
            Debug::PollRx(..) => {
                write!(f, "received poll")
            }
            Debug::Sample(..) => {
                write!(f, "sampling")
            }
            Debug::EventTx(..) => {
                write!(f, "publishing event")
            }
            Debug::EventDropped(..) => {
                write!(f, "queue full, dropped oldest event")
            }
            Debug::QueueClosed(..) => {
                write!(f, "queue full, closing stream")
            }
        }
    }
}
