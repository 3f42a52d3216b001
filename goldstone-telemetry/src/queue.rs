//
// Copyright (c) The Goldstone Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde_json::{Value, json};
use tokio::sync::Notify;

use crate::debug::Debug;
use crate::store::Ids;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum EventType {
    Update,
    Delete,
    SyncResponse,
}

/// Telemetry notification waiting to be published.
#[derive(Clone, Debug, PartialEq)]
pub struct Event {
    pub event_type: EventType,
    pub request: u64,
    pub subscription: Option<u64>,
    pub path: Option<String>,
    pub value: Option<Value>,
}

/// What to do with an event that doesn't fit in the queue.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Overflow {
    // Make room by discarding the oldest event.
    DropOldest,
    // Close the queue. Events already queued are still delivered.
    Close,
}

/// Bounded queue between the collectors of a subscribe-request and its
/// publisher.
#[derive(Clone, Debug)]
pub struct EmitQueue {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    state: Mutex<State>,
    notify: Notify,
}

#[derive(Debug)]
struct State {
    events: VecDeque<Event>,
    capacity: usize,
    closed: bool,
}

// ===== impl EventType =====

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EventType::Update => write!(f, "UPDATE"),
            EventType::Delete => write!(f, "DELETE"),
            EventType::SyncResponse => write!(f, "SYNC_RESPONSE"),
        }
    }
}

// ===== impl Event =====

impl Event {
    pub fn update(ids: Ids, path: String, value: Value) -> Event {
        Event {
            event_type: EventType::Update,
            request: ids.request,
            subscription: Some(ids.subscription),
            path: Some(path),
            value: Some(value),
        }
    }

    pub fn delete(ids: Ids, path: String) -> Event {
        Event {
            event_type: EventType::Delete,
            request: ids.request,
            subscription: Some(ids.subscription),
            path: Some(path),
            value: None,
        }
    }

    pub fn sync_response(request: u64) -> Event {
        Event {
            event_type: EventType::SyncResponse,
            request,
            subscription: None,
            path: None,
            value: None,
        }
    }

    /// Notification body. The value travels JSON-encoded in `json-data`.
    pub fn body(&self) -> Value {
        let mut body = json!({
            "type": self.event_type.to_string(),
            "request-id": self.request,
        });
        if let Some(subscription) = self.subscription {
            body["subscription-id"] = json!(subscription);
        }
        if let Some(path) = &self.path {
            body["path"] = json!(path);
        }
        if let Some(value) = &self.value {
            body["json-data"] = json!(value.to_string());
        }
        body
    }
}

// ===== impl EmitQueue =====

impl EmitQueue {
    pub fn new(capacity: usize) -> EmitQueue {
        EmitQueue {
            inner: Arc::new(Inner {
                state: Mutex::new(State {
                    events: VecDeque::new(),
                    capacity: capacity.max(1),
                    closed: false,
                }),
                notify: Notify::new(),
            }),
        }
    }

    /// Queues an event. Returns false when the event was not queued
    /// because the queue is closed.
    pub fn push(&self, event: Event, overflow: Overflow) -> bool {
        let mut state = self.lock();
        if state.closed {
            return false;
        }
        if state.events.len() >= state.capacity {
            match overflow {
                Overflow::DropOldest => {
                    if let Some(dropped) = state.events.pop_front() {
                        Debug::EventDropped(&dropped).log();
                    }
                }
                Overflow::Close => {
                    state.closed = true;
                    drop(state);
                    Debug::QueueClosed(event.request).log();
                    self.inner.notify.notify_one();
                    return false;
                }
            }
        }
        state.events.push_back(event);
        drop(state);
        self.inner.notify.notify_one();
        true
    }

    pub fn close(&self) {
        self.lock().closed = true;
        self.inner.notify.notify_one();
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.lock().events.len()
    }

    /// Waits for the next event. Returns `None` once the queue is closed
    /// and drained.
    pub async fn pop(&self) -> Option<Event> {
        loop {
            {
                let mut state = self.lock();
                if let Some(event) = state.events.pop_front() {
                    return Some(event);
                }
                if state.closed {
                    return None;
                }
            }
            self.inner.notify.notified().await;
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.inner.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
