//
// Copyright (c) The Goldstone Core Contributors
//
// SPDX-License-Identifier: MIT
//

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use goldstone_datastore::{
    Config as DatastoreConfig, Connector, Notification, View,
};
use goldstone_telemetry::{
    Config, DEFAULT_QUEUE_SIZE, Engine, NOTIFICATION_PATH, SubscribeRequest,
};
use goldstone_utils::UnboundedReceiver;
use goldstone_yang::modules;
use serde_json::{Value, json};
use tokio::time;

pub const SECOND: u64 = 1_000_000_000;
pub const OPER_STATUS: &str = "/goldstone-interfaces:interfaces/interface[name='Ethernet1/1/1']/state/oper-status";
pub const REQUEST: &str = "/goldstone-telemetry:subscribe-requests/subscribe-request";

// Collects the telemetry notifications published on a connector.
pub struct Events {
    rx: UnboundedReceiver<Notification>,
}

// ===== impl Events =====

impl Events {
    pub fn subscribe(conn: &Connector) -> Events {
        Events {
            rx: conn.subscribe_notification(NOTIFICATION_PATH).unwrap(),
        }
    }

    // Notification bodies received so far.
    pub fn drain(&mut self) -> Vec<Value> {
        let mut bodies = Vec::new();
        while let Ok(notification) = self.rx.try_recv() {
            bodies.push(notification.body);
        }
        bodies
    }
}

// ===== global functions =====

pub fn connector() -> Connector {
    let ctx = Arc::new(modules::builtin_context().unwrap());
    Connector::new(ctx, DatastoreConfig::default(), None).unwrap()
}

pub fn engine(conn: &Connector, update_secs: u64) -> Engine {
    let config = Config {
        update_interval: Duration::from_secs(update_secs),
        queue_size: DEFAULT_QUEUE_SIZE,
    };
    Engine::new(conn.clone(), config)
}

// Subscribe-request entry with the given subscriptions.
pub fn entry(id: u64, mode: &str, subscriptions: Value) -> Value {
    json!({
        "id": id,
        "config": {"id": id, "mode": mode},
        "subscriptions": {"subscription": subscriptions},
    })
}

pub fn build(engine: &Engine, value: Value) -> SubscribeRequest {
    engine.build(&value).unwrap()
}

// Pushes an operational value, as a device provider would.
pub async fn push(conn: &Connector, path: &str, value: Value) {
    let mut session = conn.new_session(View::Operational);
    session.set(path, value).unwrap();
    session.apply().await.unwrap();
}

pub async fn remove(conn: &Connector, path: &str) {
    let mut session = conn.new_session(View::Operational);
    session.delete(path).unwrap();
    session.apply().await.unwrap();
}

// Lets the spawned tasks catch up.
pub async fn settle() {
    time::sleep(Duration::from_millis(1)).await;
}

pub fn update(request: u64, sub: u64, path: &str, value: Value) -> Value {
    json!({
        "type": "UPDATE",
        "request-id": request,
        "subscription-id": sub,
        "path": path,
        "json-data": value.to_string(),
    })
}

pub fn delete(request: u64, sub: u64, path: &str) -> Value {
    json!({
        "type": "DELETE",
        "request-id": request,
        "subscription-id": sub,
        "path": path,
    })
}

pub fn sync_response(request: u64) -> Value {
    json!({"type": "SYNC_RESPONSE", "request-id": request})
}

pub fn count(events: &[Value], kind: &str) -> usize {
    events.iter().filter(|event| event["type"] == kind).count()
}
