//
// Copyright (c) The Goldstone Core Contributors
//
// SPDX-License-Identifier: MIT
//

#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use goldstone_datastore::{Config, Connector, Error, ModuleChangeEvent};
use goldstone_yang::modules;
use goldstone_yang::{Change, Context, LeafType, Module, SchemaNode};

pub const LISTS: &str = "acme-lists";

#[derive(Clone, Debug, PartialEq)]
pub enum Event {
    Change(u64, Vec<Change>),
    Done(u64),
    Abort(u64),
}

pub type Events = Arc<Mutex<Vec<Event>>>;

// Built-in modules plus a module holding a leaf-list.
pub fn context() -> Arc<Context> {
    let mut ctx = modules::builtin_context().unwrap();
    ctx.add_module(
        Module::new(LISTS, "acme").node(
            SchemaNode::container("lists")
                .child(SchemaNode::leaf_list("members", LeafType::string())),
        ),
    )
    .unwrap();
    Arc::new(ctx)
}

pub fn connector() -> Connector {
    Connector::new(context(), Config::default(), None).unwrap()
}

// Subscribes to a module and records the commit events it receives.
//
// Change events are rejected with `reject` when set. Change events with a
// request ID listed in `ignore` are never answered.
pub fn subscriber(
    conn: &Connector,
    module: &str,
    reject: Option<&'static str>,
    ignore: &[u64],
) -> Events {
    let mut rx = conn.subscribe_module_change(module).unwrap();
    let events = Events::default();
    let events_child = events.clone();
    let ignore = ignore.to_vec();
    tokio::spawn(async move {
        let mut stalled = Vec::new();
        while let Some(event) = rx.recv().await {
            let mut events = events_child.lock().unwrap();
            match event {
                ModuleChangeEvent::Change(request) => {
                    events.push(Event::Change(
                        request.req_id,
                        request.changes.to_vec(),
                    ));
                    if ignore.contains(&request.req_id) {
                        stalled.push(request.responder);
                        continue;
                    }
                    let result = match reject {
                        Some(msg) => {
                            Err(Error::InvalidArgument(msg.to_owned()))
                        }
                        None => Ok(()),
                    };
                    let _ = request.responder.send(result);
                }
                ModuleChangeEvent::Done(request) => {
                    events.push(Event::Done(request.req_id));
                    let _ = request.responder.send(());
                }
                ModuleChangeEvent::Abort(request) => {
                    events.push(Event::Abort(request.req_id));
                    let _ = request.responder.send(());
                }
            }
        }
    });
    events
}

pub fn events(events: &Events) -> Vec<Event> {
    events.lock().unwrap().clone()
}
