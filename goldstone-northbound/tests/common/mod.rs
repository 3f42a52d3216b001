//
// Copyright (c) The Goldstone Core Contributors
//
// SPDX-License-Identifier: MIT
//

#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use goldstone_datastore::{Config as DatastoreConfig, Connector, Error, Result};
use goldstone_northbound::{
    Config, Handler, HandlerNode, HandlerTree, Provider, ServerContext,
    Transaction,
};
use goldstone_yang::{Change, ChangeKind, DataPath, modules};
use serde_json::Value;

pub const INTERFACE: &str =
    "/goldstone-interfaces:interfaces/interface[name='Ethernet1/1/1']";
pub const MODULE: &str = "/goldstone-transponder:modules/module[name='piu1']";

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Phase {
    Init,
    Validate,
    Apply,
    Revert,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Call {
    Reconcile,
    Pre,
    Post,
    Handler(Phase, ChangeKind, DataPath),
}

pub type Calls = Arc<Mutex<Vec<Call>>>;

// Settings received by the fake device, as (leaf, value) pairs.
pub type Device = Arc<Mutex<Vec<(String, Value)>>>;

// Operational values read by handlers.
pub type Seen = Arc<Mutex<Vec<Value>>>;

#[derive(Debug)]
pub struct Failure {
    pub phase: Phase,
    pub leaf: &'static str,
    pub msg: &'static str,
}

// Provider recording every callback it gets.
pub struct TestProvider {
    module: &'static str,
    tree: fn() -> HandlerTree<TestProvider>,
    pub calls: Calls,
    pub device: Device,
    pub failure: Option<Failure>,
    pub oper: Option<Value>,
    pub seen: Seen,
}

struct Recorder {
    change: Change,
}

// Checks the interface state before accepting a change.
struct Inspector {
    change: Change,
}

// ===== impl TestProvider =====

impl TestProvider {
    pub fn interfaces() -> TestProvider {
        TestProvider::new(modules::INTERFACES, interfaces_tree)
    }

    pub fn transponder() -> TestProvider {
        TestProvider::new(modules::TRANSPONDER, transponder_tree)
    }

    // Interfaces provider whose admin-status handler reads the interface
    // operational state while validating.
    pub fn inspecting() -> TestProvider {
        TestProvider::new(modules::INTERFACES, inspecting_tree)
    }

    fn new(
        module: &'static str,
        tree: fn() -> HandlerTree<TestProvider>,
    ) -> TestProvider {
        TestProvider {
            module,
            tree,
            calls: Default::default(),
            device: Default::default(),
            failure: None,
            oper: None,
            seen: Default::default(),
        }
    }

    pub fn failing(
        mut self,
        phase: Phase,
        leaf: &'static str,
        msg: &'static str,
    ) -> TestProvider {
        self.failure = Some(Failure { phase, leaf, msg });
        self
    }

    fn record(&self, phase: Phase, change: &Change) -> Result<()> {
        self.calls.lock().unwrap().push(Call::Handler(
            phase,
            change.kind,
            change.path.clone(),
        ));
        let leaf = change.path.last().map(|elem| elem.name.as_str());
        match &self.failure {
            Some(failure)
                if failure.phase == phase && Some(failure.leaf) == leaf =>
            {
                Err(Error::InvalidArgument(failure.msg.to_owned()))
            }
            _ => Ok(()),
        }
    }
}

#[async_trait]
impl Provider for TestProvider {
    type User = ();

    fn module(&self) -> &str {
        self.module
    }

    fn handlers(&self) -> HandlerTree<TestProvider> {
        (self.tree)()
    }

    async fn pre(
        &mut self,
        _conn: &Connector,
        _tx: &mut Transaction<()>,
    ) -> Result<()> {
        self.calls.lock().unwrap().push(Call::Pre);
        Ok(())
    }

    async fn post(
        &mut self,
        _conn: &Connector,
        _tx: &mut Transaction<()>,
    ) -> Result<()> {
        self.calls.lock().unwrap().push(Call::Post);
        Ok(())
    }

    async fn oper_data(
        &mut self,
        _conn: &Connector,
        _path: &DataPath,
    ) -> Result<Option<Value>> {
        Ok(self.oper.clone())
    }

    async fn reconcile(&mut self, _conn: &Connector) -> Result<()> {
        self.calls.lock().unwrap().push(Call::Reconcile);
        Ok(())
    }
}

// ===== impl Recorder =====

#[async_trait]
impl Handler<TestProvider> for Recorder {
    async fn init(
        &mut self,
        server: &mut ServerContext<'_, TestProvider>,
        _tx: &mut Transaction<()>,
    ) -> Result<()> {
        server.provider.record(Phase::Init, &self.change)
    }

    async fn validate(
        &mut self,
        server: &mut ServerContext<'_, TestProvider>,
        _tx: &mut Transaction<()>,
    ) -> Result<()> {
        server.provider.record(Phase::Validate, &self.change)?;
        if let Some(value) = server.new_value(&self.change)? {
            server.check_range(&self.change.path, &value)?;
        }
        Ok(())
    }

    async fn apply(
        &mut self,
        server: &mut ServerContext<'_, TestProvider>,
        _tx: &mut Transaction<()>,
    ) -> Result<()> {
        server.provider.record(Phase::Apply, &self.change)?;
        self.program(server)
    }

    async fn revert(
        &mut self,
        server: &mut ServerContext<'_, TestProvider>,
        _tx: &mut Transaction<()>,
    ) -> Result<()> {
        server.provider.record(Phase::Revert, &self.change)?;
        let value = match self.change.kind {
            ChangeKind::Created => server
                .conn
                .context()
                .default_value(&self.change.path.to_string())?,
            ChangeKind::Modified | ChangeKind::Deleted => {
                self.change.prev.clone()
            }
        };
        if let Some(value) = value {
            self.push(server, value);
        }
        Ok(())
    }
}

// ===== impl Inspector =====

#[async_trait]
impl Handler<TestProvider> for Inspector {
    async fn validate(
        &mut self,
        server: &mut ServerContext<'_, TestProvider>,
        _tx: &mut Transaction<()>,
    ) -> Result<()> {
        let path = format!("{}/state/oper-status", INTERFACE);
        let value = server.get_operational_data(&path, None).await?;
        server.provider.seen.lock().unwrap().push(value);
        Ok(())
    }

    async fn apply(
        &mut self,
        server: &mut ServerContext<'_, TestProvider>,
        _tx: &mut Transaction<()>,
    ) -> Result<()> {
        server.provider.record(Phase::Apply, &self.change)
    }
}

impl Recorder {
    fn program(
        &self,
        server: &mut ServerContext<'_, TestProvider>,
    ) -> Result<()> {
        if let Some(value) = server.new_value(&self.change)? {
            self.push(server, value);
        }
        Ok(())
    }

    fn push(&self, server: &mut ServerContext<'_, TestProvider>, value: Value) {
        let leaf = self
            .change
            .path
            .last()
            .map(|elem| elem.name.clone())
            .unwrap_or_default();
        server.provider.device.lock().unwrap().push((leaf, value));
    }
}

// ===== global functions =====

pub fn connector() -> Connector {
    let ctx = Arc::new(modules::builtin_context().unwrap());
    Connector::new(ctx, DatastoreConfig::default(), None).unwrap()
}

pub fn config(revert_timeout: u64) -> Config {
    Config {
        revert_timeout: Duration::from_secs(revert_timeout),
    }
}

pub fn path(path: &str) -> DataPath {
    DataPath::parse(path).unwrap()
}

pub fn recorded(calls: &Calls) -> Vec<Call> {
    calls.lock().unwrap().clone()
}

// Handler calls of one phase, in call order.
pub fn phase_calls(calls: &Calls, phase: Phase) -> Vec<DataPath> {
    calls
        .lock()
        .unwrap()
        .iter()
        .filter_map(|call| match call {
            Call::Handler(p, _, path) if *p == phase => Some(path.clone()),
            _ => None,
        })
        .collect()
}

pub fn device(device: &Device) -> Vec<(String, Value)> {
    device.lock().unwrap().clone()
}

fn recorder(change: &Change) -> Box<dyn Handler<TestProvider>> {
    Box::new(Recorder {
        change: change.clone(),
    })
}

fn inspector(change: &Change) -> Box<dyn Handler<TestProvider>> {
    Box::new(Inspector {
        change: change.clone(),
    })
}

fn inspecting_tree() -> HandlerTree<TestProvider> {
    HandlerTree::new([(
        "interfaces",
        HandlerNode::dispatch([(
            "interface",
            HandlerNode::dispatch([
                ("name", HandlerNode::Skip),
                (
                    "config",
                    HandlerNode::dispatch([
                        ("name", HandlerNode::Skip),
                        ("admin-status", HandlerNode::Handler(inspector)),
                    ]),
                ),
            ]),
        )]),
    )])
}

fn interfaces_tree() -> HandlerTree<TestProvider> {
    HandlerTree::new([(
        "interfaces",
        HandlerNode::dispatch([(
            "interface",
            HandlerNode::dispatch([
                ("name", HandlerNode::Skip),
                (
                    "config",
                    HandlerNode::dispatch([
                        ("name", HandlerNode::Handler(recorder)),
                        ("admin-status", HandlerNode::Handler(recorder)),
                        ("description", HandlerNode::Handler(recorder)),
                        ("loopback-mode", HandlerNode::Skip),
                        ("mtu", HandlerNode::Handler(recorder)),
                    ]),
                ),
                ("ethernet", HandlerNode::Skip),
            ]),
        )]),
    )])
}

fn transponder_tree() -> HandlerTree<TestProvider> {
    HandlerTree::new([(
        "modules",
        HandlerNode::dispatch([(
            "module",
            HandlerNode::dispatch([
                ("name", HandlerNode::Skip),
                (
                    "config",
                    HandlerNode::dispatch([
                        ("name", HandlerNode::Skip),
                        ("admin-status", HandlerNode::Handler(recorder)),
                        ("description", HandlerNode::Skip),
                    ]),
                ),
            ]),
        )]),
    )])
}
