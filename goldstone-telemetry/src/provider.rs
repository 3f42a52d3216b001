//
// Copyright (c) The Goldstone Core Contributors
//
// SPDX-License-Identifier: MIT
//

use async_trait::async_trait;
use goldstone_datastore::{Connector, Error as DsError, Result};
use goldstone_northbound::{
    Handler, HandlerNode, HandlerTree, Provider, ServerContext, Transaction,
};
use goldstone_yang::{Change, ChangeKind, DataPath, modules};
use serde::Deserialize;
use serde_json::{Value, json};

use crate::engine::Engine;
use crate::error::Error;
use crate::request::SubscribeRequest;

pub const POLL_RPC: &str = "/goldstone-telemetry:poll";

/// Serves the goldstone-telemetry module on top of an [`Engine`].
///
/// Subscribe-requests are created and deleted as a whole. Changing an
/// existing request is rejected.
#[derive(Debug)]
pub struct TelemetryProvider {
    engine: Engine,
}

// Handler of one subscribe-request change.
struct RequestHandler {
    change: Change,
    // Request built during validation.
    request: Option<SubscribeRequest>,
    // Request removed by apply, kept for revert.
    deleted: Option<SubscribeRequest>,
    started: bool,
}

#[derive(Debug, Deserialize)]
struct PollInput {
    id: u64,
}

// ===== impl TelemetryProvider =====

impl TelemetryProvider {
    pub fn new(engine: Engine) -> TelemetryProvider {
        TelemetryProvider { engine }
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }
}

#[async_trait]
impl Provider for TelemetryProvider {
    type User = ();

    fn module(&self) -> &str {
        modules::TELEMETRY
    }

    fn handlers(&self) -> HandlerTree<TelemetryProvider> {
        HandlerTree::new([(
            "subscribe-requests",
            HandlerNode::dispatch([(
                "subscribe-request",
                HandlerNode::Handler(RequestHandler::boxed),
            )]),
        )])
    }

    fn rpcs(&self) -> Vec<String> {
        vec![POLL_RPC.to_owned()]
    }

    async fn oper_data(
        &mut self,
        _conn: &Connector,
        _path: &DataPath,
    ) -> Result<Option<Value>> {
        if self.engine.list().is_empty() {
            return Ok(None);
        }
        Ok(Some(self.engine.state()))
    }

    async fn rpc(
        &mut self,
        _conn: &Connector,
        path: &DataPath,
        input: Value,
    ) -> Result<Value> {
        if path.to_string() != POLL_RPC {
            return Err(DsError::Unsupported(format!(
                "{} not supported",
                path
            )));
        }
        let input = PollInput::deserialize(&input)
            .map_err(|error| Error::InvalidRequest(error.to_string()))?;
        self.engine.poll(input.id)?;
        Ok(json!({}))
    }

    // Starts the requests of the running configuration that aren't
    // running yet.
    async fn reconcile(&mut self, conn: &Connector) -> Result<()> {
        let config = conn.get_config_cache(modules::TELEMETRY)?;
        let entries = config
            .get("subscribe-request")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        for entry in entries {
            let request = match self.engine.build(&entry) {
                Ok(request) => request,
                Err(error) => {
                    error.log();
                    continue;
                }
            };
            if self.engine.get(request.id).is_ok() {
                continue;
            }
            if let Err(error) = self.engine.start(request) {
                error.log();
            }
        }
        Ok(())
    }
}

// ===== impl RequestHandler =====

impl RequestHandler {
    fn boxed(change: &Change) -> Box<dyn Handler<TelemetryProvider>> {
        Box::new(RequestHandler {
            change: change.clone(),
            request: None,
            deleted: None,
            started: false,
        })
    }

    // Path of the subscribe-request entry the change belongs to.
    fn entry_path(&self) -> DataPath {
        let elems = self.change.path.elems();
        DataPath::from_elems(elems[..elems.len().min(2)].to_vec())
    }

    fn is_entry(&self) -> bool {
        self.change.path.len() == 2
    }

    fn request_id(&self) -> Result<u64> {
        self.change
            .path
            .elems()
            .get(1)
            .and_then(|elem| elem.key("id"))
            .and_then(|id| id.parse().ok())
            .ok_or_else(|| {
                Error::InvalidRequest(format!(
                    "no request id in {}",
                    self.change.path
                ))
                .into()
            })
    }

    // Changes below an entry are fine only when the entry itself comes or
    // goes in the same transaction.
    fn check_descendant(&self, tx: &Transaction<()>) -> Result<()> {
        let entry = self.entry_path();
        let whole = tx.changes.iter().any(|change| {
            change.path == entry
                && matches!(
                    change.kind,
                    ChangeKind::Created | ChangeKind::Deleted
                )
        });
        if whole && self.change.kind != ChangeKind::Modified {
            Ok(())
        } else {
            Err(Error::ModificationUnsupported.into())
        }
    }
}

#[async_trait]
impl Handler<TelemetryProvider> for RequestHandler {
    async fn validate(
        &mut self,
        server: &mut ServerContext<'_, TelemetryProvider>,
        tx: &mut Transaction<()>,
    ) -> Result<()> {
        if !self.is_entry() {
            return self.check_descendant(tx);
        }

        match self.change.kind {
            ChangeKind::Created => {
                let path = self.change.path.to_string();
                let value = tx.get(&path).ok_or_else(|| {
                    DsError::NotFound(format!("no candidate data at {}", path))
                })?;
                self.request = Some(server.provider.engine.build(&value)?);
            }
            ChangeKind::Deleted => {
                server.provider.engine.get(self.request_id()?)?;
            }
            ChangeKind::Modified => {
                return Err(Error::ModificationUnsupported.into());
            }
        }
        Ok(())
    }

    async fn apply(
        &mut self,
        server: &mut ServerContext<'_, TelemetryProvider>,
        _tx: &mut Transaction<()>,
    ) -> Result<()> {
        if !self.is_entry() {
            return Ok(());
        }

        let engine = &mut server.provider.engine;
        match self.change.kind {
            ChangeKind::Created => {
                if let Some(request) = &self.request {
                    engine.start(request.clone())?;
                    self.started = true;
                }
            }
            ChangeKind::Deleted => {
                self.deleted = Some(engine.delete(self.request_id()?)?);
            }
            ChangeKind::Modified => (),
        }
        Ok(())
    }

    async fn revert(
        &mut self,
        server: &mut ServerContext<'_, TelemetryProvider>,
        _tx: &mut Transaction<()>,
    ) -> Result<()> {
        let engine = &mut server.provider.engine;
        if self.started {
            self.started = false;
            if let Some(request) = &self.request {
                engine.delete(request.id)?;
            }
        }
        if let Some(request) = self.deleted.take() {
            engine.start(request)?;
        }
        Ok(())
    }
}
